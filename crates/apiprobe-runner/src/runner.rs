//! Concurrent test runner
//!
//! Fixed pool of scoped worker threads over a pre-filled job channel. Each
//! result is tagged with its job index and written to its own slot, so the
//! returned `Vec` is in job order whatever order the workers finish in.

use std::num::NonZeroUsize;
use std::sync::mpsc::{self, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use tracing::{debug, info};

use apiprobe_core::result::ERR_STATUS;
use apiprobe_core::{
    Config, ProgressEvent, RequestBody, RetryPolicy, RunSummary, TestJob, TestResult,
};

use crate::cancel::CancelToken;
use crate::executor::{ExecOutcome, execute};
use crate::resolve::{ResolveError, build_job};
use crate::spec::{ApiSpec, SpecError, load_spec};
use crate::synth::Synthesizer;
use crate::transport::{HttpRequest, ReqwestTransport, Transport, TransportError};
use crate::validate::validate;

/// Upper bound for auto-detected concurrency.
pub const MAX_AUTO_CONCURRENCY: usize = 10;

/// Request and response bodies in verbose logs are cut at this many bytes.
const LOG_BODY_LIMIT: usize = 4096;

const CANCELLED_MESSAGE: &str = "cancelled";

/// Worker count for a requested concurrency. `<= 0` means one per logical
/// core, capped at [`MAX_AUTO_CONCURRENCY`].
#[must_use]
pub fn effective_concurrency(requested: i64) -> usize {
    if requested > 0 {
        return usize::try_from(requested).unwrap_or(usize::MAX);
    }
    thread::available_parallelism()
        .map_or(1, NonZeroUsize::get)
        .min(MAX_AUTO_CONCURRENCY)
}

/// Knobs for one run.
#[derive(Debug, Clone, Copy)]
pub struct RunSettings {
    /// Requested worker count, `<= 0` for auto
    pub concurrency: i64,
    pub retry: RetryPolicy,
    pub verbose: bool,
}

impl RunSettings {
    #[must_use]
    pub fn new(concurrency: i64, retry: RetryPolicy) -> Self {
        Self {
            concurrency,
            retry,
            verbose: false,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.concurrency, config.retry_policy()).with_verbose(config.verbose)
    }

    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::new(0, RetryPolicy::default())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("HTTP client: {0}")]
    Transport(#[from] TransportError),
}

/// Runs resolved jobs through a worker pool.
#[derive(Debug, Clone, Default)]
pub struct TestRunner {
    settings: RunSettings,
    cancel: CancelToken,
}

impl TestRunner {
    #[must_use]
    pub fn new(settings: RunSettings) -> Self {
        Self {
            settings,
            cancel: CancelToken::new(),
        }
    }

    /// Share `cancel` with the caller so the run can be stopped from outside.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Execute every job. `results[i]` belongs to `jobs[i]`.
    pub fn run<T: Transport + ?Sized>(
        &self,
        jobs: Vec<TestJob>,
        transport: &T,
        progress: Option<SyncSender<ProgressEvent>>,
    ) -> Vec<TestResult> {
        run_jobs(jobs, transport, &self.settings, progress, &self.cancel)
    }
}

/// Worker-pool core behind [`TestRunner::run`].
///
/// Progress events are sent with `try_send`: a full or disconnected channel
/// drops the event and never stalls a worker.
pub fn run_jobs<T: Transport + ?Sized>(
    jobs: Vec<TestJob>,
    transport: &T,
    settings: &RunSettings,
    progress: Option<SyncSender<ProgressEvent>>,
    cancel: &CancelToken,
) -> Vec<TestResult> {
    let total = jobs.len();
    if total == 0 {
        return Vec::new();
    }
    let workers = effective_concurrency(settings.concurrency).min(total);
    let started = Instant::now();
    info!(jobs = total, workers, "starting run");

    let labels: Vec<(String, String)> = jobs
        .iter()
        .map(|j| (j.method.clone(), j.endpoint.clone()))
        .collect();

    // Capacity `total`: filling never blocks.
    let (job_tx, job_rx) = mpsc::sync_channel::<(usize, TestJob)>(total);
    for pair in jobs.into_iter().enumerate() {
        if job_tx.send(pair).is_err() {
            break;
        }
    }
    drop(job_tx);
    let job_rx = Mutex::new(job_rx);

    let mut slots: Vec<Option<TestResult>> = (0..total).map(|_| None).collect();
    let (result_tx, result_rx) = mpsc::channel::<(usize, TestResult)>();

    thread::scope(|scope| {
        for worker in 0..workers {
            let result_tx = result_tx.clone();
            let job_rx = &job_rx;
            scope.spawn(move || {
                loop {
                    let next = job_rx
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .recv();
                    let Ok((index, job)) = next else {
                        break;
                    };
                    let result = if cancel.is_cancelled() {
                        TestResult::error(&job.method, &job.endpoint, CANCELLED_MESSAGE)
                    } else {
                        execute_job(&job, transport, settings, cancel)
                    };
                    debug!(worker, index, status = %result.status, "job finished");
                    if result_tx.send((index, result)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        let mut completed = 0;
        for (index, result) in result_rx {
            completed += 1;
            if let Some(tx) = &progress {
                // Full or disconnected: the event is dropped
                let _ = tx.try_send(ProgressEvent {
                    completed,
                    total,
                    latest: result.clone(),
                });
            }
            slots[index] = Some(result);
        }
    });

    let results: Vec<TestResult> = slots
        .into_iter()
        .zip(labels)
        .map(|(slot, (method, endpoint))| {
            slot.unwrap_or_else(|| TestResult::error(method, endpoint, "worker exited early"))
        })
        .collect();

    let summary = RunSummary::from_results(&results);
    info!(
        total = summary.total,
        passed = summary.passed,
        failed = summary.failed,
        errors = summary.errors,
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "run finished"
    );
    results
}

/// Run one job: execute with retries, then validate the final response.
pub fn execute_job<T: Transport + ?Sized>(
    job: &TestJob,
    transport: &T,
    settings: &RunSettings,
    cancel: &CancelToken,
) -> TestResult {
    if let RequestBody::Failed(reason) = &job.body {
        let mut result = TestResult::error(
            &job.method,
            &job.endpoint,
            format!("body generation failed: {reason}"),
        );
        if settings.verbose {
            result.verbose_log = Some(format!(
                "> {} {}\n! body generation failed: {reason}",
                job.method, job.endpoint
            ));
        }
        return result;
    }

    let request = HttpRequest {
        method: &job.method,
        url: &job.endpoint,
        body: job.body.as_bytes(),
    };
    let outcome = execute(transport, &request, &settings.retry, cancel);

    let (status, message) = match (&outcome.response, &outcome.error) {
        (Some(resp), None) => (
            resp.status.to_string(),
            validate(resp, &job.operation, resp.status).message(),
        ),
        (Some(resp), Some(err)) => (resp.status.to_string(), err.to_string()),
        (None, Some(err)) => (ERR_STATUS.to_string(), err.to_string()),
        (None, None) => (ERR_STATUS.to_string(), "no response".to_string()),
    };

    TestResult {
        method: job.method.clone(),
        endpoint: job.endpoint.clone(),
        status,
        message,
        duration_ms: u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
        retry_count: outcome.retries,
        verbose_log: settings.verbose.then(|| verbose_log(&request, &outcome)),
    }
}

fn verbose_log(request: &HttpRequest<'_>, outcome: &ExecOutcome) -> String {
    let mut log = format!("> {} {}", request.method, request.url);
    if let Some(body) = request.body {
        log.push_str("\n> ");
        log.push_str(truncate_utf8(&String::from_utf8_lossy(body), LOG_BODY_LIMIT));
    }
    for line in &outcome.attempts {
        log.push_str("\n* ");
        log.push_str(line);
    }
    if let Some(resp) = &outcome.response {
        log.push_str(&format!(
            "\n< {} {}",
            resp.status,
            resp.content_type.as_deref().unwrap_or("-")
        ));
        if !resp.body.is_empty() {
            log.push_str("\n< ");
            log.push_str(truncate_utf8(&String::from_utf8_lossy(&resp.body), LOG_BODY_LIMIT));
        }
    }
    log
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a char.
fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Resolve every operation of `spec` into a job, keeping operation order.
///
/// # Errors
///
/// Returns error if `base_url` does not form valid endpoints.
pub fn build_jobs(
    spec: &ApiSpec,
    base_url: &str,
    synth: &mut Synthesizer,
) -> Result<Vec<TestJob>, RunError> {
    spec.operations
        .iter()
        .map(|op| build_job(base_url, Arc::new(op.clone()), synth).map_err(RunError::from))
        .collect()
}

/// Load the document named by `config`, build jobs, and run them against a
/// reqwest transport.
///
/// # Errors
///
/// Fails before any request is sent if the document cannot be loaded, the
/// base URL is invalid, or the HTTP client cannot be built.
pub fn run_spec(
    config: &Config,
    progress: Option<SyncSender<ProgressEvent>>,
    cancel: CancelToken,
) -> Result<Vec<TestResult>, RunError> {
    let spec = load_spec(&config.spec)?;
    let mut synth = Synthesizer::new(spec.components.clone(), config.optional_fields, config.seed);
    let jobs = build_jobs(&spec, &config.base_url, &mut synth)?;
    let transport =
        ReqwestTransport::new(config.timeout(), config.auth.clone(), config.headers.clone())?;
    info!(base_url = %config.base_url, auth = %config.auth.describe(), "target");
    let runner = TestRunner::new(RunSettings::from_config(config)).with_cancel(cancel);
    Ok(runner.run(jobs, &transport, progress))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use apiprobe_core::{DeclaredResponse, Operation};
    use proptest::prelude::*;

    use crate::transport::HttpResponse;
    use crate::transport::scripted::Scripted;

    fn job(method: &str, path: &str, body: RequestBody) -> TestJob {
        let op = Arc::new(Operation::new(method, path));
        TestJob::new(op, format!("http://test{path}"), body)
    }

    fn fast_settings(concurrency: i64) -> RunSettings {
        RunSettings::new(concurrency, RetryPolicy::none())
    }

    /// Replies with the status encoded in the URL's last segment after a
    /// short index-dependent delay, tracking concurrent calls.
    #[derive(Default)]
    struct Echo {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    impl Transport for Echo {
        fn send(&self, request: &HttpRequest<'_>) -> Result<HttpResponse, TransportError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);

            let status: u16 = request
                .url
                .rsplit('/')
                .next()
                .and_then(|s| s.parse().ok())
                .unwrap_or(599);
            thread::sleep(Duration::from_millis(u64::from(status % 7)));

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(HttpResponse::new(status, Some("application/json"), "{}"))
        }
    }

    fn echo_jobs(n: usize) -> Vec<TestJob> {
        (0..n)
            .map(|i| job("GET", &format!("/items/{}", 200 + i), RequestBody::Empty))
            .collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn results_follow_job_order(n in 0usize..40, concurrency in 1i64..12) {
            for level in [1, concurrency, i64::try_from(n.max(1)).unwrap()] {
                let jobs = echo_jobs(n);
                let endpoints: Vec<String> = jobs.iter().map(|j| j.endpoint.clone()).collect();
                let results = run_jobs(jobs, &Echo::default(), &fast_settings(level), None, &CancelToken::new());

                prop_assert_eq!(results.len(), n);
                for (i, r) in results.iter().enumerate() {
                    prop_assert_eq!(&r.endpoint, &endpoints[i]);
                    prop_assert_eq!(r.status_code(), Some(u16::try_from(200 + i).unwrap()));
                }
            }
        }
    }

    #[test]
    fn in_flight_never_exceeds_concurrency() {
        let transport = Echo::default();
        let results = run_jobs(
            echo_jobs(30),
            &transport,
            &fast_settings(4),
            None,
            &CancelToken::new(),
        );
        assert_eq!(results.len(), 30);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 30);
        let max = transport.max_in_flight.load(Ordering::SeqCst);
        assert!((1..=4).contains(&max), "max in flight {max}");
    }

    #[test]
    fn empty_job_list_yields_no_results() {
        let results = TestRunner::default().run(Vec::new(), &Echo::default(), None);
        assert!(results.is_empty());
    }

    #[test]
    fn failed_body_is_recorded_without_a_request() {
        let transport = Scripted::statuses(&[200]);
        let jobs = vec![
            job("POST", "/orders", RequestBody::Failed("unresolved schema reference #/x".into())),
            job("GET", "/orders", RequestBody::Empty),
        ];
        let results = run_jobs(jobs, &transport, &fast_settings(1), None, &CancelToken::new());

        assert_eq!(transport.calls(), 1);
        assert!(results[0].is_error());
        assert!(results[0].message.starts_with("body generation failed"));
        assert_eq!(results[1].status, "200");
        assert!(results[1].passed());
    }

    #[test]
    fn undeclared_status_fails_validation() {
        let mut op = Operation::new("GET", "/users/1");
        op.responses.insert(
            "200".into(),
            DeclaredResponse {
                content_types: vec!["application/json".into()],
            },
        );
        let job = TestJob::new(Arc::new(op), "http://test/users/1".into(), RequestBody::Empty);
        let transport = Scripted::statuses(&[404]);

        let result = execute_job(&job, &transport, &fast_settings(1), &CancelToken::new());
        assert_eq!(result.status, "404");
        assert!(!result.passed());
        assert!(result.message.contains("404"));
    }

    #[test]
    fn exhausted_retries_keep_last_status() {
        let transport = Scripted::statuses(&[500]);
        let settings = RunSettings::new(1, RetryPolicy::new(1, Duration::from_millis(100)));
        let result = execute_job(
            &job("GET", "/flaky", RequestBody::Empty),
            &transport,
            &settings,
            &CancelToken::new(),
        );
        assert_eq!(transport.calls(), 2);
        assert_eq!(result.status, "500");
        assert_eq!(result.retry_count, 1);
        assert!(result.message.contains("max retries exceeded"));
    }

    #[test]
    fn server_status_survives_a_final_timeout() {
        let transport = Scripted::new(vec![
            Ok(HttpResponse::new(503, Some("text/plain"), "busy")),
            Err(TransportError::Timeout("operation timed out".into())),
        ]);
        let settings = RunSettings::new(1, RetryPolicy::new(1, Duration::from_millis(100)));
        let result = execute_job(
            &job("GET", "/flaky", RequestBody::Empty),
            &transport,
            &settings,
            &CancelToken::new(),
        );
        assert_eq!(result.status, "503");
        assert!(!result.is_error());
        assert!(result.message.contains("max retries exceeded"));
        assert!(result.message.contains("timed out"));
    }

    #[test]
    fn transport_failure_is_err() {
        let transport = Scripted::new(vec![Err(TransportError::Connect(
            "Connection refused".into(),
        ))]);
        let result = execute_job(
            &job("GET", "/down", RequestBody::Empty),
            &transport,
            &fast_settings(1),
            &CancelToken::new(),
        );
        assert!(result.is_error());
        assert!(result.message.contains("Connection refused"));
    }

    #[test]
    fn full_progress_channel_does_not_block() {
        let (tx, rx) = mpsc::sync_channel(1);
        let results = run_jobs(
            echo_jobs(12),
            &Echo::default(),
            &fast_settings(3),
            Some(tx),
            &CancelToken::new(),
        );
        assert_eq!(results.len(), 12);
        let events: Vec<ProgressEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].completed, 1);
        assert_eq!(events[0].total, 12);
    }

    #[test]
    fn progress_reports_every_job_when_drained() {
        let (tx, rx) = mpsc::sync_channel(64);
        run_jobs(echo_jobs(5), &Echo::default(), &fast_settings(2), Some(tx), &CancelToken::new());
        let completed: Vec<usize> = rx.try_iter().map(|e| e.completed).collect();
        assert_eq!(completed, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn disconnected_progress_receiver_is_ignored() {
        let (tx, rx) = mpsc::sync_channel(1);
        drop(rx);
        let results = run_jobs(echo_jobs(4), &Echo::default(), &fast_settings(2), Some(tx), &CancelToken::new());
        assert_eq!(results.len(), 4);
    }

    #[test]
    fn cancelled_run_records_every_job() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let transport = Echo::default();
        let runner = TestRunner::new(fast_settings(2)).with_cancel(cancel);
        let results = runner.run(echo_jobs(6), &transport, None);

        assert_eq!(results.len(), 6);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        for r in &results {
            assert!(r.is_error());
            assert_eq!(r.message, "cancelled");
        }
        assert_eq!(results[2].endpoint, "http://test/items/202");
    }

    #[test]
    fn verbose_log_traces_attempts() {
        let transport = Scripted::new(vec![
            Ok(HttpResponse::new(503, Some("text/plain"), "busy")),
            Ok(HttpResponse::new(201, Some("application/json"), r#"{"id":1}"#)),
        ]);
        let settings =
            RunSettings::new(1, RetryPolicy::new(2, Duration::from_millis(100))).with_verbose(true);
        let result = execute_job(
            &job("POST", "/users", RequestBody::Json(br#"{"name":"x"}"#.to_vec())),
            &transport,
            &settings,
            &CancelToken::new(),
        );

        assert_eq!(result.retry_count, 1);
        let log = result.verbose_log.unwrap();
        assert!(log.starts_with("> POST http://test/users"));
        assert!(log.contains(r#"> {"name":"x"}"#));
        assert!(log.contains("attempt 1: 503"));
        assert!(log.contains("attempt 2: 201"));
        assert!(log.contains("< 201 application/json"));
        assert!(log.contains(r#"< {"id":1}"#));
    }

    #[test]
    fn verbose_log_absent_by_default() {
        let result = execute_job(
            &job("GET", "/quiet", RequestBody::Empty),
            &Scripted::statuses(&[200]),
            &fast_settings(1),
            &CancelToken::new(),
        );
        assert!(result.verbose_log.is_none());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "aé"; // 'é' is two bytes
        assert_eq!(truncate_utf8(s, 2), "a");
        assert_eq!(truncate_utf8(s, 3), "aé");
        assert_eq!(truncate_utf8("abc", 10), "abc");
        let long = "ü".repeat(3000);
        assert!(truncate_utf8(&long, LOG_BODY_LIMIT).len() <= LOG_BODY_LIMIT);
    }

    #[test]
    fn concurrency_resolution() {
        assert_eq!(effective_concurrency(3), 3);
        assert_eq!(effective_concurrency(64), 64);
        let auto = effective_concurrency(0);
        assert!((1..=MAX_AUTO_CONCURRENCY).contains(&auto));
        assert_eq!(effective_concurrency(-5), auto);
    }

    #[test]
    fn missing_document_is_fatal() {
        let config = Config {
            spec: "/nonexistent/openapi.yaml".into(),
            ..Config::default()
        };
        let err = run_spec(&config, None, CancelToken::new()).unwrap_err();
        assert!(matches!(err, RunError::Spec(SpecError::Io(_))));
    }
}
