//! apiprobe CLI - synthetic contract tests from an OpenAPI document

mod logger;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc;
use std::thread;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use apiprobe_core::report::{generate_schema, write_report};
use apiprobe_core::{Config, OptionalFields, ProgressEvent, RunReport, TestResult};
use apiprobe_runner::{CancelToken, effective_concurrency, run_spec};

use logger::{LogLevel, init_logger};

/// Progress events buffered before the printer starts dropping them.
const PROGRESS_BUFFER: usize = 64;

#[derive(Parser)]
#[command(name = "apiprobe")]
#[command(about = "Run synthetic contract tests against an API from its OpenAPI document")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, global = true, default_value = "terminal")]
    output: OutputFormat,

    /// Diagnostic log level (RUST_LOG overrides)
    #[arg(long, global = true, default_value = "warn")]
    log_level: LogLevel,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one synthesized request per operation and check the responses
    Run(RunArgs),

    /// Initialize config file
    Init,

    /// Export JSON Schema for the run report
    Schema,
}

/// Flags override the config file.
#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Config file (default: .apiprobe.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Server to test
    #[arg(long)]
    base_url: Option<String>,

    /// OpenAPI document (JSON or YAML)
    #[arg(long)]
    spec: Option<PathBuf>,

    /// Parallel requests (0 = one per core, at most 10)
    #[arg(short, long, allow_negative_numbers = true)]
    concurrency: Option<i64>,

    /// Retries after a 5xx or network failure (negative means none)
    #[arg(long, allow_negative_numbers = true)]
    retries: Option<i64>,

    /// First backoff delay in milliseconds (doubles per retry)
    #[arg(long)]
    retry_delay_ms: Option<u64>,

    /// Seed for reproducible request bodies
    #[arg(long)]
    seed: Option<u64>,

    /// Inclusion of optional body properties
    #[arg(long)]
    optional_fields: Option<OptionalFieldsArg>,

    /// Write a JSON report to this path
    #[arg(long)]
    export: Option<PathBuf>,

    /// Attach a request/response trace to every result
    #[arg(short, long)]
    verbose: bool,
}

impl RunArgs {
    fn apply(&self, cfg: &mut Config) {
        if let Some(base_url) = &self.base_url {
            cfg.base_url.clone_from(base_url);
        }
        if let Some(spec) = &self.spec {
            cfg.spec.clone_from(spec);
        }
        if let Some(concurrency) = self.concurrency {
            cfg.concurrency = concurrency;
        }
        if let Some(retries) = self.retries {
            cfg.max_retries = retries;
        }
        if let Some(delay) = self.retry_delay_ms {
            cfg.initial_delay_ms = delay;
        }
        if self.seed.is_some() {
            cfg.seed = self.seed;
        }
        if let Some(mode) = self.optional_fields {
            cfg.optional_fields = mode.into();
        }
        cfg.verbose |= self.verbose;
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OptionalFieldsArg {
    Random,
    Always,
    Never,
}

impl From<OptionalFieldsArg> for OptionalFields {
    fn from(arg: OptionalFieldsArg) -> Self {
        match arg {
            OptionalFieldsArg::Random => OptionalFields::Random,
            OptionalFieldsArg::Always => OptionalFields::Always,
            OptionalFieldsArg::Never => OptionalFields::Never,
        }
    }
}

#[derive(Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Terminal,
    Json,
    Silent,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.log_level);

    match run(cli) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(3)
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Run(args) => run_tests(&args, cli.output),

        Commands::Init => {
            let config_path = ".apiprobe.toml";
            if Path::new(config_path).exists() {
                eprintln!("{config_path} already exists");
                return Ok(1);
            }

            std::fs::write(config_path, Config::example())?;
            println!("Created {config_path}");
            println!("\nEdit the file to configure:");
            println!("  - spec: path to your OpenAPI document");
            println!("  - base_url: server to test");
            println!("  - auth: bearer token, API key, or basic credentials");
            println!("  - concurrency / max_retries: pool size and retry budget");
            Ok(0)
        }

        Commands::Schema => {
            println!("{}", generate_schema());
            Ok(0)
        }
    }
}

fn run_tests(args: &RunArgs, output: OutputFormat) -> Result<i32> {
    let mut cfg = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    args.apply(&mut cfg);

    if output != OutputFormat::Silent {
        eprintln!("Config:");
        eprintln!("  spec:        {}", cfg.spec.display());
        eprintln!("  base_url:    {}", cfg.base_url);
        eprintln!("  concurrency: {}", effective_concurrency(cfg.concurrency));
        eprintln!("  retries:     {}", cfg.retry_policy().max_retries);
        eprintln!("  auth:        {}", cfg.auth.describe());
        if !cfg.headers.is_empty() {
            eprintln!("  headers:     {} configured", cfg.headers.len());
        }
        eprintln!();
    }

    // Progress lines only make sense on a terminal
    let (progress, printer) = if output == OutputFormat::Terminal {
        let (tx, rx) = mpsc::sync_channel::<ProgressEvent>(PROGRESS_BUFFER);
        let printer = thread::spawn(move || {
            for event in rx {
                eprintln!(
                    "[{}/{}] {} {} -> {}",
                    event.completed,
                    event.total,
                    event.latest.method,
                    event.latest.endpoint,
                    event.latest.status
                );
            }
        });
        (Some(tx), Some(printer))
    } else {
        (None, None)
    };

    let started = Instant::now();
    let results = run_spec(&cfg, progress, CancelToken::new())
        .with_context(|| format!("run against {}", cfg.base_url))?;
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    if let Some(printer) = printer {
        let _ = printer.join();
    }

    let report = RunReport::new(
        cfg.base_url.clone(),
        cfg.spec.display().to_string(),
        duration_ms,
        results,
    );
    tracing::debug!(
        total = report.summary.total,
        duration_ms,
        "run complete"
    );

    match output {
        OutputFormat::Terminal => print_terminal(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Silent => {}
    }

    if let Some(path) = &args.export {
        write_report(&report, path)?;
        if output != OutputFormat::Silent {
            eprintln!("Report written: {}", path.display());
        }
    }

    Ok(exit_code(&report))
}

/// 0 when every operation passed, 1 otherwise.
fn exit_code(report: &RunReport) -> i32 {
    i32::from(!report.summary.all_passed())
}

fn print_terminal(report: &RunReport) {
    println!(
        "\n{:<8} {:<6} {:>7} {:>8}  ENDPOINT",
        "METHOD", "STATUS", "RETRIES", "TIME"
    );
    for r in &report.results {
        print_result(r);
    }

    let s = &report.summary;
    let icon = if s.all_passed() { "PASS" } else { "FAIL" };
    println!(
        "\n{icon}: {} total, {} passed, {} failed, {} errors ({}ms)",
        s.total, s.passed, s.failed, s.errors, report.duration_ms
    );
}

fn print_result(r: &TestResult) {
    println!(
        "{:<8} {:<6} {:>7} {:>6}ms  {}",
        r.method, r.status, r.retry_count, r.duration_ms, r.endpoint
    );
    if !r.passed() {
        println!("         {}", r.message);
    }
    if let Some(log) = &r.verbose_log {
        for line in log.lines() {
            println!("           {line}");
        }
    }
}
