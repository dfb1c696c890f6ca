//! Credentials attached identically to every request of a run

use serde::{Deserialize, Serialize};

/// Header used for API keys when no name is configured.
pub const DEFAULT_API_KEY_NAME: &str = "X-API-Key";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    #[default]
    None,
    Bearer,
    ApiKey,
    Basic,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyLocation {
    #[default]
    Header,
    Query,
}

/// Authentication settings.
///
/// ```toml
/// [auth]
/// type = "api_key"
/// token = "secret"
/// api_key_location = "query"
/// api_key_name = "key"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(rename = "type", default)]
    pub auth_type: AuthType,
    /// Bearer token or API key value
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub api_key_location: ApiKeyLocation,
    #[serde(default)]
    pub api_key_name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// What the transport must attach to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Header { name: String, value: String },
    Query { name: String, value: String },
    Basic { username: String, password: String },
}

impl AuthConfig {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            auth_type: AuthType::Bearer,
            token: token.into(),
            ..Self::default()
        }
    }

    pub fn api_key(
        location: ApiKeyLocation,
        name: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            auth_type: AuthType::ApiKey,
            token: key.into(),
            api_key_location: location,
            api_key_name: name.into(),
            ..Self::default()
        }
    }

    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            auth_type: AuthType::Basic,
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    /// Resolve the credential to attach, if any.
    #[must_use]
    pub fn credential(&self) -> Option<Credential> {
        match self.auth_type {
            AuthType::None => None,
            AuthType::Bearer => Some(Credential::Header {
                name: "Authorization".to_string(),
                value: format!("Bearer {}", self.token),
            }),
            AuthType::ApiKey => {
                let name = if self.api_key_name.is_empty() {
                    DEFAULT_API_KEY_NAME.to_string()
                } else {
                    self.api_key_name.clone()
                };
                let value = self.token.clone();
                Some(match self.api_key_location {
                    ApiKeyLocation::Header => Credential::Header { name, value },
                    ApiKeyLocation::Query => Credential::Query { name, value },
                })
            }
            AuthType::Basic => Some(Credential::Basic {
                username: self.username.clone(),
                password: self.password.clone(),
            }),
        }
    }

    /// Short description safe for logs: never includes the secret.
    #[must_use]
    pub fn describe(&self) -> String {
        match (self.auth_type, self.api_key_location) {
            (AuthType::None, _) => "none".to_string(),
            (AuthType::Bearer, _) => "bearer token".to_string(),
            (AuthType::ApiKey, ApiKeyLocation::Header) => "api key (header)".to_string(),
            (AuthType::ApiKey, ApiKeyLocation::Query) => "api key (query)".to_string(),
            (AuthType::Basic, _) => format!("basic ({})", self.username),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_attaches_nothing() {
        assert_eq!(AuthConfig::default().credential(), None);
    }

    #[test]
    fn bearer_sets_authorization_header() {
        assert_eq!(
            AuthConfig::bearer("t0k").credential(),
            Some(Credential::Header {
                name: "Authorization".into(),
                value: "Bearer t0k".into()
            })
        );
    }

    #[test]
    fn api_key_header_defaults_name() {
        let auth = AuthConfig::api_key(ApiKeyLocation::Header, "", "k");
        assert_eq!(
            auth.credential(),
            Some(Credential::Header {
                name: DEFAULT_API_KEY_NAME.into(),
                value: "k".into()
            })
        );
    }

    #[test]
    fn api_key_query() {
        let auth = AuthConfig::api_key(ApiKeyLocation::Query, "key", "abc");
        assert_eq!(
            auth.credential(),
            Some(Credential::Query {
                name: "key".into(),
                value: "abc".into()
            })
        );
    }

    #[test]
    fn basic_credentials() {
        let auth = AuthConfig::basic("alice", "pw");
        assert_eq!(
            auth.credential(),
            Some(Credential::Basic {
                username: "alice".into(),
                password: "pw".into()
            })
        );
        assert_eq!(auth.describe(), "basic (alice)");
    }

    #[test]
    fn describe_hides_secrets() {
        let auth = AuthConfig::bearer("very-secret");
        assert!(!auth.describe().contains("very-secret"));
    }
}
