use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::auth::{CredentialError, CredentialsRequest};

pub const DEFAULT_API_SERVER: &str = "https://api.mindsight.io/query";
pub const DEFAULT_TOKEN_URL: &str = "https://mindsight.auth0.com/oauth/token/";
pub const DEFAULT_AUDIENCE: &str = "https://api.mindsight.io/";

/// Variables the hosted agent reads its credentials from. Consulted when
/// neither the flag nor the `HOTPATH_*` variable is set.
pub const LEGACY_CLIENT_ID_ENV: &str = "MINDSIGHT_CLIENT_ID";
pub const LEGACY_CLIENT_SECRET_ENV: &str = "MINDSIGHT_CLIENT_SECRET";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Relay configuration. Every flag can also be given through the
/// environment variable named next to it.
#[derive(Debug, Clone, Parser)]
#[command(name = "hotpath-relay", version, about)]
pub struct Config {
    /// Address to bind the server to (empty binds all interfaces)
    #[arg(long, env = "HOTPATH_HOST", default_value = "")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "HOTPATH_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Number of sample batches to accumulate before sending
    #[arg(long = "cache", env = "HOTPATH_CACHE", default_value_t = 5)]
    pub cache_len: u64,

    /// URL of the collection API
    #[arg(long, env = "HOTPATH_SERVER", default_value = DEFAULT_API_SERVER)]
    pub server: String,

    /// OAuth2 token endpoint
    #[arg(long, env = "HOTPATH_TOKEN_URL", default_value = DEFAULT_TOKEN_URL)]
    pub token_url: String,

    /// Audience requested in the client-credentials exchange
    #[arg(long, env = "HOTPATH_AUDIENCE", default_value = DEFAULT_AUDIENCE)]
    pub audience: String,

    #[arg(long, env = "HOTPATH_CLIENT_ID", hide_env_values = true)]
    pub client_id: Option<String>,

    #[arg(long, env = "HOTPATH_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Test mode: dump accumulated samples to the log instead of sending them
    #[arg(long = "test", env = "HOTPATH_TEST_MODE")]
    pub test_mode: bool,

    /// Timeout for every outbound HTTP call, in seconds
    #[arg(long, env = "HOTPATH_TIMEOUT_SECS", default_value_t = 10)]
    pub timeout_secs: u64,

    /// Maximum accepted ingest body size, in bytes
    #[arg(long, env = "HOTPATH_BODY_LIMIT", default_value_t = 1024 * 1024)]
    pub body_limit: usize,

    #[arg(long, env = "HOTPATH_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Config {
    pub fn bind_addr(&self) -> String {
        let host = if self.host.is_empty() {
            "0.0.0.0"
        } else {
            self.host.as_str()
        };
        format!("{host}:{}", self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Client-credentials request built from the configured id and secret,
    /// falling back to `MINDSIGHT_CLIENT_ID` / `MINDSIGHT_CLIENT_SECRET`.
    ///
    /// # Errors
    ///
    /// [`CredentialError::Missing`] when either value is absent or empty.
    pub fn credentials(&self) -> Result<CredentialsRequest, CredentialError> {
        self.credentials_with(|name| std::env::var(name).ok())
    }

    /// Same as [`Config::credentials`] with the legacy variables read through
    /// `lookup`.
    pub fn credentials_with<F>(&self, lookup: F) -> Result<CredentialsRequest, CredentialError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let id = self
            .client_id
            .clone()
            .or_else(|| lookup(LEGACY_CLIENT_ID_ENV));
        let secret = self
            .client_secret
            .clone()
            .or_else(|| lookup(LEGACY_CLIENT_SECRET_ENV));

        match (id.as_deref(), secret.as_deref()) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => Ok(
                CredentialsRequest::client_credentials(id, secret, self.audience.as_str()),
            ),
            _ => Err(CredentialError::Missing(
                "must supply HOTPATH_CLIENT_ID and HOTPATH_CLIENT_SECRET \
                 (or MINDSIGHT_CLIENT_ID and MINDSIGHT_CLIENT_SECRET)"
                    .to_owned(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["hotpath-relay"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_match_the_hosted_service() {
        let config = parse(&["--client-id", "id", "--client-secret", "s"]);

        assert_eq!(config.port, 8000);
        assert_eq!(config.cache_len, 5);
        assert_eq!(config.server, DEFAULT_API_SERVER);
        assert_eq!(config.bind_addr(), "0.0.0.0:8000");
        assert!(!config.test_mode);
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[
            "--host", "127.0.0.1", "--port", "9100", "--cache", "2", "--test",
            "--log-format", "json",
        ]);

        assert_eq!(config.bind_addr(), "127.0.0.1:9100");
        assert_eq!(config.cache_len, 2);
        assert!(config.test_mode);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn credentials_require_id_and_secret() {
        let config = parse(&["--client-id", "id", "--client-secret", ""]);
        assert!(matches!(
            config.credentials_with(no_env),
            Err(CredentialError::Missing(_))
        ));

        let config = parse(&["--client-id", "id", "--client-secret", "s"]);
        let creds = config.credentials_with(no_env).unwrap();
        assert_eq!(creds.client_id, "id");
        assert_eq!(creds.audience, DEFAULT_AUDIENCE);
        assert_eq!(creds.grant_type, "client_credentials");
    }

    #[test]
    fn legacy_credential_variables_fill_in_missing_values() {
        let legacy = |name: &str| match name {
            LEGACY_CLIENT_ID_ENV => Some("legacy-id".to_owned()),
            LEGACY_CLIENT_SECRET_ENV => Some("legacy-secret".to_owned()),
            _ => None,
        };

        let config = parse(&[]);
        let creds = config.credentials_with(legacy).unwrap();
        assert_eq!(creds.client_id, "legacy-id");
        assert_eq!(creds.client_secret, "legacy-secret");

        // explicit values win over the legacy ones
        let config = parse(&["--client-id", "id"]);
        let creds = config.credentials_with(legacy).unwrap();
        assert_eq!(creds.client_id, "id");
        assert_eq!(creds.client_secret, "legacy-secret");
    }
}
