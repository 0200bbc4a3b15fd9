use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::cases::DEFAULT_MAX_IMAGE_BYTES;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8081;
const DEFAULT_CLASSIFIER_TIMEOUT_SECS: u64 = 30;
const DEFAULT_NOTIFY_MAX_ATTEMPTS: u32 = 3;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    DynamoDb { cases_table: String },
}

impl StoreBackend {
    pub fn name(&self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::DynamoDb { .. } => "dynamodb",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub store: StoreBackend,
    pub classifier_url: Url,
    pub classifier_timeout: Duration,
    pub notify_webhook_url: Option<Url>,
    pub notify_max_attempts: u32,
    pub policy_path: Option<PathBuf>,
    pub max_image_bytes: usize,
}

impl AppConfig {
    /// Reads `.env` if present, then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let store_kind = get("CASE_STORE").map(|kind| kind.to_ascii_lowercase());
        let store = match store_kind.as_deref() {
            None | Some("memory") => StoreBackend::Memory,
            Some("dynamodb") => StoreBackend::DynamoDb {
                cases_table: get("DYNAMODB_CASES_TABLE")
                    .ok_or(ConfigError::Missing("DYNAMODB_CASES_TABLE"))?,
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "CASE_STORE",
                    reason: format!("expected 'memory' or 'dynamodb', got '{}'", other),
                });
            }
        };

        let classifier_url = parse_url(
            "CLASSIFIER_URL",
            &get("CLASSIFIER_URL").ok_or(ConfigError::Missing("CLASSIFIER_URL"))?,
        )?;
        let notify_webhook_url = get("NOTIFY_WEBHOOK_URL")
            .map(|raw| parse_url("NOTIFY_WEBHOOK_URL", &raw))
            .transpose()?;

        let timeout_secs: u64 = parse_or(
            "CLASSIFIER_TIMEOUT_SECS",
            get("CLASSIFIER_TIMEOUT_SECS"),
            DEFAULT_CLASSIFIER_TIMEOUT_SECS,
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "CLASSIFIER_TIMEOUT_SECS",
                reason: "must be greater than zero".to_string(),
            });
        }
        let notify_max_attempts: u32 = parse_or(
            "NOTIFY_MAX_ATTEMPTS",
            get("NOTIFY_MAX_ATTEMPTS"),
            DEFAULT_NOTIFY_MAX_ATTEMPTS,
        )?;
        if notify_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "NOTIFY_MAX_ATTEMPTS",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or("PORT", get("PORT"), DEFAULT_PORT)?,
            store,
            classifier_url,
            classifier_timeout: Duration::from_secs(timeout_secs),
            notify_webhook_url,
            notify_max_attempts,
            policy_path: get("TRIAGE_POLICY_PATH").map(PathBuf::from),
            max_image_bytes: parse_or(
                "MAX_IMAGE_BYTES",
                get("MAX_IMAGE_BYTES"),
                DEFAULT_MAX_IMAGE_BYTES,
            )?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ConfigError::Invalid {
            name,
            reason: format!("unsupported scheme '{}'", scheme),
        }),
    }
}

fn parse_or<T>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_with_only_classifier_url() {
        let cfg = config(&[("CLASSIFIER_URL", "http://localhost:9000/classify")]).unwrap();
        assert_eq!(cfg.bind_address(), "0.0.0.0:8081");
        assert_eq!(cfg.store, StoreBackend::Memory);
        assert_eq!(cfg.classifier_timeout, Duration::from_secs(30));
        assert_eq!(cfg.notify_max_attempts, 3);
        assert_eq!(cfg.max_image_bytes, 10 * 1024 * 1024);
        assert!(cfg.notify_webhook_url.is_none());
        assert!(cfg.policy_path.is_none());
    }

    #[test]
    fn classifier_url_is_required_and_validated() {
        assert_eq!(config(&[]), Err(ConfigError::Missing("CLASSIFIER_URL")));
        assert!(matches!(
            config(&[("CLASSIFIER_URL", "not a url")]),
            Err(ConfigError::Invalid { name: "CLASSIFIER_URL", .. })
        ));
        assert!(matches!(
            config(&[("CLASSIFIER_URL", "ftp://models.local/")]),
            Err(ConfigError::Invalid { name: "CLASSIFIER_URL", .. })
        ));
    }

    #[test]
    fn dynamodb_backend_needs_table() {
        let base = ("CLASSIFIER_URL", "http://localhost:9000");
        assert_eq!(
            config(&[base, ("CASE_STORE", "dynamodb")]),
            Err(ConfigError::Missing("DYNAMODB_CASES_TABLE"))
        );
        let cfg = config(&[base, ("CASE_STORE", "DynamoDB"), ("DYNAMODB_CASES_TABLE", "cases")]).unwrap();
        assert_eq!(
            cfg.store,
            StoreBackend::DynamoDb {
                cases_table: "cases".into()
            }
        );
        assert!(matches!(
            config(&[base, ("CASE_STORE", "postgres")]),
            Err(ConfigError::Invalid { name: "CASE_STORE", .. })
        ));
    }

    #[test]
    fn numeric_values_are_parsed() {
        let cfg = config(&[
            ("CLASSIFIER_URL", "https://classifier.internal/predict"),
            ("PORT", "9090"),
            ("CLASSIFIER_TIMEOUT_SECS", "5"),
            ("NOTIFY_MAX_ATTEMPTS", "7"),
            ("NOTIFY_WEBHOOK_URL", "https://hooks.example.org/triage"),
            ("MAX_IMAGE_BYTES", "1024"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 9090);
        assert_eq!(cfg.classifier_timeout, Duration::from_secs(5));
        assert_eq!(cfg.notify_max_attempts, 7);
        assert_eq!(cfg.max_image_bytes, 1024);
        assert!(cfg.notify_webhook_url.is_some());

        assert!(matches!(
            config(&[("CLASSIFIER_URL", "http://x"), ("PORT", "eighty")]),
            Err(ConfigError::Invalid { name: "PORT", .. })
        ));
        assert!(matches!(
            config(&[("CLASSIFIER_URL", "http://x"), ("NOTIFY_MAX_ATTEMPTS", "0")]),
            Err(ConfigError::Invalid { name: "NOTIFY_MAX_ATTEMPTS", .. })
        ));
    }
}
