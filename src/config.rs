//! Client configuration.
//!
//! Values come from the environment first, then from the credential store
//! (backend URL saved at setup time), then from built-in defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{PosError, PosResult};
use crate::storage::{CredentialStore, KEY_API_URL};

pub const ENV_API_URL: &str = "TPV_API_URL";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "TPV_HTTP_TIMEOUT_SECS";
pub const ENV_LOG_DIR: &str = "TPV_LOG_DIR";

const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default timeout for API requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub log_dir: PathBuf,
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            request_timeout: DEFAULT_TIMEOUT,
            log_dir: default_log_dir(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn from_env(store: &dyn CredentialStore) -> PosResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), store)
    }

    /// Resolve the configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F, store: &dyn CredentialStore) -> PosResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let base_url = non_empty(ENV_API_URL)
            .or_else(|| store.get(KEY_API_URL))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let request_timeout = match non_empty(ENV_HTTP_TIMEOUT_SECS) {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| {
                    PosError::Config(format!("{ENV_HTTP_TIMEOUT_SECS} must be whole seconds, got {raw:?}"))
                })?;
                if secs == 0 {
                    return Err(PosError::Config(format!(
                        "{ENV_HTTP_TIMEOUT_SECS} must be greater than zero"
                    )));
                }
                Duration::from_secs(secs)
            }
            None => DEFAULT_TIMEOUT,
        };

        let log_dir = non_empty(ENV_LOG_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(default_log_dir);

        Ok(Self {
            base_url: normalize_base_url(&base_url),
            request_timeout,
            log_dir,
        })
    }
}

/// Normalise the backend URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes
pub fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }

    url
}

pub fn default_log_dir() -> PathBuf {
    let base = std::env::var("LOCALAPPDATA")
        .or_else(|_| std::env::var("XDG_DATA_HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            #[cfg(target_os = "windows")]
            {
                PathBuf::from(std::env::var("USERPROFILE").unwrap_or_else(|_| ".".into()))
                    .join("AppData")
                    .join("Local")
            }
            #[cfg(not(target_os = "windows"))]
            {
                PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
                    .join(".local")
                    .join("share")
            }
        });
    base.join("tpv-pos-client").join("logs")
}
