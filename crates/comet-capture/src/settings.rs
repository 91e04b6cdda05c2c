//! Capture settings read from `COMET_`-prefixed environment variables.
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `COMET_API_KEY` | ingestion credential | required |
//! | `COMET_PROJECT_ID` | project the records belong to | required |
//! | `COMET_ENDPOINT` | ingestion URL | required |
//! | `COMET_SEND_ALL_TRAFFIC` | capture static assets too | `false` |
//! | `COMET_TIMEOUT_MS` | forwarding timeout | `5000` |
//! | `COMET_CREDENTIAL_HEADER` | send the key in this header instead of `Authorization: Bearer` | unset |
//! | `COMET_ENVELOPE` | payload envelope key, empty to send the record flat | `log` |
//! | `COMET_DETACHED` | forward on a spawned task instead of inline | `false` |
//! | `COMET_MAX_BODY_SIZE` | longest body snapshot in bytes | unlimited |
//! | `COMET_REDACT_HEADERS` | comma-separated request headers to redact | unset |
//! | `COMET_STATIC_EXTENSIONS` | comma-separated extra static extensions | unset |

use crate::config::{CaptureConfig, ConfigError, CredentialStyle};
use crate::forward::DeliveryMode;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Prefix shared by every capture variable.
pub const ENV_PREFIX: &str = "COMET_";

/// Raw settings as they appear in the environment
#[derive(Clone, Default, Deserialize)]
pub struct CaptureSettings {
    pub api_key: Option<String>,
    pub project_id: Option<String>,
    pub endpoint: Option<String>,
    #[serde(default)]
    pub send_all_traffic: bool,
    pub timeout_ms: Option<u64>,
    pub credential_header: Option<String>,
    pub envelope: Option<String>,
    #[serde(default)]
    pub detached: bool,
    pub max_body_size: Option<usize>,
    #[serde(default)]
    pub redact_headers: Vec<String>,
    #[serde(default)]
    pub static_extensions: Vec<String>,
}

impl CaptureSettings {
    /// Read settings from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(envy::prefixed(ENV_PREFIX).from_env::<Self>()?)
    }

    /// Read settings from explicit `(name, value)` pairs
    pub fn from_iter<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Ok(envy::prefixed(ENV_PREFIX).from_iter::<_, Self>(vars)?)
    }

    /// Turn the settings into a validated [`CaptureConfig`]
    pub fn into_config(self) -> Result<CaptureConfig, ConfigError> {
        let api_key = required(self.api_key, "COMET_API_KEY")?;
        let project_id = required(self.project_id, "COMET_PROJECT_ID")?;
        let endpoint = required(self.endpoint, "COMET_ENDPOINT")?;

        let mut config = CaptureConfig::new(api_key, project_id, endpoint)
            .send_all_traffic(self.send_all_traffic);

        if let Some(ms) = self.timeout_ms {
            config = config.timeout(Duration::from_millis(ms));
        }
        if let Some(header) = self.credential_header.filter(|h| !h.trim().is_empty()) {
            config = config.credential_style(CredentialStyle::Header(header.trim().to_string()));
        }
        if let Some(envelope) = self.envelope {
            let envelope = envelope.trim().to_string();
            config = config.envelope((!envelope.is_empty()).then_some(envelope));
        }
        if self.detached {
            config = config.delivery_mode(DeliveryMode::Detached);
        }
        if let Some(limit) = self.max_body_size {
            config = config.max_body_size(limit);
        }
        for header in self.redact_headers.iter().map(|h| h.trim()).filter(|h| !h.is_empty()) {
            config = config.redact_header(header);
        }
        for ext in self.static_extensions.iter().map(|e| e.trim()) {
            config = config.static_extension(ext);
        }

        config.validate()?;
        Ok(config)
    }
}

impl fmt::Debug for CaptureSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("project_id", &self.project_id)
            .field("endpoint", &self.endpoint)
            .field("send_all_traffic", &self.send_all_traffic)
            .field("timeout_ms", &self.timeout_ms)
            .field("credential_header", &self.credential_header)
            .field("envelope", &self.envelope)
            .field("detached", &self.detached)
            .field("max_body_size", &self.max_body_size)
            .field("redact_headers", &self.redact_headers)
            .field("static_extensions", &self.static_extensions)
            .finish()
    }
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

/// Load variables from a `.env` file in the current directory, if present.
///
/// Existing environment variables take precedence over `.env` values.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => debug!(path = %path.display(), "Loaded environment file"),
        Err(err) if err.not_found() => {}
        Err(err) => warn!(error = %err, "Ignoring unreadable environment file"),
    }
}
