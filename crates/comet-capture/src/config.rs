//! Configuration for the capture layer.
//!
//! Credentials and the ingestion endpoint are always supplied at startup,
//! either through the builder or from the environment via
//! [`CaptureConfig::from_env`].

use crate::filter::StaticAssetFilter;
use crate::forward::DeliveryMode;
use crate::settings::CaptureSettings;
use http::header::HeaderName;
use http::Uri;
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

/// Default timeout for one forwarding request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default key the record is nested under in the forwarded payload.
pub const DEFAULT_ENVELOPE: &str = "log";

/// Error type for configuration failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variables could not be deserialized.
    #[error("Configuration error: {0}")]
    Env(#[from] envy::Error),

    /// A required setting was not provided.
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    /// The ingestion endpoint is not an absolute http(s) URL.
    #[error("Invalid ingestion endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// The credential header name is not a legal HTTP header name.
    #[error("Invalid credential header name {0:?}")]
    InvalidHeaderName(String),

    /// The API key cannot be sent as a header value.
    #[error("API key contains characters not allowed in an HTTP header")]
    InvalidApiKey,

    /// The outbound HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// How the API key is attached to forwarding requests
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CredentialStyle {
    /// `Authorization: Bearer <api key>`
    #[default]
    Bearer,
    /// `<header>: <api key>`
    Header(String),
}

/// Configuration for [`CaptureLayer`](crate::CaptureLayer).
///
/// ```ignore
/// use comet_capture::{CaptureConfig, CredentialStyle, DeliveryMode};
/// use std::time::Duration;
///
/// let config = CaptureConfig::new(api_key, "storefront", "https://ingest.example.com/v1/logs")
///     .credential_style(CredentialStyle::Header("x-api-key".into()))
///     .timeout(Duration::from_secs(2))
///     .delivery_mode(DeliveryMode::Detached)
///     .redact_header("authorization");
/// ```
#[derive(Clone)]
pub struct CaptureConfig {
    pub(crate) api_key: String,
    pub(crate) project_id: String,
    pub(crate) endpoint: String,

    /// Default: bearer token.
    pub(crate) credential_style: CredentialStyle,

    /// Key wrapping the record in the payload; `None` sends it flat. Default: `"log"`.
    pub(crate) envelope: Option<String>,

    /// Capture static assets too. Default: false.
    pub(crate) send_all_traffic: bool,

    pub(crate) filter: StaticAssetFilter,

    /// Per forwarding request. Default: 5 seconds.
    pub(crate) timeout: Duration,

    /// Default: inline.
    pub(crate) delivery_mode: DeliveryMode,

    /// Longest body snapshot kept in the record; delivery is never truncated.
    /// Default: unlimited.
    pub(crate) max_body_size: Option<usize>,

    /// Lowercase request header names whose values are redacted in the record.
    pub(crate) redacted_headers: HashSet<String>,
}

impl CaptureConfig {
    /// Create a configuration with default values.
    ///
    /// Defaults:
    /// - Bearer credential
    /// - Record nested under `"log"`
    /// - Static assets skipped
    /// - 5 second forwarding timeout
    /// - Inline delivery
    /// - Unlimited body snapshots
    /// - No headers redacted
    pub fn new(
        api_key: impl Into<String>,
        project_id: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            project_id: project_id.into(),
            endpoint: endpoint.into(),
            credential_style: CredentialStyle::default(),
            envelope: Some(DEFAULT_ENVELOPE.to_string()),
            send_all_traffic: false,
            filter: StaticAssetFilter::new(),
            timeout: DEFAULT_TIMEOUT,
            delivery_mode: DeliveryMode::default(),
            max_body_size: None,
            redacted_headers: HashSet::new(),
        }
    }

    /// Load from `COMET_*` environment variables (after an optional `.env`) and validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        crate::settings::load_dotenv();
        CaptureSettings::from_env()?.into_config()
    }

    pub fn credential_style(mut self, style: CredentialStyle) -> Self {
        self.credential_style = style;
        self
    }

    /// Nest the record under `key`, or send it flat with `None`
    pub fn envelope(mut self, key: Option<impl Into<String>>) -> Self {
        self.envelope = key.map(Into::into);
        self
    }

    /// Capture every request, static assets included
    pub fn send_all_traffic(mut self, enabled: bool) -> Self {
        self.send_all_traffic = enabled;
        self
    }

    /// Also skip paths ending in `extension`
    pub fn static_extension(mut self, extension: impl AsRef<str>) -> Self {
        self.filter = self.filter.with_extension(extension);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn delivery_mode(mut self, mode: DeliveryMode) -> Self {
        self.delivery_mode = mode;
        self
    }

    pub fn max_body_size(mut self, limit: usize) -> Self {
        self.max_body_size = Some(limit);
        self
    }

    /// Replace the value of this request header with `[REDACTED]` in records
    pub fn redact_header(mut self, name: impl AsRef<str>) -> Self {
        self.redacted_headers
            .insert(name.as_ref().to_ascii_lowercase());
        self
    }

    /// Check that the configuration can be used to forward records.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Missing("api_key"));
        }
        if self.project_id.trim().is_empty() {
            return Err(ConfigError::Missing("project_id"));
        }
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::Missing("endpoint"));
        }

        let invalid = |reason: &str| ConfigError::InvalidEndpoint {
            endpoint: self.endpoint.clone(),
            reason: reason.to_string(),
        };
        let uri: Uri = self
            .endpoint
            .parse()
            .map_err(|e: http::uri::InvalidUri| invalid(&e.to_string()))?;
        match uri.scheme_str() {
            Some("http") | Some("https") => {}
            _ => return Err(invalid("scheme must be http or https")),
        }
        if uri.authority().is_none() {
            return Err(invalid("missing host"));
        }

        if let CredentialStyle::Header(name) = &self.credential_style {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ConfigError::InvalidHeaderName(name.clone()))?;
        }

        Ok(())
    }

    /// Whether a request for `path` should be captured
    pub fn should_capture(&self, path: &str) -> bool {
        self.send_all_traffic || !self.filter.is_static_asset(path)
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn envelope_key(&self) -> Option<&str> {
        self.envelope.as_deref()
    }

    pub fn timeout_duration(&self) -> Duration {
        self.timeout
    }

    pub fn mode(&self) -> DeliveryMode {
        self.delivery_mode
    }

    pub fn body_limit(&self) -> Option<usize> {
        self.max_body_size
    }

    pub fn sends_all_traffic(&self) -> bool {
        self.send_all_traffic
    }
}

impl fmt::Debug for CaptureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureConfig")
            .field("api_key", &"[REDACTED]")
            .field("project_id", &self.project_id)
            .field("endpoint", &self.endpoint)
            .field("credential_style", &self.credential_style)
            .field("envelope", &self.envelope)
            .field("send_all_traffic", &self.send_all_traffic)
            .field("timeout", &self.timeout)
            .field("delivery_mode", &self.delivery_mode)
            .field("max_body_size", &self.max_body_size)
            .field("redacted_headers", &self.redacted_headers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> CaptureConfig {
        CaptureConfig::new("key-123", "storefront", "https://ingest.example.com/v1/logs")
    }

    #[test]
    fn test_defaults() {
        let config = valid();
        assert_eq!(config.envelope_key(), Some("log"));
        assert_eq!(config.timeout_duration(), Duration::from_secs(5));
        assert_eq!(config.mode(), DeliveryMode::Inline);
        assert_eq!(config.credential_style, CredentialStyle::Bearer);
        assert!(!config.sends_all_traffic());
        assert!(config.body_limit().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_static_assets_skipped_unless_sending_all_traffic() {
        let config = valid();
        assert!(!config.should_capture("/styles/site.css"));
        assert!(config.should_capture("/api/products"));

        let config = valid().send_all_traffic(true);
        assert!(config.should_capture("/styles/site.css"));
    }

    #[test]
    fn test_extra_static_extension() {
        let config = valid().static_extension(".pdf");
        assert!(!config.should_capture("/docs/terms.PDF"));
    }

    #[test]
    fn test_missing_values_are_rejected() {
        let err = CaptureConfig::new(" ", "p", "https://x.test").validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("api_key")));

        let err = CaptureConfig::new("k", "", "https://x.test").validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("project_id")));

        let err = CaptureConfig::new("k", "p", "").validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("endpoint")));
    }

    #[test]
    fn test_endpoint_must_be_absolute_http() {
        for endpoint in ["ftp://x.test/logs", "/relative/path", "not a url"] {
            let err = CaptureConfig::new("k", "p", endpoint).validate().unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidEndpoint { .. }),
                "{endpoint} should be rejected"
            );
        }
        assert!(CaptureConfig::new("k", "p", "http://127.0.0.1:9000/ingest")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_invalid_credential_header_is_rejected() {
        let err = valid()
            .credential_style(CredentialStyle::Header("bad header".into()))
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidHeaderName(_)));
    }

    #[test]
    fn test_debug_hides_api_key() {
        let rendered = format!("{:?}", valid());
        assert!(!rendered.contains("key-123"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_redacted_headers_are_lowercased() {
        let config = valid().redact_header("X-Api-Key");
        assert!(config.redacted_headers.contains("x-api-key"));
    }

    #[test]
    fn test_envelope_can_be_disabled() {
        let config = valid().envelope(None::<String>);
        assert_eq!(config.envelope_key(), None);
        let config = valid().envelope(Some("event"));
        assert_eq!(config.envelope_key(), Some("event"));
    }
}
