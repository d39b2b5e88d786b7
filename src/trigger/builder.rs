//! Builder pattern for trigger configuration.
//!
//! Provides a fluent API for configuring and creating [`Trigger`] instances,
//! plus [`TriggerConfig`] for hosts that hand over JSON parameters.
//!
//! # Example
//!
//! ```no_run
//! use websocket_trigger::Trigger;
//!
//! # async fn example() -> websocket_trigger::Result<()> {
//! let trigger = Trigger::builder()
//!     .endpoint("wss://feed.example.com/stream")
//!     .parameter("accessCode", "abc-123")
//!     .sink(|message| println!("{message:?}"))
//!     .build()?;
//!
//! trigger.manual_trigger().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::error::{Error, Result};
use crate::handshake::{HandshakeExecutor, Parameters, StaticState};
use crate::identifiers::TriggerId;
use crate::protocol::DecodedMessage;
use crate::transport::EventSink;
use crate::transport::lifecycle::LifecycleConfig;

use super::core::Trigger;
use super::credentials::{AuthContext, CredentialSource};
use super::options::{ExecutionMode, TriggerOptions};

// ============================================================================
// TriggerConfig
// ============================================================================

/// Host-supplied configuration, as deserialized from JSON.
///
/// ```json
/// {
///   "endpoint": "wss://feed.example.com/stream",
///   "openScript": "send({ action = \"subscribe\" })",
///   "reconnectDelayMs": 2000,
///   "parameters": { "accessCode": "abc-123" }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TriggerConfig {
    /// WebSocket URI (`ws://` or `wss://`).
    pub endpoint: String,

    /// Open-event script source. `None` uses the default registration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_script: Option<String>,

    /// Reconnect delay in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_delay_ms: Option<u64>,

    /// Connect timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,

    /// Reply timeout in milliseconds for `send(data, true)`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_timeout_ms: Option<u64>,

    /// Host execution mode.
    pub mode: ExecutionMode,

    /// Named values readable through `get_parameter`.
    pub parameters: Map<String, Value>,
}

// ============================================================================
// TriggerBuilder
// ============================================================================

/// Builder for configuring a [`Trigger`] instance.
///
/// Use [`Trigger::builder()`] to create a new builder.
#[derive(Default)]
pub struct TriggerBuilder {
    /// Raw endpoint, validated on build.
    endpoint: Option<String>,
    /// Open-event script source.
    open_script: Option<String>,
    /// Credential collaborator.
    credentials: Option<Arc<dyn CredentialSource>>,
    /// Host parameters.
    parameters: Parameters,
    /// Per-trigger state shared across reconnects.
    static_state: Option<StaticState>,
    /// Timing and mode.
    options: TriggerOptions,
    /// Ingestion sink.
    sink: Option<EventSink>,
}

impl fmt::Debug for TriggerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerBuilder")
            .field("endpoint", &self.endpoint)
            .field("open_script", &self.open_script.as_ref().map(String::len))
            .field("credentials", &self.credentials.is_some())
            .field("parameters", &self.parameters.len())
            .field("options", &self.options)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

// ============================================================================
// TriggerBuilder Implementation
// ============================================================================

impl TriggerBuilder {
    /// Creates a new builder with no configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder pre-filled from host configuration.
    #[must_use]
    pub fn from_config(config: TriggerConfig) -> Self {
        let mut options = TriggerOptions::new().with_mode(config.mode);
        if let Some(ms) = config.reconnect_delay_ms {
            options = options.with_reconnect_delay(Duration::from_millis(ms));
        }
        if let Some(ms) = config.connect_timeout_ms {
            options = options.with_connect_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = config.reply_timeout_ms {
            options = options.with_reply_timeout(Duration::from_millis(ms));
        }

        Self {
            endpoint: Some(config.endpoint),
            open_script: config.open_script,
            parameters: config.parameters,
            options,
            ..Self::default()
        }
    }

    /// Sets the WebSocket URI.
    #[inline]
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the open-event script source.
    #[inline]
    #[must_use]
    pub fn open_script(mut self, source: impl Into<String>) -> Self {
        self.open_script = Some(source.into());
        self
    }

    /// Sets the credential collaborator.
    #[inline]
    #[must_use]
    pub fn credentials(mut self, source: impl CredentialSource + 'static) -> Self {
        self.credentials = Some(Arc::new(source));
        self
    }

    /// Adds one host parameter.
    #[inline]
    #[must_use]
    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Replaces all host parameters.
    #[inline]
    #[must_use]
    pub fn parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Shares an existing static state store with the trigger.
    #[inline]
    #[must_use]
    pub fn static_state(mut self, state: StaticState) -> Self {
        self.static_state = Some(state);
        self
    }

    /// Sets all timing and mode options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: TriggerOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the reconnect delay.
    #[inline]
    #[must_use]
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.options.reconnect_delay = delay;
        self
    }

    /// Sets the execution mode.
    #[inline]
    #[must_use]
    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.options.mode = mode;
        self
    }

    /// Sets the ingestion sink.
    #[inline]
    #[must_use]
    pub fn sink(mut self, sink: impl Fn(DecodedMessage) + Send + Sync + 'static) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Builds the trigger with validation. Does not connect.
    ///
    /// Credentials are resolved here, once.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the endpoint is missing, malformed, or not `ws`/`wss`
    /// - [`Error::Config`] if no sink is set
    pub fn build(self) -> Result<Trigger> {
        let endpoint = self.validate_endpoint()?;
        let sink = self.sink.clone().ok_or_else(|| {
            Error::config(
                "Sink is required. Use .sink() to receive decoded messages.\n\
                 Example: Trigger::builder().sink(|message| println!(\"{message:?}\"))",
            )
        })?;

        let executor = match self.open_script {
            Some(source) => HandshakeExecutor::new(source),
            None => HandshakeExecutor::default(),
        };

        let config = LifecycleConfig {
            trigger_id: TriggerId::new(),
            endpoint,
            options: self.options,
            executor,
            auth: AuthContext::resolve(self.credentials.as_deref()),
            parameters: Arc::new(self.parameters),
            static_state: self.static_state.unwrap_or_default(),
            sink,
        };

        Ok(Trigger::new(config))
    }

    /// Builds the trigger and, in manual mode, connects during setup.
    ///
    /// # Errors
    ///
    /// Anything [`build`](Self::build) returns, plus the first cycle's
    /// connection or handshake error in manual mode.
    pub async fn spawn(self) -> Result<Trigger> {
        let trigger = self.build()?;
        if trigger.mode().starts_immediately() {
            trigger.manual_trigger().await?;
        }
        Ok(trigger)
    }
}

// ============================================================================
// Validation
// ============================================================================

impl TriggerBuilder {
    /// Validates the endpoint configuration.
    fn validate_endpoint(&self) -> Result<Url> {
        let raw = self
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                Error::config(
                    "Endpoint is required. Use .endpoint() to set it.\n\
                     Example: Trigger::builder().endpoint(\"wss://feed.example.com\")",
                )
            })?;

        let url = Url::parse(raw)
            .map_err(|e| Error::config(format!("Invalid endpoint '{raw}': {e}")))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "Endpoint scheme must be ws or wss, got '{}'",
                url.scheme()
            )));
        }

        if url.host_str().is_none() {
            return Err(Error::config(format!("Endpoint '{raw}' has no host")));
        }

        Ok(url)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn with_sink(builder: TriggerBuilder) -> TriggerBuilder {
        builder.sink(|_| {})
    }

    #[test]
    fn test_new_creates_empty_builder() {
        let builder = TriggerBuilder::new();
        assert!(builder.endpoint.is_none());
        assert!(builder.open_script.is_none());
        assert!(builder.sink.is_none());
        assert!(builder.parameters.is_empty());
    }

    #[test]
    fn test_missing_endpoint_fails() {
        let err = with_sink(TriggerBuilder::new()).build().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("Endpoint is required"));
    }

    #[test]
    fn test_blank_endpoint_fails() {
        let err = with_sink(TriggerBuilder::new().endpoint("   ")).build().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_malformed_endpoint_fails() {
        let err = with_sink(TriggerBuilder::new().endpoint("not a url"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Invalid endpoint"));
    }

    #[test]
    fn test_http_scheme_rejected() {
        let err = with_sink(TriggerBuilder::new().endpoint("https://example.com"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("ws or wss"));
    }

    #[test]
    fn test_missing_sink_fails() {
        let err = TriggerBuilder::new()
            .endpoint("ws://127.0.0.1:9000")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Sink is required"));
    }

    #[test]
    fn test_parameters_accumulate() {
        let builder = TriggerBuilder::new()
            .parameter("accessCode", "abc")
            .parameter("limit", 5);
        assert_eq!(builder.parameters.get("accessCode"), Some(&json!("abc")));
        assert_eq!(builder.parameters.get("limit"), Some(&json!(5)));
    }

    #[test]
    fn test_config_deserializes_camel_case() {
        let config: TriggerConfig = serde_json::from_value(json!({
            "endpoint": "wss://feed.example.com/stream",
            "openScript": "send(\"hi\")",
            "reconnectDelayMs": 250,
            "replyTimeoutMs": 1000,
            "mode": "manual",
            "parameters": { "accessCode": "abc" }
        }))
        .unwrap();

        assert_eq!(config.open_script.as_deref(), Some("send(\"hi\")"));
        assert_eq!(config.reconnect_delay_ms, Some(250));
        assert_eq!(config.connect_timeout_ms, None);
        assert_eq!(config.mode, ExecutionMode::Manual);

        let builder = TriggerBuilder::from_config(config);
        assert_eq!(builder.options.reconnect_delay, Duration::from_millis(250));
        assert_eq!(builder.options.reply_timeout, Some(Duration::from_secs(1)));
        assert_eq!(
            builder.options.connect_timeout,
            super::super::options::DEFAULT_CONNECT_TIMEOUT
        );
        assert_eq!(builder.parameters.get("accessCode"), Some(&json!("abc")));
    }

    #[test]
    fn test_config_defaults_when_absent() {
        let config: TriggerConfig =
            serde_json::from_value(json!({ "endpoint": "ws://localhost:1" })).unwrap();
        assert_eq!(config.mode, ExecutionMode::Trigger);
        assert!(config.parameters.is_empty());
        assert!(config.open_script.is_none());
    }

    #[tokio::test]
    async fn test_build_does_not_connect() {
        let trigger = with_sink(TriggerBuilder::new().endpoint("ws://127.0.0.1:9/feed"))
            .build()
            .unwrap();
        assert_eq!(trigger.attempts(), 0);
        assert_eq!(trigger.endpoint().as_str(), "ws://127.0.0.1:9/feed");
    }
}
