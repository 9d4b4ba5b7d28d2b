use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{FeedLinkError, Result};

use super::filter::EqFilter;
use super::operation::EventMask;
use super::retry_policy::RetryPolicy;

/// Immutable description of what a client subscribes to and how it recovers.
///
/// Changing the resource, filter or event mask requires building a new client.
///
/// # Example
///
/// ```rust
/// use feed_link::{EqFilter, EventMask, OperationKind, RetryPolicy, SubscriptionConfig};
///
/// let config = SubscriptionConfig::new("messages")
///     .with_schema("chat")
///     .with_filter(EqFilter::new("room_id", 42))
///     .with_events(EventMask::only(&[OperationKind::Insert]))
///     .with_retry_policy(RetryPolicy::new(3, 1000))
///     .with_heartbeat_interval_ms(15_000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Identifier of the stream/table to observe (required, non-empty)
    pub resource: String,

    /// Optional namespace qualifying `resource`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Optional server-side equality filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<EqFilter>,

    /// Operation kinds to receive. Default: all
    #[serde(default)]
    pub events: EventMask,

    /// Whether the client should be active at all. Default: true
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Reconnection budget and backoff
    #[serde(default)]
    pub retry_policy: RetryPolicy,

    /// Interval between liveness pings in milliseconds.
    /// Set to `0` to disable. Default: `30_000` (30 seconds)
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

impl SubscriptionConfig {
    /// Create a configuration for `resource` with default options.
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            schema: None,
            filter: None,
            events: EventMask::all(),
            enabled: true,
            retry_policy: RetryPolicy::default(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
        }
    }

    /// Parse a configuration from a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            FeedLinkError::ConfigurationError(format!("Failed to parse config: {}", e))
        })
    }

    /// Load a configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            FeedLinkError::ConfigurationError(format!("Failed to read config file: {}", e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_filter(mut self, filter: EqFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_events(mut self, events: EventMask) -> Self {
        self.events = events;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Set the heartbeat interval in milliseconds (`0` disables heartbeats)
    pub fn with_heartbeat_interval_ms(mut self, ms: u64) -> Self {
        self.heartbeat_interval_ms = ms;
        self
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Check that the configuration can be used to open a channel.
    ///
    /// `enabled = false` is a valid configuration; it is rejected only when
    /// a connection is actually requested.
    pub fn validate(&self) -> Result<()> {
        if self.resource.trim().is_empty() {
            return Err(FeedLinkError::ConfigurationError(
                "resource must not be empty".to_string(),
            ));
        }
        if let Some(schema) = &self.schema {
            if schema.trim().is_empty() {
                return Err(FeedLinkError::ConfigurationError(
                    "schema must not be empty when set".to_string(),
                ));
            }
        }
        if let Some(filter) = &self.filter {
            if filter.column.trim().is_empty() {
                return Err(FeedLinkError::ConfigurationError(
                    "filter column must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Fully-qualified resource name (`schema.resource` or `resource`).
    pub fn qualified_resource(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.resource),
            None => self.resource.clone(),
        }
    }
}
