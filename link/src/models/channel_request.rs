use serde::{Deserialize, Serialize};

use super::filter::EqFilter;
use super::operation::EventMask;
use super::subscription_config::SubscriptionConfig;

/// Scope of a channel open: what the transport must subscribe to.
///
/// The event mask travels with the request so that unwanted operation
/// kinds are filtered by the server, not merely ignored by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRequest {
    /// Stream/table to observe
    pub resource: String,
    /// Optional namespace qualifying `resource`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Optional equality filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<EqFilter>,
    /// Operation kinds to receive
    #[serde(default)]
    pub events: EventMask,
}

impl ChannelRequest {
    /// Human-readable topic, e.g. `chat.messages:room_id=eq.42`
    pub fn topic(&self) -> String {
        let mut topic = match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.resource),
            None => self.resource.clone(),
        };
        if let Some(filter) = &self.filter {
            topic.push(':');
            topic.push_str(&filter.to_string());
        }
        topic
    }
}

impl From<&SubscriptionConfig> for ChannelRequest {
    fn from(config: &SubscriptionConfig) -> Self {
        Self {
            resource: config.resource.clone(),
            schema: config.schema.clone(),
            filter: config.filter.clone(),
            events: config.events,
        }
    }
}
