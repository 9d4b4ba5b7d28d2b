//! Routing of inbound change events to consumer callbacks.

use serde_json::Value as JsonValue;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::FeedLinkError;
use crate::event_handlers::{HandlerResult, SubscriptionHandlers};
use crate::models::{ChangeEvent, EventMask};

/// Result of routing one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler ran and returned `Ok`.
    Delivered,
    /// The event kind is selected but no handler is registered.
    NoHandler,
    /// The event kind is outside the subscription's event mask.
    Filtered,
    /// The handler returned an error or panicked; `on_error` was notified.
    Failed,
}

/// Demultiplexes change events by operation kind.
///
/// Every handler call is isolated: an `Err` or a panic is converted into
/// [`FeedLinkError::HandlerError`] and forwarded to `on_error`, and the
/// dispatcher stays usable for the next event.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    events: EventMask,
    handlers: SubscriptionHandlers,
}

impl EventDispatcher {
    pub fn new(events: EventMask, handlers: SubscriptionHandlers) -> Self {
        Self { events, handlers }
    }

    pub fn handlers(&self) -> &SubscriptionHandlers {
        &self.handlers
    }

    /// Route a change event to the matching handler.
    pub fn dispatch(&self, event: &ChangeEvent) -> DispatchOutcome {
        let kind = event.kind();
        if !self.events.contains(kind) {
            // The mask is sent with the open request; a transport that
            // delivers other kinds anyway is ignored here.
            log::debug!("[feed-link] Dropping {} event outside mask {}", kind, self.events);
            return DispatchOutcome::Filtered;
        }

        match event {
            ChangeEvent::Insert { record } => match &self.handlers.on_insert {
                Some(cb) => self.invoke("on_insert", || cb(record)),
                None => DispatchOutcome::NoHandler,
            },
            ChangeEvent::Update { record, old_record } => match &self.handlers.on_update {
                Some(cb) => self.invoke("on_update", || cb(record, old_record)),
                None => DispatchOutcome::NoHandler,
            },
            ChangeEvent::Delete { old_record } => match &self.handlers.on_delete {
                Some(cb) => self.invoke("on_delete", || cb(old_record)),
                None => DispatchOutcome::NoHandler,
            },
        }
    }

    /// Route a broadcast to `on_broadcast`.
    pub fn dispatch_broadcast(&self, event: &str, payload: &JsonValue) -> DispatchOutcome {
        match &self.handlers.on_broadcast {
            Some(cb) => self.invoke("on_broadcast", || cb(event, payload)),
            None => DispatchOutcome::NoHandler,
        }
    }

    fn invoke(&self, handler: &'static str, f: impl FnOnce() -> HandlerResult) -> DispatchOutcome {
        let message = match catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(())) => return DispatchOutcome::Delivered,
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
        };
        log::warn!("[feed-link] {} failed: {}", handler, message);
        self.handlers
            .emit_error(FeedLinkError::HandlerError { handler, message });
        DispatchOutcome::Failed
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
