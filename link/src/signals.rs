//! Network reachability and app lifecycle signals.
//!
//! A client observes two optional signal sources. Each source hands out a
//! [`watch::Receiver`]; the adapters here turn its raw values into
//! de-duplicated changes for the connection task.
//!
//! ```rust
//! use feed_link::signals::{AppLifecycle, ConnectivitySignal, LifecycleSignal};
//!
//! let network = ConnectivitySignal::new(true);
//! let app = LifecycleSignal::new(AppLifecycle::Foreground);
//!
//! network.set_online(false);
//! app.set(AppLifecycle::Background);
//! assert!(!network.is_online());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

/// Foreground state of the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppLifecycle {
    #[default]
    Foreground,
    Background,
    /// Transitional state (e.g. an overlay is shown); never acted on.
    Inactive,
}

impl fmt::Display for AppLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AppLifecycle::Foreground => "foreground",
            AppLifecycle::Background => "background",
            AppLifecycle::Inactive => "inactive",
        })
    }
}

/// Source of network reachability. `true` means online.
pub trait ConnectivitySource: Send + Sync {
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Source of application foreground/background transitions.
pub trait LifecycleSource: Send + Sync {
    fn subscribe(&self) -> watch::Receiver<AppLifecycle>;
}

/// Caller-driven connectivity source.
#[derive(Debug, Clone)]
pub struct ConnectivitySignal {
    tx: std::sync::Arc<watch::Sender<bool>>,
}

impl ConnectivitySignal {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self {
            tx: std::sync::Arc::new(tx),
        }
    }

    /// Publish the current reachability.
    pub fn set_online(&self, online: bool) {
        self.tx.send_replace(online);
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for ConnectivitySignal {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivitySource for ConnectivitySignal {
    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Caller-driven lifecycle source.
#[derive(Debug, Clone)]
pub struct LifecycleSignal {
    tx: std::sync::Arc<watch::Sender<AppLifecycle>>,
}

impl LifecycleSignal {
    pub fn new(initial: AppLifecycle) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            tx: std::sync::Arc::new(tx),
        }
    }

    /// Publish a lifecycle transition.
    pub fn set(&self, lifecycle: AppLifecycle) {
        self.tx.send_replace(lifecycle);
    }

    pub fn current(&self) -> AppLifecycle {
        *self.tx.borrow()
    }
}

impl Default for LifecycleSignal {
    fn default() -> Self {
        Self::new(AppLifecycle::Foreground)
    }
}

impl LifecycleSource for LifecycleSignal {
    fn subscribe(&self) -> watch::Receiver<AppLifecycle> {
        self.tx.subscribe()
    }
}

/// Reachability as seen by one client.
///
/// Without a source the client is always online.
#[derive(Debug)]
pub struct ConnectivityAdapter {
    rx: Option<watch::Receiver<bool>>,
    online: bool,
}

impl ConnectivityAdapter {
    pub fn new(source: Option<&dyn ConnectivitySource>) -> Self {
        match source {
            Some(source) => {
                let mut rx = source.subscribe();
                let online = *rx.borrow_and_update();
                Self {
                    rx: Some(rx),
                    online,
                }
            },
            None => Self {
                rx: None,
                online: true,
            },
        }
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Resolve when the source publishes a value. Never resolves without a
    /// source or after the source is dropped.
    pub async fn changed(&mut self) {
        let Some(rx) = self.rx.as_mut() else {
            return std::future::pending().await;
        };
        if rx.changed().await.is_err() {
            log::debug!("[feed-link] Connectivity source dropped");
            self.rx = None;
            std::future::pending::<()>().await;
        }
    }

    /// Take the latest published value. Returns it only if it differs
    /// from the last one observed.
    pub fn observe(&mut self) -> Option<bool> {
        let value = *self.rx.as_mut()?.borrow_and_update();
        if value == self.online {
            return None;
        }
        self.online = value;
        Some(value)
    }
}

/// Application lifecycle as seen by one client.
///
/// Without a source the application is always in the foreground.
#[derive(Debug)]
pub struct LifecycleAdapter {
    rx: Option<watch::Receiver<AppLifecycle>>,
    foreground: bool,
}

impl LifecycleAdapter {
    pub fn new(source: Option<&dyn LifecycleSource>) -> Self {
        match source {
            Some(source) => {
                let mut rx = source.subscribe();
                let foreground = *rx.borrow_and_update() != AppLifecycle::Background;
                Self {
                    rx: Some(rx),
                    foreground,
                }
            },
            None => Self {
                rx: None,
                foreground: true,
            },
        }
    }

    pub fn is_foreground(&self) -> bool {
        self.foreground
    }

    /// Resolve when the source publishes a value. Never resolves without a
    /// source or after the source is dropped.
    pub async fn changed(&mut self) {
        let Some(rx) = self.rx.as_mut() else {
            return std::future::pending().await;
        };
        if rx.changed().await.is_err() {
            log::debug!("[feed-link] Lifecycle source dropped");
            self.rx = None;
            std::future::pending::<()>().await;
        }
    }

    /// Take the latest published value. Returns `Foreground` or
    /// `Background` only on an actual transition; `Inactive` is ignored.
    pub fn observe(&mut self) -> Option<AppLifecycle> {
        let value = *self.rx.as_mut()?.borrow_and_update();
        let foreground = match value {
            AppLifecycle::Foreground => true,
            AppLifecycle::Background => false,
            AppLifecycle::Inactive => return None,
        };
        if foreground == self.foreground {
            return None;
        }
        self.foreground = foreground;
        Some(value)
    }
}
