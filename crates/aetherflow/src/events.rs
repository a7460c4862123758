//! Lifecycle events emitted by the [`Resolver`](crate::resolver::Resolver).
//!
//! Every event is wrapped in an immutable [`EventRecord`] and handed to an
//! [`EventHandler`]. Handlers observe; nothing they do feeds back into
//! resolution.
//!
//! # Choosing an event handler
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget runs |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] / [`EventObserver`] | Quick closures |
//! | [`ChannelHandler`] | Forward records to another task |
//! | [`EventLog`] | Keep records in memory for inspection |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

// ── Events ─────────────────────────────────────────────────────────

/// Which pass of the two-phase protocol produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Pass {
    /// Strict: unresolved links fail the call.
    Primary,
    /// Best-effort: overrides applied, residual failures become warnings.
    Retry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResolverEvent {
    ParseStarted {
        chars: usize,
    },
    ParseCompleted {
        chars: usize,
        warnings: usize,
    },
    ParseFailed {
        error: String,
    },
    /// Overrides substituted before a retry pass.
    OverridesApplied {
        substitutions: usize,
    },
    ScrapeCompleted {
        turns: usize,
    },
    ScrapeFailed {
        error: String,
    },
    MountStarted {
        alias: String,
        source: String,
    },
    MountSucceeded {
        alias: String,
        source: String,
        turns: usize,
    },
    MountFailed {
        alias: String,
        source: String,
        error: String,
    },
    LinkStarted {
        token: String,
    },
    LinkSucceeded {
        token: String,
        chars: usize,
    },
    LinkFailed {
        token: String,
        error: String,
    },
    PortalStarted {
        portal: String,
    },
    PortalSucceeded {
        portal: String,
        chars: usize,
    },
    PortalFailed {
        portal: String,
        error: String,
    },
    ActionStarted {
        target: String,
        action: String,
    },
    ActionSucceeded {
        target: String,
        action: String,
    },
    ActionFailed {
        target: String,
        action: String,
        error: String,
    },
}

/// A timestamped event.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub pass: Pass,
    #[serde(flatten)]
    pub event: ResolverEvent,
}

impl EventRecord {
    pub fn new(pass: Pass, event: ResolverEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            pass,
            event,
        }
    }
}

// ── Handlers ───────────────────────────────────────────────────────

/// Observer for resolver events.
///
/// Called synchronously from the resolver task; keep implementations cheap
/// and non-blocking. Use [`ChannelHandler`] to move heavy work elsewhere.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, record: &EventRecord) {
        let _ = record;
    }
}

/// Ignores every event.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// ```ignore
/// let handler = FnEventHandler::new(|record| {
///     if let ResolverEvent::MountFailed { alias, .. } = &record.event {
///         eprintln!("mount {alias} failed");
///     }
/// });
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&EventRecord) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&EventRecord) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&EventRecord) + Send + Sync,
{
    fn on_event(&self, record: &EventRecord) {
        (self.0)(record)
    }
}

/// Observes only the [`ResolverEvent`] payload, ignoring pass and timestamp.
pub struct EventObserver<F>(F)
where
    F: Fn(&ResolverEvent) + Send + Sync;

impl<F> EventObserver<F>
where
    F: Fn(&ResolverEvent) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for EventObserver<F>
where
    F: Fn(&ResolverEvent) + Send + Sync,
{
    fn on_event(&self, record: &EventRecord) {
        (self.0)(&record.event)
    }
}

/// Dispatches every event to each inner handler in registration order.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with(ChannelHandler::new().0);
/// ```
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }
}

impl Default for CompositeEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, record: &EventRecord) {
        for handler in &self.handlers {
            handler.on_event(record);
        }
    }
}

/// Forwards records over an unbounded tokio channel. Sends after the
/// receiver is dropped are discarded.
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<EventRecord>,
}

impl ChannelHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EventRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventHandler for ChannelHandler {
    fn on_event(&self, record: &EventRecord) {
        let _ = self.tx.send(record.clone());
    }
}

/// Keeps every record in memory.
#[derive(Default)]
pub struct EventLog {
    records: Mutex<Vec<EventRecord>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<EventRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn events(&self) -> Vec<ResolverEvent> {
        self.records().into_iter().map(|r| r.event).collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventHandler for EventLog {
    fn on_event(&self, record: &EventRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }
}

/// Logs events via `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, record: &EventRecord) {
        let pass = record.pass;
        match &record.event {
            ResolverEvent::ParseStarted { chars } => {
                info!("[{pass:?}] parse started ({chars} chars)");
            }
            ResolverEvent::ParseCompleted { chars, warnings } => {
                info!("[{pass:?}] parse complete ({chars} chars, {warnings} warning(s))");
            }
            ResolverEvent::ParseFailed { error } => {
                warn!("[{pass:?}] parse failed: {error}");
            }
            ResolverEvent::OverridesApplied { substitutions } => {
                debug!("Applied {substitutions} override substitution(s)");
            }
            ResolverEvent::ScrapeCompleted { turns } => {
                debug!("Scraped {turns} turn(s)");
            }
            ResolverEvent::ScrapeFailed { error } => {
                warn!("Scrape failed: {error}");
            }
            ResolverEvent::MountStarted { alias, source } => {
                debug!("Mounting conduit '{alias}' from '{source}'");
            }
            ResolverEvent::MountSucceeded {
                alias,
                source,
                turns,
            } => {
                info!("Mounted conduit '{alias}' from '{source}' ({turns} turn(s))");
            }
            ResolverEvent::MountFailed {
                alias,
                source,
                error,
            } => {
                warn!("Conduit '{alias}' from '{source}' failed: {error}");
            }
            ResolverEvent::LinkStarted { token } => {
                trace!("Resolving link {token}");
            }
            ResolverEvent::LinkSucceeded { token, chars } => {
                trace!("Link {token} resolved ({chars} chars)");
            }
            ResolverEvent::LinkFailed { token, error } => {
                debug!("Link {token} failed: {error}");
            }
            ResolverEvent::PortalStarted { portal } => {
                let preview: String = portal.chars().take(80).collect();
                trace!("Resolving portal {preview}");
            }
            ResolverEvent::PortalSucceeded { portal, chars } => {
                let preview: String = portal.chars().take(80).collect();
                trace!("Portal {preview} resolved ({chars} chars)");
            }
            ResolverEvent::PortalFailed { portal, error } => {
                let preview: String = portal.chars().take(80).collect();
                debug!("Portal {preview} failed: {error}");
            }
            ResolverEvent::ActionStarted { target, action } => {
                info!("Action {action} on {target}");
            }
            ResolverEvent::ActionSucceeded { target, action } => {
                info!("Action {action} on {target} succeeded");
            }
            ResolverEvent::ActionFailed {
                target,
                action,
                error,
            } => {
                warn!("Action {action} on {target} failed: {error}");
            }
        }
    }
}
