//! Event Bus implementation.
//!
//! Provides the EventBus struct used by each printer connection to
//! distribute typed events to observers. Every connection owns its own
//! bus; there is intentionally no process-global instance, so events
//! from two printers never interleave on one channel.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::VecDeque;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::events::{EventCategory, PrinterEvent};

/// Handle returned by [`EventBus::add_handler`], used to remove the handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hex = self.0.simple().to_string();
        write!(f, "handler-{}", &hex[..8])
    }
}

/// Limits which events reach a registered handler
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    categories: Option<Vec<EventCategory>>,
}

impl EventFilter {
    /// A filter that passes every event
    pub fn all() -> Self {
        Self::default()
    }

    /// A filter that passes only the listed categories
    pub fn categories(categories: impl IntoIterator<Item = EventCategory>) -> Self {
        Self {
            categories: Some(categories.into_iter().collect()),
        }
    }

    /// Whether an event passes this filter
    pub fn matches(&self, event: &PrinterEvent) -> bool {
        match &self.categories {
            None => true,
            Some(list) => list.contains(&event.category()),
        }
    }
}

/// Tuning for an [`EventBus`]
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Capacity of the broadcast channel behind [`EventBus::receiver`].
    /// Slow receivers that fall further behind than this see a lag error.
    pub channel_capacity: usize,
    /// How many published events to retain for [`EventBus::recent`].
    /// Zero disables retention.
    pub recent_limit: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            recent_limit: 0,
        }
    }
}

/// A retained event and the moment it was published
#[derive(Debug, Clone)]
pub struct RecentEvent {
    /// The event as published.
    pub event: PrinterEvent,
    /// When [`EventBus::publish`] ran.
    pub at: DateTime<Utc>,
}

type HandlerFn = Box<dyn Fn(&PrinterEvent) + Send + Sync>;

struct HandlerEntry {
    id: SubscriptionId,
    filter: EventFilter,
    callback: HandlerFn,
}

/// Per-connection event bus
///
/// Fan-out happens two ways: registered handlers run synchronously on the
/// publishing thread, and a tokio broadcast channel serves async receivers.
pub struct EventBus {
    sender: broadcast::Sender<PrinterEvent>,
    handlers: RwLock<Vec<HandlerEntry>>,
    recent: RwLock<VecDeque<RecentEvent>>,
    recent_limit: usize,
}

impl EventBus {
    /// Create an event bus with default tuning
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// Create an event bus with explicit tuning
    pub fn with_config(config: EventBusConfig) -> Self {
        // broadcast::channel panics on zero capacity
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            sender,
            handlers: RwLock::new(Vec::new()),
            recent: RwLock::new(VecDeque::new()),
            recent_limit: config.recent_limit,
        }
    }

    /// Publish an event to every observer
    ///
    /// Handlers run here, on the publishing thread. Returns the number of
    /// async receivers the event was queued for; zero observers is normal,
    /// not an error.
    pub fn publish(&self, event: PrinterEvent) -> usize {
        if self.recent_limit > 0 {
            let mut recent = self.recent.write();
            if recent.len() == self.recent_limit {
                recent.pop_front();
            }
            recent.push_back(RecentEvent {
                event: event.clone(),
                at: Utc::now(),
            });
        }

        for entry in self.handlers.read().iter() {
            if entry.filter.matches(&event) {
                (entry.callback)(&event);
            }
        }

        self.sender.send(event).unwrap_or(0)
    }

    /// Register a synchronous handler for events passing `filter`
    ///
    /// The callback runs on the publishing thread, so it should return
    /// quickly to avoid stalling dispatch.
    pub fn add_handler<F>(&self, filter: EventFilter, callback: F) -> SubscriptionId
    where
        F: Fn(&PrinterEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(Uuid::new_v4());
        self.handlers.write().push(HandlerEntry {
            id,
            filter,
            callback: Box::new(callback),
        });
        tracing::debug!("Registered {}", id);
        id
    }

    /// Remove a handler registered with [`EventBus::add_handler`]
    ///
    /// Returns false when the id is unknown or already removed.
    pub fn remove_handler(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|entry| entry.id != id);
        let removed = handlers.len() < before;
        if removed {
            tracing::debug!("Removed {}", id);
        }
        removed
    }

    /// Get a receiver for async consumption in a tokio task
    pub fn receiver(&self) -> broadcast::Receiver<PrinterEvent> {
        self.sender.subscribe()
    }

    /// Number of registered synchronous handlers
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Recently published events, oldest first
    ///
    /// Empty unless retention was enabled via [`EventBusConfig::recent_limit`].
    pub fn recent(&self) -> Vec<RecentEvent> {
        self.recent.read().iter().cloned().collect()
    }

    /// Drop all retained events
    pub fn clear_recent(&self) {
        self.recent.write().clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handler_count())
            .field("recent", &self.recent.read().len())
            .finish()
    }
}
