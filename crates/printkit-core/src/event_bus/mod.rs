//! # Event Bus Module
//!
//! Publish/subscribe distribution of typed printer events.
//!
//! Each printer connection owns one [`EventBus`]; publishers emit typed
//! [`PrinterEvent`] values without knowing subscribers, and subscribers
//! either register a synchronous handler with a category filter or take a
//! broadcast receiver for async consumption.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use printkit_core::event_bus::{EventBus, EventCategory, EventFilter, PrinterEvent};
//!
//! let bus = EventBus::new();
//! let subscription = bus.add_handler(
//!     EventFilter::categories([EventCategory::Connection]),
//!     |event| println!("{}", event.description()),
//! );
//!
//! // ... publish from the connection ...
//!
//! bus.remove_handler(subscription);
//! ```

mod bus;
mod events;

pub use bus::*;
pub use events::*;
