//! Karaoke event bus and broadcast boundary.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`QueueEvent`]: the change notification envelope.
//! - [`BroadcastSink`]: the one-way publishing interface the queue engine
//!   depends on; [`EventBus`] implements it.

pub mod bus;
pub mod sink;

pub use bus::{EventBus, QueueAction, QueueEvent};
pub use sink::{BroadcastSink, PublishError};
