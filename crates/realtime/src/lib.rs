//! Realtime fan-out of group events to streaming clients.
//!
//! [`Registry`] maps a group id to its live sinks and a bounded backlog.
//! [`Session`] binds one client [`Sink`] to a group for the lifetime of its
//! connection. Nothing here knows about HTTP; the server wraps a
//! [`ChannelSink`] receiver into a `text/event-stream` response.

pub use api_types::realtime::{Event, EventKind};
pub use config::RealtimeConfig;
pub use registry::{DEFAULT_BACKLOG_CAPACITY, Registry};
pub use session::Session;
pub use sink::{ChannelSink, DeliveryError, Sink, SinkId};

mod config;
mod registry;
mod session;
mod sink;
