//! Outbound delivery paths.
//!
//! The registry only ever sees a [`Sink`]: an identity plus a single
//! deliver-or-fail capability. The production sink is [`ChannelSink`], the
//! sending half of a bounded channel whose receiver feeds one client stream.

use std::{fmt, sync::Arc};

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::Event;

/// Identity of a sink inside the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SinkId(Uuid);

impl SinkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SinkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Why a sink refused an event.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("sink buffer is full")]
    Full,
    #[error("sink is closed")]
    Closed,
}

/// A client's outbound delivery path.
///
/// `deliver` is called while the registry holds its lock, so implementations
/// must return immediately: enqueue or fail, never wait.
pub trait Sink: Send + Sync {
    fn id(&self) -> SinkId;

    fn deliver(&self, event: Arc<Event>) -> Result<(), DeliveryError>;
}

/// Sink backed by a bounded `mpsc` channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    id: SinkId,
    tx: mpsc::Sender<Arc<Event>>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it.
    ///
    /// `capacity` is clamped to at least one slot.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Arc<Event>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let sink = Self {
            id: SinkId::new(),
            tx,
        };
        (sink, rx)
    }
}

impl Sink for ChannelSink {
    fn id(&self) -> SinkId {
        self.id
    }

    fn deliver(&self, event: Arc<Event>) -> Result<(), DeliveryError> {
        self.tx.try_send(event).map_err(|err| match err {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}
