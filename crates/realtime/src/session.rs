//! One client's subscription to a group channel.
//!
//! Starting a session sends the `connected` acknowledgement, replays the
//! group's backlog, attaches the sink for live events and spawns a heartbeat
//! task. Teardown stops the heartbeat and detaches the sink; it runs at most
//! once no matter how many paths trigger it (explicit stop, drop, a failed
//! delivery, server shutdown).
//!
//! The registry drops a sink whose delivery fails. The sink it holds is a
//! [`SessionSink`] so the owning session learns about it and closes too,
//! which ends the client's stream and lets it reconnect for a replay.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use uuid::Uuid;

use crate::{DeliveryError, Event, Registry, Sink, SinkId};

/// Cancels the session once any delivery to the wrapped sink fails.
struct SessionSink {
    inner: Arc<dyn Sink>,
    cancel: CancellationToken,
}

impl Sink for SessionSink {
    fn id(&self) -> SinkId {
        self.inner.id()
    }

    fn deliver(&self, event: Arc<Event>) -> Result<(), DeliveryError> {
        let result = self.inner.deliver(event);
        if result.is_err() {
            self.cancel.cancel();
        }
        result
    }
}

struct Inner {
    id: Uuid,
    group_id: String,
    attached_at: DateTime<Utc>,
    sink: Arc<dyn Sink>,
    registry: Arc<Registry>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl Inner {
    fn teardown(&self, reason: &str) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.cancel.cancel();
        self.registry.detach(&self.group_id, self.sink.id());
        tracing::info!(
            group_id = %self.group_id,
            session = %self.id,
            reason,
            "realtime session closed"
        );
        true
    }
}

/// A live subscription. Dropping it tears it down.
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Bind `sink` to `group_id` and start its heartbeat.
    ///
    /// Must be called from within a Tokio runtime. The session is cancelled
    /// together with `shutdown`.
    pub fn start(
        registry: Arc<Registry>,
        group_id: impl Into<String>,
        sink: Arc<dyn Sink>,
        heartbeat: Duration,
        shutdown: &CancellationToken,
    ) -> Result<Self, DeliveryError> {
        let group_id = group_id.into();
        let cancel = shutdown.child_token();
        let sink: Arc<dyn Sink> = Arc::new(SessionSink {
            inner: sink,
            cancel: cancel.clone(),
        });

        sink.deliver(Arc::new(Event::connected(group_id.as_str())))?;
        let replayed = registry.attach_with_backlog(&group_id, Arc::clone(&sink))?;

        let inner = Arc::new(Inner {
            id: Uuid::new_v4(),
            group_id,
            attached_at: Utc::now(),
            sink,
            registry,
            cancel,
            closed: AtomicBool::new(false),
        });
        tracing::info!(
            group_id = %inner.group_id,
            session = %inner.id,
            replayed,
            "realtime session opened"
        );

        tokio::spawn(keep_alive(Arc::clone(&inner), heartbeat));
        Ok(Self { inner })
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn group_id(&self) -> &str {
        &self.inner.group_id
    }

    pub fn attached_at(&self) -> DateTime<Utc> {
        self.inner.attached_at
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Tear the session down. Returns `false` if it was already closed.
    pub fn stop(&self) -> bool {
        self.inner.teardown("stopped")
    }

    /// Resolves once the session is stopped or the server shuts down.
    pub fn closed(&self) -> WaitForCancellationFutureOwned {
        self.inner.cancel.clone().cancelled_owned()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.inner.teardown("dropped");
    }
}

async fn keep_alive(inner: Arc<Inner>, period: Duration) {
    let mut ticker = time::interval_at(time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let reason = loop {
        tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => break "cancelled",
            _ = ticker.tick() => {
                let beat = Arc::new(Event::heartbeat(inner.group_id.as_str()));
                if let Err(err) = inner.sink.deliver(beat) {
                    tracing::debug!(
                        group_id = %inner.group_id,
                        session = %inner.id,
                        "heartbeat failed: {err}"
                    );
                    break "heartbeat failed";
                }
            }
        }
    };

    inner.teardown(reason);
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc::{self, error::TryRecvError};

    use super::*;
    use crate::{ChannelSink, EventKind};

    const PERIOD: Duration = Duration::from_secs(30);

    fn start(
        registry: &Arc<Registry>,
        shutdown: &CancellationToken,
    ) -> (Session, mpsc::Receiver<Arc<Event>>) {
        let (sink, rx) = ChannelSink::channel(64);
        let session =
            Session::start(Arc::clone(registry), "g1", Arc::new(sink), PERIOD, shutdown).unwrap();
        (session, rx)
    }

    fn expense(title: &str) -> Event {
        Event::new(EventKind::ExpenseAdded, "g1", Some(json!({ "title": title })))
    }

    #[tokio::test(start_paused = true)]
    async fn start_sends_connected_then_backlog_then_live() {
        let registry = Arc::new(Registry::new());
        registry.publish("g1", expense("queued"));
        let shutdown = CancellationToken::new();

        let (session, mut rx) = start(&registry, &shutdown);
        registry.publish("g1", expense("live"));

        let connected = rx.recv().await.unwrap();
        assert_eq!(connected.kind, EventKind::Connected);
        assert_eq!(connected.group_id, "g1");
        let queued = rx.recv().await.unwrap();
        assert_eq!(queued.data, Some(json!({ "title": "queued" })));
        let live = rx.recv().await.unwrap();
        assert_eq!(live.data, Some(json!({ "title": "live" })));

        assert_eq!(session.group_id(), "g1");
        assert_eq!(registry.sink_count("g1"), 1);
        assert_eq!(registry.backlog_len("g1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_fires_every_period() {
        let registry = Arc::new(Registry::new());
        let shutdown = CancellationToken::new();
        let (_session, mut rx) = start(&registry, &shutdown);
        let _connected = rx.recv().await.unwrap();

        let started = time::Instant::now();
        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, EventKind::Heartbeat);
        assert_eq!(started.elapsed(), PERIOD);

        let second = rx.recv().await.unwrap();
        assert_eq!(second.kind, EventKind::Heartbeat);
        assert_eq!(started.elapsed(), PERIOD * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_silences_heartbeat() {
        let registry = Arc::new(Registry::new());
        let shutdown = CancellationToken::new();
        let (session, mut rx) = start(&registry, &shutdown);
        let _connected = rx.recv().await.unwrap();

        assert!(session.stop());
        assert!(!session.stop());
        assert!(session.is_closed());
        assert_eq!(registry.sink_count("g1"), 0);

        time::sleep(PERIOD * 3).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_heartbeat_tears_session_down() {
        let registry = Arc::new(Registry::new());
        let shutdown = CancellationToken::new();
        let (session, rx) = start(&registry, &shutdown);
        drop(rx);

        time::sleep(PERIOD + Duration::from_secs(1)).await;

        assert!(session.is_closed());
        assert_eq!(registry.sink_count("g1"), 0);
        assert!(!session.stop());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_every_session() {
        let registry = Arc::new(Registry::new());
        let shutdown = CancellationToken::new();
        let (first, _rx1) = start(&registry, &shutdown);
        let (second, _rx2) = start(&registry, &shutdown);
        assert_eq!(registry.sink_count("g1"), 2);

        shutdown.cancel();
        first.closed().await;
        time::sleep(Duration::from_millis(1)).await;

        assert!(first.is_closed());
        assert!(second.is_closed());
        assert_eq!(registry.sink_count("g1"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn overflowing_sink_closes_the_session() {
        let registry = Arc::new(Registry::new());
        let shutdown = CancellationToken::new();
        let (sink, mut rx) = ChannelSink::channel(2);
        let session =
            Session::start(Arc::clone(&registry), "g1", Arc::new(sink), PERIOD, &shutdown).unwrap();

        registry.publish("g1", expense("a"));
        registry.publish("g1", expense("b"));

        time::timeout(Duration::from_secs(1), session.closed())
            .await
            .unwrap();
        time::sleep(Duration::from_millis(1)).await;

        assert!(session.is_closed());
        assert_eq!(registry.sink_count("g1"), 0);
        assert_eq!(registry.backlog_len("g1"), 2);

        // Whatever was buffered before the overflow is still readable, nothing after it.
        while rx.try_recv().is_ok() {}
        registry.publish("g1", expense("after"));
        time::sleep(PERIOD + Duration::from_secs(1)).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn closed_receiver_on_publish_closes_the_session() {
        let registry = Arc::new(Registry::new());
        let shutdown = CancellationToken::new();
        let (session, rx) = start(&registry, &shutdown);
        drop(rx);

        registry.publish("g1", expense("lost"));
        session.closed().await;
        time::sleep(Duration::from_millis(1)).await;

        assert!(session.is_closed());
        assert_eq!(registry.sink_count("g1"), 0);
    }

    #[tokio::test]
    async fn dropping_the_session_detaches_it() {
        let registry = Arc::new(Registry::new());
        let shutdown = CancellationToken::new();
        let (session, _rx) = start(&registry, &shutdown);
        assert_eq!(registry.sink_count("g1"), 1);

        drop(session);

        assert_eq!(registry.sink_count("g1"), 0);
    }

    #[tokio::test]
    async fn start_fails_on_closed_sink() {
        let registry = Arc::new(Registry::new());
        let shutdown = CancellationToken::new();
        let (sink, rx) = ChannelSink::channel(4);
        drop(rx);

        let result = Session::start(
            Arc::clone(&registry),
            "g1",
            Arc::new(sink),
            PERIOD,
            &shutdown,
        );

        assert!(matches!(result, Err(DeliveryError::Closed)));
        assert_eq!(registry.sink_count("g1"), 0);
    }
}
