//! Resilient subscription to a group's realtime stream.

use std::time::Duration;

use api_types::realtime::Event;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::{StatusCode, Url, header};
use thiserror::Error;
use tokio::sync::watch;

mod backoff;
mod decoder;

pub use backoff::{Backoff, Reconnect, ReconnectPolicy};
pub use decoder::FrameDecoder;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid base_url: {0}")]
    InvalidUrl(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server answered {0}")]
    Status(StatusCode),
    #[error("stream closed by server")]
    Closed,
    #[error("no data for {0:?}")]
    Stalled(Duration),
    #[error("max reconnection attempts reached")]
    MaxAttemptsReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Reconnecting { attempt: u32, delay: Duration },
    Disconnected,
}

/// Follows one group's event stream, reconnecting with backoff.
#[derive(Debug)]
pub struct Subscription {
    http: reqwest::Client,
    endpoint: Url,
    group_id: String,
    policy: ReconnectPolicy,
    state: watch::Sender<ConnectionState>,
    last_heartbeat: watch::Sender<Option<DateTime<Utc>>>,
}

impl Subscription {
    pub fn new(
        base_url: &str,
        group_id: &str,
        policy: ReconnectPolicy,
    ) -> Result<Self, ClientError> {
        let mut endpoint =
            Url::parse(base_url).map_err(|err| ClientError::InvalidUrl(err.to_string()))?;
        endpoint
            .path_segments_mut()
            .map_err(|()| ClientError::InvalidUrl(base_url.to_string()))?
            .pop_if_empty()
            .extend(["api", "realtime", group_id]);

        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
            group_id: group_id.to_string(),
            policy,
            state: watch::Sender::new(ConnectionState::Connecting),
            last_heartbeat: watch::Sender::new(None),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Watch connection state changes.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// When the last heartbeat arrived, if any.
    pub fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        *self.last_heartbeat.borrow()
    }

    /// Stream events into `on_event` until the reconnect budget is spent.
    ///
    /// Heartbeats are consumed here and never reach the callback. A
    /// successful connection resets the budget. A stream that stays silent
    /// longer than the policy's idle timeout is dropped and reopened.
    pub async fn run<F>(&self, mut on_event: F) -> Result<(), ClientError>
    where
        F: FnMut(Event),
    {
        let mut backoff = Backoff::new(self.policy);

        loop {
            self.state.send_replace(ConnectionState::Connecting);
            let err = match self.connect(&mut backoff, &mut on_event).await {
                Ok(()) => ClientError::Closed,
                Err(err) => err,
            };

            match backoff.on_failure() {
                Reconnect::After(delay) => {
                    let attempt = backoff.attempts();
                    tracing::warn!(
                        group_id = %self.group_id,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        "connection lost ({err}), retrying in {delay:?}"
                    );
                    self.state
                        .send_replace(ConnectionState::Reconnecting { attempt, delay });
                    tokio::time::sleep(delay).await;
                }
                Reconnect::GiveUp => {
                    tracing::error!(
                        group_id = %self.group_id,
                        "giving up after {} attempts: {err}",
                        backoff.attempts()
                    );
                    self.state.send_replace(ConnectionState::Disconnected);
                    return Err(ClientError::MaxAttemptsReached);
                }
            }
        }
    }

    async fn connect<F>(&self, backoff: &mut Backoff, on_event: &mut F) -> Result<(), ClientError>
    where
        F: FnMut(Event),
    {
        let response = self
            .http
            .get(self.endpoint.clone())
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ClientError::Status(response.status()));
        }

        backoff.reset();
        self.state.send_replace(ConnectionState::Connected);
        tracing::info!(group_id = %self.group_id, "realtime connection opened");

        let idle = self.policy.idle_timeout();
        let mut decoder = FrameDecoder::new();
        let mut body = response.bytes_stream();
        loop {
            let chunk = match tokio::time::timeout(idle, body.next()).await {
                Ok(Some(chunk)) => chunk?,
                Ok(None) => return Ok(()),
                Err(_) => return Err(ClientError::Stalled(idle)),
            };
            for data in decoder.push(&chunk) {
                self.dispatch(&data, on_event);
            }
        }
    }

    fn dispatch<F>(&self, data: &str, on_event: &mut F)
    where
        F: FnMut(Event),
    {
        let event: Event = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(group_id = %self.group_id, "dropping malformed event: {err}");
                return;
            }
        };

        if event.is_heartbeat() {
            self.last_heartbeat.send_replace(Some(Utc::now()));
            return;
        }
        on_event(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use api_types::realtime::EventKind;
    use engine::Engine;
    use migration::{Migrator, MigratorTrait};
    use realtime::{RealtimeConfig, Registry};
    use sea_orm::Database;
    use serde_json::json;
    use server::ServerState;
    use tokio::{io::AsyncWriteExt, sync::mpsc};
    use tokio_util::sync::CancellationToken;

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    fn quick_policy() -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay_ms: 1,
            max_delay_ms: 5,
            max_attempts: 3,
            ..ReconnectPolicy::default()
        }
    }

    #[test]
    fn endpoint_is_built_from_base_url() {
        let sub = Subscription::new("http://127.0.0.1:3000", "g1", quick_policy()).unwrap();
        assert_eq!(
            sub.endpoint().as_str(),
            "http://127.0.0.1:3000/api/realtime/g1"
        );

        let sub = Subscription::new("http://host/app/", "a b", quick_policy()).unwrap();
        assert_eq!(sub.endpoint().as_str(), "http://host/app/api/realtime/a%20b");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = Subscription::new("not a url", "g1", quick_policy()).unwrap_err();
        assert!(matches!(err, ClientError::InvalidUrl(_)));
    }

    #[test]
    fn heartbeats_never_reach_the_callback() {
        let sub = Subscription::new("http://127.0.0.1:3000", "g1", quick_policy()).unwrap();
        let mut seen = Vec::new();
        let mut record = |event: Event| seen.push(event.kind);

        let heartbeat = serde_json::to_string(&Event::heartbeat("g1")).unwrap();
        let added = serde_json::to_string(&Event::new(
            EventKind::ExpenseAdded,
            "g1",
            Some(json!({ "title": "Lunch" })),
        ))
        .unwrap();

        sub.dispatch(&heartbeat, &mut record);
        sub.dispatch("{not json", &mut record);
        sub.dispatch(&added, &mut record);

        assert_eq!(seen, [EventKind::ExpenseAdded]);
        assert!(sub.last_heartbeat().is_some());
    }

    #[tokio::test]
    async fn unreachable_server_ends_in_max_attempts() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let sub = Subscription::new(&format!("http://{addr}"), "g1", quick_policy()).unwrap();
        let state = sub.state();

        let result = tokio::time::timeout(WAIT, sub.run(|_| {})).await.unwrap();

        assert!(matches!(result, Err(ClientError::MaxAttemptsReached)));
        assert_eq!(*state.borrow(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn silent_stream_is_dropped_and_reopened() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (accepted_tx, mut accepted) = mpsc::unbounded_channel();

        // Answers every request with a connected frame, then goes quiet
        // without closing the socket.
        tokio::spawn(async move {
            let mut open = Vec::new();
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                let connected = serde_json::to_string(&Event::connected("g1")).unwrap();
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\n\r\ndata: {connected}\n\n"
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = accepted_tx.send(());
                open.push(socket);
            }
        });

        let policy = ReconnectPolicy {
            idle_timeout_ms: 50,
            ..quick_policy()
        };
        let sub = Subscription::new(&format!("http://{addr}"), "g1", policy).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            sub.run(move |event| {
                let _ = tx.send(event.kind);
            })
            .await
        });

        for _ in 0..2 {
            tokio::time::timeout(WAIT, accepted.recv())
                .await
                .unwrap()
                .unwrap();
            let kind = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
            assert_eq!(kind, EventKind::Connected);
        }
        assert!(!task.is_finished());
        task.abort();
    }

    async fn spawn_server() -> (ServerState, std::net::SocketAddr) {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        let engine = Engine::builder().database(db).build().await.unwrap();
        let state = ServerState::new(
            engine,
            Arc::new(Registry::new()),
            RealtimeConfig::default(),
            CancellationToken::new(),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = server::spawn_with_listener(state.clone(), listener).unwrap();
        (state, addr)
    }

    #[tokio::test]
    async fn receives_live_events_until_the_server_goes_away() {
        let (state, addr) = spawn_server().await;
        let sub = Subscription::new(&format!("http://{addr}"), "g1", quick_policy()).unwrap();
        let mut connection = sub.state();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            sub.run(move |event| {
                let _ = tx.send(event);
            })
            .await
        });

        let connected = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(connected.kind, EventKind::Connected);
        assert_eq!(connected.group_id, "g1");
        assert_eq!(*connection.borrow_and_update(), ConnectionState::Connected);

        state.registry.publish(
            "g1",
            Event::new(
                EventKind::ExpenseAdded,
                "g1",
                Some(json!({ "title": "Lunch", "amount": 12.5 })),
            ),
        );
        let added = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(added.kind, EventKind::ExpenseAdded);
        assert_eq!(added.data.unwrap()["title"], "Lunch");

        state.shutdown.cancel();

        let result = tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
        assert!(matches!(result, Err(ClientError::MaxAttemptsReached)));
        assert_eq!(*connection.borrow(), ConnectionState::Disconnected);
    }
}
