//! Per-group fan-out table.
//!
//! Each group owns a channel with the set of live sinks and a bounded backlog
//! of the most recent events. All channels sit behind one mutex; every
//! operation is a short in-memory critical section and sink delivery is a
//! non-blocking enqueue, so contention stays negligible.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use parking_lot::Mutex;

use crate::{DeliveryError, Event, Sink, SinkId};

/// Events kept per group for clients that connect late.
pub const DEFAULT_BACKLOG_CAPACITY: usize = 50;

#[derive(Default)]
struct GroupChannel {
    sinks: HashMap<SinkId, Arc<dyn Sink>>,
    backlog: VecDeque<Arc<Event>>,
}

impl GroupChannel {
    fn is_idle(&self) -> bool {
        self.sinks.is_empty() && self.backlog.is_empty()
    }
}

/// Process-wide broadcast registry.
///
/// Construct one at startup and share it behind an `Arc`.
pub struct Registry {
    channels: Mutex<HashMap<String, GroupChannel>>,
    backlog_capacity: usize,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_backlog_capacity(DEFAULT_BACKLOG_CAPACITY)
    }

    pub fn with_backlog_capacity(backlog_capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            backlog_capacity,
        }
    }

    pub fn backlog_capacity(&self) -> usize {
        self.backlog_capacity
    }

    /// Register `sink` for live events of `group_id`.
    ///
    /// Attaching the same sink again replaces the previous entry, so it is
    /// never delivered to twice.
    pub fn attach(&self, group_id: &str, sink: Arc<dyn Sink>) {
        let mut channels = self.channels.lock();
        let channel = channels.entry(group_id.to_string()).or_default();
        channel.sinks.insert(sink.id(), sink);
    }

    /// Remove a sink. Unknown groups or sinks are ignored.
    pub fn detach(&self, group_id: &str, sink_id: SinkId) {
        let mut channels = self.channels.lock();
        let Some(channel) = channels.get_mut(group_id) else {
            return;
        };
        if channel.sinks.remove(&sink_id).is_some() {
            tracing::debug!(group_id, sink = %sink_id, "sink detached");
        }
        if channel.is_idle() {
            channels.remove(group_id);
        }
    }

    /// Append `event` to the group's backlog and deliver it to every live sink.
    ///
    /// Sinks that fail are detached on the spot; the failure never reaches
    /// the caller or the other sinks.
    pub fn publish(&self, group_id: &str, event: Event) {
        let event = Arc::new(event);
        let mut channels = self.channels.lock();
        let channel = channels.entry(group_id.to_string()).or_default();

        channel.backlog.push_back(Arc::clone(&event));
        while channel.backlog.len() > self.backlog_capacity {
            channel.backlog.pop_front();
        }

        let mut failed = Vec::new();
        for (id, sink) in &channel.sinks {
            if let Err(err) = sink.deliver(Arc::clone(&event)) {
                failed.push((*id, err));
            }
        }

        for (id, err) in &failed {
            channel.sinks.remove(id);
            tracing::debug!(group_id, sink = %id, "detaching sink after failed delivery: {err}");
        }

        tracing::trace!(
            group_id,
            kind = event.kind.as_str(),
            delivered = channel.sinks.len(),
            "event published"
        );

        if channel.is_idle() {
            channels.remove(group_id);
        }
    }

    /// Take the group's backlog, oldest first, leaving it empty.
    pub fn drain_backlog(&self, group_id: &str) -> Vec<Arc<Event>> {
        let mut channels = self.channels.lock();
        let Some(channel) = channels.get_mut(group_id) else {
            return Vec::new();
        };
        let drained = channel.backlog.drain(..).collect();
        if channel.is_idle() {
            channels.remove(group_id);
        }
        drained
    }

    /// Drain the backlog into `sink` and attach it, in one critical section.
    ///
    /// A publish can only land before (and be part of the replay) or after
    /// (and be delivered live), so the sink sees every event exactly once
    /// and in order. If the replay fails the backlog is left as it was and
    /// the sink is not attached.
    ///
    /// Returns the number of replayed events.
    pub fn attach_with_backlog(
        &self,
        group_id: &str,
        sink: Arc<dyn Sink>,
    ) -> Result<usize, DeliveryError> {
        let mut channels = self.channels.lock();
        let channel = channels.entry(group_id.to_string()).or_default();

        // A fresh channel has nothing to replay, so a failure here always
        // leaves a non-empty backlog behind.
        channel
            .backlog
            .iter()
            .try_for_each(|event| sink.deliver(Arc::clone(event)))?;

        let replayed = channel.backlog.len();
        channel.backlog.clear();
        channel.sinks.insert(sink.id(), sink);
        Ok(replayed)
    }

    pub fn sink_count(&self, group_id: &str) -> usize {
        self.channels
            .lock()
            .get(group_id)
            .map_or(0, |channel| channel.sinks.len())
    }

    pub fn backlog_len(&self, group_id: &str) -> usize {
        self.channels
            .lock()
            .get(group_id)
            .map_or(0, |channel| channel.backlog.len())
    }

    /// Number of groups with live sinks or a pending backlog.
    pub fn group_count(&self) -> usize {
        self.channels.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::{ChannelSink, EventKind};

    /// Sink that records what it sees and can be told to fail.
    struct RecordingSink {
        id: SinkId,
        seen: Mutex<Vec<Arc<Event>>>,
        attempts: AtomicUsize,
        broken: AtomicBool,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: SinkId::new(),
                seen: Mutex::new(Vec::new()),
                attempts: AtomicUsize::new(0),
                broken: AtomicBool::new(false),
            })
        }

        fn broken() -> Arc<Self> {
            let sink = Self::new();
            sink.broken.store(true, Ordering::SeqCst);
            sink
        }

        fn titles(&self) -> Vec<String> {
            self.seen.lock().iter().map(|e| title_of(e)).collect()
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    impl Sink for RecordingSink {
        fn id(&self) -> SinkId {
            self.id
        }

        fn deliver(&self, event: Arc<Event>) -> Result<(), DeliveryError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.broken.load(Ordering::SeqCst) {
                return Err(DeliveryError::Closed);
            }
            self.seen.lock().push(event);
            Ok(())
        }
    }

    fn expense(group_id: &str, title: &str) -> Event {
        Event::new(
            EventKind::ExpenseAdded,
            group_id,
            Some(json!({ "title": title, "amount": 12.5 })),
        )
    }

    fn title_of(event: &Event) -> String {
        event
            .data
            .as_ref()
            .and_then(|data| data["title"].as_str())
            .unwrap_or_default()
            .to_string()
    }

    fn drain_titles(rx: &mut mpsc::Receiver<Arc<Event>>) -> Vec<String> {
        let mut titles = Vec::new();
        while let Ok(event) = rx.try_recv() {
            titles.push(title_of(&event));
        }
        titles
    }

    #[test]
    fn backlog_keeps_the_most_recent_fifty() {
        let registry = Registry::new();
        for i in 0..60 {
            registry.publish("g1", expense("g1", &format!("e{i}")));
        }

        let sink = RecordingSink::new();
        let replayed = registry.attach_with_backlog("g1", sink.clone()).unwrap();

        assert_eq!(replayed, 50);
        let expected: Vec<String> = (10..60).map(|i| format!("e{i}")).collect();
        assert_eq!(sink.titles(), expected);
        assert_eq!(registry.backlog_len("g1"), 0);
    }

    #[test]
    fn drain_backlog_returns_oldest_first_and_clears() {
        let registry = Registry::with_backlog_capacity(3);
        for title in ["a", "b", "c", "d"] {
            registry.publish("g1", expense("g1", title));
        }

        let drained: Vec<String> = registry
            .drain_backlog("g1")
            .iter()
            .map(|e| title_of(e))
            .collect();
        assert_eq!(drained, ["b", "c", "d"]);
        assert!(registry.drain_backlog("g1").is_empty());
        assert_eq!(registry.group_count(), 0);
    }

    #[test]
    fn publish_fans_out_to_every_sink_in_order() {
        let registry = Registry::new();
        let sinks = [RecordingSink::new(), RecordingSink::new(), RecordingSink::new()];
        for sink in &sinks {
            registry.attach("g1", sink.clone());
        }

        registry.publish("g1", expense("g1", "first"));
        registry.publish("g1", expense("g1", "second"));

        for sink in &sinks {
            assert_eq!(sink.titles(), ["first", "second"]);
        }
    }

    #[test]
    fn attaching_twice_does_not_duplicate_delivery() {
        let registry = Registry::new();
        let sink = RecordingSink::new();
        registry.attach("g1", sink.clone());
        registry.attach("g1", sink.clone());

        registry.publish("g1", expense("g1", "once"));

        assert_eq!(registry.sink_count("g1"), 1);
        assert_eq!(sink.titles(), ["once"]);
    }

    #[test]
    fn failing_sink_is_detached_without_affecting_others() {
        let registry = Registry::new();
        let first = RecordingSink::new();
        let broken = RecordingSink::broken();
        let third = RecordingSink::new();
        registry.attach("g1", first.clone());
        registry.attach("g1", broken.clone());
        registry.attach("g1", third.clone());

        registry.publish("g1", expense("g1", "one"));

        assert_eq!(first.titles(), ["one"]);
        assert_eq!(third.titles(), ["one"]);
        assert_eq!(registry.sink_count("g1"), 2);

        registry.publish("g1", expense("g1", "two"));
        assert_eq!(broken.attempts(), 1);
        assert_eq!(first.titles(), ["one", "two"]);
        assert_eq!(third.titles(), ["one", "two"]);
    }

    #[test]
    fn closed_channel_sink_is_detached_on_publish() {
        let registry = Registry::new();
        let (sink, rx) = ChannelSink::channel(8);
        registry.attach("g1", Arc::new(sink));
        drop(rx);

        registry.publish("g1", expense("g1", "lost"));

        assert_eq!(registry.sink_count("g1"), 0);
        assert_eq!(registry.backlog_len("g1"), 1);
    }

    #[test]
    fn groups_are_isolated() {
        let registry = Registry::new();
        let a = RecordingSink::new();
        let b = RecordingSink::new();
        registry.attach("a", a.clone());
        registry.attach("b", b.clone());

        registry.publish("a", expense("a", "only-a"));

        assert_eq!(a.titles(), ["only-a"]);
        assert!(b.titles().is_empty());
        assert_eq!(registry.backlog_len("b"), 0);
    }

    #[test]
    fn detach_is_a_noop_for_unknown_sinks_and_groups() {
        let registry = Registry::new();
        registry.detach("missing", SinkId::new());

        let sink = RecordingSink::new();
        registry.attach("g1", sink.clone());
        registry.detach("g1", SinkId::new());
        assert_eq!(registry.sink_count("g1"), 1);

        registry.detach("g1", sink.id());
        registry.detach("g1", sink.id());
        assert_eq!(registry.sink_count("g1"), 0);
        assert_eq!(registry.group_count(), 0);
    }

    #[test]
    fn channel_with_backlog_survives_last_detach() {
        let registry = Registry::new();
        let sink = RecordingSink::new();
        registry.attach("g1", sink.clone());
        registry.publish("g1", expense("g1", "kept"));

        registry.detach("g1", sink.id());

        assert_eq!(registry.group_count(), 1);
        assert_eq!(registry.backlog_len("g1"), 1);
    }

    #[test]
    fn replay_then_live_has_no_gap_or_duplicate() {
        let registry = Registry::new();
        registry.publish("g1", expense("g1", "old-1"));
        registry.publish("g1", expense("g1", "old-2"));

        let (sink, mut rx) = ChannelSink::channel(16);
        registry.attach_with_backlog("g1", Arc::new(sink)).unwrap();
        registry.publish("g1", expense("g1", "live-1"));
        registry.publish("g1", expense("g1", "live-2"));

        assert_eq!(
            drain_titles(&mut rx),
            ["old-1", "old-2", "live-1", "live-2"]
        );
    }

    #[test]
    fn failed_replay_restores_backlog_and_skips_attach() {
        let registry = Registry::new();
        registry.publish("g1", expense("g1", "a"));
        registry.publish("g1", expense("g1", "b"));

        let (sink, _rx) = ChannelSink::channel(1);
        let result = registry.attach_with_backlog("g1", Arc::new(sink));

        assert_eq!(result, Err(DeliveryError::Full));
        assert_eq!(registry.sink_count("g1"), 0);
        assert_eq!(registry.backlog_len("g1"), 2);
    }

    #[test]
    fn late_joiner_receives_backlog_then_live_events() {
        let registry = Registry::new();
        let s1 = RecordingSink::new();
        registry.attach_with_backlog("g1", s1.clone()).unwrap();

        registry.publish("g1", expense("g1", "Lunch"));
        assert_eq!(s1.titles(), ["Lunch"]);

        let s2 = RecordingSink::new();
        let replayed = registry.attach_with_backlog("g1", s2.clone()).unwrap();
        assert_eq!(replayed, 1);
        assert_eq!(s2.titles(), ["Lunch"]);

        registry.publish("g1", expense("g1", "Dinner"));
        assert_eq!(s1.titles(), ["Lunch", "Dinner"]);
        assert_eq!(s2.titles(), ["Lunch", "Dinner"]);
    }

    #[test]
    fn concurrent_publishers_reach_every_sink_once() {
        let registry = Arc::new(Registry::with_backlog_capacity(0));
        let sinks: Vec<_> = (0..3).map(|_| RecordingSink::new()).collect();
        for sink in &sinks {
            registry.attach("g1", sink.clone());
        }

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        registry.publish("g1", expense("g1", &format!("{worker}-{i}")));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let reference = sinks[0].titles();
        assert_eq!(reference.len(), 100);
        for sink in &sinks[1..] {
            assert_eq!(sink.titles(), reference);
        }
    }
}
