use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::errors::Error;
use crate::ws::frame::{Envelope, Push};
use crate::ws::topic::Topic;

/// Channel families whose wire names embed a parameter (`candle1m`,
/// `mark-price-candle1H`, `books5`, ...). Matched longest-prefix-first so a
/// name belongs to exactly one family; `candle` never swallows
/// `mark-price-candle1m`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelFamily {
    MarkPriceCandle,
    IndexCandle,
    Candle,
    Books,
}

impl ChannelFamily {
    fn of(channel: &str) -> Option<Self> {
        if channel.starts_with("mark-price-candle") {
            Some(Self::MarkPriceCandle)
        } else if channel.starts_with("index-candle") {
            Some(Self::IndexCandle)
        } else if channel.starts_with("candle") {
            Some(Self::Candle)
        } else if channel.starts_with("books") || channel == "bbo-tbt" {
            Some(Self::Books)
        } else {
            None
        }
    }
}

enum SinkStatus {
    Delivered,
    Full,
    Closed,
    DecodeFailed,
}

type SinkFn = dyn Fn(&str) -> SinkStatus + Send + Sync;

struct Entry {
    live: bool,
    family: Option<ChannelFamily>,
    // Shared so dispatch can invoke the sink with the map lock released.
    sink: Option<Arc<SinkFn>>,
    dropped: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpKind {
    Subscribe,
    Unsubscribe { clear_sink: bool },
}

struct PendingOp {
    kind: OpKind,
    tx: oneshot::Sender<Result<(), Error>>,
}

/// Outcome of routing one raw frame, reported to the reader loop.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Dispatched {
    Pong,
    Login { ok: bool, code: i64, msg: String },
    Ack,
    /// Error event that matched no pending operation; during the login
    /// handshake this is how the venue rejects bad credentials.
    ErrorEvent { code: i64, msg: String },
    Delivered,
    Dropped,
    NoRoute,
    Ignored,
}

struct RouterState {
    // BTreeMap keeps fallback iteration deterministic.
    entries: BTreeMap<Topic, Entry>,
    pending: HashMap<Topic, PendingOp>,
    closed: bool,
}

/// Tracks the live subscription set for one connection scope and routes
/// inbound frames to the registered typed sink per topic.
///
/// The mutex guards only map mutation; it is never held across I/O or
/// payload decoding, and `dispatch` never blocks: a full or closed sink
/// drops the frame and bumps the topic's loss counter.
pub(crate) struct Router {
    state: Mutex<RouterState>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RouterState {
                entries: BTreeMap::new(),
                pending: HashMap::new(),
                closed: false,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RouterState> {
        // Sink closures never panic, so poisoning cannot occur in practice;
        // recover rather than propagate if it somehow does.
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Install a typed sink for `topic` and return its receiver.
    ///
    /// At most one entry exists per topic: re-registering a live topic
    /// replaces only the sink. The returned flag says whether a wire
    /// subscribe is still needed (false for a live replacement).
    pub fn register<T>(
        &self,
        topic: Topic,
        buffer: usize,
    ) -> Result<(mpsc::Receiver<Push<T>>, bool), Error>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(buffer);
        let dropped = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&dropped);
        let sink: Arc<SinkFn> = Arc::new(move |raw: &str| match serde_json::from_str::<Push<T>>(raw) {
            Ok(push) => match tx.try_send(push) {
                Ok(()) => SinkStatus::Delivered,
                Err(TrySendError::Full(_)) => {
                    counter.fetch_add(1, Ordering::Relaxed);
                    SinkStatus::Full
                }
                Err(TrySendError::Closed(_)) => {
                    counter.fetch_add(1, Ordering::Relaxed);
                    SinkStatus::Closed
                }
            },
            Err(_) => {
                counter.fetch_add(1, Ordering::Relaxed);
                SinkStatus::DecodeFailed
            }
        });

        let mut st = self.lock();
        if st.closed {
            return Err(Error::Closed);
        }
        let family = ChannelFamily::of(topic.channel());
        let needs_wire = match st.entries.get_mut(&topic) {
            Some(entry) if entry.live => {
                entry.sink = Some(sink);
                entry.dropped = dropped;
                false
            }
            _ => {
                st.entries.insert(
                    topic,
                    Entry {
                        live: true,
                        family,
                        sink: Some(sink),
                        dropped,
                    },
                );
                true
            }
        };
        Ok((rx, needs_wire))
    }

    /// Re-activate a dead entry whose sink was retained across an earlier
    /// unsubscribe. Returns whether a wire subscribe is needed.
    pub fn reactivate(&self, topic: &Topic) -> Result<bool, Error> {
        let mut st = self.lock();
        if st.closed {
            return Err(Error::Closed);
        }
        match st.entries.get_mut(topic) {
            Some(entry) if entry.sink.is_some() => {
                let was_dead = !entry.live;
                entry.live = true;
                Ok(was_dead)
            }
            _ => Err(Error::Protocol(format!("no retained subscription for topic {topic}"))),
        }
    }

    /// Mark an entry dead without touching the wire; used when unsubscribing
    /// while disconnected. Returns true when a live entry existed.
    pub fn deactivate(&self, topic: &Topic, clear_sink: bool) -> bool {
        let mut st = self.lock();
        match st.entries.get_mut(topic) {
            Some(entry) => {
                let was_live = entry.live;
                entry.live = false;
                if clear_sink {
                    st.entries.remove(topic);
                }
                was_live
            }
            None => false,
        }
    }

    pub fn is_live(&self, topic: &Topic) -> bool {
        self.lock().entries.get(topic).is_some_and(|e| e.live)
    }

    /// Frames dropped (queue overflow or decode failure) for a topic.
    pub fn dropped_frames(&self, topic: &Topic) -> u64 {
        self.lock()
            .entries
            .get(topic)
            .map_or(0, |e| e.dropped.load(Ordering::Relaxed))
    }

    /// The replay set: every live topic, re-subscribed in one batched frame
    /// after a reconnect.
    pub fn live_topics(&self) -> Vec<Topic> {
        self.lock()
            .entries
            .iter()
            .filter(|(_, e)| e.live)
            .map(|(t, _)| t.clone())
            .collect()
    }

    /// Reserve a pending control operation per topic, failing if any topic
    /// already has one in flight. All-or-nothing under a single lock, so
    /// concurrent calls cannot interleave conflicting operations.
    pub fn begin_ops(
        &self,
        topics: &[Topic],
        kind: OpKind,
    ) -> Result<Vec<(Topic, oneshot::Receiver<Result<(), Error>>)>, Error> {
        let mut st = self.lock();
        if st.closed {
            return Err(Error::Closed);
        }
        if let Some(conflict) = topics.iter().find(|t| st.pending.contains_key(t)) {
            return Err(Error::SubscriptionPending(conflict.to_string()));
        }
        let mut waiters = Vec::with_capacity(topics.len());
        for topic in topics {
            let (tx, rx) = oneshot::channel();
            st.pending.insert(topic.clone(), PendingOp { kind, tx });
            waiters.push((topic.clone(), rx));
        }
        Ok(waiters)
    }

    /// Abandon a pending operation after an ack timeout. A timed-out
    /// subscribe also removes its entry so no ghost deliveries follow.
    pub fn cancel_op(&self, topic: &Topic) {
        let mut st = self.lock();
        if let Some(op) = st.pending.remove(topic) {
            if op.kind == OpKind::Subscribe {
                st.entries.remove(topic);
            }
        }
    }

    /// Fail every pending operation; used on connection loss. Entries of
    /// failed subscribes are removed so the reconnect replay does not revive
    /// subscriptions their callers saw fail.
    pub fn fail_all_pending(&self, err: impl Fn() -> Error) {
        let mut st = self.lock();
        let pending = std::mem::take(&mut st.pending);
        for (topic, op) in pending {
            if op.kind == OpKind::Subscribe {
                st.entries.remove(&topic);
            }
            let _ = op.tx.send(Err(err()));
        }
    }

    /// Terminal teardown: drop every sink (receivers observe channel close),
    /// fail every pending wait, refuse further registration and dispatch.
    pub fn close_all(&self) {
        let mut st = self.lock();
        st.closed = true;
        st.entries.clear();
        let pending = std::mem::take(&mut st.pending);
        drop(st);
        for (_, op) in pending {
            let _ = op.tx.send(Err(Error::Closed));
        }
    }

    /// Route one raw frame. Runs on the reader loop and never blocks.
    pub fn dispatch(&self, raw: &str) -> Dispatched {
        if raw == "pong" {
            return Dispatched::Pong;
        }
        let env: Envelope = match serde_json::from_str(raw) {
            Ok(env) => env,
            Err(e) => {
                debug!(error = %e, "discarding unparseable frame");
                return Dispatched::Ignored;
            }
        };

        if let Some(event) = env.event.as_deref() {
            return match event {
                "login" => Dispatched::Login {
                    ok: env.code() == 0,
                    code: env.code(),
                    msg: env.msg.clone().unwrap_or_default(),
                },
                "subscribe" | "unsubscribe" => {
                    self.complete_ack(&env, Ok(()));
                    Dispatched::Ack
                }
                "error" => {
                    let code = env.code();
                    let msg = env.msg.clone().unwrap_or_default();
                    if self.complete_ack(&env, Err(Error::Api { code, msg: msg.clone() })) {
                        Dispatched::Ack
                    } else {
                        Dispatched::ErrorEvent { code, msg }
                    }
                }
                _ => Dispatched::Ignored,
            };
        }

        if !env.is_push() {
            return Dispatched::Ignored;
        }
        let Some(inbound) = env.topic() else {
            return Dispatched::Ignored;
        };
        self.route_push(&inbound, raw)
    }

    fn route_push(&self, inbound: &Topic, raw: &str) -> Dispatched {
        // Clone the matched sink out of the map so the lock is released
        // before payload deserialization; critical sections stay limited to
        // map mutation.
        let sink = {
            let st = self.lock();
            if st.closed {
                return Dispatched::Ignored;
            }
            match Self::find_route(&st, inbound).and_then(|e| e.sink.clone()) {
                Some(sink) => sink,
                // Not an error: frames for topics nobody subscribed to are
                // silently discarded.
                None => return Dispatched::NoRoute,
            }
        };

        match sink(raw) {
            SinkStatus::Delivered => Dispatched::Delivered,
            SinkStatus::Full => {
                warn!(topic = %inbound, "sink full, dropping push frame");
                Dispatched::Dropped
            }
            SinkStatus::Closed => {
                debug!(topic = %inbound, "sink receiver gone, dropping push frame");
                Dispatched::Dropped
            }
            SinkStatus::DecodeFailed => {
                warn!(topic = %inbound, "push payload failed to decode, dropping frame");
                Dispatched::Dropped
            }
        }
    }

    /// Exact-topic lookup, then two fallback passes for channels whose wire
    /// name embeds a parameter or whose `arg` carries extra server-added
    /// keys: same channel name with an argument subset, then same channel
    /// family with an argument subset.
    fn find_route<'a>(st: &'a RouterState, inbound: &Topic) -> Option<&'a Entry> {
        if let Some(entry) = st.entries.get(inbound).filter(|e| e.live) {
            return Some(entry);
        }
        if let Some((_, entry)) = st
            .entries
            .iter()
            .find(|(t, e)| e.live && t.channel() == inbound.channel() && t.args_subset_of(inbound))
        {
            return Some(entry);
        }
        let family = ChannelFamily::of(inbound.channel())?;
        st.entries
            .iter()
            .find(|(t, e)| e.live && e.family == Some(family) && t.args_subset_of(inbound))
            .map(|(_, e)| e)
    }

    /// Resolve the pending operation an acknowledgment refers to, returning
    /// whether any waiter was settled. Error acks without an `arg` fail
    /// every pending operation, matching the venue's batch rejection
    /// semantics.
    fn complete_ack(&self, env: &Envelope, result: Result<(), Error>) -> bool {
        let mut st = self.lock();
        match env.topic() {
            Some(inbound) => {
                let Some((topic, op)) = Self::take_pending(&mut st, &inbound) else {
                    // Replay acks after a reconnect have no pending waiter.
                    return false;
                };
                Self::settle(&mut st, &topic, op, result);
                true
            }
            None => {
                let pending: Vec<Topic> = st.pending.keys().cloned().collect();
                let settled = !pending.is_empty();
                for topic in pending {
                    if let Some(op) = st.pending.remove(&topic) {
                        let res = match &result {
                            Ok(()) => Ok(()),
                            Err(Error::Api { code, msg }) => Err(Error::Api {
                                code: *code,
                                msg: msg.clone(),
                            }),
                            Err(e) => Err(Error::Protocol(e.to_string())),
                        };
                        Self::settle(&mut st, &topic, op, res);
                    }
                }
                settled
            }
        }
    }

    fn take_pending(st: &mut RouterState, inbound: &Topic) -> Option<(Topic, PendingOp)> {
        if let Some(op) = st.pending.remove(inbound) {
            return Some((inbound.clone(), op));
        }
        let key = st
            .pending
            .keys()
            .find(|t| t.channel() == inbound.channel() && t.args_subset_of(inbound))?
            .clone();
        let op = st.pending.remove(&key)?;
        Some((key, op))
    }

    fn settle(st: &mut RouterState, topic: &Topic, op: PendingOp, result: Result<(), Error>) {
        match (op.kind, &result) {
            // A rejected subscribe leaves no entry behind.
            (OpKind::Subscribe, Err(_)) => {
                st.entries.remove(topic);
            }
            (OpKind::Unsubscribe { clear_sink }, Ok(())) => {
                if let Some(entry) = st.entries.get_mut(topic) {
                    entry.live = false;
                }
                if clear_sink {
                    st.entries.remove(topic);
                }
            }
            _ => {}
        }
        let _ = op.tx.send(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Ticker;

    fn tickers_topic(inst: &str) -> Topic {
        Topic::new("tickers").arg("instId", inst)
    }

    fn push_frame(inst: &str, last: &str) -> String {
        format!(
            r#"{{"arg":{{"channel":"tickers","instId":"{inst}"}},"data":[{{"instId":"{inst}","last":"{last}"}}]}}"#
        )
    }

    #[test]
    fn exact_match_delivers_exactly_once() {
        let router = Router::new();
        let (mut rx, needs_wire) = router
            .register::<Ticker>(tickers_topic("BTC-USDT"), 8)
            .unwrap();
        assert!(needs_wire);

        assert_eq!(router.dispatch(&push_frame("BTC-USDT", "43550")), Dispatched::Delivered);
        let push = rx.try_recv().unwrap();
        assert_eq!(push.data.len(), 1);
        assert_eq!(push.data[0].last, "43550");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unmatched_push_is_silently_discarded() {
        let router = Router::new();
        let (mut rx, _) = router
            .register::<Ticker>(tickers_topic("BTC-USDT"), 8)
            .unwrap();

        assert_eq!(router.dispatch(&push_frame("ETH-USDT", "2300")), Dispatched::NoRoute);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn resubscribe_replaces_sink_without_wire_frame() {
        let router = Router::new();
        let topic = tickers_topic("BTC-USDT");
        let (mut first, _) = router.register::<Ticker>(topic.clone(), 8).unwrap();
        let (mut second, needs_wire) = router.register::<Ticker>(topic.clone(), 8).unwrap();
        assert!(!needs_wire, "live topic replacement must not resubscribe");
        assert_eq!(router.live_topics(), vec![topic]);

        router.dispatch(&push_frame("BTC-USDT", "100"));
        assert!(second.try_recv().is_ok(), "second sink receives");
        assert!(first.try_recv().is_err(), "first sink was replaced");
    }

    #[test]
    fn subscribe_then_unsubscribe_leaves_nothing_live() {
        let router = Router::new();
        let topic = tickers_topic("BTC-USDT");
        let (mut rx, _) = router.register::<Ticker>(topic.clone(), 8).unwrap();

        let waiters = router.begin_ops(&[topic.clone()], OpKind::Unsubscribe { clear_sink: true }).unwrap();
        assert_eq!(
            router.dispatch(r#"{"event":"unsubscribe","arg":{"channel":"tickers","instId":"BTC-USDT"}}"#),
            Dispatched::Ack
        );
        for (_, mut rx) in waiters {
            assert!(rx.try_recv().unwrap().is_ok());
        }
        assert!(!router.is_live(&topic));
        assert!(router.live_topics().is_empty());
        assert_eq!(router.dispatch(&push_frame("BTC-USDT", "1")), Dispatched::NoRoute);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unsubscribe_can_retain_sink_for_resume() {
        let router = Router::new();
        let topic = tickers_topic("BTC-USDT");
        let (mut rx, _) = router.register::<Ticker>(topic.clone(), 8).unwrap();

        router.begin_ops(&[topic.clone()], OpKind::Unsubscribe { clear_sink: false }).unwrap();
        router.dispatch(r#"{"event":"unsubscribe","arg":{"channel":"tickers","instId":"BTC-USDT"}}"#);
        assert!(!router.is_live(&topic));

        // Dead entries do not receive.
        assert_eq!(router.dispatch(&push_frame("BTC-USDT", "1")), Dispatched::NoRoute);

        assert!(router.reactivate(&topic).unwrap());
        assert_eq!(router.dispatch(&push_frame("BTC-USDT", "2")), Dispatched::Delivered);
        assert_eq!(rx.try_recv().unwrap().data[0].last, "2");
    }

    #[test]
    fn conflicting_op_on_same_topic_is_rejected() {
        let router = Router::new();
        let topic = tickers_topic("BTC-USDT");
        router.register::<Ticker>(topic.clone(), 8).unwrap();
        let _waiters = router.begin_ops(&[topic.clone()], OpKind::Subscribe).unwrap();

        let err = router
            .begin_ops(
                &[tickers_topic("ETH-USDT"), topic.clone()],
                OpKind::Unsubscribe { clear_sink: false },
            )
            .unwrap_err();
        assert!(matches!(err, Error::SubscriptionPending(_)));
        // The all-or-nothing check left ETH-USDT unreserved.
        assert!(router.begin_ops(&[tickers_topic("ETH-USDT")], OpKind::Subscribe).is_ok());
    }

    #[test]
    fn error_ack_fails_the_matching_subscribe_and_removes_its_entry() {
        let router = Router::new();
        let topic = tickers_topic("BTC-USDT");
        router.register::<Ticker>(topic.clone(), 8).unwrap();
        let waiters = router.begin_ops(&[topic.clone()], OpKind::Subscribe).unwrap();

        router.dispatch(
            r#"{"event":"error","code":"60012","msg":"Invalid request","arg":{"channel":"tickers","instId":"BTC-USDT"}}"#,
        );
        for (_, mut rx) in waiters {
            let err = rx.try_recv().unwrap().unwrap_err();
            assert!(matches!(err, Error::Api { code: 60012, .. }));
        }
        assert!(router.live_topics().is_empty());
    }

    #[test]
    fn error_ack_without_arg_fails_all_pending() {
        let router = Router::new();
        let a = tickers_topic("BTC-USDT");
        let b = tickers_topic("ETH-USDT");
        router.register::<Ticker>(a.clone(), 8).unwrap();
        router.register::<Ticker>(b.clone(), 8).unwrap();
        let waiters = router.begin_ops(&[a, b], OpKind::Subscribe).unwrap();

        router.dispatch(r#"{"event":"error","code":"60009","msg":"login failed"}"#);
        for (_, mut rx) in waiters {
            assert!(rx.try_recv().unwrap().is_err());
        }
    }

    #[test]
    fn malformed_payload_drops_frame_and_counts() {
        let router = Router::new();
        let topic = Topic::new("books").arg("instId", "BTC-USDT");
        let (mut book_rx, _) = router
            .register::<crate::types::OrderBookData>(topic.clone(), 8)
            .unwrap();
        let (mut tick_rx, _) = router
            .register::<Ticker>(tickers_topic("BTC-USDT"), 8)
            .unwrap();

        // `asks` must be an array of levels; a bare string fails decode.
        let malformed = r#"{"arg":{"channel":"books","instId":"BTC-USDT"},"data":[{"asks":"broken"}]}"#;
        assert_eq!(router.dispatch(malformed), Dispatched::Dropped);
        assert_eq!(router.dropped_frames(&topic), 1);
        assert!(book_rx.try_recv().is_err());

        // Other live topics are unaffected.
        assert_eq!(router.dispatch(&push_frame("BTC-USDT", "9")), Dispatched::Delivered);
        assert!(tick_rx.try_recv().is_ok());
    }

    #[test]
    fn full_sink_drops_newest_and_counts() {
        let router = Router::new();
        let topic = tickers_topic("BTC-USDT");
        let (mut rx, _) = router.register::<Ticker>(topic.clone(), 1).unwrap();

        assert_eq!(router.dispatch(&push_frame("BTC-USDT", "1")), Dispatched::Delivered);
        assert_eq!(router.dispatch(&push_frame("BTC-USDT", "2")), Dispatched::Dropped);
        assert_eq!(router.dropped_frames(&topic), 1);
        // The queued frame is the older one.
        assert_eq!(rx.try_recv().unwrap().data[0].last, "1");
    }

    #[test]
    fn candle_family_fallback_routes_dynamic_names() {
        let router = Router::new();
        let registered = Topic::new("candle1m").arg("instId", "BTC-USDT");
        let (mut rx, _) = router
            .register::<crate::types::Candle>(registered, 8)
            .unwrap();

        // The inbound arg carries an extra key, so exact lookup misses and
        // the candle family predicate routes it.
        let frame = r#"{"arg":{"channel":"candle1m","instId":"BTC-USDT","instType":"SPOT"},"data":[["1629993600000","1","2","0.5","1.5","10"]]}"#;
        assert_eq!(router.dispatch(frame), Dispatched::Delivered);
        assert_eq!(rx.try_recv().unwrap().data[0].close(), Some("1.5"));
    }

    #[test]
    fn mark_price_candles_never_match_the_plain_candle_family() {
        let router = Router::new();
        let (mut candles, _) = router
            .register::<crate::types::Candle>(Topic::new("candle1m").arg("instId", "BTC-USDT"), 8)
            .unwrap();

        let frame = r#"{"arg":{"channel":"mark-price-candle1m","instId":"BTC-USDT","extra":"1"},"data":[["1629993600000","1","2","0.5","1.5"]]}"#;
        assert_eq!(router.dispatch(frame), Dispatched::NoRoute);
        assert!(candles.try_recv().is_err());
    }

    #[test]
    fn pong_and_unknown_events_are_not_errors() {
        let router = Router::new();
        assert_eq!(router.dispatch("pong"), Dispatched::Pong);
        assert_eq!(router.dispatch(r#"{"event":"channel-conn-count","channel":"tickers"}"#), Dispatched::Ignored);
        assert_eq!(router.dispatch("not json at all"), Dispatched::Ignored);
    }

    #[test]
    fn login_ack_is_surfaced_to_the_connection() {
        let router = Router::new();
        assert_eq!(
            router.dispatch(r#"{"event":"login","code":"0","msg":""}"#),
            Dispatched::Login { ok: true, code: 0, msg: String::new() }
        );
        assert_eq!(
            router.dispatch(r#"{"event":"login","code":"60009","msg":"Login failed"}"#),
            Dispatched::Login { ok: false, code: 60009, msg: "Login failed".into() }
        );
    }

    #[test]
    fn dispatch_and_control_ops_make_progress_concurrently() {
        let router = Arc::new(Router::new());
        let (mut rx, _) = router
            .register::<Ticker>(tickers_topic("BTC-USDT"), 1024)
            .unwrap();

        let dispatcher = {
            let router = Arc::clone(&router);
            std::thread::spawn(move || {
                for i in 0..500 {
                    router.dispatch(&push_frame("BTC-USDT", &i.to_string()));
                }
            })
        };
        // Map mutation on another thread must not be starved by decoding.
        for i in 0..500 {
            let topic = tickers_topic(&format!("ETH-{i}"));
            router.register::<Ticker>(topic.clone(), 1).unwrap();
            router.deactivate(&topic, true);
        }
        dispatcher.join().unwrap();

        let mut delivered = 0;
        while rx.try_recv().is_ok() {
            delivered += 1;
        }
        assert_eq!(delivered, 500);
        assert_eq!(router.dropped_frames(&tickers_topic("BTC-USDT")), 0);
    }

    #[test]
    fn close_all_releases_sinks_and_pending_waits() {
        let router = Router::new();
        let topic = tickers_topic("BTC-USDT");
        let (mut rx, _) = router.register::<Ticker>(topic.clone(), 8).unwrap();
        let waiters = router.begin_ops(&[topic.clone()], OpKind::Subscribe).unwrap();

        router.close_all();
        for (_, mut w) in waiters {
            assert!(matches!(w.try_recv().unwrap().unwrap_err(), Error::Closed));
        }
        // Receiver observes the terminal close.
        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::mpsc::error::TryRecvError::Disconnected)
        ));
        assert_eq!(router.dispatch(&push_frame("BTC-USDT", "1")), Dispatched::Ignored);
        assert!(matches!(
            router.register::<Ticker>(topic, 8).unwrap_err(),
            Error::Closed
        ));
    }
}
