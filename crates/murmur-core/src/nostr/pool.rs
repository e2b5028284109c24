//! Connection pool over a fixed relay set.
//!
//! The pool gives publish/query/subscribe the same shape regardless of
//! whether the underlying transport answers in batches or streams. Which
//! surface is used is fixed when the pool is built.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use nostr_sdk::prelude::*;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};

use super::transport::{RelayTransport, StreamItem};
use crate::config::RelayScope;
use crate::error::{CoreError, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolVariant {
    BatchCapable,
    StreamCapable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// Every relay either sent end-of-stream or failed
    EndOfStream,
    /// The fallback ceiling passed first
    Timeout,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub reason: CompletionReason,
    pub failed_relays: Vec<(RelayUrl, String)>,
}

impl Completion {
    pub fn is_complete(&self) -> bool {
        self.reason == CompletionReason::EndOfStream
    }
}

#[derive(Debug, Clone)]
pub struct QueryOutcome {
    /// Unordered, one entry per event id
    pub events: Vec<Event>,
    pub complete: bool,
    pub failed_relays: Vec<(RelayUrl, String)>,
}

/// Per-relay publish results. Never collapsed into a single verdict.
#[derive(Debug, Clone)]
pub struct PublishReport {
    pub event_id: EventId,
    pub outcomes: Vec<(RelayUrl, Result<(), TransportError>)>,
}

impl PublishReport {
    pub fn accepted_by(&self) -> Vec<&RelayUrl> {
        self.outcomes
            .iter()
            .filter(|(_, result)| result.is_ok())
            .map(|(relay, _)| relay)
            .collect()
    }

    pub fn failures(&self) -> Vec<(&RelayUrl, &TransportError)> {
        self.outcomes
            .iter()
            .filter_map(|(relay, result)| result.as_ref().err().map(|e| (relay, e)))
            .collect()
    }

    pub fn any_accepted(&self) -> bool {
        self.outcomes.iter().any(|(_, result)| result.is_ok())
    }
}

/// Callbacks run behind this gate. Once shut, no callback starts, and
/// shutting waits for one already running.
#[derive(Clone)]
struct CallbackGate(Arc<Mutex<bool>>);

impl CallbackGate {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(true)))
    }

    fn run<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let open = self.0.lock();
        if *open {
            Some(f())
        } else {
            None
        }
    }

    fn shut(&self) {
        *self.0.lock() = false;
    }
}

/// Owner of one running subscription. Closing (or dropping) stops the
/// relay subscriptions, the fallback timer and every further callback.
pub struct SubscriptionHandle {
    cancel_tx: watch::Sender<bool>,
    gate: CallbackGate,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn close(&self) {
        self.gate.shut();
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

pub struct ConnectionPool {
    transport: Arc<dyn RelayTransport>,
    relays: Vec<RelayUrl>,
    variant: PoolVariant,
    /// Relays whose last query or publish failed
    unreachable: RwLock<HashSet<RelayUrl>>,
}

impl ConnectionPool {
    pub fn new(transport: Arc<dyn RelayTransport>, relays: Vec<RelayUrl>) -> Result<Self, CoreError> {
        let capabilities = transport.capabilities();
        let variant = if capabilities.batch {
            PoolVariant::BatchCapable
        } else if capabilities.stream {
            PoolVariant::StreamCapable
        } else {
            return Err(CoreError::config(
                "relay transport supports neither batch queries nor subscriptions",
            ));
        };
        tracing::info!("Connection pool ready: {:?} over {} relay(s)", variant, relays.len());
        Ok(Self {
            transport,
            relays,
            variant,
            unreachable: RwLock::new(HashSet::new()),
        })
    }

    pub fn variant(&self) -> PoolVariant {
        self.variant
    }

    pub fn relays(&self) -> &[RelayUrl] {
        &self.relays
    }

    /// `First` picks the first configured relay not known to be failing,
    /// or the first configured one when all are.
    pub fn select(&self, scope: RelayScope) -> Vec<RelayUrl> {
        match scope {
            RelayScope::All => self.relays.clone(),
            RelayScope::First => {
                let unreachable = self.unreachable.read();
                self.relays
                    .iter()
                    .find(|relay| !unreachable.contains(*relay))
                    .or_else(|| self.relays.first())
                    .cloned()
                    .into_iter()
                    .collect()
            }
        }
    }

    fn record_health(&self, relay: &RelayUrl, reachable: bool) {
        let mut unreachable = self.unreachable.write();
        let changed = if reachable {
            unreachable.remove(relay)
        } else {
            unreachable.insert(relay.clone())
        };
        if changed {
            tracing::debug!("Relay {} is now {}", relay, if reachable { "reachable" } else { "unreachable" });
        }
    }

    /// Disconnect from every relay. Queries after this fail per relay.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down connection pool");
        self.transport.shutdown().await;
    }

    /// Send `event` to each relay concurrently, each bounded by `timeout`.
    pub async fn publish(&self, event: &Event, relays: &[RelayUrl], timeout: Duration) -> PublishReport {
        let attempts = relays.iter().map(|relay| async move {
            let result = match tokio::time::timeout(timeout, self.transport.publish(relay, event)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::TimedOut(timeout)),
            };
            match &result {
                Ok(()) => tracing::debug!("{} accepted {}", relay, event.id.to_hex()),
                Err(e) => tracing::warn!("{} did not accept {}: {}", relay, event.id.to_hex(), e),
            }
            (relay.clone(), result)
        });
        let outcomes = futures::future::join_all(attempts).await;
        for (relay, result) in &outcomes {
            let unreachable = matches!(
                result,
                Err(TransportError::Unreachable(_) | TransportError::TimedOut(_))
            );
            self.record_health(relay, !unreachable);
        }
        PublishReport {
            event_id: event.id,
            outcomes,
        }
    }

    /// Open a subscription on `relays`. `on_event` fires at most once per
    /// event id; `on_complete` fires once, on end-of-stream from every relay
    /// or when `timeout` passes, unless the handle is closed first.
    /// Must be called from within a tokio runtime.
    pub fn subscribe<E, C>(
        &self,
        filter: Filter,
        relays: &[RelayUrl],
        timeout: Duration,
        on_event: E,
        on_complete: C,
    ) -> SubscriptionHandle
    where
        E: FnMut(Event) + Send + 'static,
        C: FnOnce(Completion) + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let gate = CallbackGate::new();
        let task = tokio::spawn(run_subscription(
            self.transport.clone(),
            self.variant,
            filter,
            relays.to_vec(),
            timeout,
            cancel_rx,
            gate.clone(),
            on_event,
            on_complete,
        ));
        SubscriptionHandle {
            cancel_tx,
            gate,
            task,
        }
    }

    /// One-shot query: subscribe, collect until completion, close.
    pub async fn query(&self, filter: Filter, relays: &[RelayUrl], timeout: Duration) -> QueryOutcome {
        let collected: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = collected.clone();
        let (done_tx, done_rx) = oneshot::channel();

        let handle = self.subscribe(
            filter,
            relays,
            timeout,
            move |event| sink.lock().push(event),
            move |completion| {
                let _ = done_tx.send(completion);
            },
        );
        let completion = done_rx.await;
        drop(handle);

        let events = std::mem::take(&mut *collected.lock());
        match completion {
            Ok(completion) => {
                for relay in relays {
                    let failed = completion.failed_relays.iter().any(|(r, _)| r == relay);
                    if failed {
                        self.record_health(relay, false);
                    } else if completion.is_complete() {
                        self.record_health(relay, true);
                    }
                }
                QueryOutcome {
                    events,
                    complete: completion.is_complete(),
                    failed_relays: completion.failed_relays,
                }
            }
            Err(_) => {
                tracing::warn!("Subscription task ended without completing");
                QueryOutcome {
                    events,
                    complete: false,
                    failed_relays: Vec::new(),
                }
            }
        }
    }
}

async fn forward_batch(
    transport: Arc<dyn RelayTransport>,
    relay: RelayUrl,
    filter: Filter,
    timeout: Duration,
    index: usize,
    tx: mpsc::Sender<(usize, StreamItem)>,
) {
    match transport.fetch(&relay, filter, timeout).await {
        Ok(events) => {
            for event in events {
                if tx.send((index, StreamItem::Event(Box::new(event)))).await.is_err() {
                    return;
                }
            }
            let _ = tx.send((index, StreamItem::EndOfStream)).await;
        }
        Err(e) => {
            let _ = tx.send((index, StreamItem::Closed(e))).await;
        }
    }
}

async fn forward_stream(
    transport: Arc<dyn RelayTransport>,
    relay: RelayUrl,
    filter: Filter,
    index: usize,
    tx: mpsc::Sender<(usize, StreamItem)>,
) {
    let mut stream = match transport.open_stream(&relay, filter).await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = tx.send((index, StreamItem::Closed(e))).await;
            return;
        }
    };
    while let Some(item) = stream.next().await {
        if tx.send((index, item)).await.is_err() {
            return;
        }
    }
    let ended = TransportError::Closed("stream ended".to_string());
    let _ = tx.send((index, StreamItem::Closed(ended))).await;
}

async fn wait_cancelled(cancel_rx: &mut watch::Receiver<bool>) {
    loop {
        if *cancel_rx.borrow() {
            return;
        }
        if cancel_rx.changed().await.is_err() {
            return;
        }
    }
}

enum Step {
    Item(Option<(usize, StreamItem)>),
    Deadline,
    Cancelled,
}

#[allow(clippy::too_many_arguments)]
async fn run_subscription<E, C>(
    transport: Arc<dyn RelayTransport>,
    variant: PoolVariant,
    filter: Filter,
    relays: Vec<RelayUrl>,
    timeout: Duration,
    mut cancel_rx: watch::Receiver<bool>,
    gate: CallbackGate,
    mut on_event: E,
    on_complete: C,
) where
    E: FnMut(Event) + Send + 'static,
    C: FnOnce(Completion) + Send + 'static,
{
    let (item_tx, mut item_rx) = mpsc::channel::<(usize, StreamItem)>(256);
    let mut forwarders = JoinSet::new();
    for (index, relay) in relays.iter().cloned().enumerate() {
        let transport = transport.clone();
        let filter = filter.clone();
        let tx = item_tx.clone();
        match variant {
            PoolVariant::BatchCapable => {
                forwarders.spawn(forward_batch(transport, relay, filter, timeout, index, tx));
            }
            PoolVariant::StreamCapable => {
                forwarders.spawn(forward_stream(transport, relay, filter, index, tx));
            }
        }
    }
    drop(item_tx);

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    let mut pending: HashSet<usize> = (0..relays.len()).collect();
    let mut seen: HashSet<EventId> = HashSet::new();
    let mut failed_relays: Vec<(RelayUrl, String)> = Vec::new();

    let reason = loop {
        if pending.is_empty() {
            break Some(CompletionReason::EndOfStream);
        }
        let step = tokio::select! {
            _ = wait_cancelled(&mut cancel_rx) => Step::Cancelled,
            _ = &mut deadline => Step::Deadline,
            item = item_rx.recv() => Step::Item(item),
        };
        match step {
            Step::Cancelled => break None,
            Step::Deadline => break Some(CompletionReason::Timeout),
            Step::Item(None) => break Some(CompletionReason::EndOfStream),
            Step::Item(Some((index, StreamItem::Event(event)))) => {
                if let Err(e) = event.verify() {
                    tracing::warn!("Dropping invalid event {} from {}: {}", event.id.to_hex(), relays[index], e);
                    continue;
                }
                if seen.insert(event.id) && gate.run(|| on_event(*event)).is_none() {
                    break None;
                }
            }
            Step::Item(Some((index, StreamItem::EndOfStream))) => {
                pending.remove(&index);
            }
            Step::Item(Some((index, StreamItem::Closed(reason)))) => {
                if pending.remove(&index) {
                    tracing::warn!("Relay {} failed: {}", relays[index], reason);
                    failed_relays.push((relays[index].clone(), reason.to_string()));
                }
            }
        }
    };
    forwarders.abort_all();

    if let Some(reason) = reason {
        if reason == CompletionReason::Timeout {
            tracing::debug!("Subscription hit fallback ceiling with {} relay(s) pending", pending.len());
        }
        let completion = Completion { reason, failed_relays };
        gate.run(|| on_complete(completion));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{relay, signed_note, tampered, MockRelay, MockTransport};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SHORT: Duration = Duration::from_millis(200);

    fn pool(transport: MockTransport, relays: Vec<RelayUrl>) -> ConnectionPool {
        ConnectionPool::new(Arc::new(transport), relays).unwrap()
    }

    #[test]
    fn test_variant_is_chosen_from_capabilities() {
        let batch = pool(MockTransport::batch(), vec![relay(1)]);
        assert_eq!(batch.variant(), PoolVariant::BatchCapable);

        let stream = pool(MockTransport::stream(), vec![relay(1)]);
        assert_eq!(stream.variant(), PoolVariant::StreamCapable);

        let neither = ConnectionPool::new(Arc::new(MockTransport::incapable()), vec![relay(1)]);
        assert!(neither.is_err());
    }

    #[test]
    fn test_select_first_scope() {
        let pool = pool(MockTransport::batch(), vec![relay(1), relay(2)]);
        assert_eq!(pool.select(RelayScope::First), vec![relay(1)]);
        assert_eq!(pool.select(RelayScope::All).len(), 2);
    }

    #[tokio::test]
    async fn test_first_scope_skips_relay_that_failed() {
        let transport = MockTransport::batch()
            .with_relay(relay(1), MockRelay::failing("connection refused"))
            .with_relay(relay(2), MockRelay::answering(vec![]));
        let pool = pool(transport, vec![relay(1), relay(2)]);
        assert_eq!(pool.select(RelayScope::First), vec![relay(1)]);

        pool.query(Filter::new(), pool.relays(), SHORT).await;
        assert_eq!(pool.select(RelayScope::First), vec![relay(2)]);
    }

    #[tokio::test]
    async fn test_first_scope_falls_back_when_every_relay_failed() {
        let transport = MockTransport::batch()
            .with_relay(relay(1), MockRelay::failing("refused"))
            .with_relay(relay(2), MockRelay::failing("refused"));
        let pool = pool(transport, vec![relay(1), relay(2)]);

        pool.query(Filter::new(), pool.relays(), SHORT).await;
        assert_eq!(pool.select(RelayScope::First), vec![relay(1)]);
    }

    #[tokio::test]
    async fn test_closed_stream_is_reported_as_failure() {
        let transport = MockTransport::stream().with_relay(relay(1), MockRelay::failing("refused"));
        let pool = pool(transport, vec![relay(1)]);

        let outcome = pool.query(Filter::new(), pool.relays(), SHORT).await;
        assert!(outcome.complete);
        assert_eq!(outcome.failed_relays.len(), 1);
        assert!(outcome.failed_relays[0].1.contains("refused"));
    }

    #[tokio::test]
    async fn test_query_deduplicates_across_relays() {
        let note = signed_note("same event", 100);
        let other = signed_note("other", 200);
        let transport = MockTransport::stream()
            .with_relay(relay(1), MockRelay::answering(vec![note.clone(), note.clone()]))
            .with_relay(relay(2), MockRelay::answering(vec![note.clone(), other.clone()]));
        let pool = pool(transport, vec![relay(1), relay(2)]);

        let outcome = pool.query(Filter::new(), pool.relays(), SHORT).await;
        assert!(outcome.complete);
        assert_eq!(outcome.events.len(), 2);
    }

    #[tokio::test]
    async fn test_query_without_end_of_stream_resolves_at_ceiling() {
        let note = signed_note("partial", 100);
        let transport = MockTransport::stream()
            .with_relay(relay(1), MockRelay::answering(vec![note]).without_end_of_stream())
            .with_relay(relay(2), MockRelay::silent());
        let pool = pool(transport, vec![relay(1), relay(2)]);

        let started = std::time::Instant::now();
        let outcome = pool.query(Filter::new(), pool.relays(), SHORT).await;
        assert!(!outcome.complete);
        assert_eq!(outcome.events.len(), 1);
        assert!(started.elapsed() < SHORT * 5);
    }

    #[tokio::test]
    async fn test_silent_batch_relays_resolve_empty_and_incomplete() {
        let transport = MockTransport::batch()
            .with_relay(relay(1), MockRelay::silent())
            .with_relay(relay(2), MockRelay::silent());
        let pool = pool(transport, vec![relay(1), relay(2)]);

        let outcome = pool.query(Filter::new(), pool.relays(), SHORT).await;
        assert!(!outcome.complete);
        assert!(outcome.events.is_empty());
    }

    #[tokio::test]
    async fn test_failing_relay_does_not_abort_others() {
        let note = signed_note("survivor", 100);
        let transport = MockTransport::batch()
            .with_relay(relay(1), MockRelay::failing("connection refused"))
            .with_relay(relay(2), MockRelay::answering(vec![note.clone()]));
        let pool = pool(transport, vec![relay(1), relay(2)]);

        let outcome = pool.query(Filter::new(), pool.relays(), SHORT).await;
        assert!(outcome.complete);
        assert_eq!(outcome.events, vec![note]);
        assert_eq!(outcome.failed_relays.len(), 1);
        assert_eq!(outcome.failed_relays[0].0, relay(1));
    }

    #[tokio::test]
    async fn test_invalid_events_are_dropped() {
        let good = signed_note("good", 100);
        let bad = tampered(&signed_note("bad", 100));
        let transport = MockTransport::stream()
            .with_relay(relay(1), MockRelay::answering(vec![bad, good.clone()]));
        let pool = pool(transport, vec![relay(1)]);

        let outcome = pool.query(Filter::new(), pool.relays(), SHORT).await;
        assert_eq!(outcome.events, vec![good]);
    }

    #[tokio::test]
    async fn test_on_complete_fires_once_and_no_events_after() {
        let notes: Vec<Event> = (0..3).map(|i| signed_note("n", 100 + i)).collect();
        let transport = MockTransport::stream()
            .with_relay(relay(1), MockRelay::answering(notes.clone()).with_events_after_end(vec![signed_note("late", 999)]));
        let pool = pool(transport, vec![relay(1)]);

        let events = Arc::new(AtomicUsize::new(0));
        let completions = Arc::new(AtomicUsize::new(0));
        let (e, c) = (events.clone(), completions.clone());
        let (done_tx, done_rx) = oneshot::channel();
        let _handle = pool.subscribe(
            Filter::new(),
            pool.relays(),
            SHORT,
            move |_| {
                e.fetch_add(1, Ordering::SeqCst);
            },
            move |completion| {
                c.fetch_add(1, Ordering::SeqCst);
                let _ = done_tx.send(completion.reason);
            },
        );

        assert_eq!(done_rx.await.unwrap(), CompletionReason::EndOfStream);
        tokio::time::sleep(SHORT).await;
        assert_eq!(events.load(Ordering::SeqCst), 3);
        assert_eq!(completions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_closed_handle_suppresses_callbacks() {
        let transport = MockTransport::stream().with_relay(relay(1), MockRelay::silent());
        let pool = pool(transport, vec![relay(1)]);

        let completions = Arc::new(AtomicUsize::new(0));
        let c = completions.clone();
        let handle = pool.subscribe(
            Filter::new(),
            pool.relays(),
            Duration::from_millis(50),
            |_| {},
            move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            },
        );
        handle.close();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(completions.load(Ordering::SeqCst), 0);
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_publish_reports_each_relay() {
        let transport = MockTransport::batch()
            .with_relay(relay(1), MockRelay::answering(vec![]))
            .with_relay(relay(2), MockRelay::failing("blocked: spam"))
            .with_relay(relay(3), MockRelay::silent());
        let pool = pool(transport, vec![relay(1), relay(2), relay(3)]);
        let event = signed_note("hello", 100);

        let report = pool.publish(&event, pool.relays(), SHORT).await;
        assert_eq!(report.event_id, event.id);
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.accepted_by(), vec![&relay(1)]);
        assert_eq!(report.failures().len(), 2);
        assert!(report
            .failures()
            .iter()
            .any(|(r, e)| **r == relay(3) && matches!(e, TransportError::TimedOut(_))));
        assert!(report.any_accepted());
    }
}
