//! Relay transports.
//!
//! A transport knows how to reach a single relay. Some transports can only
//! answer one-shot batch fetches, some only stream; `capabilities()` tells
//! the pool which, and the pool asks exactly once.

use std::time::Duration;

use futures::future::BoxFuture;
use nostr_sdk::prelude::*;
use tokio::sync::mpsc;

use crate::error::{CoreError, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Supports `fetch` (return all stored matches at once)
    pub batch: bool,
    /// Supports `open_stream` (per-event delivery plus end-of-stream)
    pub stream: bool,
}

#[derive(Debug)]
pub enum StreamItem {
    Event(Box<Event>),
    EndOfStream,
    Closed(TransportError),
}

/// Items from one relay subscription. Dropping the stream ends the
/// subscription on the relay.
pub struct RelayStream {
    items: mpsc::Receiver<StreamItem>,
}

impl RelayStream {
    pub fn new(items: mpsc::Receiver<StreamItem>) -> Self {
        Self { items }
    }

    pub async fn next(&mut self) -> Option<StreamItem> {
        self.items.recv().await
    }
}

pub trait RelayTransport: Send + Sync + 'static {
    fn capabilities(&self) -> Capabilities;

    fn publish<'a>(
        &'a self,
        relay: &'a RelayUrl,
        event: &'a Event,
    ) -> BoxFuture<'a, Result<(), TransportError>>;

    fn fetch<'a>(
        &'a self,
        _relay: &'a RelayUrl,
        _filter: Filter,
        _timeout: Duration,
    ) -> BoxFuture<'a, Result<Vec<Event>, TransportError>> {
        Box::pin(async { Err(TransportError::Unsupported) })
    }

    fn open_stream<'a>(
        &'a self,
        _relay: &'a RelayUrl,
        _filter: Filter,
    ) -> BoxFuture<'a, Result<RelayStream, TransportError>> {
        Box::pin(async { Err(TransportError::Unsupported) })
    }

    /// Release connections. Transports without any hold nothing to release.
    fn shutdown(&self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

fn same_subscription(a: &SubscriptionId, b: &SubscriptionId) -> bool {
    a == b
}

/// Transport over a `nostr_sdk::Client` websocket pool.
#[derive(Clone)]
pub struct SdkRelayTransport {
    client: Client,
    capabilities: Capabilities,
}

impl SdkRelayTransport {
    /// Add every relay and start connecting. A relay that is still
    /// connecting when the ceiling passes is left to connect in the
    /// background; queries against it fail individually.
    pub async fn connect(relays: &[RelayUrl], timeout: Duration) -> Result<Self, CoreError> {
        let client = Client::default();
        for url in relays {
            client
                .add_relay(url.clone())
                .await
                .map_err(|e| TransportError::Unreachable(format!("{url}: {e}")))?;
        }

        tracing::info!("Connecting to {} relay(s)", relays.len());
        let connect_start = std::time::Instant::now();
        match tokio::time::timeout(timeout, client.connect()).await {
            Ok(()) => tracing::info!("Connect completed in {:?}", connect_start.elapsed()),
            Err(_) => tracing::warn!("Connect timed out after {:?}", connect_start.elapsed()),
        }
        client.wait_for_connection(timeout).await;

        Ok(Self {
            client,
            capabilities: Capabilities {
                batch: true,
                stream: true,
            },
        })
    }

    /// Advertise only the streaming surface, for relays whose batch
    /// answers are unreliable.
    pub fn streaming_only(mut self) -> Self {
        self.capabilities.batch = false;
        self
    }
}

impl RelayTransport for SdkRelayTransport {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn shutdown(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.client.disconnect().await;
            tracing::info!("Disconnected from relays");
        })
    }

    fn publish<'a>(
        &'a self,
        relay: &'a RelayUrl,
        event: &'a Event,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            let output = self
                .client
                .send_event_to([relay.clone()], event)
                .await
                .map_err(|e| TransportError::Unreachable(e.to_string()))?;
            if output.success.contains(relay) {
                return Ok(());
            }
            let reason = output
                .failed
                .get(relay)
                .cloned()
                .unwrap_or_else(|| "no acknowledgement".to_string());
            Err(TransportError::Rejected(reason))
        })
    }

    fn fetch<'a>(
        &'a self,
        relay: &'a RelayUrl,
        filter: Filter,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Vec<Event>, TransportError>> {
        Box::pin(async move {
            let events = self
                .client
                .fetch_events_from([relay.clone()], filter, timeout)
                .await
                .map_err(|e| TransportError::Unreachable(e.to_string()))?;
            Ok(events.into_iter().collect())
        })
    }

    fn open_stream<'a>(
        &'a self,
        relay: &'a RelayUrl,
        filter: Filter,
    ) -> BoxFuture<'a, Result<RelayStream, TransportError>> {
        Box::pin(async move {
            // Listen before subscribing so nothing sent right after REQ is missed.
            let mut notifications = self.client.notifications();
            let output = self
                .client
                .subscribe_to([relay.clone()], filter, None)
                .await
                .map_err(|e| TransportError::Unreachable(e.to_string()))?;
            let subscription_id = output.val;

            let (tx, rx) = mpsc::channel(256);
            let client = self.client.clone();
            let relay = relay.clone();
            tokio::spawn(async move {
                loop {
                    let item = tokio::select! {
                        _ = tx.closed() => break,
                        received = notifications.recv() => match received {
                            Ok(RelayPoolNotification::Event { relay_url, subscription_id: id, event })
                                if relay_url == relay && same_subscription(&id, &subscription_id) =>
                            {
                                StreamItem::Event(event)
                            }
                            Ok(RelayPoolNotification::Message { relay_url, message }) if relay_url == relay => {
                                match message {
                                    RelayMessage::EndOfStoredEvents(id)
                                        if same_subscription(&id, &subscription_id) =>
                                    {
                                        StreamItem::EndOfStream
                                    }
                                    RelayMessage::Closed { subscription_id: id, message }
                                        if same_subscription(&id, &subscription_id) =>
                                    {
                                        StreamItem::Closed(TransportError::Closed(message.to_string()))
                                    }
                                    _ => continue,
                                }
                            }
                            Ok(RelayPoolNotification::Shutdown) => {
                                StreamItem::Closed(TransportError::Closed("relay pool shut down".to_string()))
                            }
                            Ok(_) => continue,
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                                tracing::warn!("Notification stream lagged, skipped {}", skipped);
                                continue;
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                                StreamItem::Closed(TransportError::Closed("notification channel closed".to_string()))
                            }
                        },
                    };
                    let terminal = matches!(item, StreamItem::Closed(_));
                    if tx.send(item).await.is_err() || terminal {
                        break;
                    }
                }
                client.unsubscribe(&subscription_id).await;
                tracing::debug!("Closed subscription {} on {}", subscription_id, relay);
            });

            Ok(RelayStream::new(rx))
        })
    }
}
