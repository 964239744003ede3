//! # In-Memory Broker
//!
//! A single-process broker with the AMQP semantics the relay depends on:
//! durable named queues, per-channel prefetch, round-robin dispatch across
//! consumers, requeue-at-head on nack or channel close, and close signals.
//!
//! Used by unit and integration tests, and by single-node deployments that
//! run the client and the worker in one process.

use crate::delivery::{CloseNotifier, CloseSignal, Delivery, DeliveryStream};
use crate::error::BrokerError;
use crate::ports::{BrokerChannel, BrokerConnection, BrokerConnector};
use crate::url::BrokerUrl;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct Message {
    payload: Vec<u8>,
    redelivered: bool,
}

#[derive(Debug, Default)]
struct QueueState {
    messages: VecDeque<Message>,
    /// `(channel id, consumer tag)` in registration order.
    consumers: Vec<(u64, String)>,
    next_consumer: usize,
}

#[derive(Debug)]
struct ConsumerState {
    queue: String,
    tx: mpsc::UnboundedSender<Delivery>,
}

#[derive(Debug)]
struct Unacked {
    queue: String,
    message: Message,
    pushed: bool,
}

#[derive(Debug)]
struct ChannelState {
    connection_id: u64,
    prefetch: u16,
    pushed_unacked: usize,
    unacked: HashMap<u64, Unacked>,
    consumers: HashMap<String, ConsumerState>,
    notifier: CloseNotifier,
}

impl ChannelState {
    fn has_capacity(&self) -> bool {
        self.prefetch == 0 || self.pushed_unacked < usize::from(self.prefetch)
    }
}

#[derive(Debug)]
struct ConnectionState {
    channels: HashSet<u64>,
    notifier: CloseNotifier,
}

#[derive(Debug, Default)]
struct Stats {
    connect_attempts: u64,
    gets: u64,
    acks: u64,
    requeues: u64,
    rejects: u64,
}

#[derive(Debug, Default)]
struct State {
    unreachable: bool,
    queues: HashMap<String, QueueState>,
    connections: HashMap<u64, ConnectionState>,
    channels: HashMap<u64, ChannelState>,
    published: HashMap<String, Vec<Vec<u8>>>,
    connected_urls: Vec<BrokerUrl>,
    next_id: u64,
    next_tag: u64,
    stats: Stats,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Push ready messages to consumers with spare prefetch capacity.
    fn dispatch(&mut self, queue_name: &str) {
        loop {
            let Some(queue) = self.queues.get_mut(queue_name) else {
                return;
            };
            if queue.messages.is_empty() || queue.consumers.is_empty() {
                return;
            }

            let count = queue.consumers.len();
            let mut chosen = None;
            for offset in 0..count {
                let index = (queue.next_consumer + offset) % count;
                let (channel_id, tag) = &queue.consumers[index];
                if self
                    .channels
                    .get(channel_id)
                    .is_some_and(ChannelState::has_capacity)
                {
                    chosen = Some((index, *channel_id, tag.clone()));
                    break;
                }
            }
            let Some((index, channel_id, consumer_tag)) = chosen else {
                return;
            };
            queue.next_consumer = (index + 1) % count;

            let Some(message) = queue.messages.pop_front() else {
                return;
            };
            self.next_tag += 1;
            let delivery_tag = self.next_tag;

            let Some(channel) = self.channels.get_mut(&channel_id) else {
                queue.messages.push_front(message);
                return;
            };
            let delivery = Delivery {
                delivery_tag,
                payload: message.payload.clone(),
                redelivered: message.redelivered,
                queue: queue_name.to_string(),
            };
            let sent = channel
                .consumers
                .get(&consumer_tag)
                .is_some_and(|consumer| consumer.tx.send(delivery).is_ok());

            if sent {
                channel.pushed_unacked += 1;
                channel.unacked.insert(
                    delivery_tag,
                    Unacked {
                        queue: queue_name.to_string(),
                        message,
                        pushed: true,
                    },
                );
            } else {
                // Receiver dropped without a cancel.
                channel.consumers.remove(&consumer_tag);
                queue
                    .consumers
                    .retain(|(id, tag)| !(*id == channel_id && *tag == consumer_tag));
                queue.next_consumer = 0;
                queue.messages.push_front(message);
            }
        }
    }

    /// Remove a channel, requeue its unacked messages and end its consumers.
    fn close_channel(&mut self, channel_id: u64, error: Option<BrokerError>) {
        let Some(channel) = self.channels.remove(&channel_id) else {
            return;
        };
        if let Some(connection) = self.connections.get_mut(&channel.connection_id) {
            connection.channels.remove(&channel_id);
        }

        let mut touched = HashSet::new();
        for (tag, consumer) in &channel.consumers {
            if let Some(queue) = self.queues.get_mut(&consumer.queue) {
                queue
                    .consumers
                    .retain(|(id, t)| !(*id == channel_id && t == tag));
                queue.next_consumer = 0;
            }
        }

        let mut unacked: Vec<(u64, Unacked)> = channel.unacked.into_iter().collect();
        // Highest tag first so push_front restores the original order.
        unacked.sort_by(|a, b| b.0.cmp(&a.0));
        for (_, entry) in unacked {
            if let Some(queue) = self.queues.get_mut(&entry.queue) {
                queue.messages.push_front(Message {
                    payload: entry.message.payload,
                    redelivered: true,
                });
                touched.insert(entry.queue);
            }
        }

        if let Some(error) = error {
            channel.notifier.notify(error);
        }
        drop(channel.notifier);

        for queue in touched {
            self.dispatch(&queue);
        }
    }

    fn close_connection(&mut self, connection_id: u64, error: Option<BrokerError>) {
        let Some(connection) = self.connections.remove(&connection_id) else {
            return;
        };
        for channel_id in connection.channels {
            let channel_error = error
                .as_ref()
                .map(|e| BrokerError::ChannelClosed(e.to_string()));
            self.close_channel(channel_id, channel_error);
        }
        if let Some(error) = error {
            connection.notifier.notify(error);
        }
    }

    fn channel_mut(&mut self, channel_id: u64) -> Result<&mut ChannelState, BrokerError> {
        self.channels
            .get_mut(&channel_id)
            .ok_or_else(|| BrokerError::ChannelClosed("channel is closed".into()))
    }
}

/// In-process broker.
///
/// Cloning yields another handle to the same broker.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<State>>,
}

impl InMemoryBroker {
    /// Create an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse (or accept again) new connections.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Drop every open connection with an error, as a broker restart would.
    pub fn fail_connections(&self, reason: &str) {
        let mut state = self.state.lock();
        let ids: Vec<u64> = state.connections.keys().copied().collect();
        warn!(connections = ids.len(), reason, "Failing all broker connections");
        for id in ids {
            state.close_connection(id, Some(BrokerError::ConnectionClosed(reason.to_string())));
        }
    }

    /// Close every open channel with an error, leaving connections open.
    pub fn close_channels_with_error(&self, reason: &str) {
        let mut state = self.state.lock();
        let ids: Vec<u64> = state.channels.keys().copied().collect();
        for id in ids {
            state.close_channel(id, Some(BrokerError::ChannelClosed(reason.to_string())));
        }
    }

    /// Declare `queue` if needed and append `payload`, as an external producer would.
    pub fn enqueue(&self, queue: &str, payload: &[u8]) {
        let mut state = self.state.lock();
        state
            .queues
            .entry(queue.to_string())
            .or_default()
            .messages
            .push_back(Message {
                payload: payload.to_vec(),
                redelivered: false,
            });
        state
            .published
            .entry(queue.to_string())
            .or_default()
            .push(payload.to_vec());
        state.dispatch(queue);
    }

    /// Messages waiting in `queue` (not counting unacknowledged ones).
    #[must_use]
    pub fn queue_len(&self, queue: &str) -> usize {
        self.state
            .lock()
            .queues
            .get(queue)
            .map_or(0, |q| q.messages.len())
    }

    /// Whether `queue` is declared.
    #[must_use]
    pub fn has_queue(&self, queue: &str) -> bool {
        self.state.lock().queues.contains_key(queue)
    }

    /// Names of every declared queue, sorted.
    #[must_use]
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().queues.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of consumers registered on `queue`.
    #[must_use]
    pub fn consumer_count(&self, queue: &str) -> usize {
        self.state
            .lock()
            .queues
            .get(queue)
            .map_or(0, |q| q.consumers.len())
    }

    /// Every payload ever published to `queue`, including dropped ones.
    #[must_use]
    pub fn published(&self, queue: &str) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .published
            .get(queue)
            .cloned()
            .unwrap_or_default()
    }

    /// Unacknowledged deliveries across all channels.
    #[must_use]
    pub fn unacked_count(&self) -> usize {
        self.state
            .lock()
            .channels
            .values()
            .map(|c| c.unacked.len())
            .sum()
    }

    /// Currently open connections.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.state.lock().connections.len()
    }

    /// Currently open channels.
    #[must_use]
    pub fn open_channels(&self) -> usize {
        self.state.lock().channels.len()
    }

    /// Connection attempts, successful or not.
    #[must_use]
    pub fn connect_attempts(&self) -> u64 {
        self.state.lock().stats.connect_attempts
    }

    /// URLs passed to successful connects, in order.
    #[must_use]
    pub fn connected_urls(&self) -> Vec<BrokerUrl> {
        self.state.lock().connected_urls.clone()
    }

    /// `get` calls served.
    #[must_use]
    pub fn get_count(&self) -> u64 {
        self.state.lock().stats.gets
    }

    /// Acks received.
    #[must_use]
    pub fn ack_count(&self) -> u64 {
        self.state.lock().stats.acks
    }

    /// Nacks received with `requeue = true`.
    #[must_use]
    pub fn requeue_count(&self) -> u64 {
        self.state.lock().stats.requeues
    }

    /// Nacks received with `requeue = false`.
    #[must_use]
    pub fn reject_count(&self) -> u64 {
        self.state.lock().stats.rejects
    }
}

#[async_trait]
impl BrokerConnector for InMemoryBroker {
    async fn connect(&self, url: &BrokerUrl) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        let mut state = self.state.lock();
        state.stats.connect_attempts += 1;
        if state.unreachable {
            return Err(BrokerError::Connection(format!(
                "{} is unreachable",
                url.redacted()
            )));
        }
        let id = state.next_id();
        let notifier = CloseNotifier::new();
        let signal = notifier.subscribe();
        state.connections.insert(
            id,
            ConnectionState {
                channels: HashSet::new(),
                notifier,
            },
        );
        state.connected_urls.push(url.clone());
        debug!(connection = id, url = %url, "In-memory connection opened");

        Ok(Arc::new(MemoryConnection {
            broker: self.clone(),
            id,
            signal,
        }))
    }
}

struct MemoryConnection {
    broker: InMemoryBroker,
    id: u64,
    signal: CloseSignal,
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    async fn create_channel(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError> {
        let mut state = self.broker.state.lock();
        if !state.connections.contains_key(&self.id) {
            return Err(BrokerError::ConnectionClosed("connection is closed".into()));
        }
        let channel_id = state.next_id();
        let notifier = CloseNotifier::new();
        let signal = notifier.subscribe();
        state.channels.insert(
            channel_id,
            ChannelState {
                connection_id: self.id,
                prefetch: 0,
                pushed_unacked: 0,
                unacked: HashMap::new(),
                consumers: HashMap::new(),
                notifier,
            },
        );
        if let Some(connection) = state.connections.get_mut(&self.id) {
            connection.channels.insert(channel_id);
        }

        Ok(Arc::new(MemoryChannel {
            broker: self.broker.clone(),
            id: channel_id,
            signal,
        }))
    }

    fn close_signal(&self) -> CloseSignal {
        self.signal.clone()
    }

    fn is_open(&self) -> bool {
        self.broker.state.lock().connections.contains_key(&self.id)
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.broker.state.lock().close_connection(self.id, None);
        Ok(())
    }
}

struct MemoryChannel {
    broker: InMemoryBroker,
    id: u64,
    signal: CloseSignal,
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError> {
        let mut state = self.broker.state.lock();
        state.channel_mut(self.id)?;
        state.queues.entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn delete_queue(&self, queue: &str) -> Result<(), BrokerError> {
        let mut state = self.broker.state.lock();
        state.channel_mut(self.id)?;
        if let Some(removed) = state.queues.remove(queue) {
            for (channel_id, tag) in removed.consumers {
                if let Some(channel) = state.channels.get_mut(&channel_id) {
                    channel.consumers.remove(&tag);
                }
            }
        }
        Ok(())
    }

    async fn set_prefetch(&self, count: u16) -> Result<(), BrokerError> {
        let mut state = self.broker.state.lock();
        let channel = state.channel_mut(self.id)?;
        channel.prefetch = count;
        let queues: HashSet<String> = channel
            .consumers
            .values()
            .map(|c| c.queue.clone())
            .collect();
        for queue in queues {
            state.dispatch(&queue);
        }
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<DeliveryStream, BrokerError> {
        let mut state = self.broker.state.lock();
        state.channel_mut(self.id)?;
        if !state.queues.contains_key(queue) {
            return Err(BrokerError::QueueNotFound(queue.to_string()));
        }
        let consumer_tag = format!("ctag-{}", state.next_id());
        let (tx, rx) = mpsc::unbounded_channel();

        let channel = state.channel_mut(self.id)?;
        channel.consumers.insert(
            consumer_tag.clone(),
            ConsumerState {
                queue: queue.to_string(),
                tx,
            },
        );
        if let Some(q) = state.queues.get_mut(queue) {
            q.consumers.push((self.id, consumer_tag.clone()));
        }
        state.dispatch(queue);

        Ok(DeliveryStream::new(consumer_tag, rx))
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<(), BrokerError> {
        let mut state = self.broker.state.lock();
        let channel = state.channel_mut(self.id)?;
        let consumer = channel
            .consumers
            .remove(consumer_tag)
            .ok_or_else(|| BrokerError::UnknownConsumer(consumer_tag.to_string()))?;
        if let Some(queue) = state.queues.get_mut(&consumer.queue) {
            queue
                .consumers
                .retain(|(id, tag)| !(*id == self.id && tag == consumer_tag));
            queue.next_consumer = 0;
        }
        Ok(())
    }

    async fn get(&self, queue: &str) -> Result<Option<Delivery>, BrokerError> {
        let mut state = self.broker.state.lock();
        state.channel_mut(self.id)?;
        state.stats.gets += 1;
        let message = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?
            .messages
            .pop_front();
        let Some(message) = message else {
            return Ok(None);
        };
        state.next_tag += 1;
        let delivery_tag = state.next_tag;
        let delivery = Delivery {
            delivery_tag,
            payload: message.payload.clone(),
            redelivered: message.redelivered,
            queue: queue.to_string(),
        };
        state.channel_mut(self.id)?.unacked.insert(
            delivery_tag,
            Unacked {
                queue: queue.to_string(),
                message,
                pushed: false,
            },
        );
        Ok(Some(delivery))
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        let mut state = self.broker.state.lock();
        let channel = state.channel_mut(self.id)?;
        let entry = channel
            .unacked
            .remove(&delivery_tag)
            .ok_or(BrokerError::UnknownDeliveryTag(delivery_tag))?;
        if entry.pushed {
            channel.pushed_unacked = channel.pushed_unacked.saturating_sub(1);
        }
        state.stats.acks += 1;
        state.dispatch(&entry.queue);
        Ok(())
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError> {
        let mut state = self.broker.state.lock();
        let channel = state.channel_mut(self.id)?;
        let entry = channel
            .unacked
            .remove(&delivery_tag)
            .ok_or(BrokerError::UnknownDeliveryTag(delivery_tag))?;
        if entry.pushed {
            channel.pushed_unacked = channel.pushed_unacked.saturating_sub(1);
        }
        if requeue {
            state.stats.requeues += 1;
            if let Some(queue) = state.queues.get_mut(&entry.queue) {
                queue.messages.push_front(Message {
                    payload: entry.message.payload,
                    redelivered: true,
                });
            }
        } else {
            state.stats.rejects += 1;
        }
        state.dispatch(&entry.queue);
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let mut state = self.broker.state.lock();
        state.channel_mut(self.id)?;
        state
            .published
            .entry(queue.to_string())
            .or_default()
            .push(payload.to_vec());
        let Some(q) = state.queues.get_mut(queue) else {
            debug!(queue, "Publish to undeclared queue dropped");
            return Ok(());
        };
        q.messages.push_back(Message {
            payload: payload.to_vec(),
            redelivered: false,
        });
        state.dispatch(queue);
        Ok(())
    }

    fn close_signal(&self) -> CloseSignal {
        self.signal.clone()
    }

    fn is_open(&self) -> bool {
        self.broker.state.lock().channels.contains_key(&self.id)
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.broker.state.lock().close_channel(self.id, None);
        Ok(())
    }
}
