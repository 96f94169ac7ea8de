//! In-process durable queue
//!
//! Mirrors the AMQP semantics the pipeline relies on:
//! - queues must be declared; redeclaring is a no-op
//! - deliveries stay unacknowledged until acked, bounded by the session prefetch
//! - when a connection drops, its unacked deliveries go back to the head of the
//!   queue flagged as redelivered
//! - acks from a dropped connection are rejected
//!
//! Used by the test suite and for running the pipeline without RabbitMQ.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::{Acker, Broker, BrokerError, BrokerResult, BrokerSession, Delivery, DeliveryStream};

/// Shared, cloneable in-memory broker
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    notify: Notify,
}

struct State {
    reachable: bool,
    /// Bumped every time connections are dropped
    generation: u64,
    next_session_id: u64,
    next_message_id: u64,
    next_delivery_tag: u64,
    connects: u64,
    queues: HashMap<String, QueueState>,
    /// Message ids in acknowledgement order
    acked: Vec<u64>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            reachable: true,
            generation: 0,
            next_session_id: 1,
            next_message_id: 1,
            next_delivery_tag: 1,
            connects: 0,
            queues: HashMap::new(),
            acked: Vec::new(),
        }
    }
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<StoredMessage>,
    unacked: BTreeMap<u64, InFlight>,
}

#[derive(Clone)]
struct StoredMessage {
    id: u64,
    body: Vec<u8>,
    redelivered: bool,
}

struct InFlight {
    message: StoredMessage,
    session_id: u64,
}

enum Poll {
    Ready(u64, StoredMessage),
    Empty,
    Lost,
}

impl State {
    fn enqueue(&mut self, queue: &str, body: Vec<u8>) -> u64 {
        let id = self.next_message_id;
        self.next_message_id += 1;
        self.queues
            .entry(queue.to_string())
            .or_default()
            .ready
            .push_back(StoredMessage {
                id,
                body,
                redelivered: false,
            });
        id
    }

    fn poll_delivery(&mut self, queue: &str, session_id: u64, generation: u64, prefetch: u16) -> Poll {
        if self.generation != generation || !self.reachable {
            return Poll::Lost;
        }
        let tag = self.next_delivery_tag;
        let Some(state) = self.queues.get_mut(queue) else {
            return Poll::Lost;
        };

        let in_flight = state
            .unacked
            .values()
            .filter(|f| f.session_id == session_id)
            .count();
        if prefetch > 0 && in_flight >= prefetch as usize {
            return Poll::Empty;
        }

        match state.ready.pop_front() {
            Some(message) => {
                state.unacked.insert(
                    tag,
                    InFlight {
                        message: message.clone(),
                        session_id,
                    },
                );
                self.next_delivery_tag += 1;
                Poll::Ready(tag, message)
            }
            None => Poll::Empty,
        }
    }

    /// Return unacked deliveries matching `owner` to the head of their queue
    fn requeue_where<F>(&mut self, owner: F)
    where
        F: Fn(&InFlight) -> bool,
    {
        for state in self.queues.values_mut() {
            let tags: Vec<u64> = state
                .unacked
                .iter()
                .filter(|(_, f)| owner(f))
                .map(|(tag, _)| *tag)
                .collect();
            for tag in tags.into_iter().rev() {
                if let Some(in_flight) = state.unacked.remove(&tag) {
                    let mut message = in_flight.message;
                    message.redelivered = true;
                    state.ready.push_front(message);
                }
            }
        }
    }
}

impl InMemoryBroker {
    /// Create an empty, reachable broker
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a raw body as if another producer had published it
    pub fn publish_raw(&self, queue: &str, body: impl Into<Vec<u8>>) -> u64 {
        let id = self.shared.state.lock().enqueue(queue, body.into());
        self.shared.notify.notify_waiters();
        id
    }

    /// Simulate a transport failure: every open session is dropped and
    /// unacknowledged deliveries are requeued for redelivery
    pub fn drop_connections(&self) {
        {
            let mut state = self.shared.state.lock();
            state.generation += 1;
            state.requeue_where(|_| true);
        }
        self.shared.notify.notify_waiters();
    }

    /// Take the broker offline (dropping connections) or bring it back
    pub fn set_reachable(&self, reachable: bool) {
        if !reachable {
            self.drop_connections();
        }
        self.shared.state.lock().reachable = reachable;
        self.shared.notify.notify_waiters();
    }

    /// Whether a queue has been declared
    pub fn is_declared(&self, queue: &str) -> bool {
        self.shared.state.lock().queues.contains_key(queue)
    }

    /// Messages waiting for delivery
    pub fn depth(&self, queue: &str) -> usize {
        self.shared
            .state
            .lock()
            .queues
            .get(queue)
            .map_or(0, |q| q.ready.len())
    }

    /// Messages delivered but not yet acknowledged
    pub fn unacked_count(&self, queue: &str) -> usize {
        self.shared
            .state
            .lock()
            .queues
            .get(queue)
            .map_or(0, |q| q.unacked.len())
    }

    /// Bodies waiting in a queue, head first
    pub fn ready_bodies(&self, queue: &str) -> Vec<Vec<u8>> {
        self.shared
            .state
            .lock()
            .queues
            .get(queue)
            .map(|q| q.ready.iter().map(|m| m.body.clone()).collect())
            .unwrap_or_default()
    }

    /// Ids of acknowledged messages, in acknowledgement order
    pub fn acked_ids(&self) -> Vec<u64> {
        self.shared.state.lock().acked.clone()
    }

    /// Number of successful connection attempts
    pub fn connect_count(&self) -> u64 {
        self.shared.state.lock().connects
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn connect(&self) -> BrokerResult<Box<dyn BrokerSession>> {
        let mut state = self.shared.state.lock();
        if !state.reachable {
            return Err(BrokerError::Unreachable("in-memory broker offline".to_string()));
        }
        state.connects += 1;
        let session_id = state.next_session_id;
        state.next_session_id += 1;

        Ok(Box::new(MemorySession {
            shared: self.shared.clone(),
            session_id,
            generation: state.generation,
            prefetch: 0,
        }))
    }

    fn describe(&self) -> String {
        "memory://local".to_string()
    }
}

struct MemorySession {
    shared: Arc<Shared>,
    session_id: u64,
    generation: u64,
    prefetch: u16,
}

impl MemorySession {
    fn check_alive(&self, state: &State) -> BrokerResult<()> {
        if state.generation != self.generation || !state.reachable {
            return Err(BrokerError::ConnectionLost);
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerSession for MemorySession {
    async fn declare_queue(&mut self, queue: &str) -> BrokerResult<()> {
        let mut state = self.shared.state.lock();
        self.check_alive(&state)?;
        state.queues.entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn set_prefetch(&mut self, count: u16) -> BrokerResult<()> {
        self.check_alive(&self.shared.state.lock())?;
        self.prefetch = count;
        Ok(())
    }

    async fn publish(&mut self, queue: &str, body: &[u8]) -> BrokerResult<()> {
        {
            let mut state = self.shared.state.lock();
            self.check_alive(&state)?;
            if !state.queues.contains_key(queue) {
                return Err(BrokerError::QueueNotDeclared(queue.to_string()));
            }
            state.enqueue(queue, body.to_vec());
        }
        self.shared.notify.notify_waiters();
        Ok(())
    }

    async fn consume(&mut self, queue: &str, _consumer_tag: &str) -> BrokerResult<DeliveryStream> {
        {
            let state = self.shared.state.lock();
            self.check_alive(&state)?;
            if !state.queues.contains_key(queue) {
                return Err(BrokerError::QueueNotDeclared(queue.to_string()));
            }
        }

        let shared = self.shared.clone();
        let queue = queue.to_string();
        let session_id = self.session_id;
        let generation = self.generation;
        let prefetch = self.prefetch;

        let stream = async_stream::stream! {
            loop {
                // Register for wakeups before inspecting state so none are missed
                let notified = shared.notify.notified();
                let poll = shared
                    .state
                    .lock()
                    .poll_delivery(&queue, session_id, generation, prefetch);

                match poll {
                    Poll::Ready(tag, message) => {
                        let acker = MemoryAcker {
                            shared: shared.clone(),
                            queue: queue.clone(),
                            tag,
                            generation,
                        };
                        yield Ok(Delivery::new(tag, message.redelivered, message.body, Box::new(acker)));
                    }
                    Poll::Empty => notified.await,
                    Poll::Lost => {
                        yield Err(BrokerError::ConnectionLost);
                        break;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }

    async fn close(self: Box<Self>) -> BrokerResult<()> {
        {
            let mut state = self.shared.state.lock();
            if state.generation == self.generation {
                let session_id = self.session_id;
                state.requeue_where(|f| f.session_id == session_id);
            }
        }
        self.shared.notify.notify_waiters();
        Ok(())
    }
}

struct MemoryAcker {
    shared: Arc<Shared>,
    queue: String,
    tag: u64,
    generation: u64,
}

#[async_trait]
impl Acker for MemoryAcker {
    async fn ack(&self) -> BrokerResult<()> {
        {
            let mut state = self.shared.state.lock();
            if state.generation != self.generation || !state.reachable {
                return Err(BrokerError::ConnectionLost);
            }
            let removed = state
                .queues
                .get_mut(&self.queue)
                .and_then(|q| q.unacked.remove(&self.tag))
                .ok_or(BrokerError::UnknownDeliveryTag(self.tag))?;
            state.acked.push(removed.message.id);
        }
        self.shared.notify.notify_waiters();
        Ok(())
    }
}
