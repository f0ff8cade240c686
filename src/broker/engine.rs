//! Broker engine
//!
//! This module contains the in-memory broker used when no external broker is
//! deployed, and by the test-suite. It models the topic/channel scheme:
//! - publishing to a topic copies the message into every channel of the topic
//! - consumers attached to a channel compete for its messages
//! - each subscription has at most one message in flight
//! - a message rejected by a handler goes back to the head of its channel and
//!   is offered to the next consumer; the broker never drops a message
//! - except from `#ephemeral` channels, which are removed together with their
//!   queue when the last consumer detaches
//!
//! Concurrency and usage notes:
//! - State lives behind a `std::sync::Mutex` that is never held across an
//!   `.await`; delivery tasks park on a per-channel `Notify` instead.
//! - `connect` only succeeds for addresses registered with [`MemoryBroker::listen`],
//!   which stands in for a reachable node or discovery service.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::client::{BrokerClient, Endpoint, MessageHandler, Subscription};
use crate::broker::message::Message;
use crate::broker::topic::{ConsumerId, Topic, validate_name};
use crate::utils::error::BrokerError;

#[derive(Debug, Default)]
struct State {
    listeners: HashSet<String>,
    topics: HashMap<String, Topic>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<State>>,
}

impl MemoryBroker {
    /// Pause before a consumer whose handler rejected a message pulls again,
    /// so the requeued message can reach a different consumer.
    pub const REQUEUE_BACKOFF: Duration = Duration::from_millis(50);

    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes `addr` reachable for `connect`.
    pub fn listen(&self, addr: &str) {
        self.state().listeners.insert(addr.to_string());
        info!(addr, "memory broker listening");
    }

    pub fn publish(&self, topic: &str, body: impl Into<Bytes>) -> Result<Message, BrokerError> {
        validate_name("topic", topic)?;
        let message = Message::new(body);

        let mut state = self.state();
        state
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic))
            .publish(message.clone());

        debug!(topic, id = %message.id, bytes = message.body.len(), "published message");
        Ok(message)
    }

    /// Number of messages waiting in a channel (in-flight messages excluded).
    /// For a topic without channels this is the topic backlog.
    pub fn depth(&self, topic: &str, channel: &str) -> usize {
        let state = self.state();
        match state.topics.get(topic) {
            Some(t) => match t.channels.get(channel) {
                Some(c) => c.queue.len(),
                None if t.channels.is_empty() => t.backlog.len(),
                None => 0,
            },
            None => 0,
        }
    }

    pub fn consumer_count(&self, topic: &str, channel: &str) -> usize {
        self.state()
            .topics
            .get(topic)
            .and_then(|t| t.channels.get(channel))
            .map_or(0, |c| c.consumers.len())
    }

    #[cfg(test)]
    pub(crate) fn channel_names(&self, topic: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .state()
            .topics
            .get(topic)
            .map(|t| t.channels.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Registers a consumer and returns the channel's wake-up handle.
    fn attach(&self, topic: &str, channel: &str, consumer: &ConsumerId) -> Arc<Notify> {
        let mut state = self.state();
        let channel = state
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic))
            .channel_mut(channel);
        channel.consumers.insert(consumer.clone());
        channel.notify.clone()
    }

    fn detach(&self, topic: &str, channel: &str, consumer: &ConsumerId) {
        let mut state = self.state();
        let Some(t) = state.topics.get_mut(topic) else {
            return;
        };
        t.detach(channel, consumer);
        if t.is_idle() {
            state.topics.remove(topic);
            debug!(topic, "idle topic removed");
        }
    }

    fn pop(&self, topic: &str, channel: &str) -> Option<Message> {
        let mut state = self.state();
        state
            .topics
            .get_mut(topic)?
            .channels
            .get_mut(channel)?
            .queue
            .pop_front()
    }

    /// Returns `false` if the channel no longer exists, which only happens
    /// to ephemeral channels.
    fn requeue(&self, topic: &str, channel: &str, message: Message) -> bool {
        let mut state = self.state();
        match state
            .topics
            .get_mut(topic)
            .and_then(|t| t.channels.get_mut(channel))
        {
            Some(c) => {
                c.requeue(message);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl BrokerClient for MemoryBroker {
    type Subscription = MemorySubscription;

    async fn subscribe(
        &self,
        topic: &str,
        channel: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<MemorySubscription, BrokerError> {
        validate_name("topic", topic)?;
        validate_name("channel", channel)?;

        Ok(MemorySubscription {
            broker: self.clone(),
            id: format!("consumer-{}", Uuid::new_v4()),
            topic: topic.to_string(),
            channel: channel.to_string(),
            handler,
            stop: CancellationToken::new(),
            task: None,
        })
    }
}

/// A consumer of one channel on a [`MemoryBroker`].
pub struct MemorySubscription {
    broker: MemoryBroker,
    id: ConsumerId,
    topic: String,
    channel: String,
    handler: Arc<dyn MessageHandler>,
    stop: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl MemorySubscription {
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn connect(&mut self, endpoint: &Endpoint) -> Result<(), BrokerError> {
        if self.task.is_some() || self.is_stopped() {
            return Err(BrokerError::AlreadyConnected);
        }
        if !self.broker.state().listeners.contains(endpoint.address()) {
            return Err(BrokerError::Unreachable(endpoint.to_string()));
        }

        let notify = self.broker.attach(&self.topic, &self.channel, &self.id);
        info!(consumer = %self.id, topic = %self.topic, channel = %self.channel, %endpoint, "subscription connected");

        self.task = Some(tokio::spawn(deliver(
            self.broker.clone(),
            self.topic.clone(),
            self.channel.clone(),
            self.handler.clone(),
            notify,
            self.stop.clone(),
        )));
        Ok(())
    }

    fn stop(&mut self) {
        if self.is_stopped() {
            return;
        }
        self.stop.cancel();
        if self.task.take().is_some() {
            self.broker.detach(&self.topic, &self.channel, &self.id);
            debug!(consumer = %self.id, "subscription stopped");
        }
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Delivery loop of one subscription: one message in flight at a time.
///
/// Stopping only interrupts the wait for the next message; a handler call
/// already in progress is allowed to finish so its outcome is honoured.
async fn deliver(
    broker: MemoryBroker,
    topic: String,
    channel: String,
    handler: Arc<dyn MessageHandler>,
    notify: Arc<Notify>,
    stop: CancellationToken,
) {
    loop {
        let notified = notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if stop.is_cancelled() {
            break;
        }

        let mut message = match broker.pop(&topic, &channel) {
            Some(message) => message,
            None => {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = notified => {}
                }
                continue;
            }
        };

        message.attempts = message.attempts.saturating_add(1);
        let id = message.id.clone();
        let attempts = message.attempts;

        match handler.handle_message(message.clone()).await {
            Ok(()) => {
                debug!(%topic, %channel, %id, attempts, "message finished");
            }
            Err(err) => {
                if !broker.requeue(&topic, &channel, message) {
                    debug!(%topic, %channel, %id, "ephemeral channel gone; message dropped");
                    break;
                }
                warn!(%topic, %channel, %id, attempts, %err, "message requeued");

                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(MemoryBroker::REQUEUE_BACKOFF) => {}
                }
            }
        }
    }

    debug!(%topic, %channel, "delivery loop exited");
}
