use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::broker::message::Message;
use crate::utils::error::BrokerError;

pub type ConsumerId = String;

const MAX_NAME_LEN: usize = 64;
const EPHEMERAL_SUFFIX: &str = "#ephemeral";

/// Checks a topic or channel name: 1 to 64 characters of `[A-Za-z0-9._-]`,
/// optionally followed by `#ephemeral`.
pub fn validate_name(kind: &'static str, name: &str) -> Result<(), BrokerError> {
    let base = name.strip_suffix(EPHEMERAL_SUFFIX).unwrap_or(name);
    let valid = !base.is_empty()
        && name.len() <= MAX_NAME_LEN
        && base
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

    if valid {
        Ok(())
    } else {
        Err(BrokerError::InvalidName {
            kind,
            name: name.to_string(),
        })
    }
}

/// A named consumer group within a topic.
///
/// Every channel receives its own copy of each message published to the
/// topic. Consumers attached to the same channel compete for its messages.
#[derive(Debug, Default)]
pub struct Channel {
    pub name: String,
    pub queue: VecDeque<Message>,
    pub consumers: HashSet<ConsumerId>,
    pub notify: Arc<Notify>,
}

impl Channel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Ephemeral channels disappear once their last consumer leaves.
    pub fn is_ephemeral(&self) -> bool {
        self.name.ends_with(EPHEMERAL_SUFFIX)
    }

    pub fn push(&mut self, message: Message) {
        self.queue.push_back(message);
        self.notify.notify_waiters();
    }

    /// Puts a rejected message back at the head of the queue.
    pub fn requeue(&mut self, message: Message) {
        self.queue.push_front(message);
        self.notify.notify_waiters();
    }
}

/// Represents a topic in the broker
///
/// Messages published before any channel exists are held in `backlog` and
/// handed to the first channel that gets created.
#[derive(Debug, Default)]
pub struct Topic {
    pub name: String,
    pub channels: HashMap<String, Channel>,
    pub backlog: VecDeque<Message>,
}

impl Topic {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn publish(&mut self, message: Message) {
        if self.channels.is_empty() {
            self.backlog.push_back(message);
            return;
        }
        for channel in self.channels.values_mut() {
            channel.push(message.clone());
        }
    }

    /// Returns the channel, creating it (and draining the backlog into it) if missing.
    pub fn channel_mut(&mut self, name: &str) -> &mut Channel {
        let first = self.channels.is_empty();
        let channel = self
            .channels
            .entry(name.to_string())
            .or_insert_with(|| Channel::new(name));
        if first {
            channel.queue.extend(self.backlog.drain(..));
        }
        channel
    }

    /// Removes a consumer from a channel, dropping the channel (and its
    /// queue) if it is ephemeral and now has no consumers.
    pub fn detach(&mut self, channel: &str, consumer: &ConsumerId) {
        let Some(c) = self.channels.get_mut(channel) else {
            return;
        };
        c.consumers.remove(consumer);
        if c.is_ephemeral() && c.consumers.is_empty() {
            self.channels.remove(channel);
        }
    }

    /// No channels and nothing waiting for one.
    pub fn is_idle(&self) -> bool {
        self.channels.is_empty() && self.backlog.is_empty()
    }
}
