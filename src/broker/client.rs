//! Broker client contract
//!
//! The long-poll core only needs a narrow slice of a broker client: create a
//! subscription for a (topic, channel) pair with a delivery handler, connect
//! it to an endpoint, and stop it. Anything that speaks a real wire protocol
//! plugs in behind these traits; [`MemoryBroker`](super::MemoryBroker) is the
//! in-process implementation.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::broker::message::Message;
use crate::utils::error::{BrokerError, NotDelivered};

/// Where a subscription connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// A single broker node, addressed directly.
    Nsqd(String),
    /// A discovery service that knows which nodes carry the topic.
    Lookupd(String),
}

impl Endpoint {
    pub fn address(&self) -> &str {
        match self {
            Endpoint::Nsqd(addr) | Endpoint::Lookupd(addr) => addr,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Nsqd(addr) => write!(f, "nsqd://{addr}"),
            Endpoint::Lookupd(addr) => write!(f, "lookupd://{addr}"),
        }
    }
}

/// Delivery callback invoked from the broker client's own task.
///
/// `Ok(())` finishes the message. `Err(NotDelivered)` asks the broker to
/// requeue it for another consumer.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle_message(&self, message: Message) -> Result<(), NotDelivered>;
}

#[async_trait]
pub trait BrokerClient: Send + Sync + 'static {
    type Subscription: Subscription;

    /// Creates a subscription that is not yet receiving messages.
    async fn subscribe(
        &self,
        topic: &str,
        channel: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Self::Subscription, BrokerError>;
}

#[async_trait]
pub trait Subscription: Send + 'static {
    /// Starts delivery. Fails if the endpoint cannot be reached.
    async fn connect(&mut self, endpoint: &Endpoint) -> Result<(), BrokerError>;

    /// Stops delivery. Safe to call repeatedly and before `connect`.
    fn stop(&mut self);
}
