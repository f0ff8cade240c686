//! The `broker` module holds everything on the broker side of the bridge:
//! the client contract the long-poll core consumes, the message type, and an
//! embedded topic/channel broker implementing that contract.

pub mod client;
pub mod engine;
pub mod message;
pub mod topic;

pub use client::{BrokerClient, Endpoint, MessageHandler, Subscription};
pub use engine::{MemoryBroker, MemorySubscription};
pub use message::Message;
