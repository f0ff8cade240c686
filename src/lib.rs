//! # PollBridge
//!
//! `pollbridge` turns a topic/channel message stream into HTTP long-polling:
//! a request names a topic and a channel, the server subscribes, waits for
//! exactly one message, writes it as the response body and tears the
//! subscription down again.
//!
//! ## Core Modules
//!
//! - `broker`: The broker client contract and an embedded topic/channel broker.
//! - `pump`: The per-request bridge between a subscription and a waiting response.
//! - `transport`: The HTTP routes built on the pump.
//! - `config`: Handles loading and managing server configuration.
//! - `utils`: Shared error types and logging setup.

pub mod broker;
pub mod config;
pub mod pump;
pub mod transport;
pub mod utils;
