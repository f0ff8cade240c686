//! Message definitions for the broker
//!
//! `Message` is what a broker client hands to a delivery handler. The body is
//! opaque bytes; the remaining fields are delivery metadata the broker uses to
//! decide between finishing and requeueing a message.
//!
//! Notes on fields:
//! - `id`: opaque unique id assigned on publish
//! - `body`: raw payload, written verbatim to the long-poll response
//! - `timestamp`: milliseconds since UNIX epoch; set by the broker upon publish
//! - `attempts`: number of times the message has been handed to a handler

use bytes::Bytes;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub body: Bytes,
    pub timestamp: i64,
    pub attempts: u16,
}

impl Message {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            body: body.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            attempts: 0,
        }
    }
}
