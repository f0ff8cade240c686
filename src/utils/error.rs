//! The `error` module defines the error types used within the `pollbridge`
//! application.
//!
//! Errors are grouped by the layer that produces them:
//!
//! - [`BrokerError`]: the broker client refused a subscription or a connection.
//! - [`NotDelivered`]: returned from a delivery callback to ask the broker to
//!   requeue the message for another consumer.
//! - [`PumpError`]: how a started pump ended without handing off a message.
//! - [`PollError`]: request-level failures, rendered as empty-bodied HTTP responses.

use axum::http::{StatusCode, Version};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Failures reported by a broker client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("invalid {kind} name: {name:?}")]
    InvalidName { kind: &'static str, name: String },

    #[error("broker unreachable at {0}")]
    Unreachable(String),

    #[error("subscription is already connected")]
    AlreadyConnected,

    #[error("no broker endpoint configured")]
    NoEndpoint,
}

/// Delivery outcome returned to the broker when a message was not accepted.
///
/// The broker treats this as a request to redeliver the message elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("message not delivered")]
pub struct NotDelivered;

/// Why a started pump resolved without a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PumpError {
    /// The request went away before a message was handed off.
    #[error("client disconnected")]
    Cancelled,
}

/// Request-level failures of the long-poll handler.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("bad request: {0}")]
    BadRequest(&'static str),

    #[error("transport {0:?} cannot flush incrementally")]
    UnsupportedTransport(Version),

    /// Subscribing or connecting to the broker failed. Not retried.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(#[from] BrokerError),
}

impl PollError {
    pub fn status(&self) -> StatusCode {
        match self {
            PollError::BadRequest(_) | PollError::UnsupportedTransport(_) => {
                StatusCode::BAD_REQUEST
            }
            PollError::UpstreamUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PollError {
    fn into_response(self) -> Response {
        // Empty body: the status code is the whole contract.
        self.status().into_response()
    }
}
