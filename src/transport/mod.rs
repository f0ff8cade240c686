//! The `transport` module is responsible for the HTTP side of the bridge.
//!
//! It exposes the long-poll route, which turns one request into one pump
//! lifecycle, and the publish route of the embedded broker.

pub mod http;

pub use http::{AppState, publish_router, router};

#[cfg(test)]
mod tests;
