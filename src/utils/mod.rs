//! The `utils` module provides definitions shared across the `pollbridge`
//! application: the error taxonomy used by the broker, pump and transport
//! layers, and the tracing subscriber setup.

pub mod error;
pub mod logging;
