//! The `pump` module bridges one broker subscription to one waiting HTTP
//! request.
//!
//! A [`Pump`] owns a transient subscription and a capacity-one delivery slot.
//! The broker's delivery task parks a message in the slot through
//! [`DeliverySlot`] and waits for an outcome; the request side picks the
//! message up with [`Pump::await_one`] or gives up when its cancellation
//! token fires. Exactly one of those two outcomes wins, and whatever is left
//! in the slot afterwards is answered with "discard" so the broker requeues it.

pub mod lifecycle;
pub mod slot;

pub use lifecycle::{Pump, PumpState};
pub use slot::DeliverySlot;
