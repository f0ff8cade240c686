use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::broker::{Message, MessageHandler};
use crate::utils::error::NotDelivered;

/// What the request side tells a parked delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Delivered,
    Discard,
}

/// A message parked in the slot together with its single-use outcome channel.
#[derive(Debug)]
pub(crate) struct Delivery {
    pub message: Message,
    pub outcome: oneshot::Sender<Outcome>,
}

impl Delivery {
    pub fn discard(self) {
        debug!(id = %self.message.id, "discarding delivery");
        let _ = self.outcome.send(Outcome::Discard);
    }
}

/// Broker-facing half of a pump's delivery slot.
///
/// Each call blocks until the request side resolves the delivery or closes
/// the slot. A closed slot rejects immediately, so late messages go straight
/// back to the broker.
#[derive(Debug, Clone)]
pub struct DeliverySlot {
    tx: mpsc::Sender<Delivery>,
    closed: CancellationToken,
}

impl DeliverySlot {
    /// Returns the slot together with its receiving half and close signal.
    pub(crate) fn channel() -> (Self, mpsc::Receiver<Delivery>, CancellationToken) {
        let (tx, rx) = mpsc::channel(1);
        let closed = CancellationToken::new();
        let slot = Self {
            tx,
            closed: closed.clone(),
        };
        (slot, rx, closed)
    }
}

#[async_trait]
impl MessageHandler for DeliverySlot {
    async fn handle_message(&self, message: Message) -> Result<(), NotDelivered> {
        let id = message.id.clone();
        let (outcome, resolved) = oneshot::channel();

        if self.tx.send(Delivery { message, outcome }).await.is_err() {
            debug!(%id, "delivery slot closed");
            return Err(NotDelivered);
        }

        // The outcome is checked first: a pump hands off, then closes.
        tokio::select! {
            biased;
            outcome = resolved => match outcome {
                Ok(Outcome::Delivered) => Ok(()),
                // A dropped outcome sender means the pump went away unresolved.
                Ok(Outcome::Discard) | Err(_) => Err(NotDelivered),
            },
            _ = self.closed.cancelled() => {
                debug!(%id, "delivery slot closed while parked");
                Err(NotDelivered)
            }
        }
    }
}
