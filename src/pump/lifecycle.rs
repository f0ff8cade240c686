use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::{BrokerClient, Endpoint, Message, MessageHandler, Subscription};
use crate::pump::slot::{Delivery, DeliverySlot, Outcome};
use crate::utils::error::{BrokerError, PumpError};

/// Lifecycle of a single pump.
///
/// `Init -> Subscribing -> {SetupFailed | Awaiting} -> {Delivered | Cancelled}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Init,
    Subscribing,
    SetupFailed,
    Awaiting,
    Delivered,
    Cancelled,
}

impl PumpState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PumpState::SetupFailed | PumpState::Delivered | PumpState::Cancelled
        )
    }
}

/// Per-request bridge between a broker subscription and a waiting consumer.
///
/// A pump accepts at most one message. It is created for one request and
/// dropped with it; dropping stops the subscription and rejects anything
/// still parked in the slot.
pub struct Pump<C: BrokerClient> {
    client: Arc<C>,
    endpoint: Option<Endpoint>,
    slot: DeliverySlot,
    deliveries: mpsc::Receiver<Delivery>,
    closed: CancellationToken,
    subscription: Option<C::Subscription>,
    state: PumpState,
    topic: String,
    channel: String,
}

impl<C: BrokerClient> Pump<C> {
    pub fn new(client: Arc<C>, endpoint: Option<Endpoint>) -> Self {
        let (slot, deliveries, closed) = DeliverySlot::channel();
        Self {
            client,
            endpoint,
            slot,
            deliveries,
            closed,
            subscription: None,
            state: PumpState::Init,
            topic: String::new(),
            channel: String::new(),
        }
    }

    pub fn state(&self) -> PumpState {
        self.state
    }

    /// The delivery callback handed to the broker on `start`.
    pub fn handler(&self) -> Arc<dyn MessageHandler> {
        Arc::new(self.slot.clone())
    }

    /// Subscribes to `topic`/`channel` and connects to the configured endpoint.
    ///
    /// There is no retry: any failure leaves the pump in `SetupFailed` and
    /// means the upstream is unavailable to this request.
    pub async fn start(&mut self, topic: &str, channel: &str) -> Result<(), BrokerError> {
        if self.state != PumpState::Init {
            return Err(BrokerError::AlreadyConnected);
        }
        self.state = PumpState::Subscribing;
        self.topic = topic.to_string();
        self.channel = channel.to_string();

        let client = self.client.clone();
        let handler = self.handler();
        match subscribe(&*client, self.endpoint.as_ref(), topic, channel, handler).await {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                self.state = PumpState::Awaiting;
                debug!(topic, channel, "pump awaiting delivery");
                Ok(())
            }
            Err(err) => {
                warn!(topic, channel, %err, "subscription setup failed");
                self.state = PumpState::SetupFailed;
                self.close_slot();
                Err(err)
            }
        }
    }

    /// Waits for the one message this pump will accept, or for `cancel`.
    ///
    /// Cancellation is checked first, so a token that has already fired wins
    /// over a message sitting in the slot. Once resolved, the slot is closed
    /// and later calls return `Cancelled` straight away.
    pub async fn await_one(&mut self, cancel: &CancellationToken) -> Result<Message, PumpError> {
        if self.state != PumpState::Awaiting {
            return Err(PumpError::Cancelled);
        }

        let delivery = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            delivery = self.deliveries.recv() => delivery,
        };

        let result = match delivery {
            Some(Delivery { message, outcome }) => {
                if outcome.send(Outcome::Delivered).is_err() {
                    // The broker gave up waiting; it may redeliver this one.
                    warn!(id = %message.id, "delivery acknowledged after broker stopped waiting");
                }
                info!(topic = %self.topic, channel = %self.channel, id = %message.id, attempts = message.attempts, "message delivered");
                self.state = PumpState::Delivered;
                Ok(message)
            }
            None => {
                info!(topic = %self.topic, channel = %self.channel, "client closed");
                self.state = PumpState::Cancelled;
                Err(PumpError::Cancelled)
            }
        };

        self.close_slot();
        result
    }

    /// Stops the subscription if there is one. Later calls do nothing.
    pub fn stop(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.stop();
            debug!(topic = %self.topic, channel = %self.channel, "pump stopped");
        }
    }

    /// Refuses further deliveries and discards any already parked.
    ///
    /// The receiver is closed and drained but never dropped here; handlers
    /// that slip a message in after the drain are released by `closed`.
    fn close_slot(&mut self) {
        self.closed.cancel();
        self.deliveries.close();
        while let Ok(delivery) = self.deliveries.try_recv() {
            delivery.discard();
        }
    }
}

async fn subscribe<C: BrokerClient>(
    client: &C,
    endpoint: Option<&Endpoint>,
    topic: &str,
    channel: &str,
    handler: Arc<dyn MessageHandler>,
) -> Result<C::Subscription, BrokerError> {
    let endpoint = endpoint.ok_or(BrokerError::NoEndpoint)?;
    let mut subscription = client.subscribe(topic, channel, handler).await?;

    if let Err(err) = subscription.connect(endpoint).await {
        subscription.stop();
        return Err(err);
    }
    Ok(subscription)
}

impl<C: BrokerClient> Drop for Pump<C> {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            debug!(topic = %self.topic, channel = %self.channel, state = ?self.state, "pump dropped unresolved");
        }
        self.stop();
        self.close_slot();
    }
}
