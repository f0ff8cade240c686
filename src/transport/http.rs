//! HTTP long-poll transport
//!
//! `GET /?topic=<name>&channel=<name>` (any method) subscribes to the
//! channel, answers `200` straight away and holds the body open until one
//! message arrives. The payload is written as a single chunk and the
//! response ends. If the client goes away first, the pump is cancelled and
//! the broker gets any late message back.
//!
//! `POST /pub?topic=<name>` publishes the request body to the embedded broker.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{StatusCode, Version};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, post};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

use crate::broker::{BrokerClient, Endpoint, MemoryBroker};
use crate::pump::Pump;
use crate::utils::error::PollError;

/// Shared state of the long-poll route.
#[derive(Debug)]
pub struct AppState<C> {
    pub client: Arc<C>,
    pub endpoint: Option<Endpoint>,
}

impl<C: BrokerClient> AppState<C> {
    pub fn new(client: Arc<C>, endpoint: Option<Endpoint>) -> Self {
        Self { client, endpoint }
    }
}

/// Query string of a long-poll request.
#[derive(Debug, Default, Deserialize)]
pub struct PollParams {
    pub topic: Option<String>,
    pub channel: Option<String>,
}

impl PollParams {
    /// Returns `(topic, channel)`; both must be present and non-empty.
    pub fn target(self) -> Result<(String, String), PollError> {
        let topic = non_empty(self.topic).ok_or(PollError::BadRequest("missing topic"))?;
        let channel = non_empty(self.channel).ok_or(PollError::BadRequest("missing channel"))?;
        Ok((topic, channel))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PublishParams {
    pub topic: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Whether responses on this protocol version can be flushed incrementally.
///
/// HTTP/1.0 and older have no chunked transfer coding, so a body cannot be
/// held open and pushed later.
pub fn supports_streaming(version: Version) -> bool {
    matches!(
        version,
        Version::HTTP_11 | Version::HTTP_2 | Version::HTTP_3
    )
}

pub fn router<C: BrokerClient>(state: Arc<AppState<C>>) -> Router {
    Router::new()
        .route("/", any(long_poll::<C>))
        .with_state(state)
}

/// Routes backed by the embedded broker.
pub fn publish_router(broker: MemoryBroker) -> Router {
    Router::new()
        .route("/pub", post(publish))
        .with_state(broker)
}

async fn long_poll<C: BrokerClient>(
    State(state): State<Arc<AppState<C>>>,
    version: Version,
    query: Result<Query<PollParams>, QueryRejection>,
) -> Result<Response, PollError> {
    if !supports_streaming(version) {
        return Err(PollError::UnsupportedTransport(version));
    }

    let Query(params) = query.map_err(|_| PollError::BadRequest("malformed query"))?;
    let (topic, channel) = params.target()?;

    let mut pump = Pump::new(state.client.clone(), state.endpoint.clone());
    pump.start(&topic, &channel).await?;

    let (body_tx, body_rx) = mpsc::channel::<Bytes>(1);
    let span = info_span!("long_poll", %topic, %channel);
    tokio::spawn(drive(pump, body_tx).instrument(span));

    let stream = futures::stream::unfold(body_rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|chunk| (Ok::<_, Infallible>(chunk), rx))
    });

    // Headers go out now; the body stays open until `drive` finishes.
    Ok((StatusCode::OK, Body::from_stream(stream)).into_response())
}

/// Runs one pump to completion behind an already-open response.
///
/// The message is acknowledged by `await_one` before the body is written;
/// see the "when delivered is signalled" decision in DESIGN.md before reordering.
async fn drive<C: BrokerClient>(mut pump: Pump<C>, body: mpsc::Sender<Bytes>) {
    let cancel = CancellationToken::new();
    let request_done = CancellationToken::new();
    let watcher = tokio::spawn(watch_disconnect(
        body.clone(),
        cancel.clone(),
        request_done.clone(),
    ));

    let outcome = pump.await_one(&cancel).await;
    request_done.cancel();
    let _ = watcher.await;

    if let Ok(message) = outcome {
        if body.send(message.body).await.is_err() {
            warn!(id = %message.id, "client went away before the payload was written");
        }
    }

    pump.stop();
}

/// Fires `cancel` once the response body is dropped by the server, which
/// happens when the client disconnects or the transport closes.
async fn watch_disconnect(
    body: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
    request_done: CancellationToken,
) {
    tokio::select! {
        _ = body.closed() => {
            debug!("response body dropped");
            cancel.cancel();
        }
        _ = request_done.cancelled() => {}
    }
}

async fn publish(
    State(broker): State<MemoryBroker>,
    query: Result<Query<PublishParams>, QueryRejection>,
    body: Bytes,
) -> Result<&'static str, PollError> {
    let Query(params) = query.map_err(|_| PollError::BadRequest("malformed query"))?;
    let topic = non_empty(params.topic).ok_or(PollError::BadRequest("missing topic"))?;
    if body.is_empty() {
        return Err(PollError::BadRequest("empty message"));
    }

    broker
        .publish(&topic, body)
        .map_err(|_| PollError::BadRequest("invalid topic"))?;
    Ok("OK")
}
