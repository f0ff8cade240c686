use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, Version};
use tokio::time::{sleep, timeout};
use tower::ServiceExt;

use super::http::{PollParams, supports_streaming};
use super::{AppState, publish_router, router};
use crate::broker::{Endpoint, MemoryBroker};
use crate::utils::error::PollError;

const NSQD: &str = "127.0.0.1:4150";

fn app(broker: &MemoryBroker) -> Router {
    let state = Arc::new(AppState::new(
        Arc::new(broker.clone()),
        Some(Endpoint::Nsqd(NSQD.to_string())),
    ));
    router(state).merge(publish_router(broker.clone()))
}

fn listening_broker() -> MemoryBroker {
    let broker = MemoryBroker::new();
    broker.listen(NSQD);
    broker
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_of(response: axum::response::Response) -> Vec<u8> {
    let bytes = timeout(
        Duration::from_secs(2),
        to_bytes(response.into_body(), usize::MAX),
    )
    .await
    .expect("body did not complete")
    .unwrap();
    bytes.to_vec()
}

async fn eventually(mut check: impl FnMut() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !check() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_long_poll_delivers_one_message() {
    let broker = listening_broker();
    let app = app(&broker);

    let response = app
        .oneshot(get("/?topic=orders&channel=web"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(broker.consumer_count("orders", "web"), 1);

    broker.publish("orders", "order-123").unwrap();
    assert_eq!(body_of(response).await, b"order-123");

    eventually(|| broker.consumer_count("orders", "web") == 0).await;
    assert_eq!(broker.depth("orders", "web"), 0);
}

#[tokio::test]
async fn test_missing_channel_is_bad_request() {
    let broker = listening_broker();
    let response = app(&broker).oneshot(get("/?topic=orders")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_of(response).await.is_empty());
    // No subscription attempted, so nothing was created on the broker.
    broker.publish("orders", "kept").unwrap();
    assert_eq!(broker.depth("orders", "anything"), 1);
}

#[tokio::test]
async fn test_empty_or_missing_params_are_bad_request() {
    let broker = listening_broker();
    let app = app(&broker);

    for uri in ["/", "/?channel=web", "/?topic=&channel=web", "/?topic=orders&channel="] {
        let response = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        assert!(body_of(response).await.is_empty());
    }
}

#[tokio::test]
async fn test_http10_is_unsupported_transport() {
    let broker = listening_broker();
    let request = Request::builder()
        .uri("/?topic=orders&channel=web")
        .version(Version::HTTP_10)
        .body(Body::empty())
        .unwrap();

    let response = app(&broker).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(broker.consumer_count("orders", "web"), 0);
}

#[tokio::test]
async fn test_unreachable_broker_is_server_error() {
    let broker = MemoryBroker::new();
    let response = app(&broker)
        .oneshot(get("/?topic=orders&channel=web"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_of(response).await.is_empty());
}

#[tokio::test]
async fn test_invalid_topic_is_server_error() {
    let broker = listening_broker();
    let response = app(&broker)
        .oneshot(get("/?topic=no%20spaces&channel=web"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_no_endpoint_is_server_error() {
    let broker = listening_broker();
    let state = Arc::new(AppState::new(Arc::new(broker.clone()), None));
    let response = router(state)
        .oneshot(get("/?topic=orders&channel=web"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_client_disconnect_requeues_message() {
    let broker = listening_broker();
    let app = app(&broker);

    let response = app
        .clone()
        .oneshot(get("/?topic=orders&channel=web"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Dropping the response drops its body, as the server does on disconnect.
    drop(response);
    eventually(|| broker.consumer_count("orders", "web") == 0).await;

    broker.publish("orders", "order-456").unwrap();
    assert_eq!(broker.depth("orders", "web"), 1);

    let response = app
        .oneshot(get("/?topic=orders&channel=web"))
        .await
        .unwrap();
    assert_eq!(body_of(response).await, b"order-456");
}

#[tokio::test]
async fn test_ephemeral_channels_vanish_after_disconnect() {
    let broker = listening_broker();
    let app = app(&broker);

    for i in 0..5 {
        let channel = format!("c{i}%23ephemeral");
        let response = app
            .clone()
            .oneshot(get(&format!("/?topic=orders&channel={channel}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        drop(response);
    }

    eventually(|| broker.channel_names("orders").is_empty()).await;
    for _ in 0..3 {
        broker.publish("orders", "after").unwrap();
    }
    assert!(broker.channel_names("orders").is_empty());
}

#[tokio::test]
async fn test_route_is_method_agnostic() {
    let broker = listening_broker();
    broker.publish("orders", "via-post").unwrap();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/?topic=orders&channel=web")
        .body(Body::empty())
        .unwrap();
    let response = app(&broker).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_of(response).await, b"via-post");
}

#[tokio::test]
async fn test_publish_route_feeds_long_poll() {
    let broker = listening_broker();
    let app = app(&broker);

    let publish = Request::builder()
        .method(Method::POST)
        .uri("/pub?topic=orders")
        .body(Body::from("from-http"))
        .unwrap();
    let response = app.clone().oneshot(publish).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_of(response).await, b"OK");

    let response = app
        .oneshot(get("/?topic=orders&channel=web"))
        .await
        .unwrap();
    assert_eq!(body_of(response).await, b"from-http");
}

#[tokio::test]
async fn test_publish_route_rejects_bad_input() {
    let broker = listening_broker();
    let app = app(&broker);

    for (uri, body) in [
        ("/pub", "payload"),
        ("/pub?topic=orders", ""),
        ("/pub?topic=bad%20name", "payload"),
    ] {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .body(Body::from(body))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
    }
}

#[test]
fn test_supports_streaming() {
    assert!(supports_streaming(Version::HTTP_11));
    assert!(supports_streaming(Version::HTTP_2));
    assert!(!supports_streaming(Version::HTTP_10));
    assert!(!supports_streaming(Version::HTTP_09));
}

#[test]
fn test_poll_params_target() {
    let params = PollParams {
        topic: Some("orders".to_string()),
        channel: Some("web".to_string()),
    };
    assert_eq!(
        params.target().unwrap(),
        ("orders".to_string(), "web".to_string())
    );

    let missing = PollParams {
        topic: Some("orders".to_string()),
        channel: None,
    };
    assert!(matches!(
        missing.target(),
        Err(PollError::BadRequest("missing channel"))
    ));
}
