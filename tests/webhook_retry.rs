use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use tokio::sync::Mutex;

use dispatchd::core::webhook::{DeliveryOutcome, WebhookDispatcher, WebhookSettings};

#[derive(Clone)]
struct ReceiverState {
    /// HTTP statuses to serve, in order; the last entry repeats.
    script: Arc<Vec<u16>>,
    hits: Arc<AtomicU32>,
    timestamps: Arc<Mutex<Vec<Instant>>>,
    bodies: Arc<Mutex<Vec<(HeaderMap, serde_json::Value)>>>,
}

async fn hook_endpoint(
    State(state): State<ReceiverState>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    let hit = state.hits.fetch_add(1, Ordering::SeqCst) as usize;
    state.timestamps.lock().await.push(Instant::now());
    if let Ok(parsed) = serde_json::from_str(&body) {
        state.bodies.lock().await.push((headers, parsed));
    }
    let status = state
        .script
        .get(hit)
        .or_else(|| state.script.last())
        .copied()
        .unwrap_or(200);
    StatusCode::from_u16(status).unwrap_or(StatusCode::OK)
}

/// Start an in-process webhook receiver that serves the scripted status
/// sequence, returning its URL and the shared state.
async fn spawn_receiver(script: Vec<u16>) -> (String, ReceiverState) {
    let state = ReceiverState {
        script: Arc::new(script),
        hits: Arc::new(AtomicU32::new(0)),
        timestamps: Arc::new(Mutex::new(Vec::new())),
        bodies: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/hook", post(hook_endpoint))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind receiver");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{}/hook", addr), state)
}

fn dispatcher(retries: u32) -> WebhookDispatcher {
    WebhookDispatcher::new(WebhookSettings {
        enabled: true,
        default_url: None,
        timeout: Duration::from_secs(5),
        max_retries: retries,
    })
}

#[tokio::test]
async fn two_failures_then_success_takes_three_attempts_with_backoff() {
    let (url, receiver) = spawn_receiver(vec![503, 503, 200]).await;

    let started = Instant::now();
    let outcome = dispatcher(3)
        .deliver(
            "task.completed",
            &serde_json::json!({ "task_id": "t-1" }),
            Some(&url),
        )
        .await;

    match outcome {
        DeliveryOutcome::Delivered { status, attempt } => {
            assert_eq!(status, 200);
            assert_eq!(attempt, 3);
        }
        other => panic!("expected delivery on third attempt, got {:?}", other),
    }
    assert_eq!(receiver.hits.load(Ordering::SeqCst), 3);

    // Backoff schedule: immediate, +1s, +2s.
    let timestamps = receiver.timestamps.lock().await;
    let gap_one = timestamps[1].duration_since(timestamps[0]);
    let gap_two = timestamps[2].duration_since(timestamps[1]);
    assert!(gap_one >= Duration::from_millis(900), "first gap {gap_one:?}");
    assert!(gap_one < Duration::from_secs(2), "first gap {gap_one:?}");
    assert!(gap_two >= Duration::from_millis(1900), "second gap {gap_two:?}");
    assert!(gap_two < Duration::from_secs(4), "second gap {gap_two:?}");
    assert!(started.elapsed() >= Duration::from_secs(3));
}

#[tokio::test]
async fn exhausted_retries_report_the_last_error() {
    let (url, receiver) = spawn_receiver(vec![500]).await;

    let outcome = dispatcher(2)
        .deliver("task.failed", &serde_json::json!({}), Some(&url))
        .await;

    match outcome {
        DeliveryOutcome::Failed { error, attempt } => {
            assert_eq!(attempt, 2);
            assert!(error.contains("500"), "unexpected error: {error}");
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(receiver.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn envelope_carries_event_timestamp_data_and_user_agent() {
    let (url, receiver) = spawn_receiver(vec![200]).await;

    let outcome = dispatcher(3)
        .deliver(
            "task.cancelled",
            &serde_json::json!({ "task_id": "t-9", "status": "cancelled" }),
            Some(&url),
        )
        .await;
    assert!(outcome.delivered());

    let bodies = receiver.bodies.lock().await;
    let (headers, body) = &bodies[0];
    assert_eq!(body["event"], "task.cancelled");
    assert_eq!(body["data"]["task_id"], "t-9");
    assert!(body["timestamp"].as_str().expect("timestamp").contains('T'));

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .expect("user agent");
    assert!(user_agent.starts_with("dispatchd-webhook/"));
    assert_eq!(
        headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .expect("content type"),
        "application/json"
    );
}

#[tokio::test]
async fn per_delivery_override_beats_the_default_url() {
    let (default_url, default_receiver) = spawn_receiver(vec![200]).await;
    let (override_url, override_receiver) = spawn_receiver(vec![200]).await;

    let dispatcher = WebhookDispatcher::new(WebhookSettings {
        enabled: true,
        default_url: Some(default_url),
        timeout: Duration::from_secs(5),
        max_retries: 3,
    });

    let outcome = dispatcher
        .deliver("task.completed", &serde_json::json!({}), Some(&override_url))
        .await;
    assert!(outcome.delivered());
    assert_eq!(override_receiver.hits.load(Ordering::SeqCst), 1);
    assert_eq!(default_receiver.hits.load(Ordering::SeqCst), 0);

    // Without an override, the configured default receives the event.
    let outcome = dispatcher
        .deliver("task.completed", &serde_json::json!({}), None)
        .await;
    assert!(outcome.delivered());
    assert_eq!(default_receiver.hits.load(Ordering::SeqCst), 1);
}
