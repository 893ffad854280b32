//! SSE ownership filtering tests
//!
//! The event stream only carries events for cases the connected user owns.
//! `oneshot` cannot drive a long-lived response, so these tests bind the
//! router to an ephemeral port and read the stream over a real socket.

use std::sync::Arc;
use std::time::Duration;

use object_store::memory::InMemory;
use serde_json::{json, Value};
use uuid::Uuid;

use entolab_api::services::detector_client::DetectorClient;
use entolab_api::services::storage::ObjectStorage;
use entolab_common::config::StorageConfig;
use entolab_common::events::{EntoEvent, EventBus};
use entolab_common::pmi::LifeStage;

/// Serve the app on a loopback port; returns the base URL and a handle
/// for emitting events from the test side
async fn spawn_test_server() -> (String, EventBus) {
    let pool = entolab_common::db::init_memory_pool()
        .await
        .expect("Failed to create in-memory database");

    let event_bus = EventBus::new(100);

    let storage_config = StorageConfig {
        bucket: Some("entolab-test".to_string()),
        region: Some("us-east-1".to_string()),
        endpoint: Some("http://127.0.0.1:9000".to_string()),
        access_key_id: Some("test-access-key".to_string()),
        secret_access_key: Some("test-secret-key".to_string()),
        allow_http: true,
    };
    let storage = ObjectStorage::with_store(&storage_config, Arc::new(InMemory::new()))
        .expect("Failed to configure storage");
    let detector = DetectorClient::new("http://127.0.0.1:1".to_string(), None)
        .expect("Failed to build detector client");

    let state = entolab_api::AppState::new(pool, event_bus.clone(), storage, detector);
    let app = entolab_api::build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), event_bus)
}

async fn register(client: &reqwest::Client, base: &str, username: &str) -> String {
    let body: Value = client
        .post(format!("{}/api/auth/register", base))
        .json(&json!({"username": username, "password": "correct horse battery"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body["session_token"].as_str().unwrap().to_string()
}

async fn create_case(client: &reqwest::Client, base: &str, token: &str, title: &str) -> Uuid {
    let body: Value = client
        .post(format!("{}/api/cases", base))
        .bearer_auth(token)
        .json(&json!({
            "title": title,
            "ambient_temp_c": 25.0,
            "discovered_at": "2026-08-20T06:30:00Z"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body["guid"].as_str().unwrap().parse().unwrap()
}

async fn connect_stream(client: &reqwest::Client, base: &str, token: &str) -> reqwest::Response {
    let response = client
        .get(format!("{}/api/events", base))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    response
}

/// Read the stream until a complete event frame arrives or the window
/// elapses. Heartbeat comments never show up inside these short windows.
async fn next_frame(response: &mut reqwest::Response, window: Duration) -> Option<String> {
    let mut buf = String::new();
    let deadline = tokio::time::Instant::now() + window;

    loop {
        let remaining = deadline
            .checked_duration_since(tokio::time::Instant::now())
            .unwrap_or(Duration::ZERO);
        match tokio::time::timeout(remaining, response.chunk()).await {
            Ok(Ok(Some(bytes))) => {
                buf.push_str(&String::from_utf8_lossy(&bytes));
                if buf.contains("\n\n") {
                    return Some(buf);
                }
            }
            // Stream closed, transport error, or window elapsed
            _ => return None,
        }
    }
}

fn pmi_updated(case_id: Uuid) -> EntoEvent {
    EntoEvent::PmiUpdated {
        case_id,
        oldest_stage: LifeStage::Instar3,
        pmi_min_hours: 53.125,
        pmi_max_hours: Some(135.0),
        timestamp: chrono::Utc::now(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_event_stream_filters_by_case_ownership() {
    let (base, event_bus) = spawn_test_server().await;
    let client = reqwest::Client::new();

    let analyst_token = register(&client, &base, "analyst").await;
    let examiner_token = register(&client, &base, "examiner").await;
    let analyst_case = create_case(&client, &base, &analyst_token, "Analyst case").await;

    let mut analyst_stream = connect_stream(&client, &base, &analyst_token).await;
    let mut examiner_stream = connect_stream(&client, &base, &examiner_token).await;

    // Both handlers subscribed before their responses came back
    assert_eq!(event_bus.subscriber_count(), 2);

    event_bus.emit(pmi_updated(analyst_case));

    let frame = next_frame(&mut analyst_stream, Duration::from_secs(5))
        .await
        .expect("owner did not receive the event");
    assert!(frame.contains("event: PmiUpdated"), "frame was: {}", frame);
    assert!(frame.contains(&analyst_case.to_string()));

    // The other user's stream stays silent
    let frame = next_frame(&mut examiner_stream, Duration::from_millis(500)).await;
    assert!(frame.is_none(), "foreign event leaked: {:?}", frame);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_event_stream_picks_up_cases_created_after_connect() {
    let (base, event_bus) = spawn_test_server().await;
    let client = reqwest::Client::new();

    let analyst_token = register(&client, &base, "analyst").await;
    let examiner_token = register(&client, &base, "examiner").await;

    let mut analyst_stream = connect_stream(&client, &base, &analyst_token).await;
    let mut examiner_stream = connect_stream(&client, &base, &examiner_token).await;
    assert_eq!(event_bus.subscriber_count(), 2);

    // This case is not in either stream's ownership cache yet
    let late_case = create_case(&client, &base, &analyst_token, "Late case").await;
    event_bus.emit(pmi_updated(late_case));

    // The owner's stream refreshes its cache and delivers the event
    let frame = next_frame(&mut analyst_stream, Duration::from_secs(5))
        .await
        .expect("owner did not receive the event for a post-connect case");
    assert!(frame.contains(&late_case.to_string()));

    // The refresh does not leak the case to anyone else
    let frame = next_frame(&mut examiner_stream, Duration::from_millis(500)).await;
    assert!(frame.is_none(), "foreign event leaked: {:?}", frame);
}
