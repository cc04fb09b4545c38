use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

use provision_panel::api::{create_router, StubState};
use provision_panel::client::HttpProvisioner;
use provision_panel::config::PanelConfig;
use provision_panel::controller::{Completion, Dispatch, Outcome};
use provision_panel::panel::{Action, Panel};
use provision_panel::state::ProvisionRegistry;

/// Serves `app` on an ephemeral local port and returns its base URL.
async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn provisioner(base_url: &str) -> Arc<HttpProvisioner> {
    Arc::new(HttpProvisioner::new(PanelConfig::new(base_url).unwrap()))
}

/// Invokes an action and waits for its terminal outcome.
async fn run(
    panel: &mut Panel<HttpProvisioner>,
    rx: &mut UnboundedReceiver<Completion>,
    action: Action,
) -> Outcome {
    assert!(matches!(panel.invoke(action), Dispatch::Sent(_)));
    let completion = rx.recv().await.unwrap();
    panel.on_completion(completion).unwrap()
}

#[derive(Debug, Clone)]
struct Hit {
    endpoint: String,
    content_type: Option<String>,
    body: Value,
}

#[derive(Default)]
struct Capture {
    hits: Mutex<Vec<Hit>>,
}

async fn record(
    State(capture): State<Arc<Capture>>,
    Path(endpoint): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Json<Value> {
    capture.hits.lock().unwrap().push(Hit {
        endpoint,
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_str(&body).unwrap_or(Value::Null),
    });
    Json(json!({ "message": "ok" }))
}

fn capture_app(capture: Arc<Capture>) -> Router {
    Router::new()
        .route("/{endpoint}", post(record))
        .with_state(capture)
}

// ============================================================================
// Wire contract
// ============================================================================

#[tokio::test]
async fn test_payload_header_and_path() {
    let capture = Arc::new(Capture::default());
    let base_url = serve(capture_app(capture.clone())).await;
    let (mut panel, mut rx) = Panel::new(provisioner(&base_url));

    panel.set_user("alice");
    panel.set_device("dev1");

    let outcome = run(&mut panel, &mut rx, Action::Create).await;
    assert_eq!(
        outcome,
        Outcome::Success {
            message: "ok".to_string(),
            job_id: None
        }
    );

    let outcome = run(&mut panel, &mut rx, Action::Destroy).await;
    assert!(outcome.is_success());

    let hits = capture.hits.lock().unwrap().clone();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].endpoint, "create-server");
    assert_eq!(hits[1].endpoint, "destroy-server");
    for hit in &hits {
        assert_eq!(hit.content_type.as_deref(), Some("application/json"));
        assert_eq!(
            hit.body,
            json!({"user": "alice", "device_id": "dev1", "instance_name": "alice-dev1"})
        );
    }
}

#[tokio::test]
async fn test_invalid_input_never_reaches_server() {
    let capture = Arc::new(Capture::default());
    let base_url = serve(capture_app(capture.clone())).await;
    let (mut panel, _rx) = Panel::new(provisioner(&base_url));

    panel.set_user("alice");
    panel.set_device("   ");

    assert!(matches!(panel.invoke(Action::Create), Dispatch::Rejected(_)));
    assert!(matches!(
        panel.state().outcome(),
        Some(Outcome::ValidationFailed(_))
    ));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(capture.hits.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_connection_refused_is_transport_failure() {
    // Grab a free port, then close it again
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (mut panel, mut rx) = Panel::new(provisioner(&format!("http://{}", addr)));
    panel.set_user("alice");
    panel.set_device("dev1");

    match run(&mut panel, &mut rx, Action::Create).await {
        Outcome::TransportFailure(reason) => assert!(!reason.is_empty()),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(panel.view().actions_enabled);
}

// ============================================================================
// Against the stub provisioner
// ============================================================================

#[tokio::test]
async fn test_create_conflict_destroy_cycle() {
    let registry = ProvisionRegistry::new();
    let base_url = serve(create_router(StubState::new(
        registry.clone(),
        Duration::ZERO,
    )))
    .await;
    let api = provisioner(&base_url);
    let (mut panel, mut rx) = Panel::new(api.clone());

    panel.set_user("alice");
    panel.set_device("dev1");

    let job_id = match run(&mut panel, &mut rx, Action::Create).await {
        Outcome::Success { message, job_id } => {
            assert_eq!(message, "Deployment started");
            job_id.unwrap()
        }
        other => panic!("unexpected outcome: {:?}", other),
    };
    assert!(registry.contains("alice-dev1").await);

    let report = api.job_status(&job_id).await.unwrap();
    assert_eq!(report.status, "finished");

    assert_eq!(
        run(&mut panel, &mut rx, Action::Create).await,
        Outcome::ServerRejected {
            status: 409,
            detail: "instance alice-dev1 already exists".to_string()
        }
    );
    assert!(panel.view().status.contains("already exists"));

    let outcome = run(&mut panel, &mut rx, Action::Destroy).await;
    assert!(outcome.is_success());
    assert!(!registry.contains("alice-dev1").await);

    assert_eq!(
        run(&mut panel, &mut rx, Action::Destroy).await,
        Outcome::ServerRejected {
            status: 404,
            detail: "instance alice-dev1 not found".to_string()
        }
    );
}

#[tokio::test]
async fn test_slow_server_keeps_panel_busy() {
    let registry = ProvisionRegistry::new();
    let base_url = serve(create_router(StubState::new(
        registry.clone(),
        Duration::from_millis(200),
    )))
    .await;
    let (mut panel, mut rx) = Panel::new(provisioner(&base_url));

    panel.set_user("bob");
    panel.set_device("d2");
    assert!(matches!(panel.invoke(Action::Create), Dispatch::Sent(_)));

    let view = panel.view();
    assert!(view.busy);
    assert!(!view.actions_enabled);
    assert_eq!(panel.invoke(Action::Create), Dispatch::Ignored);
    assert_eq!(panel.invoke(Action::Destroy), Dispatch::Ignored);

    // editing while busy does not affect the request already sent
    panel.set_device("other");

    let outcome = panel.on_completion(rx.recv().await.unwrap()).unwrap();
    assert!(outcome.is_success());
    assert!(registry.contains("bob-d2").await);
    assert!(!registry.contains("bob-other").await);
    assert!(!panel.view().busy);
}

#[tokio::test]
async fn test_unknown_job_lookup() {
    let base_url = serve(create_router(StubState::new(
        ProvisionRegistry::new(),
        Duration::ZERO,
    )))
    .await;
    let api = provisioner(&base_url);

    let report = api.job_status("nope").await.unwrap();
    assert_eq!(report.status, "not_found");
    assert!(report.result.is_none());
}

#[tokio::test]
async fn test_non_json_error_body_is_transport_failure() {
    let app = Router::new().route(
        "/create-server",
        post(|| async { (StatusCode::BAD_GATEWAY, "upstream unavailable") }),
    );
    let base_url = serve(app).await;
    let (mut panel, mut rx) = Panel::new(provisioner(&base_url));

    panel.set_user("alice");
    panel.set_device("dev1");

    match run(&mut panel, &mut rx, Action::Create).await {
        Outcome::TransportFailure(reason) => {
            assert!(reason.starts_with("Failed to parse response"))
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_numeric_job_id_is_still_success() {
    let app = Router::new().route(
        "/create-server",
        post(|| async { Json(json!({ "message": "queued", "job_id": 42 })) }),
    );
    let base_url = serve(app).await;
    let (mut panel, mut rx) = Panel::new(provisioner(&base_url));

    panel.set_user("alice");
    panel.set_device("dev1");

    assert_eq!(
        run(&mut panel, &mut rx, Action::Create).await,
        Outcome::Success {
            message: "queued".to_string(),
            job_id: Some("42".to_string())
        }
    );
    assert_eq!(panel.view().status, "queued (job 42)");
}
