//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use event_store::InMemoryEventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use projections::{AggregationDaemon, DashboardProjection};
use serde_json::{Value, json};
use tower::ServiceExt;
use workflow::{DiscoveryWorkflow, Dispatcher, LogNotifier, OutboxRelay};

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> (Router, InMemoryEventStore) {
    let store = projections::in_memory_store();
    let state = Arc::new(api::AppState::new(store.clone()));
    (api::create_app(state, get_metrics_handle()), store)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn create_client(app: &Router, name: &str) -> String {
    let (status, body) = send(app, "POST", "/api/clients", Some(json!({ "name": name }))).await;
    assert_eq!(status, StatusCode::CREATED);
    body["client_id"].as_str().unwrap().to_string()
}

async fn open_matter(app: &Router, client_id: &str, opposing: &str, cents: i64) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        "/api/intake",
        Some(json!({
            "client_id": client_id,
            "opposing_party": opposing,
            "case_type": "PersonalInjury",
            "initial_claim_amount": cents,
        })),
    )
    .await
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup();
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["pending_outbox"], 0);
    assert_eq!(body["dead_letters"], 0);
}

#[tokio::test]
async fn test_client_registration_and_listing() {
    let (app, _) = setup();
    create_client(&app, "  Zeta Corp ").await;
    let alpha = create_client(&app, "Alpha LLC").await;

    let (status, body) = send(&app, "POST", "/api/clients", Some(json!({ "name": "Alpha LLC" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already exists"));

    let (status, _) = send(&app, "POST", "/api/clients", Some(json!({ "name": "   " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "GET", "/api/clients", None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Alpha LLC", "Zeta Corp"]);

    let (status, body) = send(&app, "GET", &format!("/api/clients/{alpha}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Alpha LLC");
}

#[tokio::test]
async fn test_intake_and_matter_lookup() {
    let (app, _) = setup();
    let client_id = create_client(&app, "Northwind").await;

    let (status, body) = open_matter(&app, &client_id, "Contoso", 150_000_000).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["is_high_priority"], true);
    assert_eq!(body["version"], 2);
    let matter_id = body["matter_id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, "GET", &format!("/api/matters/{matter_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["client_name"], "Northwind");
    assert_eq!(body["status"], "New");
    assert_eq!(body["is_high_priority"], true);

    let (status, body) = send(&app, "GET", &format!("/api/matters/{matter_id}/history"), None).await;
    assert_eq!(status, StatusCode::OK);
    let types: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event_type"].as_str().unwrap())
        .collect();
    assert_eq!(types, vec!["MatterOpened", "MatterTaggedAsHighPriority"]);
}

#[tokio::test]
async fn test_intake_rejections() {
    let (app, _) = setup();
    let client_id = create_client(&app, "Northwind").await;
    create_client(&app, "Fabrikam").await;

    // Opposing party is an existing client.
    let (status, body) = open_matter(&app, &client_id, "Fabrikam", 10_000).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("Conflict of interest"));

    // Non-positive amount.
    let (status, _) = open_matter(&app, &client_id, "Contoso", 0).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Amount above the accepted maximum.
    let (status, _) = open_matter(&app, &client_id, "Contoso", i64::MAX).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Unknown client.
    let unknown = uuid::Uuid::new_v4().to_string();
    let (status, _) = open_matter(&app, &unknown, "Contoso", 10_000).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Duplicate warning, then confirmed.
    let (status, first) = open_matter(&app, &client_id, "Contoso", 10_000).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = open_matter(&app, &client_id, "Contoso", 10_000).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["type"], "duplicate");
    assert_eq!(body["existing_matter_id"], first["matter_id"]);

    let (status, _) = send(
        &app,
        "POST",
        "/api/intake",
        Some(json!({
            "client_id": client_id,
            "opposing_party": "Contoso",
            "case_type": "PersonalInjury",
            "initial_claim_amount": 10_000,
            "confirm_duplicate": true,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_status_update_and_stale_version() {
    let (app, _) = setup();
    let client_id = create_client(&app, "Northwind").await;
    let (_, body) = open_matter(&app, &client_id, "Contoso", 10_000).await;
    let matter_id = body["matter_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/matters/{matter_id}/status"),
        Some(json!({ "new_status": "Discovery", "reason": "evidence" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["version"], 2);
    assert_eq!(body["event"]["event_type"], "StatusChanged");
    assert_eq!(body["event"]["payload"]["old_status"], "New");

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/matters/{matter_id}/status"),
        Some(json!({ "new_status": "Closed", "reason": "stale", "expected_version": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let missing = uuid::Uuid::new_v4();
    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/matters/{missing}/status"),
        Some(json!({ "new_status": "Closed", "reason": "none" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_attorney_and_settlement_offer() {
    let (app, _) = setup();
    let client_id = create_client(&app, "Northwind").await;
    let (_, body) = open_matter(&app, &client_id, "Contoso", 10_000).await;
    let matter_id = body["matter_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/matters/{matter_id}/attorney"),
        Some(json!({ "attorney_id": uuid::Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Active");

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/matters/{matter_id}/settlement-offers"),
        Some(json!({ "amount": 5_000 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["version"], 3);

    let (_, body) = send(&app, "GET", &format!("/api/matters/{matter_id}"), None).await;
    assert_eq!(body["latest_settlement_offer"], 5_000);
}

#[tokio::test]
async fn test_matter_listing() {
    let (app, _) = setup();
    let client_id = create_client(&app, "Northwind").await;
    for (opposing, cents) in [("Contoso", 300), ("Adatum", 100), ("Litware", 200_000_000)] {
        let (status, _) = open_matter(&app, &client_id, opposing, cents).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send(
        &app,
        "GET",
        "/api/matters?sort=opposing_party&direction=asc&page_size=2",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_count"], 3);
    assert_eq!(body["total_pages"], 2);
    assert_eq!(body["items"][0]["opposing_party"], "Adatum");
    assert_eq!(body["items"][1]["opposing_party"], "Contoso");

    let (_, body) = send(&app, "GET", "/api/matters?high_priority=true", None).await;
    assert_eq!(body["total_count"], 1);
    assert_eq!(body["items"][0]["opposing_party"], "Litware");

    let (status, _) = send(&app, "GET", "/api/matters?status=archived", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_dashboard_and_discovery_follow_up() {
    let (app, store) = setup();

    let (status, body) = send(&app, "GET", "/api/dashboard", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_active_cases"], 0);

    let client_id = create_client(&app, "Northwind").await;
    let (_, body) = open_matter(&app, &client_id, "Contoso", 150_000_000).await;
    let matter_id = body["matter_id"].as_str().unwrap().to_string();
    send(
        &app,
        "POST",
        &format!("/api/matters/{matter_id}/status"),
        Some(json!({ "new_status": "Discovery", "reason": "go" })),
    )
    .await;

    AggregationDaemon::new(store.clone(), DashboardProjection)
        .catch_up()
        .await
        .unwrap();
    let dispatcher =
        Dispatcher::new().register(DiscoveryWorkflow::new(store.clone(), LogNotifier));
    OutboxRelay::new(store.clone(), dispatcher)
        .run_once()
        .await
        .unwrap();

    let (_, body) = send(&app, "GET", "/api/dashboard", None).await;
    assert_eq!(body["total_active_cases"], 1);
    assert_eq!(body["high_priority_case_count"], 1);
    assert_eq!(body["total_potential_settlement_value"], 150_000_000);

    let (_, body) = send(&app, "GET", &format!("/api/matters/{matter_id}"), None).await;
    assert_eq!(body["task_count"], 1);
}

#[tokio::test]
async fn test_invalid_id_is_bad_request() {
    let (app, _) = setup();
    let (status, body) = send(&app, "GET", "/api/matters/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Invalid ID"));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = setup();
    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
