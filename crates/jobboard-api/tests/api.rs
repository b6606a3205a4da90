//! HTTP façade tests over the in-memory backends.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use jobboard_api::{AppState, routes};
use jobboard_config::JobBoardConfig;
use jobboard_core::{CapabilityAuthority, HmacCapabilityAuthority, JobId, QueueName, Site};
use jobboard_db::{JobRepo, MemoryJobRepo};
use jobboard_scheduler::{ReconcileReport, Reconciler};
use jobboard_store::{MemoryQueueStore, QueueStore};
use serde_json::{Value, json};
use tokio::sync::watch;
use tower::ServiceExt;

const WORKER: &str = "worker+test@localhost";

struct TestApp {
    router: Router,
    store: Arc<MemoryQueueStore>,
    repo: Arc<MemoryJobRepo>,
    authority: Arc<HmacCapabilityAuthority>,
    reports: watch::Sender<Option<Arc<ReconcileReport>>>,
}

fn app(auth_tokens: &[&str]) -> TestApp {
    let mut config = JobBoardConfig::default();
    config.default_site = Site::new("test").unwrap();
    config.default_queue = QueueName::new("lel").unwrap();
    config.auth_tokens = auth_tokens.iter().map(|t| t.to_string()).collect();

    let store = Arc::new(MemoryQueueStore::new());
    let repo = Arc::new(MemoryJobRepo::new());
    let authority = Arc::new(HmacCapabilityAuthority::new("test", chrono::Duration::hours(1)));
    let (reports, rx) = watch::channel(None);
    let state = AppState::new(store.clone(), repo.clone(), authority.clone(), rx, &config);

    TestApp {
        router: routes::router(state),
        store,
        repo,
        authority,
        reports,
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

fn json_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

fn add_job(id: &str) -> Request<Body> {
    Request::post("/jobs/add")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"@type": "job", "id": id, "language": "rubby", "os": "lanerks"}).to_string(),
        ))
        .unwrap()
}

fn allocate(count: usize, held: &[&str]) -> Request<Body> {
    Request::post(format!("/jobs?queue=lel&count={}", count))
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::FROM, WORKER)
        .body(Body::from(json!({ "jobs": held }).to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_add_job_returns_201_with_empty_body() {
    let app = app(&[]);
    let (status, body) = send(&app, add_job("1")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body.is_empty());

    let site = Site::new("test").unwrap();
    let queue = QueueName::new("lel").unwrap();
    assert_eq!(app.store.measure(&site, &queue).await.unwrap().queued, 1);
    let record = app.repo.get(&JobId::new("1").unwrap()).await.unwrap();
    assert_eq!(record.payload["os"], "lanerks");
}

#[tokio::test]
async fn test_add_job_without_id_is_bad_request() {
    let app = app(&[]);
    let request = Request::post("/jobs/add")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"language": "rubby"}"#))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json_body(&body)["error"].is_string());
}

#[tokio::test]
async fn test_duplicate_job_conflicts() {
    let app = app(&[]);
    send(&app, add_job("1")).await;
    let (status, _) = send(&app, add_job("1")).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_allocate_returns_jobs_and_metadata() {
    let app = app(&[]);
    for id in ["1", "2", "3"] {
        send(&app, add_job(id)).await;
    }

    let (status, body) = send(&app, allocate(3, &[])).await;
    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["@count"], 3);
    assert_eq!(body["@queue"], "lel");
    assert_eq!(body["jobs"].as_array().unwrap().len(), 3);
    assert_eq!(body["jobs"][0]["job_id"], "1");
    assert_eq!(body["jobs"][0]["payload"]["language"], "rubby");
    assert_eq!(body["unavailable_jobs"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_allocate_reports_unavailable_jobs() {
    let app = app(&[]);
    send(&app, add_job("1")).await;
    send(&app, allocate(1, &[])).await;
    app.repo.delete(&JobId::new("1").unwrap()).await.unwrap();

    let (_, body) = send(&app, allocate(1, &["1"])).await;
    let body = json_body(&body);
    assert_eq!(body["unavailable_jobs"], json!(["1"]));
    assert_eq!(body["@count"], 0);
}

#[tokio::test]
async fn test_allocate_requires_from_header() {
    let app = app(&[]);
    let request = Request::post("/jobs?queue=lel&count=1")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_fetch_job_includes_script_urls_and_jwt() {
    let app = app(&[]);
    send(&app, add_job("42")).await;
    send(&app, allocate(1, &[])).await;

    let request = Request::get("/jobs/42")
        .header(header::FROM, WORKER)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["job_script"]["name"], "main");
    assert_eq!(body["job_script"]["encoding"], "base64");
    assert!(!body["job_script"]["content"].as_str().unwrap().is_empty());
    assert!(body["job_state_url"].as_str().unwrap().contains("/42/"));
    assert!(body["log_parts_url"].is_string());

    let jwt = body["jwt"].as_str().unwrap();
    assert!(app.authority.verify(&JobId::new("42").unwrap(), jwt).is_ok());
}

#[tokio::test]
async fn test_fetch_unknown_job_is_404() {
    let app = app(&[]);
    let request = Request::get("/jobs/nope")
        .header(header::FROM, WORKER)
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_job_with_capability() {
    let app = app(&[]);
    send(&app, add_job("42")).await;
    let job_id = JobId::new("42").unwrap();
    let token = app.authority.mint(&job_id).unwrap();

    let request = Request::delete("/jobs/42")
        .header(header::FROM, WORKER)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());
    assert!(app.repo.is_empty().await);
}

#[tokio::test]
async fn test_delete_job_with_wrong_capability_is_403() {
    let app = app(&[]);
    send(&app, add_job("42")).await;
    let other = app.authority.mint(&JobId::new("43").unwrap()).unwrap();

    for auth in [None, Some(format!("Bearer {}", other))] {
        let mut request = Request::delete("/jobs/42");
        if let Some(auth) = auth {
            request = request.header(header::AUTHORIZATION, auth);
        }
        let (status, _) = send(&app, request.body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
    assert_eq!(app.repo.len().await, 1);
}

#[tokio::test]
async fn test_worker_routes_require_configured_token() {
    let app = app(&["abc123", "secret"]);

    let (status, _) = send(&app, allocate(1, &[])).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut request = allocate(1, &[]);
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, "Bearer nope".parse().unwrap());
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let mut request = allocate(1, &[]);
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, "Bearer secret".parse().unwrap());
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_store_outage_is_503() {
    let app = app(&[]);
    app.store.set_unavailable(true);
    let (status, _) = send(&app, allocate(1, &[])).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_reconcile_report() {
    let app = app(&[]);
    let get = || Request::get("/reconcile").body(Body::empty()).unwrap();

    let (status, _) = send(&app, get()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    send(&app, add_job("1")).await;
    send(&app, allocate(1, &[])).await;
    let reconciler = Reconciler::new(app.store.clone(), app.store.clone());
    let report = reconciler.sweep().await.unwrap();
    app.reports.send_replace(Some(Arc::new(report)));

    let (status, body) = send(&app, get()).await;
    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["sites"]["test"]["reclaimed"], 1);
    assert_eq!(body["sites"]["test"]["workers"][WORKER]["claimed"], 0);
    assert_eq!(body["sites"]["test"]["queues"]["lel"]["queued"], 1);
    assert!(body["elapsed_secs"].is_number());
}

#[tokio::test]
async fn test_health() {
    let app = app(&[]);
    let (status, body) = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["status"], "ok");
}
