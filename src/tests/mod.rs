//! End-to-end tests: HTTP commands, scheduler and the Discord client against
//! a mock platform API.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
    response::Response,
};
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use tokio_util::task::TaskTracker;
use tower::ServiceExt;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, header, method, path, query_param, query_param_is_missing},
};

use crate::{
    AppState,
    config::PurgebotConfig,
    purge::PurgeExecutor,
    routes,
    scheduler::{Scheduler, TaskRegistry},
    store::build_store,
};

struct Harness {
    scheduler: Arc<Scheduler>,
    app: Router,
}

impl Harness {
    fn new(server: &MockServer, extra_toml: &str) -> Self {
        let config = PurgebotConfig::from_str(&format!(
            r#"
[scheduler]
tick_secs = 1

[store]
type = "discord"
base_url = "{}/api/v10"
token = "e2e-token"

[store.retry]
max_retries = 1
initial_delay_ms = 1
max_delay_ms = 5
jitter = 0.0
{extra_toml}
"#,
            server.uri()
        ))
        .unwrap();

        let store = build_store(&config.store, config.purge.bulk_delete_max_age()).unwrap();
        let executor = Arc::new(PurgeExecutor::new(store, config.purge.clone()));
        let scheduler = Arc::new(Scheduler::new(
            TaskRegistry::new(),
            executor,
            config.scheduler.clone(),
            TaskTracker::new(),
        ));
        let app = routes::router(AppState::new(scheduler.clone()));

        Self { scheduler, app }
    }

    async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn drain(&self) {
        self.scheduler.tracker().close();
        self.scheduler.tracker().wait().await;
    }
}

fn message(id: &str, channel: &str, age: Duration) -> Value {
    json!({
        "id": id,
        "channel_id": channel,
        "timestamp": (Utc::now() - age).to_rfc3339(),
    })
}

#[tokio::test]
async fn test_scheduled_purge_wipes_channel() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v10/channels/42/messages"))
        .and(query_param("limit", "100"))
        .and(query_param_is_missing("before"))
        .and(header("authorization", "Bot e2e-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            message("103", "42", Duration::minutes(5)),
            message("102", "42", Duration::hours(3)),
            message("101", "42", Duration::days(20)),
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v10/channels/42/messages/101"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v10/channels/42/messages/bulk-delete"))
        .and(body_json(json!({"messages": ["103", "102"]})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::new(&server, "");

    let response = harness
        .send(
            Method::PUT,
            "/v1/channels/42/purge-interval",
            Some(json!({"interval": 1, "unit": "Hours"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Not due yet.
    let outcome = harness.scheduler.tick(Utc::now());
    assert!(outcome.launched.is_empty());

    let due_at = Utc::now() + Duration::hours(1) + Duration::seconds(1);
    let outcome = harness.scheduler.tick(due_at);
    assert_eq!(outcome.launched.len(), 1);
    assert_eq!(outcome.launched[0].as_str(), "42");

    harness.drain().await;

    let task = harness.scheduler.registry().get(&"42".into()).unwrap();
    assert_eq!(task.next_due, due_at + Duration::hours(1));
}

#[tokio::test]
async fn test_manual_purge_with_failing_fetch_keeps_channel_usable() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v10/channels/7/messages"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "message": "Missing Access",
            "code": 50001
        })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let harness = Harness::new(&server, "");

    let response = harness.send(Method::POST, "/v1/channels/7/purge", None).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    // Wait for the first run to finish without closing the tracker.
    while harness.scheduler.is_running(&"7".into()) {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let response = harness.send(Method::POST, "/v1/channels/7/purge", None).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    harness.drain().await;
    assert_eq!(harness.scheduler.running_count(), 0);
}

#[tokio::test]
async fn test_dry_run_issues_no_deletes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v10/channels/8/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            message("2", "8", Duration::minutes(1)),
            message("1", "8", Duration::days(30)),
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let harness = Harness::new(&server, "\n[purge]\ndry_run = true\n");
    let response = harness.send(Method::POST, "/v1/channels/8/purge", None).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    harness.drain().await;
}

#[tokio::test]
async fn test_cleared_channel_is_not_purged() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let harness = Harness::new(&server, "");
    harness
        .send(
            Method::PUT,
            "/v1/channels/3/purge-interval",
            Some(json!({"interval": 2, "unit": "days"})),
        )
        .await;
    let response = harness
        .send(Method::DELETE, "/v1/channels/3/purge-interval", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let outcome = harness.scheduler.tick(Utc::now() + Duration::days(3));
    assert!(outcome.launched.is_empty());

    let response = harness.send(Method::GET, "/v1/status", None).await;
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["task_count"], 0);

    harness.drain().await;
}
