//! # Integration Tests for nsm-api
//!
//! Drives the assembled router with `oneshot` against the in-memory store
//! and control plane. JWT tests mint RS256 tokens with a fixture key and
//! serve the matching JWKS from a wiremock server.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::{Duration as ChronoDuration, Utc};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nsm_apim_client::stub::{InMemoryControlPlane, Operation};
use nsm_core::TenantId;

use nsm_api::auth::{AuthMode, JwtConfig, TokenVerifier};
use nsm_api::db::memory::{MemoryStore, MonitoringEvent};
use nsm_api::db::AdminStore;
use nsm_api::state::{AppConfig, AppState};

const SIGNING_KEY_PEM: &str = include_str!("fixtures/jwt_signing_key.pem");
const SIGNING_KEY_N: &str = "t-_JCf0mOkU1ut2i6-Mcz0PTmgM4yAXjubUUjrKijeiQm9w8GZZOorJzupherbtholJtHAlNk-9CYzBJmwaNflcPJsCLzoM8JJ_ivWEjCTHgI5mGxzrQeB_YRsoFebXxXulbNqRPpKhcVuoCsjGvOJ7nB2DPKwrNgjS_OOGLyE7SfCx9_FlwXAHJ0Zv7AKfHIeeGI40K4P1X6lz1ceBs2nS21ThkKmmhtthLCiTWUi4vwwEQ49PByVrNPpfvjaPQpk9gXaH3B0Vp7bEDdbnkLhtHUm2LtiOWGmyjp3hDn6ctgUhmNl-0O9dpplEW4LDZUu-qSrEcI7MhpVGVfJ66sw";
const KID: &str = "test-key";
const AUDIENCE: &str = "api://nsm-admin";

struct Harness {
    store: Arc<MemoryStore>,
    control_plane: Arc<InMemoryControlPlane>,
    app: axum::Router,
}

fn harness_with(mode: AuthMode, config: AppConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let control_plane = Arc::new(InMemoryControlPlane::new("monitoring-standard"));
    let state = AppState::new(
        store.clone(),
        control_plane.clone(),
        Arc::new(TokenVerifier::new(mode)),
        config,
    );
    Harness {
        store,
        control_plane,
        app: nsm_api::app(state),
    }
}

/// Auth disabled, no route prefix.
fn dev_harness() -> Harness {
    harness_with(
        AuthMode::Development,
        AppConfig::default(),
    )
}

fn jwt_mode(jwks_url: String) -> AuthMode {
    AuthMode::Jwt(JwtConfig {
        jwks_url,
        audience: AUDIENCE.into(),
        cache_ttl: Duration::from_secs(300),
    })
}

async fn body_json(response: axum::http::Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn create_acme(app: &axum::Router, tenant: &str) -> Value {
    let response = app
        .clone()
        .oneshot(post_json(
            "/customers",
            json!({"customer_name": "Acme", "tenant_id": tenant}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

// -- Health -------------------------------------------------------------------

#[tokio::test]
async fn health_is_open_even_with_jwt_auth() {
    let h = harness_with(jwt_mode("http://127.0.0.1:9/keys".into()), AppConfig::default());
    let response = h.app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"status": "healthy", "message": "Backend is running"})
    );
}

// -- Authentication -----------------------------------------------------------

#[tokio::test]
async fn protected_routes_reject_missing_token_without_side_effects() {
    let h = harness_with(jwt_mode("http://127.0.0.1:9/keys".into()), AppConfig::default());

    let requests = vec![
        get("/dashboard/stats"),
        get("/dashboard/activity"),
        get("/customers"),
        post_json("/customers", json!({"customer_name": "Acme", "tenant_id": "T1"})),
        delete("/customers/T1"),
        post_empty("/customers/T1/regenerate-key"),
        get("/analytics?days=7"),
        get("/openapi.json"),
    ];

    for request in requests {
        let uri = request.uri().to_string();
        let response = h.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body_json(response).await, json!({"error": "Unauthorized"}));
    }

    assert!(!h.store.has_customer("T1"));
    assert!(h.control_plane.calls().is_empty());
}

// -- Customers ----------------------------------------------------------------

#[tokio::test]
async fn customer_without_subscription_lists_inactive() {
    let h = dev_harness();
    h.store
        .insert_customer(&TenantId::new("T1").unwrap(), "Acme")
        .await
        .unwrap();

    let response = h.app.oneshot(get("/customers")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let customers = body_json(response).await;
    assert_eq!(
        customers,
        json!([{
            "customer_name": "Acme",
            "tenant_id": "T1",
            "subscription_key": null,
            "tier": null,
            "is_active": false,
            "requests_per_hour": null,
            "requests_per_day": null,
            "usage_30d": 0
        }])
    );
}

#[tokio::test]
async fn created_key_is_the_listed_subscription_key() {
    let h = dev_harness();
    let created = create_acme(&h.app, "0ed11b7c-74bd-4b4e").await;
    assert_eq!(created["customer_id"], "0ed11b7c-74bd-4b4e");
    assert_eq!(created["tier"], "standard");
    assert_eq!(created["status"], "created");

    let customers = body_json(h.app.clone().oneshot(get("/customers")).await.unwrap()).await;
    let listed = &customers[0];
    assert_eq!(listed["subscription_key"], created["api_key"]);
    assert_eq!(listed["is_active"], true);
    assert_eq!(listed["requests_per_hour"], 1000);
    assert_eq!(listed["requests_per_day"], 10000);
    assert_eq!(
        h.control_plane.primary_key_of("sub-0ed11b7c").as_deref(),
        created["api_key"].as_str()
    );
}

#[tokio::test]
async fn duplicate_tenant_is_conflict() {
    let h = dev_harness();
    create_acme(&h.app, "T1").await;

    let response = h
        .app
        .clone()
        .oneshot(post_json(
            "/customers",
            json!({"customer_name": "Acme Again", "tenant_id": "T1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("T1"));

    let creates = h
        .control_plane
        .calls()
        .into_iter()
        .filter(|op| *op == Operation::Create)
        .count();
    assert_eq!(creates, 1);
}

#[tokio::test]
async fn malformed_create_body_is_bad_request() {
    let h = dev_harness();
    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/customers")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["error"].is_string());

    let response = h
        .app
        .oneshot(post_json("/customers", json!({"customer_name": "Acme"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(h.control_plane.calls().is_empty());
}

#[tokio::test]
async fn control_plane_failure_on_create_leaves_customer_row() {
    let h = dev_harness();
    h.control_plane.fail(Operation::Create);

    let response = h
        .app
        .clone()
        .oneshot(post_json(
            "/customers",
            json!({"customer_name": "Acme", "tenant_id": "T1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(h.store.has_customer("T1"));
    assert_eq!(h.store.subscription_key("T1").await.unwrap(), None);
}

#[tokio::test]
async fn rotate_without_subscription_is_not_found() {
    let h = dev_harness();
    h.store
        .insert_customer(&TenantId::new("T1").unwrap(), "Acme")
        .await
        .unwrap();

    let response = h
        .app
        .oneshot(post_empty("/customers/T1/regenerate-key"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await, json!({"error": "Customer not found"}));
    assert!(h.control_plane.calls().is_empty());
}

#[tokio::test]
async fn rotate_stores_new_key() {
    let h = dev_harness();
    let created = create_acme(&h.app, "T1").await;

    let response = h
        .app
        .clone()
        .oneshot(post_empty("/customers/T1/regenerate-key"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let new_key = body_json(response).await["new_key"].clone();
    assert_ne!(new_key, created["api_key"]);

    let customers = body_json(h.app.oneshot(get("/customers")).await.unwrap()).await;
    assert_eq!(customers[0]["subscription_key"], new_key);
}

#[tokio::test]
async fn rotate_with_drifted_key_fails_without_store_change() {
    let h = dev_harness();
    create_acme(&h.app, "T1").await;
    let stored = h.store.subscription_key("T1").await.unwrap();
    h.control_plane.seed("sub-T1", "Acme", "replaced-elsewhere");

    let response = h
        .app
        .oneshot(post_empty("/customers/T1/regenerate-key"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await,
        json!({"error": "Failed to regenerate key in APIM"})
    );
    assert_eq!(h.store.subscription_key("T1").await.unwrap(), stored);
}

#[tokio::test]
async fn delete_removes_subscription_everywhere() {
    let h = dev_harness();
    create_acme(&h.app, "T1").await;

    let response = h.app.clone().oneshot(delete("/customers/T1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"status": "deleted", "control_plane": {"outcome": "deleted", "sid": "sub-T1"}})
    );
    assert!(!h.store.has_customer("T1"));
    assert!(h.control_plane.is_empty());
}

#[tokio::test]
async fn delete_succeeds_when_control_plane_fails() {
    let h = dev_harness();
    create_acme(&h.app, "T1").await;
    h.control_plane.fail(Operation::List);

    let response = h.app.clone().oneshot(delete("/customers/T1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "deleted");
    assert_eq!(body["control_plane"]["outcome"], "deleted_locally");

    assert!(!h.store.has_customer("T1"));
    assert_eq!(h.store.subscription_key("T1").await.unwrap(), None);
    assert_eq!(h.control_plane.len(), 1);
}

#[tokio::test]
async fn delete_unknown_customer_is_ok() {
    let h = dev_harness();
    let response = h.app.oneshot(delete("/customers/nobody")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await["control_plane"],
        json!({"outcome": "no_subscription"})
    );
    assert!(h.control_plane.calls().is_empty());
}

// -- Dashboard ----------------------------------------------------------------

#[tokio::test]
async fn dashboard_counts_and_activity() {
    let h = dev_harness();
    create_acme(&h.app, "T1").await;
    let today = Utc::now().date_naive();
    h.store.record_usage("T1", today, Some(120), 200);
    h.store.record_event(MonitoringEvent {
        customer_id: "T1".into(),
        notebook_name: "ingest".into(),
        status: "failed".into(),
        event_type: "execution_failed".into(),
        event_timestamp: Utc::now() - ChronoDuration::hours(1),
        error_message: Some("boom".into()),
    });
    h.store.record_event(MonitoringEvent {
        customer_id: "T1".into(),
        notebook_name: "ingest".into(),
        status: "completed".into(),
        event_type: "execution_completed".into(),
        event_timestamp: Utc::now(),
        error_message: None,
    });

    let stats = body_json(h.app.clone().oneshot(get("/dashboard/stats")).await.unwrap()).await;
    assert_eq!(
        stats,
        json!({
            "totalCustomers": 1,
            "activeSubscriptions": 1,
            "totalApiCalls": 1,
            "recentFailures": 1
        })
    );

    let activity = body_json(h.app.oneshot(get("/dashboard/activity")).await.unwrap()).await;
    let activity = activity.as_array().unwrap();
    assert_eq!(activity.len(), 2);
    assert_eq!(activity[0]["type"], "success");
    assert_eq!(activity[0]["customer_name"], "Acme");
    assert_eq!(activity[1]["type"], "failed");
}

// -- Analytics ----------------------------------------------------------------

#[tokio::test]
async fn analytics_window_excludes_older_usage() {
    let h = dev_harness();
    create_acme(&h.app, "T1").await;
    let today = Utc::now().date_naive();
    h.store.record_usage("T1", today - ChronoDuration::days(1), Some(100), 200);
    h.store.record_usage("T1", today - ChronoDuration::days(8), Some(300), 500);

    let response = h.app.clone().oneshot(get("/analytics?days=7")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    let usage = report["usageByCustomer"].as_array().unwrap();
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0]["customer_name"], "Acme");
    assert_eq!(usage[0]["total_requests"], 1);
    assert_eq!(usage[0]["avg_response_time_ms"], 100);
    assert_eq!(usage[0]["error_rate"], 0.0);
    assert!(report["slaMetrics"].is_array());
    assert!(report["topFailures"].is_array());

    let report = body_json(h.app.oneshot(get("/analytics")).await.unwrap()).await;
    assert_eq!(report["usageByCustomer"][0]["total_requests"], 2);
}

fn failed_run(tenant: &str, notebook: &str, age: ChronoDuration, error: &str) -> MonitoringEvent {
    MonitoringEvent {
        customer_id: tenant.into(),
        notebook_name: notebook.into(),
        status: "failed".into(),
        event_type: "execution_failed".into(),
        event_timestamp: Utc::now() - age,
        error_message: Some(error.into()),
    }
}

#[tokio::test]
async fn analytics_window_excludes_older_failures() {
    let h = dev_harness();
    create_acme(&h.app, "T1").await;
    h.store
        .record_event(failed_run("T1", "nb1", ChronoDuration::days(1), "boom"));
    h.store
        .record_event(failed_run("T1", "nb1", ChronoDuration::days(2), "boom"));
    h.store.record_event(MonitoringEvent {
        customer_id: "T1".into(),
        notebook_name: "nb1".into(),
        status: "completed".into(),
        event_type: "execution_completed".into(),
        event_timestamp: Utc::now() - ChronoDuration::days(1),
        error_message: None,
    });
    h.store
        .record_event(failed_run("T1", "nb2", ChronoDuration::days(8), "stale"));

    let report = body_json(h.app.clone().oneshot(get("/analytics?days=7")).await.unwrap()).await;

    let sla = report["slaMetrics"].as_array().unwrap();
    assert_eq!(sla.len(), 1);
    assert_eq!(sla[0]["total_runs"], 3);
    assert_eq!(sla[0]["failures"], 2);
    assert_eq!(sla[0]["success_rate"], 33.33);

    let top = report["topFailures"].as_array().unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0]["notebook_name"], "nb1");
    assert_eq!(top[0]["count"], 2);
    assert!(top.iter().all(|g| g["notebook_name"] != "nb2"));

    let report = body_json(h.app.oneshot(get("/analytics?days=30")).await.unwrap()).await;
    assert_eq!(report["slaMetrics"][0]["total_runs"], 4);
    assert!(report["topFailures"]
        .as_array()
        .unwrap()
        .iter()
        .any(|g| g["notebook_name"] == "nb2"));
}

#[tokio::test]
async fn analytics_rejects_bad_days() {
    let h = dev_harness();
    for uri in ["/analytics?days=0", "/analytics?days=-3", "/analytics?days=abc", "/analytics?days=4000"] {
        let response = h.app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        assert!(body_json(response).await["error"].is_string());
    }
}

// -- Router shape -------------------------------------------------------------

#[tokio::test]
async fn route_prefix_nests_everything() {
    let h = harness_with(
        AuthMode::Development,
        AppConfig {
            route_prefix: "/api".into(),
            ..AppConfig::default()
        },
    );

    let response = h.app.clone().oneshot(get("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response = h.app.clone().oneshot(get("/api/customers")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response = h.app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn openapi_document_served() {
    let h = dev_harness();
    let response = h.app.oneshot(get("/openapi.json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let doc = body_json(response).await;
    assert!(doc["paths"]["/customers/{customer_id}/regenerate-key"].is_object());
}

#[tokio::test]
async fn cors_preflight_bypasses_auth() {
    let h = harness_with(
        jwt_mode("http://127.0.0.1:9/keys".into()),
        AppConfig {
            cors_origins: vec!["http://localhost:5173".into()],
            ..AppConfig::default()
        },
    );

    let response = h
        .app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/customers")
                .header(header::ORIGIN, "http://localhost:5173")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:5173"
    );
}

// -- JWT verification against a JWKS ------------------------------------------

async fn jwks_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/discovery/v2.0/keys"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "keys": [{
                "kty": "RSA",
                "use": "sig",
                "alg": "RS256",
                "kid": KID,
                "n": SIGNING_KEY_N,
                "e": "AQAB"
            }]
        })))
        .mount(&server)
        .await;
    server
}

fn mint(kid: &str, claims: Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(SIGNING_KEY_PEM.as_bytes()).unwrap();
    encode(&header, &claims, &key).unwrap()
}

fn claims(aud: &str, exp_offset_secs: i64) -> Value {
    json!({
        "aud": aud,
        "exp": Utc::now().timestamp() + exp_offset_secs,
        "sub": "operator-1",
        "preferred_username": "ops@numberskills.example",
        "iss": "https://sts.windows.net/any-tenant/"
    })
}

async fn status_with_token(app: &axum::Router, token: &str) -> StatusCode {
    app.clone()
        .oneshot(
            Request::builder()
                .uri("/dashboard/stats")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn valid_token_is_accepted_regardless_of_issuer() {
    let server = jwks_server().await;
    let h = harness_with(
        jwt_mode(format!("{}/discovery/v2.0/keys", server.uri())),
        AppConfig::default(),
    );

    let token = mint(KID, claims(AUDIENCE, 3600));
    assert_eq!(status_with_token(&h.app, &token).await, StatusCode::OK);
}

#[tokio::test]
async fn jwks_is_cached_between_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/keys"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "keys": [{"kty": "RSA", "kid": KID, "n": SIGNING_KEY_N, "e": "AQAB"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let h = harness_with(jwt_mode(format!("{}/keys", server.uri())), AppConfig::default());

    let token = mint(KID, claims(AUDIENCE, 3600));
    assert_eq!(status_with_token(&h.app, &token).await, StatusCode::OK);
    assert_eq!(status_with_token(&h.app, &token).await, StatusCode::OK);
}

#[tokio::test]
async fn wrong_audience_is_rejected() {
    let server = jwks_server().await;
    let h = harness_with(
        jwt_mode(format!("{}/discovery/v2.0/keys", server.uri())),
        AppConfig::default(),
    );

    let token = mint(KID, claims("api://someone-else", 3600));
    assert_eq!(status_with_token(&h.app, &token).await, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let server = jwks_server().await;
    let h = harness_with(
        jwt_mode(format!("{}/discovery/v2.0/keys", server.uri())),
        AppConfig::default(),
    );

    let token = mint(KID, claims(AUDIENCE, -3600));
    assert_eq!(status_with_token(&h.app, &token).await, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_expired_seconds_ago_is_rejected() {
    let server = jwks_server().await;
    let h = harness_with(
        jwt_mode(format!("{}/discovery/v2.0/keys", server.uri())),
        AppConfig::default(),
    );

    let token = mint(KID, claims(AUDIENCE, -5));
    assert_eq!(status_with_token(&h.app, &token).await, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_key_id_is_rejected() {
    let server = jwks_server().await;
    let h = harness_with(
        jwt_mode(format!("{}/discovery/v2.0/keys", server.uri())),
        AppConfig::default(),
    );

    let token = mint("rotated-away", claims(AUDIENCE, 3600));
    assert_eq!(status_with_token(&h.app, &token).await, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unreachable_jwks_fails_closed() {
    let h = harness_with(jwt_mode("http://127.0.0.1:9/keys".into()), AppConfig::default());
    let token = mint(KID, claims(AUDIENCE, 3600));
    assert_eq!(status_with_token(&h.app, &token).await, StatusCode::UNAUTHORIZED);
}
