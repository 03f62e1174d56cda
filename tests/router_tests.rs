use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use crm_api::{AppConfig, AppState, InMemoryRepository, create_router};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

// --- TEST UTILITIES ---

fn app_with(config: AppConfig) -> (Arc<InMemoryRepository>, Router) {
    let repo = Arc::new(InMemoryRepository::new());
    let router = create_router(AppState::new(repo.clone(), config));
    (repo, router)
}

fn app() -> (Arc<InMemoryRepository>, Router) {
    app_with(AppConfig::default())
}

fn request(method: Method, uri: &str, headers: &[(&str, &str)], body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// --- PUBLIC ROUTES ---

#[tokio::test]
async fn test_health_needs_no_credentials() {
    let (_repo, app) = app();
    let response = app
        .oneshot(request(Method::GET, "/api/health", &[], None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(json_body(response).await, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_openapi_document_lists_routes() {
    let (_repo, app) = app();
    let response = app
        .oneshot(request(Method::GET, "/api/openapi", &[], None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let doc = json_body(response).await;
    assert!(doc["paths"]["/api/companies"].is_object());
    assert!(doc["paths"]["/api/contacts/{id}"].is_object());
    assert!(doc["components"]["securitySchemes"]["api_key"].is_object());
}

// --- API KEY GUARD ---

#[tokio::test]
async fn test_missing_api_key_never_reaches_repository() {
    let (repo, app) = app();
    let response = app
        .oneshot(request(
            Method::POST,
            "/api/companies",
            &[],
            Some(json!({"name": "Acme"})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "unauthorized");
    assert_eq!(body["error"]["message"], "Missing API key");
    assert_eq!(repo.call_count(), 0);
}

#[tokio::test]
async fn test_wrong_api_key_is_rejected() {
    let (repo, app) = app();
    let response = app
        .oneshot(request(
            Method::GET,
            "/api/contacts",
            &[("x-api-key", "guess")],
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"]["message"], "Invalid API key");
    assert_eq!(repo.call_count(), 0);
}

#[tokio::test]
async fn test_api_key_accepted_from_header_or_bearer() {
    let (_repo, app) = app();

    for auth in [("x-api-key", "test-api-key"), ("authorization", "Bearer test-api-key")] {
        let response = app
            .clone()
            .oneshot(request(Method::GET, "/api/companies", &[auth], None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{} should authenticate", auth.0);
    }
}

#[tokio::test]
async fn test_unconfigured_api_key_is_a_server_error() {
    let (repo, app) = app_with(AppConfig {
        api_keys: None,
        ..AppConfig::default()
    });
    let response = app
        .oneshot(request(
            Method::GET,
            "/api/companies",
            &[("x-api-key", "anything")],
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["error"]["code"], "api_key_not_configured");
    assert_eq!(repo.call_count(), 0);
}

#[tokio::test]
async fn test_session_token_does_not_open_integration_routes() {
    let (_repo, app) = app();
    let response = app
        .oneshot(request(
            Method::GET,
            "/api/companies",
            &[("x-session-token", "admin-token")],
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// --- WIRE FORMAT ---

#[tokio::test]
async fn test_created_company_wire_shape() {
    let (_repo, app) = app();
    let response = app
        .oneshot(request(
            Method::POST,
            "/api/companies",
            &[("x-api-key", "test-api-key")],
            Some(json!({"name": "Acme", "tags": ["b2b"]})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    let data = &body["data"];
    assert_eq!(data["name"], "Acme");
    assert_eq!(data["website"], Value::Null);
    assert_eq!(data["tags"], json!(["b2b"]));
    assert_eq!(data["deletedAt"], Value::Null);
    let created_at = data["createdAt"].as_str().unwrap();
    assert!(created_at.ends_with('Z'));
    assert_eq!(created_at.len(), "2024-01-01T00:00:00.000Z".len());
}

#[tokio::test]
async fn test_validation_error_wire_shape() {
    let (_repo, app) = app();
    let response = app
        .oneshot(request(
            Method::GET,
            "/api/companies?pageSize=abc",
            &[("x-api-key", "test-api-key")],
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "validation_error");
    assert_eq!(body["error"]["details"]["formErrors"], json!([]));
    assert!(body["error"]["details"]["fieldErrors"]["pageSize"].is_array());
}

#[tokio::test]
async fn test_unknown_record_is_not_found() {
    let (_repo, app) = app();
    let response = app
        .oneshot(request(
            Method::GET,
            "/api/contacts/00000000-0000-4000-8000-000000000000",
            &[("x-api-key", "test-api-key")],
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        json_body(response).await,
        json!({"error": {"code": "not_found", "message": "Contact not found"}})
    );
}

#[tokio::test]
async fn test_undecodable_path_id_is_a_validation_error() {
    let (repo, app) = app();
    let response = app
        .oneshot(request(
            Method::GET,
            "/api/companies/%FF",
            &[("x-api-key", "test-api-key")],
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "validation_error");
    assert_eq!(body["error"]["details"]["fieldErrors"]["id"], json!(["Invalid uuid"]));
    assert_eq!(repo.call_count(), 0);
}

#[tokio::test]
async fn test_oversized_body_is_rejected_with_envelope() {
    let (repo, app) = app();
    let oversized = Request::builder()
        .method(Method::POST)
        .uri("/api/companies")
        .header("x-api-key", "test-api-key")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(vec![b'a'; 3 * 1024 * 1024]))
        .unwrap();
    let response = app.oneshot(oversized).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(
        json_body(response).await,
        json!({"error": {"code": "payload_too_large", "message": "Request body is too large"}})
    );
    assert!(repo.companies().is_empty());
}

#[tokio::test]
async fn test_unmatched_route_uses_error_envelope() {
    let (_repo, app) = app();
    let response = app
        .oneshot(request(Method::GET, "/api/nope", &[], None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        json_body(response).await,
        json!({"error": {"code": "not_found", "message": "Route not found"}})
    );
}

// --- SESSION GUARD ---

#[tokio::test]
async fn test_session_requires_a_known_token() {
    let (_repo, app) = app();

    let response = app
        .clone()
        .oneshot(request(Method::GET, "/api/session", &[], None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"]["message"], "Missing session token");

    let response = app
        .oneshot(request(
            Method::GET,
            "/api/session",
            &[("x-session-token", "stolen")],
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"]["message"], "Invalid session token");
}

#[tokio::test]
async fn test_session_resolves_user_from_each_token_source() {
    let (_repo, app) = app();
    let sources: [(&str, &str); 3] = [
        ("x-session-token", "viewer-token"),
        ("authorization", "Bearer viewer-token"),
        ("cookie", "theme=dark; session-token=viewer-token"),
    ];

    for source in sources {
        let response = app
            .clone()
            .oneshot(request(Method::GET, "/api/session", &[source], None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{} should authenticate", source.0);
        assert_eq!(
            json_body(response).await,
            json!({"data": {"id": "viewer", "displayName": "Viewer User", "role": "VIEWER"}})
        );
    }
}

#[tokio::test]
async fn test_audit_logs_are_role_gated() {
    let (_repo, app) = app();

    let response = app
        .clone()
        .oneshot(request(
            Method::GET,
            "/api/audit-logs",
            &[("x-session-token", "sales-token")],
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["error"]["code"], "forbidden");

    let response = app
        .oneshot(request(
            Method::GET,
            "/api/audit-logs",
            &[("x-session-token", "manager-token")],
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_dashboard_reflects_api_writes() {
    let (_repo, app) = app();
    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/api/companies",
            &[("x-api-key", "test-api-key")],
            Some(json!({"name": "Acme"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .oneshot(request(
            Method::GET,
            "/api/dashboard/summary",
            &[("x-session-token", "viewer-token")],
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({"data": {"companies": 1, "contacts": 0}})
    );
}

#[tokio::test]
async fn test_missing_session_configuration_is_a_server_error() {
    let (_repo, app) = app_with(AppConfig {
        session_users: None,
        ..AppConfig::default()
    });
    let response = app
        .oneshot(request(
            Method::GET,
            "/api/session",
            &[("x-session-token", "admin-token")],
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json_body(response).await["error"]["message"],
        "An unexpected error occurred"
    );
}
