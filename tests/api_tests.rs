use crm_api::{AppConfig, AppState, InMemoryRepository, create_router};
use reqwest::StatusCode;
use serde_json::{Value, json};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;

const API_KEY: &str = "test-api-key";

/// Serves the full router on an ephemeral port and returns its base URL.
async fn spawn_app() -> String {
    let state = AppState::new(Arc::new(InMemoryRepository::new()), AppConfig::default());
    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn test_health_check_works() {
    let base_url = spawn_app().await;

    let response = reqwest::get(format!("{}/api/health", base_url))
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_company_and_contact_lifecycle() {
    let base_url = spawn_app().await;
    let client = reqwest::Client::new();

    // Create
    let response = client
        .post(format!("{}/api/companies", base_url))
        .header("x-api-key", API_KEY)
        .json(&json!({"name": "Acme", "industry": "Manufacturing"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let company: Value = response.json().await.unwrap();
    let company_id = company["data"]["id"].as_str().unwrap().to_string();

    // Attach a contact
    let response = client
        .post(format!("{}/api/contacts", base_url))
        .header("x-api-key", API_KEY)
        .json(&json!({"companyId": company_id, "firstName": "Ada", "email": "ada@acme.test"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // Update
    let response = client
        .patch(format!("{}/api/companies/{}", base_url, company_id))
        .bearer_auth(API_KEY)
        .json(&json!({"industry": null}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["data"]["industry"], Value::Null);

    // Delete
    let response = client
        .delete(format!("{}/api/companies/{}", base_url, company_id))
        .header("x-api-key", API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .get(format!("{}/api/companies/{}", base_url, company_id))
        .header("x-api-key", API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // The audit trail saw every mutation.
    let response = client
        .get(format!("{}/api/audit-logs?entity=company", base_url))
        .header("x-session-token", "manager-token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let audit: Value = response.json().await.unwrap();
    let actions: Vec<&str> = audit["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["action"].as_str().unwrap())
        .collect();
    assert_eq!(actions, ["DELETE", "UPDATE", "CREATE"]);
    assert_eq!(audit["meta"]["totalItems"], 3);
}

#[tokio::test]
async fn test_malformed_json_is_rejected() {
    let base_url = spawn_app().await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/companies", base_url))
        .header("x-api-key", API_KEY)
        .header("content-type", "application/json")
        .body("{\"name\": ")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}
