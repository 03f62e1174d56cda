use std::sync::Arc;

use axum::{Json, Router, extract::FromRef, http::HeaderName, routing::get};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
};

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod pagination;
pub mod repository;
pub mod validation;

// Routing is split by authentication scheme (public, API key, session).
pub mod routes;
use auth::SessionRegistry;
use routes::{authenticated, integration, public};

// --- Public Re-exports ---

pub use audit::AuditLogger;
pub use config::AppConfig;
pub use error::ApiError;
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI description aggregated from the `#[utoipa::path]` annotations,
/// served as JSON at `/api/openapi`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::companies::list_companies, handlers::companies::create_company,
        handlers::companies::get_company, handlers::companies::update_company,
        handlers::companies::delete_company,
        handlers::contacts::list_contacts, handlers::contacts::create_contact,
        handlers::contacts::get_contact, handlers::contacts::update_contact,
        handlers::contacts::delete_contact,
        handlers::account::get_session, handlers::account::get_dashboard_summary,
        handlers::account::list_audit_logs,
    ),
    components(
        schemas(
            models::CompanyCreateInput, models::CompanyUpdateInput, models::CompanyResponse,
            models::ContactCreateInput, models::ContactUpdateInput, models::ContactResponse,
            models::AuditLogResponse, models::AuditAction, models::DashboardSummary,
            models::HealthStatus, pagination::PaginationMeta, error::ErrorBody,
            error::ErrorDetail, auth::SessionUser, auth::Role,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "companies", description = "Company records"),
        (name = "contacts", description = "Contact records"),
        (name = "account", description = "Session-scoped dashboard endpoints"),
        (name = "system", description = "Operational endpoints"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("x-api-key"))),
            );
            components.add_security_scheme(
                "session_token",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("x-session-token"))),
            );
        }
    }
}

/// AppState
///
/// The single shared container for everything a request may need. Cheap to
/// clone; handlers take the whole state or a projection via `FromRef`.
#[derive(Clone)]
pub struct AppState {
    /// Persistence layer (Postgres, or in-memory without a database).
    pub repo: RepositoryState,
    /// Best-effort audit trail writer over the same repository.
    pub audit: AuditLogger,
    /// Session token registry built from `CRM_AUTH_USERS`.
    pub sessions: Arc<SessionRegistry>,
    /// The loaded, immutable configuration.
    pub config: AppConfig,
}

impl AppState {
    /// Wires the audit logger and session registry from `repo` and `config`.
    pub fn new(repo: RepositoryState, config: AppConfig) -> Self {
        Self {
            audit: AuditLogger::new(repo.clone()),
            sessions: Arc::new(SessionRegistry::new(config.session_users.clone())),
            repo,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AuditLogger {
    fn from_ref(app_state: &AppState) -> AuditLogger {
        app_state.audit.clone()
    }
}

impl FromRef<AppState> for Arc<SessionRegistry> {
    fn from_ref(app_state: &AppState) -> Arc<SessionRegistry> {
        app_state.sessions.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

async fn openapi_document() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// create_router
///
/// Assembles all route groups and the observability layers. Each handler
/// authenticates through its first extractor (`ApiClient` or
/// `AuthenticatedUser`), so a rejected caller never reaches validation or
/// the repository.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .route("/api/openapi", get(openapi_document))
        .merge(public::public_routes())
        .merge(integration::integration_routes())
        .merge(authenticated::authenticated_routes())
        .fallback(handlers::route_not_found)
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one HTTP request, correlated by the generated `x-request-id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
