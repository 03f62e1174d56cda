use crate::{AppState, handlers::account};
use axum::{Router, routing::get};

/// Authenticated Router Module
///
/// Routes for dashboard users identified by a session token. The
/// `AuthenticatedUser` extractor only establishes identity; each handler then
/// calls `require_role` with its own minimum role.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /api/session
        .route("/api/session", get(account::get_session))
        // GET /api/dashboard/summary
        // Active company and contact counts. VIEWER and up.
        .route("/api/dashboard/summary", get(account::get_dashboard_summary))
        // GET /api/audit-logs?entity=...&entityId=...
        // The audit trail, newest first. MANAGER and up.
        .route("/api/audit-logs", get(account::list_audit_logs))
}
