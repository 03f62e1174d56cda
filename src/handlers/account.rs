use axum::{
    Json,
    extract::{RawQuery, State},
};

use super::parse_list_query;
use crate::{
    AppState,
    auth::{AuthenticatedUser, Role, SessionUser, require_role},
    error::{ApiError, ErrorBody},
    models::{
        AuditLogQuery, AuditLogResponse, CompanySearch, ContactFilterQuery, DashboardSummary,
        DataEnvelope, ListEnvelope,
    },
    pagination::PaginationMeta,
};

/// get_session
///
/// [Session Route] The identity behind the presented session token.
#[utoipa::path(
    get,
    path = "/api/session",
    tag = "account",
    responses(
        (status = 200, description = "Current user", body = DataEnvelope<SessionUser>),
        (status = 401, description = "Missing or unknown session token", body = ErrorBody),
    ),
    security(("session_token" = []))
)]
pub async fn get_session(
    AuthenticatedUser { user, .. }: AuthenticatedUser,
) -> Result<Json<DataEnvelope<SessionUser>>, ApiError> {
    require_role(&user, &[Role::Viewer])?;
    Ok(Json(DataEnvelope::new(user)))
}

/// get_dashboard_summary
///
/// [Session Route] Counts of active companies and contacts. VIEWER and up.
#[utoipa::path(
    get,
    path = "/api/dashboard/summary",
    tag = "account",
    responses(
        (status = 200, description = "Record counts", body = DataEnvelope<DashboardSummary>),
        (status = 401, description = "Missing or unknown session token", body = ErrorBody),
        (status = 403, description = "Insufficient role", body = ErrorBody),
    ),
    security(("session_token" = []))
)]
pub async fn get_dashboard_summary(
    AuthenticatedUser { user, .. }: AuthenticatedUser,
    State(state): State<AppState>,
) -> Result<Json<DataEnvelope<DashboardSummary>>, ApiError> {
    require_role(&user, &[Role::Viewer])?;

    let all_companies = CompanySearch::default();
    let all_contacts = ContactFilterQuery::default();
    let (companies, contacts) = tokio::try_join!(
        state.repo.count_companies(&all_companies),
        state.repo.count_contacts(&all_contacts),
    )?;

    Ok(Json(DataEnvelope::new(DashboardSummary {
        companies,
        contacts,
    })))
}

/// list_audit_logs
///
/// [Session Route] Read access to the audit trail, newest first. MANAGER
/// and up.
#[utoipa::path(
    get,
    path = "/api/audit-logs",
    tag = "account",
    params(
        ("entity" = Option<String>, Query, description = "company or contact"),
        ("entityId" = Option<String>, Query, description = "Exact entity id"),
        ("page" = Option<u32>, Query, description = "1-based page, default 1"),
        ("pageSize" = Option<u32>, Query, description = "1-100, default 20"),
    ),
    responses(
        (status = 200, description = "Audit entries", body = ListEnvelope<AuditLogResponse>),
        (status = 401, description = "Missing or unknown session token", body = ErrorBody),
        (status = 403, description = "Insufficient role", body = ErrorBody),
        (status = 422, description = "Invalid query", body = ErrorBody),
    ),
    security(("session_token" = []))
)]
pub async fn list_audit_logs(
    AuthenticatedUser { user, .. }: AuthenticatedUser,
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Json<ListEnvelope<AuditLogResponse>>, ApiError> {
    require_role(&user, &[Role::Manager])?;
    let (pagination, filter) = parse_list_query(query.as_deref(), AuditLogQuery::from_query)?;

    let (entries, total) = tokio::try_join!(
        state.repo.list_audit_logs(&filter, pagination.window()),
        state.repo.count_audit_logs(&filter),
    )?;

    Ok(Json(ListEnvelope {
        data: entries.iter().map(AuditLogResponse::from).collect(),
        meta: PaginationMeta::new(total, &pagination),
    }))
}
