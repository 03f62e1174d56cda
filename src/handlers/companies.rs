use axum::{
    Json,
    body::Bytes,
    extract::{
        Path, RawQuery, State,
        rejection::{BytesRejection, PathRejection},
    },
    http::StatusCode,
};

use super::{parse_json_body, parse_list_query, path_id};
use crate::{
    AppState,
    audit::{AuditRecord, COMPANY_ENTITY},
    auth::ApiClient,
    error::{ApiError, ErrorBody},
    models::{
        AuditAction, CompanyCreateInput, CompanyResponse, CompanySearch, CompanyUpdateInput,
        DataEnvelope, ListEnvelope,
    },
    pagination::PaginationMeta,
};

const NOT_FOUND: &str = "Company not found";

/// list_companies
///
/// [API Key Route] Paginated list of active companies, newest first.
/// `search` matches name, website, industry or segment (case-insensitive).
#[utoipa::path(
    get,
    path = "/api/companies",
    tag = "companies",
    params(
        ("search" = Option<String>, Query, description = "Substring filter, 1-255 chars"),
        ("page" = Option<u32>, Query, description = "1-based page, default 1"),
        ("pageSize" = Option<u32>, Query, description = "1-100, default 20"),
    ),
    responses(
        (status = 200, description = "Companies", body = ListEnvelope<CompanyResponse>),
        (status = 401, description = "Missing or invalid API key", body = ErrorBody),
        (status = 422, description = "Invalid query", body = ErrorBody),
    ),
    security(("api_key" = []))
)]
pub async fn list_companies(
    _client: ApiClient,
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Json<ListEnvelope<CompanyResponse>>, ApiError> {
    let (pagination, filter) = parse_list_query(query.as_deref(), CompanySearch::from_query)?;

    // List and count are independent reads; under concurrent writes they may
    // disagree slightly.
    let (companies, total) = tokio::try_join!(
        state.repo.list_companies(&filter, pagination.window()),
        state.repo.count_companies(&filter),
    )?;

    Ok(Json(ListEnvelope {
        data: companies.iter().map(CompanyResponse::from).collect(),
        meta: PaginationMeta::new(total, &pagination),
    }))
}

/// create_company
///
/// [API Key Route] Creates a company and records a CREATE audit entry.
#[utoipa::path(
    post,
    path = "/api/companies",
    tag = "companies",
    request_body = CompanyCreateInput,
    responses(
        (status = 201, description = "Company created", body = DataEnvelope<CompanyResponse>),
        (status = 400, description = "Body is not JSON", body = ErrorBody),
        (status = 401, description = "Missing or invalid API key", body = ErrorBody),
        (status = 422, description = "Validation failed", body = ErrorBody),
    ),
    security(("api_key" = []))
)]
pub async fn create_company(
    client: ApiClient,
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<DataEnvelope<CompanyResponse>>), ApiError> {
    let payload = parse_json_body(body)?;
    let input = CompanyCreateInput::parse(&payload)?;

    let company = state.repo.create_company(input).await?;
    let response = CompanyResponse::from(&company);

    state
        .audit
        .write(AuditRecord::<CompanyResponse, _> {
            user: &client.user,
            action: AuditAction::Create,
            entity: COMPANY_ENTITY,
            entity_id: company.id.to_string(),
            before: None,
            after: Some(&response),
        })
        .await;

    tracing::info!(company_id = %company.id, "Company created");
    Ok((StatusCode::CREATED, Json(DataEnvelope::new(response))))
}

/// get_company
///
/// [API Key Route] A single active company.
#[utoipa::path(
    get,
    path = "/api/companies/{id}",
    tag = "companies",
    params(("id" = String, Path, description = "Company UUID")),
    responses(
        (status = 200, description = "Company", body = DataEnvelope<CompanyResponse>),
        (status = 401, description = "Missing or invalid API key", body = ErrorBody),
        (status = 404, description = "Not found or deleted", body = ErrorBody),
        (status = 422, description = "Malformed id", body = ErrorBody),
    ),
    security(("api_key" = []))
)]
pub async fn get_company(
    _client: ApiClient,
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<DataEnvelope<CompanyResponse>>, ApiError> {
    let id = path_id(id)?;
    let company = state
        .repo
        .find_active_company(id)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    Ok(Json(DataEnvelope::new(CompanyResponse::from(&company))))
}

/// update_company
///
/// [API Key Route] Partial update. Only fields present in the body change;
/// `null` clears an optional field.
#[utoipa::path(
    patch,
    path = "/api/companies/{id}",
    tag = "companies",
    params(("id" = String, Path, description = "Company UUID")),
    request_body = CompanyUpdateInput,
    responses(
        (status = 200, description = "Updated company", body = DataEnvelope<CompanyResponse>),
        (status = 400, description = "Body is not JSON", body = ErrorBody),
        (status = 401, description = "Missing or invalid API key", body = ErrorBody),
        (status = 404, description = "Not found or deleted", body = ErrorBody),
        (status = 422, description = "Validation failed", body = ErrorBody),
    ),
    security(("api_key" = []))
)]
pub async fn update_company(
    client: ApiClient,
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<DataEnvelope<CompanyResponse>>, ApiError> {
    let id = path_id(id)?;
    let before = state
        .repo
        .find_active_company(id)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    let payload = parse_json_body(body)?;
    let changes = CompanyUpdateInput::parse(&payload)?.into_changes();

    // `None` here means the row was deleted after the lookup above.
    let company = state
        .repo
        .update_company(id, changes)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
    let response = CompanyResponse::from(&company);

    state
        .audit
        .write(AuditRecord {
            user: &client.user,
            action: AuditAction::Update,
            entity: COMPANY_ENTITY,
            entity_id: company.id.to_string(),
            before: Some(&CompanyResponse::from(&before)),
            after: Some(&response),
        })
        .await;

    Ok(Json(DataEnvelope::new(response)))
}

/// delete_company
///
/// [API Key Route] Soft delete: sets `deletedAt` and returns the final state.
/// The row is kept but disappears from every read path.
#[utoipa::path(
    delete,
    path = "/api/companies/{id}",
    tag = "companies",
    params(("id" = String, Path, description = "Company UUID")),
    responses(
        (status = 200, description = "Deleted company", body = DataEnvelope<CompanyResponse>),
        (status = 401, description = "Missing or invalid API key", body = ErrorBody),
        (status = 404, description = "Not found or already deleted", body = ErrorBody),
        (status = 422, description = "Malformed id", body = ErrorBody),
    ),
    security(("api_key" = []))
)]
pub async fn delete_company(
    client: ApiClient,
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<DataEnvelope<CompanyResponse>>, ApiError> {
    let id = path_id(id)?;
    let before = state
        .repo
        .find_active_company(id)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    let company = state
        .repo
        .soft_delete_company(id)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
    let response = CompanyResponse::from(&company);

    state
        .audit
        .write(AuditRecord {
            user: &client.user,
            action: AuditAction::Delete,
            entity: COMPANY_ENTITY,
            entity_id: company.id.to_string(),
            before: Some(&CompanyResponse::from(&before)),
            after: Some(&response),
        })
        .await;

    tracing::info!(company_id = %company.id, "Company soft-deleted");
    Ok(Json(DataEnvelope::new(response)))
}
