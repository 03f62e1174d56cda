use axum::{
    Json,
    body::Bytes,
    extract::{
        Path, RawQuery, State,
        rejection::{BytesRejection, PathRejection},
    },
    http::StatusCode,
};
use uuid::Uuid;

use super::{parse_json_body, parse_list_query, path_id};
use crate::{
    AppState,
    audit::{AuditRecord, CONTACT_ENTITY},
    auth::ApiClient,
    error::{ApiError, ErrorBody},
    models::{
        AuditAction, ContactCreateInput, ContactFilterQuery, ContactResponse, ContactUpdateInput,
        DataEnvelope, ListEnvelope,
    },
    pagination::PaginationMeta,
    repository::RepositoryState,
};

const NOT_FOUND: &str = "Contact not found";

/// A contact may only point at a company that exists and is not deleted.
async fn ensure_company_exists(repo: &RepositoryState, company_id: Uuid) -> Result<(), ApiError> {
    repo.find_active_company(company_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| ApiError::not_found("Company not found"))
}

/// list_contacts
///
/// [API Key Route] Paginated list of active contacts, newest first.
#[utoipa::path(
    get,
    path = "/api/contacts",
    tag = "contacts",
    params(
        ("companyId" = Option<String>, Query, description = "Exact company UUID"),
        ("segment" = Option<String>, Query, description = "Case-insensitive equality"),
        ("tag" = Option<Vec<String>>, Query, description = "Repeatable; matches any"),
        ("email" = Option<String>, Query, description = "Case-insensitive substring"),
        ("phone" = Option<String>, Query, description = "Case-insensitive substring"),
        ("page" = Option<u32>, Query, description = "1-based page, default 1"),
        ("pageSize" = Option<u32>, Query, description = "1-100, default 20"),
    ),
    responses(
        (status = 200, description = "Contacts", body = ListEnvelope<ContactResponse>),
        (status = 401, description = "Missing or invalid API key", body = ErrorBody),
        (status = 422, description = "Invalid query", body = ErrorBody),
    ),
    security(("api_key" = []))
)]
pub async fn list_contacts(
    _client: ApiClient,
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Json<ListEnvelope<ContactResponse>>, ApiError> {
    let (pagination, filter) =
        parse_list_query(query.as_deref(), ContactFilterQuery::from_query)?;

    let (contacts, total) = tokio::try_join!(
        state.repo.list_contacts(&filter, pagination.window()),
        state.repo.count_contacts(&filter),
    )?;

    Ok(Json(ListEnvelope {
        data: contacts.iter().map(ContactResponse::from).collect(),
        meta: PaginationMeta::new(total, &pagination),
    }))
}

/// create_contact
///
/// [API Key Route] Creates a contact under an active company.
#[utoipa::path(
    post,
    path = "/api/contacts",
    tag = "contacts",
    request_body = ContactCreateInput,
    responses(
        (status = 201, description = "Contact created", body = DataEnvelope<ContactResponse>),
        (status = 400, description = "Body is not JSON", body = ErrorBody),
        (status = 401, description = "Missing or invalid API key", body = ErrorBody),
        (status = 404, description = "Company not found", body = ErrorBody),
        (status = 422, description = "Validation failed", body = ErrorBody),
    ),
    security(("api_key" = []))
)]
pub async fn create_contact(
    client: ApiClient,
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<DataEnvelope<ContactResponse>>), ApiError> {
    let payload = parse_json_body(body)?;
    let input = ContactCreateInput::parse(&payload)?;
    ensure_company_exists(&state.repo, input.company_id).await?;

    let contact = state.repo.create_contact(input).await?;
    let response = ContactResponse::from(&contact);

    state
        .audit
        .write(AuditRecord::<ContactResponse, _> {
            user: &client.user,
            action: AuditAction::Create,
            entity: CONTACT_ENTITY,
            entity_id: contact.id.to_string(),
            before: None,
            after: Some(&response),
        })
        .await;

    tracing::info!(contact_id = %contact.id, company_id = %contact.company_id, "Contact created");
    Ok((StatusCode::CREATED, Json(DataEnvelope::new(response))))
}

/// get_contact
#[utoipa::path(
    get,
    path = "/api/contacts/{id}",
    tag = "contacts",
    params(("id" = String, Path, description = "Contact UUID")),
    responses(
        (status = 200, description = "Contact", body = DataEnvelope<ContactResponse>),
        (status = 401, description = "Missing or invalid API key", body = ErrorBody),
        (status = 404, description = "Not found or deleted", body = ErrorBody),
        (status = 422, description = "Malformed id", body = ErrorBody),
    ),
    security(("api_key" = []))
)]
pub async fn get_contact(
    _client: ApiClient,
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<DataEnvelope<ContactResponse>>, ApiError> {
    let id = path_id(id)?;
    let contact = state
        .repo
        .find_active_contact(id)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    Ok(Json(DataEnvelope::new(ContactResponse::from(&contact))))
}

/// update_contact
///
/// [API Key Route] Partial update. Reassigning `companyId` requires the new
/// company to be active.
#[utoipa::path(
    patch,
    path = "/api/contacts/{id}",
    tag = "contacts",
    params(("id" = String, Path, description = "Contact UUID")),
    request_body = ContactUpdateInput,
    responses(
        (status = 200, description = "Updated contact", body = DataEnvelope<ContactResponse>),
        (status = 400, description = "Body is not JSON", body = ErrorBody),
        (status = 401, description = "Missing or invalid API key", body = ErrorBody),
        (status = 404, description = "Contact or company not found", body = ErrorBody),
        (status = 422, description = "Validation failed", body = ErrorBody),
    ),
    security(("api_key" = []))
)]
pub async fn update_contact(
    client: ApiClient,
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<DataEnvelope<ContactResponse>>, ApiError> {
    let id = path_id(id)?;
    let before = state
        .repo
        .find_active_contact(id)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    let payload = parse_json_body(body)?;
    let changes = ContactUpdateInput::parse(&payload)?.into_changes();
    if let Some(company_id) = changes.company_id {
        ensure_company_exists(&state.repo, company_id).await?;
    }

    let contact = state
        .repo
        .update_contact(id, changes)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
    let response = ContactResponse::from(&contact);

    state
        .audit
        .write(AuditRecord {
            user: &client.user,
            action: AuditAction::Update,
            entity: CONTACT_ENTITY,
            entity_id: contact.id.to_string(),
            before: Some(&ContactResponse::from(&before)),
            after: Some(&response),
        })
        .await;

    Ok(Json(DataEnvelope::new(response)))
}

/// delete_contact
///
/// [API Key Route] Soft delete.
#[utoipa::path(
    delete,
    path = "/api/contacts/{id}",
    tag = "contacts",
    params(("id" = String, Path, description = "Contact UUID")),
    responses(
        (status = 200, description = "Deleted contact", body = DataEnvelope<ContactResponse>),
        (status = 401, description = "Missing or invalid API key", body = ErrorBody),
        (status = 404, description = "Not found or already deleted", body = ErrorBody),
        (status = 422, description = "Malformed id", body = ErrorBody),
    ),
    security(("api_key" = []))
)]
pub async fn delete_contact(
    client: ApiClient,
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<DataEnvelope<ContactResponse>>, ApiError> {
    let id = path_id(id)?;
    let before = state
        .repo
        .find_active_contact(id)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    let contact = state
        .repo
        .soft_delete_contact(id)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
    let response = ContactResponse::from(&contact);

    state
        .audit
        .write(AuditRecord {
            user: &client.user,
            action: AuditAction::Delete,
            entity: CONTACT_ENTITY,
            entity_id: contact.id.to_string(),
            before: Some(&ContactResponse::from(&before)),
            after: Some(&response),
        })
        .await;

    tracing::info!(contact_id = %contact.id, "Contact soft-deleted");
    Ok(Json(DataEnvelope::new(response)))
}
