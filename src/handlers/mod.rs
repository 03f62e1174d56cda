use axum::{
    Json,
    body::Bytes,
    extract::{
        Path,
        rejection::{BytesRejection, PathRejection},
    },
    http::StatusCode,
};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::HealthStatus,
    pagination::PaginationParams,
    validation::{QueryParams, ValidationErrors, combine, invalid_id, parse_id},
};

pub mod account;
pub mod companies;
pub mod contacts;

/// Resolves the `{id}` segment. A segment axum cannot decode (e.g. invalid
/// percent-encoded UTF-8) is reported like any other malformed id.
pub(crate) fn path_id(path: Result<Path<String>, PathRejection>) -> Result<Uuid, ApiError> {
    let Path(raw) = path.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected path parameter");
        ApiError::from(invalid_id())
    })?;
    Ok(parse_id(&raw)?)
}

/// Decodes a request body as untyped JSON. Anything that is not JSON is a
/// 400; the shape is checked afterwards by the entity schema (422). A body
/// over the router's size limit is a 413.
pub(crate) fn parse_json_body(body: Result<Bytes, BytesRejection>) -> Result<Value, ApiError> {
    let body = body.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected request body");
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::payload_too_large("Request body is too large")
        } else {
            ApiError::bad_request("Request body could not be read")
        }
    })?;

    serde_json::from_slice(&body).map_err(|err| {
        tracing::debug!(error = %err, "Rejected non-JSON request body");
        ApiError::bad_request("Request body must be valid JSON")
    })
}

/// Reads `page`/`pageSize` together with an endpoint's own filter so that a
/// single 422 lists the problems of both.
pub(crate) fn parse_list_query<F>(
    raw: Option<&str>,
    filter: impl FnOnce(&QueryParams) -> Result<F, ValidationErrors>,
) -> Result<(PaginationParams, F), ApiError> {
    let query = QueryParams::parse(raw);
    Ok(combine(PaginationParams::from_query(&query), filter(&query))?)
}

/// health
///
/// [Public Route] Liveness check.
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "system",
    responses((status = 200, description = "Service is up", body = HealthStatus))
)]
pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_string(),
    })
}

/// route_not_found
///
/// Router fallback, so unmatched paths answer with the error envelope too.
pub async fn route_not_found() -> ApiError {
    ApiError::not_found("Route not found")
}
