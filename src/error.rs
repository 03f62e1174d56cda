use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{repository::RepositoryError, validation::ValidationErrors};

/// ErrorBody
///
/// The fixed wire envelope for every failed request:
/// `{"error": {"code": ..., "message": ..., "details"?: ...}}`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub details: Option<Value>,
}

/// ApiError
///
/// The error taxonomy of the request pipeline. Handlers raise these close to
/// detection and return them through `?`; the conversion to an HTTP response
/// happens exactly once, in the `IntoResponse` implementation below.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{message}")]
    NotFound {
        message: String,
        details: Option<Value>,
    },

    #[error("{message}")]
    Unauthorized {
        message: String,
        details: Option<Value>,
    },

    #[error("{message}")]
    Forbidden {
        message: String,
        details: Option<Value>,
    },

    #[error("{message}")]
    BadRequest {
        message: String,
        details: Option<Value>,
    },

    #[error("{message}")]
    PayloadTooLarge {
        message: String,
        details: Option<Value>,
    },

    /// A known misconfiguration the caller is allowed to learn about
    /// (e.g. the API key guard has no keys to compare against).
    #[error("{message}")]
    Configuration { code: &'static str, message: String },

    #[error("request validation failed")]
    Validation(ValidationErrors),

    /// Anything unexpected. The message is logged, never returned.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound {
            message: message.into(),
            details: None,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized {
            message: message.into(),
            details: None,
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden {
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            message: message.into(),
            details: None,
        }
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        ApiError::PayloadTooLarge {
            message: message.into(),
            details: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal(message.into())
    }

    /// Attaches a details payload to a domain error. Has no effect on
    /// validation, configuration or internal errors.
    pub fn with_details(mut self, value: Value) -> Self {
        match &mut self {
            ApiError::NotFound { details, .. }
            | ApiError::Unauthorized { details, .. }
            | ApiError::Forbidden { details, .. }
            | ApiError::BadRequest { details, .. }
            | ApiError::PayloadTooLarge { details, .. } => *details = Some(value),
            _ => {}
        }
        self
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Configuration { .. } | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound { .. } => "not_found",
            ApiError::Unauthorized { .. } => "unauthorized",
            ApiError::Forbidden { .. } => "forbidden",
            ApiError::BadRequest { .. } => "bad_request",
            ApiError::PayloadTooLarge { .. } => "payload_too_large",
            ApiError::Configuration { code, .. } => code,
            ApiError::Validation(_) => "validation_error",
            ApiError::Internal(_) => "internal_server_error",
        }
    }

    /// normalize
    ///
    /// Maps the error onto its status and wire body. Internal errors are
    /// logged here and replaced by a generic message.
    pub fn normalize(&self) -> (StatusCode, ErrorBody) {
        let (message, details) = match self {
            ApiError::NotFound { message, details }
            | ApiError::Unauthorized { message, details }
            | ApiError::Forbidden { message, details }
            | ApiError::BadRequest { message, details }
            | ApiError::PayloadTooLarge { message, details } => (message.clone(), details.clone()),
            ApiError::Configuration { message, .. } => (message.clone(), None),
            ApiError::Validation(errors) => (
                "Request validation failed".to_string(),
                serde_json::to_value(errors).ok(),
            ),
            ApiError::Internal(cause) => {
                tracing::error!(error = %cause, "Unhandled API error");
                ("An unexpected error occurred".to_string(), None)
            }
        };

        (
            self.status_code(),
            ErrorBody {
                error: ErrorDetail {
                    code: self.code().to_string(),
                    message,
                    details,
                },
            },
        )
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::Validation(errors)
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.normalize();
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_error_keeps_message_and_details() {
        let err = ApiError::not_found("Company not found")
            .with_details(serde_json::json!({ "id": "abc" }));
        let (status, body) = err.normalize();

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error.code, "not_found");
        assert_eq!(body.error.message, "Company not found");
        assert_eq!(body.error.details, Some(serde_json::json!({ "id": "abc" })));
    }

    #[test]
    fn test_internal_error_hides_cause() {
        let err = ApiError::internal("connection reset by peer");
        let (status, body) = err.normalize();

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error.code, "internal_server_error");
        assert_eq!(body.error.message, "An unexpected error occurred");
        assert!(body.error.details.is_none());
    }

    #[test]
    fn test_validation_error_is_422_with_flattened_details() {
        let mut errors = ValidationErrors::new();
        errors.add_field_error("name", "Required");
        let (status, body) = ApiError::from(errors).normalize();

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.error.code, "validation_error");
        let details = body.error.details.expect("details");
        assert_eq!(details["fieldErrors"]["name"][0], "Required");
        assert!(details["formErrors"].as_array().is_some());
    }

    #[test]
    fn test_details_are_omitted_from_wire_when_absent() {
        let (_, body) = ApiError::forbidden("nope").normalize();
        let json = serde_json::to_value(&body).unwrap();
        assert!(json["error"].get("details").is_none());
    }
}
