use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use sha2::{Digest, Sha256};

use super::{Role, SessionUser, bearer_token};
use crate::{config::AppConfig, error::ApiError};

const API_KEY_HEADER: &str = "x-api-key";

fn presented_key(headers: &HeaderMap) -> Option<String> {
    let explicit = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty());

    explicit.or_else(|| bearer_token(headers)).map(str::to_string)
}

/// Splits the configured comma-separated key list. Unset (or empty)
/// configuration is reported to the caller as a configuration error.
fn expected_keys(config: &AppConfig) -> Result<Vec<&str>, ApiError> {
    let raw = config
        .api_keys
        .as_deref()
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| ApiError::Configuration {
            code: "api_key_not_configured",
            message: "API key guard is not configured".to_string(),
        })?;

    Ok(raw
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .collect())
}

/// require_api_key
///
/// Guard for the company and contact endpoints. Reads the candidate from
/// `X-API-Key` or a bearer token and compares it against the configured
/// allow-list on every call; nothing is cached. Returns the accepted key.
pub fn require_api_key(headers: &HeaderMap, config: &AppConfig) -> Result<String, ApiError> {
    let provided = presented_key(headers).ok_or_else(|| ApiError::unauthorized("Missing API key"))?;

    let expected = expected_keys(config)?;
    if !expected.contains(&provided.as_str()) {
        return Err(ApiError::unauthorized("Invalid API key"));
    }

    Ok(provided)
}

/// Short, stable, non-reversible label for a key.
pub fn key_fingerprint(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(digest)[..12].to_string()
}

/// ApiClient
///
/// A caller authenticated by API key. Keys carry no identity of their own, so
/// the client is attributed in the audit trail as an ADMIN-level actor named
/// after the key's fingerprint.
#[derive(Debug, Clone)]
pub struct ApiClient {
    pub fingerprint: String,
    pub user: SessionUser,
}

impl ApiClient {
    pub fn from_key(key: &str) -> Self {
        let fingerprint = key_fingerprint(key);
        Self {
            user: SessionUser {
                id: format!("api-key:{}", fingerprint),
                display_name: "API client".to_string(),
                role: Role::Admin,
            },
            fingerprint,
        }
    }
}

impl<S> FromRequestParts<S> for ApiClient
where
    S: Send + Sync,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AppConfig::from_ref(state);
        match require_api_key(&parts.headers, &config) {
            Ok(key) => Ok(ApiClient::from_key(&key)),
            Err(err) => {
                tracing::warn!(reason = %err, uri = %parts.uri, "API key rejected");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn config(keys: Option<&str>) -> AppConfig {
        AppConfig {
            api_keys: keys.map(str::to_string),
            ..AppConfig::default()
        }
    }

    fn headers(name: &'static str, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_accepts_header_or_bearer_from_trimmed_list() {
        let config = config(Some(" first , second "));
        assert_eq!(
            require_api_key(&headers("x-api-key", "second"), &config).unwrap(),
            "second"
        );
        assert_eq!(
            require_api_key(&headers("authorization", "Bearer first"), &config).unwrap(),
            "first"
        );
    }

    #[test]
    fn test_missing_key_is_checked_before_configuration() {
        let err = require_api_key(&HeaderMap::new(), &config(None)).unwrap_err();
        assert_eq!(err.to_string(), "Missing API key");
    }

    #[test]
    fn test_unconfigured_guard_is_a_configuration_error() {
        let err = require_api_key(&headers("x-api-key", "k"), &config(None)).unwrap_err();
        assert_eq!(err.code(), "api_key_not_configured");
        assert_eq!(err.status_code().as_u16(), 500);
    }

    #[test]
    fn test_unknown_key_is_unauthorized() {
        let err = require_api_key(&headers("x-api-key", "nope"), &config(Some("k1,k2"))).unwrap_err();
        assert_eq!(err.code(), "unauthorized");
        assert_eq!(err.to_string(), "Invalid API key");
    }

    #[test]
    fn test_client_identity_does_not_leak_the_key() {
        let client = ApiClient::from_key("super-secret");
        assert_eq!(client.fingerprint.len(), 12);
        assert!(client.user.id.starts_with("api-key:"));
        assert!(!client.user.id.contains("super-secret"));
        assert_eq!(client.user.role, Role::Admin);
    }
}
