//! Auth Gate
//!
//! Two independent credential schemes protect different route groups:
//! - `api_key`: static keys from configuration, used by the company and
//!   contact endpoints (integrations, back-office scripts).
//! - `session`: configured session tokens mapped to a role-carrying
//!   identity, used by the role-gated account endpoints.
//!
//! `rbac` holds the hierarchical role check shared by both.

use axum::http::{HeaderMap, header};

pub mod api_key;
pub mod rbac;
pub mod session;

pub use api_key::{ApiClient, require_api_key};
pub use rbac::{Role, can_access, require_role};
pub use session::{AuthenticatedUser, SessionConfigError, SessionRegistry, SessionUser, get_session_user};

/// Returns the trimmed credential of an `Authorization: Bearer <value>` header.
/// The scheme is matched case-insensitively; an empty credential counts as absent.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let scheme = value.get(..7)?;
    if !scheme.eq_ignore_ascii_case("bearer ") {
        return None;
    }
    let token = value[7..].trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_authorization(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_scheme_is_case_insensitive() {
        assert_eq!(bearer_token(&with_authorization("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&with_authorization("bearer  abc ")), Some("abc"));
        assert_eq!(bearer_token(&with_authorization("BEARER abc")), Some("abc"));
    }

    #[test]
    fn test_other_schemes_and_empty_tokens_are_ignored() {
        assert_eq!(bearer_token(&with_authorization("Basic abc")), None);
        assert_eq!(bearer_token(&with_authorization("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
