use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use super::{Role, bearer_token};
use crate::error::ApiError;

const SESSION_HEADER: &str = "x-session-token";
const SESSION_COOKIE: &str = "session-token";

/// SessionUser
///
/// The resolved identity of a caller. Never persisted by this service; the
/// audit log copies its fields at write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SessionUser {
    pub id: String,
    pub display_name: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionConfigError {
    #[error("CRM_AUTH_USERS is not configured. Set a comma-separated list of token:id:role entries.")]
    NotConfigured,
    #[error("Invalid CRM_AUTH_USERS entry: {0}")]
    InvalidEntry(String),
    #[error("Unsupported role \"{0}\" in CRM_AUTH_USERS")]
    UnsupportedRole(String),
}

impl From<SessionConfigError> for ApiError {
    fn from(err: SessionConfigError) -> Self {
        ApiError::internal(err.to_string())
    }
}

/// Parses `token:id:role[:displayName]` entries separated by commas.
/// Blank entries are skipped; the display name defaults to the id.
pub fn parse_session_users(raw: &str) -> Result<HashMap<String, SessionUser>, SessionConfigError> {
    let mut users = HashMap::new();

    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        let mut parts = entry.splitn(4, ':');
        let token = parts.next().unwrap_or_default();
        let id = parts.next().unwrap_or_default();
        let role = parts.next().unwrap_or_default();
        let display_name = parts.next().unwrap_or_default();

        if token.is_empty() || id.is_empty() || role.is_empty() {
            return Err(SessionConfigError::InvalidEntry(entry.to_string()));
        }
        let role = role
            .parse::<Role>()
            .map_err(SessionConfigError::UnsupportedRole)?;

        users.insert(
            token.to_string(),
            SessionUser {
                id: id.to_string(),
                display_name: if display_name.is_empty() {
                    id.to_string()
                } else {
                    display_name.to_string()
                },
                role,
            },
        );
    }

    Ok(users)
}

#[derive(Default)]
struct RegistryState {
    source: Option<String>,
    users: Option<Arc<HashMap<String, SessionUser>>>,
}

/// SessionRegistry
///
/// Token → identity map built lazily from the configured source string and
/// cached for the life of the registry. Held in the application state and
/// shared behind an `Arc`. `reset` drops the cache so the next lookup parses
/// the source again; `reconfigure` also swaps the source.
///
/// Reconfiguring while lookups are in flight is not coordinated beyond the
/// lock; configuration is expected to be static per process.
pub struct SessionRegistry {
    state: RwLock<RegistryState>,
}

impl SessionRegistry {
    pub fn new(source: Option<String>) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                source,
                users: None,
            }),
        }
    }

    fn users(&self) -> Result<Arc<HashMap<String, SessionUser>>, SessionConfigError> {
        {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(users) = &state.users {
                return Ok(Arc::clone(users));
            }
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(users) = &state.users {
            return Ok(Arc::clone(users));
        }

        let raw = state
            .source
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .ok_or(SessionConfigError::NotConfigured)?;
        let users = Arc::new(parse_session_users(raw)?);
        tracing::debug!(count = users.len(), "Session identities loaded");
        state.users = Some(Arc::clone(&users));
        Ok(users)
    }

    pub fn lookup(&self, token: &str) -> Result<Option<SessionUser>, SessionConfigError> {
        Ok(self.users()?.get(token).cloned())
    }

    pub fn is_loaded(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .users
            .is_some()
    }

    pub fn reset(&self) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .users = None;
    }

    pub fn reconfigure(&self, source: Option<String>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.source = source;
        state.users = None;
    }
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

/// Session header, then bearer token, then cookie.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    let explicit = headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    explicit
        .or_else(|| bearer_token(headers))
        .or_else(|| cookie_value(headers, SESSION_COOKIE))
        .map(str::to_string)
}

/// AuthenticatedUser
///
/// A caller resolved through the session scheme, together with the raw token
/// that identified it.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: SessionUser,
    pub token: String,
}

/// get_session_user
///
/// Resolves the caller of a role-gated endpoint. Fails with Unauthorized when
/// no token is presented or the token is unknown.
pub fn get_session_user(
    headers: &HeaderMap,
    registry: &SessionRegistry,
) -> Result<AuthenticatedUser, ApiError> {
    let token = extract_token(headers).ok_or_else(|| ApiError::unauthorized("Missing session token"))?;

    let user = registry
        .lookup(&token)?
        .ok_or_else(|| ApiError::unauthorized("Invalid session token"))?;

    Ok(AuthenticatedUser { user, token })
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
    Arc<SessionRegistry>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let registry = Arc::<SessionRegistry>::from_ref(state);
        get_session_user(&parts.headers, &registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const USERS: &str = "admin-token:admin:ADMIN:Ada Admin, sales-token:sam:SALES";

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.append(*name, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn test_parse_defaults_display_name_to_id() {
        let users = parse_session_users(USERS).unwrap();
        assert_eq!(users["admin-token"].display_name, "Ada Admin");
        assert_eq!(users["sales-token"].display_name, "sam");
        assert_eq!(users["sales-token"].role, Role::Sales);
    }

    #[test]
    fn test_parse_rejects_bad_entries() {
        assert_eq!(
            parse_session_users("token-only"),
            Err(SessionConfigError::InvalidEntry("token-only".to_string()))
        );
        assert_eq!(
            parse_session_users("t:id:OWNER"),
            Err(SessionConfigError::UnsupportedRole("OWNER".to_string()))
        );
    }

    #[test]
    fn test_token_precedence_header_bearer_cookie() {
        let registry = SessionRegistry::new(Some(USERS.to_string()));

        let all = headers(&[
            ("x-session-token", "admin-token"),
            ("authorization", "Bearer sales-token"),
            ("cookie", "session-token=sales-token"),
        ]);
        assert_eq!(get_session_user(&all, &registry).unwrap().user.id, "admin");

        let bearer_and_cookie = headers(&[
            ("authorization", "Bearer sales-token"),
            ("cookie", "session-token=admin-token"),
        ]);
        assert_eq!(
            get_session_user(&bearer_and_cookie, &registry).unwrap().user.id,
            "sam"
        );

        let cookie = headers(&[("cookie", "theme=dark; session-token=admin-token")]);
        let resolved = get_session_user(&cookie, &registry).unwrap();
        assert_eq!(resolved.user.id, "admin");
        assert_eq!(resolved.token, "admin-token");
    }

    #[test]
    fn test_missing_and_unknown_tokens_are_unauthorized() {
        let registry = SessionRegistry::new(Some(USERS.to_string()));

        let err = get_session_user(&HeaderMap::new(), &registry).unwrap_err();
        assert_eq!(err.to_string(), "Missing session token");

        let err = get_session_user(&headers(&[("x-session-token", "nope")]), &registry).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized { .. }));
        assert_eq!(err.to_string(), "Invalid session token");
    }

    #[test]
    fn test_missing_configuration_is_an_internal_error() {
        let registry = SessionRegistry::new(None);
        let err = get_session_user(&headers(&[("x-session-token", "admin-token")]), &registry)
            .unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
    }

    #[test]
    fn test_cache_is_built_once_and_resettable() {
        let registry = SessionRegistry::new(Some(USERS.to_string()));
        assert!(!registry.is_loaded());
        assert!(registry.lookup("admin-token").unwrap().is_some());
        assert!(registry.is_loaded());

        registry.reconfigure(Some("new-token:neo:VIEWER".to_string()));
        assert!(!registry.is_loaded());
        assert!(registry.lookup("admin-token").unwrap().is_none());
        assert_eq!(registry.lookup("new-token").unwrap().unwrap().role, Role::Viewer);

        registry.reset();
        assert!(!registry.is_loaded());
        assert!(registry.lookup("new-token").unwrap().is_some());
    }
}
