use std::env;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// AppConfig
///
/// Immutable configuration loaded once at startup and shared through the
/// application state. Handlers pull it out with `FromRef` (the API key guard
/// reads `api_keys` on every call).
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Selects the log format and whether a
    // database is mandatory.
    pub env: Env,
    // Postgres connection string. `None` only outside production, in which
    // case the in-memory repository is used.
    pub db_url: Option<String>,
    pub db_max_connections: u32,
    pub bind_addr: String,
    // Comma-separated list of accepted API keys.
    pub api_keys: Option<String>,
    // Comma-separated `token:id:role[:displayName]` session entries.
    pub session_users: Option<String>,
}

/// Env
///
/// Runtime context: local development or production.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Env {
    Local,
    Production,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL must be set in production")]
    MissingDatabaseUrl,
    #[error("{name} must be a positive integer, got \"{value}\"")]
    InvalidNumber { name: &'static str, value: String },
}

impl Default for AppConfig {
    /// default
    ///
    /// Test configuration: no database, one API key and a session user per
    /// role. Lets tests build state without touching the environment.
    fn default() -> Self {
        Self {
            env: Env::Local,
            db_url: None,
            db_max_connections: DEFAULT_MAX_CONNECTIONS,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            api_keys: Some("test-api-key".to_string()),
            session_users: Some(
                "admin-token:admin:ADMIN:Admin User,\
                 manager-token:manager:MANAGER:Manager User,\
                 sales-token:sales:SALES:Sales User,\
                 viewer-token:viewer:VIEWER:Viewer User"
                    .to_string(),
            ),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from the process environment (call
    /// `dotenv` first). Fails fast when production is missing its database.
    /// The API key and session settings are not checked here; their guards
    /// report a misconfiguration per request instead.
    pub fn load() -> Result<Self, ConfigError> {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let db_url = non_empty_var("DATABASE_URL");
        if env == Env::Production && db_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        let db_max_connections = match non_empty_var("DATABASE_MAX_CONNECTIONS") {
            None => DEFAULT_MAX_CONNECTIONS,
            Some(value) => value
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidNumber {
                    name: "DATABASE_MAX_CONNECTIONS",
                    value,
                })?,
        };

        Ok(Self {
            env,
            db_url,
            db_max_connections,
            bind_addr: non_empty_var("CRM_BIND_ADDR")
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            api_keys: non_empty_var("INTERNAL_API_KEY").or_else(|| non_empty_var("CRM_API_KEY")),
            session_users: non_empty_var("CRM_AUTH_USERS"),
        })
    }
}
