use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use super::format_timestamp;
use crate::validation::{QueryParams, StringRule, ValidationErrors};

const ENTITY: StringRule = StringRule::length(1, 64);
const ENTITY_ID: StringRule = StringRule::length(1, 128);

/// AuditAction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
        }
    }

    /// Past-tense verb used in `actionDisplay`.
    pub fn verb(self) -> &'static str {
        match self {
            AuditAction::Create => "created",
            AuditAction::Update => "updated",
            AuditAction::Delete => "deleted",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// NewAuditLogEntry
///
/// A fully prepared entry, ready to be appended. Snapshots are plain JSON
/// values detached from the entities they were taken from.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditLogEntry {
    pub actor_id: String,
    pub actor_display_name: String,
    pub actor_role: String,
    pub action: AuditAction,
    pub action_display: String,
    pub entity: String,
    pub entity_id: String,
    pub before: Value,
    pub after: Value,
}

/// AuditLogEntry
///
/// A persisted row of the append-only `audit_logs` table. Action and role
/// are stored as text.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub actor_id: String,
    pub actor_display_name: String,
    pub actor_role: String,
    pub action: String,
    pub action_display: String,
    pub entity: String,
    pub entity_id: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// AuditLogQuery
///
/// Filters of `GET /api/audit-logs`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditLogQuery {
    pub entity: Option<String>,
    pub entity_id: Option<String>,
}

impl AuditLogQuery {
    pub fn from_query(query: &QueryParams) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let entity = query.string("entity", ENTITY, &mut errors);
        let entity_id = query.string("entityId", ENTITY_ID, &mut errors);
        errors.into_result()?;
        Ok(Self { entity, entity_id })
    }
}

/// AuditLogResponse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AuditLogResponse {
    pub id: Uuid,
    pub actor_id: String,
    pub actor_display_name: String,
    pub actor_role: String,
    pub action: String,
    pub action_display: String,
    pub entity: String,
    pub entity_id: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub created_at: String,
}

impl From<&AuditLogEntry> for AuditLogResponse {
    fn from(entry: &AuditLogEntry) -> Self {
        Self {
            id: entry.id,
            actor_id: entry.actor_id.clone(),
            actor_display_name: entry.actor_display_name.clone(),
            actor_role: entry.actor_role.clone(),
            action: entry.action.clone(),
            action_display: entry.action_display.clone(),
            entity: entry.entity.clone(),
            entity_id: entry.entity_id.clone(),
            before: entry.before.clone(),
            after: entry.after.clone(),
            created_at: format_timestamp(&entry.created_at),
        }
    }
}
