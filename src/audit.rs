use serde::Serialize;
use serde_json::Value;

use crate::{
    auth::SessionUser,
    models::{AuditAction, NewAuditLogEntry},
    repository::RepositoryState,
};

pub const COMPANY_ENTITY: &str = "company";
pub const CONTACT_ENTITY: &str = "contact";

/// AuditRecord
///
/// One mutation to be written to the audit trail. `before` is absent for
/// creations; `after` holds the state returned to the caller.
pub struct AuditRecord<'a, B, A> {
    pub user: &'a SessionUser,
    pub action: AuditAction,
    pub entity: &'a str,
    pub entity_id: String,
    pub before: Option<&'a B>,
    pub after: Option<&'a A>,
}

/// Detaches a snapshot from the entity by round-tripping it through JSON.
/// A value that cannot be serialized is recorded as null.
fn snapshot<T: Serialize>(value: Option<&T>) -> Value {
    let Some(value) = value else {
        return Value::Null;
    };
    match serde_json::to_value(value) {
        Ok(json) => json,
        Err(err) => {
            tracing::warn!(error = %err, "Failed to serialize snapshot for audit log");
            Value::Null
        }
    }
}

/// `"{displayName} {verb} {entity} {entityId}"`, trimmed.
pub fn action_display(user: &SessionUser, action: AuditAction, entity: &str, entity_id: &str) -> String {
    format!("{} {} {} {}", user.display_name, action.verb(), entity, entity_id)
        .trim()
        .to_string()
}

/// AuditLogger
///
/// Best-effort writer for the append-only audit trail. A failed write is
/// logged and swallowed so it can never change the outcome of the mutation
/// that triggered it.
#[derive(Clone)]
pub struct AuditLogger {
    repo: RepositoryState,
}

impl AuditLogger {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    /// Builds the persisted form of a record without writing it.
    pub fn prepare<B: Serialize, A: Serialize>(record: &AuditRecord<'_, B, A>) -> NewAuditLogEntry {
        NewAuditLogEntry {
            actor_id: record.user.id.clone(),
            actor_display_name: record.user.display_name.clone(),
            actor_role: record.user.role.as_str().to_string(),
            action: record.action,
            action_display: action_display(
                record.user,
                record.action,
                record.entity,
                &record.entity_id,
            ),
            entity: record.entity.to_string(),
            entity_id: record.entity_id.clone(),
            before: snapshot(record.before),
            after: snapshot(record.after),
        }
    }

    /// write
    ///
    /// Persists the record. Never fails from the caller's point of view.
    pub async fn write<B, A>(&self, record: AuditRecord<'_, B, A>)
    where
        B: Serialize + Sync,
        A: Serialize + Sync,
    {
        let entry = Self::prepare(&record);

        match self.repo.insert_audit_log(entry).await {
            Ok(stored) => {
                tracing::info!(
                    target: "audit",
                    audit_id = %stored.id,
                    actor_id = %stored.actor_id,
                    actor_role = %stored.actor_role,
                    action = %stored.action,
                    entity = %stored.entity,
                    entity_id = %stored.entity_id,
                    "{}",
                    stored.action_display
                );
            }
            Err(err) => {
                tracing::error!(
                    error = %err,
                    action = %record.action,
                    entity = record.entity,
                    entity_id = %record.entity_id,
                    "Failed to write audit log entry"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use std::collections::BTreeMap;

    fn user(display_name: &str) -> SessionUser {
        SessionUser {
            id: "u-1".to_string(),
            display_name: display_name.to_string(),
            role: Role::Manager,
        }
    }

    #[test]
    fn test_action_display_is_trimmed() {
        assert_eq!(
            action_display(&user("Ada"), AuditAction::Update, "company", "c-1"),
            "Ada updated company c-1"
        );
        assert_eq!(
            action_display(&user(""), AuditAction::Delete, "contact", "k-9"),
            "deleted contact k-9"
        );
    }

    #[test]
    fn test_prepare_snapshots_and_actor_fields() {
        let before = BTreeMap::from([("name", "Old")]);
        let after = BTreeMap::from([("name", "New")]);
        let actor = user("Ada");
        let entry = AuditLogger::prepare(&AuditRecord {
            user: &actor,
            action: AuditAction::Update,
            entity: COMPANY_ENTITY,
            entity_id: "c-1".to_string(),
            before: Some(&before),
            after: Some(&after),
        });

        assert_eq!(entry.actor_role, "MANAGER");
        assert_eq!(entry.before["name"], "Old");
        assert_eq!(entry.after["name"], "New");
    }

    #[test]
    fn test_missing_before_is_null() {
        let actor = user("Ada");
        let entry = AuditLogger::prepare(&AuditRecord::<(), ()> {
            user: &actor,
            action: AuditAction::Create,
            entity: CONTACT_ENTITY,
            entity_id: "k-1".to_string(),
            before: None,
            after: Some(&()),
        });
        assert!(entry.before.is_null());
    }

    #[test]
    fn test_unserializable_snapshot_becomes_null() {
        // JSON object keys must be strings.
        let bad = std::collections::HashMap::from([((1, 2), "x")]);
        assert!(snapshot(Some(&bad)).is_null());
    }
}
