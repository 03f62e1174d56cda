use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    models::{
        AuditLogEntry, AuditLogQuery, Company, CompanyChanges, CompanySearch, Contact,
        ContactChanges, ContactFilterQuery, NewAuditLogEntry, NewCompany, NewContact,
    },
    pagination::PageWindow,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

/// RepositoryError
///
/// Persistence failures. The pipeline never inspects these; they surface to
/// the client as a generic 500.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// Repository Trait
///
/// Persistence contract consumed by the handlers and the audit logger.
///
/// Soft delete is enforced here: `find_active_*`, the list and count
/// queries, updates and soft deletes only ever match rows whose
/// `deleted_at` is NULL. The plain `find_*` methods see every row and exist
/// for inspection. `update_*` and `soft_delete_*` return `None` when no
/// active row matched (missing, or deleted concurrently).
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Companies ---
    async fn find_company(&self, id: Uuid) -> RepoResult<Option<Company>>;

    async fn find_active_company(&self, id: Uuid) -> RepoResult<Option<Company>> {
        Ok(self
            .find_company(id)
            .await?
            .filter(|company| !company.is_deleted()))
    }

    async fn list_companies(&self, filter: &CompanySearch, window: PageWindow) -> RepoResult<Vec<Company>>;
    async fn count_companies(&self, filter: &CompanySearch) -> RepoResult<i64>;
    async fn create_company(&self, input: NewCompany) -> RepoResult<Company>;
    async fn update_company(&self, id: Uuid, changes: CompanyChanges) -> RepoResult<Option<Company>>;
    async fn soft_delete_company(&self, id: Uuid) -> RepoResult<Option<Company>>;

    // --- Contacts ---
    async fn find_contact(&self, id: Uuid) -> RepoResult<Option<Contact>>;

    async fn find_active_contact(&self, id: Uuid) -> RepoResult<Option<Contact>> {
        Ok(self
            .find_contact(id)
            .await?
            .filter(|contact| !contact.is_deleted()))
    }

    async fn list_contacts(&self, filter: &ContactFilterQuery, window: PageWindow) -> RepoResult<Vec<Contact>>;
    async fn count_contacts(&self, filter: &ContactFilterQuery) -> RepoResult<i64>;
    async fn create_contact(&self, input: NewContact) -> RepoResult<Contact>;
    async fn update_contact(&self, id: Uuid, changes: ContactChanges) -> RepoResult<Option<Contact>>;
    async fn soft_delete_contact(&self, id: Uuid) -> RepoResult<Option<Contact>>;

    // --- Audit log (append-only) ---
    async fn insert_audit_log(&self, entry: NewAuditLogEntry) -> RepoResult<AuditLogEntry>;
    async fn list_audit_logs(&self, filter: &AuditLogQuery, window: PageWindow) -> RepoResult<Vec<AuditLogEntry>>;
    async fn count_audit_logs(&self, filter: &AuditLogQuery) -> RepoResult<i64>;
}

/// RepositoryState
///
/// The shared handle to the persistence layer held in the application state.
pub type RepositoryState = Arc<dyn Repository>;
