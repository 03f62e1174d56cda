use std::{
    cmp::Reverse,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{RepoResult, Repository, RepositoryError};
use crate::{
    models::{
        AuditLogEntry, AuditLogQuery, Company, CompanyChanges, CompanySearch, Contact,
        ContactChanges, ContactFilterQuery, NewAuditLogEntry, NewCompany, NewContact,
    },
    pagination::PageWindow,
};

#[derive(Default)]
struct Tables {
    companies: Vec<Company>,
    contacts: Vec<Contact>,
    audit_logs: Vec<AuditLogEntry>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl Tables {
    // Strictly increasing so creation order is always recoverable from
    // `created_at`, even for inserts within the same clock tick.
    fn now(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_timestamp {
            if now <= last {
                now = last + chrono::Duration::milliseconds(1);
            }
        }
        self.last_timestamp = Some(now);
        now
    }
}

/// InMemoryRepository
///
/// A process-local `Repository` used by the test suite and by local runs
/// without `DATABASE_URL`. It applies the same filtering, ordering and
/// soft-delete rules as the Postgres implementation.
///
/// Every trait call is counted (see `call_count`), and audit writes can be
/// made to fail on demand with `set_fail_audit_writes`.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
    calls: AtomicUsize,
    fail_audit_writes: AtomicBool,
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|value| value.to_lowercase().contains(&needle.to_lowercase()))
}

fn company_matches(company: &Company, filter: &CompanySearch) -> bool {
    if company.is_deleted() {
        return false;
    }
    match &filter.search {
        None => true,
        Some(search) => {
            contains_ci(Some(&company.name), search)
                || contains_ci(company.website.as_deref(), search)
                || contains_ci(company.industry.as_deref(), search)
                || contains_ci(company.segment.as_deref(), search)
        }
    }
}

fn contact_matches(contact: &Contact, filter: &ContactFilterQuery) -> bool {
    if contact.is_deleted() {
        return false;
    }
    if filter.company_id.is_some_and(|id| id != contact.company_id) {
        return false;
    }
    if let Some(segment) = &filter.segment {
        let same = contact
            .segment
            .as_deref()
            .is_some_and(|value| value.to_lowercase() == segment.to_lowercase());
        if !same {
            return false;
        }
    }
    if let Some(email) = &filter.email {
        if !contains_ci(contact.email.as_deref(), email) {
            return false;
        }
    }
    if let Some(phone) = &filter.phone {
        if !contains_ci(contact.phone.as_deref(), phone) {
            return false;
        }
    }
    filter.tags.is_empty() || filter.tags.iter().any(|tag| contact.tags.contains(tag))
}

fn audit_matches(entry: &AuditLogEntry, filter: &AuditLogQuery) -> bool {
    filter.entity.as_ref().is_none_or(|entity| *entity == entry.entity)
        && filter
            .entity_id
            .as_ref()
            .is_none_or(|entity_id| *entity_id == entry.entity_id)
}

/// Newest first, then the page window.
fn page<T: Clone>(
    rows: &[T],
    created_at: impl Fn(&T) -> DateTime<Utc>,
    keep: impl Fn(&T) -> bool,
    window: PageWindow,
) -> Vec<T> {
    let mut matched: Vec<&T> = rows.iter().filter(|row| keep(*row)).collect();
    matched.sort_by_key(|row| Reverse(created_at(*row)));
    matched
        .into_iter()
        .skip(usize::try_from(window.skip).unwrap_or(0))
        .take(usize::try_from(window.take).unwrap_or(0))
        .cloned()
        .collect()
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Inspection helpers below bypass the call counter.
    fn peek(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of `Repository` calls served so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_fail_audit_writes(&self, fail: bool) {
        self.fail_audit_writes.store(fail, Ordering::SeqCst);
    }

    /// Every stored company, soft-deleted rows included.
    pub fn companies(&self) -> Vec<Company> {
        self.peek().companies.clone()
    }

    pub fn contacts(&self) -> Vec<Contact> {
        self.peek().contacts.clone()
    }

    /// Audit entries in insertion order.
    pub fn audit_entries(&self) -> Vec<AuditLogEntry> {
        self.peek().audit_logs.clone()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find_company(&self, id: Uuid) -> RepoResult<Option<Company>> {
        Ok(self.tables().companies.iter().find(|c| c.id == id).cloned())
    }

    async fn list_companies(&self, filter: &CompanySearch, window: PageWindow) -> RepoResult<Vec<Company>> {
        let tables = self.tables();
        Ok(page(
            &tables.companies,
            |c| c.created_at,
            |c| company_matches(c, filter),
            window,
        ))
    }

    async fn count_companies(&self, filter: &CompanySearch) -> RepoResult<i64> {
        let tables = self.tables();
        let count = tables
            .companies
            .iter()
            .filter(|c| company_matches(c, filter))
            .count();
        Ok(count as i64)
    }

    async fn create_company(&self, input: NewCompany) -> RepoResult<Company> {
        let mut tables = self.tables();
        let now = tables.now();
        let company = Company {
            id: Uuid::new_v4(),
            name: input.name,
            website: input.website,
            industry: input.industry,
            segment: input.segment,
            description: input.description,
            tags: input.tags,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        tables.companies.push(company.clone());
        Ok(company)
    }

    async fn update_company(&self, id: Uuid, changes: CompanyChanges) -> RepoResult<Option<Company>> {
        let mut tables = self.tables();
        let now = tables.now();
        let Some(company) = tables
            .companies
            .iter_mut()
            .find(|c| c.id == id && !c.is_deleted())
        else {
            return Ok(None);
        };
        if !changes.is_empty() {
            changes.apply(company);
            company.updated_at = now;
        }
        Ok(Some(company.clone()))
    }

    async fn soft_delete_company(&self, id: Uuid) -> RepoResult<Option<Company>> {
        let mut tables = self.tables();
        let now = tables.now();
        let Some(company) = tables
            .companies
            .iter_mut()
            .find(|c| c.id == id && !c.is_deleted())
        else {
            return Ok(None);
        };
        company.deleted_at = Some(now);
        company.updated_at = now;
        Ok(Some(company.clone()))
    }

    async fn find_contact(&self, id: Uuid) -> RepoResult<Option<Contact>> {
        Ok(self.tables().contacts.iter().find(|c| c.id == id).cloned())
    }

    async fn list_contacts(&self, filter: &ContactFilterQuery, window: PageWindow) -> RepoResult<Vec<Contact>> {
        let tables = self.tables();
        Ok(page(
            &tables.contacts,
            |c| c.created_at,
            |c| contact_matches(c, filter),
            window,
        ))
    }

    async fn count_contacts(&self, filter: &ContactFilterQuery) -> RepoResult<i64> {
        let tables = self.tables();
        let count = tables
            .contacts
            .iter()
            .filter(|c| contact_matches(c, filter))
            .count();
        Ok(count as i64)
    }

    async fn create_contact(&self, input: NewContact) -> RepoResult<Contact> {
        let mut tables = self.tables();
        let now = tables.now();
        let contact = Contact {
            id: Uuid::new_v4(),
            company_id: input.company_id,
            first_name: input.first_name,
            last_name: input.last_name,
            email: input.email,
            phone: input.phone,
            job_title: input.job_title,
            segment: input.segment,
            tags: input.tags,
            notes: input.notes,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        tables.contacts.push(contact.clone());
        Ok(contact)
    }

    async fn update_contact(&self, id: Uuid, changes: ContactChanges) -> RepoResult<Option<Contact>> {
        let mut tables = self.tables();
        let now = tables.now();
        let Some(contact) = tables
            .contacts
            .iter_mut()
            .find(|c| c.id == id && !c.is_deleted())
        else {
            return Ok(None);
        };
        if !changes.is_empty() {
            changes.apply(contact);
            contact.updated_at = now;
        }
        Ok(Some(contact.clone()))
    }

    async fn soft_delete_contact(&self, id: Uuid) -> RepoResult<Option<Contact>> {
        let mut tables = self.tables();
        let now = tables.now();
        let Some(contact) = tables
            .contacts
            .iter_mut()
            .find(|c| c.id == id && !c.is_deleted())
        else {
            return Ok(None);
        };
        contact.deleted_at = Some(now);
        contact.updated_at = now;
        Ok(Some(contact.clone()))
    }

    async fn insert_audit_log(&self, entry: NewAuditLogEntry) -> RepoResult<AuditLogEntry> {
        let mut tables = self.tables();
        if self.fail_audit_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable(
                "audit log writes are disabled".to_string(),
            ));
        }

        let stored = AuditLogEntry {
            id: Uuid::new_v4(),
            actor_id: entry.actor_id,
            actor_display_name: entry.actor_display_name,
            actor_role: entry.actor_role,
            action: entry.action.as_str().to_string(),
            action_display: entry.action_display,
            entity: entry.entity,
            entity_id: entry.entity_id,
            before: Some(entry.before).filter(|v| !v.is_null()),
            after: Some(entry.after).filter(|v| !v.is_null()),
            created_at: tables.now(),
        };
        tables.audit_logs.push(stored.clone());
        Ok(stored)
    }

    async fn list_audit_logs(&self, filter: &AuditLogQuery, window: PageWindow) -> RepoResult<Vec<AuditLogEntry>> {
        let tables = self.tables();
        Ok(page(
            &tables.audit_logs,
            |e| e.created_at,
            |e| audit_matches(e, filter),
            window,
        ))
    }

    async fn count_audit_logs(&self, filter: &AuditLogQuery) -> RepoResult<i64> {
        let tables = self.tables();
        let count = tables
            .audit_logs
            .iter()
            .filter(|e| audit_matches(e, filter))
            .count();
        Ok(count as i64)
    }
}
