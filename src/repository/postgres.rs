use async_trait::async_trait;
use sqlx::{PgPool, Postgres, query_builder::QueryBuilder};
use uuid::Uuid;

use super::{RepoResult, Repository};
use crate::{
    models::{
        AuditLogEntry, AuditLogQuery, Company, CompanyChanges, CompanySearch, Contact,
        ContactChanges, ContactFilterQuery, NewAuditLogEntry, NewCompany, NewContact,
    },
    pagination::PageWindow,
};

const COMPANY_COLUMNS: &str = "id, name, website, industry, segment, description, tags, \
     created_at, updated_at, deleted_at";

const CONTACT_COLUMNS: &str = "id, company_id, first_name, last_name, email, phone, job_title, \
     segment, tags, notes, created_at, updated_at, deleted_at";

const AUDIT_COLUMNS: &str = "id, actor_id, actor_display_name, actor_role, action, action_display, \
     entity, entity_id, before, after, created_at";

/// Escapes LIKE metacharacters so user input only ever matches literally.
fn contains_pattern(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('%');
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

fn push_company_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &CompanySearch) {
    builder.push(" WHERE deleted_at IS NULL");

    if let Some(search) = &filter.search {
        // Case-insensitive substring match across the descriptive columns.
        let pattern = contains_pattern(search);
        builder.push(" AND (name ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR website ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR industry ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR segment ILIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }
}

fn push_contact_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &ContactFilterQuery) {
    builder.push(" WHERE deleted_at IS NULL");

    if let Some(company_id) = filter.company_id {
        builder.push(" AND company_id = ");
        builder.push_bind(company_id);
    }
    if let Some(segment) = &filter.segment {
        builder.push(" AND LOWER(segment) = LOWER(");
        builder.push_bind(segment.clone());
        builder.push(")");
    }
    if let Some(email) = &filter.email {
        builder.push(" AND email ILIKE ");
        builder.push_bind(contains_pattern(email));
    }
    if let Some(phone) = &filter.phone {
        builder.push(" AND phone ILIKE ");
        builder.push_bind(contains_pattern(phone));
    }
    if !filter.tags.is_empty() {
        // Any-of: the arrays overlap.
        builder.push(" AND tags && ");
        builder.push_bind(filter.tags.clone());
    }
}

fn push_audit_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &AuditLogQuery) {
    builder.push(" WHERE TRUE");

    if let Some(entity) = &filter.entity {
        builder.push(" AND entity = ");
        builder.push_bind(entity.clone());
    }
    if let Some(entity_id) = &filter.entity_id {
        builder.push(" AND entity_id = ");
        builder.push_bind(entity_id.clone());
    }
}

fn push_window(builder: &mut QueryBuilder<'_, Postgres>, window: PageWindow) {
    builder.push(" ORDER BY created_at DESC, id DESC OFFSET ");
    builder.push_bind(window.skip);
    builder.push(" LIMIT ");
    builder.push_bind(window.take);
}

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL. All dynamic SQL is
/// assembled with `QueryBuilder` and bound parameters.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded migrations in `migrations/`.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn find_company(&self, id: Uuid) -> RepoResult<Option<Company>> {
        let sql = format!("SELECT {COMPANY_COLUMNS} FROM companies WHERE id = $1");
        Ok(sqlx::query_as::<_, Company>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_active_company(&self, id: Uuid) -> RepoResult<Option<Company>> {
        let sql = format!(
            "SELECT {COMPANY_COLUMNS} FROM companies WHERE id = $1 AND deleted_at IS NULL"
        );
        Ok(sqlx::query_as::<_, Company>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_companies(&self, filter: &CompanySearch, window: PageWindow) -> RepoResult<Vec<Company>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {COMPANY_COLUMNS} FROM companies"));
        push_company_filter(&mut builder, filter);
        push_window(&mut builder, window);

        Ok(builder
            .build_query_as::<Company>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count_companies(&self, filter: &CompanySearch) -> RepoResult<i64> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM companies");
        push_company_filter(&mut builder, filter);

        Ok(builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?)
    }

    async fn create_company(&self, input: NewCompany) -> RepoResult<Company> {
        let sql = format!(
            "INSERT INTO companies (id, name, website, industry, segment, description, tags, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW()) \
             RETURNING {COMPANY_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Company>(&sql)
            .bind(Uuid::new_v4())
            .bind(input.name)
            .bind(input.website)
            .bind(input.industry)
            .bind(input.segment)
            .bind(input.description)
            .bind(input.tags)
            .fetch_one(&self.pool)
            .await?)
    }

    /// update_company
    ///
    /// Writes only the columns present in `changes`. An empty patch leaves
    /// the row (including `updated_at`) untouched.
    async fn update_company(&self, id: Uuid, changes: CompanyChanges) -> RepoResult<Option<Company>> {
        if changes.is_empty() {
            return self.find_active_company(id).await;
        }

        let mut builder = QueryBuilder::<Postgres>::new("UPDATE companies SET ");
        let mut set = builder.separated(", ");
        if let Some(name) = changes.name {
            set.push("name = ").push_bind_unseparated(name);
        }
        if let Some(website) = changes.website {
            set.push("website = ").push_bind_unseparated(website);
        }
        if let Some(industry) = changes.industry {
            set.push("industry = ").push_bind_unseparated(industry);
        }
        if let Some(segment) = changes.segment {
            set.push("segment = ").push_bind_unseparated(segment);
        }
        if let Some(description) = changes.description {
            set.push("description = ").push_bind_unseparated(description);
        }
        if let Some(tags) = changes.tags {
            set.push("tags = ").push_bind_unseparated(tags);
        }
        set.push("updated_at = NOW()");

        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(" AND deleted_at IS NULL RETURNING ");
        builder.push(COMPANY_COLUMNS);

        Ok(builder
            .build_query_as::<Company>()
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn soft_delete_company(&self, id: Uuid) -> RepoResult<Option<Company>> {
        let sql = format!(
            "UPDATE companies SET deleted_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {COMPANY_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Company>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_contact(&self, id: Uuid) -> RepoResult<Option<Contact>> {
        let sql = format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = $1");
        Ok(sqlx::query_as::<_, Contact>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_active_contact(&self, id: Uuid) -> RepoResult<Option<Contact>> {
        let sql = format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = $1 AND deleted_at IS NULL"
        );
        Ok(sqlx::query_as::<_, Contact>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_contacts(&self, filter: &ContactFilterQuery, window: PageWindow) -> RepoResult<Vec<Contact>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {CONTACT_COLUMNS} FROM contacts"));
        push_contact_filter(&mut builder, filter);
        push_window(&mut builder, window);

        Ok(builder
            .build_query_as::<Contact>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count_contacts(&self, filter: &ContactFilterQuery) -> RepoResult<i64> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM contacts");
        push_contact_filter(&mut builder, filter);

        Ok(builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?)
    }

    async fn create_contact(&self, input: NewContact) -> RepoResult<Contact> {
        let sql = format!(
            "INSERT INTO contacts (id, company_id, first_name, last_name, email, phone, job_title, segment, tags, notes, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW()) \
             RETURNING {CONTACT_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Contact>(&sql)
            .bind(Uuid::new_v4())
            .bind(input.company_id)
            .bind(input.first_name)
            .bind(input.last_name)
            .bind(input.email)
            .bind(input.phone)
            .bind(input.job_title)
            .bind(input.segment)
            .bind(input.tags)
            .bind(input.notes)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update_contact(&self, id: Uuid, changes: ContactChanges) -> RepoResult<Option<Contact>> {
        if changes.is_empty() {
            return self.find_active_contact(id).await;
        }

        let mut builder = QueryBuilder::<Postgres>::new("UPDATE contacts SET ");
        let mut set = builder.separated(", ");
        if let Some(company_id) = changes.company_id {
            set.push("company_id = ").push_bind_unseparated(company_id);
        }
        if let Some(first_name) = changes.first_name {
            set.push("first_name = ").push_bind_unseparated(first_name);
        }
        if let Some(last_name) = changes.last_name {
            set.push("last_name = ").push_bind_unseparated(last_name);
        }
        if let Some(email) = changes.email {
            set.push("email = ").push_bind_unseparated(email);
        }
        if let Some(phone) = changes.phone {
            set.push("phone = ").push_bind_unseparated(phone);
        }
        if let Some(job_title) = changes.job_title {
            set.push("job_title = ").push_bind_unseparated(job_title);
        }
        if let Some(segment) = changes.segment {
            set.push("segment = ").push_bind_unseparated(segment);
        }
        if let Some(tags) = changes.tags {
            set.push("tags = ").push_bind_unseparated(tags);
        }
        if let Some(notes) = changes.notes {
            set.push("notes = ").push_bind_unseparated(notes);
        }
        set.push("updated_at = NOW()");

        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(" AND deleted_at IS NULL RETURNING ");
        builder.push(CONTACT_COLUMNS);

        Ok(builder
            .build_query_as::<Contact>()
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn soft_delete_contact(&self, id: Uuid) -> RepoResult<Option<Contact>> {
        let sql = format!(
            "UPDATE contacts SET deleted_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {CONTACT_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Contact>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert_audit_log(&self, entry: NewAuditLogEntry) -> RepoResult<AuditLogEntry> {
        let sql = format!(
            "INSERT INTO audit_logs (id, actor_id, actor_display_name, actor_role, action, action_display, entity, entity_id, before, after, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW()) \
             RETURNING {AUDIT_COLUMNS}"
        );
        // A null snapshot is stored as SQL NULL rather than JSON `null`.
        let before = Some(entry.before).filter(|value| !value.is_null());
        let after = Some(entry.after).filter(|value| !value.is_null());

        Ok(sqlx::query_as::<_, AuditLogEntry>(&sql)
            .bind(Uuid::new_v4())
            .bind(entry.actor_id)
            .bind(entry.actor_display_name)
            .bind(entry.actor_role)
            .bind(entry.action.as_str())
            .bind(entry.action_display)
            .bind(entry.entity)
            .bind(entry.entity_id)
            .bind(before)
            .bind(after)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn list_audit_logs(&self, filter: &AuditLogQuery, window: PageWindow) -> RepoResult<Vec<AuditLogEntry>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {AUDIT_COLUMNS} FROM audit_logs"));
        push_audit_filter(&mut builder, filter);
        push_window(&mut builder, window);

        Ok(builder
            .build_query_as::<AuditLogEntry>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count_audit_logs(&self, filter: &AuditLogQuery) -> RepoResult<i64> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_logs");
        push_audit_filter(&mut builder, filter);

        Ok(builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?)
    }
}
