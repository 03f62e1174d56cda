use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{pagination::PaginationMeta, validation::StringRule};

pub mod audit;
pub mod company;
pub mod contact;

pub use audit::{AuditAction, AuditLogEntry, AuditLogQuery, AuditLogResponse, NewAuditLogEntry};
pub use company::{
    Company, CompanyChanges, CompanyCreateInput, CompanyResponse, CompanySearch,
    CompanyUpdateInput, NewCompany,
};
pub use contact::{
    Contact, ContactChanges, ContactCreateInput, ContactFilterQuery, ContactResponse,
    ContactUpdateInput, NewContact,
};

// Field rules shared by both entities.
pub(crate) const TAG: StringRule = StringRule::length(1, 64);
pub(crate) const SEGMENT: StringRule = StringRule::length(1, 64);

/// DataEnvelope
///
/// `{"data": ...}` wrapper for single-item responses.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DataEnvelope<T> {
    pub data: T,
}

impl<T> DataEnvelope<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// ListEnvelope
///
/// `{"data": [...], "meta": {...}}` wrapper for paginated lists.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ListEnvelope<T> {
    pub data: Vec<T>,
    pub meta: PaginationMeta,
}

/// ISO-8601 UTC with millisecond precision, e.g. `2024-01-01T00:00:00.000Z`.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// HealthStatus
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct HealthStatus {
    pub status: String,
}

/// DashboardSummary
///
/// Counts of active (non-deleted) records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DashboardSummary {
    pub companies: i64,
    pub contacts: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamps_carry_milliseconds_and_z_suffix() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(format_timestamp(&at), "2024-01-01T00:00:00.000Z");
    }
}
