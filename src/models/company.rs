use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{SEGMENT, TAG, format_timestamp};
use crate::validation::{Format, ObjectReader, Patch, QueryParams, StringRule, ValidationErrors};

const NAME: StringRule = StringRule::length(1, 255);
const WEBSITE: StringRule = StringRule::format(Format::Url);
const INDUSTRY: StringRule = StringRule::length(1, 128);
const DESCRIPTION: StringRule = StringRule::length(1, 1024);
const SEARCH: StringRule = StringRule::length(1, 255);

const FIELDS: &[&str] = &["name", "website", "industry", "segment", "description", "tags"];

/// Company
///
/// A row of the `companies` table. A non-null `deleted_at` marks the row as
/// soft-deleted; it stays in storage but is invisible to every read path
/// except direct inspection.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub website: Option<String>,
    pub industry: Option<String>,
    pub segment: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Company {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// CompanyCreateInput
///
/// Validated body of `POST /api/companies`. Unknown keys are rejected; an
/// optional field sent as `null` is treated as omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CompanyCreateInput {
    #[schema(example = "Acme Corp")]
    pub name: String,
    #[schema(example = "https://acme.example")]
    pub website: Option<String>,
    pub industry: Option<String>,
    pub segment: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Insert payload handed to the repository.
pub type NewCompany = CompanyCreateInput;

impl CompanyCreateInput {
    pub fn parse(body: &Value) -> Result<Self, ValidationErrors> {
        let mut reader = ObjectReader::new(body, FIELDS)?;
        let input = Self {
            name: reader.required_string("name", NAME),
            website: reader.nullable_string("website", WEBSITE).into_value(),
            industry: reader.nullable_string("industry", INDUSTRY).into_value(),
            segment: reader.nullable_string("segment", SEGMENT).into_value(),
            description: reader.nullable_string("description", DESCRIPTION).into_value(),
            tags: reader
                .nullable_string_list("tags", TAG)
                .into_value()
                .unwrap_or_default(),
        };
        reader.finish()?;
        Ok(input)
    }
}

/// CompanyUpdateInput
///
/// Validated body of `PATCH /api/companies/{id}`. Every field is optional;
/// `null` clears an optional field and `{}` is a valid no-op patch.
#[derive(Debug, Clone, Default, PartialEq, ToSchema)]
#[schema(rename_all = "camelCase")]
pub struct CompanyUpdateInput {
    pub name: Option<String>,
    #[schema(value_type = Option<String>, nullable)]
    pub website: Patch<String>,
    #[schema(value_type = Option<String>, nullable)]
    pub industry: Patch<String>,
    #[schema(value_type = Option<String>, nullable)]
    pub segment: Patch<String>,
    #[schema(value_type = Option<String>, nullable)]
    pub description: Patch<String>,
    #[schema(value_type = Option<Vec<String>>, nullable)]
    pub tags: Patch<Vec<String>>,
}

impl CompanyUpdateInput {
    pub fn parse(body: &Value) -> Result<Self, ValidationErrors> {
        let mut reader = ObjectReader::new(body, FIELDS)?;
        let input = Self {
            name: reader.optional_string("name", NAME),
            website: reader.nullable_string("website", WEBSITE),
            industry: reader.nullable_string("industry", INDUSTRY),
            segment: reader.nullable_string("segment", SEGMENT),
            description: reader.nullable_string("description", DESCRIPTION),
            tags: reader.nullable_string_list("tags", TAG),
        };
        reader.finish()?;
        Ok(input)
    }

    pub fn into_changes(self) -> CompanyChanges {
        CompanyChanges {
            name: self.name,
            website: self.website.into_change(),
            industry: self.industry.into_change(),
            segment: self.segment.into_change(),
            description: self.description.into_change(),
            tags: self.tags.into_change().map(Option::unwrap_or_default),
        }
    }
}

/// CompanyChanges
///
/// Column-level patch applied by the repository. `None` leaves a column
/// untouched; `Some(None)` writes NULL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompanyChanges {
    pub name: Option<String>,
    pub website: Option<Option<String>>,
    pub industry: Option<Option<String>>,
    pub segment: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
}

impl CompanyChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applies the patch to an in-memory row.
    pub fn apply(&self, company: &mut Company) {
        if let Some(name) = &self.name {
            company.name = name.clone();
        }
        if let Some(website) = &self.website {
            company.website = website.clone();
        }
        if let Some(industry) = &self.industry {
            company.industry = industry.clone();
        }
        if let Some(segment) = &self.segment {
            company.segment = segment.clone();
        }
        if let Some(description) = &self.description {
            company.description = description.clone();
        }
        if let Some(tags) = &self.tags {
            company.tags = tags.clone();
        }
    }
}

/// CompanySearch
///
/// Filter of `GET /api/companies`: `search` matches name, website, industry
/// or segment case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanySearch {
    pub search: Option<String>,
}

impl CompanySearch {
    pub fn from_query(query: &QueryParams) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let search = query.string("search", SEARCH, &mut errors);
        errors.into_result()?;
        Ok(Self { search })
    }
}

/// CompanyResponse
///
/// Wire shape of a company. Optional fields are always present (as `null`
/// when unset) and timestamps are ISO strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CompanyResponse {
    pub id: Uuid,
    pub name: String,
    pub website: Option<String>,
    pub industry: Option<String>,
    pub segment: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    #[schema(example = "2024-01-01T00:00:00.000Z")]
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

impl From<&Company> for CompanyResponse {
    fn from(company: &Company) -> Self {
        Self {
            id: company.id,
            name: company.name.clone(),
            website: company.website.clone(),
            industry: company.industry.clone(),
            segment: company.segment.clone(),
            description: company.description.clone(),
            tags: company.tags.clone(),
            created_at: format_timestamp(&company.created_at),
            updated_at: format_timestamp(&company.updated_at),
            deleted_at: company.deleted_at.as_ref().map(format_timestamp),
        }
    }
}
