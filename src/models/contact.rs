use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{SEGMENT, TAG, format_timestamp};
use crate::validation::{
    Format, ObjectReader, Patch, QueryParams, StringRule, ValidationErrors, parse_uuid,
};

const COMPANY_ID: StringRule = StringRule::format(Format::Uuid);
const PERSON_NAME: StringRule = StringRule::length(1, 120);
const EMAIL: StringRule = StringRule::format(Format::Email);
const PHONE: StringRule = StringRule::length(5, 32);
const NOTES: StringRule = StringRule::length(1, 1024);

const FIELDS: &[&str] = &[
    "companyId",
    "firstName",
    "lastName",
    "email",
    "phone",
    "jobTitle",
    "segment",
    "tags",
    "notes",
];

pub const CHANNEL_REQUIRED: &str = "Either email or phone must be provided";

/// Contact
///
/// A row of the `contacts` table. Soft-deleted the same way as companies.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Contact {
    pub id: Uuid,
    pub company_id: Uuid,
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub job_title: Option<String>,
    pub segment: Option<String>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Contact {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

// The reader stores "" for a missing required value; the recorded error
// makes `finish` fail before the nil id could be used.
fn company_id(raw: Option<String>) -> Option<Uuid> {
    raw.as_deref().and_then(parse_uuid)
}

/// ContactCreateInput
///
/// Validated body of `POST /api/contacts`. At least one of `email` and
/// `phone` is required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ContactCreateInput {
    pub company_id: Uuid,
    #[schema(example = "Ada")]
    pub first_name: String,
    pub last_name: Option<String>,
    #[schema(example = "ada@acme.example")]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub job_title: Option<String>,
    pub segment: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub notes: Option<String>,
}

/// Insert payload handed to the repository.
pub type NewContact = ContactCreateInput;

impl ContactCreateInput {
    pub fn parse(body: &Value) -> Result<Self, ValidationErrors> {
        let mut reader = ObjectReader::new(body, FIELDS)?;
        let raw_company_id = reader.required_string("companyId", COMPANY_ID);
        let input = Self {
            company_id: company_id(Some(raw_company_id)).unwrap_or_default(),
            first_name: reader.required_string("firstName", PERSON_NAME),
            last_name: reader.nullable_string("lastName", PERSON_NAME).into_value(),
            email: reader.nullable_string("email", EMAIL).into_value(),
            phone: reader.nullable_string("phone", PHONE).into_value(),
            job_title: reader.nullable_string("jobTitle", PERSON_NAME).into_value(),
            segment: reader.nullable_string("segment", SEGMENT).into_value(),
            tags: reader
                .nullable_string_list("tags", TAG)
                .into_value()
                .unwrap_or_default(),
            notes: reader.nullable_string("notes", NOTES).into_value(),
        };

        let channel_invalid = reader.has_field_error("email") || reader.has_field_error("phone");
        if !channel_invalid && input.email.is_none() && input.phone.is_none() {
            reader.add_field_error("email", CHANNEL_REQUIRED);
        }

        reader.finish()?;
        Ok(input)
    }
}

/// ContactUpdateInput
///
/// Validated body of `PATCH /api/contacts/{id}`. When the patch touches
/// `email` or `phone`, at least one of them must carry a value in the patch
/// itself.
#[derive(Debug, Clone, Default, PartialEq, ToSchema)]
#[schema(rename_all = "camelCase")]
pub struct ContactUpdateInput {
    pub company_id: Option<Uuid>,
    pub first_name: Option<String>,
    #[schema(value_type = Option<String>, nullable)]
    pub last_name: Patch<String>,
    #[schema(value_type = Option<String>, nullable)]
    pub email: Patch<String>,
    #[schema(value_type = Option<String>, nullable)]
    pub phone: Patch<String>,
    #[schema(value_type = Option<String>, nullable)]
    pub job_title: Patch<String>,
    #[schema(value_type = Option<String>, nullable)]
    pub segment: Patch<String>,
    #[schema(value_type = Option<Vec<String>>, nullable)]
    pub tags: Patch<Vec<String>>,
    #[schema(value_type = Option<String>, nullable)]
    pub notes: Patch<String>,
}

impl ContactUpdateInput {
    pub fn parse(body: &Value) -> Result<Self, ValidationErrors> {
        let mut reader = ObjectReader::new(body, FIELDS)?;
        let raw_company_id = reader.optional_string("companyId", COMPANY_ID);
        let input = Self {
            company_id: company_id(raw_company_id),
            first_name: reader.optional_string("firstName", PERSON_NAME),
            last_name: reader.nullable_string("lastName", PERSON_NAME),
            email: reader.nullable_string("email", EMAIL),
            phone: reader.nullable_string("phone", PHONE),
            job_title: reader.nullable_string("jobTitle", PERSON_NAME),
            segment: reader.nullable_string("segment", SEGMENT),
            tags: reader.nullable_string_list("tags", TAG),
            notes: reader.nullable_string("notes", NOTES),
        };

        let channel_invalid = reader.has_field_error("email") || reader.has_field_error("phone");
        let channel_touched = input.email.is_present() || input.phone.is_present();
        let channel_kept = input.email.as_value().is_some() || input.phone.as_value().is_some();
        if !channel_invalid && channel_touched && !channel_kept {
            reader.add_field_error("email", CHANNEL_REQUIRED);
        }

        reader.finish()?;
        Ok(input)
    }

    pub fn into_changes(self) -> ContactChanges {
        ContactChanges {
            company_id: self.company_id,
            first_name: self.first_name,
            last_name: self.last_name.into_change(),
            email: self.email.into_change(),
            phone: self.phone.into_change(),
            job_title: self.job_title.into_change(),
            segment: self.segment.into_change(),
            tags: self.tags.into_change().map(Option::unwrap_or_default),
            notes: self.notes.into_change(),
        }
    }
}

/// ContactChanges
///
/// Column-level patch; same conventions as `CompanyChanges`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContactChanges {
    pub company_id: Option<Uuid>,
    pub first_name: Option<String>,
    pub last_name: Option<Option<String>>,
    pub email: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub job_title: Option<Option<String>>,
    pub segment: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub notes: Option<Option<String>>,
}

impl ContactChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, contact: &mut Contact) {
        if let Some(company_id) = self.company_id {
            contact.company_id = company_id;
        }
        if let Some(first_name) = &self.first_name {
            contact.first_name = first_name.clone();
        }
        if let Some(last_name) = &self.last_name {
            contact.last_name = last_name.clone();
        }
        if let Some(email) = &self.email {
            contact.email = email.clone();
        }
        if let Some(phone) = &self.phone {
            contact.phone = phone.clone();
        }
        if let Some(job_title) = &self.job_title {
            contact.job_title = job_title.clone();
        }
        if let Some(segment) = &self.segment {
            contact.segment = segment.clone();
        }
        if let Some(tags) = &self.tags {
            contact.tags = tags.clone();
        }
        if let Some(notes) = &self.notes {
            contact.notes = notes.clone();
        }
    }
}

/// ContactFilterQuery
///
/// Filters of `GET /api/contacts`. `tag` may repeat; a contact matches when
/// it carries any of the given tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactFilterQuery {
    pub company_id: Option<Uuid>,
    pub segment: Option<String>,
    pub tags: Vec<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl ContactFilterQuery {
    pub fn from_query(query: &QueryParams) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let company_id = query
            .string("companyId", COMPANY_ID, &mut errors)
            .as_deref()
            .and_then(parse_uuid);
        let segment = query.string("segment", SEGMENT, &mut errors);
        let email = query.string("email", EMAIL, &mut errors);
        let phone = query.string("phone", PHONE, &mut errors);

        let mut tags = Vec::new();
        for tag in query.get_all("tag") {
            let issues = TAG.check(tag);
            if issues.is_empty() {
                tags.push(tag.to_string());
            }
            for issue in issues {
                errors.add_field_error("tag", issue);
            }
        }

        errors.into_result()?;
        Ok(Self {
            company_id,
            segment,
            tags,
            email,
            phone,
        })
    }
}

/// ContactResponse
///
/// Wire shape of a contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ContactResponse {
    pub id: Uuid,
    pub company_id: Uuid,
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub job_title: Option<String>,
    pub segment: Option<String>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

impl From<&Contact> for ContactResponse {
    fn from(contact: &Contact) -> Self {
        Self {
            id: contact.id,
            company_id: contact.company_id,
            first_name: contact.first_name.clone(),
            last_name: contact.last_name.clone(),
            email: contact.email.clone(),
            phone: contact.phone.clone(),
            job_title: contact.job_title.clone(),
            segment: contact.segment.clone(),
            tags: contact.tags.clone(),
            notes: contact.notes.clone(),
            created_at: format_timestamp(&contact.created_at),
            updated_at: format_timestamp(&contact.updated_at),
            deleted_at: contact.deleted_at.as_ref().map(format_timestamp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COMPANY: &str = "11111111-1111-1111-1111-111111111111";

    #[test]
    fn test_create_requires_a_channel() {
        let err = ContactCreateInput::parse(&json!({
            "companyId": COMPANY,
            "firstName": "Ada"
        }))
        .unwrap_err();
        assert_eq!(err.field("email").unwrap(), [CHANNEL_REQUIRED]);

        let input = ContactCreateInput::parse(&json!({
            "companyId": COMPANY,
            "firstName": "Ada",
            "phone": "+353 1 555"
        }))
        .unwrap();
        assert_eq!(input.company_id.to_string(), COMPANY);
        assert_eq!(input.phone.as_deref(), Some("+353 1 555"));
    }

    #[test]
    fn test_invalid_email_is_not_also_reported_as_missing() {
        let err = ContactCreateInput::parse(&json!({
            "companyId": COMPANY,
            "firstName": "Ada",
            "email": "nope"
        }))
        .unwrap_err();
        assert_eq!(err.field("email").unwrap(), ["Invalid email"]);
    }

    #[test]
    fn test_create_rejects_bad_company_id_and_null_first_name() {
        let err = ContactCreateInput::parse(&json!({
            "companyId": "abc",
            "firstName": null,
            "email": "ada@acme.example"
        }))
        .unwrap_err();
        assert_eq!(err.field("companyId").unwrap(), ["Invalid uuid"]);
        assert_eq!(err.field("firstName").unwrap(), ["Expected string, received null"]);
    }

    #[test]
    fn test_update_channel_rule_only_when_touched() {
        assert!(ContactUpdateInput::parse(&json!({ "notes": "met at expo" })).is_ok());
        assert!(ContactUpdateInput::parse(&json!({ "email": null, "phone": "12345" })).is_ok());

        let err = ContactUpdateInput::parse(&json!({ "email": null })).unwrap_err();
        assert_eq!(err.field("email").unwrap(), [CHANNEL_REQUIRED]);
    }

    #[test]
    fn test_update_changes_clear_on_null() {
        let changes = ContactUpdateInput::parse(&json!({
            "jobTitle": null,
            "tags": null,
            "email": "ada@acme.example"
        }))
        .unwrap()
        .into_changes();
        assert_eq!(changes.job_title, Some(None));
        assert_eq!(changes.tags, Some(vec![]));
        assert_eq!(changes.email, Some(Some("ada@acme.example".to_string())));
        assert_eq!(changes.last_name, None);
    }

    #[test]
    fn test_filter_reads_repeated_tags() {
        let filter = ContactFilterQuery::from_query(&QueryParams::parse(Some(
            "tag=vip&tag=partner&segment=SMB&unknown=1",
        )))
        .unwrap();
        assert_eq!(filter.tags, vec!["vip", "partner"]);
        assert_eq!(filter.segment.as_deref(), Some("SMB"));

        let err = ContactFilterQuery::from_query(&QueryParams::parse(Some(
            "companyId=nope&phone=12&tag=",
        )))
        .unwrap_err();
        assert!(err.field("companyId").is_some());
        assert!(err.field("phone").is_some());
        assert!(err.field("tag").is_some());
    }
}
