use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::validation::{QueryParams, ValidationErrors};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// PageWindow
///
/// Offset/limit pair handed to the repository list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub skip: i64,
    pub take: i64,
}

/// PaginationParams
///
/// Validated `page`/`pageSize` query values. Out-of-range or non-integer
/// input is a validation failure, never clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationParams {
    pub page: u32,
    pub page_size: u32,
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PaginationParams {
    pub fn from_query(query: &QueryParams) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let page = read_bounded(query, "page", DEFAULT_PAGE, None, &mut errors);
        let page_size = read_bounded(
            query,
            "pageSize",
            DEFAULT_PAGE_SIZE,
            Some(MAX_PAGE_SIZE),
            &mut errors,
        );
        errors.into_result()?;
        Ok(Self { page, page_size })
    }

    pub fn skip(&self) -> i64 {
        (i64::from(self.page) - 1) * i64::from(self.page_size)
    }

    pub fn take(&self) -> i64 {
        i64::from(self.page_size)
    }

    pub fn window(&self) -> PageWindow {
        PageWindow {
            skip: self.skip(),
            take: self.take(),
        }
    }
}

fn read_bounded(
    query: &QueryParams,
    key: &str,
    default: u32,
    max: Option<u32>,
    errors: &mut ValidationErrors,
) -> u32 {
    let Some(raw) = query.get(key) else {
        return default;
    };

    let Ok(number) = raw.trim().parse::<f64>() else {
        errors.add_field_error(key, "Expected number, received nan");
        return default;
    };
    if !number.is_finite() || number.fract() != 0.0 {
        errors.add_field_error(key, "Expected integer, received float");
        return default;
    }
    if number < 1.0 {
        errors.add_field_error(key, "Number must be greater than or equal to 1");
        return default;
    }
    if let Some(max) = max {
        if number > f64::from(max) {
            errors.add_field_error(key, format!("Number must be less than or equal to {}", max));
            return default;
        }
    }
    if number > f64::from(u32::MAX) {
        errors.add_field_error(key, format!("Number must be less than or equal to {}", u32::MAX));
        return default;
    }
    number as u32
}

/// PaginationMeta
///
/// Response metadata accompanying every list payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PaginationMeta {
    pub page: u32,
    pub page_size: u32,
    pub total_items: i64,
    pub total_pages: i64,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

impl PaginationMeta {
    pub fn new(total_items: i64, params: &PaginationParams) -> Self {
        let page_size = i64::from(params.page_size);
        let total_items = total_items.max(0);
        let total_pages = ((total_items + page_size - 1) / page_size).max(1);
        let page = i64::from(params.page);

        Self {
            page: params.page,
            page_size: params.page_size,
            total_items,
            total_pages,
            has_next_page: page < total_pages,
            has_previous_page: page > 1,
        }
    }
}
