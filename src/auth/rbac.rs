use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use super::SessionUser;
use crate::error::ApiError;

/// Role
///
/// CRM roles ordered by privilege weight. Requirements are hierarchical:
/// a role satisfies every requirement whose weight is not above its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum Role {
    Admin,
    Manager,
    Sales,
    Viewer,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Manager, Role::Sales, Role::Viewer];

    pub fn weight(self) -> u8 {
        match self {
            Role::Admin => 4,
            Role::Manager => 3,
            Role::Sales => 2,
            Role::Viewer => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Manager => "MANAGER",
            Role::Sales => "SALES",
            Role::Viewer => "VIEWER",
        }
    }

    pub fn satisfies(self, required: Role) -> bool {
        self.weight() >= required.weight()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == value)
            .ok_or_else(|| value.to_string())
    }
}

/// True when `user` meets at least one of the `required` roles.
pub fn can_access(user: &SessionUser, required: &[Role]) -> bool {
    required.iter().any(|role| user.role.satisfies(*role))
}

/// require_role
///
/// Authorization check for the role-gated endpoints. Pure; fails with
/// Forbidden when none of the `required` roles is met.
pub fn require_role<'a>(user: &'a SessionUser, required: &[Role]) -> Result<&'a SessionUser, ApiError> {
    if can_access(user, required) {
        Ok(user)
    } else {
        Err(ApiError::forbidden("Insufficient role for requested action"))
    }
}
