use std::str::FromStr;

use crate::context::SecurityContext;
use crate::SecurityError;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Listener,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Listener => "Listener",
            Role::Admin => "Admin",
        }
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Listener" => Ok(Role::Listener),
            "Admin" => Ok(Role::Admin),
            _ => Err(()),
        }
    }
}

pub fn ensure_role(ctx: &SecurityContext, required: Role) -> Result<(), SecurityError> {
    if ctx.roles.contains(&required) {
        return Ok(());
    }
    warn!(user_id = %ctx.user_id, ?required, roles = ?ctx.roles, "role_check_failed");
    Err(SecurityError::Forbidden)
}

pub fn ensure_any_role(ctx: &SecurityContext, required: &[Role]) -> Result<(), SecurityError> {
    if ctx.roles.iter().any(|r| required.contains(r)) {
        return Ok(());
    }
    warn!(user_id = %ctx.user_id, ?required, roles = ?ctx.roles, "any_role_check_failed");
    Err(SecurityError::Forbidden)
}

