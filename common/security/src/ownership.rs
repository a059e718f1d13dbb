use crate::context::SecurityContext;
use crate::SecurityError;

/// Enforces that the caller either owns `resource_owner_id` or holds the
/// Admin role (the "Owner/Admin" auth column throughout).
pub fn ensure_owner_or_admin(ctx: &SecurityContext, resource_owner_id: &str) -> Result<(), SecurityError> {
    if ctx.is_admin() || ctx.owns(resource_owner_id) {
        Ok(())
    } else {
        Err(SecurityError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::Role;
    use uuid::Uuid;

    fn ctx(user_id: &str, roles: Vec<Role>) -> SecurityContext {
        SecurityContext { user_id: user_id.to_string(), roles, trace_id: Uuid::new_v4() }
    }

    #[test]
    fn owner_may_access_own_resource() {
        let c = ctx("user-1", vec![Role::Listener]);
        assert!(ensure_owner_or_admin(&c, "user-1").is_ok());
    }

    #[test]
    fn non_owner_non_admin_is_denied() {
        let c = ctx("user-1", vec![Role::Listener]);
        assert!(ensure_owner_or_admin(&c, "user-2").is_err());
    }

    #[test]
    fn admin_may_access_any_resource() {
        let c = ctx("user-1", vec![Role::Admin]);
        assert!(ensure_owner_or_admin(&c, "user-2").is_ok());
    }
}

