/// A caller's role, used by the delete permission check (spec §4.4): a
/// `User` may only delete their own files; `Deputy`/`Manager` may delete
/// on behalf of others in the same group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Deputy,
    Manager,
}

/// Resolves the caller's role for a permission check. Injected so the
/// real JASMIN account-service lookup (out of scope, per spec §1) can be
/// swapped in without touching catalog logic; the default always
/// resolves to `Role::User`.
pub trait RoleResolver: Send + Sync {
    fn role_of(&self, user: &str) -> Role;
}

pub struct AlwaysUser;

impl RoleResolver for AlwaysUser {
    fn role_of(&self, _user: &str) -> Role {
        Role::User
    }
}

/// Applies spec §4.4's permission policy for get/delete: the caller's
/// group must match the File's Holding group; delete additionally
/// requires `role != User` if the caller isn't the file's owner.
pub fn check_get(caller_group: &str, holding_group: &str) -> Result<(), crate::Error> {
    if caller_group != holding_group {
        return Err(crate::Error::PermissionDenied {
            caller_group: caller_group.to_string(),
            holding_group: holding_group.to_string(),
        });
    }
    Ok(())
}

pub fn check_delete(
    caller_user: &str,
    caller_group: &str,
    file_owner: &str,
    holding_group: &str,
    role: Role,
) -> Result<(), crate::Error> {
    check_get(caller_group, holding_group)?;
    if caller_user != file_owner && role == Role::User {
        return Err(crate::Error::PermissionDenied {
            caller_group: caller_group.to_string(),
            holding_group: holding_group.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_can_delete_as_plain_user() {
        assert!(check_delete("alice", "users", "alice", "users", Role::User).is_ok());
    }

    #[test]
    fn non_owner_user_cannot_delete() {
        assert!(check_delete("bob", "users", "alice", "users", Role::User).is_err());
    }

    #[test]
    fn deputy_can_delete_on_behalf_of_others() {
        assert!(check_delete("bob", "users", "alice", "users", Role::Deputy).is_ok());
    }

    #[test]
    fn mismatched_group_always_denied() {
        assert!(check_get("outsiders", "users").is_err());
    }
}
