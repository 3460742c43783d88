//! Authorization checks
//!
//! Levels: 1 = member, 2 = editor, 3 = admin. Owned entities (setlists,
//! templates, collections) are visible to their owner, to admins, and to
//! everyone when public; only the owner or an admin may change them.

use setlist_common::db::models::{User, UserLevel};
use setlist_common::{Error, Result};
use uuid::Uuid;

/// Require at least `level`
pub fn require_level(user: &User, level: UserLevel, action: &str) -> Result<()> {
    if user.user_level >= level {
        Ok(())
    } else {
        Err(Error::Forbidden(format!(
            "{} requires {} access",
            action,
            level_name(level)
        )))
    }
}

/// Require the caller to own the entity or be an admin
pub fn require_owner_or_admin(user: &User, owner_id: Uuid, what: &str) -> Result<()> {
    if user.id == owner_id || user.is_admin() {
        Ok(())
    } else {
        Err(Error::Forbidden(format!("Only the owner can modify this {}", what)))
    }
}

/// Whether the caller may read an owned entity
pub fn can_view(user: &User, owner_id: Uuid, is_public: bool) -> bool {
    is_public || user.id == owner_id || user.is_admin()
}

fn level_name(level: UserLevel) -> &'static str {
    match level {
        UserLevel::Member => "member",
        UserLevel::Editor => "editor",
        UserLevel::Admin => "admin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(level: UserLevel) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Brian".into(),
            email: "brian@example.com".into(),
            role: Some("guitar".into()),
            user_level: level,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_require_level() {
        assert!(require_level(&user(UserLevel::Editor), UserLevel::Editor, "Editing songs").is_ok());
        assert!(require_level(&user(UserLevel::Admin), UserLevel::Editor, "Editing songs").is_ok());
        let err = require_level(&user(UserLevel::Member), UserLevel::Editor, "Editing songs").unwrap_err();
        assert!(matches!(err, Error::Forbidden(msg) if msg.contains("editor")));
    }

    #[test]
    fn test_owner_or_admin() {
        let owner = user(UserLevel::Member);
        let other = user(UserLevel::Editor);
        let admin = user(UserLevel::Admin);
        assert!(require_owner_or_admin(&owner, owner.id, "setlist").is_ok());
        assert!(require_owner_or_admin(&admin, owner.id, "setlist").is_ok());
        assert!(require_owner_or_admin(&other, owner.id, "setlist").is_err());
    }

    #[test]
    fn test_can_view() {
        let owner = user(UserLevel::Member);
        let other = user(UserLevel::Member);
        assert!(can_view(&owner, owner.id, false));
        assert!(!can_view(&other, owner.id, false));
        assert!(can_view(&other, owner.id, true));
    }
}
