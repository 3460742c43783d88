//! User database operations and token authentication

use serde::Deserialize;
use setlist_common::api::auth::{generate_token, hash_token};
use setlist_common::db::models::{User, UserLevel};
use setlist_common::uuid_utils::{generate, parse_column};
use setlist_common::{time, Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{info, warn};
use uuid::Uuid;

use super::access::require_level;
use super::{begin_write, optional_text, required_text};

const USER_COLUMNS: &str = "id, name, email, role, user_level, created_at, updated_at";

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub role: Option<String>,
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    Ok(User {
        id: parse_column(&row.try_get::<String, _>("id")?)?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        role: row.try_get("role")?,
        user_level: UserLevel::try_from(row.try_get::<i64, _>("user_level")?)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

async fn load_user(conn: &mut SqliteConnection, id: Uuid) -> Result<User> {
    let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("User {}", id)))?;
    user_from_row(&row)
}

/// Register a user; returns the user and the bearer token (shown only once)
///
/// The very first user becomes an admin.
pub async fn create_user(pool: &SqlitePool, new_user: NewUser) -> Result<(User, String)> {
    let name = required_text("name", &new_user.name)?;
    let email = required_text("email", &new_user.email)?;
    if !email.contains('@') {
        return Err(Error::InvalidInput(format!("'{}' is not an email address", email)));
    }
    let role = optional_text(new_user.role);

    let mut tx = begin_write(pool).await?;

    let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = ? COLLATE NOCASE)")
        .bind(&email)
        .fetch_one(&mut *tx)
        .await?;
    if taken {
        return Err(Error::Conflict("A user with this email already exists.".to_string()));
    }

    let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&mut *tx)
        .await?;
    let level = if user_count == 0 {
        UserLevel::Admin
    } else {
        UserLevel::Member
    };

    let id = generate();
    let token = generate_token();
    let now = time::now_string();

    sqlx::query(
        r#"
        INSERT INTO users (id, name, email, role, user_level, token_hash, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(&name)
    .bind(&email)
    .bind(&role)
    .bind(i64::from(level))
    .bind(hash_token(&token))
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    let user = load_user(&mut tx, id).await?;
    tx.commit().await?;

    info!(user_id = %id, level = i64::from(level), "User registered");
    Ok((user, token))
}

/// Resolve a bearer token to its user
pub async fn authenticate(pool: &SqlitePool, token: &str) -> Result<User> {
    let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE token_hash = ?"))
        .bind(hash_token(token))
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => user_from_row(&row),
        None => {
            warn!("Rejected unknown bearer token");
            Err(Error::Unauthorized("Invalid or expired token".to_string()))
        }
    }
}

pub async fn get_user(pool: &SqlitePool, id: Uuid) -> Result<User> {
    let mut conn = pool.acquire().await?;
    load_user(&mut conn, id).await
}

pub async fn list_users(pool: &SqlitePool) -> Result<Vec<User>> {
    let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY name COLLATE NOCASE"))
        .fetch_all(pool)
        .await?;
    rows.iter().map(user_from_row).collect()
}

/// Change the caller's own name and/or role
pub async fn update_profile(pool: &SqlitePool, user: &User, update: ProfileUpdate) -> Result<User> {
    let name = match update.name {
        Some(name) => required_text("name", &name)?,
        None => user.name.clone(),
    };
    let role = match update.role {
        Some(role) => optional_text(Some(role)),
        None => user.role.clone(),
    };

    let mut tx = begin_write(pool).await?;
    sqlx::query("UPDATE users SET name = ?, role = ?, updated_at = ? WHERE id = ?")
        .bind(&name)
        .bind(&role)
        .bind(time::now_string())
        .bind(user.id.to_string())
        .execute(&mut *tx)
        .await?;
    let updated = load_user(&mut tx, user.id).await?;
    tx.commit().await?;

    Ok(updated)
}

/// Admin-only: change another user's authorization tier
///
/// The last remaining admin cannot demote themselves.
pub async fn set_user_level(pool: &SqlitePool, actor: &User, id: Uuid, level: UserLevel) -> Result<User> {
    require_level(actor, UserLevel::Admin, "Changing user levels")?;

    let mut tx = begin_write(pool).await?;
    let target = load_user(&mut tx, id).await?;

    if target.is_admin() && level != UserLevel::Admin {
        let admins: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE user_level = 3")
            .fetch_one(&mut *tx)
            .await?;
        if admins <= 1 {
            return Err(Error::InvalidInput("Cannot demote the last admin".to_string()));
        }
    }

    sqlx::query("UPDATE users SET user_level = ?, updated_at = ? WHERE id = ?")
        .bind(i64::from(level))
        .bind(time::now_string())
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    let updated = load_user(&mut tx, id).await?;
    tx.commit().await?;

    info!(user_id = %id, level = i64::from(level), by = %actor.id, "User level changed");
    Ok(updated)
}

/// Replace the caller's token; the old one stops working immediately
pub async fn rotate_token(pool: &SqlitePool, user: &User) -> Result<String> {
    let token = generate_token();
    sqlx::query("UPDATE users SET token_hash = ?, updated_at = ? WHERE id = ?")
        .bind(hash_token(&token))
        .bind(time::now_string())
        .bind(user.id.to_string())
        .execute(pool)
        .await?;

    info!(user_id = %user.id, "Token rotated");
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support;

    fn new_user(name: &str, email: &str) -> NewUser {
        NewUser {
            name: name.to_string(),
            email: email.to_string(),
            role: Some("vocals".to_string()),
        }
    }

    #[tokio::test]
    async fn test_first_user_is_admin() {
        let pool = test_support::pool().await;

        let (first, _) = create_user(&pool, new_user("Freddie", "freddie@example.com")).await.unwrap();
        let (second, _) = create_user(&pool, new_user("Brian", "brian@example.com")).await.unwrap();

        assert_eq!(first.user_level, UserLevel::Admin);
        assert_eq!(second.user_level, UserLevel::Member);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let pool = test_support::pool().await;

        create_user(&pool, new_user("Freddie", "freddie@example.com")).await.unwrap();
        let result = create_user(&pool, new_user("Other", "FREDDIE@example.com")).await;
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_token_authenticates_and_rotates() {
        let pool = test_support::pool().await;

        let (user, token) = create_user(&pool, new_user("Freddie", "freddie@example.com")).await.unwrap();
        assert_eq!(authenticate(&pool, &token).await.unwrap().id, user.id);

        let new_token = rotate_token(&pool, &user).await.unwrap();
        assert!(matches!(
            authenticate(&pool, &token).await,
            Err(Error::Unauthorized(_))
        ));
        assert_eq!(authenticate(&pool, &new_token).await.unwrap().id, user.id);
    }

    #[tokio::test]
    async fn test_level_changes_need_admin() {
        let pool = test_support::pool().await;

        let (admin, _) = create_user(&pool, new_user("Freddie", "freddie@example.com")).await.unwrap();
        let (member, _) = create_user(&pool, new_user("John", "john@example.com")).await.unwrap();

        assert!(matches!(
            set_user_level(&pool, &member, admin.id, UserLevel::Member).await,
            Err(Error::Forbidden(_))
        ));

        let promoted = set_user_level(&pool, &admin, member.id, UserLevel::Editor).await.unwrap();
        assert_eq!(promoted.user_level, UserLevel::Editor);

        assert!(matches!(
            set_user_level(&pool, &admin, admin.id, UserLevel::Member).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_update_profile_keeps_unspecified_fields() {
        let pool = test_support::pool().await;

        let (user, _) = create_user(&pool, new_user("Freddie", "freddie@example.com")).await.unwrap();
        let updated = update_profile(
            &pool,
            &user,
            ProfileUpdate {
                name: Some("Freddie Mercury".into()),
                role: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.name, "Freddie Mercury");
        assert_eq!(updated.role.as_deref(), Some("vocals"));
    }
}
