use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::db::{DatabaseProxy, StoreError};

pub const ROLE_USER: &str = "USER";
pub const ROLE_ADMIN: &str = "ADMIN";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub created_at: i64,
    pub updated_at: i64,
}

fn map_user_row(row: SqliteRow) -> Result<UserRecord, sqlx::Error> {
    Ok(UserRecord {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("passwordHash")?,
        role: row.try_get("role")?,
        created_at: row.try_get("createdAt")?,
        updated_at: row.try_get("updatedAt")?,
    })
}

pub async fn insert_user(
    proxy: &DatabaseProxy,
    id: &str,
    email: &str,
    username: &str,
    password_hash: &str,
    role: &str,
) -> Result<UserRecord, StoreError> {
    let now = Utc::now().timestamp_millis();
    let result = sqlx::query(
        r#"
        INSERT INTO "users" ("id", "email", "username", "passwordHash", "role", "createdAt", "updatedAt")
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(email)
    .bind(username)
    .bind(password_hash)
    .bind(role)
    .bind(now)
    .bind(now)
    .execute(proxy.pool())
    .await;

    if let Err(sqlx::Error::Database(db_err)) = &result {
        if db_err.is_unique_violation() {
            return Err(StoreError::Conflict);
        }
    }
    result?;

    Ok(UserRecord {
        id: id.to_string(),
        email: email.to_string(),
        username: username.to_string(),
        password_hash: password_hash.to_string(),
        role: role.to_string(),
        created_at: now,
        updated_at: now,
    })
}

pub async fn find_user_by_email(
    proxy: &DatabaseProxy,
    email: &str,
) -> Result<Option<UserRecord>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT * FROM "users" WHERE "email" = ? LIMIT 1"#)
        .bind(email)
        .fetch_optional(proxy.pool())
        .await?;
    row.map(map_user_row).transpose()
}

pub async fn find_user_by_id(
    proxy: &DatabaseProxy,
    user_id: &str,
) -> Result<Option<UserRecord>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT * FROM "users" WHERE "id" = ? LIMIT 1"#)
        .bind(user_id)
        .fetch_optional(proxy.pool())
        .await?;
    row.map(map_user_row).transpose()
}

const ID_LOOKUP_CHUNK: usize = 500;

/// Usernames for a batch of ids, in no particular order. Large batches are
/// split to stay under SQLite's bound-parameter limit.
pub async fn usernames_by_ids(
    proxy: &DatabaseProxy,
    user_ids: &[String],
) -> Result<Vec<(String, String)>, sqlx::Error> {
    let mut names = Vec::with_capacity(user_ids.len());
    for chunk in user_ids.chunks(ID_LOOKUP_CHUNK) {
        let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
            r#"SELECT "id", "username" FROM "users" WHERE "id" IN ("#,
        );
        let mut separated = qb.separated(", ");
        for id in chunk {
            separated.push_bind(id.clone());
        }
        separated.push_unseparated(")");

        for row in qb.build().fetch_all(proxy.pool()).await? {
            names.push((row.try_get("id")?, row.try_get("username")?));
        }
    }
    Ok(names)
}

pub async fn update_username(
    proxy: &DatabaseProxy,
    user_id: &str,
    username: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(r#"UPDATE "users" SET "username" = ?, "updatedAt" = ? WHERE "id" = ?"#)
        .bind(username)
        .bind(Utc::now().timestamp_millis())
        .bind(user_id)
        .execute(proxy.pool())
        .await?;
    Ok(())
}

pub async fn set_user_role(
    proxy: &DatabaseProxy,
    user_id: &str,
    role: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(r#"UPDATE "users" SET "role" = ?, "updatedAt" = ? WHERE "id" = ?"#)
        .bind(role)
        .bind(Utc::now().timestamp_millis())
        .bind(user_id)
        .execute(proxy.pool())
        .await?;
    Ok(())
}

/// Auth sessions go with the row through `ON DELETE CASCADE`.
pub async fn delete_user(proxy: &DatabaseProxy, user_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(r#"DELETE FROM "users" WHERE "id" = ?"#)
        .bind(user_id)
        .execute(proxy.pool())
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn count_users(proxy: &DatabaseProxy) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(r#"SELECT COUNT(*) FROM "users""#)
        .fetch_one(proxy.pool())
        .await
}
