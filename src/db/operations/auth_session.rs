use chrono::Utc;
use sqlx::Row;

use crate::db::DatabaseProxy;

#[derive(Debug, Clone)]
pub struct AuthSessionRecord {
    pub user_id: String,
    pub expires_at: i64,
}

pub async fn insert_auth_session(
    proxy: &DatabaseProxy,
    user_id: &str,
    token_hash: &str,
    expires_at: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "auth_sessions" ("id", "userId", "token", "expiresAt", "createdAt")
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(token_hash)
    .bind(expires_at)
    .bind(Utc::now().timestamp_millis())
    .execute(proxy.pool())
    .await?;
    Ok(())
}

pub async fn find_auth_session(
    proxy: &DatabaseProxy,
    token_hash: &str,
) -> Result<Option<AuthSessionRecord>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT "userId", "expiresAt" FROM "auth_sessions" WHERE "token" = ?"#,
    )
    .bind(token_hash)
    .fetch_optional(proxy.pool())
    .await?;

    row.map(|r| {
        Ok(AuthSessionRecord {
            user_id: r.try_get("userId")?,
            expires_at: r.try_get("expiresAt")?,
        })
    })
    .transpose()
}

pub async fn delete_auth_session(proxy: &DatabaseProxy, token_hash: &str) -> Result<(), sqlx::Error> {
    sqlx::query(r#"DELETE FROM "auth_sessions" WHERE "token" = ?"#)
        .bind(token_hash)
        .execute(proxy.pool())
        .await?;
    Ok(())
}

pub async fn delete_user_auth_sessions(
    proxy: &DatabaseProxy,
    user_id: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(r#"DELETE FROM "auth_sessions" WHERE "userId" = ?"#)
        .bind(user_id)
        .execute(proxy.pool())
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_expired_auth_sessions(
    proxy: &DatabaseProxy,
    now_ms: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(r#"DELETE FROM "auth_sessions" WHERE "expiresAt" < ?"#)
        .bind(now_ms)
        .execute(proxy.pool())
        .await?;
    Ok(result.rows_affected())
}
