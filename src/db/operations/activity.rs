use sqlx::Row;

use crate::db::{Collection, DatabaseProxy};

/// Activity events per user for one module since `since_ms`, busiest first.
pub async fn count_module_activity(
    proxy: &DatabaseProxy,
    module: &str,
    since_ms: i64,
) -> Result<Vec<(String, i64)>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT "ownerId", COUNT(*) AS "events"
        FROM "documents"
        WHERE "collection" = ?
          AND "ownerId" IS NOT NULL
          AND json_extract("data", '$.module') = ?
          AND "createdAt" >= ?
        GROUP BY "ownerId"
        ORDER BY "events" DESC
        "#,
    )
    .bind(Collection::Activity.as_str())
    .bind(module)
    .bind(since_ms)
    .fetch_all(proxy.pool())
    .await?;

    rows.into_iter()
        .map(|row| Ok((row.try_get("ownerId")?, row.try_get("events")?)))
        .collect()
}

pub async fn delete_activity_before(
    proxy: &DatabaseProxy,
    before_ms: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"DELETE FROM "documents" WHERE "collection" = ? AND "createdAt" < ?"#,
    )
    .bind(Collection::Activity.as_str())
    .bind(before_ms)
    .execute(proxy.pool())
    .await?;
    Ok(result.rows_affected())
}
