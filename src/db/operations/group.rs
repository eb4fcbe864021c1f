use sqlx::Row;

use crate::db::{Collection, DatabaseProxy};

/// Ids of groups whose member list contains `user_id`, newest first.
pub async fn group_ids_for_member(
    proxy: &DatabaseProxy,
    user_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT d."id"
        FROM "documents" d
        WHERE d."collection" = ?
          AND EXISTS (
            SELECT 1 FROM json_each(d."data", '$.members') m
            WHERE json_extract(m."value", '$.userId') = ?
          )
        ORDER BY d."createdAt" DESC
        "#,
    )
    .bind(Collection::Groups.as_str())
    .bind(user_id)
    .fetch_all(proxy.pool())
    .await?;

    rows.into_iter().map(|row| row.try_get("id")).collect()
}
