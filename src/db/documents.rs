//! JSON document storage on top of the `documents` table.
//!
//! Every domain record lives in a named collection, keyed by `(collection, id)`
//! and tagged with the owning user. Writes that go through [`update`] are
//! versioned: a stale `expected_version` yields [`StoreError::Conflict`].

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use super::{DatabaseProxy, StoreError};

pub const CONFLICT_RETRY_ATTEMPTS: usize = 3;
pub const CONFLICT_RETRY_BACKOFF: Duration = Duration::from_millis(50);

const SELECT_COLUMNS: &str =
    r#"SELECT "id", "ownerId", "data", "version", "createdAt", "updatedAt" FROM "documents""#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    LearningSessions,
    UserProfiles,
    Vocabulary,
    Gamification,
    Activity,
    Leaderboards,
    Groups,
    Feedback,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LearningSessions => "learning_sessions",
            Self::UserProfiles => "user_profiles",
            Self::Vocabulary => "vocabulary",
            Self::Gamification => "gamification",
            Self::Activity => "activity",
            Self::Leaderboards => "leaderboards",
            Self::Groups => "groups",
            Self::Feedback => "feedback",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Document<T> {
    pub id: String,
    pub owner_id: Option<String>,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub data: T,
}

#[derive(Debug, Clone, Default)]
pub struct DocFilter {
    owner_id: Option<String>,
    fields: Vec<(String, String)>,
    created_since: Option<i64>,
    limit: Option<i64>,
    offset: i64,
}

impl DocFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    /// Equality on a top-level string field of the JSON body.
    pub fn field_eq(mut self, field: &str, value: impl Into<String>) -> Self {
        self.fields.push((format!("$.{field}"), value.into()));
        self
    }

    pub fn created_since(mut self, timestamp_ms: i64) -> Self {
        self.created_since = Some(timestamp_ms);
        self
    }

    pub fn page(mut self, limit: i64, offset: i64) -> Self {
        self.limit = Some(limit);
        self.offset = offset.max(0);
        self
    }

    fn push_where<'a>(&self, qb: &mut QueryBuilder<'a, Sqlite>, collection: Collection) {
        qb.push(r#" WHERE "collection" = "#)
            .push_bind(collection.as_str());
        if let Some(owner_id) = &self.owner_id {
            qb.push(r#" AND "ownerId" = "#).push_bind(owner_id.clone());
        }
        for (path, value) in &self.fields {
            qb.push(r#" AND json_extract("data", "#)
                .push_bind(path.clone())
                .push(") = ")
                .push_bind(value.clone());
        }
        if let Some(since) = self.created_since {
            qb.push(r#" AND "createdAt" >= "#).push_bind(since);
        }
    }
}

fn map_row<T: DeserializeOwned>(row: SqliteRow) -> Result<Document<T>, StoreError> {
    let payload: String = row.try_get("data")?;
    Ok(Document {
        id: row.try_get("id")?,
        owner_id: row.try_get("ownerId")?,
        version: row.try_get("version")?,
        created_at: row.try_get("createdAt")?,
        updated_at: row.try_get("updatedAt")?,
        data: serde_json::from_str(&payload)?,
    })
}

fn map_write_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StoreError::Conflict;
        }
    }
    StoreError::Sqlx(err)
}

pub async fn insert<T: Serialize>(
    proxy: &DatabaseProxy,
    collection: Collection,
    id: &str,
    owner_id: Option<&str>,
    data: &T,
) -> Result<i64, StoreError> {
    let now = Utc::now().timestamp_millis();
    let payload = serde_json::to_string(data)?;

    sqlx::query(
        r#"
        INSERT INTO "documents" ("collection", "id", "ownerId", "data", "version", "createdAt", "updatedAt")
        VALUES (?, ?, ?, ?, 1, ?, ?)
        "#,
    )
    .bind(collection.as_str())
    .bind(id)
    .bind(owner_id)
    .bind(payload)
    .bind(now)
    .bind(now)
    .execute(proxy.pool())
    .await
    .map_err(map_write_error)?;

    Ok(now)
}

pub async fn get<T: DeserializeOwned>(
    proxy: &DatabaseProxy,
    collection: Collection,
    id: &str,
) -> Result<Option<Document<T>>, StoreError> {
    let row = sqlx::query(&format!(
        r#"{SELECT_COLUMNS} WHERE "collection" = ? AND "id" = ?"#
    ))
    .bind(collection.as_str())
    .bind(id)
    .fetch_optional(proxy.pool())
    .await?;

    row.map(map_row).transpose()
}

/// Fetches a document and checks it belongs to `owner_id`.
pub async fn get_owned<T: DeserializeOwned>(
    proxy: &DatabaseProxy,
    collection: Collection,
    id: &str,
    owner_id: &str,
) -> Result<Document<T>, StoreError> {
    let doc = get::<T>(proxy, collection, id)
        .await?
        .ok_or(StoreError::NotFound)?;
    if doc.owner_id.as_deref() != Some(owner_id) {
        return Err(StoreError::Forbidden);
    }
    Ok(doc)
}

pub async fn list<T: DeserializeOwned>(
    proxy: &DatabaseProxy,
    collection: Collection,
    filter: &DocFilter,
) -> Result<Vec<Document<T>>, StoreError> {
    let mut qb = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
    filter.push_where(&mut qb, collection);
    qb.push(r#" ORDER BY "createdAt" DESC, "id" ASC"#);
    if let Some(limit) = filter.limit {
        qb.push(" LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);
    }

    let rows = qb.build().fetch_all(proxy.pool()).await?;
    rows.into_iter().map(map_row).collect()
}

pub async fn count(
    proxy: &DatabaseProxy,
    collection: Collection,
    filter: &DocFilter,
) -> Result<i64, StoreError> {
    let mut qb = QueryBuilder::<Sqlite>::new(r#"SELECT COUNT(*) FROM "documents""#);
    filter.push_where(&mut qb, collection);
    let total = qb
        .build_query_scalar::<i64>()
        .fetch_one(proxy.pool())
        .await?;
    Ok(total)
}

/// Replaces the body if the stored version still equals `expected_version`.
/// Returns the new version.
pub async fn update<T: Serialize>(
    proxy: &DatabaseProxy,
    collection: Collection,
    id: &str,
    expected_version: i64,
    data: &T,
) -> Result<i64, StoreError> {
    let now = Utc::now().timestamp_millis();
    let payload = serde_json::to_string(data)?;

    let result = sqlx::query(
        r#"
        UPDATE "documents"
        SET "data" = ?, "version" = "version" + 1, "updatedAt" = ?
        WHERE "collection" = ? AND "id" = ? AND "version" = ?
        "#,
    )
    .bind(payload)
    .bind(now)
    .bind(collection.as_str())
    .bind(id)
    .bind(expected_version)
    .execute(proxy.pool())
    .await?;

    if result.rows_affected() == 0 {
        let current: Option<i64> = sqlx::query_scalar(
            r#"SELECT "version" FROM "documents" WHERE "collection" = ? AND "id" = ?"#,
        )
        .bind(collection.as_str())
        .bind(id)
        .fetch_optional(proxy.pool())
        .await?;
        return Err(match current {
            Some(_) => StoreError::Conflict,
            None => StoreError::NotFound,
        });
    }

    Ok(expected_version + 1)
}

/// Unversioned insert-or-replace.
pub async fn upsert<T: Serialize>(
    proxy: &DatabaseProxy,
    collection: Collection,
    id: &str,
    owner_id: Option<&str>,
    data: &T,
) -> Result<(), StoreError> {
    let now = Utc::now().timestamp_millis();
    let payload = serde_json::to_string(data)?;

    sqlx::query(
        r#"
        INSERT INTO "documents" ("collection", "id", "ownerId", "data", "version", "createdAt", "updatedAt")
        VALUES (?, ?, ?, ?, 1, ?, ?)
        ON CONFLICT ("collection", "id") DO UPDATE SET
            "data" = excluded."data",
            "ownerId" = excluded."ownerId",
            "version" = "documents"."version" + 1,
            "updatedAt" = excluded."updatedAt"
        "#,
    )
    .bind(collection.as_str())
    .bind(id)
    .bind(owner_id)
    .bind(payload)
    .bind(now)
    .bind(now)
    .execute(proxy.pool())
    .await?;

    Ok(())
}

pub async fn delete(
    proxy: &DatabaseProxy,
    collection: Collection,
    id: &str,
) -> Result<bool, StoreError> {
    let result = sqlx::query(r#"DELETE FROM "documents" WHERE "collection" = ? AND "id" = ?"#)
        .bind(collection.as_str())
        .bind(id)
        .execute(proxy.pool())
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Removes everything a user owns, across all collections.
pub async fn delete_by_owner(proxy: &DatabaseProxy, owner_id: &str) -> Result<u64, StoreError> {
    let result = sqlx::query(r#"DELETE FROM "documents" WHERE "ownerId" = ?"#)
        .bind(owner_id)
        .execute(proxy.pool())
        .await?;
    Ok(result.rows_affected())
}

/// Re-runs `op` on [`StoreError::Conflict`] with a fixed backoff.
pub async fn retry_on_conflict<F, Fut, R>(mut op: F) -> Result<R, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R, StoreError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(StoreError::Conflict) if attempt < CONFLICT_RETRY_ATTEMPTS => {
                tracing::warn!(attempt, "write conflict, retrying");
                attempt += 1;
                tokio::time::sleep(CONFLICT_RETRY_BACKOFF).await;
            }
            other => return other,
        }
    }
}
