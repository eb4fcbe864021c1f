use serde_json::json;
use tempfile::TempDir;

use lingo_backend::db::documents;
use lingo_backend::db::operations::{find_user_by_email, insert_user, usernames_by_ids, ROLE_USER};
use lingo_backend::db::{Collection, DatabaseProxy, DocFilter, StoreError};

fn file_url(dir: &TempDir) -> String {
    format!("sqlite:{}?mode=rwc", dir.path().join("nested").join("lingo.db").display())
}

#[tokio::test]
async fn test_file_store_survives_reconnect() {
    let dir = TempDir::new().unwrap();
    let url = file_url(&dir);

    {
        let proxy = DatabaseProxy::connect(&url).await.unwrap();
        insert_user(&proxy, "u1", "ada@example.com", "ada", "hash", ROLE_USER)
            .await
            .unwrap();
        documents::insert(
            &proxy,
            Collection::Vocabulary,
            "v1",
            Some("u1"),
            &json!({ "word": "lucid", "wordKey": "lucid" }),
        )
        .await
        .unwrap();
        proxy.close().await;
    }

    let proxy = DatabaseProxy::connect(&url).await.unwrap();
    let user = find_user_by_email(&proxy, "ada@example.com").await.unwrap();
    assert_eq!(user.map(|u| u.id).as_deref(), Some("u1"));

    let docs = documents::list::<serde_json::Value>(
        &proxy,
        Collection::Vocabulary,
        &DocFilter::new().owner("u1").field_eq("wordKey", "lucid"),
    )
    .await
    .unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].data["word"], "lucid");
}

#[tokio::test]
async fn test_stale_version_is_a_conflict_on_disk() {
    let dir = TempDir::new().unwrap();
    let proxy = DatabaseProxy::connect(&file_url(&dir)).await.unwrap();

    documents::insert(&proxy, Collection::Groups, "g1", None, &json!({ "name": "Readers" }))
        .await
        .unwrap();
    let version = documents::update(&proxy, Collection::Groups, "g1", 1, &json!({ "name": "Writers" }))
        .await
        .unwrap();
    assert_eq!(version, 2);

    let err = documents::update(&proxy, Collection::Groups, "g1", 1, &json!({ "name": "Late" }))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict));

    let err = documents::update(&proxy, Collection::Groups, "missing", 1, &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound));
}

#[tokio::test]
async fn test_ping_reports_latency() {
    let dir = TempDir::new().unwrap();
    let proxy = DatabaseProxy::connect(&file_url(&dir)).await.unwrap();

    assert!(proxy.ping().await.is_ok());
    assert!(proxy.connection_string().contains("lingo.db"));
}

#[tokio::test]
async fn test_username_lookup_handles_more_ids_than_sqlite_variables() {
    let proxy = DatabaseProxy::connect("sqlite::memory:").await.unwrap();
    insert_user(&proxy, "u-7", "ana@example.com", "ana", "hash", ROLE_USER)
        .await
        .unwrap();
    insert_user(&proxy, "u-39999", "ben@example.com", "ben", "hash", ROLE_USER)
        .await
        .unwrap();

    let ids: Vec<String> = (0..40_000).map(|i| format!("u-{i}")).collect();
    let mut names = usernames_by_ids(&proxy, &ids).await.unwrap();
    names.sort();
    assert_eq!(
        names,
        vec![
            ("u-39999".to_string(), "ben".to_string()),
            ("u-7".to_string(), "ana".to_string()),
        ]
    );
}
