use axum::http::StatusCode;
use serde_json::json;

mod common;

#[tokio::test]
async fn test_add_list_update_delete() {
    let app = common::create_test_app().await;
    let (token, _) = app.register("sam").await;

    let (status, body) = app
        .post(
            "/api/vocabulary",
            &token,
            json!({ "word": "Resilient", "definition": "able to recover quickly", "level": "b2" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["masteryLabel"], "NEW");
    assert_eq!(body["data"]["mastery"], 0);
    assert_eq!(body["data"]["level"], "B2");
    assert_eq!(body["data"]["due"], true);

    let (status, _) = app
        .post(
            "/api/vocabulary",
            &token,
            json!({ "word": "resilient", "definition": "duplicate" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .put(
            &format!("/api/vocabulary/{id}"),
            &token,
            json!({ "example": "Children are remarkably resilient." }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["example"], "Children are remarkably resilient.");

    let (_, body) = app.get("/api/vocabulary?search=recover", &token).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    let (_, body) = app.get("/api/vocabulary?search=nothing", &token).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, _) = app.delete(&format!("/api/vocabulary/{id}"), &token).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get(&format!("/api/vocabulary/{id}"), &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_add_validation() {
    let app = common::create_test_app().await;
    let (token, _) = app.register("tia").await;

    for body in [
        json!({ "word": "", "definition": "empty word" }),
        json!({ "word": "x".repeat(65), "definition": "too long" }),
        json!({ "word": "fine", "definition": "" }),
        json!({ "word": "fine", "definition": "ok", "level": "D4" }),
    ] {
        let (status, _) = app.post("/api/vocabulary", &token, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_review_schedules_and_awards_xp() {
    let app = common::create_test_app().await;
    let (token, _) = app.register("uma").await;
    let (_, body) = app
        .post(
            "/api/vocabulary",
            &token,
            json!({ "word": "candid", "definition": "truthful and straightforward" }),
        )
        .await;
    let id = body["data"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/vocabulary/{id}/review");

    let (status, _) = app.post(&uri, &token, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.post(&uri, &token, json!({ "answer": "Candid" })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["correct"], true);
    assert_eq!(body["data"]["entry"]["mastery"], 1);
    assert_eq!(body["data"]["entry"]["masteryLabel"], "LEARNING");
    assert_eq!(body["data"]["entry"]["due"], false);
    assert_eq!(body["data"]["xp"]["xpAwarded"], 2);

    let (_, body) = app.get("/api/vocabulary?filter=due", &token).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, body) = app.post(&uri, &token, json!({ "correct": false })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["entry"]["mastery"], 0);
    assert_eq!(body["data"]["entry"]["reviewCount"], 2);
    assert_eq!(body["data"]["entry"]["correctCount"], 1);

    let (_, body) = app.get("/api/vocabulary/stats", &token).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["new"], 1);
    assert_eq!(body["data"]["due"], 0);
}

#[tokio::test]
async fn test_entries_are_private() {
    let app = common::create_test_app().await;
    let (owner, _) = app.register("vic").await;
    let (other, _) = app.register("wes").await;
    let (_, body) = app
        .post("/api/vocabulary", &owner, json!({ "word": "wary", "definition": "cautious" }))
        .await;
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = app.get(&format!("/api/vocabulary/{id}"), &other).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, body) = app.get("/api/vocabulary", &other).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}
