use axum::http::StatusCode;
use serde_json::{json, Value};

use lingo_backend::services::content::{fallback_grammar, fallback_listening, fallback_reading};
use lingo_backend::services::types::CefrLevel;

mod common;

fn answers_for(questions: &[lingo_backend::services::content::Question]) -> Vec<String> {
    questions.iter().map(|q| q.answer.clone()).collect()
}

#[tokio::test]
async fn test_create_session_hides_answers() {
    let app = common::create_test_app().await;
    let (token, _) = app.register("dana").await;

    let (_, session) = app.start_session("reading", &token, json!({})).await;

    assert_eq!(session["module"], "reading");
    assert_eq!(session["level"], "B1");
    assert_eq!(session["status"], "IN_PROGRESS");
    assert_eq!(session["contentSource"], "fallback");
    let questions = session["content"]["questions"].as_array().unwrap();
    assert!(!questions.is_empty());
    for question in questions {
        assert!(question.get("answer").is_none());
    }
}

#[tokio::test]
async fn test_create_session_with_empty_body_uses_profile_level() {
    let app = common::create_test_app().await;
    let (token, _) = app.register("eli").await;
    app.put("/api/users/me", &token, json!({ "targetLevel": "C1" }))
        .await;

    let (status, body) = app
        .request(
            axum::http::Method::POST,
            "/api/writing/sessions",
            Some(&token),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["level"], "C1");
    assert_eq!(body["data"]["content"]["kind"], "writing");
}

#[tokio::test]
async fn test_invalid_level_rejected() {
    let app = common::create_test_app().await;
    let (token, _) = app.register("fay").await;

    let (status, _) = app
        .post("/api/reading/sessions", &token, json!({ "level": "Z9" }))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_non_array_answers_is_400() {
    let app = common::create_test_app().await;
    let (token, _) = app.register("gus").await;
    let (id, _) = app.start_session("reading", &token, json!({})).await;

    for body in [
        json!({ "answers": "Saturday" }),
        json!({ "answers": { "0": "Saturday" } }),
        json!({}),
        json!(["Saturday"]),
    ] {
        let (status, json) = app
            .post(&format!("/api/reading/sessions/{id}/submit"), &token, body)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{json}");
    }

    let (_, session) = app.get(&format!("/api/reading/sessions/{id}"), &token).await;
    assert_eq!(session["data"]["status"], "IN_PROGRESS");
}

#[tokio::test]
async fn test_answer_count_must_match() {
    let app = common::create_test_app().await;
    let (token, _) = app.register("hal").await;
    let (id, _) = app.start_session("reading", &token, json!({})).await;

    let (status, _) = app
        .post(
            &format!("/api/reading/sessions/{id}/submit"),
            &token,
            json!({ "answers": ["only one"] }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_other_users_session_is_403() {
    let app = common::create_test_app().await;
    let (owner, _) = app.register("ivy").await;
    let (intruder, _) = app.register("jon").await;
    let (id, _) = app.start_session("reading", &owner, json!({})).await;

    let (status, body) = app
        .get(&format!("/api/reading/sessions/{id}"), &intruder)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, _) = app
        .delete(&format!("/api/reading/sessions/{id}"), &intruder)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get("/api/reading/sessions/missing-id", &owner).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_session_from_other_module_is_400() {
    let app = common::create_test_app().await;
    let (token, _) = app.register("kim").await;
    let (id, _) = app.start_session("reading", &token, json!({})).await;

    let (status, _) = app
        .get(&format!("/api/grammar/sessions/{id}"), &token)
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reading_submit_awards_xp_once() {
    let app = common::create_test_app().await;
    let (token, _) = app.register("lea").await;
    let (id, _) = app
        .start_session("reading", &token, json!({ "level": "B1" }))
        .await;
    let answers = answers_for(&fallback_reading(CefrLevel::B1).questions);

    let (status, body) = app
        .post(
            &format!("/api/reading/sessions/{id}/submit"),
            &token,
            json!({ "answers": answers }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let session = &body["data"]["session"];
    assert_eq!(session["status"], "COMPLETED");
    assert_eq!(session["result"]["score"], 100.0);
    assert_eq!(session["result"]["band"], "EXCELLENT");
    assert_eq!(session["result"]["suggestedLevel"], "B2");
    assert_eq!(session["xpAwarded"], 30);
    assert_eq!(body["data"]["xp"]["totalXp"], 30);

    let (status, _) = app
        .post(
            &format!("/api/reading/sessions/{id}/submit"),
            &token,
            json!({ "answers": answers }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, profile) = app.get("/api/gamification/profile", &token).await;
    assert_eq!(profile["data"]["xp"], 30);
    assert_eq!(profile["data"]["sessionsCompleted"], 1);
    assert_eq!(profile["data"]["currentStreak"], 1);
    assert_eq!(profile["data"]["moduleXp"]["reading"], 30);
}

#[tokio::test]
async fn test_grammar_wrong_answers_get_fallback_explanation() {
    let app = common::create_test_app().await;
    let (token, _) = app.register("max").await;
    let (id, _) = app
        .start_session("grammar", &token, json!({ "topic": "articles" }))
        .await;
    let content = fallback_grammar("articles");
    let mut answers = answers_for(&content.questions);
    answers[0] = "the".to_string();

    let (status, body) = app
        .post(
            &format!("/api/grammar/sessions/{id}/submit"),
            &token,
            json!({ "answers": answers }),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    let questions = body["data"]["session"]["result"]["questions"].as_array().unwrap();
    assert_eq!(questions[0]["correct"], false);
    assert_eq!(
        questions[0]["feedback"],
        format!("Incorrect, the answer is {}.", content.questions[0].answer)
    );
    assert!(questions[1].get("feedback").is_none());
    assert_eq!(body["data"]["session"]["result"]["score"], 80.0);
}

#[tokio::test]
async fn test_listening_dictation_is_averaged_in() {
    let app = common::create_test_app().await;
    let (token, _) = app.register("nia").await;
    let (id, _) = app
        .start_session("listening", &token, json!({ "level": "A2" }))
        .await;
    let content = fallback_listening(CefrLevel::A2);

    let (status, body) = app
        .post(
            &format!("/api/listening/sessions/{id}/submit"),
            &token,
            json!({ "answers": answers_for(&content.questions), "dictation": content.dictation }),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    let result = &body["data"]["session"]["result"];
    assert_eq!(result["dictation"]["accuracy"], 100.0);
    assert_eq!(result["score"], 100.0);
}

#[tokio::test]
async fn test_writing_length_bounds_and_fallback_feedback() {
    let app = common::create_test_app().await;
    let (token, _) = app.register("oli").await;
    let (id, _) = app.start_session("writing", &token, json!({})).await;
    let uri = format!("/api/writing/sessions/{id}/submit");

    let (status, _) = app.post(&uri, &token, json!({ "text": "Too short." })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(&uri, &token, json!({ "text": "a".repeat(5001) }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let essay = "Last summer I travelled to the coast with my family. We stayed in a small \
                 house near the beach and spent every morning swimming. In the evenings we \
                 cooked fresh fish and talked about our plans. I learned that simple holidays \
                 can be the most relaxing ones.";
    let (status, body) = app.post(&uri, &token, json!({ "text": essay })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let writing = &body["data"]["session"]["result"]["writing"];
    assert_eq!(writing["source"], "fallback");
    assert!(writing["wordCount"].as_u64().unwrap() > 40);
    let score = writing["score"].as_f64().unwrap();
    assert!((0.0..=100.0).contains(&score));
}

#[tokio::test]
async fn test_speaking_requires_transcript_or_audio() {
    let app = common::create_test_app().await;
    let (token, _) = app.register("pia").await;
    let (id, session) = app.start_session("speaking", &token, json!({})).await;
    let uri = format!("/api/speaking/sessions/{id}/submit");

    let (status, _) = app.post(&uri, &token, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let reference = session["content"]["referenceText"].as_str().unwrap();
    let (status, body) = app
        .post(&uri, &token, json!({ "transcript": reference }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let speaking = &body["data"]["session"]["result"]["speaking"];
    assert_eq!(speaking["accuracy"], 100.0);
    assert_eq!(speaking["completeness"], 100.0);
}

#[tokio::test]
async fn test_list_sessions_paginates_newest_first() {
    let app = common::create_test_app().await;
    let (token, _) = app.register("quin").await;
    let mut ids = Vec::new();
    for _ in 0..3 {
        let (id, _) = app.start_session("grammar", &token, json!({})).await;
        ids.push(id);
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
    app.start_session("reading", &token, json!({})).await;

    let (status, body) = app
        .get("/api/grammar/sessions?page=1&pageSize=2", &token)
        .await;
    assert_eq!(status, StatusCode::OK);
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["id"], ids[2].as_str());
    assert_eq!(body["pagination"]["total"], 3);
    assert_eq!(body["pagination"]["totalPages"], 2);

    let (_, body) = app
        .get("/api/grammar/sessions?status=COMPLETED", &token)
        .await;
    assert_eq!(body["data"], Value::Array(vec![]));

    let (status, _) = app.get("/api/grammar/sessions?pageSize=51", &token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.get("/api/grammar/sessions?page=0", &token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_huge_page_is_rejected_not_overflowed() {
    let app = common::create_test_app().await;
    let (token, _) = app.register("rae").await;

    let (status, body) = app
        .get("/api/reading/sessions?page=9223372036854775807", &token)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = app
        .get("/api/reading/sessions?page=4000&pageSize=50", &token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], Value::Array(vec![]));
}

#[tokio::test]
async fn test_malformed_query_gets_json_error() {
    let app = common::create_test_app().await;
    let (token, _) = app.register("sol").await;

    for uri in [
        "/api/reading/sessions?page=-x",
        "/api/leaderboards/xp?limit=abc",
        "/api/grammar/sessions?pageSize=ten",
    ] {
        let (status, body) = app.get(uri, &token).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["success"], false, "{uri}");
        assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()), "{uri}: {body}");
    }
}

#[tokio::test]
async fn test_submit_while_evaluating_is_409() {
    let app = common::create_test_app().await;
    let (token, _) = app.register("tom").await;
    let (id, _) = app
        .start_session("reading", &token, json!({ "level": "B1" }))
        .await;
    let uri = format!("/api/reading/sessions/{id}/submit");
    let body = json!({ "answers": answers_for(&fallback_reading(CefrLevel::B1).questions) });

    let ticket = app.state.evaluators().guard.try_acquire(&id).unwrap();
    let (status, json) = app.post(&uri, &token, body.clone()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("already being evaluated"));

    drop(ticket);
    let (status, json) = app.post(&uri, &token, body).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["data"]["session"]["status"], "COMPLETED");
}

#[tokio::test]
async fn test_delete_session() {
    let app = common::create_test_app().await;
    let (token, _) = app.register("rae").await;
    let (id, _) = app.start_session("speaking", &token, json!({})).await;

    let (status, _) = app
        .delete(&format!("/api/speaking/sessions/{id}"), &token)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .get(&format!("/api/speaking/sessions/{id}"), &token)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
