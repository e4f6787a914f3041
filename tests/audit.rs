//! Audit Tests
//!
//! Covers audit entries written after votes, the admin listing, and votes
//! surviving a broken audit store.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use common::{app, BrokenAuditStore, TestApp};

#[tokio::test]
async fn each_vote_writes_one_entry() {
    let app = app().await;
    let user = app.create_user();
    let question = app.create_question().await;

    app.vote(question, true, &user).await;
    app.vote(question, true, &user).await;
    app.vote(question, false, &user).await;
    app.vote(question, true, &user).await;

    let resp = app
        .get_admin("/admin/audit?limit=10", Some(app.admin_token()))
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    let actions: Vec<&str> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["action"].as_str().unwrap())
        .collect();
    // Newest first.
    assert_eq!(actions, vec!["Changed", "Resurrected", "Removed", "Created"]);
    assert!(body["next_cursor"].is_null());

    let newest = &body["items"][0];
    assert_eq!(newest["entity_name"], "QuestionVote");
    assert_eq!(newest["actor_id"].as_str().unwrap(), user.id.to_string());
    assert_eq!(newest["new_value"]["subject_score"], 1);
    assert_eq!(newest["new_value"]["score_delta"], 2);
    assert_eq!(newest["old_value"]["is_upvote"], false);
}

#[tokio::test]
async fn listing_filters_by_entity_and_paginates() {
    let app = app().await;
    let question = app.create_question().await;
    let answer = app.create_answer().await;
    for _ in 0..3 {
        let user = app.create_user();
        app.vote(question, true, &user).await;
        app.vote(answer, false, &user).await;
    }

    let first = app
        .get_admin(
            "/admin/audit?limit=2&entity_name=AnswerVote",
            Some(app.admin_token()),
        )
        .await
        .json();
    let items = first["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|item| item["entity_name"] == "AnswerVote"));
    let cursor = first["next_cursor"].as_str().unwrap().to_string();

    let second = app
        .get_admin(
            &format!("/admin/audit?limit=2&entity_name=AnswerVote&cursor={}", cursor),
            Some(app.admin_token()),
        )
        .await
        .json();
    let rest = second["items"].as_array().unwrap();
    assert_eq!(rest.len(), 1);
    assert!(second["next_cursor"].is_null());
    assert!(items.iter().all(|item| item["id"] != rest[0]["id"]));
}

#[tokio::test]
async fn listing_requires_admin_token() {
    let app = app().await;

    let missing = app.get_admin("/admin/audit", None).await;
    assert_eq!(missing.status, StatusCode::FORBIDDEN);
    assert_eq!(missing.error_message(), "missing admin token");

    let wrong = app.get_admin("/admin/audit", Some("nope")).await;
    assert_eq!(wrong.status, StatusCode::FORBIDDEN);
    assert_eq!(wrong.error_message(), "invalid admin token");
}

#[tokio::test]
async fn listing_validates_limit_and_cursor() {
    let app = app().await;

    let resp = app
        .get_admin("/admin/audit?limit=0", Some(app.admin_token()))
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "limit must be between 1 and 200");

    let resp = app
        .get_admin("/admin/audit?cursor=yesterday", Some(app.admin_token()))
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "invalid cursor");
}

#[tokio::test]
async fn broken_audit_store_does_not_fail_votes() {
    let app = TestApp::with_audit(Arc::new(BrokenAuditStore));
    let user = app.create_user();
    let question = app.create_question().await;

    let added = app.vote(question, true, &user).await;
    let removed = app.vote(question, true, &user).await;

    assert_eq!(added.status, StatusCode::OK);
    assert_eq!(added.json()["score"], 1);
    assert_eq!(removed.status, StatusCode::OK);
    assert_eq!(removed.json()["action"], "removed");
    assert_eq!(removed.json()["score"], 0);
}
