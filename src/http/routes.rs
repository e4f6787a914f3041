use axum::{routing::get, routing::post, Router};

use crate::AppState;
use crate::http::handlers;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn questions() -> Router<AppState> {
    Router::new()
        .route(
            "/questions/:id/vote",
            post(handlers::vote_question).get(handlers::get_question_vote),
        )
        // Path used by existing web clients
        .route("/Questions/Vote/:id", post(handlers::vote_question))
}

pub fn answers() -> Router<AppState> {
    Router::new()
        .route(
            "/answers/:id/vote",
            post(handlers::vote_answer).get(handlers::get_answer_vote),
        )
        .route("/Answers/Vote/:id", post(handlers::vote_answer))
}

pub fn admin() -> Router<AppState> {
    Router::new().route("/admin/audit", get(handlers::list_audit))
}
