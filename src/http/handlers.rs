use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::votes::VoteError;
use crate::domain::audit::{AuditEntry, AuditQuery};
use crate::domain::vote::{Direction, SubjectKind, SubjectRef, VoteOutcome};
use crate::http::{AdminToken, AppError, AuthUser};
use crate::AppState;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

#[derive(Deserialize)]
pub struct AuditListQuery {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
    pub entity_name: Option<String>,
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

fn parse_cursor(cursor: Option<String>) -> Result<Option<(OffsetDateTime, Uuid)>, AppError> {
    let Some(cursor) = cursor else {
        return Ok(None);
    };

    let mut parts = cursor.splitn(2, '/');
    let timestamp = parts
        .next()
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;
    let id = parts
        .next()
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;

    let timestamp = OffsetDateTime::parse(timestamp, &Rfc3339)
        .map_err(|_| AppError::bad_request("invalid cursor"))?;
    let id = Uuid::parse_str(id).map_err(|_| AppError::bad_request("invalid cursor"))?;

    Ok(Some((timestamp, id)))
}

fn encode_cursor(cursor: Option<(OffsetDateTime, Uuid)>) -> Option<String> {
    let (timestamp, id) = cursor?;
    let timestamp = timestamp.format(&Rfc3339).ok()?;
    Some(format!("{}/{}", timestamp, id))
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = state.votes.ping().await.is_ok();
    let cache = match &state.cache {
        Some(cache) => cache.ping().await.is_ok(),
        None => true,
    };
    let status = if store && cache { "ok" } else { "degraded" };

    Json(HealthResponse { status })
}

#[derive(Deserialize)]
pub struct VoteQuery {
    #[serde(alias = "isUpvote")]
    pub is_upvote: bool,
}

fn vote_error(err: VoteError, subject: SubjectRef, user_id: Uuid) -> AppError {
    match err {
        VoteError::Unauthorized => AppError::unauthorized("authentication required"),
        VoteError::NotFound(kind) => AppError::not_found(format!("{} not found", kind.as_str())),
        err => {
            tracing::error!(
                error = ?err,
                subject_type = subject.kind.as_str(),
                subject_id = %subject.id,
                user_id = %user_id,
                "failed to vote"
            );
            AppError::internal("failed to vote")
        }
    }
}

async fn cast_vote(
    state: &AppState,
    subject: SubjectRef,
    auth: &AuthUser,
    query: VoteQuery,
) -> Result<Json<VoteOutcome>, AppError> {
    let outcome = state
        .votes
        .cast(subject, auth.user_id, Direction::from_upvote(query.is_upvote))
        .await
        .map_err(|err| vote_error(err, subject, auth.user_id))?;

    Ok(Json(outcome))
}

pub async fn vote_question(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<VoteQuery>,
) -> Result<Json<VoteOutcome>, AppError> {
    cast_vote(&state, SubjectRef::question(id), &auth, query).await
}

pub async fn vote_answer(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<VoteQuery>,
) -> Result<Json<VoteOutcome>, AppError> {
    cast_vote(&state, SubjectRef::answer(id), &auth, query).await
}

#[derive(Serialize)]
pub struct VoteStateResponse {
    pub subject_type: SubjectKind,
    pub subject_id: Uuid,
    pub score: i64,
    pub vote: Option<Direction>,
}

async fn current_vote(
    state: &AppState,
    subject: SubjectRef,
    auth: &AuthUser,
) -> Result<Json<VoteStateResponse>, AppError> {
    let view = state
        .votes
        .current(subject, auth.user_id)
        .await
        .map_err(|err| vote_error(err, subject, auth.user_id))?;

    Ok(Json(VoteStateResponse {
        subject_type: subject.kind,
        subject_id: subject.id,
        score: view.subject.score,
        vote: view
            .vote
            .and_then(|record| record.state().active_direction()),
    }))
}

pub async fn get_question_vote(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<VoteStateResponse>, AppError> {
    current_vote(&state, SubjectRef::question(id), &auth).await
}

pub async fn get_answer_vote(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<VoteStateResponse>, AppError> {
    current_vote(&state, SubjectRef::answer(id), &auth).await
}

pub async fn list_audit(
    _admin: AdminToken,
    State(state): State<AppState>,
    Query(query): Query<AuditListQuery>,
) -> Result<Json<ListResponse<AuditEntry>>, AppError> {
    let limit = query.limit.unwrap_or(50);
    if !(1..=200).contains(&limit) {
        return Err(AppError::bad_request("limit must be between 1 and 200"));
    }
    let cursor = parse_cursor(query.cursor)?;

    let mut entries = state
        .votes
        .audit()
        .list(&AuditQuery {
            entity_name: query.entity_name,
            cursor,
            limit: limit + 1,
        })
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to list audit entries");
            AppError::internal("failed to list audit entries")
        })?;

    let next_cursor = if entries.len() > limit as usize {
        entries.truncate(limit as usize);
        entries.last().map(|last| (last.created_at, last.id))
    } else {
        None
    };

    Ok(Json(ListResponse {
        items: entries,
        next_cursor: encode_cursor(next_cursor),
    }))
}
