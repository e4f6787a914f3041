use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::vote::{AppliedVote, Direction, Subject, SubjectRef, VoteRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("subject not found")]
    SubjectNotFound,

    /// Another transaction won a race on the same vote row; the whole
    /// read-resolve-write cycle can be retried.
    #[error("concurrent vote conflict")]
    Conflict,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            // unique_violation, serialization_failure, deadlock_detected
            if matches!(db_err.code().as_deref(), Some("23505" | "40001" | "40P01")) {
                return Self::Conflict;
            }
        }
        Self::Backend(err.into())
    }
}

/// Persistence for subjects and their vote rows.
///
/// `apply_toggle` is the only write path: it reads the caller's vote row
/// (soft-deleted rows included), resolves the transition, writes the row and
/// applies the score delta as one atomic unit.
#[async_trait]
pub trait VoteStore: Send + Sync {
    async fn ping(&self) -> anyhow::Result<()>;

    /// Live subjects only; soft-deleted subjects read as `None`.
    async fn find_subject(&self, subject: SubjectRef) -> Result<Option<Subject>, StoreError>;

    async fn find_vote(
        &self,
        subject: SubjectRef,
        user_id: Uuid,
    ) -> Result<Option<VoteRecord>, StoreError>;

    async fn apply_toggle(
        &self,
        subject: SubjectRef,
        user_id: Uuid,
        requested: Direction,
    ) -> Result<AppliedVote, StoreError>;
}
