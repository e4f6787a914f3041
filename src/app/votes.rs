use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use uuid::Uuid;

use crate::app::audit::AuditDispatcher;
use crate::app::notifier::ScoreNotifier;
use crate::app::store::{StoreError, VoteStore};
use crate::domain::vote::{
    AppliedVote, Direction, Subject, SubjectKind, SubjectRef, VoteOutcome, VoteRecord,
};

const RETRY_BASE_MS: u64 = 10;

#[derive(Debug, Error)]
pub enum VoteError {
    #[error("authentication required")]
    Unauthorized,

    #[error("{} not found", .0.as_str())]
    NotFound(SubjectKind),

    #[error("vote conflict persisted after {attempts} attempts")]
    Contended { attempts: u32 },

    #[error("vote persistence failed")]
    Persistence(#[source] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct VoteView {
    pub subject: Subject,
    pub vote: Option<VoteRecord>,
}

#[derive(Clone)]
pub struct VoteService {
    store: Arc<dyn VoteStore>,
    audit: AuditDispatcher,
    notifier: ScoreNotifier,
    max_attempts: u32,
}

impl VoteService {
    pub fn new(
        store: Arc<dyn VoteStore>,
        audit: AuditDispatcher,
        notifier: ScoreNotifier,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            audit,
            notifier,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn audit(&self) -> &AuditDispatcher {
        &self.audit
    }

    pub async fn ping(&self) -> anyhow::Result<()> {
        self.store.ping().await
    }

    /// Toggle the caller's vote on a subject.
    ///
    /// Once validation passes the write runs on its own task, so a caller
    /// that goes away cannot leave the vote row and the score out of step.
    pub async fn cast(
        &self,
        subject: SubjectRef,
        user_id: Uuid,
        direction: Direction,
    ) -> Result<VoteOutcome, VoteError> {
        if user_id.is_nil() {
            return Err(VoteError::Unauthorized);
        }

        let service = self.clone();
        tokio::spawn(async move { service.cast_detached(subject, user_id, direction).await })
            .await
            .map_err(|err| VoteError::Persistence(anyhow::anyhow!("vote task failed: {}", err)))?
    }

    async fn cast_detached(
        &self,
        subject: SubjectRef,
        user_id: Uuid,
        direction: Direction,
    ) -> Result<VoteOutcome, VoteError> {
        let applied = self.apply_with_retry(subject, user_id, direction).await?;
        let outcome = VoteOutcome::from(&applied);

        tracing::info!(
            subject_type = subject.kind.as_str(),
            subject_id = %subject.id,
            user_id = %user_id,
            vote_id = %outcome.vote_id,
            action = ?outcome.action,
            delta = outcome.delta,
            score = outcome.score,
            "vote applied"
        );

        self.audit.dispatch(&applied).await;
        self.notifier.publish(subject, applied.score).await;

        Ok(outcome)
    }

    async fn apply_with_retry(
        &self,
        subject: SubjectRef,
        user_id: Uuid,
        direction: Direction,
    ) -> Result<AppliedVote, VoteError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.store.apply_toggle(subject, user_id, direction).await {
                Ok(applied) => return Ok(applied),
                Err(StoreError::Conflict) if attempt < self.max_attempts => {
                    tracing::debug!(
                        subject_id = %subject.id,
                        user_id = %user_id,
                        attempt,
                        "vote conflict, retrying"
                    );
                    tokio::time::sleep(retry_delay(attempt)).await;
                }
                Err(StoreError::Conflict) => {
                    tracing::warn!(
                        subject_id = %subject.id,
                        user_id = %user_id,
                        attempts = attempt,
                        "vote conflict retries exhausted"
                    );
                    return Err(VoteError::Contended { attempts: attempt });
                }
                Err(StoreError::SubjectNotFound) => return Err(VoteError::NotFound(subject.kind)),
                Err(StoreError::Backend(err)) => return Err(VoteError::Persistence(err)),
            }
        }
    }

    /// Current score of a subject and the caller's row, if any.
    pub async fn current(&self, subject: SubjectRef, user_id: Uuid) -> Result<VoteView, VoteError> {
        if user_id.is_nil() {
            return Err(VoteError::Unauthorized);
        }

        let found = self
            .store
            .find_subject(subject)
            .await
            .map_err(|err| store_failure(subject, err))?
            .ok_or(VoteError::NotFound(subject.kind))?;
        let vote = self
            .store
            .find_vote(subject, user_id)
            .await
            .map_err(|err| store_failure(subject, err))?;

        Ok(VoteView {
            subject: found,
            vote,
        })
    }
}

fn store_failure(subject: SubjectRef, err: StoreError) -> VoteError {
    match err {
        StoreError::SubjectNotFound => VoteError::NotFound(subject.kind),
        StoreError::Conflict => VoteError::Contended { attempts: 1 },
        StoreError::Backend(err) => VoteError::Persistence(err),
    }
}

fn retry_delay(attempt: u32) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..RETRY_BASE_MS);
    Duration::from_millis(RETRY_BASE_MS * u64::from(attempt) + jitter)
}
