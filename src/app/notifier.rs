use serde::Serialize;
use uuid::Uuid;

use crate::domain::vote::{SubjectKind, SubjectRef};
use crate::infra::cache::RedisCache;

#[derive(Debug, Clone, Serialize)]
pub struct ScoreUpdate {
    pub subject_type: SubjectKind,
    pub subject_id: Uuid,
    pub score: i64,
}

/// Pushes new subject scores to live clients over Redis pub/sub.
#[derive(Clone, Default)]
pub struct ScoreNotifier {
    cache: Option<RedisCache>,
}

impl ScoreNotifier {
    pub fn new(cache: Option<RedisCache>) -> Self {
        Self { cache }
    }

    pub fn channel(subject: SubjectRef) -> String {
        format!("scores:{}:{}", subject.kind.as_str(), subject.id)
    }

    pub async fn publish(&self, subject: SubjectRef, score: i64) {
        let Some(cache) = &self.cache else {
            return;
        };

        let update = ScoreUpdate {
            subject_type: subject.kind,
            subject_id: subject.id,
            score,
        };
        let payload = match serde_json::to_string(&update) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(
                    error = ?err,
                    subject_id = %subject.id,
                    "failed to encode score update"
                );
                return;
            }
        };

        match cache.publish(&Self::channel(subject), &payload).await {
            Ok(receivers) => {
                tracing::debug!(
                    subject_id = %subject.id,
                    score,
                    receivers,
                    "published score update"
                );
            }
            Err(err) => {
                tracing::warn!(
                    error = ?err,
                    subject_id = %subject.id,
                    "failed to publish score update"
                );
            }
        }
    }
}
