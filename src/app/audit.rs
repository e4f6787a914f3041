use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::audit::{AuditEntry, AuditQuery};
use crate::domain::vote::{AppliedVote, VoteRecord};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to serialize audit snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for AuditError {
    fn from(err: sqlx::Error) -> Self {
        Self::Backend(err.into())
    }
}

/// Append-only audit trail.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> Result<(), AuditError>;

    /// Newest first.
    async fn list(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, AuditError>;
}

/// Turns committed votes into audit entries. Dispatch never fails the
/// caller: by the time it runs the vote is already committed.
#[derive(Clone)]
pub struct AuditDispatcher {
    store: Arc<dyn AuditStore>,
    max_chars: usize,
}

impl AuditDispatcher {
    pub fn new(store: Arc<dyn AuditStore>, max_chars: usize) -> Self {
        Self { store, max_chars }
    }

    pub async fn dispatch(&self, applied: &AppliedVote) {
        let entry = match self.build_entry(applied) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(
                    error = ?err,
                    vote_id = %applied.record.id,
                    "failed to build audit entry"
                );
                return;
            }
        };

        if let Err(err) = self.store.append(&entry).await {
            tracing::warn!(
                error = ?err,
                vote_id = %applied.record.id,
                action = %entry.action,
                "failed to append audit entry"
            );
        }
    }

    pub async fn list(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, AuditError> {
        self.store.list(query).await
    }

    fn build_entry(&self, applied: &AppliedVote) -> Result<AuditEntry, AuditError> {
        let old_value = applied
            .previous
            .as_ref()
            .map(|record| snapshot(record, applied.score - applied.transition.delta, None))
            .transpose()?
            .map(|value| truncate_strings(value, self.max_chars));

        let new_value = snapshot(
            &applied.record,
            applied.score,
            Some(json!({
                "subject_type": applied.subject.kind.as_str(),
                "direction": applied.transition.next,
                "score_delta": applied.transition.delta,
            })),
        )
        .map(|value| truncate_strings(value, self.max_chars))?;

        let affected_fields = changed_fields(old_value.as_ref(), &new_value);

        Ok(AuditEntry {
            id: Uuid::new_v4(),
            actor_id: applied.record.user_id,
            entity_name: applied.subject.kind.vote_entity().to_string(),
            entity_id: applied.record.id,
            action: applied.transition.event.as_str().to_string(),
            old_value,
            new_value: Some(new_value),
            affected_fields,
            created_at: OffsetDateTime::now_utc(),
        })
    }
}

fn snapshot(
    record: &VoteRecord,
    subject_score: i64,
    extra: Option<Value>,
) -> Result<Value, serde_json::Error> {
    let mut value = serde_json::to_value(record)?;
    if let Value::Object(fields) = &mut value {
        fields.insert("subject_score".into(), json!(subject_score));
        if let Some(Value::Object(extra)) = extra {
            fields.extend(extra);
        }
    }
    Ok(value)
}

/// Shortens every string longer than `max_chars`, marking the cut with `...`.
pub fn truncate_strings(value: Value, max_chars: usize) -> Value {
    match value {
        Value::String(text) if text.chars().count() > max_chars => {
            let mut cut: String = text.chars().take(max_chars).collect();
            cut.push_str("...");
            Value::String(cut)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| truncate_strings(item, max_chars))
                .collect(),
        ),
        Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(key, item)| (key, truncate_strings(item, max_chars)))
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}

/// Keys of `new` whose value differs from `old`. Every key counts when
/// there is no previous snapshot.
pub fn changed_fields(old: Option<&Value>, new: &Value) -> Vec<String> {
    let Value::Object(new_fields) = new else {
        return Vec::new();
    };
    let old_fields = old.and_then(Value::as_object);

    let mut fields: Vec<String> = new_fields
        .iter()
        .filter(|(key, value)| {
            old_fields
                .and_then(|old| old.get(key.as_str()))
                .map_or(true, |previous| previous != *value)
        })
        .map(|(key, _)| key.clone())
        .collect();
    fields.sort();
    fields
}
