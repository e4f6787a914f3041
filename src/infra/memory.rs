use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::app::audit::{AuditError, AuditStore};
use crate::app::store::{StoreError, VoteStore};
use crate::domain::audit::{AuditEntry, AuditQuery};
use crate::domain::vote::{
    resolve, AppliedVote, Direction, Subject, SubjectKind, SubjectRef, VoteRecord,
};

#[derive(Default)]
struct VoteTables {
    subjects: HashMap<SubjectRef, Subject>,
    votes: HashMap<(SubjectRef, Uuid), VoteRecord>,
}

/// Process-local vote store. The mutex plays the role of the database
/// transaction: a toggle holds it from the read through the score update.
#[derive(Default)]
pub struct MemoryVoteStore {
    tables: Mutex<VoteTables>,
}

impl MemoryVoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_subject(&self, kind: SubjectKind) -> SubjectRef {
        let subject = SubjectRef {
            kind,
            id: Uuid::new_v4(),
        };
        let mut tables = self.tables.lock().await;
        tables.subjects.insert(
            subject,
            Subject {
                kind,
                id: subject.id,
                score: 0,
                deleted_at: None,
            },
        );
        subject
    }

    pub async fn delete_subject(&self, subject: SubjectRef) -> bool {
        let mut tables = self.tables.lock().await;
        match tables.subjects.get_mut(&subject) {
            Some(row) if row.deleted_at.is_none() => {
                row.deleted_at = Some(OffsetDateTime::now_utc());
                true
            }
            _ => false,
        }
    }

    /// Number of vote rows for a subject, soft-deleted ones included.
    pub async fn vote_rows(&self, subject: SubjectRef) -> usize {
        let tables = self.tables.lock().await;
        tables.votes.keys().filter(|(key, _)| *key == subject).count()
    }
}

#[async_trait]
impl VoteStore for MemoryVoteStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn find_subject(&self, subject: SubjectRef) -> Result<Option<Subject>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .subjects
            .get(&subject)
            .filter(|row| row.deleted_at.is_none())
            .cloned())
    }

    async fn find_vote(
        &self,
        subject: SubjectRef,
        user_id: Uuid,
    ) -> Result<Option<VoteRecord>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.votes.get(&(subject, user_id)).cloned())
    }

    async fn apply_toggle(
        &self,
        subject: SubjectRef,
        user_id: Uuid,
        requested: Direction,
    ) -> Result<AppliedVote, StoreError> {
        let mut tables = self.tables.lock().await;
        let tables = &mut *tables;

        let row = tables
            .subjects
            .get_mut(&subject)
            .filter(|row| row.deleted_at.is_none())
            .ok_or(StoreError::SubjectNotFound)?;

        let previous = tables.votes.get(&(subject, user_id)).cloned();
        let transition = resolve(previous.as_ref().map(VoteRecord::state), requested);
        let now = OffsetDateTime::now_utc();
        let record = match &previous {
            Some(existing) => existing.with_state(transition.next, now),
            None => VoteRecord::new(subject.id, user_id, requested, now),
        };

        tables.votes.insert((subject, user_id), record.clone());
        row.score += transition.delta;

        Ok(AppliedVote {
            subject,
            previous,
            record,
            transition,
            score: row.score,
        })
    }
}

#[derive(Default)]
pub struct MemoryAuditStore {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        self.entries.lock().await.push(entry.clone());
        Ok(())
    }

    async fn list(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, AuditError> {
        let entries = self.entries.lock().await;
        let mut matching: Vec<AuditEntry> = entries
            .iter()
            .filter(|entry| {
                query
                    .entity_name
                    .as_deref()
                    .map_or(true, |name| entry.entity_name == name)
            })
            .filter(|entry| match query.cursor {
                Some((created_at, id)) => {
                    entry.created_at < created_at
                        || (entry.created_at == created_at && entry.id < id)
                }
                None => true,
            })
            .cloned()
            .collect();

        // Same key as the cursor, newest first.
        matching.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        matching.truncate(query.limit.max(0) as usize);
        Ok(matching)
    }
}
