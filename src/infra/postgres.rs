use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::audit::{AuditError, AuditStore};
use crate::app::store::{StoreError, VoteStore};
use crate::domain::audit::{AuditEntry, AuditQuery};
use crate::domain::vote::{resolve, AppliedVote, Direction, Subject, SubjectRef, VoteRecord};
use crate::infra::db::Db;

const VOTE_COLUMNS: &str =
    "id, user_id, is_upvote, is_deleted, created_at, modified_at, deleted_at";

#[derive(Clone)]
pub struct PgVoteStore {
    db: Db,
}

impl PgVoteStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn vote_from_row(row: &PgRow, subject_id: Uuid) -> VoteRecord {
    VoteRecord {
        id: row.get("id"),
        subject_id,
        user_id: row.get("user_id"),
        is_upvote: row.get("is_upvote"),
        is_deleted: row.get("is_deleted"),
        created_at: row.get("created_at"),
        modified_at: row.get("modified_at"),
        deleted_at: row.get("deleted_at"),
    }
}

#[async_trait]
impl VoteStore for PgVoteStore {
    async fn ping(&self) -> Result<()> {
        self.db.ping().await
    }

    async fn find_subject(&self, subject: SubjectRef) -> Result<Option<Subject>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT id, score, deleted_at FROM {} WHERE id = $1 AND deleted_at IS NULL",
            subject.kind.subjects_table()
        ))
        .bind(subject.id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(|row| Subject {
            kind: subject.kind,
            id: row.get("id"),
            score: row.get("score"),
            deleted_at: row.get("deleted_at"),
        }))
    }

    async fn find_vote(
        &self,
        subject: SubjectRef,
        user_id: Uuid,
    ) -> Result<Option<VoteRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM {} WHERE {} = $1 AND user_id = $2",
            VOTE_COLUMNS,
            subject.kind.votes_table(),
            subject.kind.subject_column()
        ))
        .bind(subject.id)
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(|row| vote_from_row(&row, subject.id)))
    }

    async fn apply_toggle(
        &self,
        subject: SubjectRef,
        user_id: Uuid,
        requested: Direction,
    ) -> Result<AppliedVote, StoreError> {
        let kind = subject.kind;
        let mut tx = self.db.pool().begin().await?;

        // Held until commit so a concurrent soft delete cannot slip in
        // before the score update.
        let live: Option<Uuid> = sqlx::query_scalar(&format!(
            "SELECT id FROM {} WHERE id = $1 AND deleted_at IS NULL FOR NO KEY UPDATE",
            kind.subjects_table()
        ))
        .bind(subject.id)
        .fetch_optional(&mut *tx)
        .await?;

        if live.is_none() {
            tx.rollback().await?;
            return Err(StoreError::SubjectNotFound);
        }

        let previous = sqlx::query(&format!(
            "SELECT {} FROM {} WHERE {} = $1 AND user_id = $2 FOR UPDATE",
            VOTE_COLUMNS,
            kind.votes_table(),
            kind.subject_column()
        ))
        .bind(subject.id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(|row| vote_from_row(&row, subject.id));

        let transition = resolve(previous.as_ref().map(VoteRecord::state), requested);
        let now = OffsetDateTime::now_utc();

        let record = match &previous {
            None => {
                let record = VoteRecord::new(subject.id, user_id, requested, now);
                let inserted = sqlx::query(&format!(
                    "INSERT INTO {} (id, {}, user_id, is_upvote, is_deleted, created_at) \
                     VALUES ($1, $2, $3, $4, false, $5) \
                     ON CONFLICT ({}, user_id) DO NOTHING",
                    kind.votes_table(),
                    kind.subject_column(),
                    kind.subject_column()
                ))
                .bind(record.id)
                .bind(subject.id)
                .bind(user_id)
                .bind(record.is_upvote)
                .bind(record.created_at)
                .execute(&mut *tx)
                .await?;

                // A concurrent first vote by the same user committed first.
                if inserted.rows_affected() == 0 {
                    tx.rollback().await?;
                    return Err(StoreError::Conflict);
                }
                record
            }
            Some(existing) => {
                let record = existing.with_state(transition.next, now);
                sqlx::query(&format!(
                    "UPDATE {} \
                     SET is_upvote = $2, is_deleted = $3, modified_at = $4, deleted_at = $5 \
                     WHERE id = $1",
                    kind.votes_table()
                ))
                .bind(record.id)
                .bind(record.is_upvote)
                .bind(record.is_deleted)
                .bind(record.modified_at)
                .bind(record.deleted_at)
                .execute(&mut *tx)
                .await?;
                record
            }
        };

        let score: i64 = sqlx::query_scalar(&format!(
            "UPDATE {} SET score = score + $2 WHERE id = $1 RETURNING score",
            kind.subjects_table()
        ))
        .bind(subject.id)
        .bind(transition.delta)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(AppliedVote {
            subject,
            previous,
            record,
            transition,
            score,
        })
    }
}

#[derive(Clone)]
pub struct PgAuditStore {
    db: Db,
}

impl PgAuditStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn audit_from_row(row: PgRow) -> AuditEntry {
    AuditEntry {
        id: row.get("id"),
        actor_id: row.get("actor_id"),
        entity_name: row.get("entity_name"),
        entity_id: row.get("entity_id"),
        action: row.get("action"),
        old_value: row.get("old_value"),
        new_value: row.get("new_value"),
        affected_fields: row.get("affected_fields"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn append(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        sqlx::query(
            "INSERT INTO audit_entries \
             (id, actor_id, entity_name, entity_id, action, old_value, new_value, \
              affected_fields, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(entry.id)
        .bind(entry.actor_id)
        .bind(&entry.entity_name)
        .bind(entry.entity_id)
        .bind(&entry.action)
        .bind(&entry.old_value)
        .bind(&entry.new_value)
        .bind(&entry.affected_fields)
        .bind(entry.created_at)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    async fn list(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, AuditError> {
        let (cursor_at, cursor_id) = match query.cursor {
            Some((created_at, id)) => (Some(created_at), Some(id)),
            None => (None, None),
        };

        let rows = sqlx::query(
            "SELECT id, actor_id, entity_name, entity_id, action, old_value, new_value, \
                    affected_fields, created_at \
             FROM audit_entries \
             WHERE ($1::text IS NULL OR entity_name = $1) \
               AND ($2::timestamptz IS NULL OR created_at < $2 OR (created_at = $2 AND id < $3)) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $4",
        )
        .bind(&query.entity_name)
        .bind(cursor_at)
        .bind(cursor_id)
        .bind(query.limit)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(audit_from_row).collect())
    }
}
