use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    Question,
    Answer,
}

impl SubjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Question => "question",
            Self::Answer => "answer",
        }
    }

    pub fn subjects_table(&self) -> &'static str {
        match self {
            Self::Question => "questions",
            Self::Answer => "answers",
        }
    }

    pub fn votes_table(&self) -> &'static str {
        match self {
            Self::Question => "question_votes",
            Self::Answer => "answer_votes",
        }
    }

    /// Foreign key column on the votes table.
    pub fn subject_column(&self) -> &'static str {
        match self {
            Self::Question => "question_id",
            Self::Answer => "answer_id",
        }
    }

    /// Entity name recorded in audit entries.
    pub fn vote_entity(&self) -> &'static str {
        match self {
            Self::Question => "QuestionVote",
            Self::Answer => "AnswerVote",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectRef {
    pub kind: SubjectKind,
    pub id: Uuid,
}

impl SubjectRef {
    pub fn question(id: Uuid) -> Self {
        Self {
            kind: SubjectKind::Question,
            id,
        }
    }

    pub fn answer(id: Uuid) -> Self {
        Self {
            kind: SubjectKind::Answer,
            id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub kind: SubjectKind,
    pub id: Uuid,
    pub score: i64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn from_upvote(is_upvote: bool) -> Self {
        if is_upvote {
            Self::Up
        } else {
            Self::Down
        }
    }

    pub fn is_upvote(&self) -> bool {
        matches!(self, Self::Up)
    }

    /// Contribution of an active vote in this direction to the subject score.
    pub fn weight(&self) -> i64 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }
}

/// State of a persisted vote row. A missing row is `Option::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "direction", rename_all = "snake_case")]
pub enum VoteState {
    Active(Direction),
    /// Soft-deleted; keeps the direction the vote had when it was removed.
    Retracted(Direction),
}

impl VoteState {
    pub fn active_direction(&self) -> Option<Direction> {
        match self {
            Self::Active(direction) => Some(*direction),
            Self::Retracted(_) => None,
        }
    }

    pub fn contribution(&self) -> i64 {
        self.active_direction().map_or(0, |direction| direction.weight())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteAction {
    Added,
    Removed,
    Switched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteEvent {
    Created,
    Changed,
    Removed,
    Resurrected,
}

impl VoteEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Changed => "Changed",
            Self::Removed => "Removed",
            Self::Resurrected => "Resurrected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: VoteState,
    pub delta: i64,
    pub action: VoteAction,
    pub event: VoteEvent,
}

/// Decide what a vote request does to the caller's existing vote.
///
/// Repeating the active direction removes the vote, the opposite direction
/// switches it, and a vote on a retracted row resurrects it. The delta is
/// always the difference between the old and new contribution, so the
/// subject score stays equal to the sum of active votes.
pub fn resolve(existing: Option<VoteState>, requested: Direction) -> Transition {
    let (next, action, event) = match existing {
        None => (
            VoteState::Active(requested),
            VoteAction::Added,
            VoteEvent::Created,
        ),
        Some(VoteState::Active(current)) if current == requested => (
            VoteState::Retracted(current),
            VoteAction::Removed,
            VoteEvent::Removed,
        ),
        Some(VoteState::Active(_)) => (
            VoteState::Active(requested),
            VoteAction::Switched,
            VoteEvent::Changed,
        ),
        Some(VoteState::Retracted(previous)) if previous == requested => (
            VoteState::Active(requested),
            VoteAction::Added,
            VoteEvent::Resurrected,
        ),
        Some(VoteState::Retracted(_)) => (
            VoteState::Active(requested),
            VoteAction::Switched,
            VoteEvent::Resurrected,
        ),
    };

    let before = existing.map_or(0, |state| state.contribution());
    Transition {
        next,
        delta: next.contribution() - before,
        action,
        event,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub user_id: Uuid,
    pub is_upvote: bool,
    pub is_deleted: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub modified_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
}

impl VoteRecord {
    pub fn new(subject_id: Uuid, user_id: Uuid, direction: Direction, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject_id,
            user_id,
            is_upvote: direction.is_upvote(),
            is_deleted: false,
            created_at: now,
            modified_at: None,
            deleted_at: None,
        }
    }

    pub fn direction(&self) -> Direction {
        Direction::from_upvote(self.is_upvote)
    }

    pub fn state(&self) -> VoteState {
        if self.is_deleted {
            VoteState::Retracted(self.direction())
        } else {
            VoteState::Active(self.direction())
        }
    }

    /// The row as it must be persisted once `next` is reached.
    pub fn with_state(&self, next: VoteState, now: OffsetDateTime) -> Self {
        let mut record = self.clone();
        record.modified_at = Some(now);
        match next {
            VoteState::Active(direction) => {
                record.is_upvote = direction.is_upvote();
                record.is_deleted = false;
                record.deleted_at = None;
            }
            VoteState::Retracted(direction) => {
                record.is_upvote = direction.is_upvote();
                record.is_deleted = true;
                record.deleted_at = Some(now);
            }
        }
        record
    }
}

/// What a store committed for one toggle.
#[derive(Debug, Clone)]
pub struct AppliedVote {
    pub subject: SubjectRef,
    pub previous: Option<VoteRecord>,
    pub record: VoteRecord,
    pub transition: Transition,
    pub score: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoteOutcome {
    pub subject_type: SubjectKind,
    pub subject_id: Uuid,
    pub vote_id: Uuid,
    /// `None` once the vote has been removed.
    pub vote: Option<Direction>,
    pub score: i64,
    pub delta: i64,
    pub action: VoteAction,
    #[serde(skip)]
    pub event: VoteEvent,
}

impl From<&AppliedVote> for VoteOutcome {
    fn from(applied: &AppliedVote) -> Self {
        Self {
            subject_type: applied.subject.kind,
            subject_id: applied.subject.id,
            vote_id: applied.record.id,
            vote: applied.transition.next.active_direction(),
            score: applied.score,
            delta: applied.transition.delta,
            action: applied.transition.action,
            event: applied.transition.event,
        }
    }
}
