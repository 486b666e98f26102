// src/store.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    ActivityKind, LeaderboardEntry, NewXpActivity, UserProgression, XpActivityRecord, XpOverflow,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Progression lock poisoned")]
    Poisoned,

    #[error(transparent)]
    Overflow(#[from] XpOverflow),
}

/// The record as it was read and as it was written by one transaction.
#[derive(Clone, Debug)]
pub struct Transition {
    pub before: UserProgression,
    pub after: UserProgression,
}

pub type ApplyFn<'a> = &'a (dyn Fn(&mut UserProgression) -> Result<(), XpOverflow> + Send + Sync);

#[async_trait]
pub trait ProgressionStore: Send + Sync {
    /// Loads (or lazily creates) the user's record, applies `apply` to it and
    /// persists it together with `entry`, all in one per-user serialized
    /// transaction. Nothing is written if any step fails, including `apply`.
    async fn transact(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
        entry: Option<NewXpActivity>,
        apply: ApplyFn<'_>,
    ) -> Result<Transition, StoreError>;

    async fn get_or_create(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<UserProgression, StoreError>;

    /// Newest first.
    async fn recent_activities(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<XpActivityRecord>, StoreError>;

    /// Counts ledger rows of `kind` with `from <= created_at < to`.
    async fn count_activities_between(
        &self,
        user_id: Uuid,
        kind: ActivityKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, StoreError>;

    async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>, StoreError>;
}
