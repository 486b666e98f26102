// src/db.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::{
    ActivityKind, LeaderboardEntry, LeaderboardUser, NewXpActivity, UserProgression,
    XpActivityRecord,
};
use crate::store::{ApplyFn, ProgressionStore, StoreError, Transition};

const PROGRESSION_COLUMNS: &str =
    "user_id, current_streak, longest_streak, last_activity_at, total_xp, level, updated_at";

#[derive(FromRow)]
struct XpActivityRow {
    id: i64,
    user_id: Uuid,
    activity_kind: String,
    description: String,
    xp_earned: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<XpActivityRow> for XpActivityRecord {
    type Error = StoreError;

    fn try_from(row: XpActivityRow) -> Result<Self, Self::Error> {
        let activity_kind = row
            .activity_kind
            .parse::<ActivityKind>()
            .map_err(|e| StoreError::Corrupt(format!("xp_activities.id={}: {}", row.id, e)))?;
        Ok(XpActivityRecord {
            id: row.id,
            user_id: row.user_id,
            activity_kind,
            description: row.description,
            xp_earned: row.xp_earned,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct LeaderboardRow {
    user_id: Uuid,
    username: Option<String>,
    total_xp: i64,
    level: i32,
}

/// Postgres-backed store. Per-user serialization comes from
/// `SELECT ... FOR UPDATE` on the progression row.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }
}

async fn ensure_progression(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO user_progression (user_id, current_streak, longest_streak, last_activity_at, total_xp, level, updated_at) VALUES ($1, 0, 0, NULL, 0, 1, $2) ON CONFLICT (user_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn lock_progression(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<UserProgression, sqlx::Error> {
    sqlx::query_as::<_, UserProgression>(&format!(
        "SELECT {} FROM user_progression WHERE user_id = $1 FOR UPDATE",
        PROGRESSION_COLUMNS
    ))
    .bind(user_id)
    .fetch_one(&mut **tx)
    .await
}

async fn append_activity(
    tx: &mut Transaction<'_, Postgres>,
    entry: &NewXpActivity,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO xp_activities (user_id, activity_kind, description, xp_earned, created_at) VALUES ($1, $2, $3, $4, $5)")
        .bind(entry.user_id)
        .bind(entry.activity_kind.as_str())
        .bind(&entry.description)
        .bind(entry.xp_earned)
        .bind(entry.created_at)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn save_progression(
    tx: &mut Transaction<'_, Postgres>,
    progression: &UserProgression,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE user_progression SET current_streak = $2, longest_streak = $3, last_activity_at = $4, total_xp = $5, level = $6, updated_at = $7 WHERE user_id = $1")
        .bind(progression.user_id)
        .bind(progression.current_streak())
        .bind(progression.longest_streak())
        .bind(progression.last_activity_at())
        .bind(progression.total_xp())
        .bind(progression.level())
        .bind(progression.updated_at())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[async_trait]
impl ProgressionStore for PgStore {
    async fn transact(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
        entry: Option<NewXpActivity>,
        apply: ApplyFn<'_>,
    ) -> Result<Transition, StoreError> {
        // Dropping `tx` without commit rolls back both writes.
        let mut tx = self.pool.begin().await?;

        if let Some(entry) = &entry {
            append_activity(&mut tx, entry).await?;
        }
        ensure_progression(&mut tx, user_id, now).await?;
        let before = lock_progression(&mut tx, user_id).await?;

        let mut after = before.clone();
        apply(&mut after)?;
        after.updated_at = now;
        save_progression(&mut tx, &after).await?;

        tx.commit().await?;
        Ok(Transition { before, after })
    }

    async fn get_or_create(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<UserProgression, StoreError> {
        let mut tx = self.pool.begin().await?;
        ensure_progression(&mut tx, user_id, now).await?;
        let progression = sqlx::query_as::<_, UserProgression>(&format!(
            "SELECT {} FROM user_progression WHERE user_id = $1",
            PROGRESSION_COLUMNS
        ))
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(progression)
    }

    async fn recent_activities(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<XpActivityRecord>, StoreError> {
        let rows = sqlx::query_as::<_, XpActivityRow>(
            "SELECT id, user_id, activity_kind, description, xp_earned, created_at FROM xp_activities WHERE user_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(XpActivityRecord::try_from).collect()
    }

    async fn count_activities_between(
        &self,
        user_id: Uuid,
        kind: ActivityKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM xp_activities WHERE user_id = $1 AND activity_kind = $2 AND created_at >= $3 AND created_at < $4",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let rows = sqlx::query_as::<_, LeaderboardRow>(
            "SELECT p.user_id, u.username, p.total_xp, p.level FROM user_progression p LEFT JOIN users u ON u.id = p.user_id ORDER BY p.total_xp DESC, p.user_id ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| LeaderboardEntry {
                user: LeaderboardUser {
                    id: row.user_id,
                    username: row.username,
                },
                total_xp: row.total_xp,
                level: row.level,
            })
            .collect())
    }
}
