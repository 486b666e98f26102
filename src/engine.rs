// src/engine.rs
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{
    ActivityKind, LeaderboardEntry, LoginOutcome, NewXpActivity, UserProgression, XpActivityRecord,
    XpAward,
};
use crate::rewards::XpRewards;
use crate::store::{ProgressionStore, StoreError};
use crate::streak::{CalendarPolicy, MAX_TOTAL_XP};

/// Streak and XP rules over a [`ProgressionStore`].
///
/// Every call takes `now` explicitly; the engine never reads a clock.
#[derive(Clone)]
pub struct StreakEngine {
    store: Arc<dyn ProgressionStore>,
    rewards: XpRewards,
    calendar: CalendarPolicy,
}

impl StreakEngine {
    pub fn new(
        store: Arc<dyn ProgressionStore>,
        rewards: XpRewards,
        calendar: CalendarPolicy,
    ) -> Result<Self, EngineError> {
        rewards.validate()?;
        Ok(Self {
            store,
            rewards,
            calendar,
        })
    }

    pub fn rewards(&self) -> &XpRewards {
        &self.rewards
    }

    /// Evaluates the daily streak and grants the daily-login award in a
    /// single transaction. Repeated same-day logins still earn XP.
    pub async fn record_daily_login(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<LoginOutcome, EngineError> {
        let xp = self.rewards.daily_login;
        let entry = NewXpActivity {
            user_id,
            activity_kind: ActivityKind::DailyLogin,
            description: ActivityKind::DailyLogin.default_description().to_string(),
            xp_earned: xp,
            created_at: now,
        };
        let calendar = self.calendar;
        let apply = move |progression: &mut UserProgression| {
            progression.register_login(now, &calendar);
            progression.add_xp(xp)
        };

        let transition = self
            .store
            .transact(user_id, now, Some(entry), &apply)
            .await
            .map_err(reject_overflow)?;
        let after = &transition.after;
        let level_up = after.level() > transition.before.level();
        if level_up {
            tracing::info!(%user_id, level = after.level(), "level up on daily login");
        }
        tracing::debug!(
            %user_id,
            streak = after.current_streak(),
            longest = after.longest_streak(),
            "daily login recorded"
        );

        Ok(LoginOutcome {
            current_streak: after.current_streak(),
            longest_streak: after.longest_streak(),
            xp_earned: xp,
            level: after.level(),
            level_up,
        })
    }

    /// Appends a ledger row and adds `xp_amount` to the user's total.
    /// Streak fields are never touched here.
    pub async fn award_xp(
        &self,
        user_id: Uuid,
        kind: ActivityKind,
        description: &str,
        xp_amount: i64,
        now: DateTime<Utc>,
    ) -> Result<XpAward, EngineError> {
        if xp_amount <= 0 || xp_amount > MAX_TOTAL_XP {
            return Err(EngineError::InvalidXpAmount(format!(
                "expected a positive integer up to {}, got {}",
                MAX_TOTAL_XP, xp_amount
            )));
        }

        let entry = NewXpActivity {
            user_id,
            activity_kind: kind,
            description: description.to_string(),
            xp_earned: xp_amount,
            created_at: now,
        };
        let apply = move |progression: &mut UserProgression| progression.add_xp(xp_amount);

        let transition = self
            .store
            .transact(user_id, now, Some(entry), &apply)
            .await
            .map_err(reject_overflow)?;
        let after = &transition.after;
        let level_up = after.level() > transition.before.level();
        if level_up {
            tracing::info!(%user_id, %kind, level = after.level(), "level up");
        }

        Ok(XpAward {
            xp_earned: xp_amount,
            total_xp: after.total_xp(),
            level: after.level(),
            level_up,
            capped: false,
        })
    }

    /// Returns the user's record, persisting a zero state on first access.
    pub async fn progression(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<UserProgression, EngineError> {
        Ok(self.store.get_or_create(user_id, now).await?)
    }

    pub async fn xp_activities(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<XpActivityRecord>, EngineError> {
        Ok(self.store.recent_activities(user_id, limit).await?)
    }

    pub async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>, EngineError> {
        Ok(self.store.leaderboard(limit).await?)
    }

    /// Ledger rows of `kind` on the calendar day containing `now`.
    pub async fn activities_today(
        &self,
        user_id: Uuid,
        kind: ActivityKind,
        now: DateTime<Utc>,
    ) -> Result<i64, EngineError> {
        let (start, end) = self.calendar.day_bounds(now);
        Ok(self
            .store
            .count_activities_between(user_id, kind, start, end)
            .await?)
    }
}

/// An award that would push the total out of range is a rejected amount,
/// not a persistence failure. The store has already rolled back.
fn reject_overflow(err: StoreError) -> EngineError {
    match err {
        StoreError::Overflow(overflow) => EngineError::InvalidXpAmount(overflow.to_string()),
        other => EngineError::Persistence(other),
    }
}
