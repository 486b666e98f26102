// src/streak.rs
//! Day-boundary and level rules for the progression engine.
//!
//! Everything here is pure: callers pass the current instant in, and the
//! calendar used for day boundaries is an explicit [`CalendarPolicy`].

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use serde::Serialize;

use crate::models::UserProgression;

pub const XP_PER_LEVEL: i64 = 1000;

/// Longest gap between two logins that can still extend a streak.
pub const MAX_STREAK_GAP_HOURS: i64 = 48;

/// Largest total whose level still fits in an `i32`.
pub const MAX_TOTAL_XP: i64 = i32::MAX as i64 * XP_PER_LEVEL - 1;

/// Callers keep `total_xp` within `0..=MAX_TOTAL_XP`.
pub fn level_for(total_xp: i64) -> i32 {
    let level = 1 + total_xp.clamp(0, MAX_TOTAL_XP) / XP_PER_LEVEL;
    level as i32
}

pub fn xp_for_level(level: i32) -> i64 {
    (i64::from(level.max(1)) - 1) * XP_PER_LEVEL
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LevelProgress {
    pub xp_for_level: i64,
    pub xp_into_current_level: i64,
    pub xp_needed_for_next_level: i64,
}

impl LevelProgress {
    pub fn of(total_xp: i64) -> Self {
        let base = xp_for_level(level_for(total_xp));
        Self {
            xp_for_level: base,
            xp_into_current_level: total_xp - base,
            xp_needed_for_next_level: XP_PER_LEVEL,
        }
    }
}

/// Calendar in which "same day" and "next day" are decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CalendarPolicy {
    offset: FixedOffset,
}

impl CalendarPolicy {
    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    /// Returns `None` when the offset is not strictly within ±24h.
    pub fn with_offset_minutes(minutes: i32) -> Option<Self> {
        let seconds = minutes.checked_mul(60)?;
        FixedOffset::east_opt(seconds).map(|offset| Self { offset })
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    /// UTC bounds `[start, end)` of the calendar day containing `instant`.
    pub fn day_bounds(&self, instant: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let midnight = self.local_date(instant).and_time(NaiveTime::MIN);
        let start = midnight.and_utc() - Duration::seconds(i64::from(self.offset.local_minus_utc()));
        (start, start + Duration::days(1))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DayTransition {
    SameDay,
    NextDay,
    Broken,
}

impl DayTransition {
    /// Adjacent dates alone are not enough for `NextDay`: the raw gap must
    /// also be non-negative and under 48 hours.
    pub fn classify(last: DateTime<Utc>, now: DateTime<Utc>, calendar: &CalendarPolicy) -> Self {
        let last_date = calendar.local_date(last);
        let now_date = calendar.local_date(now);
        if last_date == now_date {
            return DayTransition::SameDay;
        }

        let elapsed = now - last;
        let adjacent = last_date.succ_opt() == Some(now_date);
        if adjacent
            && elapsed >= Duration::zero()
            && elapsed < Duration::hours(MAX_STREAK_GAP_HOURS)
        {
            DayTransition::NextDay
        } else {
            DayTransition::Broken
        }
    }
}

impl UserProgression {
    /// Applies a daily login to the streak fields. XP is untouched.
    pub(crate) fn register_login(&mut self, now: DateTime<Utc>, calendar: &CalendarPolicy) {
        match self.last_activity_at {
            None => {
                self.current_streak = 1;
                self.longest_streak = self.longest_streak.max(1);
            }
            Some(last) => match DayTransition::classify(last, now, calendar) {
                DayTransition::SameDay => {}
                DayTransition::NextDay => {
                    self.current_streak = self.current_streak.saturating_add(1);
                    self.longest_streak = self.longest_streak.max(self.current_streak);
                }
                DayTransition::Broken => {
                    tracing::debug!(
                        user_id = %self.user_id,
                        previous = self.current_streak,
                        "streak broken"
                    );
                    self.current_streak = 1;
                }
            },
        }
        self.last_activity_at = Some(now);
    }
}
