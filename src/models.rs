// src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::streak::{MAX_TOTAL_XP, level_for};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    DailyLogin,
    QuizCompletion,
    PerfectQuiz,
    HomeworkHelp,
    UseAiTutor,
    ChallengeComplete,
    WatchVideo,
    Flashcards,
    StreakMilestone,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 9] = [
        ActivityKind::DailyLogin,
        ActivityKind::QuizCompletion,
        ActivityKind::PerfectQuiz,
        ActivityKind::HomeworkHelp,
        ActivityKind::UseAiTutor,
        ActivityKind::ChallengeComplete,
        ActivityKind::WatchVideo,
        ActivityKind::Flashcards,
        ActivityKind::StreakMilestone,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::DailyLogin => "daily_login",
            ActivityKind::QuizCompletion => "quiz_completion",
            ActivityKind::PerfectQuiz => "perfect_quiz",
            ActivityKind::HomeworkHelp => "homework_help",
            ActivityKind::UseAiTutor => "use_ai_tutor",
            ActivityKind::ChallengeComplete => "challenge_complete",
            ActivityKind::WatchVideo => "watch_video",
            ActivityKind::Flashcards => "flashcards",
            ActivityKind::StreakMilestone => "streak_milestone",
        }
    }

    /// Display label used when the caller does not send a description.
    pub fn default_description(self) -> &'static str {
        match self {
            ActivityKind::DailyLogin => "Daily login",
            ActivityKind::QuizCompletion => "Completed a quiz",
            ActivityKind::PerfectQuiz => "Perfect quiz score",
            ActivityKind::HomeworkHelp => "Asked a homework help question",
            ActivityKind::UseAiTutor => "Used the AI tutor",
            ActivityKind::ChallengeComplete => "Completed a challenge",
            ActivityKind::WatchVideo => "Watched a video",
            ActivityKind::Flashcards => "Studied flashcards",
            ActivityKind::StreakMilestone => "Kept a weekly streak",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActivityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown activity kind: {}", s))
    }
}

/// Per-user streak and XP state.
///
/// `total_xp` and `level` only change through [`UserProgression::add_xp`],
/// which keeps `level == 1 + total_xp / 1000`.
#[derive(Serialize, Clone, Debug, PartialEq, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserProgression {
    pub user_id: Uuid,
    pub(crate) current_streak: i32,
    pub(crate) longest_streak: i32,
    /// `None` until the first daily login.
    pub(crate) last_activity_at: Option<DateTime<Utc>>,
    total_xp: i64,
    level: i32,
    pub(crate) updated_at: DateTime<Utc>,
}

impl UserProgression {
    pub fn new(user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            current_streak: 0,
            longest_streak: 0,
            last_activity_at: None,
            total_xp: 0,
            level: level_for(0),
            updated_at: now,
        }
    }

    pub fn current_streak(&self) -> i32 {
        self.current_streak
    }

    pub fn longest_streak(&self) -> i32 {
        self.longest_streak
    }

    pub fn last_activity_at(&self) -> Option<DateTime<Utc>> {
        self.last_activity_at
    }

    pub fn total_xp(&self) -> i64 {
        self.total_xp
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Leaves the record untouched when the new total would leave
    /// `0..=MAX_TOTAL_XP`.
    pub(crate) fn add_xp(&mut self, xp: i64) -> Result<(), XpOverflow> {
        let total = self
            .total_xp
            .checked_add(xp)
            .filter(|total| (0..=MAX_TOTAL_XP).contains(total))
            .ok_or(XpOverflow {
                total_xp: self.total_xp,
                xp,
            })?;
        self.total_xp = total;
        self.level = level_for(total);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("adding {xp} XP to a total of {total_xp} exceeds the maximum total XP")]
pub struct XpOverflow {
    pub total_xp: i64,
    pub xp: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct XpActivityRecord {
    pub id: i64,
    pub user_id: Uuid,
    pub activity_kind: ActivityKind,
    pub description: String,
    pub xp_earned: i64,
    pub created_at: DateTime<Utc>,
}

/// Ledger row before the store assigns it an id.
#[derive(Clone, Debug)]
pub struct NewXpActivity {
    pub user_id: Uuid,
    pub activity_kind: ActivityKind,
    pub description: String,
    pub xp_earned: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LeaderboardUser {
    pub id: Uuid,
    pub username: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub user: LeaderboardUser,
    pub total_xp: i64,
    pub level: i32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoginOutcome {
    #[serde(rename = "streak")]
    pub current_streak: i32,
    pub longest_streak: i32,
    pub xp_earned: i64,
    pub level: i32,
    pub level_up: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct XpAward {
    pub xp_earned: i64,
    pub total_xp: i64,
    pub level: i32,
    pub level_up: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub capped: bool,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AwardXpRequest {
    pub action: ActivityKind,
    pub description: Option<String>,
    pub xp_amount: Option<serde_json::Number>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}
