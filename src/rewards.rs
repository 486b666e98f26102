// src/rewards.rs
use serde::Deserialize;

use crate::error::EngineError;
use crate::models::ActivityKind;
use crate::streak::MAX_TOTAL_XP;

/// XP granted per activity kind. Loaded from `XP_*` environment variables,
/// e.g. `XP_DAILY_LOGIN=10`.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct XpRewards {
    pub daily_login: i64,
    pub quiz_completion: i64,
    pub perfect_quiz: i64,
    pub homework_help: i64,
    pub use_ai_tutor: i64,
    pub challenge_complete: i64,
    pub watch_video: i64,
    pub flashcards: i64,
    pub streak_milestone: i64,
}

impl Default for XpRewards {
    fn default() -> Self {
        Self {
            daily_login: 10,
            quiz_completion: 50,
            perfect_quiz: 100,
            homework_help: 15,
            use_ai_tutor: 5,
            challenge_complete: 75,
            watch_video: 20,
            flashcards: 25,
            streak_milestone: 70,
        }
    }
}

impl XpRewards {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("XP_").from_env()
    }

    pub fn xp_for(&self, kind: ActivityKind) -> i64 {
        match kind {
            ActivityKind::DailyLogin => self.daily_login,
            ActivityKind::QuizCompletion => self.quiz_completion,
            ActivityKind::PerfectQuiz => self.perfect_quiz,
            ActivityKind::HomeworkHelp => self.homework_help,
            ActivityKind::UseAiTutor => self.use_ai_tutor,
            ActivityKind::ChallengeComplete => self.challenge_complete,
            ActivityKind::WatchVideo => self.watch_video,
            ActivityKind::Flashcards => self.flashcards,
            ActivityKind::StreakMilestone => self.streak_milestone,
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let out_of_range = |kind: ActivityKind| !(1..=MAX_TOTAL_XP).contains(&self.xp_for(kind));
        match ActivityKind::ALL.into_iter().find(|&kind| out_of_range(kind)) {
            Some(kind) => Err(EngineError::InvalidRewards(format!(
                "{} must be between 1 and {}, got {}",
                kind,
                MAX_TOTAL_XP,
                self.xp_for(kind)
            ))),
            None => Ok(()),
        }
    }
}

/// Maximum rewarded events per calendar day, per activity kind.
/// Enforced by the HTTP layer; the engine sums whatever it is given.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DailyCaps {
    pub use_ai_tutor: Option<u32>,
}

impl Default for DailyCaps {
    fn default() -> Self {
        Self {
            use_ai_tutor: Some(5),
        }
    }
}

impl DailyCaps {
    pub fn cap_for(&self, kind: ActivityKind) -> Option<u32> {
        match kind {
            ActivityKind::UseAiTutor => self.use_ai_tutor,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_published_awards() {
        let rewards = XpRewards::default();
        assert_eq!(rewards.xp_for(ActivityKind::DailyLogin), 10);
        assert_eq!(rewards.xp_for(ActivityKind::QuizCompletion), 50);
        assert_eq!(rewards.xp_for(ActivityKind::PerfectQuiz), 100);
        assert_eq!(rewards.xp_for(ActivityKind::HomeworkHelp), 15);
        assert_eq!(rewards.xp_for(ActivityKind::StreakMilestone), 70);
        assert_eq!(rewards.xp_for(ActivityKind::ChallengeComplete), 75);
        assert_eq!(rewards.xp_for(ActivityKind::WatchVideo), 20);
        assert_eq!(rewards.xp_for(ActivityKind::Flashcards), 25);
        assert_eq!(rewards.xp_for(ActivityKind::UseAiTutor), 5);
        assert!(rewards.validate().is_ok());
    }

    #[test]
    fn env_overrides_single_reward() {
        let rewards: XpRewards = envy::prefixed("XP_")
            .from_iter(vec![("XP_WATCH_VIDEO".to_string(), "35".to_string())])
            .unwrap();
        assert_eq!(rewards.watch_video, 35);
        assert_eq!(rewards.daily_login, 10);
    }

    #[test]
    fn non_positive_reward_is_rejected() {
        let rewards = XpRewards {
            flashcards: 0,
            ..XpRewards::default()
        };
        match rewards.validate() {
            Err(EngineError::InvalidRewards(msg)) => assert!(msg.contains("flashcards")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn reward_beyond_maximum_total_is_rejected() {
        let rewards = XpRewards {
            daily_login: i64::MAX,
            ..XpRewards::default()
        };
        match rewards.validate() {
            Err(EngineError::InvalidRewards(msg)) => assert!(msg.contains("daily_login")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn only_ai_tutor_is_capped_by_default() {
        let caps = DailyCaps::default();
        assert_eq!(caps.cap_for(ActivityKind::UseAiTutor), Some(5));
        assert_eq!(caps.cap_for(ActivityKind::DailyLogin), None);
    }
}
