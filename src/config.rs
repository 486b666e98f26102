// src/config.rs
use serde::Deserialize;

use crate::rewards::DailyCaps;
use crate::streak::CalendarPolicy;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Without a database URL the service runs on the in-memory store.
    pub database_url: Option<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub streak_utc_offset_minutes: i32,
    #[serde(default = "default_leaderboard_cache_ttl_secs")]
    pub leaderboard_cache_ttl_secs: u64,
    /// `0` disables the cap.
    #[serde(default = "default_ai_tutor_daily_cap")]
    pub ai_tutor_daily_cap: u32,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_leaderboard_cache_ttl_secs() -> u64 {
    30
}

fn default_ai_tutor_daily_cap() -> u32 {
    5
}

impl Config {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    pub fn calendar(&self) -> Option<CalendarPolicy> {
        CalendarPolicy::with_offset_minutes(self.streak_utc_offset_minutes)
    }

    pub fn daily_caps(&self) -> DailyCaps {
        DailyCaps {
            use_ai_tutor: (self.ai_tutor_daily_cap > 0).then_some(self.ai_tutor_daily_cap),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        envy::from_iter(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Vec<_>>(),
        )
        .unwrap()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]);
        assert_eq!(config.database_url, None);
        assert_eq!((config.host.as_str(), config.port), ("127.0.0.1", 8080));
        assert_eq!(config.calendar(), Some(CalendarPolicy::utc()));
        assert_eq!(config.daily_caps(), DailyCaps::default());
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/streaks"),
            ("PORT", "9090"),
            ("STREAK_UTC_OFFSET_MINUTES", "-300"),
            ("AI_TUTOR_DAILY_CAP", "0"),
        ]);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/streaks"));
        assert_eq!(config.port, 9090);
        assert_eq!(config.calendar(), CalendarPolicy::with_offset_minutes(-300));
        assert_eq!(config.daily_caps().use_ai_tutor, None);
    }

    #[test]
    fn out_of_range_offset_has_no_calendar() {
        let config = config_from(&[("STREAK_UTC_OFFSET_MINUTES", "1500")]);
        assert!(config.calendar().is_none());
    }
}
