// src/progression.rs
use actix_web::{HttpResponse, get, post, web};
use chrono::Utc;
use moka::future::Cache;
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use uuid::Uuid;

use crate::engine::StreakEngine;
use crate::error::EngineError;
use crate::models::{AwardXpRequest, LeaderboardEntry, LimitQuery, UserProgression, XpAward};
use crate::rewards::DailyCaps;
use crate::streak::LevelProgress;

/// Leaderboard responses keyed by generation and limit.
///
/// Every XP change bumps the generation, so a board computed before the
/// change is unreachable even if its insert lands after the bump.
pub struct LeaderboardCache {
    generation: AtomicU64,
    boards: Cache<(u64, i64), Vec<LeaderboardEntry>>,
}

impl LeaderboardCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            generation: AtomicU64::new(0),
            boards: Cache::builder().max_capacity(100).time_to_live(ttl).build(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub async fn get(&self, generation: u64, limit: i64) -> Option<Vec<LeaderboardEntry>> {
        self.boards.get(&(generation, limit)).await
    }

    pub async fn insert(&self, generation: u64, limit: i64, entries: Vec<LeaderboardEntry>) {
        self.boards.insert((generation, limit), entries).await;
    }

    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.boards.invalidate_all();
    }
}

const MAX_LIMIT: i64 = 100;
const DEFAULT_ACTIVITY_LIMIT: i64 = 20;
const DEFAULT_LEADERBOARD_LIMIT: i64 = 10;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health);
    cfg.service(record_login);
    cfg.service(award_xp);
    cfg.service(get_streak);
    cfg.service(get_xp_activities);
    cfg.service(get_leaderboard);
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StreakView {
    #[serde(flatten)]
    progression: UserProgression,
    progress: LevelProgress,
}

fn clamp_limit(query: &LimitQuery, default: i64) -> i64 {
    query.limit.unwrap_or(default).clamp(1, MAX_LIMIT)
}

/// Only integer literals are accepted; `12.5` or `1e3` are rejected.
fn parse_xp_amount(number: &serde_json::Number) -> Result<i64, EngineError> {
    number
        .as_i64()
        .ok_or_else(|| EngineError::InvalidXpAmount(format!("expected an integer, got {}", number)))
}

fn error_response(err: EngineError, context: &str) -> HttpResponse {
    match err {
        EngineError::InvalidXpAmount(msg) => HttpResponse::BadRequest().json(json!({"error": msg})),
        e => {
            tracing::error!("{}: {}", context, e);
            HttpResponse::InternalServerError().json(json!({"error": "Internal server error"}))
        }
    }
}

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({"status": "ok"}))
}

#[post("/users/{user_id}/login")]
pub async fn record_login(
    engine: web::Data<StreakEngine>,
    cache: web::Data<LeaderboardCache>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, actix_web::Error> {
    let user_id = path.into_inner();

    match engine.record_daily_login(user_id, Utc::now()).await {
        Ok(outcome) => {
            cache.invalidate();
            Ok(HttpResponse::Ok().json(outcome))
        }
        Err(e) => Ok(error_response(e, "Failed to record daily login")),
    }
}

#[post("/users/{user_id}/xp")]
pub async fn award_xp(
    engine: web::Data<StreakEngine>,
    cache: web::Data<LeaderboardCache>,
    caps: web::Data<DailyCaps>,
    path: web::Path<Uuid>,
    req: web::Json<AwardXpRequest>,
) -> Result<HttpResponse, actix_web::Error> {
    let user_id = path.into_inner();
    let req = req.into_inner();
    let now = Utc::now();

    let xp_amount = match &req.xp_amount {
        Some(number) => match parse_xp_amount(number) {
            Ok(amount) => amount,
            Err(e) => return Ok(error_response(e, "Invalid XP amount")),
        },
        None => engine.rewards().xp_for(req.action),
    };
    let description = req
        .description
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| req.action.default_description().to_string());

    if let Some(cap) = caps.cap_for(req.action) {
        let used = match engine.activities_today(user_id, req.action, now).await {
            Ok(count) => count,
            Err(e) => return Ok(error_response(e, "Failed to count today's activities")),
        };
        if used >= i64::from(cap) {
            tracing::info!(%user_id, action = %req.action, cap, "daily XP cap reached");
            return match engine.progression(user_id, now).await {
                Ok(progression) => Ok(HttpResponse::Ok().json(XpAward {
                    xp_earned: 0,
                    total_xp: progression.total_xp(),
                    level: progression.level(),
                    level_up: false,
                    capped: true,
                })),
                Err(e) => Ok(error_response(e, "Failed to load progression")),
            };
        }
    }

    match engine
        .award_xp(user_id, req.action, &description, xp_amount, now)
        .await
    {
        Ok(award) => {
            cache.invalidate();
            Ok(HttpResponse::Ok().json(award))
        }
        Err(e) => Ok(error_response(e, "Failed to award XP")),
    }
}

#[get("/users/{user_id}/streak")]
pub async fn get_streak(
    engine: web::Data<StreakEngine>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, actix_web::Error> {
    let user_id = path.into_inner();

    match engine.progression(user_id, Utc::now()).await {
        Ok(progression) => {
            let progress = LevelProgress::of(progression.total_xp());
            Ok(HttpResponse::Ok().json(StreakView {
                progression,
                progress,
            }))
        }
        Err(e) => Ok(error_response(e, "Failed to load progression")),
    }
}

#[get("/users/{user_id}/xp-activities")]
pub async fn get_xp_activities(
    engine: web::Data<StreakEngine>,
    path: web::Path<Uuid>,
    query: web::Query<LimitQuery>,
) -> Result<HttpResponse, actix_web::Error> {
    let user_id = path.into_inner();
    let limit = clamp_limit(&query, DEFAULT_ACTIVITY_LIMIT);

    match engine.xp_activities(user_id, limit).await {
        Ok(activities) => Ok(HttpResponse::Ok().json(activities)),
        Err(e) => Ok(error_response(e, "Failed to load XP activities")),
    }
}

#[get("/xp-leaderboard")]
pub async fn get_leaderboard(
    engine: web::Data<StreakEngine>,
    cache: web::Data<LeaderboardCache>,
    query: web::Query<LimitQuery>,
) -> Result<HttpResponse, actix_web::Error> {
    let limit = clamp_limit(&query, DEFAULT_LEADERBOARD_LIMIT);

    let generation = cache.generation();
    if let Some(cached) = cache.get(generation, limit).await {
        tracing::debug!("Leaderboard cache hit for limit {}", limit);
        return Ok(HttpResponse::Ok().json(cached));
    }

    match engine.leaderboard(limit).await {
        Ok(entries) => {
            cache.insert(generation, limit, entries.clone()).await;
            Ok(HttpResponse::Ok().json(entries))
        }
        Err(e) => Ok(error_response(e, "Failed to load leaderboard")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::models::LeaderboardUser;
    use crate::rewards::XpRewards;
    use crate::streak::CalendarPolicy;
    use actix_web::{App, http::StatusCode, test as actix_test};
    use serde_json::Value;
    use std::sync::Arc;

    fn app_state() -> (web::Data<StreakEngine>, web::Data<LeaderboardCache>, web::Data<DailyCaps>) {
        let engine = StreakEngine::new(
            Arc::new(MemoryStore::new()),
            XpRewards::default(),
            CalendarPolicy::utc(),
        )
        .unwrap();
        let cache = LeaderboardCache::new(Duration::from_secs(60));
        (
            web::Data::new(engine),
            web::Data::new(cache),
            web::Data::new(DailyCaps::default()),
        )
    }

    macro_rules! service {
        () => {{
            let (engine, cache, caps) = app_state();
            actix_test::init_service(
                App::new()
                    .app_data(engine)
                    .app_data(cache)
                    .app_data(caps)
                    .configure(init_routes),
            )
            .await
        }};
    }

    #[actix_web::test]
    async fn login_returns_streak_payload() {
        let app = service!();
        let user_id = Uuid::new_v4();

        let req = actix_test::TestRequest::post()
            .uri(&format!("/users/{}/login", user_id))
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["streak"], 1);
        assert_eq!(body["longestStreak"], 1);
        assert_eq!(body["xpEarned"], 10);
        assert_eq!(body["level"], 1);
        assert_eq!(body["levelUp"], false);
    }

    #[actix_web::test]
    async fn award_uses_explicit_amount_or_configured_reward() {
        let app = service!();
        let user_id = Uuid::new_v4();

        let req = actix_test::TestRequest::post()
            .uri(&format!("/users/{}/xp", user_id))
            .set_json(json!({"action": "perfect_quiz", "description": "Fractions", "xpAmount": 990}))
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["totalXp"], 990);
        assert_eq!(body["levelUp"], false);

        let req = actix_test::TestRequest::post()
            .uri(&format!("/users/{}/xp", user_id))
            .set_json(json!({"action": "watch_video"}))
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["xpEarned"], 20);
        assert_eq!(body["totalXp"], 1010);
        assert_eq!(body["level"], 2);
        assert_eq!(body["levelUp"], true);
    }

    #[actix_web::test]
    async fn rejects_non_integer_and_non_positive_amounts() {
        let app = service!();
        let user_id = Uuid::new_v4();

        for amount in [json!(12.5), json!(0), json!(-3)] {
            let req = actix_test::TestRequest::post()
                .uri(&format!("/users/{}/xp", user_id))
                .set_json(json!({"action": "homework_help", "xpAmount": amount}))
                .to_request();
            let resp = actix_test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        }

        let req = actix_test::TestRequest::get()
            .uri(&format!("/users/{}/xp-activities", user_id))
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.as_array().map(Vec::len), Some(0));
    }

    #[actix_web::test]
    async fn unknown_action_is_a_bad_request() {
        let app = service!();
        let req = actix_test::TestRequest::post()
            .uri(&format!("/users/{}/xp", Uuid::new_v4()))
            .set_json(json!({"action": "teleport", "xpAmount": 5}))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn ai_tutor_awards_stop_at_daily_cap() {
        let app = service!();
        let user_id = Uuid::new_v4();

        let mut last = Value::Null;
        for _ in 0..6 {
            let req = actix_test::TestRequest::post()
                .uri(&format!("/users/{}/xp", user_id))
                .set_json(json!({"action": "use_ai_tutor"}))
                .to_request();
            last = actix_test::call_and_read_body_json(&app, req).await;
        }

        assert_eq!(last["xpEarned"], 0);
        assert_eq!(last["capped"], true);
        assert_eq!(last["totalXp"], 25);
    }

    #[actix_web::test]
    async fn streak_view_includes_level_progress() {
        let app = service!();
        let user_id = Uuid::new_v4();

        let req = actix_test::TestRequest::get()
            .uri(&format!("/users/{}/streak", user_id))
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["currentStreak"], 0);
        assert_eq!(body["level"], 1);
        assert_eq!(body["lastActivityAt"], Value::Null);

        let req = actix_test::TestRequest::post()
            .uri(&format!("/users/{}/xp", user_id))
            .set_json(json!({"action": "challenge_complete", "xpAmount": 1250}))
            .to_request();
        actix_test::call_service(&app, req).await;

        let req = actix_test::TestRequest::get()
            .uri(&format!("/users/{}/streak", user_id))
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["totalXp"], 1250);
        assert_eq!(body["progress"]["xpForLevel"], 1000);
        assert_eq!(body["progress"]["xpIntoCurrentLevel"], 250);
        assert_eq!(body["progress"]["xpNeededForNextLevel"], 1000);
    }

    #[actix_web::test]
    async fn leaderboard_reflects_awards_after_cache_invalidation() {
        let app = service!();
        let (leader, runner_up) = (Uuid::new_v4(), Uuid::new_v4());

        let award = |user_id: Uuid, xp: i64| {
            actix_test::TestRequest::post()
                .uri(&format!("/users/{}/xp", user_id))
                .set_json(json!({"action": "quiz_completion", "xpAmount": xp}))
                .to_request()
        };
        actix_test::call_service(&app, award(runner_up, 400)).await;

        let board = || actix_test::TestRequest::get().uri("/xp-leaderboard?limit=5").to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, board()).await;
        assert_eq!(body.as_array().map(Vec::len), Some(1));

        actix_test::call_service(&app, award(leader, 1500)).await;
        let body: Value = actix_test::call_and_read_body_json(&app, board()).await;
        assert_eq!(body[0]["user"]["id"], leader.to_string());
        assert_eq!(body[0]["totalXp"], 1500);
        assert_eq!(body[0]["level"], 2);
        assert_eq!(body[1]["user"]["id"], runner_up.to_string());
    }

    #[actix_web::test]
    async fn board_computed_before_an_award_is_not_served_after_it() {
        let cache = LeaderboardCache::new(Duration::from_secs(60));
        let stale = vec![LeaderboardEntry {
            user: LeaderboardUser {
                id: Uuid::new_v4(),
                username: None,
            },
            total_xp: 100,
            level: 1,
        }];

        let started = cache.generation();
        cache.invalidate();
        cache.insert(started, 5, stale.clone()).await;

        assert_eq!(cache.get(cache.generation(), 5).await, None);
        cache.insert(cache.generation(), 5, stale.clone()).await;
        assert_eq!(cache.get(cache.generation(), 5).await, Some(stale));
    }

    #[actix_web::test]
    async fn oversized_amount_is_a_bad_request() {
        let app = service!();
        let req = actix_test::TestRequest::post()
            .uri(&format!("/users/{}/xp", Uuid::new_v4()))
            .set_json(json!({"action": "quiz_completion", "xpAmount": i64::MAX}))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn limits_are_clamped() {
        assert_eq!(clamp_limit(&LimitQuery { limit: None }, 20), 20);
        assert_eq!(clamp_limit(&LimitQuery { limit: Some(0) }, 20), 1);
        assert_eq!(clamp_limit(&LimitQuery { limit: Some(5000) }, 20), MAX_LIMIT);
    }
}
