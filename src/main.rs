// src/main.rs
use actix_web::{App, HttpServer, middleware::Logger, web};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod config;
mod db;
mod engine;
mod error;
mod memory;
mod models;
mod progression;
mod rewards;
mod store;
mod streak;

use crate::engine::StreakEngine;
use crate::progression::LeaderboardCache;
use crate::store::ProgressionStore;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    tracing::info!("Starting study streaks service");

    dotenv::dotenv().ok();
    let config = config::Config::from_env().expect("Failed to load config from environment");
    let rewards = rewards::XpRewards::from_env().expect("Failed to load XP rewards from environment");
    let calendar = config
        .calendar()
        .expect("STREAK_UTC_OFFSET_MINUTES must be within one day");
    tracing::info!("Day boundaries computed at UTC offset {}", calendar.offset());

    let store: Arc<dyn ProgressionStore> = match &config.database_url {
        Some(url) => Arc::new(
            db::PgStore::connect(url)
                .await
                .expect("Failed to connect to Postgres"),
        ),
        None => {
            tracing::warn!("DATABASE_URL not set, progression is kept in memory only");
            Arc::new(memory::MemoryStore::new())
        }
    };

    let engine = StreakEngine::new(store, rewards, calendar).expect("Invalid XP reward configuration");

    let cache = LeaderboardCache::new(Duration::from_secs(config.leaderboard_cache_ttl_secs));

    let engine = web::Data::new(engine);
    let cache = web::Data::new(cache);
    let caps = web::Data::new(config.daily_caps());
    let bind = (config.host.clone(), config.port);

    HttpServer::new(move || {
        App::new()
            .app_data(engine.clone())
            .app_data(cache.clone())
            .app_data(caps.clone())
            .wrap(Logger::default())
            .configure(progression::init_routes)
    })
    .bind(bind)?
    .run()
    .await
}
