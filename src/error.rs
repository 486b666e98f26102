// src/error.rs
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid XP amount: {0}")]
    InvalidXpAmount(String),

    #[error("Invalid reward configuration: {0}")]
    InvalidRewards(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}
