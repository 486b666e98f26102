// src/memory.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

use crate::models::{
    ActivityKind, LeaderboardEntry, LeaderboardUser, NewXpActivity, UserProgression,
    XpActivityRecord,
};
use crate::store::{ApplyFn, ProgressionStore, StoreError, Transition};

#[derive(Default)]
struct UserSlot {
    progression: Option<UserProgression>,
    activities: Vec<XpActivityRecord>,
}

/// In-process store for development and tests.
///
/// Each user has its own slot lock, held for the whole read-modify-write.
/// The outer map lock is only taken to find or insert a slot.
#[derive(Default)]
pub struct MemoryStore {
    slots: RwLock<HashMap<Uuid, Arc<Mutex<UserSlot>>>>,
    next_activity_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, user_id: Uuid) -> Result<Arc<Mutex<UserSlot>>, StoreError> {
        if let Some(slot) = self
            .slots
            .read()
            .map_err(|_| StoreError::Poisoned)?
            .get(&user_id)
        {
            return Ok(Arc::clone(slot));
        }
        let mut slots = self.slots.write().map_err(|_| StoreError::Poisoned)?;
        Ok(Arc::clone(slots.entry(user_id).or_default()))
    }

    fn all_slots(&self) -> Result<Vec<Arc<Mutex<UserSlot>>>, StoreError> {
        let slots = self.slots.read().map_err(|_| StoreError::Poisoned)?;
        Ok(slots.values().cloned().collect())
    }
}

#[async_trait]
impl ProgressionStore for MemoryStore {
    async fn transact(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
        entry: Option<NewXpActivity>,
        apply: ApplyFn<'_>,
    ) -> Result<Transition, StoreError> {
        let slot = self.slot(user_id)?;
        let mut slot = slot.lock().map_err(|_| StoreError::Poisoned)?;

        let before = slot
            .progression
            .clone()
            .unwrap_or_else(|| UserProgression::new(user_id, now));
        let mut after = before.clone();
        apply(&mut after)?;
        after.updated_at = now;

        if let Some(entry) = entry {
            let id = self.next_activity_id.fetch_add(1, Ordering::Relaxed) + 1;
            slot.activities.push(XpActivityRecord {
                id,
                user_id: entry.user_id,
                activity_kind: entry.activity_kind,
                description: entry.description,
                xp_earned: entry.xp_earned,
                created_at: entry.created_at,
            });
        }
        slot.progression = Some(after.clone());

        Ok(Transition { before, after })
    }

    async fn get_or_create(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<UserProgression, StoreError> {
        let slot = self.slot(user_id)?;
        let mut slot = slot.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(slot
            .progression
            .get_or_insert_with(|| UserProgression::new(user_id, now))
            .clone())
    }

    async fn recent_activities(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<XpActivityRecord>, StoreError> {
        let slot = self.slot(user_id)?;
        let slot = slot.lock().map_err(|_| StoreError::Poisoned)?;

        let mut activities = slot.activities.clone();
        activities.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        activities.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(activities)
    }

    async fn count_activities_between(
        &self,
        user_id: Uuid,
        kind: ActivityKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let slot = self.slot(user_id)?;
        let slot = slot.lock().map_err(|_| StoreError::Poisoned)?;
        let count = slot
            .activities
            .iter()
            .filter(|a| a.activity_kind == kind && a.created_at >= from && a.created_at < to)
            .count();
        Ok(count as i64)
    }

    async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let mut progressions = Vec::new();
        for slot in self.all_slots()? {
            let slot = slot.lock().map_err(|_| StoreError::Poisoned)?;
            if let Some(progression) = &slot.progression {
                progressions.push(progression.clone());
            }
        }
        progressions.sort_by(|a, b| {
            b.total_xp()
                .cmp(&a.total_xp())
                .then(a.user_id.cmp(&b.user_id))
        });

        Ok(progressions
            .into_iter()
            .take(usize::try_from(limit.max(0)).unwrap_or(usize::MAX))
            .map(|p| LeaderboardEntry {
                user: LeaderboardUser {
                    id: p.user_id,
                    username: None,
                },
                total_xp: p.total_xp(),
                level: p.level(),
            })
            .collect())
    }
}
