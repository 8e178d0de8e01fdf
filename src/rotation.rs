//! # Sector Rotation
//! Persisted round-robin cursor over enabled sectors.
//!
//! State lives in the store as one JSON blob under a key (default
//! `"sector_rotation"`). Every mutation is a load → mutate → save cycle
//! guarded by the row version; a lost race re-runs the whole cycle, so two
//! overlapping runs can never both observe the same `current_index`.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{RotationError, StoreError};
use crate::store::Store;

pub const DEFAULT_STATE_KEY: &str = "sector_rotation";
const MAX_ATTEMPTS: usize = 5;

/// Invariant: `current_index < sectors_queue.len()` when the queue is
/// non-empty, `current_index == 0` otherwise; queue members are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationState {
    pub sectors_queue: Vec<String>,
    pub current_index: usize,
    pub cycle_count: u64,
    pub last_run: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationSnapshot {
    pub current_sector: Option<String>,
    pub sectors_remaining: usize,
    pub total_sectors: usize,
    pub cycle_count: u64,
    pub last_run: Option<DateTime<Utc>>,
}

impl RotationState {
    pub fn validate(&self) -> Result<(), String> {
        let len = self.sectors_queue.len();
        if len == 0 && self.current_index != 0 {
            return Err(format!(
                "current_index {} with empty queue",
                self.current_index
            ));
        }
        if len > 0 && self.current_index >= len {
            return Err(format!(
                "current_index {} out of range for {len} sectors",
                self.current_index
            ));
        }
        let mut seen = HashSet::with_capacity(len);
        for s in &self.sectors_queue {
            if !seen.insert(s.as_str()) {
                return Err(format!("duplicate sector {s:?} in queue"));
            }
        }
        Ok(())
    }

    /// Reset the queue when it is empty or its member set differs from
    /// `sectors`. Returns whether anything changed.
    pub fn initialize(&mut self, sectors: &[String]) -> bool {
        let wanted = dedup_preserving_order(sectors);
        let current: HashSet<&str> = self.sectors_queue.iter().map(String::as_str).collect();
        let incoming: HashSet<&str> = wanted.iter().map(String::as_str).collect();

        if !self.sectors_queue.is_empty() && current == incoming {
            return false;
        }
        if self.sectors_queue == wanted && self.current_index == 0 {
            return false;
        }
        self.sectors_queue = wanted;
        self.current_index = 0;
        true
    }

    /// Return the sector under the cursor and advance, wrapping into a new cycle.
    pub fn advance(&mut self, now: DateTime<Utc>) -> Result<String, RotationError> {
        let Some(sector) = self.sectors_queue.get(self.current_index).cloned() else {
            return Err(RotationError::EmptyQueue);
        };
        self.current_index += 1;
        if self.current_index >= self.sectors_queue.len() {
            self.current_index = 0;
            self.cycle_count += 1;
        }
        self.last_run = Some(now);
        Ok(sector)
    }

    pub fn reset(&mut self) {
        self.current_index = 0;
        self.cycle_count = 0;
    }

    pub fn snapshot(&self) -> RotationSnapshot {
        RotationSnapshot {
            current_sector: self.sectors_queue.get(self.current_index).cloned(),
            sectors_remaining: self.sectors_queue.len().saturating_sub(self.current_index),
            total_sectors: self.sectors_queue.len(),
            cycle_count: self.cycle_count,
            last_run: self.last_run,
        }
    }
}

fn dedup_preserving_order(items: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .iter()
        .filter(|s| seen.insert(s.as_str()))
        .cloned()
        .collect()
}

/// Scheduler bound to one state key in a store.
#[derive(Clone)]
pub struct SectorRotation {
    store: Arc<dyn Store>,
    key: String,
}

impl SectorRotation {
    pub fn new(store: Arc<dyn Store>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn initialize(&self, sectors: &[String]) -> Result<(), RotationError> {
        let changed = self
            .update(|state| Ok((state.initialize(sectors), true)))
            .await?;
        if changed {
            info!(target: "rotation", key = %self.key, sectors = sectors.len(), "sector queue reset");
        }
        Ok(())
    }

    pub async fn next(&self) -> Result<String, RotationError> {
        let sector = self
            .update(|state| state.advance(Utc::now()).map(|s| (s, true)))
            .await?;
        info!(target: "rotation", key = %self.key, %sector, "sector selected");
        Ok(sector)
    }

    pub async fn reset(&self) -> Result<(), RotationError> {
        self.update(|state| {
            state.reset();
            Ok(((), true))
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<RotationSnapshot, RotationError> {
        let (state, _) = self.load().await?;
        Ok(state.snapshot())
    }

    async fn load(&self) -> Result<(RotationState, Option<u64>), RotationError> {
        let Some(rec) = self.store.load_state(&self.key).await? else {
            return Ok((RotationState::default(), None));
        };
        let state: RotationState = serde_json::from_str(&rec.value)
            .map_err(|e| RotationError::CorruptState(e.to_string()))?;
        state.validate().map_err(RotationError::CorruptState)?;
        Ok((state, Some(rec.version)))
    }

    /// One optimistic load → mutate → save cycle, retried on version conflicts.
    /// `f` returns its output plus whether the state must be written back;
    /// unchanged states are not written.
    async fn update<T>(
        &self,
        mut f: impl FnMut(&mut RotationState) -> Result<(T, bool), RotationError> + Send,
    ) -> Result<T, RotationError> {
        for attempt in 1..=MAX_ATTEMPTS {
            let (mut state, version) = self.load().await?;
            let before = state.clone();
            let (out, write) = f(&mut state)?;
            if !write || state == before {
                return Ok(out);
            }
            let value = serde_json::to_string(&state).map_err(StoreError::from)?;
            match self.store.save_state(&self.key, value, version).await {
                Ok(_) => return Ok(out),
                Err(StoreError::Conflict { .. }) => {
                    warn!(target: "rotation", key = %self.key, attempt, "rotation state conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(RotationError::Contention(MAX_ATTEMPTS))
    }
}
