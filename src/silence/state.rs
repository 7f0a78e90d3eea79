use std::sync::{Arc, RwLock};

use ahash::AHashMap;
use chrono::Duration;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{AlertCoreError, AlertCoreResult};
use crate::labels::LabelSet;
use crate::silence::silence::{apply_modification, Silence, SilenceStatus};

/// In-memory silence catalog (spec §4.5). All operations take the writer
/// lock except `mutes`/`get`/`all`, which take only the reader lock. Time is
/// obtained through the injected [`Clock`] so expiration, GC, and
/// modification-rule boundaries are deterministic under test.
pub struct SilenceState {
    clock: Arc<dyn Clock>,
    silences: RwLock<AHashMap<Uuid, Silence>>,
}

impl SilenceState {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            silences: RwLock::new(AHashMap::new()),
        }
    }

    /// Inserts or replaces `proposed`, applying the modification rules of
    /// spec §3 against the previous version (if any). `updated_at` is
    /// always set to `now()`.
    pub fn set(&self, proposed: Silence) -> AlertCoreResult<Silence> {
        let now = self.clock.now();
        let mut guard = self.silences.write().unwrap();
        let existing = guard.get(&proposed.id).cloned();
        let normalized = apply_modification(existing.as_ref(), proposed, now)?;
        guard.insert(normalized.id, normalized.clone());
        Ok(normalized)
    }

    /// Models deletion as setting `ends_at := max(now, starts_at)` (spec
    /// §3). An already-expired silence cannot be "deleted" again.
    pub fn delete(&self, id: Uuid) -> AlertCoreResult<Silence> {
        let now = self.clock.now();
        let mut guard = self.silences.write().unwrap();
        let existing = guard
            .get(&id)
            .cloned()
            .ok_or_else(|| AlertCoreError::NotFound(format!("silence {id}")))?;

        if existing.status(now) == SilenceStatus::Expired {
            return Err(AlertCoreError::Invalid(format!("silence {id} is already expired")));
        }

        let mut proposed = existing.clone();
        proposed.ends_at = if now < existing.starts_at { existing.starts_at } else { now };
        let normalized = apply_modification(Some(&existing), proposed, now)?;
        guard.insert(normalized.id, normalized.clone());
        Ok(normalized)
    }

    pub fn get(&self, id: Uuid) -> AlertCoreResult<Silence> {
        self.silences
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| AlertCoreError::NotFound(format!("silence {id}")))
    }

    pub fn all(&self) -> Vec<Silence> {
        self.silences.read().unwrap().values().cloned().collect()
    }

    /// Returns the id of the first active silence whose matchers all match
    /// `labels` (spec §4.5).
    pub fn mutes(&self, labels: &LabelSet) -> (bool, Option<Uuid>) {
        let now = self.clock.now();
        let guard = self.silences.read().unwrap();
        for silence in guard.values() {
            if silence.mutes(labels, now) {
                return (true, Some(silence.id));
            }
        }
        (false, None)
    }

    /// Removes silences whose `ends_at < now - retention` (spec §4.5/§4.7).
    pub fn gc(&self, retention: Duration) {
        let now = self.clock.now();
        let cutoff = now - retention;
        self.silences.write().unwrap().retain(|_, s| s.ends_at >= cutoff);
    }

    /// Replaces the entire map; used by snapshot load (`crate::gc`). Not
    /// part of the spec's public operation set, so it is crate-visible
    /// only.
    pub(crate) fn replace_all(&self, silences: AHashMap<Uuid, Silence>) {
        *self.silences.write().unwrap() = silences;
    }

    /// Applies `candidate` under `id` iff no local entry exists or the
    /// local entry's `updated_at` is strictly older (spec §4.6
    /// `merge_delta`/`merge_complete`: "strict `<` on `updated_at`").
    /// Returns whether the candidate was applied.
    pub(crate) fn merge_if_newer(&self, id: Uuid, candidate: &Silence) -> bool {
        let mut guard = self.silences.write().unwrap();
        match guard.get(&id) {
            Some(existing) if existing.updated_at >= candidate.updated_at => false,
            _ => {
                guard.insert(id, candidate.clone());
                true
            }
        }
    }
}
