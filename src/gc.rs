use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration as StdDuration;

use ahash::AHashMap;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AlertCoreError, AlertCoreResult};
use crate::silence::{Silence, SilenceState};

/// Version tag for the on-disk silence snapshot format (spec §4.7, §9 Open
/// Question: "pick a single persistent layout and version it"). A future
/// incompatible layout adds a `V2` variant and an explicit migration path —
/// never silent dual-reading of an unversioned blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SilenceSnapshotLayout {
    V1,
}

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    layout: SilenceSnapshotLayout,
    silences: AHashMap<Uuid, Silence>,
}

/// Writes a [`SilenceState`] snapshot to disk (spec §4.7 "Optional
/// snapshotting"). A plain function rather than a struct: there is no
/// state to hold between calls, only a place to group the writer/reader
/// pair under one name.
pub struct SnapshotWriter;

impl SnapshotWriter {
    /// Serializes the current silence set to `path` using the `V1` layout.
    /// Writes to a temporary sibling file first and renames it into place,
    /// so a crash mid-write never leaves a half-written snapshot behind.
    pub fn write(state: &SilenceState, path: impl AsRef<Path>) -> AlertCoreResult<()> {
        let path = path.as_ref();
        let silences: AHashMap<Uuid, Silence> = state.all().into_iter().map(|s| (s.id, s)).collect();
        let file = SnapshotFile { layout: SilenceSnapshotLayout::V1, silences };
        let bytes = bincode::serialize(&file)
            .map_err(|err| AlertCoreError::SnapshotCorrupt(format!("encode failed: {err}")))?;

        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, &bytes).map_err(|err| AlertCoreError::SnapshotCorrupt(format!("write failed: {err}")))?;
        fs::rename(&tmp_path, path).map_err(|err| AlertCoreError::SnapshotCorrupt(format!("rename failed: {err}")))?;
        info!(path = %path.display(), count = bytes.len(), "silence snapshot written");
        Ok(())
    }
}

/// Reads a snapshot written by [`SnapshotWriter`].
pub struct SnapshotReader;

impl SnapshotReader {
    /// Loads `path` and replaces `state`'s entire silence map with its
    /// contents. Returns `SnapshotCorrupt` on a decode failure, an
    /// unrecognized layout tag, or a record that fails `Silence::validate`
    /// (spec §4.7: "re-validate each record before insertion; a corrupt
    /// record aborts load"). `state` is left untouched unless every record
    /// validates.
    pub fn load(state: &SilenceState, path: impl AsRef<Path>) -> AlertCoreResult<usize> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|err| AlertCoreError::SnapshotCorrupt(format!("read failed: {err}")))?;
        let file: SnapshotFile =
            bincode::deserialize(&bytes).map_err(|err| AlertCoreError::SnapshotCorrupt(format!("decode failed: {err}")))?;

        match file.layout {
            SilenceSnapshotLayout::V1 => {
                for (id, silence) in &file.silences {
                    silence.validate().map_err(|err| {
                        AlertCoreError::SnapshotCorrupt(format!("record {id} failed validation: {err}"))
                    })?;
                }
                let count = file.silences.len();
                state.replace_all(file.silences);
                info!(path = %path.display(), count, "silence snapshot loaded");
                Ok(count)
            }
        }
    }
}

struct Control {
    stop: AtomicBool,
}

/// Ties the silence store's retention sweep to a fixed cadence (spec §4.7).
/// Source-cache GC is scheduled per-rule by `InhibitionEngine::start`
/// (spec §4.3/§4.4); this scheduler covers the other half of §4.7 — the
/// silence side, plus the optional periodic snapshot write.
pub struct MaintenanceScheduler {
    control: Arc<Control>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl MaintenanceScheduler {
    pub fn new() -> Self {
        Self {
            control: Arc::new(Control { stop: AtomicBool::new(false) }),
            handle: Mutex::new(None),
        }
    }

    /// Spawns the background sweep. `snapshot_path` is optional: when set,
    /// every sweep also writes a fresh snapshot after GC runs.
    pub fn start(&self, state: Arc<SilenceState>, retention: Duration, interval: StdDuration, snapshot_path: Option<std::path::PathBuf>) {
        let control = Arc::clone(&self.control);
        let handle = thread::spawn(move || {
            loop {
                if control.stop.load(Ordering::Acquire) {
                    return;
                }
                thread::sleep(interval);
                if control.stop.load(Ordering::Acquire) {
                    return;
                }
                state.gc(retention);
                debug!("silence state gc sweep complete");
                if let Some(path) = &snapshot_path {
                    if let Err(err) = SnapshotWriter::write(&state, path) {
                        warn!(error = %err, "periodic silence snapshot write failed");
                    }
                }
            }
        });
        *self.handle.lock().unwrap() = Some(handle);
    }

    pub fn stop(&self) {
        self.control.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Default for MaintenanceScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::matcher::{Matcher, MatcherList};
    use chrono::Utc;

    fn silence(now: chrono::DateTime<Utc>, start: i64, end: i64) -> Silence {
        Silence {
            id: Uuid::new_v4(),
            matchers: MatcherList::new(vec![Matcher::equal("job", "api")]),
            starts_at: now + Duration::seconds(start),
            ends_at: now + Duration::seconds(end),
            created_at: now,
            updated_at: now,
            created_by: "alice".to_string(),
            comment: "maintenance".to_string(),
        }
    }

    #[test]
    fn snapshot_round_trips_through_disk() {
        let now = Utc::now();
        let clock = FixedClock::new(now);
        let state = SilenceState::new(clock.clone());
        state.set(silence(now, -60, 3600)).unwrap();

        let dir = std::env::temp_dir().join(format!("alertcore-snapshot-test-{}", Uuid::new_v4()));
        SnapshotWriter::write(&state, &dir).unwrap();

        let restored = SilenceState::new(clock);
        let count = SnapshotReader::load(&restored, &dir).unwrap();
        assert_eq!(count, 1);
        assert_eq!(restored.all().len(), 1);

        let _ = fs::remove_file(&dir);
    }

    #[test]
    fn loading_a_corrupt_file_does_not_touch_existing_state() {
        let now = Utc::now();
        let clock = FixedClock::new(now);
        let state = SilenceState::new(clock);
        state.set(silence(now, -60, 3600)).unwrap();

        let dir = std::env::temp_dir().join(format!("alertcore-corrupt-test-{}", Uuid::new_v4()));
        fs::write(&dir, b"not a snapshot").unwrap();

        let err = SnapshotReader::load(&state, &dir).unwrap_err();
        assert!(matches!(err, AlertCoreError::SnapshotCorrupt(_)));
        assert_eq!(state.all().len(), 1);

        let _ = fs::remove_file(&dir);
    }

    #[test]
    fn loading_a_record_that_fails_validation_aborts_and_leaves_state_untouched() {
        let now = Utc::now();
        let clock = FixedClock::new(now);
        let state = SilenceState::new(clock);
        state.set(silence(now, -60, 3600)).unwrap();

        let mut bad = silence(now, -60, 3600);
        bad.starts_at = now + Duration::seconds(60);
        bad.ends_at = now - Duration::seconds(60);
        let mut silences = AHashMap::new();
        silences.insert(bad.id, bad);
        let file = SnapshotFile { layout: SilenceSnapshotLayout::V1, silences };
        let bytes = bincode::serialize(&file).unwrap();

        let dir = std::env::temp_dir().join(format!("alertcore-invalid-record-test-{}", Uuid::new_v4()));
        fs::write(&dir, &bytes).unwrap();

        let err = SnapshotReader::load(&state, &dir).unwrap_err();
        assert!(matches!(err, AlertCoreError::SnapshotCorrupt(_)));
        assert_eq!(state.all().len(), 1);

        let _ = fs::remove_file(&dir);
    }

    #[test]
    fn scheduler_sweeps_and_can_be_stopped() {
        let now = Utc::now();
        let clock = FixedClock::new(now);
        let state = Arc::new(SilenceState::new(Arc::clone(&clock) as Arc<dyn crate::clock::Clock>));
        state.set(silence(now, -3600, -60)).unwrap();
        clock.advance(Duration::hours(200));

        let scheduler = MaintenanceScheduler::new();
        scheduler.start(Arc::clone(&state), Duration::hours(120), StdDuration::from_millis(20), None);
        thread::sleep(StdDuration::from_millis(100));
        scheduler.stop();

        assert!(state.all().is_empty());
    }
}
