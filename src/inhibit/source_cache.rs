use std::sync::{Arc, RwLock};

use ahash::AHashMap;
use chrono::{DateTime, Utc};

use crate::alert::Alert;
use crate::inhibit::rule::InhibitRule;
use crate::labels::{Fingerprint, LabelSet};

/// `{ alert, matches_source_and_target }`, keyed by the source alert's
/// fingerprint (spec §3/§4.3). `matches_source_and_target` is recomputed on
/// every `set`, so it cannot go stale between queries (spec §9, second Open
/// Question) — it depends only on `target_matchers` and `alert.labels`,
/// neither of which `set` leaves untouched without recomputing this flag.
#[derive(Debug, Clone)]
pub struct SourceCacheEntry {
    pub alert: Alert,
    pub matches_source_and_target: bool,
}

type Bucket = AHashMap<Fingerprint, SourceCacheEntry>;

/// Per-rule cache of currently-firing source alerts, grouped by equal-label
/// fingerprint (spec §4.3). All mutating operations take the writer lock;
/// `find_inhibitor` takes only the reader lock.
pub struct SourceCache {
    rule: Arc<InhibitRule>,
    buckets: RwLock<AHashMap<Fingerprint, Bucket>>,
}

impl SourceCache {
    pub fn new(rule: Arc<InhibitRule>) -> Self {
        Self {
            rule,
            buckets: RwLock::new(AHashMap::new()),
        }
    }

    /// Upserts `alert`. Fingerprints are computed before taking the lock —
    /// the hot cost is the hashing, not the map write.
    pub fn set(&self, alert: Alert) {
        let equal_fp = self.rule.equal_label_fingerprint(&alert.labels);
        let alert_fp = alert.fingerprint();
        let matches_source_and_target = self.rule.target_matchers.matches(&alert.labels);

        let mut buckets = self.buckets.write().unwrap();
        buckets
            .entry(equal_fp)
            .or_default()
            .insert(alert_fp, SourceCacheEntry { alert, matches_source_and_target });
    }

    /// Looks for a non-resolved source alert inhibiting `target_labels`
    /// under this rule (spec §4.3). Returns the inhibiting alert's
    /// fingerprint. The two-sided-exclusion check (`source_matchers`
    /// against `target_labels`) is evaluated at most once per call and
    /// cached across candidate entries, since it depends only on
    /// `target_labels`.
    pub fn find_inhibitor(&self, target_labels: &LabelSet, now: DateTime<Utc>) -> Option<Fingerprint> {
        let equal_fp = self.rule.equal_label_fingerprint(target_labels);
        let buckets = self.buckets.read().unwrap();
        let bucket = buckets.get(&equal_fp)?;

        let mut target_is_also_source: Option<bool> = None;
        for (alert_fp, entry) in bucket.iter() {
            if entry.alert.is_resolved_at(now) {
                continue;
            }
            if entry.matches_source_and_target {
                let is_source = *target_is_also_source
                    .get_or_insert_with(|| self.rule.source_matchers.matches(target_labels));
                if is_source {
                    // two-sided exclusion (spec §3 invariant 5)
                    continue;
                }
            }
            return Some(*alert_fp);
        }
        None
    }

    /// Drops resolved entries and empties buckets (spec §4.3, scheduled
    /// every 15 minutes per rule by the GC task — see `crate::gc`).
    pub fn gc(&self, now: DateTime<Utc>) {
        let mut buckets = self.buckets.write().unwrap();
        buckets.retain(|_, bucket| {
            bucket.retain(|_, entry| !entry.alert.is_resolved_at(now));
            !bucket.is_empty()
        });
    }

    #[cfg(test)]
    pub fn entry_count(&self) -> usize {
        self.buckets.read().unwrap().values().map(|b| b.len()).sum()
    }
}
