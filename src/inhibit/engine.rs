use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration as StdDuration;

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::inhibit::rule::InhibitRule;
use crate::inhibit::rule_index::{RuleIndex, RuleIndexOptions};
use crate::inhibit::source_cache::SourceCache;
use crate::labels::LabelSet;
use crate::marker::AlertMarker;
use crate::provider::{AlertProvider, AlertUpdate};

/// Cadence at which each rule's source cache is swept (spec §4.3/§4.7).
pub const SOURCE_CACHE_GC_INTERVAL: StdDuration = StdDuration::from_secs(15 * 60);

struct Control {
    stop: AtomicBool,
}

/// Rule-driven muter: holds the rule set, subscribes to the alert stream,
/// answers `mutes(labels)` (spec §4.4). One engine owns its rule set and
/// per-rule source caches for the lifetime of a configuration generation;
/// reconfiguration means building a new `InhibitionEngine`, not mutating
/// this one.
pub struct InhibitionEngine {
    rules: Vec<Arc<InhibitRule>>,
    caches: Vec<Arc<SourceCache>>,
    index: RuleIndex,
    provider: Arc<dyn AlertProvider>,
    marker: Arc<dyn AlertMarker>,
    clock: Arc<dyn Clock>,
    control: Arc<Control>,
    loaded: Arc<(Mutex<bool>, Condvar)>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl InhibitionEngine {
    pub fn new(
        rules: Vec<InhibitRule>,
        options: RuleIndexOptions,
        provider: Arc<dyn AlertProvider>,
        marker: Arc<dyn AlertMarker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let rules: Vec<Arc<InhibitRule>> = rules.into_iter().map(Arc::new).collect();
        let caches: Vec<Arc<SourceCache>> = rules.iter().map(|r| Arc::new(SourceCache::new(Arc::clone(r)))).collect();
        let index = RuleIndex::build(rules.clone(), options);

        Self {
            rules,
            caches,
            index,
            provider,
            marker,
            clock,
            control: Arc::new(Control { stop: AtomicBool::new(false) }),
            loaded: Arc::new((Mutex::new(false), Condvar::new())),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the alert-subscription reader and one GC task per rule (spec
    /// §4.4 lifecycle). The initial snapshot is drained synchronously
    /// before the "loading finished" barrier releases, so a caller that
    /// waits on [`Self::wait_until_loaded`] observes a fully-populated
    /// engine on cold start.
    pub fn start(self: &Arc<Self>) {
        let subscription = self.provider.subscribe();

        for alert in subscription.initial {
            self.ingest(alert.clone());
        }
        info!(rule_count = self.rules.len(), "inhibition engine: initial snapshot loaded");
        {
            let (lock, cvar) = &*self.loaded;
            *lock.lock().unwrap() = true;
            cvar.notify_all();
        }

        let reader_engine = Arc::clone(self);
        let control = Arc::clone(&self.control);
        let reader = thread::spawn(move || {
            reader_engine.read_loop(subscription.stream, control);
        });

        let mut handles = self.handles.lock().unwrap();
        handles.push(reader);

        for (idx, cache) in self.caches.iter().enumerate() {
            let cache = Arc::clone(cache);
            let clock = Arc::clone(&self.clock);
            let control = Arc::clone(&self.control);
            let handle = thread::spawn(move || {
                gc_loop(idx, cache, clock, control);
            });
            handles.push(handle);
        }
    }

    fn read_loop(&self, stream: mpsc::Receiver<AlertUpdate>, control: Arc<Control>) {
        loop {
            if control.stop.load(Ordering::Acquire) {
                return;
            }
            match stream.recv_timeout(StdDuration::from_millis(200)) {
                Ok(AlertUpdate::Upsert(alert)) => self.ingest(alert),
                Ok(AlertUpdate::StreamError(msg)) => {
                    warn!(error = %msg, "inhibition engine: alert stream error, continuing");
                }
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => return,
            }
        }
    }

    /// For each rule whose `source_matchers` match the alert's labels,
    /// inserts it into that rule's cache. One alert may populate several
    /// rules' caches (spec §4.4).
    fn ingest(&self, alert: crate::alert::Alert) {
        for (rule, cache) in self.rules.iter().zip(self.caches.iter()) {
            if rule.source_matchers.matches(&alert.labels) {
                cache.set(alert.clone());
            }
        }
    }

    /// Blocks until the initial alert snapshot has been drained. Safe to
    /// call from any thread; callers that don't care about cold-start
    /// completeness may skip it.
    pub fn wait_until_loaded(&self) {
        let (lock, cvar) = &*self.loaded;
        let guard = lock.lock().unwrap();
        let _guard = cvar.wait_while(guard, |loaded| !*loaded).unwrap();
    }

    /// `Mutes(L)`: does any rule's source cache hold a non-resolved alert
    /// that inhibits `labels` under that rule (spec §4.4)? Rules are tried
    /// in registration order; the first rule that inhibits wins and its
    /// decision is recorded on the marker.
    pub fn mutes(&self, labels: &LabelSet) -> bool {
        let now = self.clock.now();
        let fp = crate::labels::fingerprint(labels);

        let mut inhibited_by = None;
        self.index.for_each_candidate(labels, |idx, rule| {
            if !rule.target_matchers.matches(labels) {
                return false;
            }
            if let Some(source_fp) = self.caches[idx].find_inhibitor(labels, now) {
                inhibited_by = Some(source_fp);
                return true;
            }
            false
        });

        match inhibited_by {
            Some(source_fp) => {
                self.marker.set_inhibited(fp, source_fp);
                debug!(fingerprint = fp, source = source_fp, "inhibited");
                true
            }
            None => {
                self.marker.clear_inhibited(fp);
                false
            }
        }
    }

    /// Cancels all background work. Safe to call more than once; a second
    /// call observes the stop flag already set and joins nothing new.
    pub fn stop(&self) {
        self.control.stop.store(true, Ordering::Release);
        let mut handles = self.handles.lock().unwrap();
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
        info!("inhibition engine: stopped");
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

fn gc_loop(rule_idx: usize, cache: Arc<SourceCache>, clock: Arc<dyn Clock>, control: Arc<Control>) {
    let poll = StdDuration::from_millis(200);
    let mut elapsed = StdDuration::ZERO;
    loop {
        if control.stop.load(Ordering::Acquire) {
            return;
        }
        thread::sleep(poll);
        elapsed += poll;
        if elapsed >= SOURCE_CACHE_GC_INTERVAL {
            elapsed = StdDuration::ZERO;
            let now = clock.now();
            cache.gc(now);
            debug!(rule = rule_idx, "source cache gc sweep complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::marker::InMemoryAlertMarker;
    use crate::matcher::{Matcher, MatcherList};
    use crate::provider::ChannelAlertProvider;
    use chrono::{Duration, Utc};

    fn ls(pairs: &[(&str, &str)]) -> LabelSet {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn firing_alert(labels: LabelSet, now: chrono::DateTime<Utc>) -> crate::alert::Alert {
        crate::alert::Alert {
            labels,
            annotations: LabelSet::default(),
            starts_at: now - Duration::minutes(1),
            ends_at: now + Duration::hours(1),
            updated_at: now,
        }
    }

    fn build_engine(
        rules: Vec<InhibitRule>,
        provider: Arc<ChannelAlertProvider>,
        clock: Arc<FixedClock>,
    ) -> Arc<InhibitionEngine> {
        Arc::new(InhibitionEngine::new(
            rules,
            RuleIndexOptions::default(),
            provider,
            Arc::new(InMemoryAlertMarker::new()),
            clock,
        ))
    }

    #[test]
    fn simple_inhibition_end_to_end() {
        let now = Utc::now();
        let clock = FixedClock::new(now);
        let provider = Arc::new(ChannelAlertProvider::new());
        provider.push(firing_alert(ls(&[("s", "1"), ("e", "f")]), now));

        let rule = InhibitRule::new(
            None,
            MatcherList::new(vec![Matcher::equal("s", "1")]),
            MatcherList::new(vec![Matcher::equal("t", "1")]),
            vec!["e".to_string()],
        )
        .unwrap();

        let engine = build_engine(vec![rule], provider, clock);
        engine.start();
        engine.wait_until_loaded();

        assert!(engine.mutes(&ls(&[("t", "1"), ("e", "f")])));
        assert!(!engine.mutes(&ls(&[("t", "1"), ("e", "g")])));

        engine.stop();
    }

    #[test]
    fn stop_is_idempotent() {
        let now = Utc::now();
        let clock = FixedClock::new(now);
        let provider = Arc::new(ChannelAlertProvider::new());
        let engine = build_engine(vec![], provider, clock);
        engine.start();
        engine.wait_until_loaded();
        engine.stop();
        engine.stop();
    }

    #[test]
    fn registration_order_determines_which_rule_wins() {
        let now = Utc::now();
        let clock = FixedClock::new(now);
        let provider = Arc::new(ChannelAlertProvider::new());
        provider.push(firing_alert(ls(&[("s", "1")]), now));

        let first = InhibitRule::new(
            None,
            MatcherList::new(vec![Matcher::equal("s", "1")]),
            MatcherList::new(vec![Matcher::equal("t", "1")]),
            vec![],
        )
        .unwrap();
        let second = InhibitRule::new(
            None,
            MatcherList::new(vec![Matcher::equal("s", "1")]),
            MatcherList::new(vec![Matcher::equal("t", "1")]),
            vec![],
        )
        .unwrap();

        let engine = build_engine(vec![first, second], provider, clock);
        engine.start();
        engine.wait_until_loaded();

        assert!(engine.mutes(&ls(&[("t", "1")])));
        engine.stop();
    }
}
