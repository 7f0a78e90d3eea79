use std::sync::Arc;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::{AlertCoreError, AlertCoreResult};
use crate::silence::silence::Silence;
use crate::silence::state::SilenceState;

/// Default chunk size for [`SilenceGossipAdapter::encode`] (spec §4.6:
/// "produced as one or more chunks to respect transport size limits").
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 1 << 20;

/// The set of `(id, silence)` entries actually changed by a merge (spec
/// §4.6). Empty iff the incoming state contained no newer `updated_at` for
/// any id — this is exactly the "delta minimality" property.
pub type Delta = AHashMap<Uuid, Silence>;

/// The gossip transport's interface into the core (spec §6): after a local
/// silence mutation, the core hands the transport the encoded bytes to
/// broadcast. The transport itself — peer discovery, retries, framing over
/// the wire — is out of scope for this crate.
pub trait GossipTransport: Send + Sync {
    fn broadcast(&self, bytes: Vec<u8>);
}

/// Encodes/decodes silence state for the gossip transport and applies
/// inbound deltas (spec §4.6). The state **is** the CRDT: merging prefers
/// the entry with the later `updated_at`, making the silence map itself a
/// last-writer-wins register per id.
pub struct SilenceGossipAdapter {
    state: Arc<SilenceState>,
    transport: Arc<dyn GossipTransport>,
}

impl SilenceGossipAdapter {
    pub fn new(state: Arc<SilenceState>, transport: Arc<dyn GossipTransport>) -> Self {
        Self { state, transport }
    }

    /// Snapshots the full silence map under a shared lock and serializes it
    /// into one or more wire-format chunks no larger than `max_chunk_bytes`.
    pub fn encode(&self, max_chunk_bytes: usize) -> AlertCoreResult<Vec<Vec<u8>>> {
        let map: Delta = self.state.all().into_iter().map(|s| (s.id, s)).collect();
        encode_chunks(&map, max_chunk_bytes)
    }

    /// Decodes `bytes`, merges it, and returns the delta to re-broadcast —
    /// `None` if nothing changed, signaling the transport not to
    /// re-broadcast (spec §4.6 `on_gossip`).
    pub fn on_gossip(&self, bytes: &[u8]) -> AlertCoreResult<Option<Delta>> {
        let incoming = decode(bytes)?;
        let delta = self.merge_delta(&incoming);
        if delta.is_empty() {
            Ok(None)
        } else {
            Ok(Some(delta))
        }
    }

    /// Like `on_gossip`, but always returns the delta (possibly empty) —
    /// used on the broadcast path, where the transport always forwards
    /// (spec §4.6 `on_gossip_broadcast`).
    pub fn on_gossip_broadcast(&self, bytes: &[u8]) -> AlertCoreResult<Delta> {
        let incoming = decode(bytes)?;
        Ok(self.merge_delta(&incoming))
    }

    /// Applies an inbound unicast without producing a delta to forward
    /// (spec §4.6 `on_gossip_unicast`).
    pub fn on_gossip_unicast(&self, bytes: &[u8]) -> AlertCoreResult<()> {
        let incoming = decode(bytes)?;
        self.merge_complete(&incoming);
        Ok(())
    }

    /// For each `(id, s_in)` in `incoming`, replaces the local entry iff it
    /// is absent or strictly older, recording replaced entries in the
    /// returned delta (spec §4.6 `merge_delta`).
    pub fn merge_delta(&self, incoming: &Delta) -> Delta {
        let mut delta = Delta::default();
        for (id, candidate) in incoming {
            if self.state.merge_if_newer(*id, candidate) {
                delta.insert(*id, candidate.clone());
            }
        }
        delta
    }

    /// Identical replacement logic to `merge_delta`, without recording a
    /// delta (spec §4.6 `merge_complete`).
    pub fn merge_complete(&self, incoming: &Delta) {
        for (id, candidate) in incoming {
            self.state.merge_if_newer(*id, candidate);
        }
    }

    /// Wraps a single mutated silence into a state fragment and hands its
    /// encoding to the transport (spec §4.6 `local_broadcast`, called by
    /// `SilenceState::set`/`delete`'s caller).
    pub fn local_broadcast(&self, silence: &Silence) -> AlertCoreResult<()> {
        let mut fragment = Delta::default();
        fragment.insert(silence.id, silence.clone());
        for chunk in encode_chunks(&fragment, DEFAULT_MAX_CHUNK_BYTES)? {
            self.transport.broadcast(chunk);
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct WireFrame {
    entries: Vec<WireSilence>,
}

#[derive(Serialize, Deserialize)]
struct WireSilence {
    id: Uuid,
    silence: Silence,
}

fn encode_chunks(map: &Delta, max_chunk_bytes: usize) -> AlertCoreResult<Vec<Vec<u8>>> {
    if map.is_empty() {
        let frame = WireFrame { entries: Vec::new() };
        let bytes = bincode::serialize(&frame)
            .map_err(|err| AlertCoreError::DecodeFailed(format!("encode failed: {err}")))?;
        return Ok(vec![bytes]);
    }

    let mut chunks = Vec::new();
    let mut current: Vec<WireSilence> = Vec::new();
    let mut current_size = 0usize;

    for (id, silence) in map {
        let entry = WireSilence { id: *id, silence: silence.clone() };
        let entry_bytes = bincode::serialized_size(&entry)
            .map_err(|err| AlertCoreError::DecodeFailed(format!("size probe failed: {err}")))? as usize;

        if !current.is_empty() && current_size + entry_bytes > max_chunk_bytes {
            chunks.push(finish_chunk(std::mem::take(&mut current))?);
            current_size = 0;
        }
        current_size += entry_bytes;
        current.push(entry);
    }
    if !current.is_empty() {
        chunks.push(finish_chunk(current)?);
    }
    Ok(chunks)
}

fn finish_chunk(entries: Vec<WireSilence>) -> AlertCoreResult<Vec<u8>> {
    let frame = WireFrame { entries };
    bincode::serialize(&frame).map_err(|err| AlertCoreError::DecodeFailed(format!("encode failed: {err}")))
}

/// Decodes one wire-format chunk. Malformed bytes are logged and surfaced
/// as `DecodeFailed` so the caller can drop the frame without mutating
/// state (spec §7).
fn decode(bytes: &[u8]) -> AlertCoreResult<Delta> {
    let frame: WireFrame = bincode::deserialize(bytes).map_err(|err| {
        warn!(error = %err, "gossip adapter: dropping malformed frame");
        AlertCoreError::DecodeFailed(err.to_string())
    })?;
    Ok(frame.entries.into_iter().map(|e| (e.id, e.silence)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::matcher::{Matcher, MatcherList};
    use chrono::{Duration, Utc};
    use std::sync::Mutex;

    struct RecordingTransport {
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self { sent: Mutex::new(Vec::new()) }
        }
    }

    impl GossipTransport for RecordingTransport {
        fn broadcast(&self, bytes: Vec<u8>) {
            self.sent.lock().unwrap().push(bytes);
        }
    }

    fn silence(now: chrono::DateTime<Utc>, updated_offset: i64, comment: &str) -> Silence {
        Silence {
            id: Uuid::new_v4(),
            matchers: MatcherList::new(vec![Matcher::equal("job", "api")]),
            starts_at: now - Duration::hours(1),
            ends_at: now + Duration::hours(1),
            created_at: now,
            updated_at: now + Duration::seconds(updated_offset),
            created_by: "alice".to_string(),
            comment: comment.to_string(),
        }
    }

    fn adapter() -> (SilenceGossipAdapter, Arc<SilenceState>) {
        let now = Utc::now();
        let clock = FixedClock::new(now);
        let state = Arc::new(SilenceState::new(clock));
        let transport = Arc::new(RecordingTransport::new());
        (SilenceGossipAdapter::new(Arc::clone(&state), transport), state)
    }

    #[test]
    fn round_trips_byte_stable() {
        let now = Utc::now();
        let s = silence(now, 0, "hello");
        let mut map = Delta::default();
        map.insert(s.id, s.clone());
        let chunks = encode_chunks(&map, DEFAULT_MAX_CHUNK_BYTES).unwrap();
        assert_eq!(chunks.len(), 1);
        let decoded = decode(&chunks[0]).unwrap();
        assert_eq!(decoded.get(&s.id), Some(&s));
    }

    #[test]
    fn merge_prefers_later_updated_at() {
        let now = Utc::now();
        let (adapter, state) = adapter();
        let mut s = silence(now, 0, "original");
        state.set(s.clone()).unwrap();
        let id = s.id;

        s.comment = "new".to_string();
        s.updated_at = now + Duration::seconds(1);
        let mut incoming = Delta::default();
        incoming.insert(id, s.clone());

        let delta = adapter.on_gossip_broadcast(&bincode::serialize(&WireFrame {
            entries: incoming.into_iter().map(|(id, silence)| WireSilence { id, silence }).collect(),
        }).unwrap()).unwrap();

        assert_eq!(delta.get(&id).unwrap().comment, "new");
        assert_eq!(state.get(id).unwrap().comment, "new");
    }

    #[test]
    fn repeated_delivery_yields_empty_delta() {
        let now = Utc::now();
        let (adapter, state) = adapter();
        let s = silence(now, 0, "hello");
        state.set(s.clone()).unwrap();

        let mut incoming = Delta::default();
        incoming.insert(s.id, s);
        let bytes = bincode::serialize(&WireFrame {
            entries: incoming.into_iter().map(|(id, silence)| WireSilence { id, silence }).collect(),
        })
        .unwrap();

        // older-or-equal updated_at than what's already stored -> no-op
        assert!(adapter.on_gossip(&bytes).unwrap().is_none());
    }

    #[test]
    fn merge_is_idempotent_commutative_and_associative() {
        let now = Utc::now();
        let a = silence(now, 0, "a");
        let b = {
            let mut s = silence(now, 1, "b");
            s.id = a.id;
            s
        };
        let c = {
            let mut s = silence(now, 2, "c");
            s.id = a.id;
            s
        };

        let merge_two = |x: &Delta, y: &Delta| -> Delta {
            let (adapter, _state) = adapter();
            adapter.merge_delta(x);
            adapter.merge_delta(y)
        };
        let _ = merge_two; // exercised per-branch below for clarity

        let run_sequence = |order: &[&Silence]| -> Silence {
            let (adapter, state) = adapter();
            for s in order {
                let mut m = Delta::default();
                m.insert(s.id, (*s).clone());
                adapter.merge_delta(&m);
            }
            state.get(a.id).unwrap()
        };

        let via_abc = run_sequence(&[&a, &b, &c]);
        let via_cba = run_sequence(&[&c, &b, &a]);
        let via_bac = run_sequence(&[&b, &a, &c]);
        assert_eq!(via_abc, via_cba);
        assert_eq!(via_abc, via_bac);
        assert_eq!(via_abc.comment, "c");

        // idempotence: merging c again changes nothing further
        let (adapter, state) = adapter();
        let mut m = Delta::default();
        m.insert(c.id, c.clone());
        adapter.merge_delta(&m);
        let delta = adapter.merge_delta(&m);
        assert!(delta.is_empty());
        assert_eq!(state.get(c.id).unwrap(), c);
    }

    #[test]
    fn local_broadcast_sends_encoded_fragment() {
        let now = Utc::now();
        let clock = FixedClock::new(now);
        let state = Arc::new(SilenceState::new(clock));
        let transport = Arc::new(RecordingTransport::new());
        let adapter = SilenceGossipAdapter::new(Arc::clone(&state), Arc::clone(&transport) as Arc<dyn GossipTransport>);

        let s = silence(now, 0, "hi");
        adapter.local_broadcast(&s).unwrap();
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn malformed_bytes_are_reported_without_mutating_state() {
        let (adapter, state) = adapter();
        let err = adapter.on_gossip(b"not a valid frame").unwrap_err();
        assert!(matches!(err, AlertCoreError::DecodeFailed(_)));
        assert!(state.all().is_empty());
    }
}
