use ahash::AHashMap;
use xxhash_rust::xxh3::Xxh3;

/// An unordered mapping from label name to label value (spec §3 "Label set").
pub type LabelSet = AHashMap<String, String>;

/// Stable 64-bit hash of a label set: deterministic across processes because
/// it hashes the sorted (name, value) pairs rather than map iteration order.
pub type Fingerprint = u64;

/// Computes the fingerprint of a label set, over its sorted (name, value)
/// pairs, mirroring `RuleConfig::hash`'s use of `xxhash_rust` in the teacher
/// crate for a stable content hash.
pub fn fingerprint(labels: &LabelSet) -> Fingerprint {
    let mut pairs: Vec<(&str, &str)> = labels
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    pairs.sort_unstable();
    fingerprint_pairs(&pairs)
}

/// Fingerprint of the restriction of `labels` to `names` (spec "Equal-label
/// fingerprint"). Absent names contribute an empty value, per the spec's
/// "absent = empty string" rule.
pub fn equal_label_fingerprint(labels: &LabelSet, names: &[String]) -> Fingerprint {
    let mut sorted_names: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
    sorted_names.sort_unstable();
    let pairs: Vec<(&str, &str)> = sorted_names
        .into_iter()
        .map(|name| {
            let value = labels.get(name).map(|s| s.as_str()).unwrap_or("");
            (name, value)
        })
        .collect();
    fingerprint_pairs(&pairs)
}

fn fingerprint_pairs(pairs: &[(&str, &str)]) -> Fingerprint {
    let mut hasher = Xxh3::new();
    for (name, value) in pairs {
        hasher.update(name.as_bytes());
        hasher.update(&[0xff]);
        hasher.update(value.as_bytes());
        hasher.update(&[0xff]);
    }
    hasher.digest()
}

/// Looks up a label's value, treating an absent label as the empty string
/// (spec §3, used throughout matcher and equal-label evaluation).
pub fn get_or_empty<'a>(labels: &'a LabelSet, name: &str) -> &'a str {
    labels.get(name).map(|s| s.as_str()).unwrap_or("")
}
