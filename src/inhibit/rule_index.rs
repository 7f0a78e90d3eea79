use std::sync::{Arc, Mutex};

use ahash::{AHashMap, AHashSet};

use crate::inhibit::rule::InhibitRule;
use crate::labels::LabelSet;

/// Construction options for [`RuleIndex`] (spec §4.2). `min_rules_for_index`
/// below this count, the index is disabled and lookups fall back to a
/// linear scan; `max_matcher_overlap_ratio` excludes equality matchers that
/// would bring back too large a fraction of the rule set as candidates.
#[derive(Debug, Clone, Copy)]
pub struct RuleIndexOptions {
    pub min_rules_for_index: usize,
    pub max_matcher_overlap_ratio: f64,
}

impl Default for RuleIndexOptions {
    fn default() -> Self {
        Self {
            min_rules_for_index: 2,
            max_matcher_overlap_ratio: 0.5,
        }
    }
}

/// A scratch `AHashSet<usize>` pool so `for_each_candidate` can dedupe
/// multi-matcher rules without allocating a fresh set on every query. Not
/// lock-free in the literal sense (it's a mutex-guarded `Vec`), but it gives
/// the same externally-visible contract the spec asks for: borrow, clear,
/// return.
#[derive(Default)]
struct ScratchPool {
    sets: Mutex<Vec<AHashSet<usize>>>,
}

impl ScratchPool {
    fn take(&self) -> AHashSet<usize> {
        self.sets.lock().unwrap().pop().unwrap_or_default()
    }

    fn give_back(&self, mut set: AHashSet<usize>) {
        set.clear();
        self.sets.lock().unwrap().push(set);
    }
}

/// Accelerates target-side matching: given a target label set, produces a
/// *superset* of the rules whose target matchers could match it (spec
/// §4.2). Built once at configuration load and read-only thereafter, so the
/// hot `for_each_candidate` path takes no lock beyond the scratch pool.
pub struct RuleIndex {
    rules: Vec<Arc<InhibitRule>>,
    /// name -> value -> rule indices carrying that equality target matcher
    by_equality: AHashMap<String, AHashMap<String, Vec<usize>>>,
    /// rule indices with no indexable equality target matcher
    linear_residue: Vec<usize>,
    disabled: bool,
    scratch: ScratchPool,
}

impl RuleIndex {
    pub fn build(rules: Vec<Arc<InhibitRule>>, options: RuleIndexOptions) -> Self {
        if rules.len() < options.min_rules_for_index {
            return Self {
                rules,
                by_equality: AHashMap::new(),
                linear_residue: Vec::new(),
                disabled: true,
                scratch: ScratchPool::default(),
            };
        }

        let total = rules.len();
        let mut occurrence_counts: AHashMap<(String, String), usize> = AHashMap::new();
        for rule in &rules {
            for (name, value) in rule.target_matchers.equality_pairs() {
                *occurrence_counts
                    .entry((name.to_string(), value.to_string()))
                    .or_insert(0) += 1;
            }
        }

        let overlap_limit = options.max_matcher_overlap_ratio * total as f64;
        let high_overlap: AHashSet<(String, String)> = occurrence_counts
            .into_iter()
            .filter(|(_, count)| *count as f64 > overlap_limit)
            .map(|(key, _)| key)
            .collect();

        let mut by_equality: AHashMap<String, AHashMap<String, Vec<usize>>> = AHashMap::new();
        let mut linear_residue = Vec::new();

        for (idx, rule) in rules.iter().enumerate() {
            let mut indexed_any = false;
            for (name, value) in rule.target_matchers.equality_pairs() {
                if high_overlap.contains(&(name.to_string(), value.to_string())) {
                    continue;
                }
                indexed_any = true;
                by_equality
                    .entry(name.to_string())
                    .or_default()
                    .entry(value.to_string())
                    .or_default()
                    .push(idx);
            }
            if !indexed_any {
                linear_residue.push(idx);
            }
        }

        Self {
            rules,
            by_equality,
            linear_residue,
            disabled: false,
            scratch: ScratchPool::default(),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn rules(&self) -> &[Arc<InhibitRule>] {
        &self.rules
    }

    /// Invokes `visitor` for every candidate rule (a superset of the rules
    /// whose target matchers match `labels`), short-circuiting as soon as
    /// `visitor` returns `true`. Candidates are visited in rule
    /// registration order first, then the linear residue in that same
    /// order — `labels` is an `AHashMap` whose iteration order is
    /// unspecified, so the indexed buckets it touches are collected into a
    /// set and sorted by index before visiting, rather than visited in
    /// whatever order the map happens to yield its entries (spec §5: "the
    /// first matching rule reports muting, with rule registration order
    /// providing a deterministic tiebreak").
    pub fn for_each_candidate(&self, labels: &LabelSet, mut visitor: impl FnMut(usize, &Arc<InhibitRule>) -> bool) -> bool {
        if self.disabled {
            for (idx, rule) in self.rules.iter().enumerate() {
                if visitor(idx, rule) {
                    return true;
                }
            }
            return false;
        }

        let mut scratch = self.scratch.take();
        for (name, value) in labels.iter() {
            if let Some(by_value) = self.by_equality.get(name.as_str()) {
                if let Some(candidates) = by_value.get(value.as_str()) {
                    for &idx in candidates {
                        scratch.insert(idx);
                    }
                }
            }
        }

        let mut indices: Vec<usize> = scratch.iter().copied().collect();
        indices.sort_unstable();
        self.scratch.give_back(scratch);

        for idx in indices {
            if visitor(idx, &self.rules[idx]) {
                return true;
            }
        }

        for &idx in &self.linear_residue {
            if visitor(idx, &self.rules[idx]) {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{Matcher, MatcherList};

    fn ls(pairs: &[(&str, &str)]) -> LabelSet {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn rule_with_target(target: Vec<Matcher>) -> Arc<InhibitRule> {
        Arc::new(
            InhibitRule::new(
                None,
                MatcherList::new(vec![Matcher::equal("s", "1")]),
                MatcherList::new(target),
                vec![],
            )
            .unwrap(),
        )
    }

    #[test]
    fn below_threshold_disables_index() {
        let rules = vec![rule_with_target(vec![Matcher::equal("t", "1")])];
        let index = RuleIndex::build(rules, RuleIndexOptions::default());
        assert!(index.is_disabled());
    }

    #[test]
    fn index_is_a_superset_filter() {
        let mut rules = Vec::new();
        for i in 0..5 {
            rules.push(rule_with_target(vec![Matcher::equal("t", i.to_string())]));
        }
        let index = RuleIndex::build(rules, RuleIndexOptions::default());
        assert!(!index.is_disabled());

        let mut visited = 0;
        index.for_each_candidate(&ls(&[("t", "3")]), |_idx, _rule| {
            visited += 1;
            false
        });
        assert_eq!(visited, 1);
    }

    #[test]
    fn high_overlap_matcher_is_excluded_from_index() {
        let mut rules = Vec::new();
        for i in 0..100 {
            if i < 60 {
                rules.push(rule_with_target(vec![Matcher::equal("severity", "warning")]));
            } else {
                rules.push(rule_with_target(vec![Matcher::equal("severity", format!("w{i}"))]));
            }
        }
        let index = RuleIndex::build(rules, RuleIndexOptions::default());

        let mut visited = 0;
        index.for_each_candidate(&ls(&[("severity", "warning")]), |_idx, _rule| {
            visited += 1;
            false
        });
        // the 60-rule high-overlap bucket was excluded from `by_equality`
        // entirely, so none of them are looked up by value and all 60 fall
        // to the linear residue, where they're visited unconditionally. The
        // other 40 rules are indexed under their own distinct values and
        // are never touched by a query for `severity=warning`.
        assert_eq!(visited, 60);
    }

    #[test]
    fn dedupes_multi_matcher_rule_candidates() {
        let rule = rule_with_target(vec![Matcher::equal("a", "1"), Matcher::equal("b", "1")]);
        let padding: Vec<_> = (0..3).map(|i| rule_with_target(vec![Matcher::equal("c", i.to_string())])).collect();
        let mut rules = vec![rule];
        rules.extend(padding);
        let index = RuleIndex::build(rules, RuleIndexOptions::default());

        let mut visited = 0;
        index.for_each_candidate(&ls(&[("a", "1"), ("b", "1")]), |_idx, _rule| {
            visited += 1;
            false
        });
        assert_eq!(visited, 1);
    }

    #[test]
    fn candidates_are_visited_in_registration_order_regardless_of_label_iteration_order() {
        // Two labels, each indexing a different rule; registration order
        // places "b"'s rule before "a"'s rule. The query must still visit
        // in index order (0, 1), not whatever order `labels.iter()` yields.
        let rule_for_b = rule_with_target(vec![Matcher::equal("b", "1")]);
        let rule_for_a = rule_with_target(vec![Matcher::equal("a", "1")]);
        let padding = rule_with_target(vec![Matcher::equal("c", "1")]);
        let rules = vec![rule_for_b, rule_for_a, padding];
        let index = RuleIndex::build(rules, RuleIndexOptions::default());

        let mut order = Vec::new();
        index.for_each_candidate(&ls(&[("a", "1"), ("b", "1")]), |idx, _rule| {
            order.push(idx);
            false
        });
        assert_eq!(order, vec![0, 1]);
    }

    #[test]
    fn short_circuits_on_visitor_true() {
        let mut rules = Vec::new();
        for i in 0..5 {
            rules.push(rule_with_target(vec![Matcher::equal("t", i.to_string())]));
        }
        let index = RuleIndex::build(rules, RuleIndexOptions::default());
        let mut visited = 0;
        let found = index.for_each_candidate(&ls(&[("t", "2")]), |_idx, _rule| {
            visited += 1;
            true
        });
        assert!(found);
        assert_eq!(visited, 1);
    }
}
