use std::time::Duration as StdDuration;

use ahash::AHashMap;
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{AlertCoreError, AlertCoreResult};
use crate::inhibit::{InhibitRule, RuleIndexOptions};
use crate::matcher::{Matcher, MatcherKind, MatcherList};

/// A rule's matcher lists as configured, accepting the new list-of-matchers
/// form alongside the two legacy map forms (spec §9): `equals` (map of
/// name -> literal value, implicit `Eq`) and `matches` (map of name ->
/// regex, implicit `Regex`). All three may be combined; normalization
/// concatenates them into one `MatcherList`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatcherSetConfig {
    #[serde(default)]
    pub matchers: Vec<MatcherTriple>,
    #[serde(default)]
    pub equals: AHashMap<String, String>,
    #[serde(default)]
    pub matches: AHashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherTriple {
    pub name: String,
    pub value: String,
    pub kind: MatcherKind,
}

impl MatcherSetConfig {
    /// Normalizes to the list form (spec §9: "normalized to the list form
    /// at load"). Order is: explicit matchers, then `equals`, then
    /// `matches`; within a map, iteration order is unspecified but every
    /// entry is a standalone conjunction term so order carries no meaning.
    pub fn normalize(&self) -> AlertCoreResult<MatcherList> {
        let mut out = Vec::with_capacity(self.matchers.len() + self.equals.len() + self.matches.len());
        for triple in &self.matchers {
            out.push(Matcher::new(triple.name.clone(), triple.value.clone(), triple.kind)?);
        }
        for (name, value) in &self.equals {
            out.push(Matcher::new(name.clone(), value.clone(), MatcherKind::Eq)?);
        }
        for (name, pattern) in &self.matches {
            out.push(Matcher::new(name.clone(), pattern.clone(), MatcherKind::Regex)?);
        }
        Ok(MatcherList::new(out))
    }
}

/// One inhibition rule as configured (spec §3/§9), before normalization
/// into an `InhibitRule`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InhibitRuleConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub source: MatcherSetConfig,
    #[serde(default)]
    pub target: MatcherSetConfig,
    #[serde(default)]
    pub equal_labels: Vec<String>,
}

impl InhibitRuleConfig {
    /// Parses a single rule from its JSON representation (spec §6
    /// "Configuration input" — rule config arrives as bytes from an
    /// external collaborator; parsing them is in scope even though loading
    /// them from a file is not).
    pub fn from_json(text: &str) -> AlertCoreResult<Self> {
        serde_json::from_str(text).map_err(|err| AlertCoreError::Invalid(format!("invalid rule config: {err}")))
    }

    /// Builds and validates the runtime `InhibitRule`, rejecting a
    /// duplicate equal-label name, empty target matchers, or an
    /// unparseable regex before the rule reaches the engine (spec §9 "Rule
    /// validation at load time").
    pub fn build(&self) -> AlertCoreResult<InhibitRule> {
        let mut seen = ahash::AHashSet::new();
        for name in &self.equal_labels {
            if !seen.insert(name.as_str()) {
                return Err(AlertCoreError::Invalid(format!(
                    "rule {}: duplicate equal-label {name:?}",
                    self.name.as_deref().unwrap_or("<unnamed>")
                )));
            }
        }

        let source = self.source.normalize()?;
        let target = self.target.normalize()?;
        InhibitRule::new(self.name.clone(), source, target, self.equal_labels.clone())
    }
}

/// Crate-wide runtime options (spec §4.2 rule index thresholds, §4.7 GC
/// cadence and silence retention). Loaded once at startup; changing any of
/// these means rebuilding the engine/scheduler, not mutating it live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub rule_index: RuleIndexOptionsConfig,
    /// How long a resolved/expired silence or alert lingers before GC
    /// reclaims it.
    pub silence_retention_secs: i64,
    /// Cadence of the silence-state and source-cache GC sweeps.
    pub gc_interval_secs: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RuleIndexOptionsConfig {
    pub min_rules_for_index: usize,
    pub max_matcher_overlap_ratio: f64,
}

impl From<RuleIndexOptionsConfig> for RuleIndexOptions {
    fn from(cfg: RuleIndexOptionsConfig) -> Self {
        RuleIndexOptions {
            min_rules_for_index: cfg.min_rules_for_index,
            max_matcher_overlap_ratio: cfg.max_matcher_overlap_ratio,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let defaults = RuleIndexOptions::default();
        Self {
            rule_index: RuleIndexOptionsConfig {
                min_rules_for_index: defaults.min_rules_for_index,
                max_matcher_overlap_ratio: defaults.max_matcher_overlap_ratio,
            },
            silence_retention_secs: Duration::hours(120).num_seconds(),
            gc_interval_secs: 15 * 60,
        }
    }
}

impl RuntimeConfig {
    /// Parses runtime options from their JSON representation, same
    /// rationale as `InhibitRuleConfig::from_json`.
    pub fn from_json(text: &str) -> AlertCoreResult<Self> {
        serde_json::from_str(text).map_err(|err| AlertCoreError::Invalid(format!("invalid runtime config: {err}")))
    }

    pub fn validate(&self) -> AlertCoreResult<()> {
        if self.silence_retention_secs < 0 {
            return Err(AlertCoreError::Invalid("silence_retention_secs must not be negative".to_string()));
        }
        if !(0.0..=1.0).contains(&self.rule_index.max_matcher_overlap_ratio) {
            return Err(AlertCoreError::Invalid("max_matcher_overlap_ratio must be within [0, 1]".to_string()));
        }
        Ok(())
    }

    pub fn silence_retention(&self) -> Duration {
        Duration::seconds(self.silence_retention_secs)
    }

    pub fn gc_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.gc_interval_secs)
    }
}
