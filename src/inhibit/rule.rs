use crate::error::{AlertCoreError, AlertCoreResult};
use crate::labels::{equal_label_fingerprint, Fingerprint, LabelSet};
use crate::matcher::MatcherList;

/// `{ name?, source_matchers, target_matchers, equal_labels }` (spec §3
/// "Inhibition rule"). `name` is for diagnostics only; rules are otherwise
/// identified by position in the engine's rule list.
#[derive(Debug, Clone)]
pub struct InhibitRule {
    pub name: Option<String>,
    pub source_matchers: MatcherList,
    pub target_matchers: MatcherList,
    pub equal_labels: Vec<String>,
}

impl InhibitRule {
    pub fn new(
        name: Option<String>,
        source_matchers: MatcherList,
        target_matchers: MatcherList,
        equal_labels: Vec<String>,
    ) -> AlertCoreResult<Self> {
        let rule = Self {
            name,
            source_matchers,
            target_matchers,
            equal_labels,
        };
        rule.validate()?;
        Ok(rule)
    }

    fn validate(&self) -> AlertCoreResult<()> {
        if self.target_matchers.is_empty() {
            return Err(AlertCoreError::Invalid(format!(
                "rule {}: target_matchers must not be empty",
                self.display_name()
            )));
        }
        if self.source_matchers.is_empty() {
            return Err(AlertCoreError::Invalid(format!(
                "rule {}: source_matchers must not be empty",
                self.display_name()
            )));
        }
        Ok(())
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }

    /// The fingerprint of `labels` restricted to this rule's equal-labels
    /// (spec "Equal-label fingerprint").
    pub fn equal_label_fingerprint(&self, labels: &LabelSet) -> Fingerprint {
        equal_label_fingerprint(labels, &self.equal_labels)
    }

    /// Does `A.labels` satisfy the equal-label constraint with `L`? Both
    /// sides treat an absent label as the empty string, so an alert and a
    /// candidate that both lack an equal-label still match on it.
    pub fn equal_labels_match(&self, source_labels: &LabelSet, target_labels: &LabelSet) -> bool {
        self.equal_label_fingerprint(source_labels) == self.equal_label_fingerprint(target_labels)
    }
}
