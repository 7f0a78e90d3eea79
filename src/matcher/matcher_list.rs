use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::labels::LabelSet;
use crate::matcher::Matcher;

/// A conjunction of matchers: matches a label set iff every matcher in the
/// list matches (spec §3). Evaluation short-circuits on the first miss.
/// Matcher order within the list carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatcherList(Vec<Matcher>);

impl MatcherList {
    pub fn new(matchers: Vec<Matcher>) -> Self {
        Self(matchers)
    }

    pub fn matches(&self, labels: &LabelSet) -> bool {
        self.0.iter().all(|m| m.matches(labels))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Matcher> {
        self.0.iter()
    }

    /// Equality matchers only, as `(name, value)` pairs — used by the rule
    /// index (spec §4.2) to bucket rules by indexable target matcher.
    pub fn equality_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().filter_map(|m| {
            if matches!(m.kind, crate::matcher::MatcherKind::Eq) {
                Some((m.name.as_str(), m.value.as_str()))
            } else {
                None
            }
        })
    }
}

impl Deref for MatcherList {
    type Target = Vec<Matcher>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<Matcher>> for MatcherList {
    fn from(matchers: Vec<Matcher>) -> Self {
        Self(matchers)
    }
}

impl fmt::Display for MatcherList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, m) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{m}")?;
        }
        write!(f, "}}")
    }
}
