use std::fmt;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{AlertCoreError, AlertCoreResult};
use crate::labels::{get_or_empty, LabelSet};

/// The predicate kind a [`Matcher`] applies (spec §3 "Matcher").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatcherKind {
    Eq,
    NotEq,
    Regex,
    NotRegex,
}

impl MatcherKind {
    pub fn is_regex(&self) -> bool {
        matches!(self, MatcherKind::Regex | MatcherKind::NotRegex)
    }

    pub fn is_negative(&self) -> bool {
        matches!(self, MatcherKind::NotEq | MatcherKind::NotRegex)
    }
}

impl fmt::Display for MatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatcherKind::Eq => "=",
            MatcherKind::NotEq => "!=",
            MatcherKind::Regex => "=~",
            MatcherKind::NotRegex => "!~",
        };
        write!(f, "{s}")
    }
}

impl TryFrom<&str> for MatcherKind {
    type Error = AlertCoreError;

    fn try_from(s: &str) -> AlertCoreResult<Self> {
        match s {
            "=" => Ok(MatcherKind::Eq),
            "!=" => Ok(MatcherKind::NotEq),
            "=~" => Ok(MatcherKind::Regex),
            "!~" => Ok(MatcherKind::NotRegex),
            other => Err(AlertCoreError::InvalidMatcher(format!(
                "unknown matcher operator: {other}"
            ))),
        }
    }
}

/// A single label predicate: `{ name, value, kind }` (spec §3). Regex
/// matchers are anchored full-string matches and compile their pattern once
/// at construction, failing with `InvalidMatcher` on a bad pattern.
#[derive(Debug, Clone)]
pub struct Matcher {
    pub name: String,
    pub value: String,
    pub kind: MatcherKind,
    compiled: Option<Regex>,
}

impl Matcher {
    pub fn new(name: impl Into<String>, value: impl Into<String>, kind: MatcherKind) -> AlertCoreResult<Self> {
        let name = name.into();
        let value = value.into();
        if name.is_empty() {
            return Err(AlertCoreError::InvalidMatcher(
                "matcher name must not be empty".to_string(),
            ));
        }
        let compiled = if kind.is_regex() {
            let anchored = format!("^(?:{value})$");
            Some(Regex::new(&anchored).map_err(|err| {
                AlertCoreError::InvalidMatcher(format!("invalid regex {value:?}: {err}"))
            })?)
        } else {
            None
        };
        Ok(Self { name, value, kind, compiled })
    }

    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, value, MatcherKind::Eq).expect("equality matcher never fails to compile")
    }

    /// Does this matcher match the (possibly absent) value of `self.name`
    /// in `labels`? Absent labels are treated as the empty string.
    pub fn matches(&self, labels: &LabelSet) -> bool {
        let actual = get_or_empty(labels, &self.name);
        match self.kind {
            MatcherKind::Eq => actual == self.value,
            MatcherKind::NotEq => actual != self.value,
            MatcherKind::Regex => self.regex().is_match(actual),
            MatcherKind::NotRegex => !self.regex().is_match(actual),
        }
    }

    fn regex(&self) -> &Regex {
        self.compiled
            .as_ref()
            .expect("regex matcher always carries a compiled pattern")
    }
}

impl PartialEq for Matcher {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.value == other.value && self.kind == other.kind
    }
}

/// `compiled` is derived state, not wire state: a `Matcher` serializes as
/// just `(name, value, kind)` and recompiles its regex on the way back in.
#[derive(Serialize, Deserialize)]
struct MatcherWire {
    name: String,
    value: String,
    kind: MatcherKind,
}

impl Serialize for Matcher {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        MatcherWire {
            name: self.name.clone(),
            value: self.value.clone(),
            kind: self.kind,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Matcher {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = MatcherWire::deserialize(deserializer)?;
        Matcher::new(wire.name, wire.value, wire.kind).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.name, self.kind, self.value)
    }
}
