use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AlertCoreError, AlertCoreResult};
use crate::labels::LabelSet;
use crate::matcher::MatcherList;

/// One second of slack either side of a timestamp comparison, used
/// throughout the modification rules (spec §3) to treat a client's
/// round-tripped timestamp as "unchanged".
const MODIFICATION_TOLERANCE: Duration = Duration::seconds(1);

/// A user-created suppression record (spec §3 "Silence"). `state()` is
/// always *computed* from `(starts_at, ends_at, now)`; it is never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Silence {
    pub id: Uuid,
    pub matchers: MatcherList,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub comment: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SilenceStatus {
    Pending,
    Active,
    Expired,
}

impl Silence {
    pub fn status(&self, now: DateTime<Utc>) -> SilenceStatus {
        if now < self.starts_at {
            SilenceStatus::Pending
        } else if now < self.ends_at {
            SilenceStatus::Active
        } else {
            SilenceStatus::Expired
        }
    }

    /// A silence mutes `labels` iff it is `Active` at `now` and every
    /// matcher matches (spec §3).
    pub fn mutes(&self, labels: &LabelSet, now: DateTime<Utc>) -> bool {
        self.status(now) == SilenceStatus::Active && self.matchers.matches(labels)
    }

    pub fn validate(&self) -> AlertCoreResult<()> {
        if self.matchers.is_empty() {
            return Err(AlertCoreError::Invalid("silence matchers must not be empty".to_string()));
        }
        if self.starts_at > self.ends_at {
            return Err(AlertCoreError::Invalid("silence starts_at must not be after ends_at".to_string()));
        }
        Ok(())
    }
}

fn close_enough(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    (a - b).num_milliseconds().abs() <= MODIFICATION_TOLERANCE.num_milliseconds()
}

/// Validates and normalizes a proposed silence against the silence it would
/// replace, applying the modification rules of spec §3, and returns the
/// normalized record with `updated_at` set to `now`. `existing = None`
/// means `proposed` is a brand-new silence.
pub fn apply_modification(existing: Option<&Silence>, mut proposed: Silence, now: DateTime<Utc>) -> AlertCoreResult<Silence> {
    match existing {
        None => {
            if proposed.starts_at < now {
                if close_enough(proposed.starts_at, now) {
                    proposed.starts_at = now;
                } else {
                    return Err(AlertCoreError::Invalid("new silence must not start in the past".to_string()));
                }
            }
        }
        Some(existing) => {
            if existing.id != proposed.id {
                return Err(AlertCoreError::Invalid("modification must preserve silence id".to_string()));
            }
            if existing.matchers != proposed.matchers {
                return Err(AlertCoreError::Invalid("silence matchers may not change".to_string()));
            }

            if close_enough(existing.starts_at, proposed.starts_at) {
                proposed.starts_at = existing.starts_at;
            } else {
                if existing.status(now) == SilenceStatus::Active {
                    return Err(AlertCoreError::Invalid("an active silence's start time may not be changed".to_string()));
                }
                if proposed.starts_at < now {
                    return Err(AlertCoreError::Invalid("start time may not be moved into the past".to_string()));
                }
            }

            if close_enough(existing.ends_at, proposed.ends_at) {
                proposed.ends_at = existing.ends_at;
            } else {
                if existing.status(now) == SilenceStatus::Expired {
                    return Err(AlertCoreError::Invalid("an expired silence's end time may not be changed".to_string()));
                }
                if proposed.ends_at < now {
                    return Err(AlertCoreError::Invalid("end time may not be moved into the past".to_string()));
                }
            }
        }
    }

    proposed.validate()?;
    proposed.updated_at = now;
    Ok(proposed)
}
