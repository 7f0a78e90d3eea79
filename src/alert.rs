use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::labels::{fingerprint, Fingerprint, LabelSet};

/// A time-bounded labeled event under consideration for notification (spec
/// §3). `starts_at <= ends_at` is an invariant enforced upstream of this
/// crate; violations are rejected before an alert reaches the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub labels: LabelSet,
    pub annotations: LabelSet,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Alert {
    /// An alert is resolved at `t` iff `ends_at <= t` (spec §3).
    pub fn is_resolved_at(&self, t: DateTime<Utc>) -> bool {
        self.ends_at <= t
    }

    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint(&self.labels)
    }
}
