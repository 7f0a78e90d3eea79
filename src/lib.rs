//! Inhibition engine and gossip-replicated silence store for a
//! cluster-aware alert-routing service.
//!
//! Two independent suppression mechanisms share one public entry point,
//! [`muter::Muter`]: rule-driven inhibition of alerts by other firing
//! alerts ([`inhibit`]), and user-created, time-bounded silences
//! replicated across a cluster by last-writer-wins gossip merge
//! ([`silence`]).

pub mod alert;
pub mod clock;
pub mod config;
pub mod error;
pub mod gc;
pub mod inhibit;
pub mod labels;
pub mod marker;
pub mod matcher;
pub mod muter;
pub mod provider;
pub mod silence;

pub use alert::Alert;
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{AlertCoreError, AlertCoreResult};
pub use inhibit::{InhibitRule, InhibitionEngine, RuleIndex, RuleIndexOptions};
pub use labels::{equal_label_fingerprint, fingerprint, Fingerprint, LabelSet};
pub use marker::{AlertMarker, InMemoryAlertMarker};
pub use matcher::{Matcher, MatcherKind, MatcherList};
pub use muter::Muter;
pub use provider::{AlertProvider, AlertStream, AlertUpdate, ChannelAlertProvider, Subscription};
pub use silence::{Silence, SilenceGossipAdapter, SilenceState, SilenceStatus};
