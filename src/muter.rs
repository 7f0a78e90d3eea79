use std::sync::Arc;

use crate::inhibit::InhibitionEngine;
use crate::labels::{fingerprint, LabelSet};
use crate::marker::AlertMarker;
use crate::silence::SilenceState;

/// The crate's single public entry point for "should this alert be
/// suppressed right now?" (spec §4.8). Checks silences first — cheaper,
/// since it's a linear scan with no background cache to warm — then falls
/// through to the inhibition engine. Either path updates the marker
/// side-band regardless of outcome, so observability reflects the most
/// recent evaluation even when the answer is "not muted".
pub struct Muter {
    silences: Arc<SilenceState>,
    inhibitor: Arc<InhibitionEngine>,
    marker: Arc<dyn AlertMarker>,
}

impl Muter {
    pub fn new(silences: Arc<SilenceState>, inhibitor: Arc<InhibitionEngine>, marker: Arc<dyn AlertMarker>) -> Self {
        Self { silences, inhibitor, marker }
    }

    /// `true` iff `labels` is currently silenced or inhibited (spec §4.8).
    /// Both checks always run and always update their half of the marker
    /// side-band, regardless of outcome, so observability reflects the most
    /// recent evaluation even when the silence check alone would already
    /// decide the result.
    pub fn is_muted(&self, labels: &LabelSet) -> bool {
        let fp = fingerprint(labels);
        let (silenced, silence_id) = self.silences.mutes(labels);
        self.marker.set_silenced(fp, silence_id);

        let inhibited = self.inhibitor.mutes(labels);
        silenced || inhibited
    }
}
