//! Effects produced by flow transitions

use super::record::FlowOutcome;
use super::retention::RetentionOffer;

/// Follow-up work requested by a transition, carried out by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Tell subscribers the record changed
    NotifySessionChanged,

    /// Present a retention offer before asking for a resolution
    OfferRetention { offer: RetentionOffer },

    /// All selections are in; create the return
    RequestFinalize,

    /// The workflow reached a terminal outcome
    FlowCompleted { outcome: FlowOutcome },
}

impl Effect {
    pub fn offer_retention(offer: RetentionOffer) -> Self {
        Effect::OfferRetention { offer }
    }

    pub fn completed(outcome: FlowOutcome) -> Self {
        Effect::FlowCompleted { outcome }
    }
}
