//! Returns workflow policy
//!
//! A pure transition function over an explicit step, in the Elm style:
//! events in, a mutation plus effects out. Widget actions and agent tool
//! calls both end up here.

pub mod codes;
mod effect;
mod event;
pub mod record;
pub mod retention;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use codes::{CustomerTier, ReasonCode, ResolutionCode, SelectionCode, SelectionKind, ShippingCode};
pub use effect::Effect;
pub use event::FlowEvent;
pub use record::{
    FlowOutcome, FlowStep, HeldReceipt, ItemDescriptor, ItemRef, ReturnReceipt, SelectionSnapshot,
    SessionRecord,
};
pub use retention::RetentionOffer;
pub use transition::{advance, transition, TransitionError};
