//! Events that drive the returns workflow
//!
//! Widget actions and agent tool calls are both translated into these
//! before anything touches a session record.

use super::codes::{CustomerTier, ReasonCode, ResolutionCode, SelectionKind, ShippingCode};
use super::record::{HeldReceipt, ItemDescriptor, ItemRef, ReturnReceipt};
use std::collections::BTreeSet;

/// Events that trigger flow transitions
#[derive(Debug, Clone, PartialEq)]
pub enum FlowEvent {
    // Identity and display events, fed by the chat transport
    CustomerIdentified {
        customer_id: String,
        name: Option<String>,
        tier: Option<CustomerTier>,
    },
    ItemsDisplayed {
        items: Vec<ItemDescriptor>,
    },

    // Customer selections
    ItemsSelected {
        items: BTreeSet<ItemRef>,
    },
    ReasonSelected {
        code: ReasonCode,
    },
    RetentionAccepted,
    RetentionDeclined,
    ResolutionSelected {
        code: ResolutionCode,
    },
    ShippingSelected {
        code: ShippingCode,
    },

    // Corrections
    ReselectionRequested {
        kind: SelectionKind,
    },
    NewReturnStarted,

    // Finalizer
    ReturnCreated {
        receipt: ReturnReceipt,
    },
    /// The selections changed before the receipt could be committed
    ReceiptHeld {
        held: HeldReceipt,
    },
}

impl FlowEvent {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            FlowEvent::CustomerIdentified { .. } => "customer_identified",
            FlowEvent::ItemsDisplayed { .. } => "items_displayed",
            FlowEvent::ItemsSelected { .. } => "items_selected",
            FlowEvent::ReasonSelected { .. } => "reason_selected",
            FlowEvent::RetentionAccepted => "retention_accepted",
            FlowEvent::RetentionDeclined => "retention_declined",
            FlowEvent::ResolutionSelected { .. } => "resolution_selected",
            FlowEvent::ShippingSelected { .. } => "shipping_selected",
            FlowEvent::ReselectionRequested { .. } => "reselection_requested",
            FlowEvent::NewReturnStarted => "new_return_started",
            FlowEvent::ReturnCreated { .. } => "return_created",
            FlowEvent::ReceiptHeld { .. } => "receipt_held",
        }
    }
}
