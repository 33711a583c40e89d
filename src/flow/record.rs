//! Session record types

use super::codes::{CustomerTier, ReasonCode, ResolutionCode, SelectionKind, ShippingCode};
use super::retention::RetentionOffer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ============================================================================
// Workflow Step
// ============================================================================

/// Position in the returns workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlowStep {
    /// Choosing items (and, before that, identifying the customer)
    #[default]
    Start,
    AwaitingReason,
    AwaitingRetentionResponse,
    AwaitingResolution,
    /// Choosing shipping; stays here with shipping recorded until the
    /// return is created
    AwaitingShipping,
    Complete,
}

impl FlowStep {
    pub fn as_str(self) -> &'static str {
        match self {
            FlowStep::Start => "start",
            FlowStep::AwaitingReason => "awaiting_reason",
            FlowStep::AwaitingRetentionResponse => "awaiting_retention_response",
            FlowStep::AwaitingResolution => "awaiting_resolution",
            FlowStep::AwaitingShipping => "awaiting_shipping",
            FlowStep::Complete => "complete",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, FlowStep::Complete)
    }

    /// The step that collects a given selection
    pub fn collecting(kind: SelectionKind) -> Self {
        match kind {
            SelectionKind::Items => FlowStep::Start,
            SelectionKind::Reason => FlowStep::AwaitingReason,
            SelectionKind::Resolution => FlowStep::AwaitingResolution,
            SelectionKind::Shipping => FlowStep::AwaitingShipping,
        }
    }
}

impl fmt::Display for FlowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Items
// ============================================================================

/// Identifies one order line
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    pub order_id: String,
    pub product_id: String,
}

impl ItemRef {
    pub fn new(order_id: impl Into<String>, product_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            product_id: product_id.into(),
        }
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.order_id, self.product_id)
    }
}

/// An order line as rendered to the customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDescriptor {
    pub order_id: String,
    pub product_id: String,
    pub name: String,
    pub unit_price_cents: u64,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_status: Option<String>,
}

fn default_quantity() -> u32 {
    1
}

impl ItemDescriptor {
    pub fn item_ref(&self) -> ItemRef {
        ItemRef::new(self.order_id.clone(), self.product_id.clone())
    }

    pub fn matches(&self, item: &ItemRef) -> bool {
        self.order_id == item.order_id && self.product_id == item.product_id
    }

    /// Price times quantity; `None` when the product does not fit in a u64
    pub fn line_total_cents(&self) -> Option<u64> {
        self.unit_price_cents.checked_mul(u64::from(self.quantity))
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Confirmation returned by the return-creation service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnReceipt {
    pub return_id: String,
    pub status: String,
    pub refund_cents: u64,
    pub restocking_fee_cents: u64,
}

/// The selections a return was requested for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionSnapshot {
    pub customer_id: Option<String>,
    pub items: BTreeSet<ItemRef>,
    pub reason: ReasonCode,
    pub resolution: ResolutionCode,
    pub shipping: ShippingCode,
}

/// A receipt the service issued that could not be committed because the
/// selections changed first. Reused if the customer returns to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeldReceipt {
    pub receipt: ReturnReceipt,
    pub selections: SelectionSnapshot,
}

/// How a completed workflow ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlowOutcome {
    ReturnCreated { receipt: ReturnReceipt },
    RetentionAccepted { offer: RetentionOffer },
}

// ============================================================================
// Session Record
// ============================================================================

/// The canonical per-conversation record both input paths converge on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub thread_id: String,
    pub flow_step: FlowStep,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_tier: Option<CustomerTier>,
    #[serde(default)]
    pub displayed_items: Vec<ItemDescriptor>,
    #[serde(default)]
    pub selected_items: BTreeSet<ItemRef>,
    #[serde(default)]
    pub reason_code: Option<ReasonCode>,
    #[serde(default)]
    pub resolution_code: Option<ResolutionCode>,
    #[serde(default)]
    pub shipping_code: Option<ShippingCode>,
    #[serde(default)]
    pub retention_offer: Option<RetentionOffer>,
    #[serde(default)]
    pub outcome: Option<FlowOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub held_receipt: Option<HeldReceipt>,
    pub version: u64,
}

impl SessionRecord {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            flow_step: FlowStep::Start,
            customer_id: None,
            customer_name: None,
            customer_tier: None,
            displayed_items: Vec::new(),
            selected_items: BTreeSet::new(),
            reason_code: None,
            resolution_code: None,
            shipping_code: None,
            retention_offer: None,
            outcome: None,
            held_receipt: None,
            version: 0,
        }
    }

    pub fn has_customer(&self) -> bool {
        self.customer_id.is_some()
    }

    pub fn is_displayed(&self, item: &ItemRef) -> bool {
        self.displayed_items.iter().any(|d| d.matches(item))
    }

    /// Selected items resolved against what was displayed, in display order
    pub fn selected_descriptors(&self) -> Vec<&ItemDescriptor> {
        self.displayed_items
            .iter()
            .filter(|d| self.selected_items.contains(&d.item_ref()))
            .collect()
    }

    /// Whether a selection of this kind is currently recorded
    pub fn has_selection(&self, kind: SelectionKind) -> bool {
        match kind {
            SelectionKind::Items => !self.selected_items.is_empty(),
            SelectionKind::Reason => self.reason_code.is_some(),
            SelectionKind::Resolution => self.resolution_code.is_some(),
            SelectionKind::Shipping => self.shipping_code.is_some(),
        }
    }

    /// Selections still needed before a return can be created, in workflow order
    pub fn missing_prerequisites(&self) -> Vec<SelectionKind> {
        [
            SelectionKind::Items,
            SelectionKind::Reason,
            SelectionKind::Resolution,
            SelectionKind::Shipping,
        ]
        .into_iter()
        .filter(|kind| !self.has_selection(*kind))
        .collect()
    }

    /// Readiness predicate gating return creation
    pub fn is_ready_to_finalize(&self) -> bool {
        self.flow_step == FlowStep::AwaitingShipping && self.missing_prerequisites().is_empty()
    }

    /// Current selections, once every one of them is recorded
    pub fn selection_snapshot(&self) -> Option<SelectionSnapshot> {
        if self.selected_items.is_empty() {
            return None;
        }
        Some(SelectionSnapshot {
            customer_id: self.customer_id.clone(),
            items: self.selected_items.clone(),
            reason: self.reason_code?,
            resolution: self.resolution_code?,
            shipping: self.shipping_code?,
        })
    }

    /// The held receipt, if it was issued for exactly the current selections
    pub fn reusable_receipt(&self) -> Option<&ReturnReceipt> {
        let held = self.held_receipt.as_ref()?;
        (Some(&held.selections) == self.selection_snapshot().as_ref()).then_some(&held.receipt)
    }

    /// Equality on everything except the version counter
    pub fn same_state(&self, other: &SessionRecord) -> bool {
        Self {
            version: 0,
            ..self.clone()
        } == Self {
            version: 0,
            ..other.clone()
        }
    }

    /// Clear a selection and every selection after it
    pub(crate) fn clear_from(&mut self, kind: SelectionKind) {
        if kind <= SelectionKind::Items {
            self.selected_items.clear();
        }
        if kind <= SelectionKind::Reason {
            self.reason_code = None;
            self.retention_offer = None;
        }
        if kind <= SelectionKind::Resolution {
            self.resolution_code = None;
        }
        self.shipping_code = None;
    }
}
