//! Widget selection
//!
//! Every widget is derived from the session record alone, so the same
//! record always renders the same widget regardless of which input path
//! produced it. Each clickable option carries the action it sends back,
//! stamped with the version the widget was rendered at.

use crate::flow::{
    FlowOutcome, FlowStep, ReasonCode, ResolutionCode, SelectionCode, SelectionKind,
    SessionRecord, ShippingCode,
};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetKind {
    ItemSelector,
    ReasonSelector,
    RetentionOffer,
    ResolutionSelector,
    ShippingSelector,
    ReturnConfirmation,
    RetentionConfirmation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WidgetSpec {
    pub kind: WidgetKind,
    pub data: Value,
    pub session_version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl WidgetSpec {
    pub fn with_notice(mut self, notice: impl Into<String>) -> Self {
        self.notice = Some(notice.into());
        self
    }
}

/// What the chat transport should render after a widget action
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum NextWidgetSpec {
    Show { widget: WidgetSpec },
    /// Nothing changed; re-render the current step
    NoOp { widget: WidgetSpec, reason: String },
    Unrecognized { message: String },
}

impl NextWidgetSpec {
    pub fn unrecognized() -> Self {
        NextWidgetSpec::Unrecognized {
            message: "Sorry, we couldn't process that. Please try again.".to_string(),
        }
    }

    pub fn widget(&self) -> Option<&WidgetSpec> {
        match self {
            NextWidgetSpec::Show { widget } | NextWidgetSpec::NoOp { widget, .. } => Some(widget),
            NextWidgetSpec::Unrecognized { .. } => None,
        }
    }
}

/// The widget for the record's current step
pub fn widget_for(record: &SessionRecord) -> WidgetSpec {
    let (kind, data) = match record.flow_step {
        FlowStep::Start => (WidgetKind::ItemSelector, item_selector(record)),
        FlowStep::AwaitingReason => (WidgetKind::ReasonSelector, reason_selector(record)),
        FlowStep::AwaitingRetentionResponse => (WidgetKind::RetentionOffer, retention_offer(record)),
        FlowStep::AwaitingResolution => {
            (WidgetKind::ResolutionSelector, resolution_selector(record))
        }
        FlowStep::AwaitingShipping => (WidgetKind::ShippingSelector, shipping_selector(record)),
        FlowStep::Complete => match &record.outcome {
            Some(FlowOutcome::RetentionAccepted { offer }) => (
                WidgetKind::RetentionConfirmation,
                json!({
                    "offer": offer,
                    "start_new_action": action(record, "start_new_return", json!({})),
                }),
            ),
            Some(FlowOutcome::ReturnCreated { receipt }) => (
                WidgetKind::ReturnConfirmation,
                json!({
                    "return_id": receipt.return_id,
                    "status": receipt.status,
                    "refund_cents": receipt.refund_cents,
                    "restocking_fee_cents": receipt.restocking_fee_cents,
                    "items": selected_names(record),
                    "reason": record.reason_code.map(SelectionCode::label),
                    "resolution": record.resolution_code.map(SelectionCode::label),
                    "shipping": record.shipping_code.map(SelectionCode::label),
                    "start_new_action": action(record, "start_new_return", json!({})),
                }),
            ),
            None => (WidgetKind::ReturnConfirmation, json!({})),
        },
    };

    WidgetSpec {
        kind,
        data,
        session_version: record.version,
        notice: None,
    }
}

/// Action descriptor the transport sends back when an option is clicked
fn action(record: &SessionRecord, action_type: &str, mut payload: Value) -> Value {
    if let Some(map) = payload.as_object_mut() {
        map.insert("session_version".to_string(), json!(record.version));
    }
    json!({ "type": action_type, "payload": payload })
}

fn selected_names(record: &SessionRecord) -> Vec<String> {
    record
        .selected_descriptors()
        .into_iter()
        .map(|item| item.name.clone())
        .collect()
}

/// "Change my answer" links for everything already chosen
fn change_actions(record: &SessionRecord) -> Vec<Value> {
    [
        SelectionKind::Items,
        SelectionKind::Reason,
        SelectionKind::Resolution,
        SelectionKind::Shipping,
    ]
    .into_iter()
    .filter(|kind| record.has_selection(*kind))
    .map(|kind| {
        json!({
            "kind": kind,
            "action": action(record, "change_selection", json!({ "kind": kind })),
        })
    })
    .collect()
}

fn item_selector(record: &SessionRecord) -> Value {
    let items: Vec<Value> = record
        .displayed_items
        .iter()
        .map(|item| {
            json!({
                "order_id": item.order_id,
                "product_id": item.product_id,
                "name": item.name,
                "unit_price_cents": item.unit_price_cents,
                "quantity": item.quantity,
                "category": item.category,
                "action": action(record, "select_return_item", json!({
                    "order_id": item.order_id,
                    "product_id": item.product_id,
                })),
            })
        })
        .collect();

    json!({
        "customer_name": record.customer_name,
        "items": items,
        "multi_select_action": action(record, "select_return_items", json!({ "items": [] })),
    })
}

fn reason_selector(record: &SessionRecord) -> Value {
    let options: Vec<Value> = ReasonCode::ALL
        .iter()
        .map(|code| {
            json!({
                "code": code,
                "label": code.label(),
                "description": code.description(),
                "requires_details": code.requires_details(),
                "action": action(record, "select_reason", json!({ "reason_code": code })),
            })
        })
        .collect();

    json!({
        "items": selected_names(record),
        "options": options,
        "change_actions": change_actions(record),
    })
}

fn retention_offer(record: &SessionRecord) -> Value {
    json!({
        "offer": record.retention_offer,
        "items": selected_names(record),
        "accept_action": action(record, "accept_offer", json!({})),
        "decline_action": action(record, "decline_offers", json!({})),
    })
}

fn resolution_selector(record: &SessionRecord) -> Value {
    let options: Vec<Value> = ResolutionCode::ALL
        .iter()
        .map(|code| {
            json!({
                "code": code,
                "label": code.label(),
                "description": code.description(),
                "processing_time": code.processing_time(),
                "action": action(record, "select_resolution", json!({ "resolution": code })),
            })
        })
        .collect();

    json!({
        "options": options,
        "change_actions": change_actions(record),
    })
}

fn shipping_selector(record: &SessionRecord) -> Value {
    let options: Vec<Value> = ShippingCode::ALL
        .iter()
        .map(|code| {
            json!({
                "code": code,
                "label": code.label(),
                "description": code.description(),
                "cost_cents": code.cost_cents(),
                "action": action(record, "select_shipping", json!({ "shipping_method": code })),
            })
        })
        .collect();

    let confirm_action = record
        .shipping_code
        .map(|_| action(record, "confirm_return", json!({})));

    json!({
        "options": options,
        "selected": record.shipping_code,
        "confirm_action": confirm_action,
        "change_actions": change_actions(record),
    })
}
