//! Widget-action handler
//!
//! A static table maps each action type the transport can send to a
//! constructor for the matching flow event. Anything not in the table, or
//! with a payload that doesn't parse, gets a generic "couldn't process that"
//! reply.

use super::{EngineError, FinalizeOutcome, InputSource, ReturnsEngine};
use crate::flow::{
    CustomerTier, Effect, FlowEvent, ItemRef, ReasonCode, ResolutionCode, SelectionCode,
    SelectionKind, ShippingCode,
};
use crate::returns::ReturnService;
use crate::session::{SessionStore, StoreError};
use crate::widgets::{widget_for, NextWidgetSpec};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("Unrecognized action type: {0}")]
    Unrecognized(String),
    #[error("Malformed payload for {action_type}: {message}")]
    MalformedPayload {
        action_type: String,
        message: String,
    },
}

type EventConstructor = fn(&str, &Value) -> Result<FlowEvent, ActionError>;

enum Route {
    Event(EventConstructor),
    /// Retry creating the return after an eligibility refusal
    Finalize,
}

const ACTION_TABLE: &[(&str, Route)] = &[
    ("select_customer", Route::Event(customer_identified)),
    ("select_return_item", Route::Event(single_item_selected)),
    ("select_return_items", Route::Event(items_selected)),
    ("select_reason", Route::Event(reason_selected)),
    ("accept_offer", Route::Event(retention_accepted)),
    ("decline_offers", Route::Event(retention_declined)),
    ("select_resolution", Route::Event(resolution_selected)),
    ("select_shipping", Route::Event(shipping_selected)),
    ("change_selection", Route::Event(reselection_requested)),
    ("start_new_return", Route::Event(new_return_started)),
    ("confirm_return", Route::Finalize),
];

/// A widget action after parsing
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ResolvedAction {
    Event(FlowEvent),
    Finalize,
}

pub(crate) fn resolve_action(
    action_type: &str,
    payload: &Value,
) -> Result<ResolvedAction, ActionError> {
    let (_, route) = ACTION_TABLE
        .iter()
        .find(|(name, _)| *name == action_type)
        .ok_or_else(|| ActionError::Unrecognized(action_type.to_string()))?;
    match route {
        Route::Event(construct) => construct(action_type, payload).map(ResolvedAction::Event),
        Route::Finalize => Ok(ResolvedAction::Finalize),
    }
}

// ============================================================================
// Payload parsing
// ============================================================================

fn parse_payload<T: DeserializeOwned>(action_type: &str, payload: &Value) -> Result<T, ActionError> {
    T::deserialize(payload).map_err(|e| malformed(action_type, e.to_string()))
}

fn parse_code<C: SelectionCode>(action_type: &str, raw: &str) -> Result<C, ActionError> {
    C::parse(raw).ok_or_else(|| {
        malformed(
            action_type,
            format!("unknown code '{raw}', expected one of {}", C::valid_codes()),
        )
    })
}

fn malformed(action_type: &str, message: String) -> ActionError {
    ActionError::MalformedPayload {
        action_type: action_type.to_string(),
        message,
    }
}

#[derive(Deserialize)]
struct CustomerPayload {
    customer_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    tier: Option<CustomerTier>,
}

#[derive(Deserialize)]
struct ItemsPayload {
    items: Vec<ItemRef>,
}

#[derive(Deserialize)]
struct ReasonPayload {
    #[serde(alias = "code")]
    reason_code: String,
}

#[derive(Deserialize)]
struct ResolutionPayload {
    #[serde(alias = "code")]
    resolution: String,
}

#[derive(Deserialize)]
struct ShippingPayload {
    #[serde(alias = "code")]
    shipping_method: String,
}

#[derive(Deserialize)]
struct ChangePayload {
    #[serde(alias = "field")]
    kind: String,
}

fn customer_identified(action_type: &str, payload: &Value) -> Result<FlowEvent, ActionError> {
    let p: CustomerPayload = parse_payload(action_type, payload)?;
    Ok(FlowEvent::CustomerIdentified {
        customer_id: p.customer_id,
        name: p.name,
        tier: p.tier,
    })
}

fn single_item_selected(action_type: &str, payload: &Value) -> Result<FlowEvent, ActionError> {
    let item: ItemRef = parse_payload(action_type, payload)?;
    Ok(FlowEvent::ItemsSelected {
        items: BTreeSet::from([item]),
    })
}

fn items_selected(action_type: &str, payload: &Value) -> Result<FlowEvent, ActionError> {
    let p: ItemsPayload = parse_payload(action_type, payload)?;
    Ok(FlowEvent::ItemsSelected {
        items: p.items.into_iter().collect(),
    })
}

fn reason_selected(action_type: &str, payload: &Value) -> Result<FlowEvent, ActionError> {
    let p: ReasonPayload = parse_payload(action_type, payload)?;
    let code: ReasonCode = parse_code(action_type, &p.reason_code)?;
    Ok(FlowEvent::ReasonSelected { code })
}

fn retention_accepted(_: &str, _: &Value) -> Result<FlowEvent, ActionError> {
    Ok(FlowEvent::RetentionAccepted)
}

fn retention_declined(_: &str, _: &Value) -> Result<FlowEvent, ActionError> {
    Ok(FlowEvent::RetentionDeclined)
}

fn resolution_selected(action_type: &str, payload: &Value) -> Result<FlowEvent, ActionError> {
    let p: ResolutionPayload = parse_payload(action_type, payload)?;
    let code: ResolutionCode = parse_code(action_type, &p.resolution)?;
    Ok(FlowEvent::ResolutionSelected { code })
}

fn shipping_selected(action_type: &str, payload: &Value) -> Result<FlowEvent, ActionError> {
    let p: ShippingPayload = parse_payload(action_type, payload)?;
    let code: ShippingCode = parse_code(action_type, &p.shipping_method)?;
    Ok(FlowEvent::ShippingSelected { code })
}

fn reselection_requested(action_type: &str, payload: &Value) -> Result<FlowEvent, ActionError> {
    let p: ChangePayload = parse_payload(action_type, payload)?;
    let kind = SelectionKind::parse(&p.kind)
        .ok_or_else(|| malformed(action_type, format!("unknown selection kind '{}'", p.kind)))?;
    Ok(FlowEvent::ReselectionRequested { kind })
}

fn new_return_started(_: &str, _: &Value) -> Result<FlowEvent, ActionError> {
    Ok(FlowEvent::NewReturnStarted)
}

// ============================================================================
// Handler
// ============================================================================

impl<S: SessionStore, R: ReturnService> ReturnsEngine<S, R> {
    /// Apply a widget click and pick the widget to show next.
    ///
    /// A `session_version` in the payload makes the apply conditional, so a
    /// click on a widget rendered before some other change is a no-op.
    pub async fn handle_action(
        &self,
        thread_id: &str,
        action_type: &str,
        payload: &Value,
        cancel: CancellationToken,
    ) -> Result<NextWidgetSpec, EngineError> {
        let event = match resolve_action(action_type, payload) {
            Ok(ResolvedAction::Event(event)) => event,
            Ok(ResolvedAction::Finalize) => return self.finalize_for_widget(thread_id, cancel).await,
            Err(e) => {
                tracing::warn!(thread_id = %thread_id, action_type = %action_type, error = %e, "Unprocessable widget action");
                return Ok(NextWidgetSpec::unrecognized());
            }
        };
        let expected_version = payload.get("session_version").and_then(Value::as_u64);

        match self
            .dispatch(thread_id, event, expected_version, InputSource::Widget)
            .await
        {
            Ok(dispatched) if dispatched.has_effect(&Effect::RequestFinalize) => {
                self.finalize_for_widget(thread_id, cancel).await
            }
            Ok(dispatched) => Ok(NextWidgetSpec::Show {
                widget: widget_for(&dispatched.record),
            }),
            Err(StoreError::Backend(message)) => Err(StoreError::Backend(message).into()),
            Err(e) => {
                let current = self.store.get_or_create(thread_id).await?;
                Ok(NextWidgetSpec::NoOp {
                    widget: widget_for(&current),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn finalize_for_widget(
        &self,
        thread_id: &str,
        cancel: CancellationToken,
    ) -> Result<NextWidgetSpec, EngineError> {
        let outcome = self.finalize(thread_id, cancel).await?;
        let current = self.store.get_or_create(thread_id).await?;
        let widget = widget_for(&current);

        Ok(match outcome {
            FinalizeOutcome::Created { .. } | FinalizeOutcome::AlreadyComplete { .. } => {
                NextWidgetSpec::Show { widget }
            }
            FinalizeOutcome::Ineligible { message } => NextWidgetSpec::Show {
                widget: widget.with_notice(message),
            },
            FinalizeOutcome::Missing { fields } => NextWidgetSpec::NoOp {
                widget,
                reason: format!(
                    "Still needed: {}",
                    fields
                        .iter()
                        .map(|kind| kind.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            },
            FinalizeOutcome::InProgress => NextWidgetSpec::NoOp {
                widget,
                reason: "Your return is already being processed".to_string(),
            },
            FinalizeOutcome::Superseded { receipt } => NextWidgetSpec::NoOp {
                widget,
                reason: format!(
                    "Your selections changed while return {} was being created",
                    receipt.return_id
                ),
            },
        })
    }
}
