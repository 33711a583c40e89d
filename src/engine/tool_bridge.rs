//! Tool-call bridge
//!
//! The agent's view of the engine. Every operation feeds the same flow
//! policy as the widget handler, applied unconditionally, and answers with
//! text the agent can relay. Rejections become explanations; only backend
//! failures and cancellation surface as errors.

use super::{EngineError, FinalizeOutcome, InputSource, ReturnsEngine};
use crate::flow::{
    Effect, FlowEvent, FlowOutcome, FlowStep, ItemRef, ReasonCode, ResolutionCode,
    SelectionCode, SelectionKind, SessionRecord, ShippingCode,
};
use crate::returns::ReturnService;
use crate::session::{SessionStore, StoreError};
use crate::summary::{format_cents, summarize};
use async_trait::async_trait;
use chrono::Utc;
use std::fmt::Write;
use tokio_util::sync::CancellationToken;

const NOTHING_SELECTED: &str =
    "No items are selected yet. Next: call set_items with the items the customer wants to return.";

/// Operations exposed to the agent as tools
#[async_trait]
pub trait ToolBridge: Send + Sync {
    async fn set_items(&self, thread_id: &str, items: Vec<ItemRef>) -> Result<String, EngineError>;

    async fn set_selection(
        &self,
        thread_id: &str,
        kind: SelectionKind,
        code: &str,
    ) -> Result<String, EngineError>;

    async fn respond_to_retention(
        &self,
        thread_id: &str,
        accepted: bool,
    ) -> Result<String, EngineError>;

    async fn finalize_return(
        &self,
        thread_id: &str,
        cancel: CancellationToken,
    ) -> Result<String, EngineError>;

    async fn session_context(&self, thread_id: &str) -> Result<String, EngineError>;

    async fn change_selection(
        &self,
        thread_id: &str,
        kind: SelectionKind,
    ) -> Result<String, EngineError>;

    /// Check each selected item against the return policy
    async fn check_eligibility(&self, thread_id: &str) -> Result<String, EngineError>;

    /// Refund for the selected items; codes not given fall back to the
    /// recorded ones
    async fn quote_refund(
        &self,
        thread_id: &str,
        reason: Option<ReasonCode>,
        resolution: Option<ResolutionCode>,
    ) -> Result<String, EngineError>;

    async fn return_history(&self, thread_id: &str) -> Result<String, EngineError>;
}

impl<S: SessionStore, R: ReturnService> ReturnsEngine<S, R> {
    /// Apply an agent event, turning rejections into an explanation
    async fn apply_for_agent(
        &self,
        thread_id: &str,
        event: FlowEvent,
        on_success: impl FnOnce(&SessionRecord, &[Effect]) -> String + Send,
    ) -> Result<String, EngineError> {
        match self.dispatch(thread_id, event, None, InputSource::Agent).await {
            Ok(dispatched) => Ok(on_success(&dispatched.record, &dispatched.effects)),
            Err(StoreError::Backend(message)) => Err(StoreError::Backend(message).into()),
            Err(e) => {
                let current = self.store.get_or_create(thread_id).await?;
                Ok(rejection(&e, &current))
            }
        }
    }
}

#[async_trait]
impl<S: SessionStore, R: ReturnService> ToolBridge for ReturnsEngine<S, R> {
    async fn set_items(&self, thread_id: &str, items: Vec<ItemRef>) -> Result<String, EngineError> {
        let event = FlowEvent::ItemsSelected {
            items: items.into_iter().collect(),
        };
        self.apply_for_agent(thread_id, event, |record, _| {
            let names: Vec<String> = record
                .selected_descriptors()
                .into_iter()
                .map(|item| item.name.clone())
                .collect();
            format!(
                "Recorded {} item(s) for return: {}. Next: {}",
                names.len(),
                names.join(", "),
                next_step_hint(record)
            )
        })
        .await
    }

    async fn set_selection(
        &self,
        thread_id: &str,
        kind: SelectionKind,
        code: &str,
    ) -> Result<String, EngineError> {
        let event = match kind {
            SelectionKind::Items => {
                return Ok("Items are chosen with set_items, not set_selection.".to_string())
            }
            SelectionKind::Reason => ReasonCode::parse(code)
                .map(|code| FlowEvent::ReasonSelected { code })
                .ok_or_else(|| unknown_code::<ReasonCode>(kind, code)),
            SelectionKind::Resolution => ResolutionCode::parse(code)
                .map(|code| FlowEvent::ResolutionSelected { code })
                .ok_or_else(|| unknown_code::<ResolutionCode>(kind, code)),
            SelectionKind::Shipping => ShippingCode::parse(code)
                .map(|code| FlowEvent::ShippingSelected { code })
                .ok_or_else(|| unknown_code::<ShippingCode>(kind, code)),
        };
        let event = match event {
            Ok(event) => event,
            Err(message) => return Ok(message),
        };

        self.apply_for_agent(thread_id, event, move |record, effects| {
            let recorded = match kind {
                SelectionKind::Reason => record.reason_code.map(SelectionCode::label),
                SelectionKind::Resolution => record.resolution_code.map(SelectionCode::label),
                SelectionKind::Shipping => record.shipping_code.map(SelectionCode::label),
                SelectionKind::Items => None,
            }
            .unwrap_or_default();

            let offer = effects.iter().find_map(|effect| match effect {
                Effect::OfferRetention { offer } => Some(offer),
                _ => None,
            });
            if let Some(offer) = offer {
                return format!(
                    "Recorded {kind}: {recorded}. Before continuing, present this retention offer: {} (code {}). Then call respond_to_retention with accepted=true or accepted=false.",
                    offer.label, offer.code
                );
            }
            if effects.contains(&Effect::RequestFinalize) {
                return format!(
                    "Recorded {kind}: {recorded}. All selections are complete. Call finalize to create the return."
                );
            }
            format!("Recorded {kind}: {recorded}. Next: {}", next_step_hint(record))
        })
        .await
    }

    async fn respond_to_retention(
        &self,
        thread_id: &str,
        accepted: bool,
    ) -> Result<String, EngineError> {
        let event = if accepted {
            FlowEvent::RetentionAccepted
        } else {
            FlowEvent::RetentionDeclined
        };
        self.apply_for_agent(thread_id, event, |record, _| match &record.outcome {
            Some(FlowOutcome::RetentionAccepted { offer }) => format!(
                "The customer is keeping the item with offer {} ({}). No return was created and the request is complete.",
                offer.code, offer.label
            ),
            _ => format!("Offer declined. Next: {}", next_step_hint(record)),
        })
        .await
    }

    async fn finalize_return(
        &self,
        thread_id: &str,
        cancel: CancellationToken,
    ) -> Result<String, EngineError> {
        let message = match self.finalize(thread_id, cancel).await? {
            FinalizeOutcome::Created { receipt, .. } => format!(
                "Return {} created (status: {}). Refund: {} after a {} restocking fee.",
                receipt.return_id,
                receipt.status,
                format_cents(receipt.refund_cents),
                format_cents(receipt.restocking_fee_cents)
            ),
            FinalizeOutcome::Missing { fields } => {
                let names: Vec<&str> = fields.iter().map(|kind| kind.as_str()).collect();
                let first = fields.first().map_or("set_items", |kind| supplying_call(*kind));
                format!(
                    "Cannot create the return yet. Missing: {}. Next: call {first}.",
                    names.join(", ")
                )
            }
            FinalizeOutcome::Ineligible { message } => format!(
                "The return could not be created: {message}. The selections are still recorded; use change_selection to adjust them and call finalize again."
            ),
            FinalizeOutcome::AlreadyComplete { outcome } => match outcome {
                FlowOutcome::ReturnCreated { receipt } => {
                    format!("This return was already created as {}.", receipt.return_id)
                }
                FlowOutcome::RetentionAccepted { .. } => {
                    "The customer accepted a retention offer; no return is needed.".to_string()
                }
            },
            FinalizeOutcome::InProgress => {
                "A return is already being created for this conversation. Wait for it to finish.".to_string()
            }
            FinalizeOutcome::Superseded { receipt } => format!(
                "Return {} was created, but the selections changed meanwhile, so it was not recorded. It will be reused if the customer goes back to those selections. Review them with get_session_context before continuing.",
                receipt.return_id
            ),
        };
        Ok(message)
    }

    async fn session_context(&self, thread_id: &str) -> Result<String, EngineError> {
        let record = self.store.get_or_create(thread_id).await?;
        let summary = summarize(&record);
        if summary.is_empty() {
            return Ok("Nothing has been recorded for this conversation yet.".to_string());
        }
        Ok(summary)
    }

    async fn change_selection(
        &self,
        thread_id: &str,
        kind: SelectionKind,
    ) -> Result<String, EngineError> {
        let event = FlowEvent::ReselectionRequested { kind };
        self.apply_for_agent(thread_id, event, move |record, _| {
            format!(
                "Cleared {kind} and every later selection. Next: {}",
                next_step_hint(record)
            )
        })
        .await
    }

    async fn check_eligibility(&self, thread_id: &str) -> Result<String, EngineError> {
        let record = self.store.get_or_create(thread_id).await?;
        let selected = record.selected_descriptors();
        if selected.is_empty() {
            return Ok(NOTHING_SELECTED.to_string());
        }

        let tier = record.customer_tier.unwrap_or_default();
        let now = Utc::now();
        let mut text = format!(
            "Return window for {} members: {} days from the order date.",
            tier.label(),
            self.policy.window_days(tier)
        );
        let mut refused = 0;
        for item in selected {
            match self.policy.check_item(item, tier, now) {
                Ok(()) => {
                    let _ = write!(text, "\n  - {}: eligible", item.name);
                }
                Err(reason) => {
                    refused += 1;
                    let _ = write!(text, "\n  - {reason}");
                }
            }
        }
        text.push('\n');
        if refused == 0 {
            text.push_str("All selected items can be returned.");
        } else {
            text.push_str(
                "Some selected items cannot be returned. Use change_selection with kind=\"items\" to pick others.",
            );
        }
        Ok(text)
    }

    async fn quote_refund(
        &self,
        thread_id: &str,
        reason: Option<ReasonCode>,
        resolution: Option<ResolutionCode>,
    ) -> Result<String, EngineError> {
        let record = self.store.get_or_create(thread_id).await?;
        let selected = record.selected_descriptors();
        if selected.is_empty() {
            return Ok(NOTHING_SELECTED.to_string());
        }
        let Some(reason) = reason.or(record.reason_code) else {
            return Ok(format!(
                "The restocking fee depends on the return reason. Pass a reason (one of {}) or record it first.",
                ReasonCode::valid_codes()
            ));
        };

        let tier = record.customer_tier.unwrap_or_default();
        let resolution = resolution.or(record.resolution_code);
        let quote = match self.policy.quote_items(selected, tier, reason, resolution) {
            Ok(quote) => quote,
            Err(e) => return Ok(format!("Cannot quote this return: {e}.")),
        };

        let mut text = format!(
            "Subtotal: {}. Restocking fee: {}. Refund: {}.",
            format_cents(quote.subtotal_cents),
            format_cents(quote.restocking_fee_cents),
            format_cents(quote.refund_cents)
        );
        if quote.store_credit_bonus_cents > 0 {
            let _ = write!(
                text,
                " Store credit bonus: {}.",
                format_cents(quote.store_credit_bonus_cents)
            );
        }
        if quote.restocking_fee_cents > 0 {
            text.push_str(" Gold and Platinum members are exempt from restocking fees.");
        }
        Ok(text)
    }

    async fn return_history(&self, thread_id: &str) -> Result<String, EngineError> {
        let record = self.store.get_or_create(thread_id).await?;
        let Some(customer_id) = record.customer_id else {
            return Ok("No customer has been identified for this conversation yet.".to_string());
        };

        let returns = self.returns.customer_returns(&customer_id).await?;
        if returns.is_empty() {
            return Ok(format!("Customer {customer_id} has no previous returns."));
        }
        let mut text = format!(
            "Customer {customer_id} has {} previous return(s):",
            returns.len()
        );
        for stored in &returns {
            let _ = write!(
                text,
                "\n  - {} ({}): {}, refund {}, filed {}",
                stored.return_id,
                stored.status,
                stored.reason_code.label(),
                format_cents(stored.refund_cents),
                stored.created_at.format("%Y-%m-%d")
            );
        }
        Ok(text)
    }
}

fn unknown_code<C: SelectionCode>(kind: SelectionKind, code: &str) -> String {
    format!(
        "Unknown {kind} code '{code}'. Valid codes: {}. No change was made.",
        C::valid_codes()
    )
}

fn supplying_call(kind: SelectionKind) -> &'static str {
    match kind {
        SelectionKind::Items => "set_items",
        SelectionKind::Reason => "set_selection with kind=\"reason\"",
        SelectionKind::Resolution => "set_selection with kind=\"resolution\"",
        SelectionKind::Shipping => "set_selection with kind=\"shipping\"",
    }
}

/// What the agent should do at the record's current step
fn next_step_hint(record: &SessionRecord) -> String {
    match record.flow_step {
        FlowStep::Start if record.displayed_items.is_empty() => {
            "show the customer their recent orders so they can pick items.".to_string()
        }
        FlowStep::Start => "call set_items with the items the customer wants to return.".to_string(),
        FlowStep::AwaitingReason => format!(
            "ask why they are returning it and call {} (codes: {}).",
            supplying_call(SelectionKind::Reason),
            ReasonCode::valid_codes()
        ),
        FlowStep::AwaitingRetentionResponse => {
            "ask whether the customer accepts the retention offer and call respond_to_retention."
                .to_string()
        }
        FlowStep::AwaitingResolution => format!(
            "ask how they would like to be compensated and call {} (codes: {}).",
            supplying_call(SelectionKind::Resolution),
            ResolutionCode::valid_codes()
        ),
        FlowStep::AwaitingShipping if record.shipping_code.is_none() => format!(
            "ask how they will send the item back and call {} (codes: {}).",
            supplying_call(SelectionKind::Shipping),
            ShippingCode::valid_codes()
        ),
        FlowStep::AwaitingShipping => "call finalize to create the return.".to_string(),
        FlowStep::Complete => {
            "nothing; this request is complete. The customer can start a new return from the confirmation widget."
                .to_string()
        }
    }
}

/// Explain a refused event together with where the flow stands
fn rejection(error: &StoreError, record: &SessionRecord) -> String {
    format!(
        "No change was made: {error}. Current step: {}. Next: {}",
        record.flow_step,
        next_step_hint(record)
    )
}
