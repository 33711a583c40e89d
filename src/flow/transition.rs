//! Pure flow transition function
//!
//! Given the current record and an event, decide the next step, the
//! mutation to apply and the effects to run. No I/O happens here; the
//! engine applies the result through the session store.

use super::codes::{CustomerTier, ReasonCode, ResolutionCode, SelectionKind, ShippingCode};
use super::record::{FlowOutcome, FlowStep, HeldReceipt, ItemDescriptor, ItemRef, SessionRecord};
use super::retention::{best_offer, RetentionOffer};
use super::{Effect, FlowEvent};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

/// Change to apply to the record's fields
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Step change only
    Unchanged,
    SetCustomer {
        customer_id: String,
        name: Option<String>,
        tier: Option<CustomerTier>,
    },
    AppendDisplayed {
        items: Vec<ItemDescriptor>,
    },
    SelectItems {
        items: BTreeSet<ItemRef>,
    },
    SetReason {
        code: ReasonCode,
        offer: Option<RetentionOffer>,
    },
    SetResolution {
        code: ResolutionCode,
    },
    SetShipping {
        code: ShippingCode,
    },
    Complete {
        outcome: FlowOutcome,
    },
    HoldReceipt {
        held: HeldReceipt,
    },
    ClearFrom {
        kind: SelectionKind,
    },
    ResetWorkflow,
}

/// Result of a flow transition
#[derive(Debug)]
pub struct TransitionResult {
    pub next_step: FlowStep,
    pub mutation: Mutation,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    /// Every committed transition notifies subscribers
    pub fn new(next_step: FlowStep, mutation: Mutation) -> Self {
        Self {
            next_step,
            mutation,
            effects: vec![Effect::NotifySessionChanged],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Reasons an event is refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
    #[error("No items were selected")]
    EmptySelection,
    #[error("Item {0} was not shown to the customer")]
    UnknownItem(ItemRef),
    #[error("Customer is already identified for this conversation")]
    CustomerAlreadyIdentified,
}

/// Pure transition function
pub fn transition(
    record: &SessionRecord,
    event: FlowEvent,
) -> Result<TransitionResult, TransitionError> {
    match (record.flow_step, event) {
        // ============================================================
        // Identity and display
        // ============================================================
        (_, FlowEvent::CustomerIdentified { .. }) if record.has_customer() => {
            Err(TransitionError::CustomerAlreadyIdentified)
        }

        (FlowStep::Start, FlowEvent::CustomerIdentified { customer_id, name, tier }) => {
            Ok(TransitionResult::new(
                FlowStep::Start,
                Mutation::SetCustomer {
                    customer_id,
                    name,
                    tier,
                },
            ))
        }

        (step, FlowEvent::ItemsDisplayed { items }) if !step.is_terminal() => {
            let fresh = unseen_items(record, items);
            if fresh.is_empty() {
                return Err(TransitionError::InvalidTransition(
                    "every item was already displayed".to_string(),
                ));
            }
            Ok(TransitionResult::new(
                step,
                Mutation::AppendDisplayed { items: fresh },
            ))
        }

        // ============================================================
        // Selections, in workflow order
        // ============================================================
        (FlowStep::Start, FlowEvent::ItemsSelected { items }) => {
            if items.is_empty() {
                return Err(TransitionError::EmptySelection);
            }
            if let Some(unknown) = items.iter().find(|item| !record.is_displayed(item)) {
                return Err(TransitionError::UnknownItem(unknown.clone()));
            }
            Ok(TransitionResult::new(
                FlowStep::AwaitingReason,
                Mutation::SelectItems { items },
            ))
        }

        (FlowStep::AwaitingReason, FlowEvent::ReasonSelected { code }) => {
            if code == ReasonCode::ChangedMind {
                let offer = best_offer(record.customer_tier);
                Ok(TransitionResult::new(
                    FlowStep::AwaitingRetentionResponse,
                    Mutation::SetReason {
                        code,
                        offer: Some(offer.clone()),
                    },
                )
                .with_effect(Effect::offer_retention(offer)))
            } else {
                Ok(TransitionResult::new(
                    FlowStep::AwaitingResolution,
                    Mutation::SetReason { code, offer: None },
                ))
            }
        }

        (FlowStep::AwaitingRetentionResponse, FlowEvent::RetentionAccepted) => {
            let Some(offer) = record.retention_offer.clone() else {
                return Err(TransitionError::InvalidTransition(
                    "no retention offer is pending".to_string(),
                ));
            };
            let outcome = FlowOutcome::RetentionAccepted { offer };
            Ok(TransitionResult::new(
                FlowStep::Complete,
                Mutation::Complete {
                    outcome: outcome.clone(),
                },
            )
            .with_effect(Effect::completed(outcome)))
        }

        (FlowStep::AwaitingRetentionResponse, FlowEvent::RetentionDeclined) => Ok(
            TransitionResult::new(FlowStep::AwaitingResolution, Mutation::Unchanged),
        ),

        (FlowStep::AwaitingResolution, FlowEvent::ResolutionSelected { code }) => Ok(
            TransitionResult::new(FlowStep::AwaitingShipping, Mutation::SetResolution { code }),
        ),

        // Shipping is recorded without leaving the step; the return is
        // created by the finalizer, which then sends ReturnCreated.
        (FlowStep::AwaitingShipping, FlowEvent::ShippingSelected { code })
            if record.shipping_code.is_none() =>
        {
            Ok(
                TransitionResult::new(FlowStep::AwaitingShipping, Mutation::SetShipping { code })
                    .with_effect(Effect::RequestFinalize),
            )
        }

        (FlowStep::AwaitingShipping, FlowEvent::ReturnCreated { receipt })
            if record.is_ready_to_finalize() =>
        {
            let outcome = FlowOutcome::ReturnCreated { receipt };
            Ok(TransitionResult::new(
                FlowStep::Complete,
                Mutation::Complete {
                    outcome: outcome.clone(),
                },
            )
            .with_effect(Effect::completed(outcome)))
        }

        // Kept until the customer goes back to the selections it was
        // issued for, or starts over
        (step, FlowEvent::ReceiptHeld { held }) if !step.is_terminal() => {
            if record.held_receipt.as_ref() == Some(&held) {
                return Err(TransitionError::InvalidTransition(
                    "receipt is already held".to_string(),
                ));
            }
            Ok(TransitionResult::new(step, Mutation::HoldReceipt { held }))
        }

        // ============================================================
        // Corrections
        // ============================================================
        (step, FlowEvent::ReselectionRequested { kind })
            if !step.is_terminal() && record.has_selection(kind) =>
        {
            Ok(TransitionResult::new(
                FlowStep::collecting(kind),
                Mutation::ClearFrom { kind },
            ))
        }

        (FlowStep::Complete, FlowEvent::NewReturnStarted) => Ok(TransitionResult::new(
            FlowStep::Start,
            Mutation::ResetWorkflow,
        )),

        // Everything else, including selections for a step already passed
        (step, event) => Err(TransitionError::InvalidTransition(format!(
            "{} is not accepted at step {step}",
            event.name()
        ))),
    }
}

/// Items not yet displayed, without duplicates inside the batch
fn unseen_items(record: &SessionRecord, items: Vec<ItemDescriptor>) -> Vec<ItemDescriptor> {
    let mut seen: HashSet<ItemRef> = record
        .displayed_items
        .iter()
        .map(ItemDescriptor::item_ref)
        .collect();
    items
        .into_iter()
        .filter(|item| seen.insert(item.item_ref()))
        .collect()
}

impl SessionRecord {
    /// Produce the next record from a transition result. The version is
    /// left alone; the store assigns it on commit.
    pub fn apply_transition(&self, result: TransitionResult) -> (SessionRecord, Vec<Effect>) {
        let mut next = self.clone();
        match result.mutation {
            Mutation::Unchanged => {}
            Mutation::SetCustomer {
                customer_id,
                name,
                tier,
            } => {
                next.customer_id = Some(customer_id);
                next.customer_name = name;
                next.customer_tier = tier;
            }
            Mutation::AppendDisplayed { items } => next.displayed_items.extend(items),
            Mutation::SelectItems { items } => next.selected_items = items,
            Mutation::SetReason { code, offer } => {
                next.reason_code = Some(code);
                next.retention_offer = offer;
            }
            Mutation::SetResolution { code } => next.resolution_code = Some(code),
            Mutation::SetShipping { code } => next.shipping_code = Some(code),
            Mutation::Complete { outcome } => {
                next.outcome = Some(outcome);
                next.held_receipt = None;
            }
            Mutation::HoldReceipt { held } => next.held_receipt = Some(held),
            Mutation::ClearFrom { kind } => next.clear_from(kind),
            Mutation::ResetWorkflow => {
                next.displayed_items.clear();
                next.clear_from(SelectionKind::Items);
                next.outcome = None;
                next.held_receipt = None;
            }
        }
        next.flow_step = result.next_step;
        (next, result.effects)
    }
}

/// Run the transition and apply it in one step
pub fn advance(
    record: &SessionRecord,
    event: FlowEvent,
) -> Result<(SessionRecord, Vec<Effect>), TransitionError> {
    let result = transition(record, event)?;
    Ok(record.apply_transition(result))
}
