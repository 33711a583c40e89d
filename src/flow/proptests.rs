//! Property-based tests for the flow policy
//!
//! Random event sequences are driven through `advance`; the invariants
//! below must hold after every step, accepted or not.

use super::transition::*;
use super::*;
use proptest::prelude::*;
use std::collections::BTreeSet;

// ============================================================================
// Test Helpers
// ============================================================================

fn catalog_item(order: &str, product: &str, price: u64) -> ItemDescriptor {
    ItemDescriptor {
        order_id: order.to_string(),
        product_id: product.to_string(),
        name: format!("{product} from {order}"),
        unit_price_cents: price,
        quantity: 1,
        category: None,
        ordered_at: None,
        order_status: None,
    }
}

fn item_pool() -> Vec<ItemDescriptor> {
    vec![
        catalog_item("O1", "P1", 1999),
        catalog_item("O1", "P2", 4500),
        catalog_item("O2", "P3", 12000),
    ]
}

/// Drive a sequence, keeping only accepted events
fn run(events: Vec<FlowEvent>) -> SessionRecord {
    let mut record = SessionRecord::new("prop-thread");
    for event in events {
        if let Ok((next, _)) = advance(&record, event) {
            record = next;
        }
    }
    record
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_tier() -> impl Strategy<Value = CustomerTier> {
    prop_oneof![
        Just(CustomerTier::Standard),
        Just(CustomerTier::Silver),
        Just(CustomerTier::Gold),
        Just(CustomerTier::Platinum),
    ]
}

fn arb_item_ref() -> impl Strategy<Value = ItemRef> {
    prop_oneof![
        4 => (0usize..3).prop_map(|i| item_pool()[i].item_ref()),
        1 => Just(ItemRef::new("O9", "P9")),
    ]
}

fn arb_kind() -> impl Strategy<Value = SelectionKind> {
    prop_oneof![
        Just(SelectionKind::Items),
        Just(SelectionKind::Reason),
        Just(SelectionKind::Resolution),
        Just(SelectionKind::Shipping),
    ]
}

fn arb_code<C: SelectionCode + std::fmt::Debug>() -> impl Strategy<Value = C> {
    (0..C::ALL.len()).prop_map(|i| C::ALL[i])
}

fn arb_receipt() -> impl Strategy<Value = ReturnReceipt> {
    ("[0-9A-F]{8}", 0u64..50_000).prop_map(|(id, refund)| ReturnReceipt {
        return_id: format!("RET-{id}"),
        status: "pending".to_string(),
        refund_cents: refund,
        restocking_fee_cents: 0,
    })
}

fn arb_event() -> impl Strategy<Value = FlowEvent> {
    prop_oneof![
        ("C[0-9]{3}", arb_tier()).prop_map(|(customer_id, tier)| FlowEvent::CustomerIdentified {
            customer_id,
            name: None,
            tier: Some(tier),
        }),
        prop::collection::vec(0usize..3, 1..3).prop_map(|idx| FlowEvent::ItemsDisplayed {
            items: idx.into_iter().map(|i| item_pool()[i].clone()).collect(),
        }),
        prop::collection::btree_set(arb_item_ref(), 0..3)
            .prop_map(|items| FlowEvent::ItemsSelected { items }),
        arb_code::<ReasonCode>().prop_map(|code| FlowEvent::ReasonSelected { code }),
        Just(FlowEvent::RetentionAccepted),
        Just(FlowEvent::RetentionDeclined),
        arb_code::<ResolutionCode>().prop_map(|code| FlowEvent::ResolutionSelected { code }),
        arb_code::<ShippingCode>().prop_map(|code| FlowEvent::ShippingSelected { code }),
        arb_kind().prop_map(|kind| FlowEvent::ReselectionRequested { kind }),
        Just(FlowEvent::NewReturnStarted),
        arb_receipt().prop_map(|receipt| FlowEvent::ReturnCreated { receipt }),
        (arb_receipt(), arb_code::<ShippingCode>()).prop_map(|(receipt, shipping)| {
            FlowEvent::ReceiptHeld {
                held: HeldReceipt {
                    receipt,
                    selections: SelectionSnapshot {
                        customer_id: None,
                        items: BTreeSet::from([item_pool()[0].item_ref()]),
                        reason: ReasonCode::Defective,
                        resolution: ResolutionCode::FullRefund,
                        shipping,
                    },
                },
            }
        }),
    ]
}

fn arb_events() -> impl Strategy<Value = Vec<FlowEvent>> {
    prop::collection::vec(arb_event(), 0..40)
}

/// Reach a ready record with a generated tier, then play random events
fn arb_ready_record() -> impl Strategy<Value = SessionRecord> {
    (arb_tier(), arb_code::<ReasonCode>(), arb_code::<ShippingCode>()).prop_map(
        |(tier, reason, shipping)| {
            run(vec![
                FlowEvent::CustomerIdentified {
                    customer_id: "C1".to_string(),
                    name: None,
                    tier: Some(tier),
                },
                FlowEvent::ItemsDisplayed { items: item_pool() },
                FlowEvent::ItemsSelected {
                    items: BTreeSet::from([ItemRef::new("O1", "P2")]),
                },
                FlowEvent::ReasonSelected { code: reason },
                FlowEvent::RetentionDeclined,
                FlowEvent::ResolutionSelected {
                    code: ResolutionCode::StoreCredit,
                },
                FlowEvent::ShippingSelected { code: shipping },
            ])
        },
    )
}

// ============================================================================
// Invariant Checks
// ============================================================================

/// Fields recorded must agree with the step the record is in
fn assert_step_consistent(record: &SessionRecord) -> Result<(), TestCaseError> {
    let has = |kind| record.has_selection(kind);
    match record.flow_step {
        FlowStep::Start => prop_assert!(!has(SelectionKind::Items)),
        FlowStep::AwaitingReason => {
            prop_assert!(has(SelectionKind::Items));
            prop_assert!(!has(SelectionKind::Reason));
        }
        FlowStep::AwaitingRetentionResponse => {
            prop_assert_eq!(record.reason_code, Some(ReasonCode::ChangedMind));
            prop_assert!(record.retention_offer.is_some());
        }
        FlowStep::AwaitingResolution => {
            prop_assert!(has(SelectionKind::Reason));
            prop_assert!(!has(SelectionKind::Resolution));
        }
        FlowStep::AwaitingShipping => prop_assert!(has(SelectionKind::Resolution)),
        FlowStep::Complete => prop_assert!(record.outcome.is_some()),
    }
    if record.flow_step != FlowStep::Complete {
        prop_assert!(record.outcome.is_none());
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// The transition never touches the version; the store owns it
    #[test]
    fn prop_transition_leaves_version_alone(events in arb_events(), event in arb_event()) {
        let record = run(events);
        if let Ok((next, _)) = advance(&record, event) {
            prop_assert_eq!(next.version, record.version);
            prop_assert_eq!(next.thread_id, record.thread_id);
        }
    }

    /// Every accepted event notifies subscribers first
    #[test]
    fn prop_accepted_events_notify(events in arb_events(), event in arb_event()) {
        let record = run(events);
        if let Ok(result) = transition(&record, event) {
            prop_assert_eq!(result.effects.first(), Some(&Effect::NotifySessionChanged));
        }
    }

    /// Replaying an event that was just applied is always rejected
    #[test]
    fn prop_replay_is_rejected(events in arb_events(), event in arb_event()) {
        let record = run(events);
        if let Ok((next, _)) = advance(&record, event.clone()) {
            prop_assert!(transition(&next, event).is_err());
        }
    }

    /// Step and recorded fields stay consistent across any sequence
    #[test]
    fn prop_step_matches_fields(events in arb_events()) {
        let mut record = SessionRecord::new("prop-thread");
        for event in events {
            if let Ok((next, _)) = advance(&record, event) {
                record = next;
            }
            assert_step_consistent(&record)?;
        }
    }

    /// Selections only ever name displayed items
    #[test]
    fn prop_selection_subset_of_displayed(events in arb_events()) {
        let record = run(events);
        for item in &record.selected_items {
            prop_assert!(record.is_displayed(item));
        }
    }

    /// A return is only ever created from a ready record
    #[test]
    fn prop_return_created_only_when_ready(events in arb_events(), event in arb_event()) {
        let record = run(events);
        let was_ready = record.is_ready_to_finalize();
        if let Ok((next, _)) = advance(&record, event) {
            if matches!(next.outcome, Some(FlowOutcome::ReturnCreated { .. }))
                && record.outcome.is_none()
            {
                prop_assert!(was_ready);
            }
        }
    }

    /// Finalize is requested exactly when shipping is first recorded
    #[test]
    fn prop_finalize_requested_on_ready(events in arb_events(), event in arb_event()) {
        let record = run(events);
        if let Ok((next, effects)) = advance(&record, event) {
            let requested = effects.contains(&Effect::RequestFinalize);
            prop_assert_eq!(requested, !record.is_ready_to_finalize() && next.is_ready_to_finalize());
        }
    }

    /// CHANGED_MIND always diverts through a retention offer
    #[test]
    fn prop_changed_mind_offers_retention(events in arb_events()) {
        let record = run(events);
        let event = FlowEvent::ReasonSelected { code: ReasonCode::ChangedMind };
        if let Ok((next, effects)) = advance(&record, event) {
            prop_assert_eq!(next.flow_step, FlowStep::AwaitingRetentionResponse);
            let offered = effects.iter().any(|e| matches!(e, Effect::OfferRetention { .. }));
            prop_assert!(offered);
        }
    }

    /// Any other reason skips retention
    #[test]
    fn prop_other_reasons_skip_retention(events in arb_events(), code in arb_code::<ReasonCode>()) {
        prop_assume!(code != ReasonCode::ChangedMind);
        let record = run(events);
        if let Ok((next, _)) = advance(&record, FlowEvent::ReasonSelected { code }) {
            prop_assert_eq!(next.flow_step, FlowStep::AwaitingResolution);
            prop_assert!(next.retention_offer.is_none());
        }
    }

    /// Same sequence, same record: the policy is deterministic
    #[test]
    fn prop_deterministic(events in arb_events()) {
        prop_assert_eq!(run(events.clone()), run(events));
    }

    /// Identity survives everything once set
    #[test]
    fn prop_identity_is_sticky(events in arb_events()) {
        let mut record = SessionRecord::new("prop-thread");
        let mut identity = None;
        for event in events {
            if let Ok((next, _)) = advance(&record, event) {
                record = next;
            }
            if identity.is_none() && record.customer_id.is_some() {
                identity = record.customer_id.clone();
            }
            if identity.is_some() {
                prop_assert_eq!(&record.customer_id, &identity);
            }
        }
    }

    /// A ready record completes with the receipt it was given
    #[test]
    fn prop_ready_record_completes(record in arb_ready_record(), receipt in arb_receipt()) {
        prop_assume!(record.is_ready_to_finalize());
        let (done, _) = advance(&record, FlowEvent::ReturnCreated { receipt: receipt.clone() })
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(done.flow_step, FlowStep::Complete);
        prop_assert_eq!(done.outcome, Some(FlowOutcome::ReturnCreated { receipt }));
    }
}
