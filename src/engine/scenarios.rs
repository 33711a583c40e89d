//! End-to-end scenarios across both input paths
//!
//! Each test drives a real engine (in-memory store, mock return service)
//! the way the chat transport would: widget clicks through
//! `handle_action`, agent tool calls through the `ToolBridge`.

use super::testing::{DelayedMockReturnService, MockReturnService};
use super::{EngineError, FinalizeOutcome, InputSource, ReturnsEngine, SessionEvent, ToolBridge};
use crate::db::Database;
use crate::flow::{
    CustomerTier, FlowEvent, FlowOutcome, FlowStep, ItemDescriptor, ItemRef, ReasonCode,
    ResolutionCode, SelectionKind, SessionRecord, ShippingCode,
};
use crate::returns::policy::ReturnPolicy;
use crate::returns::{DatabaseReturnService, ReturnServiceError};
use crate::session::{DatabaseSessionStore, MemorySessionStore, SessionStore};
use crate::widgets::{NextWidgetSpec, WidgetKind};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type TestEngine = ReturnsEngine<MemorySessionStore, Arc<MockReturnService>>;

const THREAD: &str = "thread-1";

fn descriptor(order_id: &str, product_id: &str, name: &str) -> ItemDescriptor {
    ItemDescriptor {
        order_id: order_id.to_string(),
        product_id: product_id.to_string(),
        name: name.to_string(),
        unit_price_cents: 4999,
        quantity: 1,
        category: Some("outerwear".to_string()),
        ordered_at: None,
        order_status: Some("delivered".to_string()),
    }
}

fn engine() -> (TestEngine, Arc<MockReturnService>) {
    let returns = Arc::new(MockReturnService::new());
    (ReturnsEngine::new(MemorySessionStore::new(), returns.clone()), returns)
}

/// Customer lookup and order display, as the transport reports them
async fn seed<S: SessionStore, R: crate::returns::ReturnService>(
    engine: &ReturnsEngine<S, R>,
    tier: CustomerTier,
) {
    let ack = engine
        .record_transport_event(
            THREAD,
            FlowEvent::CustomerIdentified {
                customer_id: "C100".to_string(),
                name: Some("Ada".to_string()),
                tier: Some(tier),
            },
        )
        .await
        .unwrap();
    assert!(ack.accepted);
    let ack = engine
        .record_transport_event(
            THREAD,
            FlowEvent::ItemsDisplayed {
                items: vec![
                    descriptor("O1", "P1", "Trail Jacket"),
                    descriptor("O1", "P2", "Wool Socks"),
                ],
            },
        )
        .await
        .unwrap();
    assert!(ack.accepted);
}

async fn click<S: SessionStore, R: crate::returns::ReturnService>(
    engine: &ReturnsEngine<S, R>,
    action_type: &str,
    payload: Value,
) -> NextWidgetSpec {
    engine
        .handle_action(THREAD, action_type, &payload, CancellationToken::new())
        .await
        .unwrap()
}

fn shown_kind(next: &NextWidgetSpec) -> WidgetKind {
    match next {
        NextWidgetSpec::Show { widget } => widget.kind,
        other => panic!("Expected a widget to show, got {other:?}"),
    }
}

async fn current(engine: &TestEngine) -> SessionRecord {
    engine.session(THREAD).await.unwrap()
}

/// Drive the record to awaiting_shipping with nothing but widget clicks
async fn widget_path_to_shipping(engine: &TestEngine) {
    seed(engine, CustomerTier::Standard).await;
    click(engine, "select_return_item", json!({ "order_id": "O1", "product_id": "P1" })).await;
    click(engine, "select_reason", json!({ "reason_code": "DEFECTIVE" })).await;
    click(engine, "select_resolution", json!({ "resolution": "FULL_REFUND" })).await;
}

// ============================================================================
// Happy paths
// ============================================================================

#[tokio::test]
async fn test_widget_path_creates_return() {
    let (engine, returns) = engine();
    returns.queue_receipt("RET-0000AAAA", 4999);
    seed(&engine, CustomerTier::Standard).await;

    let next = click(&engine, "select_return_item", json!({ "order_id": "O1", "product_id": "P1" })).await;
    assert_eq!(shown_kind(&next), WidgetKind::ReasonSelector);

    let next = click(&engine, "select_reason", json!({ "reason_code": "DEFECTIVE" })).await;
    assert_eq!(shown_kind(&next), WidgetKind::ResolutionSelector);

    let next = click(&engine, "select_resolution", json!({ "resolution": "FULL_REFUND" })).await;
    assert_eq!(shown_kind(&next), WidgetKind::ShippingSelector);

    let next = click(&engine, "select_shipping", json!({ "shipping_method": "PREPAID_LABEL" })).await;
    assert_eq!(shown_kind(&next), WidgetKind::ReturnConfirmation);
    assert_eq!(
        next.widget().unwrap().data["return_id"],
        json!("RET-0000AAAA")
    );

    let record = current(&engine).await;
    assert_eq!(record.flow_step, FlowStep::Complete);
    assert!(matches!(
        record.outcome,
        Some(FlowOutcome::ReturnCreated { ref receipt }) if receipt.return_id == "RET-0000AAAA"
    ));

    let requests = returns.recorded_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].items[0].name, "Trail Jacket");
    assert_eq!(requests[0].reason, ReasonCode::Defective);
    assert_eq!(requests[0].shipping, ShippingCode::PrepaidLabel);
}

#[tokio::test]
async fn test_tool_path_creates_return() {
    let (engine, returns) = engine();
    returns.queue_receipt("RET-0000BBBB", 4999);
    seed(&engine, CustomerTier::Standard).await;

    let reply = engine
        .set_items(THREAD, vec![ItemRef::new("O1", "P1")])
        .await
        .unwrap();
    assert!(reply.starts_with("Recorded 1 item(s) for return: Trail Jacket."), "{reply}");

    engine
        .set_selection(THREAD, SelectionKind::Reason, "defective")
        .await
        .unwrap();
    engine
        .set_selection(THREAD, SelectionKind::Resolution, "Full Refund")
        .await
        .unwrap();
    let reply = engine
        .set_selection(THREAD, SelectionKind::Shipping, "prepaid-label")
        .await
        .unwrap();
    assert!(reply.contains("Call finalize to create the return."), "{reply}");
    assert!(returns.recorded_requests().is_empty());

    let reply = engine
        .finalize_return(THREAD, CancellationToken::new())
        .await
        .unwrap();
    assert!(reply.starts_with("Return RET-0000BBBB created"), "{reply}");
    assert_eq!(current(&engine).await.flow_step, FlowStep::Complete);
}

#[tokio::test]
async fn test_both_paths_converge_on_the_same_record() {
    let (widget_engine, widget_returns) = engine();
    let (tool_engine, tool_returns) = engine();
    widget_returns.queue_receipt("RET-0000CCCC", 4999);
    tool_returns.queue_receipt("RET-0000CCCC", 4999);

    widget_path_to_shipping(&widget_engine).await;
    click(&widget_engine, "select_shipping", json!({ "shipping_method": "DROP_OFF" })).await;

    seed(&tool_engine, CustomerTier::Standard).await;
    tool_engine.set_items(THREAD, vec![ItemRef::new("O1", "P1")]).await.unwrap();
    tool_engine.set_selection(THREAD, SelectionKind::Reason, "DEFECTIVE").await.unwrap();
    tool_engine
        .set_selection(THREAD, SelectionKind::Resolution, "FULL_REFUND")
        .await
        .unwrap();
    tool_engine.set_selection(THREAD, SelectionKind::Shipping, "DROP_OFF").await.unwrap();
    tool_engine.finalize_return(THREAD, CancellationToken::new()).await.unwrap();

    let from_widgets = current(&widget_engine).await;
    let from_tools = tool_engine.session(THREAD).await.unwrap();
    assert!(from_widgets.same_state(&from_tools), "{from_widgets:?}\n{from_tools:?}");
    assert_eq!(from_widgets.version, from_tools.version);
    assert_eq!(widget_returns.recorded_requests(), tool_returns.recorded_requests());
}

#[tokio::test]
async fn test_paths_can_be_mixed() {
    let (engine, returns) = engine();
    returns.queue_receipt("RET-0000DDDD", 4999);
    seed(&engine, CustomerTier::Standard).await;

    click(&engine, "select_return_item", json!({ "order_id": "O1", "product_id": "P2" })).await;
    let context = engine.session_context(THREAD).await.unwrap();
    assert!(context.contains("Selected for return:\n  - Wool Socks (order O1)"), "{context}");

    engine.set_selection(THREAD, SelectionKind::Reason, "WRONG_SIZE").await.unwrap();
    let next = click(&engine, "select_resolution", json!({ "code": "exchange" })).await;
    assert_eq!(shown_kind(&next), WidgetKind::ShippingSelector);

    engine.set_selection(THREAD, SelectionKind::Shipping, "pickup").await.unwrap();
    engine.finalize_return(THREAD, CancellationToken::new()).await.unwrap();

    let record = current(&engine).await;
    assert_eq!(record.reason_code, Some(ReasonCode::WrongSize));
    assert_eq!(record.resolution_code, Some(ResolutionCode::Exchange));
    assert_eq!(record.shipping_code, Some(ShippingCode::SchedulePickup));
    assert_eq!(record.flow_step, FlowStep::Complete);
}

#[tokio::test]
async fn test_database_backed_engine_end_to_end() {
    let db = Database::open_in_memory().unwrap();
    let engine = ReturnsEngine::new(
        DatabaseSessionStore::new(db.clone()),
        DatabaseReturnService::new(db.clone(), ReturnPolicy::default()),
    );
    seed(&engine, CustomerTier::Gold).await;
    click(&engine, "select_return_item", json!({ "order_id": "O1", "product_id": "P1" })).await;
    click(&engine, "select_reason", json!({ "reason_code": "WRONG_ITEM" })).await;
    click(&engine, "select_resolution", json!({ "resolution": "STORE_CREDIT" })).await;
    let next = click(&engine, "select_shipping", json!({ "shipping_method": "DROP_OFF" })).await;
    assert_eq!(shown_kind(&next), WidgetKind::ReturnConfirmation);

    let stored = db.list_returns_for_thread(THREAD).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].refund_cents, 4999);
    assert_eq!(stored[0].store_credit_bonus_cents, 499);
    assert!(stored[0].return_id.starts_with("RET-"));
}

// ============================================================================
// Ordering and races
// ============================================================================

#[tokio::test]
async fn test_out_of_order_event_leaves_record_unchanged() {
    let (engine, _) = engine();
    seed(&engine, CustomerTier::Standard).await;
    click(&engine, "select_return_item", json!({ "order_id": "O1", "product_id": "P1" })).await;
    let before = current(&engine).await;

    let next = click(&engine, "select_resolution", json!({ "resolution": "FULL_REFUND" })).await;
    match next {
        NextWidgetSpec::NoOp { widget, reason } => {
            assert_eq!(widget.kind, WidgetKind::ReasonSelector);
            assert!(reason.starts_with("Invalid transition"), "{reason}");
        }
        other => panic!("Expected NoOp, got {other:?}"),
    }

    let reply = engine
        .set_selection(THREAD, SelectionKind::Resolution, "FULL_REFUND")
        .await
        .unwrap();
    assert!(reply.starts_with("No change was made"), "{reply}");
    assert!(reply.contains("Current step: awaiting_reason"), "{reply}");

    assert_eq!(current(&engine).await, before);
}

#[tokio::test]
async fn test_double_submit_from_widget_then_agent() {
    let (engine, _) = engine();
    seed(&engine, CustomerTier::Standard).await;
    click(&engine, "select_return_item", json!({ "order_id": "O1", "product_id": "P1" })).await;
    click(&engine, "select_reason", json!({ "reason_code": "DEFECTIVE" })).await;

    let version = current(&engine).await.version;
    click(
        &engine,
        "select_resolution",
        json!({ "resolution": "FULL_REFUND", "session_version": version }),
    )
    .await;
    let after_widget = current(&engine).await;

    let reply = engine
        .set_selection(THREAD, SelectionKind::Resolution, "FULL_REFUND")
        .await
        .unwrap();
    assert!(reply.starts_with("No change was made"), "{reply}");
    assert_eq!(current(&engine).await, after_widget);
}

#[tokio::test]
async fn test_stale_widget_click_is_a_noop() {
    let (engine, _) = engine();
    seed(&engine, CustomerTier::Standard).await;
    click(&engine, "select_return_item", json!({ "order_id": "O1", "product_id": "P1" })).await;
    let rendered_at = current(&engine).await.version;

    // The agent answers first
    engine.set_selection(THREAD, SelectionKind::Reason, "DAMAGED").await.unwrap();
    let after_agent = current(&engine).await;

    let next = click(
        &engine,
        "select_reason",
        json!({ "reason_code": "DEFECTIVE", "session_version": rendered_at }),
    )
    .await;
    match next {
        NextWidgetSpec::NoOp { widget, reason } => {
            assert_eq!(widget.kind, WidgetKind::ResolutionSelector);
            assert_eq!(widget.session_version, after_agent.version);
            assert!(reason.starts_with("Version conflict"), "{reason}");
        }
        other => panic!("Expected NoOp, got {other:?}"),
    }
    assert_eq!(current(&engine).await, after_agent);
}

#[tokio::test]
async fn test_concurrent_clicks_commit_once() {
    let (engine, _) = engine();
    let engine = Arc::new(engine);
    seed(engine.as_ref(), CustomerTier::Standard).await;
    click(engine.as_ref(), "select_return_item", json!({ "order_id": "O1", "product_id": "P1" })).await;
    let version = engine.session(THREAD).await.unwrap().version;

    let mut handles = Vec::new();
    for code in ["DEFECTIVE", "DAMAGED", "WRONG_SIZE", "OTHER"] {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .handle_action(
                    THREAD,
                    "select_reason",
                    &json!({ "reason_code": code, "session_version": version }),
                    CancellationToken::new(),
                )
                .await
                .unwrap()
        }));
    }

    let mut shown = 0;
    for handle in handles {
        if matches!(handle.await.unwrap(), NextWidgetSpec::Show { .. }) {
            shown += 1;
        }
    }
    assert_eq!(shown, 1);
    assert_eq!(engine.session(THREAD).await.unwrap().version, version + 1);
}

// ============================================================================
// Readiness, retention and corrections
// ============================================================================

#[tokio::test]
async fn test_finalize_before_ready_never_calls_service() {
    let (engine, returns) = engine();
    seed(&engine, CustomerTier::Standard).await;
    engine.set_items(THREAD, vec![ItemRef::new("O1", "P1")]).await.unwrap();
    engine.set_selection(THREAD, SelectionKind::Reason, "DEFECTIVE").await.unwrap();

    let reply = engine
        .finalize_return(THREAD, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        reply,
        "Cannot create the return yet. Missing: resolution, shipping. Next: call set_selection with kind=\"resolution\"."
    );

    let outcome = engine.finalize(THREAD, CancellationToken::new()).await.unwrap();
    assert_eq!(
        outcome,
        FinalizeOutcome::Missing {
            fields: vec![SelectionKind::Resolution, SelectionKind::Shipping]
        }
    );
    assert!(returns.recorded_requests().is_empty());
}

#[tokio::test]
async fn test_retention_accepted_completes_without_return() {
    let (engine, returns) = engine();
    seed(&engine, CustomerTier::Gold).await;
    click(&engine, "select_return_item", json!({ "order_id": "O1", "product_id": "P1" })).await;

    let next = click(&engine, "select_reason", json!({ "reason_code": "CHANGED_MIND" })).await;
    assert_eq!(shown_kind(&next), WidgetKind::RetentionOffer);
    assert_eq!(next.widget().unwrap().data["offer"]["code"], json!("VIP20"));

    let next = click(&engine, "accept_offer", json!({})).await;
    assert_eq!(shown_kind(&next), WidgetKind::RetentionConfirmation);

    let record = current(&engine).await;
    assert_eq!(record.flow_step, FlowStep::Complete);
    assert!(matches!(record.outcome, Some(FlowOutcome::RetentionAccepted { .. })));
    assert!(returns.recorded_requests().is_empty());

    let reply = engine
        .finalize_return(THREAD, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(reply, "The customer accepted a retention offer; no return is needed.");
}

#[tokio::test]
async fn test_retention_declined_by_agent_continues() {
    let (engine, _) = engine();
    seed(&engine, CustomerTier::Standard).await;
    engine.set_items(THREAD, vec![ItemRef::new("O1", "P1")]).await.unwrap();

    let reply = engine
        .set_selection(THREAD, SelectionKind::Reason, "changed mind")
        .await
        .unwrap();
    assert!(reply.contains("present this retention offer"), "{reply}");
    assert!(reply.contains("KEEP10"), "{reply}");

    let reply = engine.respond_to_retention(THREAD, false).await.unwrap();
    assert!(reply.starts_with("Offer declined."), "{reply}");
    let record = current(&engine).await;
    assert_eq!(record.flow_step, FlowStep::AwaitingResolution);
    assert_eq!(record.reason_code, Some(ReasonCode::ChangedMind));
}

#[tokio::test]
async fn test_change_selection_rewinds() {
    let (engine, _) = engine();
    widget_path_to_shipping(&engine).await;

    let reply = engine
        .change_selection(THREAD, SelectionKind::Reason)
        .await
        .unwrap();
    assert!(reply.starts_with("Cleared reason and every later selection."), "{reply}");

    let record = current(&engine).await;
    assert_eq!(record.flow_step, FlowStep::AwaitingReason);
    assert_eq!(record.reason_code, None);
    assert_eq!(record.resolution_code, None);
    assert_eq!(record.selected_items.len(), 1);

    let next = click(&engine, "change_selection", json!({ "kind": "items" })).await;
    assert_eq!(shown_kind(&next), WidgetKind::ItemSelector);
    assert!(current(&engine).await.selected_items.is_empty());
}

#[tokio::test]
async fn test_start_new_return_after_completion() {
    let (engine, returns) = engine();
    returns.queue_receipt("RET-0000EEEE", 4999);
    widget_path_to_shipping(&engine).await;
    click(&engine, "select_shipping", json!({ "shipping_method": "DROP_OFF" })).await;

    let next = click(&engine, "start_new_return", json!({})).await;
    assert_eq!(shown_kind(&next), WidgetKind::ItemSelector);

    let record = current(&engine).await;
    assert_eq!(record.flow_step, FlowStep::Start);
    assert_eq!(record.outcome, None);
    assert_eq!(record.customer_id.as_deref(), Some("C100"));
    assert!(record.displayed_items.is_empty());
    assert!(record.selected_items.is_empty());
}

#[tokio::test]
async fn test_unrecognized_action() {
    let (engine, _) = engine();
    let before = current(&engine).await;
    let next = click(&engine, "launch_rocket", json!({})).await;
    assert_eq!(next, NextWidgetSpec::unrecognized());
    assert_eq!(current(&engine).await, before);
}

// ============================================================================
// Finalizer failures
// ============================================================================

#[tokio::test]
async fn test_ineligible_return_stays_at_shipping() {
    let (engine, returns) = engine();
    returns.queue_error(ReturnServiceError::Ineligible(
        "The return window for Trail Jacket has closed".to_string(),
    ));
    returns.queue_receipt("RET-0000FFFF", 4999);
    widget_path_to_shipping(&engine).await;

    let next = click(&engine, "select_shipping", json!({ "shipping_method": "DROP_OFF" })).await;
    let widget = next.widget().unwrap();
    assert_eq!(widget.kind, WidgetKind::ShippingSelector);
    assert_eq!(
        widget.notice.as_deref(),
        Some("The return window for Trail Jacket has closed")
    );

    let record = current(&engine).await;
    assert_eq!(record.flow_step, FlowStep::AwaitingShipping);
    assert_eq!(record.shipping_code, Some(ShippingCode::DropOff));
    assert_eq!(record.outcome, None);

    // Retry from the confirm button
    let next = click(&engine, "confirm_return", json!({})).await;
    assert_eq!(shown_kind(&next), WidgetKind::ReturnConfirmation);
    assert_eq!(returns.recorded_requests().len(), 2);
}

#[tokio::test]
async fn test_unavailable_service_surfaces_as_error() {
    let (engine, returns) = engine();
    returns.queue_error(ReturnServiceError::Unavailable("timeout".to_string()));
    widget_path_to_shipping(&engine).await;
    engine.set_selection(THREAD, SelectionKind::Shipping, "DROP_OFF").await.unwrap();
    let before = current(&engine).await;

    let result = engine.finalize_return(THREAD, CancellationToken::new()).await;
    assert!(matches!(
        result,
        Err(EngineError::ReturnService(ReturnServiceError::Unavailable(_)))
    ));
    assert_eq!(current(&engine).await, before);
}

#[tokio::test]
async fn test_cancelled_finalize_leaves_record_untouched() {
    let returns = Arc::new(DelayedMockReturnService::new(Duration::from_secs(30)));
    returns.queue_receipt("RET-00001111", 4999);
    let engine = Arc::new(ReturnsEngine::new(MemorySessionStore::new(), returns.clone()));
    seed(engine.as_ref(), CustomerTier::Standard).await;
    engine.set_items(THREAD, vec![ItemRef::new("O1", "P1")]).await.unwrap();
    engine.set_selection(THREAD, SelectionKind::Reason, "DEFECTIVE").await.unwrap();
    engine.set_selection(THREAD, SelectionKind::Resolution, "EXCHANGE").await.unwrap();
    engine.set_selection(THREAD, SelectionKind::Shipping, "DROP_OFF").await.unwrap();
    let before = engine.session(THREAD).await.unwrap();

    let cancel = CancellationToken::new();
    let task = {
        let engine = engine.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { engine.finalize(THREAD, cancel).await })
    };
    returns.request_started.notified().await;
    cancel.cancel();

    let result = task.await.unwrap();
    assert!(matches!(result, Err(EngineError::Cancelled)));
    assert_eq!(engine.session(THREAD).await.unwrap(), before);
    assert_eq!(returns.recorded_requests().len(), 1);
}

#[tokio::test]
async fn test_overlapping_finalize_reports_in_progress() {
    let returns = Arc::new(DelayedMockReturnService::new(Duration::from_millis(200)));
    returns.queue_receipt("RET-00002222", 4999);
    let engine = Arc::new(ReturnsEngine::new(MemorySessionStore::new(), returns.clone()));
    seed(engine.as_ref(), CustomerTier::Standard).await;
    engine.set_items(THREAD, vec![ItemRef::new("O1", "P1")]).await.unwrap();
    engine.set_selection(THREAD, SelectionKind::Reason, "DEFECTIVE").await.unwrap();
    engine.set_selection(THREAD, SelectionKind::Resolution, "EXCHANGE").await.unwrap();
    engine.set_selection(THREAD, SelectionKind::Shipping, "DROP_OFF").await.unwrap();

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.finalize(THREAD, CancellationToken::new()).await })
    };
    returns.request_started.notified().await;

    let second = engine.finalize(THREAD, CancellationToken::new()).await.unwrap();
    assert_eq!(second, FinalizeOutcome::InProgress);

    let first = first.await.unwrap().unwrap();
    assert!(matches!(first, FinalizeOutcome::Created { ref receipt, .. } if receipt.return_id == "RET-00002222"));
    assert_eq!(returns.recorded_requests().len(), 1);
}

type DelayedEngine = ReturnsEngine<MemorySessionStore, Arc<DelayedMockReturnService>>;

/// Engine at awaiting_shipping with DROP_OFF chosen, service answering slowly
async fn slow_engine_ready_to_finalize(
    return_id: &str,
) -> (Arc<DelayedEngine>, Arc<DelayedMockReturnService>) {
    let returns = Arc::new(DelayedMockReturnService::new(Duration::from_millis(200)));
    returns.queue_receipt(return_id, 4999);
    let engine = Arc::new(ReturnsEngine::new(MemorySessionStore::new(), returns.clone()));
    seed(engine.as_ref(), CustomerTier::Standard).await;
    engine.set_items(THREAD, vec![ItemRef::new("O1", "P1")]).await.unwrap();
    engine.set_selection(THREAD, SelectionKind::Reason, "DEFECTIVE").await.unwrap();
    engine.set_selection(THREAD, SelectionKind::Resolution, "FULL_REFUND").await.unwrap();
    engine.set_selection(THREAD, SelectionKind::Shipping, "DROP_OFF").await.unwrap();
    (engine, returns)
}

async fn choose_shipping(engine: &DelayedEngine, code: &str) {
    engine.change_selection(THREAD, SelectionKind::Shipping).await.unwrap();
    engine.set_selection(THREAD, SelectionKind::Shipping, code).await.unwrap();
}

#[tokio::test]
async fn test_unrelated_commit_during_finalize_still_records_return() {
    let (engine, returns) = slow_engine_ready_to_finalize("RET-00003333").await;

    let task = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.finalize(THREAD, CancellationToken::new()).await })
    };
    returns.request_started.notified().await;
    engine
        .record_transport_event(
            THREAD,
            FlowEvent::ItemsDisplayed {
                items: vec![descriptor("O2", "P9", "Rain Boots")],
            },
        )
        .await
        .unwrap();

    let outcome = task.await.unwrap().unwrap();
    assert!(matches!(outcome, FinalizeOutcome::Created { ref receipt, .. } if receipt.return_id == "RET-00003333"));

    let record = engine.session(THREAD).await.unwrap();
    assert_eq!(record.flow_step, FlowStep::Complete);
    assert_eq!(record.displayed_items.len(), 3);
    assert!(record.held_receipt.is_none());
    assert_eq!(returns.recorded_requests().len(), 1);
}

#[tokio::test]
async fn test_changed_selection_holds_receipt_for_reuse() {
    let (engine, returns) = slow_engine_ready_to_finalize("RET-00004444").await;

    let task = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.finalize(THREAD, CancellationToken::new()).await })
    };
    returns.request_started.notified().await;
    choose_shipping(&engine, "PREPAID_LABEL").await;

    let outcome = task.await.unwrap().unwrap();
    assert!(matches!(outcome, FinalizeOutcome::Superseded { ref receipt } if receipt.return_id == "RET-00004444"));
    let record = engine.session(THREAD).await.unwrap();
    assert_eq!(record.flow_step, FlowStep::AwaitingShipping);
    assert_eq!(record.shipping_code, Some(ShippingCode::PrepaidLabel));
    assert_eq!(
        record.held_receipt.as_ref().map(|held| held.receipt.return_id.as_str()),
        Some("RET-00004444")
    );

    // Back to the selections the return was created for
    choose_shipping(&engine, "DROP_OFF").await;
    let outcome = engine.finalize(THREAD, CancellationToken::new()).await.unwrap();
    assert!(matches!(outcome, FinalizeOutcome::Created { ref receipt, .. } if receipt.return_id == "RET-00004444"));
    assert_eq!(returns.recorded_requests().len(), 1);

    let record = engine.session(THREAD).await.unwrap();
    assert_eq!(record.flow_step, FlowStep::Complete);
    assert!(record.held_receipt.is_none());
}

// ============================================================================
// Subscribers
// ============================================================================

#[tokio::test]
async fn test_subscribers_see_every_commit() {
    let (engine, _) = engine();
    let mut rx = engine.subscribe(THREAD).await;
    seed(&engine, CustomerTier::Standard).await;
    click(&engine, "select_return_item", json!({ "order_id": "O1", "product_id": "P1" })).await;

    let mut sources = Vec::new();
    let mut last_step = None;
    while let Ok(SessionEvent::Updated { record, source }) = rx.try_recv() {
        sources.push(source);
        last_step = Some(record.flow_step);
    }
    assert_eq!(
        sources,
        vec![InputSource::Transport, InputSource::Transport, InputSource::Widget]
    );
    assert_eq!(last_step, Some(FlowStep::AwaitingReason));
}

#[tokio::test]
async fn test_rejected_events_are_not_broadcast() {
    let (engine, _) = engine();
    seed(&engine, CustomerTier::Standard).await;
    let mut rx = engine.subscribe(THREAD).await;

    click(&engine, "select_reason", json!({ "reason_code": "DEFECTIVE" })).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_closed_streams_are_pruned() {
    let (engine, _) = engine();
    let rx = engine.subscribe(THREAD).await;
    assert_eq!(engine.streamed_threads().await, 1);
    drop(rx);

    seed(&engine, CustomerTier::Standard).await;
    assert_eq!(engine.streamed_threads().await, 0);

    // A new stream starts a fresh channel
    let mut rx = engine.subscribe(THREAD).await;
    click(&engine, "select_return_item", json!({ "order_id": "O1", "product_id": "P1" })).await;
    assert!(rx.try_recv().is_ok());
}
