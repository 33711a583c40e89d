//! Session context rendered for the agent
//!
//! The summary is prepended to every agent turn so the agent sees what the
//! customer already chose, including choices made by clicking widgets.
//! Unset fields are left out entirely.

use crate::flow::{FlowOutcome, FlowStep, SelectionCode, SessionRecord};
use std::fmt::Write;

const PREAMBLE_OPEN: &str = "[CURRENT SESSION STATE]";
const PREAMBLE_CLOSE: &str = "[END SESSION STATE]";

/// Dollar amount from cents, e.g. `$12.05`
pub fn format_cents(cents: u64) -> String {
    format!("${}.{:02}", cents / 100, cents % 100)
}

/// Render the record as plain text. A record nothing has happened to yet
/// renders as an empty string.
pub fn summarize(record: &SessionRecord) -> String {
    if record.version == 0 {
        return String::new();
    }

    let mut out = String::new();

    if let Some(customer_id) = &record.customer_id {
        let name = record.customer_name.as_deref().unwrap_or("Customer");
        match record.customer_tier {
            Some(tier) => {
                let _ = writeln!(out, "Customer: {name} ({customer_id}, {} tier)", tier.label());
            }
            None => {
                let _ = writeln!(out, "Customer: {name} ({customer_id})");
            }
        }
    }

    if !record.displayed_items.is_empty() {
        let _ = writeln!(out, "Items shown to the customer:");
        for item in &record.displayed_items {
            let _ = writeln!(
                out,
                "  - {} (order {}, product {}) {} x{}",
                item.name,
                item.order_id,
                item.product_id,
                format_cents(item.unit_price_cents),
                item.quantity
            );
        }
    }

    let selected = record.selected_descriptors();
    if !selected.is_empty() {
        let _ = writeln!(out, "Selected for return:");
        for item in selected {
            let _ = writeln!(out, "  - {} (order {})", item.name, item.order_id);
        }
    }

    if let Some(reason) = record.reason_code {
        let _ = writeln!(out, "Reason: {} ({})", reason.label(), reason.as_str());
    }

    if record.flow_step == FlowStep::AwaitingRetentionResponse {
        if let Some(offer) = &record.retention_offer {
            let _ = writeln!(
                out,
                "Retention offer pending: {} (code {})",
                offer.label, offer.code
            );
        }
    }

    if let Some(resolution) = record.resolution_code {
        let _ = writeln!(out, "Resolution: {} ({})", resolution.label(), resolution.as_str());
    }

    if let Some(shipping) = record.shipping_code {
        let _ = writeln!(out, "Shipping: {} ({})", shipping.label(), shipping.as_str());
    }

    match &record.outcome {
        Some(FlowOutcome::ReturnCreated { receipt }) => {
            let _ = writeln!(
                out,
                "Return created: {} ({}), refund {}",
                receipt.return_id,
                receipt.status,
                format_cents(receipt.refund_cents)
            );
        }
        Some(FlowOutcome::RetentionAccepted { offer }) => {
            let _ = writeln!(out, "Customer kept the item with offer: {}", offer.label);
        }
        None => {}
    }

    let _ = write!(out, "Current step: {}", record.flow_step);
    out
}

/// Summary wrapped for injection ahead of the agent's turn, or `None`
/// when there is nothing to report
pub fn agent_preamble(record: &SessionRecord) -> Option<String> {
    let summary = summarize(record);
    if summary.is_empty() {
        return None;
    }
    Some(format!("{PREAMBLE_OPEN}\n{summary}\n{PREAMBLE_CLOSE}"))
}
