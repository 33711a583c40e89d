//! Eligibility and refund rules applied when a return is created

use super::ReturnRequest;
use crate::flow::{CustomerTier, ItemDescriptor, ReasonCode, ResolutionCode};
use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Categories that can never be returned
pub const NON_RETURNABLE_CATEGORIES: &[&str] = &[
    "underwear",
    "swimwear",
    "earrings",
    "personalized",
    "final_sale",
];

/// Order statuses a return can be opened against
pub const RETURNABLE_ORDER_STATUSES: &[&str] = &["delivered", "shipped"];

pub const DEFAULT_RETURN_WINDOW_DAYS: i64 = 30;

const STORE_CREDIT_BONUS_PERCENT: u64 = 10;

/// Largest subtotal accepted; amounts are stored as SQLite integers
const MAX_SUBTOTAL_CENTS: u64 = i64::MAX.unsigned_abs();

/// Why an item cannot be returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ineligibility {
    OrderStatus { item: String, status: String },
    Category { item: String, category: String },
    WindowExpired { item: String, deadline: DateTime<Utc> },
    /// Line totals overflow or exceed what can be stored
    AmountOutOfRange,
}

impl fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ineligibility::OrderStatus { item, status } => write!(
                f,
                "{item}: order status '{status}' is not eligible for returns; the order must be delivered or shipped"
            ),
            Ineligibility::Category { item, category } => {
                write!(f, "{item}: {category} items cannot be returned")
            }
            Ineligibility::WindowExpired { item, deadline } => write!(
                f,
                "{item}: the return window expired on {}",
                deadline.format("%Y-%m-%d")
            ),
            Ineligibility::AmountOutOfRange => {
                f.write_str("the order total is too large to process automatically")
            }
        }
    }
}

/// Amounts owed for a return, in cents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundQuote {
    pub subtotal_cents: u64,
    pub restocking_fee_cents: u64,
    pub refund_cents: u64,
    pub store_credit_bonus_cents: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnPolicy {
    pub base_window_days: i64,
}

impl Default for ReturnPolicy {
    fn default() -> Self {
        Self {
            base_window_days: DEFAULT_RETURN_WINDOW_DAYS,
        }
    }
}

impl ReturnPolicy {
    pub fn new(base_window_days: i64) -> Self {
        Self { base_window_days }
    }

    pub fn window_days(&self, tier: CustomerTier) -> i64 {
        self.base_window_days
            .saturating_add(tier.return_window_extension_days())
    }

    /// Check one line. Unknown status, category or order date pass.
    pub fn check_item(
        &self,
        item: &ItemDescriptor,
        tier: CustomerTier,
        now: DateTime<Utc>,
    ) -> Result<(), Ineligibility> {
        if let Some(status) = &item.order_status {
            let status = status.to_ascii_lowercase();
            if !RETURNABLE_ORDER_STATUSES.contains(&status.as_str()) {
                return Err(Ineligibility::OrderStatus {
                    item: item.name.clone(),
                    status,
                });
            }
        }

        if let Some(category) = &item.category {
            let category = category.to_ascii_lowercase();
            if NON_RETURNABLE_CATEGORIES.contains(&category.as_str()) {
                return Err(Ineligibility::Category {
                    item: item.name.clone(),
                    category,
                });
            }
        }

        // A deadline past the calendar's range never expires
        let deadline = item.ordered_at.and_then(|ordered_at| {
            Duration::try_days(self.window_days(tier))
                .and_then(|window| ordered_at.checked_add_signed(window))
        });
        if let Some(deadline) = deadline {
            if now > deadline {
                return Err(Ineligibility::WindowExpired {
                    item: item.name.clone(),
                    deadline,
                });
            }
        }

        Ok(())
    }

    /// First failing line, if any
    pub fn check(&self, request: &ReturnRequest, now: DateTime<Utc>) -> Result<(), Ineligibility> {
        request
            .items
            .iter()
            .try_for_each(|item| self.check_item(item, request.customer_tier, now))
    }

    pub fn quote(&self, request: &ReturnRequest) -> Result<RefundQuote, Ineligibility> {
        self.quote_items(
            &request.items,
            request.customer_tier,
            request.reason,
            Some(request.resolution),
        )
    }

    /// Quote any set of lines. Without a resolution no store credit bonus
    /// is included.
    pub fn quote_items<'a>(
        &self,
        items: impl IntoIterator<Item = &'a ItemDescriptor>,
        tier: CustomerTier,
        reason: ReasonCode,
        resolution: Option<ResolutionCode>,
    ) -> Result<RefundQuote, Ineligibility> {
        let subtotal_cents = items
            .into_iter()
            .try_fold(0u64, |total, item| {
                item.line_total_cents()
                    .and_then(|line| total.checked_add(line))
            })
            .filter(|subtotal| *subtotal <= MAX_SUBTOTAL_CENTS)
            .ok_or(Ineligibility::AmountOutOfRange)?;

        let fee_percent = if tier.is_fee_exempt() {
            0
        } else {
            restocking_fee_percent(reason)
        };
        let restocking_fee_cents = percent_of(subtotal_cents, fee_percent);
        let refund_cents = subtotal_cents - restocking_fee_cents;
        let store_credit_bonus_cents = if resolution == Some(ResolutionCode::StoreCredit) {
            percent_of(refund_cents, STORE_CREDIT_BONUS_PERCENT)
        } else {
            0
        };
        Ok(RefundQuote {
            subtotal_cents,
            restocking_fee_cents,
            refund_cents,
            store_credit_bonus_cents,
        })
    }
}

/// `amount * percent / 100` rounded down, without the intermediate product
fn percent_of(amount: u64, percent: u64) -> u64 {
    amount / 100 * percent + amount % 100 * percent / 100
}

fn restocking_fee_percent(reason: ReasonCode) -> u64 {
    match reason {
        ReasonCode::ChangedMind => 15,
        ReasonCode::Other => 10,
        _ => 0,
    }
}
