//! Selection codes shared by widget payloads and agent tool calls
//!
//! Both input paths hand us free-form strings. Everything is parsed into
//! these closed enums before it reaches the transition function.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A closed set of codes a customer can pick from
pub trait SelectionCode: Copy + Sized + 'static {
    const ALL: &'static [Self];

    /// Canonical wire spelling (`SCREAMING_SNAKE_CASE`)
    fn as_str(self) -> &'static str;

    /// Human-readable label shown in widgets and summaries
    fn label(self) -> &'static str;

    /// Extra spellings accepted from typed text, already normalized
    fn aliases(self) -> &'static [&'static str] {
        &[]
    }

    /// Lenient parse: case, surrounding whitespace, spaces and hyphens are
    /// ignored, and labels parse as well as codes.
    fn parse(input: &str) -> Option<Self> {
        let normalized = normalize(input);
        Self::ALL.iter().copied().find(|code| {
            code.as_str() == normalized
                || normalize(code.label()) == normalized
                || code.aliases().contains(&normalized.as_str())
        })
    }

    /// Comma-separated list of canonical codes, for error messages
    fn valid_codes() -> String {
        Self::ALL
            .iter()
            .map(|code| code.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn normalize(input: &str) -> String {
    input
        .trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

// ============================================================================
// Return reasons
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    Defective,
    Damaged,
    WrongItem,
    WrongSize,
    NotAsDescribed,
    ArrivedLate,
    ChangedMind,
    Other,
}

impl ReasonCode {
    pub fn description(self) -> &'static str {
        match self {
            ReasonCode::Defective => "The item doesn't work as expected",
            ReasonCode::Damaged => "The item arrived damaged",
            ReasonCode::WrongItem => "I received a different item than I ordered",
            ReasonCode::WrongSize => "The size or fit isn't right",
            ReasonCode::NotAsDescribed => "The item doesn't match its description",
            ReasonCode::ArrivedLate => "The item arrived too late to be useful",
            ReasonCode::ChangedMind => "I no longer want the item",
            ReasonCode::Other => "Something else",
        }
    }

    /// Whether the customer is asked for free-text details
    pub fn requires_details(self) -> bool {
        matches!(self, ReasonCode::Defective | ReasonCode::Other)
    }
}

impl SelectionCode for ReasonCode {
    const ALL: &'static [Self] = &[
        ReasonCode::Defective,
        ReasonCode::Damaged,
        ReasonCode::WrongItem,
        ReasonCode::WrongSize,
        ReasonCode::NotAsDescribed,
        ReasonCode::ArrivedLate,
        ReasonCode::ChangedMind,
        ReasonCode::Other,
    ];

    fn as_str(self) -> &'static str {
        match self {
            ReasonCode::Defective => "DEFECTIVE",
            ReasonCode::Damaged => "DAMAGED",
            ReasonCode::WrongItem => "WRONG_ITEM",
            ReasonCode::WrongSize => "WRONG_SIZE",
            ReasonCode::NotAsDescribed => "NOT_AS_DESCRIBED",
            ReasonCode::ArrivedLate => "ARRIVED_LATE",
            ReasonCode::ChangedMind => "CHANGED_MIND",
            ReasonCode::Other => "OTHER",
        }
    }

    fn label(self) -> &'static str {
        match self {
            ReasonCode::Defective => "Defective",
            ReasonCode::Damaged => "Damaged in transit",
            ReasonCode::WrongItem => "Wrong item",
            ReasonCode::WrongSize => "Wrong size",
            ReasonCode::NotAsDescribed => "Not as described",
            ReasonCode::ArrivedLate => "Arrived late",
            ReasonCode::ChangedMind => "Changed my mind",
            ReasonCode::Other => "Other",
        }
    }

    fn aliases(self) -> &'static [&'static str] {
        match self {
            ReasonCode::Defective => &["BROKEN"],
            ReasonCode::ChangedMind => &["CHANGED_MY_MIND", "NO_LONGER_NEEDED"],
            ReasonCode::WrongSize => &["DOESNT_FIT", "WRONG_FIT"],
            _ => &[],
        }
    }
}

// ============================================================================
// Resolutions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionCode {
    FullRefund,
    StoreCredit,
    Exchange,
}

impl ResolutionCode {
    pub fn description(self) -> &'static str {
        match self {
            ResolutionCode::FullRefund => "Refund to the original payment method",
            ResolutionCode::StoreCredit => "Store credit with a 10% bonus",
            ResolutionCode::Exchange => "Exchange for another size or color",
        }
    }

    pub fn processing_time(self) -> &'static str {
        match self {
            ResolutionCode::FullRefund => "5-7 business days",
            ResolutionCode::StoreCredit => "Instant once received",
            ResolutionCode::Exchange => "Ships when the return is scanned",
        }
    }
}

impl SelectionCode for ResolutionCode {
    const ALL: &'static [Self] = &[
        ResolutionCode::FullRefund,
        ResolutionCode::StoreCredit,
        ResolutionCode::Exchange,
    ];

    fn as_str(self) -> &'static str {
        match self {
            ResolutionCode::FullRefund => "FULL_REFUND",
            ResolutionCode::StoreCredit => "STORE_CREDIT",
            ResolutionCode::Exchange => "EXCHANGE",
        }
    }

    fn label(self) -> &'static str {
        match self {
            ResolutionCode::FullRefund => "Full refund",
            ResolutionCode::StoreCredit => "Store credit",
            ResolutionCode::Exchange => "Exchange",
        }
    }

    fn aliases(self) -> &'static [&'static str] {
        match self {
            ResolutionCode::FullRefund => &["REFUND", "MONEY_BACK"],
            ResolutionCode::StoreCredit => &["CREDIT", "GIFT_CARD"],
            ResolutionCode::Exchange => &["SWAP", "REPLACEMENT"],
        }
    }
}

// ============================================================================
// Shipping methods
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShippingCode {
    PrepaidLabel,
    DropOff,
    SchedulePickup,
}

impl ShippingCode {
    pub fn description(self) -> &'static str {
        match self {
            ShippingCode::PrepaidLabel => "We email you a prepaid label to print",
            ShippingCode::DropOff => "Drop the item at any partner location",
            ShippingCode::SchedulePickup => "A courier collects the item from your door",
        }
    }

    pub fn cost_cents(self) -> u64 {
        match self {
            ShippingCode::PrepaidLabel | ShippingCode::DropOff => 0,
            ShippingCode::SchedulePickup => 599,
        }
    }
}

impl SelectionCode for ShippingCode {
    const ALL: &'static [Self] = &[
        ShippingCode::PrepaidLabel,
        ShippingCode::DropOff,
        ShippingCode::SchedulePickup,
    ];

    fn as_str(self) -> &'static str {
        match self {
            ShippingCode::PrepaidLabel => "PREPAID_LABEL",
            ShippingCode::DropOff => "DROP_OFF",
            ShippingCode::SchedulePickup => "SCHEDULE_PICKUP",
        }
    }

    fn label(self) -> &'static str {
        match self {
            ShippingCode::PrepaidLabel => "Prepaid label",
            ShippingCode::DropOff => "Drop-off",
            ShippingCode::SchedulePickup => "Scheduled pickup",
        }
    }

    fn aliases(self) -> &'static [&'static str] {
        match self {
            ShippingCode::PrepaidLabel => &["LABEL", "MAIL", "SHIPPING_LABEL"],
            ShippingCode::DropOff => &["DROPOFF", "STORE_DROP_OFF"],
            ShippingCode::SchedulePickup => &["PICKUP", "SCHEDULED_PICKUP"],
        }
    }
}

macro_rules! display_as_code {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }
        )*
    };
}

display_as_code!(ReasonCode, ResolutionCode, ShippingCode);

// ============================================================================
// Customer tiers
// ============================================================================

/// Membership tier, ordered from lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CustomerTier {
    #[default]
    #[serde(alias = "Standard", alias = "STANDARD")]
    Standard,
    #[serde(alias = "Silver", alias = "SILVER")]
    Silver,
    #[serde(alias = "Gold", alias = "GOLD")]
    Gold,
    #[serde(alias = "Platinum", alias = "PLATINUM")]
    Platinum,
}

impl CustomerTier {
    pub fn label(self) -> &'static str {
        match self {
            CustomerTier::Standard => "Standard",
            CustomerTier::Silver => "Silver",
            CustomerTier::Gold => "Gold",
            CustomerTier::Platinum => "Platinum",
        }
    }

    /// Days added to the base return window
    pub fn return_window_extension_days(self) -> i64 {
        match self {
            CustomerTier::Standard => 0,
            CustomerTier::Silver => 7,
            CustomerTier::Gold => 14,
            CustomerTier::Platinum => 30,
        }
    }

    pub fn is_fee_exempt(self) -> bool {
        matches!(self, CustomerTier::Gold | CustomerTier::Platinum)
    }
}

// ============================================================================
// Selection kinds
// ============================================================================

/// Which part of the return a selection or re-selection targets, in
/// workflow order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionKind {
    Items,
    Reason,
    Resolution,
    Shipping,
}

impl SelectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SelectionKind::Items => "items",
            SelectionKind::Reason => "reason",
            SelectionKind::Resolution => "resolution",
            SelectionKind::Shipping => "shipping",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "items" | "item" => Some(SelectionKind::Items),
            "reason" => Some(SelectionKind::Reason),
            "resolution" => Some(SelectionKind::Resolution),
            "shipping" | "shipping_method" => Some(SelectionKind::Shipping),
            _ => None,
        }
    }
}

impl fmt::Display for SelectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
