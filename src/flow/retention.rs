//! Retention offers presented when a customer has changed their mind

use super::codes::CustomerTier;
use serde::{Deserialize, Serialize};

/// An incentive to keep the item instead of returning it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionOffer {
    pub code: String,
    pub label: String,
    pub discount_percent: u8,
}

struct OfferTemplate {
    code: &'static str,
    label: &'static str,
    discount_percent: u8,
    min_tier: CustomerTier,
}

// Ordered best first
const OFFERS: &[OfferTemplate] = &[
    OfferTemplate {
        code: "VIP20",
        label: "20% off your next order plus free express shipping",
        discount_percent: 20,
        min_tier: CustomerTier::Gold,
    },
    OfferTemplate {
        code: "KEEP15",
        label: "15% off your next order",
        discount_percent: 15,
        min_tier: CustomerTier::Silver,
    },
    OfferTemplate {
        code: "KEEP10",
        label: "10% off your next order",
        discount_percent: 10,
        min_tier: CustomerTier::Standard,
    },
];

impl OfferTemplate {
    fn to_offer(&self) -> RetentionOffer {
        RetentionOffer {
            code: self.code.to_string(),
            label: self.label.to_string(),
            discount_percent: self.discount_percent,
        }
    }
}

/// Every offer the tier qualifies for, best first
pub fn applicable_offers(tier: CustomerTier) -> Vec<RetentionOffer> {
    OFFERS
        .iter()
        .filter(|template| tier >= template.min_tier)
        .map(OfferTemplate::to_offer)
        .collect()
}

/// The best offer for a tier; an unidentified customer is treated as Standard
pub fn best_offer(tier: Option<CustomerTier>) -> RetentionOffer {
    applicable_offers(tier.unwrap_or_default())
        .into_iter()
        .next()
        .unwrap_or_else(|| OFFERS[OFFERS.len() - 1].to_offer())
}
