//! Database schema and row types

use crate::flow::{ItemDescriptor, ReasonCode, ResolutionCode, ShippingCode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS sessions (
    thread_id TEXT PRIMARY KEY,
    version INTEGER NOT NULL,
    flow_step TEXT NOT NULL,
    record TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_updated ON sessions(updated_at DESC);

CREATE TABLE IF NOT EXISTS returns (
    return_id TEXT PRIMARY KEY,
    thread_id TEXT NOT NULL,
    customer_id TEXT,
    items TEXT NOT NULL,
    reason_code TEXT NOT NULL,
    resolution_code TEXT NOT NULL,
    shipping_code TEXT NOT NULL,
    status TEXT NOT NULL,
    refund_cents INTEGER NOT NULL,
    restocking_fee_cents INTEGER NOT NULL,
    store_credit_bonus_cents INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_returns_thread ON returns(thread_id, created_at);
CREATE INDEX IF NOT EXISTS idx_returns_customer ON returns(customer_id);
";

/// A persisted return authorization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredReturn {
    pub return_id: String,
    pub thread_id: String,
    pub customer_id: Option<String>,
    pub items: Vec<ItemDescriptor>,
    pub reason_code: ReasonCode,
    pub resolution_code: ResolutionCode,
    pub shipping_code: ShippingCode,
    pub status: String,
    pub refund_cents: u64,
    pub restocking_fee_cents: u64,
    pub store_credit_bonus_cents: u64,
    pub created_at: DateTime<Utc>,
}
