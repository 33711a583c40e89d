//! Return-creation service boundary
//!
//! The finalizer hands a `ReturnRequest` to a `ReturnService` and commits
//! the receipt it gets back. `DatabaseReturnService` is the default
//! implementation: it applies the eligibility rules and writes a row to the
//! `returns` table.

pub mod policy;

use crate::db::{Database, StoredReturn};
use crate::flow::{
    CustomerTier, ItemDescriptor, ReasonCode, ResolutionCode, ReturnReceipt, SessionRecord,
    ShippingCode,
};
use async_trait::async_trait;
use chrono::Utc;
use policy::ReturnPolicy;
use std::sync::Arc;
use thiserror::Error;

/// Everything needed to create a return
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnRequest {
    pub thread_id: String,
    pub customer_id: Option<String>,
    pub customer_tier: CustomerTier,
    pub items: Vec<ItemDescriptor>,
    pub reason: ReasonCode,
    pub resolution: ResolutionCode,
    pub shipping: ShippingCode,
}

impl ReturnRequest {
    /// Build from a record that passes the readiness predicate
    pub fn from_record(record: &SessionRecord) -> Option<Self> {
        if !record.is_ready_to_finalize() {
            return None;
        }
        Some(Self {
            thread_id: record.thread_id.clone(),
            customer_id: record.customer_id.clone(),
            customer_tier: record.customer_tier.unwrap_or_default(),
            items: record.selected_descriptors().into_iter().cloned().collect(),
            reason: record.reason_code?,
            resolution: record.resolution_code?,
            shipping: record.shipping_code?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReturnServiceError {
    /// Business rules refuse the return; the customer can change something
    /// and try again
    #[error("{0}")]
    Ineligible(String),
    #[error("Return service unavailable: {0}")]
    Unavailable(String),
}

/// Creates returns in the system of record
#[async_trait]
pub trait ReturnService: Send + Sync {
    async fn create_return(&self, request: &ReturnRequest)
        -> Result<ReturnReceipt, ReturnServiceError>;

    /// Returns a customer has already filed, newest first
    async fn customer_returns(
        &self,
        customer_id: &str,
    ) -> Result<Vec<StoredReturn>, ReturnServiceError>;
}

#[async_trait]
impl<T: ReturnService + ?Sized> ReturnService for Arc<T> {
    async fn create_return(
        &self,
        request: &ReturnRequest,
    ) -> Result<ReturnReceipt, ReturnServiceError> {
        (**self).create_return(request).await
    }

    async fn customer_returns(
        &self,
        customer_id: &str,
    ) -> Result<Vec<StoredReturn>, ReturnServiceError> {
        (**self).customer_returns(customer_id).await
    }
}

// ============================================================================
// Production implementation
// ============================================================================

/// Applies the return policy and persists to the `returns` table
#[derive(Clone)]
pub struct DatabaseReturnService {
    db: Database,
    policy: ReturnPolicy,
}

impl DatabaseReturnService {
    pub fn new(db: Database, policy: ReturnPolicy) -> Self {
        Self { db, policy }
    }
}

#[async_trait]
impl ReturnService for DatabaseReturnService {
    async fn create_return(
        &self,
        request: &ReturnRequest,
    ) -> Result<ReturnReceipt, ReturnServiceError> {
        let Some(customer_id) = request.customer_id.clone() else {
            return Err(ReturnServiceError::Ineligible(
                "We need to look up your account before creating a return".to_string(),
            ));
        };

        let now = Utc::now();
        self.policy
            .check(request, now)
            .map_err(|reason| ReturnServiceError::Ineligible(reason.to_string()))?;

        let quote = self
            .policy
            .quote(request)
            .map_err(|reason| ReturnServiceError::Ineligible(reason.to_string()))?;
        let stored = StoredReturn {
            return_id: new_return_id(),
            thread_id: request.thread_id.clone(),
            customer_id: Some(customer_id),
            items: request.items.clone(),
            reason_code: request.reason,
            resolution_code: request.resolution,
            shipping_code: request.shipping,
            status: "pending".to_string(),
            refund_cents: quote.refund_cents,
            restocking_fee_cents: quote.restocking_fee_cents,
            store_credit_bonus_cents: quote.store_credit_bonus_cents,
            created_at: now,
        };

        self.db
            .insert_return(&stored)
            .map_err(|e| ReturnServiceError::Unavailable(e.to_string()))?;

        tracing::info!(
            thread_id = %request.thread_id,
            return_id = %stored.return_id,
            refund_cents = quote.refund_cents,
            restocking_fee_cents = quote.restocking_fee_cents,
            "Return created"
        );

        Ok(ReturnReceipt {
            return_id: stored.return_id,
            status: stored.status,
            refund_cents: stored.refund_cents,
            restocking_fee_cents: stored.restocking_fee_cents,
        })
    }

    async fn customer_returns(
        &self,
        customer_id: &str,
    ) -> Result<Vec<StoredReturn>, ReturnServiceError> {
        self.db
            .list_returns_for_customer(customer_id)
            .map_err(|e| ReturnServiceError::Unavailable(e.to_string()))
    }
}

/// `RET-` followed by eight uppercase hex digits
fn new_return_id() -> String {
    let hex: String = uuid::Uuid::new_v4().simple().to_string().chars().take(8).collect();
    format!("RET-{}", hex.to_ascii_uppercase())
}
