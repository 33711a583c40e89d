//! Workflow finalizer
//!
//! Reads a ready record, asks the return service to create the return and
//! commits the receipt through the same atomic `apply` every other event
//! uses.

use super::{EngineError, InputSource, ReturnsEngine};
use crate::flow::{
    FlowEvent, FlowOutcome, HeldReceipt, ReturnReceipt, SelectionKind, SelectionSnapshot,
    SessionRecord,
};
use crate::returns::{ReturnRequest, ReturnService, ReturnServiceError};
use crate::session::{SessionStore, StoreError};
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
pub enum FinalizeOutcome {
    Created {
        receipt: ReturnReceipt,
        record: SessionRecord,
    },
    /// Readiness predicate failed; fields listed in workflow order
    Missing { fields: Vec<SelectionKind> },
    /// The service refused; the record stays at awaiting_shipping
    Ineligible { message: String },
    AlreadyComplete { outcome: FlowOutcome },
    /// Another finalize for this thread has not finished yet
    InProgress,
    /// The return was created but the selections changed while we waited.
    /// The receipt is held on the record and reused if the customer goes
    /// back to those selections.
    Superseded { receipt: ReturnReceipt },
}

/// Commits tried while unrelated events keep moving the version
const COMMIT_ATTEMPTS: usize = 3;

/// Marks a thread as finalizing until dropped
struct InFlight<'a> {
    threads: &'a Mutex<HashSet<String>>,
    thread_id: String,
}

impl<'a> InFlight<'a> {
    fn acquire(threads: &'a Mutex<HashSet<String>>, thread_id: &str) -> Option<Self> {
        let mut guard = threads.lock().unwrap_or_else(PoisonError::into_inner);
        if !guard.insert(thread_id.to_string()) {
            return None;
        }
        Some(Self {
            threads,
            thread_id: thread_id.to_string(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.thread_id);
    }
}

impl<S: SessionStore, R: ReturnService> ReturnsEngine<S, R> {
    /// Create the return for a ready record.
    ///
    /// Cancellation is honored until the return service answers; after that
    /// the receipt is always committed or held on the record.
    pub async fn finalize(
        &self,
        thread_id: &str,
        cancel: CancellationToken,
    ) -> Result<FinalizeOutcome, EngineError> {
        let Some(_in_flight) = InFlight::acquire(&self.finalizing, thread_id) else {
            tracing::info!(thread_id = %thread_id, "Finalize already in flight");
            return Ok(FinalizeOutcome::InProgress);
        };

        let record = self.store.get_or_create(thread_id).await?;
        if let Some(outcome) = &record.outcome {
            return Ok(FinalizeOutcome::AlreadyComplete {
                outcome: outcome.clone(),
            });
        }
        let (Some(request), Some(selections)) =
            (ReturnRequest::from_record(&record), record.selection_snapshot())
        else {
            return Ok(FinalizeOutcome::Missing {
                fields: record.missing_prerequisites(),
            });
        };

        let receipt = if let Some(receipt) = record.reusable_receipt() {
            tracing::info!(
                thread_id = %thread_id,
                return_id = %receipt.return_id,
                "Reusing receipt issued for these selections"
            );
            receipt.clone()
        } else {
            tracing::info!(
                thread_id = %thread_id,
                items = request.items.len(),
                reason = %request.reason,
                resolution = %request.resolution,
                "Creating return"
            );

            let created = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::info!(thread_id = %thread_id, "Finalize cancelled before the return was created");
                    return Err(EngineError::Cancelled);
                }
                result = self.returns.create_return(&request) => result,
            };

            match created {
                Ok(receipt) => receipt,
                Err(ReturnServiceError::Ineligible(message)) => {
                    tracing::info!(thread_id = %thread_id, reason = %message, "Return refused");
                    return Ok(FinalizeOutcome::Ineligible { message });
                }
                Err(e) => {
                    tracing::error!(thread_id = %thread_id, error = %e, "Return service failed");
                    return Err(e.into());
                }
            }
        };

        self.commit_receipt(thread_id, &request, record.version, receipt, selections)
            .await
    }

    /// Commit `ReturnCreated`, re-reading the record after a version
    /// conflict. Only a change to the request itself stops the commit; the
    /// receipt is then held on the record.
    async fn commit_receipt(
        &self,
        thread_id: &str,
        request: &ReturnRequest,
        mut expected_version: u64,
        receipt: ReturnReceipt,
        selections: SelectionSnapshot,
    ) -> Result<FinalizeOutcome, EngineError> {
        for _ in 0..COMMIT_ATTEMPTS {
            let event = FlowEvent::ReturnCreated {
                receipt: receipt.clone(),
            };
            match self
                .dispatch(thread_id, event, Some(expected_version), InputSource::Finalizer)
                .await
            {
                Ok(dispatched) => {
                    return Ok(FinalizeOutcome::Created {
                        receipt,
                        record: dispatched.record,
                    })
                }
                Err(StoreError::Backend(message)) => return Err(StoreError::Backend(message).into()),
                Err(StoreError::VersionConflict { .. }) => {
                    let fresh = self.store.get_or_create(thread_id).await?;
                    if ReturnRequest::from_record(&fresh).as_ref() != Some(request) {
                        break;
                    }
                    tracing::debug!(
                        thread_id = %thread_id,
                        version = fresh.version,
                        "Session moved but the request is unchanged; committing again"
                    );
                    expected_version = fresh.version;
                }
                Err(StoreError::Rejected(_)) => break,
            }
        }

        tracing::warn!(
            thread_id = %thread_id,
            return_id = %receipt.return_id,
            "Return created but the selections changed before it was recorded"
        );
        let held = HeldReceipt {
            receipt: receipt.clone(),
            selections,
        };
        match self
            .dispatch(thread_id, FlowEvent::ReceiptHeld { held }, None, InputSource::Finalizer)
            .await
        {
            Ok(_) => {}
            Err(StoreError::Backend(message)) => return Err(StoreError::Backend(message).into()),
            Err(e) => {
                tracing::warn!(thread_id = %thread_id, error = %e, "Receipt not held");
            }
        }
        Ok(FinalizeOutcome::Superseded { receipt })
    }
}
