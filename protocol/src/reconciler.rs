//! # Pending Transaction Reconciler
//!
//! Mirrors the Ledger's list of transactions waiting for this principal and
//! drives the explicit step that settles each one: "receive" accepts it,
//! "reject" declines it.
//!
//! ## Local states
//!
//! ```text
//!  Unknown ──fetch──► Pending ──receive/reject──► Acknowledging ──ok──► Removed
//!                        ▲                              │
//!                        └──────────error/cancel────────┘
//! ```
//!
//! The mirror is owned here and changes only inside [`fetch_pending`],
//! [`receive`] and [`reject`]. Each change is announced on a broadcast
//! channel ([`ReconcilerEvent`]) so a UI can react without polling the
//! mirror.
//!
//! ## Concurrent settlement
//!
//! `receive` and `reject` claim the id (mark it `Acknowledging`) before
//! their first `.await`. Any second call for the same id that arrives while
//! the first is in flight, whichever of the two it is, sees the marker and
//! fails with [`Error::ReceiveInFlight`] without contacting the Ledger. The
//! marker is held by a drop guard, so a cancelled call puts the id back to
//! `Pending`.
//!
//! Settled ids are remembered as tombstones. A later fetch that still lists
//! one (the Ledger has not caught up) filters it out, so a removed id never
//! reappears. Once a fetch no longer lists it, the tombstone is dropped.
//!
//! [`fetch_pending`]: PendingReconciler::fetch_pending
//! [`receive`]: PendingReconciler::receive
//! [`reject`]: PendingReconciler::reject

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::EVENT_CHANNEL_CAPACITY;
use crate::error::Error;
use crate::submission::{Ack, Ledger, PendingTransaction};

/// Where a transaction id stands locally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    Unknown,
    Pending,
    Acknowledging,
    Removed,
}

/// A state transition of the mirror.
#[derive(Clone, Debug, PartialEq)]
pub enum ReconcilerEvent {
    FetchCompleted { pending: Vec<PendingTransaction> },
    FetchFailed { error: String },
    ReceiveCompleted { ack: Ack },
    ReceiveFailed { transaction_id: String, error: String },
    RejectCompleted { ack: Ack },
    RejectFailed { transaction_id: String, error: String },
}

/// Which way a pending transaction is being settled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Settle {
    Receive,
    Reject,
}

impl Settle {
    fn completed(self, ack: Ack) -> ReconcilerEvent {
        match self {
            Settle::Receive => ReconcilerEvent::ReceiveCompleted { ack },
            Settle::Reject => ReconcilerEvent::RejectCompleted { ack },
        }
    }

    fn failed(self, transaction_id: String, error: String) -> ReconcilerEvent {
        match self {
            Settle::Receive => ReconcilerEvent::ReceiveFailed {
                transaction_id,
                error,
            },
            Settle::Reject => ReconcilerEvent::RejectFailed {
                transaction_id,
                error,
            },
        }
    }

    fn verb(self) -> &'static str {
        match self {
            Settle::Receive => "receive",
            Settle::Reject => "reject",
        }
    }
}

#[derive(Default)]
struct Mirror {
    pending: Vec<PendingTransaction>,
    in_flight: HashSet<String>,
    settled: HashSet<String>,
}

impl Mirror {
    fn contains(&self, id: &str) -> bool {
        self.pending.iter().any(|tx| tx.transaction_id == id)
    }
}

/// Owns the local pending set for one principal.
pub struct PendingReconciler {
    principal_id: String,
    ledger: Arc<dyn Ledger>,
    mirror: Mutex<Mirror>,
    events: broadcast::Sender<ReconcilerEvent>,
}

impl PendingReconciler {
    pub fn new(principal_id: impl Into<String>, ledger: Arc<dyn Ledger>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            principal_id: principal_id.into(),
            ledger,
            mirror: Mutex::new(Mirror::default()),
            events,
        }
    }

    pub fn principal_id(&self) -> &str {
        &self.principal_id
    }

    /// Receive every future [`ReconcilerEvent`].
    pub fn subscribe(&self) -> broadcast::Receiver<ReconcilerEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the mirror, including ids currently being settled.
    pub fn pending(&self) -> Vec<PendingTransaction> {
        self.mirror.lock().pending.clone()
    }

    pub fn state_of(&self, transaction_id: &str) -> TransactionState {
        let mirror = self.mirror.lock();
        if mirror.settled.contains(transaction_id) {
            TransactionState::Removed
        } else if mirror.in_flight.contains(transaction_id) {
            TransactionState::Acknowledging
        } else if mirror.contains(transaction_id) {
            TransactionState::Pending
        } else {
            TransactionState::Unknown
        }
    }

    /// Refresh the mirror from the Ledger.
    ///
    /// On success the mirror is replaced by the Ledger's list minus ids
    /// already settled here, and tombstones the Ledger no longer lists are
    /// forgotten. On failure the previous mirror is kept.
    pub async fn fetch_pending(&self) -> Result<Vec<PendingTransaction>, Error> {
        match self.ledger.pending_transactions(&self.principal_id).await {
            Ok(listed) => {
                let pending = {
                    let mut mirror = self.mirror.lock();
                    let listed_ids: HashSet<&str> =
                        listed.iter().map(|tx| tx.transaction_id.as_str()).collect();
                    mirror.settled.retain(|id| listed_ids.contains(id.as_str()));

                    let settled = &mirror.settled;
                    let fresh: Vec<_> = listed
                        .iter()
                        .filter(|tx| !settled.contains(&tx.transaction_id))
                        .cloned()
                        .collect();
                    mirror.pending = fresh.clone();
                    fresh
                };
                tracing::info!(
                    principal = %self.principal_id,
                    count = pending.len(),
                    "pending transactions fetched"
                );
                let _ = self.events.send(ReconcilerEvent::FetchCompleted {
                    pending: pending.clone(),
                });
                Ok(pending)
            }
            Err(err) => {
                tracing::warn!(principal = %self.principal_id, error = %err, "pending fetch failed");
                let _ = self.events.send(ReconcilerEvent::FetchFailed {
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Acknowledge one transaction with the Ledger.
    pub async fn receive(&self, transaction_id: &str) -> Result<Ack, Error> {
        let guard = self.claim(transaction_id, Settle::Receive)?;
        let result = self.ledger.receive_transaction(transaction_id).await;
        self.finish(guard, result)
    }

    /// Decline one transaction with the Ledger. Excludes a concurrent
    /// `receive` of the same id and vice versa.
    pub async fn reject(&self, transaction_id: &str) -> Result<Ack, Error> {
        let guard = self.claim(transaction_id, Settle::Reject)?;
        let result = self.ledger.reject_transaction(transaction_id).await;
        self.finish(guard, result)
    }

    /// Mark `transaction_id` as `Acknowledging`, or explain why not.
    fn claim(&self, transaction_id: &str, step: Settle) -> Result<InFlight<'_>, Error> {
        let mut mirror = self.mirror.lock();
        if !mirror.contains(transaction_id) {
            tracing::debug!(transaction_id, step = step.verb(), "id not in the pending set");
            return Err(Error::UnknownTransaction(transaction_id.to_string()));
        }
        if !mirror.in_flight.insert(transaction_id.to_string()) {
            tracing::debug!(transaction_id, step = step.verb(), "settlement already in flight");
            return Err(Error::ReceiveInFlight(transaction_id.to_string()));
        }
        Ok(InFlight {
            reconciler: self,
            transaction_id: transaction_id.to_string(),
            step,
            reason: None,
            armed: true,
        })
    }

    fn finish(&self, mut guard: InFlight<'_>, result: Result<Ack, Error>) -> Result<Ack, Error> {
        let ack = match result {
            Ok(ack) => ack,
            Err(err) => {
                guard.fail(err.to_string());
                return Err(err);
            }
        };

        let transaction_id = guard.transaction_id.clone();
        {
            let mut mirror = self.mirror.lock();
            mirror.pending.retain(|tx| tx.transaction_id != transaction_id);
            mirror.in_flight.remove(&transaction_id);
            mirror.settled.insert(transaction_id.clone());
        }
        guard.disarm();
        tracing::info!(
            principal = %self.principal_id,
            %transaction_id,
            step = guard.step.verb(),
            status = %ack.status,
            "transaction settled"
        );
        let _ = self.events.send(guard.step.completed(ack.clone()));
        Ok(ack)
    }
}

impl std::fmt::Debug for PendingReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mirror = self.mirror.lock();
        f.debug_struct("PendingReconciler")
            .field("principal_id", &self.principal_id)
            .field("pending", &mirror.pending.len())
            .field("in_flight", &mirror.in_flight.len())
            .field("settled", &mirror.settled.len())
            .finish()
    }
}

/// Holds the `Acknowledging` marker. Dropping it while armed puts the id
/// back to `Pending`, which covers both errors and cancellation.
struct InFlight<'a> {
    reconciler: &'a PendingReconciler,
    transaction_id: String,
    step: Settle,
    reason: Option<String>,
    armed: bool,
}

impl InFlight<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }

    fn fail(mut self, reason: String) {
        self.reason = Some(reason);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.reconciler
            .mirror
            .lock()
            .in_flight
            .remove(&self.transaction_id);

        let error = self.reason.take().unwrap_or_else(|| "cancelled".to_string());
        tracing::warn!(
            principal = %self.reconciler.principal_id,
            transaction_id = %self.transaction_id,
            step = self.step.verb(),
            %error,
            "settlement failed; transaction back to pending"
        );
        let _ = self
            .reconciler
            .events
            .send(self.step.failed(self.transaction_id.clone(), error));
    }
}
