//! Per-risk serialized status writes with retry.
//!
//! At most one write per risk is in flight. Intents submitted meanwhile replace
//! each other in a single queued slot, so the last intent is the last write.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use shared::domain::{RiskId, RiskStatus, TenantId};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::{error::GatewayError, gateway::PersistenceGateway};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after the given (1-based) failed attempt: doubles each time, capped.
    pub fn backoff_for(&self, failed_attempt: u32) -> Duration {
        let shift = failed_attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRequest {
    pub seq: u64,
    pub risk_id: RiskId,
    pub status: RiskStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Persisted {
        request: WriteRequest,
        attempts: u32,
    },
    Failed {
        request: WriteRequest,
        attempts: u32,
        error: GatewayError,
    },
    /// A newer intent for the same risk replaced this one before it was written.
    Superseded { request: WriteRequest },
}

impl WriteOutcome {
    pub fn request(&self) -> WriteRequest {
        match self {
            WriteOutcome::Persisted { request, .. }
            | WriteOutcome::Failed { request, .. }
            | WriteOutcome::Superseded { request } => *request,
        }
    }
}

#[derive(Default)]
struct Lane {
    queued: Option<WriteRequest>,
}

#[derive(Clone)]
pub struct StatusWriter {
    tenant_id: TenantId,
    gateway: Arc<dyn PersistenceGateway>,
    policy: RetryPolicy,
    lanes: Arc<Mutex<HashMap<RiskId, Lane>>>,
    outcomes: mpsc::UnboundedSender<WriteOutcome>,
}

impl StatusWriter {
    pub fn new(
        tenant_id: TenantId,
        gateway: Arc<dyn PersistenceGateway>,
        policy: RetryPolicy,
    ) -> (Self, mpsc::UnboundedReceiver<WriteOutcome>) {
        let (outcomes, outcome_rx) = mpsc::unbounded_channel();
        (
            Self {
                tenant_id,
                gateway,
                policy,
                lanes: Arc::new(Mutex::new(HashMap::new())),
                outcomes,
            },
            outcome_rx,
        )
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Number of risks with a write in flight.
    pub fn in_flight(&self) -> usize {
        self.lanes().len()
    }

    /// Must be called from within a tokio runtime.
    pub fn submit(&self, request: WriteRequest) {
        {
            let mut lanes = self.lanes();
            if let Some(lane) = lanes.get_mut(&request.risk_id) {
                if let Some(replaced) = lane.queued.replace(request) {
                    self.report(WriteOutcome::Superseded { request: replaced });
                }
                return;
            }
            lanes.insert(request.risk_id, Lane::default());
        }
        let writer = self.clone();
        tokio::spawn(async move { writer.drive_lane(request).await });
    }

    async fn drive_lane(self, first: WriteRequest) {
        let mut request = first;
        loop {
            let outcome = self.write_with_retry(request).await;
            self.report(outcome);
            match self.take_queued(request.risk_id) {
                Some(next) => request = next,
                None => return,
            }
        }
    }

    async fn write_with_retry(&self, request: WriteRequest) -> WriteOutcome {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = self
                .gateway
                .update_risk_status(self.tenant_id, request.risk_id, request.status)
                .await;
            match result {
                Ok(()) => {
                    info!(
                        risk_id = %request.risk_id,
                        status = %request.status,
                        seq = request.seq,
                        attempts,
                        "writer: status persisted"
                    );
                    return WriteOutcome::Persisted { request, attempts };
                }
                Err(error) if error.is_retryable() && attempts < max_attempts => {
                    if self.has_queued(request.risk_id) {
                        info!(
                            risk_id = %request.risk_id,
                            seq = request.seq,
                            "writer: retry abandoned for newer intent"
                        );
                        return WriteOutcome::Superseded { request };
                    }
                    let delay = self.policy.backoff_for(attempts);
                    warn!(
                        risk_id = %request.risk_id,
                        seq = request.seq,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        "writer: status write failed, retrying: {error}"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    warn!(
                        risk_id = %request.risk_id,
                        status = %request.status,
                        seq = request.seq,
                        attempts,
                        "writer: status write failed: {error}"
                    );
                    return WriteOutcome::Failed {
                        request,
                        attempts,
                        error,
                    };
                }
            }
        }
    }

    fn has_queued(&self, risk_id: RiskId) -> bool {
        self.lanes()
            .get(&risk_id)
            .is_some_and(|lane| lane.queued.is_some())
    }

    /// Pops the queued intent, or closes the lane when there is none.
    fn take_queued(&self, risk_id: RiskId) -> Option<WriteRequest> {
        let mut lanes = self.lanes();
        let next = lanes.get_mut(&risk_id).and_then(|lane| lane.queued.take());
        if next.is_none() {
            lanes.remove(&risk_id);
        }
        next
    }

    fn report(&self, outcome: WriteOutcome) {
        // The board may already be gone; nothing left to reconcile then.
        let _ = self.outcomes.send(outcome);
    }

    fn lanes(&self) -> MutexGuard<'_, HashMap<RiskId, Lane>> {
        self.lanes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "tests/writer_tests.rs"]
mod tests;
