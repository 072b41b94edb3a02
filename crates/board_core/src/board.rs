//! The board owns the risk collection and mediates every status change.
//!
//! Status changes are applied locally first, then queued on the
//! [`StatusWriter`]. Write outcomes come back over a channel and are folded in
//! by [`RiskBoard::drain_outcomes`] / [`RiskBoard::next_outcome`]: a failed
//! latest intent rolls the risk back to its last persisted status.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use shared::{
    domain::{Risk, RiskId, RiskStatus, TenantId},
    protocol::Notification,
};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{info, warn};

use crate::{
    classifier::{classify, Classification},
    drag::{DragController, DragSource, DropOutcome, DropTarget},
    error::{BoardError, GatewayError},
    filter::RiskFilter,
    gateway::{Notifier, PersistenceGateway},
    writer::{RetryPolicy, StatusWriter, WriteOutcome, WriteRequest},
};

/// Explicit replacement for the ambient tenant/auth context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardContext {
    pub tenant_id: TenantId,
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// The risk already had the requested status; nothing was written.
    Unchanged,
    Applied { seq: u64, previous: RiskStatus },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    Committed {
        risk_id: RiskId,
        status: RiskStatus,
    },
    RolledBack {
        risk_id: RiskId,
        restored: RiskStatus,
    },
    /// Outcome of a superseded intent or of a risk no longer on the board.
    Ignored,
}

struct PendingChange {
    latest_seq: u64,
    persisted: RiskStatus,
}

pub struct RiskBoard {
    context: BoardContext,
    risks: Vec<Risk>,
    filter: RiskFilter,
    drag: DragController,
    writer: StatusWriter,
    outcome_rx: mpsc::UnboundedReceiver<WriteOutcome>,
    pending: HashMap<RiskId, PendingChange>,
    next_seq: u64,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl RiskBoard {
    pub fn new(
        context: BoardContext,
        risks: Vec<Risk>,
        gateway: Arc<dyn PersistenceGateway>,
        notifier: Arc<dyn Notifier>,
        policy: RetryPolicy,
    ) -> Self {
        let (writer, outcome_rx) = StatusWriter::new(context.tenant_id, gateway, policy);
        Self {
            context,
            risks,
            filter: RiskFilter::default(),
            drag: DragController::new(),
            writer,
            outcome_rx,
            pending: HashMap::new(),
            next_seq: 1,
            notifier,
            clock: Arc::new(SystemClock),
        }
    }

    pub async fn load(
        context: BoardContext,
        gateway: Arc<dyn PersistenceGateway>,
        notifier: Arc<dyn Notifier>,
        policy: RetryPolicy,
    ) -> Result<Self, GatewayError> {
        let risks = gateway.list_risks(context.tenant_id).await?;
        info!(
            tenant_id = %context.tenant_id,
            risks = risks.len(),
            "board: loaded risks"
        );
        Ok(Self::new(context, risks, gateway, notifier, policy))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn tenant_id(&self) -> TenantId {
        self.context.tenant_id
    }

    pub fn risks(&self) -> &[Risk] {
        &self.risks
    }

    pub fn risk(&self, risk_id: RiskId) -> Option<&Risk> {
        self.risks.iter().find(|risk| risk.id == risk_id)
    }

    pub fn filter(&self) -> &RiskFilter {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: RiskFilter) {
        self.filter = filter;
    }

    pub fn set_search(&mut self, term: impl Into<String>) {
        self.filter.search = term.into();
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn filtered(&self) -> Vec<&Risk> {
        self.filter.apply(&self.risks, self.now())
    }

    pub fn columns(&self) -> Classification<'_> {
        let now = self.now();
        classify(self.filter.apply(&self.risks, now), now)
    }

    pub fn drag(&self) -> &DragController {
        &self.drag
    }

    pub fn start_drag(&mut self, risk_id: RiskId, source: DragSource) -> Result<(), BoardError> {
        self.drag.start(risk_id, source, &self.risks)
    }

    pub fn cancel_drag(&mut self) {
        self.drag.cancel();
    }

    /// Resolves the drop and applies at most one status transition.
    pub fn drop_on(&mut self, target: DropTarget) -> Result<DropOutcome, BoardError> {
        let outcome = self.drag.drop_on(target, &self.risks)?;
        if let DropOutcome::Transition { risk_id, to, .. } = outcome {
            self.change_status(risk_id, to)?;
        }
        Ok(outcome)
    }

    pub fn change_status(
        &mut self,
        risk_id: RiskId,
        new_status: RiskStatus,
    ) -> Result<ChangeOutcome, BoardError> {
        let risk = self
            .risks
            .iter_mut()
            .find(|risk| risk.id == risk_id)
            .ok_or(BoardError::RiskNotFound(risk_id))?;
        let previous = risk.status;
        if previous == new_status {
            return Ok(ChangeOutcome::Unchanged);
        }

        risk.status = new_status;
        let notification = Notification::status_changed(&risk.name, new_status);

        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending
            .entry(risk_id)
            .and_modify(|pending| pending.latest_seq = seq)
            .or_insert(PendingChange {
                latest_seq: seq,
                persisted: previous,
            });

        info!(
            tenant_id = %self.context.tenant_id,
            %risk_id,
            from = %previous,
            to = %new_status,
            seq,
            "board: status changed"
        );
        self.notifier.notify(notification);
        self.writer.submit(WriteRequest {
            seq,
            risk_id,
            status: new_status,
        });
        Ok(ChangeOutcome::Applied { seq, previous })
    }

    /// Applies an externally created (or refreshed) risk.
    ///
    /// While a write for the risk is pending, the refreshed status becomes the
    /// rollback target and the optimistic status stays visible.
    pub fn insert_risk(&mut self, mut risk: Risk) {
        let Some(existing) = self.risks.iter_mut().find(|existing| existing.id == risk.id) else {
            self.risks.push(risk);
            return;
        };
        if let Some(pending) = self.pending.get_mut(&risk.id) {
            pending.persisted = risk.status;
            risk.status = existing.status;
        }
        *existing = risk;
    }

    /// Applies an external delete. Outcomes of writes still in flight for it are ignored.
    pub fn remove_risk(&mut self, risk_id: RiskId) -> Option<Risk> {
        self.pending.remove(&risk_id);
        if self.drag.dragging() == Some(risk_id) {
            self.drag.cancel();
        }
        let index = self.risks.iter().position(|risk| risk.id == risk_id)?;
        Some(self.risks.remove(index))
    }

    pub fn has_pending_writes(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn is_pending(&self, risk_id: RiskId) -> bool {
        self.pending.contains_key(&risk_id)
    }

    /// Folds in every outcome already delivered, without waiting.
    pub fn drain_outcomes(&mut self) -> Vec<Reconciliation> {
        let mut applied = Vec::new();
        loop {
            match self.outcome_rx.try_recv() {
                Ok(outcome) => applied.push(self.apply_outcome(outcome)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return applied,
            }
        }
    }

    pub async fn next_outcome(&mut self) -> Option<Reconciliation> {
        let outcome = self.outcome_rx.recv().await?;
        Some(self.apply_outcome(outcome))
    }

    /// Waits until every pending change is committed or rolled back.
    pub async fn settle(&mut self) -> Vec<Reconciliation> {
        let mut applied = Vec::new();
        while self.has_pending_writes() {
            match self.next_outcome().await {
                Some(reconciliation) => applied.push(reconciliation),
                None => break,
            }
        }
        applied
    }

    fn apply_outcome(&mut self, outcome: WriteOutcome) -> Reconciliation {
        let request = outcome.request();
        let Some(pending) = self.pending.get_mut(&request.risk_id) else {
            return Reconciliation::Ignored;
        };
        let is_latest = pending.latest_seq == request.seq;

        match outcome {
            WriteOutcome::Superseded { .. } => Reconciliation::Ignored,
            WriteOutcome::Persisted { .. } => {
                pending.persisted = request.status;
                if is_latest {
                    self.pending.remove(&request.risk_id);
                }
                Reconciliation::Committed {
                    risk_id: request.risk_id,
                    status: request.status,
                }
            }
            WriteOutcome::Failed { .. } if !is_latest => Reconciliation::Ignored,
            WriteOutcome::Failed { error, attempts, .. } => {
                let restored = pending.persisted;
                self.pending.remove(&request.risk_id);
                let Some(risk) = self.risks.iter_mut().find(|risk| risk.id == request.risk_id)
                else {
                    return Reconciliation::Ignored;
                };
                risk.status = restored;
                warn!(
                    tenant_id = %self.context.tenant_id,
                    risk_id = %request.risk_id,
                    attempted = %request.status,
                    %restored,
                    attempts,
                    "board: status write failed, rolled back: {error}"
                );
                self.notifier.notify(Notification::status_reverted(
                    &risk.name,
                    restored,
                    &error.to_string(),
                ));
                Reconciliation::RolledBack {
                    risk_id: request.risk_id,
                    restored,
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/board_tests.rs"]
mod tests;
