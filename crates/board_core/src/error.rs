use shared::domain::{RiskId, RiskStatus};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BoardError {
    #[error("risk {0} is not on this board")]
    RiskNotFound(RiskId),
    #[error("a drag for risk {0} is already in progress")]
    DragInProgress(RiskId),
    #[error("no drag in progress")]
    NotDragging,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("risk {0} not found in record store")]
    NotFound(RiskId),
    #[error("record store unavailable: {0}")]
    Unavailable(String),
    #[error("record store rejected status {status} for risk {risk_id}: {reason}")]
    Rejected {
        risk_id: RiskId,
        status: RiskStatus,
        reason: String,
    },
}

impl GatewayError {
    /// Only transport-level failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_))
    }
}
