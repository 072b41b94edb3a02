use serde::{Deserialize, Serialize};

use crate::domain::{Risk, RiskId, RiskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Success,
    Error,
}

/// A user-visible toast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
}

impl Notification {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }

    pub fn status_changed(risk_name: &str, status: RiskStatus) -> Self {
        Self::new(
            Severity::Success,
            format!("Risk \"{risk_name}\" moved to {status}"),
        )
    }

    pub fn status_reverted(risk_name: &str, restored: RiskStatus, reason: &str) -> Self {
        Self::new(
            Severity::Error,
            format!("Could not move risk \"{risk_name}\"; restored to {restored}: {reason}"),
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub total: usize,
    pub high_priority: usize,
    pub overdue: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSnapshot {
    pub status: RiskStatus,
    pub label: String,
    pub summary: ColumnSummary,
    pub risks: Vec<Risk>,
}

/// Serializable view of a classified board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardSnapshot {
    pub columns: Vec<ColumnSnapshot>,
    pub unplaced: Vec<RiskId>,
}
