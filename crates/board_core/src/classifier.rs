//! Partitions risks into the fixed workflow columns.

use chrono::{DateTime, Utc};
use shared::{
    domain::{Risk, RiskId, RiskStatus},
    protocol::{BoardSnapshot, ColumnSnapshot, ColumnSummary},
};

#[derive(Debug, Clone)]
pub struct Column<'a> {
    pub status: RiskStatus,
    pub risks: Vec<&'a Risk>,
    pub summary: ColumnSummary,
}

#[derive(Debug, Clone)]
pub struct Classification<'a> {
    pub columns: Vec<Column<'a>>,
    /// Risks whose status has no column (currently only `Reaberto`).
    pub unplaced: Vec<&'a Risk>,
}

impl<'a> Classification<'a> {
    pub fn column(&self, status: RiskStatus) -> Option<&Column<'a>> {
        self.columns.iter().find(|column| column.status == status)
    }

    pub fn column_ids(&self, status: RiskStatus) -> Vec<RiskId> {
        self.column(status)
            .map(|column| column.risks.iter().map(|risk| risk.id).collect())
            .unwrap_or_default()
    }

    pub fn to_snapshot(&self) -> BoardSnapshot {
        BoardSnapshot {
            columns: self
                .columns
                .iter()
                .map(|column| ColumnSnapshot {
                    status: column.status,
                    label: column.status.label().to_string(),
                    summary: column.summary,
                    risks: column.risks.iter().map(|risk| (*risk).clone()).collect(),
                })
                .collect(),
            unplaced: self.unplaced.iter().map(|risk| risk.id).collect(),
        }
    }
}

/// Stable partition: order within a column follows input order.
pub fn classify<'a, I>(risks: I, now: DateTime<Utc>) -> Classification<'a>
where
    I: IntoIterator<Item = &'a Risk>,
{
    let mut columns: Vec<Column<'a>> = RiskStatus::BOARD_COLUMNS
        .into_iter()
        .map(|status| Column {
            status,
            risks: Vec::new(),
            summary: ColumnSummary::default(),
        })
        .collect();
    let mut unplaced = Vec::new();

    for risk in risks {
        let Some(column) = columns.iter_mut().find(|column| column.status == risk.status) else {
            unplaced.push(risk);
            continue;
        };
        column.summary.total += 1;
        if risk.is_high_priority() {
            column.summary.high_priority += 1;
        }
        if risk.is_overdue(now) {
            column.summary.overdue += 1;
        }
        column.risks.push(risk);
    }

    Classification { columns, unplaced }
}

#[cfg(test)]
#[path = "tests/classifier_tests.rs"]
mod tests;
