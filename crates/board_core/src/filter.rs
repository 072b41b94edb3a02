//! Search term and filter selection applied before classification.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::domain::{Risk, RiskLevel, RiskStatus};

/// Active predicates, combined with AND. Empty sets do not restrict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFilter {
    pub search: String,
    pub categories: HashSet<String>,
    pub levels: HashSet<RiskLevel>,
    pub statuses: HashSet<RiskStatus>,
    pub show_overdue: bool,
}

impl RiskFilter {
    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        self.search = term.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.insert(category.into());
        self
    }

    pub fn with_level(mut self, level: RiskLevel) -> Self {
        self.levels.insert(level);
        self
    }

    pub fn with_status(mut self, status: RiskStatus) -> Self {
        self.statuses.insert(status);
        self
    }

    pub fn overdue_only(mut self) -> Self {
        self.show_overdue = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.search.trim().is_empty()
            && self.categories.is_empty()
            && self.levels.is_empty()
            && self.statuses.is_empty()
            && !self.show_overdue
    }

    pub fn matches(&self, risk: &Risk, now: DateTime<Utc>) -> bool {
        self.matches_search(risk)
            && (self.categories.is_empty() || self.categories.contains(&risk.category))
            && (self.levels.is_empty() || self.levels.contains(&risk.risk_level))
            && (self.statuses.is_empty() || self.statuses.contains(&risk.status))
            && (!self.show_overdue || risk.is_overdue(now))
    }

    pub fn apply<'a>(&self, risks: &'a [Risk], now: DateTime<Utc>) -> Vec<&'a Risk> {
        risks.iter().filter(|risk| self.matches(risk, now)).collect()
    }

    fn matches_search(&self, risk: &Risk) -> bool {
        if self.search.trim().is_empty() {
            return true;
        }
        let term = self.search.to_lowercase();
        [
            Some(risk.name.as_str()),
            Some(risk.description.as_str()),
            Some(risk.category.as_str()),
            risk.assigned_to.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&term))
    }
}

#[cfg(test)]
#[path = "tests/filter_tests.rs"]
mod tests;
