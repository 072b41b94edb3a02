use std::{
    collections::VecDeque,
    sync::Mutex,
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use shared::{
    domain::{Risk, RiskId, RiskLevel, RiskStatus, TenantId},
    protocol::Notification,
};

use crate::{
    error::GatewayError,
    gateway::{Notifier, PersistenceGateway},
};

pub(crate) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

pub(crate) fn risk(name: &str, status: RiskStatus) -> Risk {
    Risk {
        id: RiskId::new(),
        tenant_id: TenantId::new(),
        name: name.to_string(),
        description: String::new(),
        category: "Operacional".into(),
        risk_level: RiskLevel::Medio,
        risk_score: 9,
        status,
        assigned_to: None,
        due_date: None,
        created_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
    }
}

pub(crate) fn overdue(mut risk: Risk) -> Risk {
    risk.due_date = NaiveDate::from_ymd_opt(2020, 1, 1);
    risk
}

pub(crate) fn leveled(mut risk: Risk, level: RiskLevel) -> Risk {
    risk.risk_level = level;
    risk
}

#[derive(Default)]
pub(crate) struct FakeGateway {
    risks: Vec<Risk>,
    calls: Mutex<Vec<(RiskId, RiskStatus)>>,
    failures: Mutex<VecDeque<GatewayError>>,
}

impl FakeGateway {
    pub(crate) fn with_risks(risks: Vec<Risk>) -> Self {
        Self {
            risks,
            ..Self::default()
        }
    }

    /// Each scripted error is returned by one upcoming call, in order.
    pub(crate) fn failing_with(errors: impl IntoIterator<Item = GatewayError>) -> Self {
        Self {
            failures: Mutex::new(errors.into_iter().collect()),
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<(RiskId, RiskStatus)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PersistenceGateway for FakeGateway {
    async fn list_risks(&self, _tenant_id: TenantId) -> Result<Vec<Risk>, GatewayError> {
        Ok(self.risks.clone())
    }

    async fn update_risk_status(
        &self,
        _tenant_id: TenantId,
        risk_id: RiskId,
        status: RiskStatus,
    ) -> Result<(), GatewayError> {
        self.calls.lock().unwrap().push((risk_id, status));
        match self.failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub(crate) fn seen(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen.lock().unwrap().push(notification);
    }
}

pub(crate) fn unavailable() -> GatewayError {
    GatewayError::Unavailable("connection reset".into())
}
