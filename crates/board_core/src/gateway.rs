//! Seams to the hosted record store and the toast surface.

use async_trait::async_trait;
use shared::{
    domain::{Risk, RiskId, RiskStatus, TenantId},
    protocol::{Notification, Severity},
};
use tracing::{error, info};

use crate::error::GatewayError;

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn list_risks(&self, tenant_id: TenantId) -> Result<Vec<Risk>, GatewayError>;

    /// Re-applying the status a risk already has must succeed without further effect.
    async fn update_risk_status(
        &self,
        tenant_id: TenantId,
        risk_id: RiskId,
        status: RiskStatus,
    ) -> Result<(), GatewayError>;
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Routes toasts into the log; used by headless frontends.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.severity {
            Severity::Success => info!("toast: {}", notification.message),
            Severity::Error => error!("toast: {}", notification.message),
        }
    }
}
