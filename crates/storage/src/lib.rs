use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use board_core::{GatewayError, PersistenceGateway};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

use shared::domain::{NewRisk, Risk, RiskId, RiskLevel, RiskStatus, TenantId};

const RISK_COLUMNS: &str = "id, tenant_id, name, description, category, risk_level, risk_score, status, assigned_to, due_date, created_at";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to `sqlite::memory:` opens its own empty database.
        let max_connections = if is_memory_url(database_url) { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Inserts a risk in `Identificado`, scoring it from its assessment.
    pub async fn create_risk(&self, tenant_id: TenantId, new_risk: &NewRisk) -> Result<Risk> {
        let now = Utc::now();
        let risk = Risk {
            id: RiskId::new(),
            tenant_id,
            name: new_risk.name.trim().to_string(),
            description: new_risk.description.clone(),
            category: new_risk.category.trim().to_string(),
            risk_level: new_risk.assessment.level(),
            risk_score: new_risk.assessment.score(),
            status: RiskStatus::Identificado,
            assigned_to: new_risk.assigned_to.clone(),
            due_date: new_risk.due_date,
            created_at: now,
        };
        if risk.name.is_empty() {
            return Err(anyhow!("risk name must not be empty"));
        }

        sqlx::query(
            "INSERT INTO risks (
                id, tenant_id, name, description, category, probability, impact,
                risk_score, risk_level, status, assigned_to, due_date, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(risk.id.to_string())
        .bind(tenant_id.to_string())
        .bind(&risk.name)
        .bind(&risk.description)
        .bind(&risk.category)
        .bind(i64::from(new_risk.assessment.probability))
        .bind(i64::from(new_risk.assessment.impact))
        .bind(i64::from(risk.risk_score))
        .bind(risk.risk_level.as_str())
        .bind(risk.status.as_str())
        .bind(&risk.assigned_to)
        .bind(risk.due_date)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("failed to insert risk")?;

        debug!(tenant_id = %tenant_id, risk_id = %risk.id, "storage: risk created");
        Ok(risk)
    }

    pub async fn get_risk(&self, tenant_id: TenantId, risk_id: RiskId) -> Result<Option<Risk>> {
        let row = sqlx::query(&format!(
            "SELECT {RISK_COLUMNS} FROM risks WHERE tenant_id = ? AND id = ?"
        ))
        .bind(tenant_id.to_string())
        .bind(risk_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| risk_from_row(&r)).transpose()
    }

    pub async fn list_risks_for_tenant(&self, tenant_id: TenantId) -> Result<Vec<Risk>> {
        let rows = sqlx::query(&format!(
            "SELECT {RISK_COLUMNS} FROM risks WHERE tenant_id = ? ORDER BY created_at DESC, id"
        ))
        .bind(tenant_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("failed to list risks")?;
        rows.iter().map(risk_from_row).collect()
    }

    /// Returns `false` when the tenant has no such risk. Rewriting the current status succeeds.
    pub async fn update_risk_status(
        &self,
        tenant_id: TenantId,
        risk_id: RiskId,
        status: RiskStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE risks SET status = ?, updated_at = ? WHERE tenant_id = ? AND id = ?",
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(tenant_id.to_string())
        .bind(risk_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_risk(&self, tenant_id: TenantId, risk_id: RiskId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM risks WHERE tenant_id = ? AND id = ?")
            .bind(tenant_id.to_string())
            .bind(risk_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn risk_from_row(r: &SqliteRow) -> Result<Risk> {
    let id: String = r.try_get("id")?;
    let tenant_id: String = r.try_get("tenant_id")?;
    let risk_level: String = r.try_get("risk_level")?;
    let status: String = r.try_get("status")?;
    let risk_score: i64 = r.try_get("risk_score")?;

    Ok(Risk {
        id: id.parse::<RiskId>()?,
        tenant_id: tenant_id.parse::<TenantId>()?,
        name: r.try_get("name")?,
        description: r.try_get("description")?,
        category: r.try_get("category")?,
        risk_level: risk_level.parse::<RiskLevel>()?,
        risk_score: u8::try_from(risk_score)
            .with_context(|| format!("risk score {risk_score} out of range for risk {id}"))?,
        status: status.parse::<RiskStatus>()?,
        assigned_to: r.try_get("assigned_to")?,
        due_date: r.try_get::<Option<NaiveDate>, _>("due_date")?,
        created_at: r.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_memory_url(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

fn gateway_error(err: anyhow::Error) -> GatewayError {
    GatewayError::Unavailable(format!("{err:#}"))
}

/// Busy and locked results clear once the other writer finishes; every other
/// database error is a refusal of this particular write.
fn status_write_error(err: anyhow::Error, risk_id: RiskId, status: RiskStatus) -> GatewayError {
    match err.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db))
            if db.code().is_some_and(|code| is_transient_sqlite_code(&code)) =>
        {
            GatewayError::Unavailable(db.message().to_string())
        }
        Some(sqlx::Error::Database(db)) => GatewayError::Rejected {
            risk_id,
            status,
            reason: db.message().to_string(),
        },
        _ => gateway_error(err),
    }
}

/// SQLite reports extended result codes; the low byte is the primary code.
fn is_transient_sqlite_code(code: &str) -> bool {
    const SQLITE_BUSY: i32 = 5;
    const SQLITE_LOCKED: i32 = 6;
    code.parse::<i32>()
        .is_ok_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
}

#[async_trait]
impl PersistenceGateway for Storage {
    async fn list_risks(&self, tenant_id: TenantId) -> Result<Vec<Risk>, GatewayError> {
        self.list_risks_for_tenant(tenant_id)
            .await
            .map_err(gateway_error)
    }

    async fn update_risk_status(
        &self,
        tenant_id: TenantId,
        risk_id: RiskId,
        status: RiskStatus,
    ) -> Result<(), GatewayError> {
        let updated = Storage::update_risk_status(self, tenant_id, risk_id, status)
            .await
            .map_err(|err| status_write_error(err, risk_id, status))?;
        if updated {
            Ok(())
        } else {
            Err(GatewayError::NotFound(risk_id))
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
