use std::{fmt::Write as _, path::PathBuf, sync::Arc};

use anyhow::{anyhow, bail, Context, Result};
use board_core::{
    BoardContext, Classification, Reconciliation, RiskBoard, RiskFilter, TracingNotifier,
};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use shared::domain::{NewRisk, RiskAssessment, RiskId, RiskLevel, RiskStatus, TenantId};
use storage::Storage;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, prepare_database_url, Settings, DEFAULT_CONFIG_PATH};

#[derive(Parser, Debug)]
#[command(name = "riskboard", about = "Risk treatment workflow board")]
struct Cli {
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[arg(long)]
    database_url: Option<String>,
    #[arg(long)]
    tenant: Option<TenantId>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a new risk in `Identificado`.
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        category: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        probability: u8,
        #[arg(long)]
        impact: u8,
        #[arg(long)]
        assigned_to: Option<String>,
        #[arg(long)]
        due_date: Option<NaiveDate>,
    },
    /// Print the board columns.
    Board {
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long)]
        category: Vec<String>,
        #[arg(long)]
        level: Vec<RiskLevel>,
        #[arg(long)]
        status: Vec<RiskStatus>,
        #[arg(long)]
        overdue: bool,
        #[arg(long)]
        json: bool,
    },
    /// Move a risk to another stage and wait for the write to settle.
    Move { risk_id: RiskId, status: RiskStatus },
    Delete { risk_id: RiskId },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings(&cli.config);
    if let Some(database_url) = cli.database_url.clone() {
        settings.database_url = database_url;
    }
    if let Some(tenant_id) = cli.tenant {
        settings.tenant_id = Some(tenant_id);
    }

    run(cli.command, &settings).await
}

async fn run(command: Command, settings: &Settings) -> Result<()> {
    let tenant_id = settings
        .tenant_id
        .ok_or_else(|| anyhow!("no tenant configured; pass --tenant or set APP__TENANT_ID"))?;
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url)
        .await
        .with_context(|| format!("failed to open database '{database_url}'"))?;

    match command {
        Command::Create {
            name,
            category,
            description,
            probability,
            impact,
            assigned_to,
            due_date,
        } => {
            let new_risk = NewRisk {
                name,
                description,
                category,
                assessment: RiskAssessment::new(probability, impact)?,
                assigned_to,
                due_date,
            };
            let risk = storage.create_risk(tenant_id, &new_risk).await?;
            info!(%tenant_id, risk_id = %risk.id, "risk created");
            println!(
                "created risk {} ({} / score {})",
                risk.id, risk.risk_level, risk.risk_score
            );
        }
        Command::Board {
            search,
            category,
            level,
            status,
            overdue,
            json,
        } => {
            let mut board = load_board(tenant_id, storage, settings).await?;
            board.set_filter(RiskFilter {
                search,
                categories: category.into_iter().collect(),
                levels: level.into_iter().collect(),
                statuses: status.into_iter().collect(),
                show_overdue: overdue,
            });
            let columns = board.columns();
            if json {
                println!("{}", serde_json::to_string_pretty(&columns.to_snapshot())?);
            } else {
                print!("{}", render_board(&columns, board.now()));
            }
        }
        Command::Move { risk_id, status } => {
            let mut board = load_board(tenant_id, storage, settings).await?;
            board.change_status(risk_id, status)?;
            for reconciliation in board.settle().await {
                if let Reconciliation::RolledBack { restored, .. } = reconciliation {
                    bail!("risk {risk_id} could not be moved; still {restored}");
                }
            }
            println!("risk {risk_id} is now {status}");
        }
        Command::Delete { risk_id } => {
            if !storage.delete_risk(tenant_id, risk_id).await? {
                bail!("risk {risk_id} not found");
            }
            info!(%tenant_id, %risk_id, "risk deleted");
            println!("deleted risk {risk_id}");
        }
    }

    Ok(())
}

async fn load_board(tenant_id: TenantId, storage: Storage, settings: &Settings) -> Result<RiskBoard> {
    let board = RiskBoard::load(
        BoardContext { tenant_id },
        Arc::new(storage),
        Arc::new(TracingNotifier),
        settings.retry_policy(),
    )
    .await?;
    Ok(board)
}

fn render_board(columns: &Classification<'_>, now: chrono::DateTime<Utc>) -> String {
    let mut out = String::new();
    for column in &columns.columns {
        let summary = column.summary;
        let _ = writeln!(
            out,
            "{} ({} | {} high | {} overdue)",
            column.status, summary.total, summary.high_priority, summary.overdue
        );
        for risk in &column.risks {
            let _ = write!(
                out,
                "  - {}  {}  [{} {}]",
                risk.id, risk.name, risk.risk_level, risk.risk_score
            );
            if let Some(due) = risk.due_date {
                let _ = write!(out, "  due {due}");
                if risk.is_overdue(now) {
                    out.push_str(" OVERDUE");
                }
            }
            if let Some(assignee) = &risk.assigned_to {
                let _ = write!(out, "  @{assignee}");
            }
            out.push('\n');
        }
    }
    if !columns.unplaced.is_empty() {
        let _ = writeln!(
            out,
            "{} (not on board): {}",
            RiskStatus::Reaberto,
            columns.unplaced.len()
        );
    }
    out
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
