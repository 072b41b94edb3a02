use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiException, ErrorCode};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = ApiException;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self).map_err(|_| {
                    ApiException::new(
                        ErrorCode::Validation,
                        format!("invalid {} '{s}'", stringify!($name)),
                    )
                })
            }
        }
    };
}

id_newtype!(TenantId);
id_newtype!(RiskId);

/// Workflow stage of a risk. The board mutates this through drag-and-drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskStatus {
    Identificado,
    Avaliado,
    EmTratamento,
    Monitorado,
    Fechado,
    Reaberto,
}

impl RiskStatus {
    pub const ALL: [RiskStatus; 6] = [
        RiskStatus::Identificado,
        RiskStatus::Avaliado,
        RiskStatus::EmTratamento,
        RiskStatus::Monitorado,
        RiskStatus::Fechado,
        RiskStatus::Reaberto,
    ];

    /// Stages shown as board columns, in display order.
    pub const BOARD_COLUMNS: [RiskStatus; 5] = [
        RiskStatus::Identificado,
        RiskStatus::Avaliado,
        RiskStatus::EmTratamento,
        RiskStatus::Monitorado,
        RiskStatus::Fechado,
    ];

    pub fn label(self) -> &'static str {
        match self {
            RiskStatus::Identificado => "Identificado",
            RiskStatus::Avaliado => "Avaliado",
            RiskStatus::EmTratamento => "Em Tratamento",
            RiskStatus::Monitorado => "Monitorado",
            RiskStatus::Fechado => "Fechado",
            RiskStatus::Reaberto => "Reaberto",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskStatus::Identificado => "identificado",
            RiskStatus::Avaliado => "avaliado",
            RiskStatus::EmTratamento => "em_tratamento",
            RiskStatus::Monitorado => "monitorado",
            RiskStatus::Fechado => "fechado",
            RiskStatus::Reaberto => "reaberto",
        }
    }

    pub fn is_board_column(self) -> bool {
        Self::BOARD_COLUMNS.contains(&self)
    }

    pub fn is_closed(self) -> bool {
        self == RiskStatus::Fechado
    }
}

impl fmt::Display for RiskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RiskStatus {
    type Err = ApiException;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = normalize_label(s);
        Self::ALL
            .into_iter()
            .find(|status| normalize_label(status.label()) == key || status.as_str() == key)
            .ok_or_else(|| {
                ApiException::new(ErrorCode::Validation, format!("unknown risk status '{s}'"))
            })
    }
}

/// Severity band derived from the probability x impact matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    MuitoBaixo,
    Baixo,
    Medio,
    Alto,
    MuitoAlto,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 5] = [
        RiskLevel::MuitoBaixo,
        RiskLevel::Baixo,
        RiskLevel::Medio,
        RiskLevel::Alto,
        RiskLevel::MuitoAlto,
    ];

    pub fn label(self) -> &'static str {
        match self {
            RiskLevel::MuitoBaixo => "Muito Baixo",
            RiskLevel::Baixo => "Baixo",
            RiskLevel::Medio => "Médio",
            RiskLevel::Alto => "Alto",
            RiskLevel::MuitoAlto => "Muito Alto",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::MuitoBaixo => "muito_baixo",
            RiskLevel::Baixo => "baixo",
            RiskLevel::Medio => "medio",
            RiskLevel::Alto => "alto",
            RiskLevel::MuitoAlto => "muito_alto",
        }
    }

    pub fn for_score(score: u8) -> Self {
        match score {
            0..=3 => RiskLevel::MuitoBaixo,
            4..=6 => RiskLevel::Baixo,
            7..=12 => RiskLevel::Medio,
            13..=19 => RiskLevel::Alto,
            _ => RiskLevel::MuitoAlto,
        }
    }

    pub fn is_high_priority(self) -> bool {
        matches!(self, RiskLevel::Alto | RiskLevel::MuitoAlto)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RiskLevel {
    type Err = ApiException;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = normalize_label(s);
        Self::ALL
            .into_iter()
            .find(|level| normalize_label(level.label()) == key || level.as_str() == key)
            .ok_or_else(|| {
                ApiException::new(ErrorCode::Validation, format!("unknown risk level '{s}'"))
            })
    }
}

/// Lowercases, strips the Portuguese accents used by the labels, and joins words with `_`.
fn normalize_label(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'Á' | 'À' | 'Â' | 'Ã' => 'a',
            'é' | 'ê' | 'É' | 'Ê' => 'e',
            'í' | 'Í' => 'i',
            'ó' | 'ô' | 'õ' | 'Ó' | 'Ô' | 'Õ' => 'o',
            'ú' | 'Ú' => 'u',
            'ç' | 'Ç' => 'c',
            ' ' | '-' => '_',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub probability: u8,
    pub impact: u8,
}

impl RiskAssessment {
    pub fn new(probability: u8, impact: u8) -> Result<Self, ApiException> {
        for (field, value) in [("probability", probability), ("impact", impact)] {
            if !(MIN_RATING..=MAX_RATING).contains(&value) {
                return Err(ApiException::new(
                    ErrorCode::Validation,
                    format!("{field} must be between {MIN_RATING} and {MAX_RATING}, got {value}"),
                ));
            }
        }
        Ok(Self {
            probability,
            impact,
        })
    }

    pub fn score(&self) -> u8 {
        self.probability.saturating_mul(self.impact)
    }

    pub fn level(&self) -> RiskLevel {
        RiskLevel::for_score(self.score())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    pub id: RiskId,
    pub tenant_id: TenantId,
    pub name: String,
    pub description: String,
    pub category: String,
    pub risk_level: RiskLevel,
    pub risk_score: u8,
    pub status: RiskStatus,
    pub assigned_to: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Risk {
    /// A risk is overdue once its due date has passed and it is not closed.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        if self.status.is_closed() {
            return false;
        }
        self.due_date
            .map(|due| due.and_time(NaiveTime::MIN).and_utc() < now)
            .unwrap_or(false)
    }

    pub fn is_high_priority(&self) -> bool {
        self.risk_level.is_high_priority()
    }
}

/// Fields supplied by a creation flow; identity, score and status are assigned on insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRisk {
    pub name: String,
    pub description: String,
    pub category: String,
    pub assessment: RiskAssessment,
    pub assigned_to: Option<String>,
    pub due_date: Option<NaiveDate>,
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
