use crate::period::Period;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One completed bus run as delivered by the trip import pipeline.
///
/// Immutable once imported. Revenues are integer minor units; manual income
/// arrives as free text keyed in at the depot and is parsed leniently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Trip {
    pub trip_id: String,
    pub travel_date: NaiveDate,
    pub origin: String,
    pub destination: String,
    pub operator_name: String,
    pub branch_revenue_minor: u64,
    pub road_revenue_minor: u64,
    pub manual_income: String,
}

impl Trip {
    pub fn total_revenue_minor(&self) -> u64 {
        self.branch_revenue_minor
            .saturating_add(self.road_revenue_minor)
            .saturating_add(parse_manual_income_minor(&self.manual_income))
    }
}

/// Parse free-text manual income into minor units.
///
/// Currency symbols, whitespace, and `.`/`,` grouping separators are
/// stripped; the remaining digit run is the amount. Unparseable, negative,
/// or empty input yields 0 so the trip is still counted.
pub fn parse_manual_income_minor(raw: &str) -> u64 {
    let cleaned: String = raw
        .chars()
        .filter(|ch| !ch.is_whitespace() && *ch != '$' && *ch != '.' && *ch != ',')
        .collect();

    if cleaned.is_empty() || !cleaned.bytes().all(|b| b.is_ascii_digit()) {
        return 0;
    }

    cleaned.parse().unwrap_or(0)
}

/// Validation lifecycle of a production record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionStatus {
    Pendiente,
    EnRevision,
    Aprobado,
    Rechazado,
}

impl ProductionStatus {
    pub fn name(self) -> &'static str {
        match self {
            Self::Pendiente => "pendiente",
            Self::EnRevision => "en_revision",
            Self::Aprobado => "aprobado",
            Self::Rechazado => "rechazado",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pendiente" => Some(Self::Pendiente),
            "en_revision" => Some(Self::EnRevision),
            "aprobado" => Some(Self::Aprobado),
            "rechazado" => Some(Self::Rechazado),
            _ => None,
        }
    }

    pub fn is_approved(self) -> bool {
        matches!(self, Self::Aprobado)
    }
}

/// Closed role enumeration consulted by the validation workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Administrador,
    Validador,
}

impl ActorRole {
    pub fn name(self) -> &'static str {
        match self {
            Self::Administrador => "administrador",
            Self::Validador => "validador",
        }
    }

    /// Only administrators may move an approved production out of
    /// `aprobado`.
    pub fn has_elevated_capability(self) -> bool {
        matches!(self, Self::Administrador)
    }
}

/// Identity and capability of the user driving a transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub actor_id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(actor_id: impl Into<String>, role: ActorRole) -> Self {
        Self {
            actor_id: actor_id.into(),
            role,
        }
    }
}

/// The settlement unit: aggregated, approvable revenue share for one
/// operator in one decena. At most one record per (operator_key, period).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Production {
    pub production_id: String,
    /// Normalized operator grouping key.
    pub operator_key: String,
    /// First-seen original casing, kept for display.
    pub operator_display: String,
    pub period: Period,
    pub trips_matched: u32,
    pub trips_unmatched: u32,
    pub revenue_minor: u64,
    pub ganancia_minor: u64,
    pub status: ProductionStatus,
    pub comment: Option<String>,
    pub validated_by: Option<String>,
    pub validated_at: Option<DateTime<Utc>>,
    pub computed_at: DateTime<Utc>,
}

impl Production {
    pub fn trip_count(&self) -> u32 {
        self.trips_matched + self.trips_unmatched
    }
}

/// How a liquidation was paid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Efectivo,
    Transferencia,
    Cheque,
    Deposito,
}

impl PaymentMethod {
    pub fn name(self) -> &'static str {
        match self {
            Self::Efectivo => "efectivo",
            Self::Transferencia => "transferencia",
            Self::Cheque => "cheque",
            Self::Deposito => "deposito",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "efectivo" => Some(Self::Efectivo),
            "transferencia" => Some(Self::Transferencia),
            "cheque" => Some(Self::Cheque),
            "deposito" => Some(Self::Deposito),
            _ => None,
        }
    }
}

/// A recorded payment against an approved production. Exactly one per
/// production.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Liquidation {
    pub liquidation_id: String,
    pub production_id: String,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
    pub receipt_ref: String,
    pub paid: bool,
    pub registered_at: DateTime<Utc>,
}

impl Liquidation {
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }
}
