use crate::allocation::ProductionCandidate;
use crate::error::SettlementError;
use crate::period::Period;
use crate::types::{Actor, Liquidation, PaymentMethod, Production, ProductionStatus};
use crate::validation::apply_transition;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Production/liquidation persistence backend configuration.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// Keep all settlement state in process memory only.
    Memory,
    /// Persist state in PostgreSQL and hydrate on startup.
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self::Memory
    }

    pub fn postgres(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self::Postgres {
            database_url: database_url.into(),
            max_connections,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres { .. } => "postgres",
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Memory
    }
}

#[derive(Debug, Clone)]
enum StorageBackend {
    Memory,
    Postgres(PostgresSettlementStore),
}

/// Audit record emitted when recomputation would have changed an approved
/// production. The stored figure stays pinned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApprovedDrift {
    pub production_id: String,
    pub operator_key: String,
    pub stored_ganancia_minor: u64,
    pub computed_ganancia_minor: u64,
}

/// Result of upserting one allocation candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(Production),
    Updated(Production),
    /// The stored record is approved and untouchable by recomputation.
    Pinned {
        production: Production,
        drift: Option<ApprovedDrift>,
    },
}

impl UpsertOutcome {
    pub fn production(&self) -> &Production {
        match self {
            Self::Created(production) | Self::Updated(production) => production,
            Self::Pinned { production, .. } => production,
        }
    }

    pub fn wrote(&self) -> bool {
        matches!(self, Self::Created(_) | Self::Updated(_))
    }
}

/// Settlement state store.
///
/// In-memory maps are authoritative; PostgreSQL, when configured, is a
/// mirror hydrated at bootstrap. Mutations persist to the mirror before
/// committing in memory, and every mirror write carries a status guard so
/// concurrent processes cannot overwrite an approval.
#[derive(Debug, Clone)]
pub struct SettlementStore {
    productions: BTreeMap<(String, Period), Production>,
    by_id: BTreeMap<String, (String, Period)>,
    liquidations: BTreeMap<String, Liquidation>,
    backend: StorageBackend,
}

impl SettlementStore {
    pub async fn bootstrap(config: StorageConfig) -> Result<Self, SettlementError> {
        match config {
            StorageConfig::Memory => Ok(Self {
                productions: BTreeMap::new(),
                by_id: BTreeMap::new(),
                liquidations: BTreeMap::new(),
                backend: StorageBackend::Memory,
            }),
            StorageConfig::Postgres {
                database_url,
                max_connections,
            } => {
                let store = PostgresSettlementStore::connect(&database_url, max_connections).await?;
                store.ensure_schema().await?;

                let mut productions = BTreeMap::new();
                let mut by_id = BTreeMap::new();
                for production in store.load_productions().await? {
                    let key = (production.operator_key.clone(), production.period);
                    by_id.insert(production.production_id.clone(), key.clone());
                    productions.insert(key, production);
                }

                let mut liquidations = BTreeMap::new();
                for liquidation in store.load_liquidations().await? {
                    liquidations.insert(liquidation.production_id.clone(), liquidation);
                }

                Ok(Self {
                    productions,
                    by_id,
                    liquidations,
                    backend: StorageBackend::Postgres(store),
                })
            }
        }
    }

    pub fn backend_label(&self) -> &'static str {
        match self.backend {
            StorageBackend::Memory => "memory",
            StorageBackend::Postgres(_) => "postgres",
        }
    }

    /// Upsert one allocation candidate.
    ///
    /// Missing records are created as `pendiente`. Existing non-approved
    /// records get fresh counts, revenue, and ganancia while workflow
    /// fields survive. Approved records are never written; a differing
    /// computed ganancia is reported as drift.
    pub async fn upsert_candidate(
        &mut self,
        candidate: &ProductionCandidate,
        computed_at: DateTime<Utc>,
    ) -> Result<UpsertOutcome, SettlementError> {
        let key = (candidate.operator_key.clone(), candidate.period);

        if let Some(stored) = self.productions.get(&key) {
            if stored.status.is_approved() {
                let drift = (stored.ganancia_minor != candidate.ganancia_minor).then(|| {
                    ApprovedDrift {
                        production_id: stored.production_id.clone(),
                        operator_key: stored.operator_key.clone(),
                        stored_ganancia_minor: stored.ganancia_minor,
                        computed_ganancia_minor: candidate.ganancia_minor,
                    }
                });
                return Ok(UpsertOutcome::Pinned {
                    production: stored.clone(),
                    drift,
                });
            }

            let mut updated = stored.clone();
            updated.operator_display = candidate.operator_display.clone();
            updated.trips_matched = candidate.trips_matched;
            updated.trips_unmatched = candidate.trips_unmatched;
            updated.revenue_minor = candidate.revenue_minor;
            updated.ganancia_minor = candidate.ganancia_minor;
            updated.computed_at = computed_at;

            if let StorageBackend::Postgres(store) = &self.backend {
                store.update_production_metrics(&updated).await?;
            }

            self.productions.insert(key, updated.clone());
            return Ok(UpsertOutcome::Updated(updated));
        }

        let production = Production {
            production_id: Uuid::new_v4().to_string(),
            operator_key: candidate.operator_key.clone(),
            operator_display: candidate.operator_display.clone(),
            period: candidate.period,
            trips_matched: candidate.trips_matched,
            trips_unmatched: candidate.trips_unmatched,
            revenue_minor: candidate.revenue_minor,
            ganancia_minor: candidate.ganancia_minor,
            status: ProductionStatus::Pendiente,
            comment: None,
            validated_by: None,
            validated_at: None,
            computed_at,
        };

        if let StorageBackend::Postgres(store) = &self.backend {
            store.insert_production(&production).await?;
        }

        self.by_id
            .insert(production.production_id.clone(), key.clone());
        self.productions.insert(key, production.clone());
        Ok(UpsertOutcome::Created(production))
    }

    /// Apply a validation transition under a compare-and-set on the
    /// record's current status.
    pub async fn transition(
        &mut self,
        production_id: &str,
        new_status: ProductionStatus,
        comment: Option<&str>,
        actor: &Actor,
        at: DateTime<Utc>,
    ) -> Result<Production, SettlementError> {
        let key = self
            .by_id
            .get(production_id)
            .cloned()
            .ok_or_else(|| SettlementError::ProductionNotFound(production_id.to_string()))?;
        let stored = self
            .productions
            .get(&key)
            .ok_or_else(|| SettlementError::ProductionNotFound(production_id.to_string()))?;

        let expected_status = stored.status;
        let mut updated = stored.clone();
        apply_transition(&mut updated, new_status, comment, actor, at)?;

        if let StorageBackend::Postgres(store) = &self.backend {
            store
                .update_production_state(&updated, expected_status)
                .await?;
        }

        self.productions.insert(key, updated.clone());
        Ok(updated)
    }

    pub fn get(&self, production_id: &str) -> Option<&Production> {
        self.by_id
            .get(production_id)
            .and_then(|key| self.productions.get(key))
    }

    pub fn list_by_period(&self, period: Period) -> Vec<Production> {
        self.productions
            .values()
            .filter(|production| production.period == period)
            .cloned()
            .collect()
    }

    pub fn list_payable(&self, period: Period) -> Vec<Production> {
        self.productions
            .values()
            .filter(|production| production.period == period && production.status.is_approved())
            .cloned()
            .collect()
    }

    /// Register a payment against an approved production. At most one
    /// liquidation may exist per production.
    pub async fn register_liquidation(
        &mut self,
        production_id: &str,
        payment_date: NaiveDate,
        method: PaymentMethod,
        receipt_ref: &str,
        paid: bool,
        registered_at: DateTime<Utc>,
    ) -> Result<Liquidation, SettlementError> {
        let production = self
            .get(production_id)
            .ok_or_else(|| SettlementError::ProductionNotFound(production_id.to_string()))?;

        if !production.status.is_approved() {
            return Err(SettlementError::NotApproved(production_id.to_string()));
        }
        if self.liquidations.contains_key(production_id) {
            return Err(SettlementError::DuplicatePayment(production_id.to_string()));
        }

        let liquidation = Liquidation {
            liquidation_id: Liquidation::new_id(),
            production_id: production_id.to_string(),
            payment_date,
            method,
            receipt_ref: receipt_ref.to_string(),
            paid,
            registered_at,
        };

        if let StorageBackend::Postgres(store) = &self.backend {
            store.insert_liquidation(&liquidation).await?;
        }

        self.liquidations
            .insert(liquidation.production_id.clone(), liquidation.clone());
        Ok(liquidation)
    }

    pub fn liquidation_for(&self, production_id: &str) -> Option<&Liquidation> {
        self.liquidations.get(production_id)
    }

    pub fn list_liquidations(&self, period: Period) -> Vec<Liquidation> {
        self.productions
            .values()
            .filter(|production| production.period == period)
            .filter_map(|production| self.liquidations.get(&production.production_id))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone)]
struct PostgresSettlementStore {
    pool: PgPool,
}

impl PostgresSettlementStore {
    async fn connect(database_url: &str, max_connections: u32) -> Result<Self, SettlementError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await
            .map_err(|e| SettlementError::Storage(format!("postgres connect failed: {e}")))?;

        Ok(Self { pool })
    }

    async fn ensure_schema(&self) -> Result<(), SettlementError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS decena_productions (
                production_id TEXT PRIMARY KEY,
                operator_key TEXT NOT NULL,
                operator_display TEXT NOT NULL,
                period TEXT NOT NULL,
                trips_matched BIGINT NOT NULL,
                trips_unmatched BIGINT NOT NULL,
                revenue_minor BIGINT NOT NULL,
                ganancia_minor BIGINT NOT NULL,
                status TEXT NOT NULL,
                comment TEXT NULL,
                validated_by TEXT NULL,
                validated_at TIMESTAMPTZ NULL,
                computed_at TIMESTAMPTZ NOT NULL,
                UNIQUE (operator_key, period)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SettlementError::Storage(format!("postgres schema create failed: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_decena_productions_period ON decena_productions (period)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SettlementError::Storage(format!("postgres index create failed: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS decena_liquidations (
                liquidation_id TEXT PRIMARY KEY,
                production_id TEXT NOT NULL UNIQUE
                    REFERENCES decena_productions (production_id),
                payment_date DATE NOT NULL,
                method TEXT NOT NULL,
                receipt_ref TEXT NOT NULL,
                paid BOOLEAN NOT NULL,
                registered_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SettlementError::Storage(format!("postgres schema create failed: {e}")))?;

        Ok(())
    }

    async fn load_productions(&self) -> Result<Vec<Production>, SettlementError> {
        let rows = sqlx::query(
            r#"
            SELECT
                production_id,
                operator_key,
                operator_display,
                period,
                trips_matched,
                trips_unmatched,
                revenue_minor,
                ganancia_minor,
                status,
                comment,
                validated_by,
                validated_at,
                computed_at
            FROM decena_productions
            ORDER BY operator_key ASC, period ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SettlementError::Storage(format!("postgres load failed: {e}")))?;

        let mut productions = Vec::with_capacity(rows.len());
        for row in rows {
            let period_str: String = decode(&row, "period")?;
            let period = period_str
                .parse::<Period>()
                .map_err(|e| SettlementError::Storage(format!("stored period invalid: {e}")))?;

            let status_str: String = decode(&row, "status")?;
            let status = ProductionStatus::parse(&status_str).ok_or_else(|| {
                SettlementError::Storage(format!("unknown stored status '{status_str}'"))
            })?;

            productions.push(Production {
                production_id: decode(&row, "production_id")?,
                operator_key: decode(&row, "operator_key")?,
                operator_display: decode(&row, "operator_display")?,
                period,
                trips_matched: decode_count(&row, "trips_matched")?,
                trips_unmatched: decode_count(&row, "trips_unmatched")?,
                revenue_minor: decode_amount(&row, "revenue_minor")?,
                ganancia_minor: decode_amount(&row, "ganancia_minor")?,
                status,
                comment: decode(&row, "comment")?,
                validated_by: decode(&row, "validated_by")?,
                validated_at: decode(&row, "validated_at")?,
                computed_at: decode(&row, "computed_at")?,
            });
        }

        Ok(productions)
    }

    async fn load_liquidations(&self) -> Result<Vec<Liquidation>, SettlementError> {
        let rows = sqlx::query(
            r#"
            SELECT
                liquidation_id,
                production_id,
                payment_date,
                method,
                receipt_ref,
                paid,
                registered_at
            FROM decena_liquidations
            ORDER BY registered_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SettlementError::Storage(format!("postgres load failed: {e}")))?;

        let mut liquidations = Vec::with_capacity(rows.len());
        for row in rows {
            let method_str: String = decode(&row, "method")?;
            let method = PaymentMethod::parse(&method_str).ok_or_else(|| {
                SettlementError::Storage(format!("unknown stored method '{method_str}'"))
            })?;

            liquidations.push(Liquidation {
                liquidation_id: decode(&row, "liquidation_id")?,
                production_id: decode(&row, "production_id")?,
                payment_date: decode(&row, "payment_date")?,
                method,
                receipt_ref: decode(&row, "receipt_ref")?,
                paid: decode(&row, "paid")?,
                registered_at: decode(&row, "registered_at")?,
            });
        }

        Ok(liquidations)
    }

    async fn insert_production(&self, production: &Production) -> Result<(), SettlementError> {
        sqlx::query(
            r#"
            INSERT INTO decena_productions (
                production_id,
                operator_key,
                operator_display,
                period,
                trips_matched,
                trips_unmatched,
                revenue_minor,
                ganancia_minor,
                status,
                comment,
                validated_by,
                validated_at,
                computed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(&production.production_id)
        .bind(&production.operator_key)
        .bind(&production.operator_display)
        .bind(production.period.to_string())
        .bind(production.trips_matched as i64)
        .bind(production.trips_unmatched as i64)
        .bind(encode_amount(production.revenue_minor)?)
        .bind(encode_amount(production.ganancia_minor)?)
        .bind(production.status.name())
        .bind(&production.comment)
        .bind(&production.validated_by)
        .bind(production.validated_at)
        .bind(production.computed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| SettlementError::Storage(format!("postgres insert failed: {e}")))?;

        Ok(())
    }

    /// Recomputation write, guarded so a concurrently approved row is
    /// never overwritten.
    async fn update_production_metrics(
        &self,
        production: &Production,
    ) -> Result<(), SettlementError> {
        let result = sqlx::query(
            r#"
            UPDATE decena_productions SET
                operator_display = $2,
                trips_matched = $3,
                trips_unmatched = $4,
                revenue_minor = $5,
                ganancia_minor = $6,
                computed_at = $7
            WHERE production_id = $1 AND status <> 'aprobado'
            "#,
        )
        .bind(&production.production_id)
        .bind(&production.operator_display)
        .bind(production.trips_matched as i64)
        .bind(production.trips_unmatched as i64)
        .bind(encode_amount(production.revenue_minor)?)
        .bind(encode_amount(production.ganancia_minor)?)
        .bind(production.computed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| SettlementError::Storage(format!("postgres update failed: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(SettlementError::Storage(format!(
                "production '{}' changed concurrently during recomputation",
                production.production_id
            )));
        }

        Ok(())
    }

    /// Transition write, compare-and-set on the status observed in memory.
    async fn update_production_state(
        &self,
        production: &Production,
        expected_status: ProductionStatus,
    ) -> Result<(), SettlementError> {
        let result = sqlx::query(
            r#"
            UPDATE decena_productions SET
                status = $3,
                comment = $4,
                validated_by = $5,
                validated_at = $6
            WHERE production_id = $1 AND status = $2
            "#,
        )
        .bind(&production.production_id)
        .bind(expected_status.name())
        .bind(production.status.name())
        .bind(&production.comment)
        .bind(&production.validated_by)
        .bind(production.validated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| SettlementError::Storage(format!("postgres update failed: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(SettlementError::Storage(format!(
                "production '{}' changed concurrently during transition",
                production.production_id
            )));
        }

        Ok(())
    }

    async fn insert_liquidation(&self, liquidation: &Liquidation) -> Result<(), SettlementError> {
        sqlx::query(
            r#"
            INSERT INTO decena_liquidations (
                liquidation_id,
                production_id,
                payment_date,
                method,
                receipt_ref,
                paid,
                registered_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&liquidation.liquidation_id)
        .bind(&liquidation.production_id)
        .bind(liquidation.payment_date)
        .bind(liquidation.method.name())
        .bind(&liquidation.receipt_ref)
        .bind(liquidation.paid)
        .bind(liquidation.registered_at)
        .execute(&self.pool)
        .await
        .map_err(|e| SettlementError::Storage(format!("postgres insert failed: {e}")))?;

        Ok(())
    }
}

fn decode<'r, T>(row: &'r sqlx::postgres::PgRow, column: &str) -> Result<T, SettlementError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| SettlementError::Storage(format!("postgres decode {column} failed: {e}")))
}

fn decode_count(row: &sqlx::postgres::PgRow, column: &str) -> Result<u32, SettlementError> {
    let value: i64 = decode(row, column)?;
    value
        .try_into()
        .map_err(|_| SettlementError::Storage(format!("stored {column} out of range")))
}

fn decode_amount(row: &sqlx::postgres::PgRow, column: &str) -> Result<u64, SettlementError> {
    let value: i64 = decode(row, column)?;
    value
        .try_into()
        .map_err(|_| SettlementError::Storage(format!("stored {column} is negative")))
}

fn encode_amount(value: u64) -> Result<i64, SettlementError> {
    value
        .try_into()
        .map_err(|_| SettlementError::Storage("amount exceeds postgres BIGINT range".to_string()))
}
