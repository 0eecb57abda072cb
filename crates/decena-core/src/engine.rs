use crate::allocation::{allocate_period, UnmatchedTrip};
use crate::error::SettlementError;
use crate::period::Period;
use crate::sources::{TripSource, ZoneSource};
use crate::storage::{ApprovedDrift, SettlementStore, StorageConfig, UpsertOutcome};
use crate::types::{Actor, Liquidation, PaymentMethod, Production, ProductionStatus};
use crate::zone::ZoneCatalog;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

/// Settlement engine configuration.
#[derive(Debug, Clone)]
pub struct SettlementEngineConfig {
    pub storage: StorageConfig,
    /// Month window enumerated by `recent_periods`.
    pub recent_period_months: u32,
}

impl Default for SettlementEngineConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::Memory,
            recent_period_months: 6,
        }
    }
}

/// Result of one explicit recomputation command for a period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeOutcome {
    pub period: Period,
    /// Candidates written (created or updated); pinned records are not
    /// counted.
    pub generated: usize,
    pub productions: Vec<Production>,
    pub unmatched: Vec<UnmatchedTrip>,
    pub drift: Vec<ApprovedDrift>,
    pub snapshot_hash: String,
}

/// Payment registration request consumed by the release gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub production_id: String,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
    pub receipt_ref: String,
    pub paid: bool,
}

/// Production allocation and validation engine over snapshot sources.
///
/// Computation is a pure pass over one snapshot of trips and zone
/// configuration; the store is the only stateful boundary. A single async
/// mutex serializes store mutations in-process; the PostgreSQL mirror adds
/// its own status guards for cross-process writers.
pub struct SettlementEngine {
    trip_source: Arc<dyn TripSource>,
    zone_source: Arc<dyn ZoneSource>,
    store: AsyncMutex<SettlementStore>,
    config: SettlementEngineConfig,
}

impl SettlementEngine {
    pub async fn bootstrap(
        trip_source: Arc<dyn TripSource>,
        zone_source: Arc<dyn ZoneSource>,
        config: SettlementEngineConfig,
    ) -> Result<Self, SettlementError> {
        let store = SettlementStore::bootstrap(config.storage.clone()).await?;
        Ok(Self {
            trip_source,
            zone_source,
            store: AsyncMutex::new(store),
            config,
        })
    }

    pub async fn storage_backend(&self) -> &'static str {
        self.store.lock().await.backend_label()
    }

    /// Recompute all productions for one period from a fresh snapshot.
    ///
    /// Upserts every candidate: non-approved records are refreshed,
    /// approved records stay pinned and surface drift diagnostics. The
    /// returned productions are the stored records for the period after
    /// the upsert pass.
    pub async fn compute_productions(
        &self,
        period: Period,
    ) -> Result<ComputeOutcome, SettlementError> {
        let range = period.date_range();
        let trips = self.trip_source.fetch_trips(&range).await?;
        let zones = self.zone_source.fetch_zones().await?;
        let segments = self.zone_source.fetch_segments().await?;
        let catalog = ZoneCatalog::new(zones, segments);

        let outcome = allocate_period(&trips, &catalog, period)?;
        let computed_at = Utc::now();

        let mut store = self.store.lock().await;
        let mut generated = 0;
        let mut drift = Vec::new();
        for candidate in &outcome.candidates {
            let upsert = store.upsert_candidate(candidate, computed_at).await?;
            if upsert.wrote() {
                generated += 1;
            }
            if let UpsertOutcome::Pinned {
                drift: Some(record),
                ..
            } = upsert
            {
                drift.push(record);
            }
        }

        Ok(ComputeOutcome {
            period,
            generated,
            productions: store.list_by_period(period),
            unmatched: outcome.unmatched,
            drift,
            snapshot_hash: outcome.snapshot_hash,
        })
    }

    pub async fn transition_production(
        &self,
        production_id: &str,
        new_status: ProductionStatus,
        comment: Option<&str>,
        actor: &Actor,
    ) -> Result<Production, SettlementError> {
        let mut store = self.store.lock().await;
        store
            .transition(production_id, new_status, comment, actor, Utc::now())
            .await
    }

    pub async fn get_production(&self, production_id: &str) -> Option<Production> {
        self.store.lock().await.get(production_id).cloned()
    }

    pub async fn list_productions(&self, period: Period) -> Vec<Production> {
        self.store.lock().await.list_by_period(period)
    }

    pub async fn list_payable(&self, period: Period) -> Vec<Production> {
        self.store.lock().await.list_payable(period)
    }

    pub async fn register_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<Liquidation, SettlementError> {
        let mut store = self.store.lock().await;
        store
            .register_liquidation(
                &request.production_id,
                request.payment_date,
                request.method,
                &request.receipt_ref,
                request.paid,
                Utc::now(),
            )
            .await
    }

    pub async fn list_liquidations(&self, period: Period) -> Vec<Liquidation> {
        self.store.lock().await.list_liquidations(period)
    }

    pub fn recent_periods(&self, today: NaiveDate) -> Vec<Period> {
        Period::recent(today, self.config.recent_period_months)
    }

    pub fn recent_periods_over(&self, today: NaiveDate, months: u32) -> Vec<Period> {
        Period::recent(today, months)
    }
}
