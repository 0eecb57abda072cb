//! Decena settlement core.
//!
//! This crate implements the production allocation and validation engine
//! for ten-day bus settlement periods: deterministic zone-commission
//! allocation over trip snapshots, a role-gated approval workflow, and a
//! payment release gate over approved productions.

#![deny(unsafe_code)]

pub mod allocation;
pub mod engine;
pub mod error;
pub mod normalize;
pub mod period;
pub mod sources;
pub mod storage;
pub mod types;
pub mod validation;
pub mod zone;

pub use allocation::{allocate_period, AllocationOutcome, ProductionCandidate, UnmatchedTrip};
pub use engine::{ComputeOutcome, PaymentRequest, SettlementEngine, SettlementEngineConfig};
pub use error::SettlementError;
pub use normalize::{normalize_name, DisplayNames};
pub use period::{DateRange, Period};
pub use sources::{TripSource, ZoneSource};
pub use storage::{ApprovedDrift, SettlementStore, StorageConfig, UpsertOutcome};
pub use types::{
    parse_manual_income_minor, Actor, ActorRole, Liquidation, PaymentMethod, Production,
    ProductionStatus, Trip,
};
pub use validation::apply_transition;
pub use zone::{commission_bps_from_percent, RouteSegment, Zone, ZoneCatalog};
