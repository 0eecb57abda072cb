use crate::error::SettlementError;
use crate::normalize::DisplayNames;
use crate::period::Period;
use crate::types::Trip;
use crate::zone::ZoneCatalog;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregated settlement candidate for one operator in one period, before
/// persistence assigns identity and workflow state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductionCandidate {
    pub operator_key: String,
    pub operator_display: String,
    pub period: Period,
    pub trips_matched: u32,
    pub trips_unmatched: u32,
    pub revenue_minor: u64,
    pub ganancia_minor: u64,
}

/// Diagnostic record for a trip whose city pair has no configured zone.
/// The trip is still counted; it contributes zero commission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnmatchedTrip {
    pub trip_id: String,
    pub travel_date: NaiveDate,
    pub origin: String,
    pub destination: String,
    pub operator_name: String,
}

/// Full result of one allocation pass over a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllocationOutcome {
    pub period: Period,
    pub candidates: Vec<ProductionCandidate>,
    pub unmatched: Vec<UnmatchedTrip>,
    /// blake3 over the canonical serialized outcome. Identical snapshots
    /// produce identical hashes.
    pub snapshot_hash: String,
}

#[derive(Debug, Default)]
struct OperatorAccumulator {
    trips_matched: u32,
    trips_unmatched: u32,
    revenue_minor: u64,
    ganancia_minor: u64,
}

/// Deterministic allocation over a snapshot of trips and zone
/// configuration.
///
/// Trips outside the period window are ignored. Grouping runs on
/// normalized operator names; accumulation is integer arithmetic only, so
/// the numeric result is independent of trip order.
pub fn allocate_period(
    trips: &[Trip],
    catalog: &ZoneCatalog,
    period: Period,
) -> Result<AllocationOutcome, SettlementError> {
    let range = period.date_range();
    let mut names = DisplayNames::new();
    let mut groups: BTreeMap<String, OperatorAccumulator> = BTreeMap::new();
    let mut unmatched = Vec::new();

    for trip in trips {
        if !range.contains(trip.travel_date) {
            continue;
        }

        let operator_key = names.observe(&trip.operator_name);
        let group = groups.entry(operator_key).or_default();
        let revenue = trip.total_revenue_minor();
        group.revenue_minor = group.revenue_minor.saturating_add(revenue);

        match catalog.match_zone(&trip.origin, &trip.destination) {
            Some(zone) => {
                group.trips_matched += 1;
                group.ganancia_minor = group
                    .ganancia_minor
                    .saturating_add(revenue.saturating_mul(zone.commission_bps as u64) / 10_000);
            }
            None => {
                group.trips_unmatched += 1;
                unmatched.push(UnmatchedTrip {
                    trip_id: trip.trip_id.clone(),
                    travel_date: trip.travel_date,
                    origin: trip.origin.clone(),
                    destination: trip.destination.clone(),
                    operator_name: trip.operator_name.clone(),
                });
            }
        }
    }

    let candidates = groups
        .into_iter()
        .map(|(operator_key, group)| ProductionCandidate {
            operator_display: names
                .display(&operator_key)
                .unwrap_or(operator_key.as_str())
                .to_string(),
            operator_key,
            period,
            trips_matched: group.trips_matched,
            trips_unmatched: group.trips_unmatched,
            revenue_minor: group.revenue_minor,
            ganancia_minor: group.ganancia_minor,
        })
        .collect::<Vec<_>>();

    unmatched.sort_by(|a, b| {
        (a.travel_date, a.trip_id.as_str()).cmp(&(b.travel_date, b.trip_id.as_str()))
    });

    let snapshot_hash = outcome_hash(period, &candidates, &unmatched)?;

    Ok(AllocationOutcome {
        period,
        candidates,
        unmatched,
        snapshot_hash,
    })
}

fn outcome_hash(
    period: Period,
    candidates: &[ProductionCandidate],
    unmatched: &[UnmatchedTrip],
) -> Result<String, SettlementError> {
    let bytes = serde_json::to_vec(&(period, candidates, unmatched))
        .map_err(|e| SettlementError::Serialization(format!("allocation encode failed: {e}")))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}
