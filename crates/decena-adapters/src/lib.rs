//! Source adapters for the decena engine.

#![deny(unsafe_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use decena_core::{DateRange, RouteSegment, SettlementError, Trip, TripSource, Zone, ZoneSource};

/// In-memory trip source backed by a fixed snapshot.
///
/// Delivers only the trips inside the requested range, mimicking a
/// range-scoped import-pipeline query.
#[derive(Debug, Clone, Default)]
pub struct StaticTripSource {
    trips: Vec<Trip>,
}

impl StaticTripSource {
    pub fn new(trips: Vec<Trip>) -> Self {
        Self { trips }
    }
}

#[async_trait]
impl TripSource for StaticTripSource {
    fn source_id(&self) -> &'static str {
        "static-trips"
    }

    async fn fetch_trips(&self, range: &DateRange) -> Result<Vec<Trip>, SettlementError> {
        Ok(self
            .trips
            .iter()
            .filter(|trip| range.contains(trip.travel_date))
            .cloned()
            .collect())
    }
}

/// In-memory zone/segment source backed by a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticZoneSource {
    zones: Vec<Zone>,
    segments: Vec<RouteSegment>,
}

impl StaticZoneSource {
    pub fn new(zones: Vec<Zone>, segments: Vec<RouteSegment>) -> Self {
        Self { zones, segments }
    }
}

#[async_trait]
impl ZoneSource for StaticZoneSource {
    fn source_id(&self) -> &'static str {
        "static-zones"
    }

    async fn fetch_zones(&self) -> Result<Vec<Zone>, SettlementError> {
        Ok(self.zones.clone())
    }

    async fn fetch_segments(&self) -> Result<Vec<RouteSegment>, SettlementError> {
        Ok(self.segments.clone())
    }
}

/// Trip source that always fails, for exercising error paths.
#[derive(Debug, Clone)]
pub struct FailingTripSource {
    reason: String,
}

impl FailingTripSource {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl TripSource for FailingTripSource {
    fn source_id(&self) -> &'static str {
        "failing-trips"
    }

    async fn fetch_trips(&self, _range: &DateRange) -> Result<Vec<Trip>, SettlementError> {
        Err(SettlementError::Storage(self.reason.clone()))
    }
}

fn fixture_date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("fixture date must be valid")
}

fn fixture_trip(
    trip_id: &str,
    travel_date: NaiveDate,
    origin: &str,
    destination: &str,
    operator_name: &str,
    branch_revenue_minor: u64,
    road_revenue_minor: u64,
    manual_income: &str,
) -> Trip {
    Trip {
        trip_id: trip_id.to_string(),
        travel_date,
        origin: origin.to_string(),
        destination: destination.to_string(),
        operator_name: operator_name.to_string(),
        branch_revenue_minor,
        road_revenue_minor,
        manual_income: manual_income.to_string(),
    }
}

/// Deterministic sample fleet for local runs and router tests: two zones
/// over central-Chile corridors, three operators, one unconfigured pair.
pub fn sample_fleet() -> (StaticTripSource, StaticZoneSource) {
    let zones = vec![
        Zone {
            zone_id: "z-centro".to_string(),
            name: "Centro".to_string(),
            commission_bps: 2_000,
        },
        Zone {
            zone_id: "z-maule".to_string(),
            name: "Maule".to_string(),
            commission_bps: 1_250,
        },
    ];

    let segments = vec![
        RouteSegment {
            origin: "Santiago".to_string(),
            destination: "Valparaíso".to_string(),
            zone_id: "z-centro".to_string(),
            distance_km: 116,
        },
        RouteSegment {
            origin: "Santiago".to_string(),
            destination: "Rancagua".to_string(),
            zone_id: "z-centro".to_string(),
            distance_km: 87,
        },
        RouteSegment {
            origin: "Talca".to_string(),
            destination: "Curicó".to_string(),
            zone_id: "z-maule".to_string(),
            distance_km: 66,
        },
    ];

    let trips = vec![
        fixture_trip(
            "trip-0001",
            fixture_date(2024, 7, 2),
            "Santiago",
            "Valparaíso",
            "Transportes Sur",
            80_000,
            15_000,
            "5.000",
        ),
        fixture_trip(
            "trip-0002",
            fixture_date(2024, 7, 4),
            "Valparaíso",
            "Santiago",
            "Transportes Sur",
            70_000,
            10_000,
            "",
        ),
        fixture_trip(
            "trip-0003",
            fixture_date(2024, 7, 5),
            "Rancagua",
            "Santiago",
            "Buses Andinos",
            55_000,
            5_000,
            "",
        ),
        fixture_trip(
            "trip-0004",
            fixture_date(2024, 7, 8),
            "Talca",
            "Curicó",
            "Buses Maule",
            48_000,
            0,
            "2.000",
        ),
        fixture_trip(
            "trip-0005",
            fixture_date(2024, 7, 9),
            "Santiago",
            "Viña del Mar",
            "Buses Andinos",
            62_000,
            0,
            "",
        ),
        fixture_trip(
            "trip-0006",
            fixture_date(2024, 7, 14),
            "Santiago",
            "Valparaíso",
            "Transportes Sur",
            91_000,
            9_000,
            "",
        ),
    ];

    (StaticTripSource::new(trips), StaticZoneSource::new(zones, segments))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_trip_source_filters_by_range() {
        let (trips, _) = sample_fleet();
        let range = DateRange::new(fixture_date(2024, 7, 1), fixture_date(2024, 7, 10));

        let fetched = trips.fetch_trips(&range).await.unwrap();
        assert_eq!(fetched.len(), 5);
        assert!(fetched.iter().all(|trip| range.contains(trip.travel_date)));
    }

    #[tokio::test]
    async fn static_sources_are_deterministic() {
        let (trips, zones) = sample_fleet();
        let range = DateRange::new(fixture_date(2024, 7, 1), fixture_date(2024, 7, 31));

        let first = trips.fetch_trips(&range).await.unwrap();
        let second = trips.fetch_trips(&range).await.unwrap();
        assert_eq!(first, second);

        let zones_a = zones.fetch_zones().await.unwrap();
        let zones_b = zones.fetch_zones().await.unwrap();
        assert_eq!(zones_a, zones_b);
    }

    #[tokio::test]
    async fn failing_source_returns_error() {
        let source = FailingTripSource::new("forced");
        let range = DateRange::new(fixture_date(2024, 7, 1), fixture_date(2024, 7, 10));

        let err = source.fetch_trips(&range).await.unwrap_err();
        assert!(matches!(err, SettlementError::Storage(_)));
    }
}
