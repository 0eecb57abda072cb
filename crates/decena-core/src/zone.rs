use crate::error::SettlementError;
use crate::normalize::normalize_name;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named commission bucket tying route segments to a rate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Zone {
    pub zone_id: String,
    pub name: String,
    /// Commission rate in basis points (10_000 = 100%).
    pub commission_bps: u32,
}

impl Zone {
    /// Build a zone from a percentage rate in [0, 100]. Fractional
    /// percentages keep two decimals of precision.
    pub fn from_percent(
        zone_id: impl Into<String>,
        name: impl Into<String>,
        percent: f64,
    ) -> Result<Self, SettlementError> {
        Ok(Self {
            zone_id: zone_id.into(),
            name: name.into(),
            commission_bps: commission_bps_from_percent(percent)?,
        })
    }
}

/// A directed (origin, destination) pair belonging to exactly one zone.
/// Matching treats the pair as undirected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteSegment {
    pub origin: String,
    pub destination: String,
    pub zone_id: String,
    pub distance_km: u32,
}

pub fn commission_bps_from_percent(percent: f64) -> Result<u32, SettlementError> {
    if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
        return Err(SettlementError::ZoneConfig(format!(
            "commission percentage {percent} outside [0, 100]"
        )));
    }
    Ok((percent * 100.0).round() as u32)
}

#[derive(Debug, Clone)]
struct MatchSegment {
    origin_key: String,
    destination_key: String,
    zone_id: String,
}

/// Zone configuration snapshot with undirected segment matching.
///
/// Segments are scanned in configuration order and the first match wins, so
/// duplicate pairs across zones resolve deterministically. Segments naming
/// an unknown zone id can never resolve and are dropped at construction.
#[derive(Debug, Clone, Default)]
pub struct ZoneCatalog {
    zones: BTreeMap<String, Zone>,
    segments: Vec<MatchSegment>,
}

impl ZoneCatalog {
    pub fn new(zones: Vec<Zone>, segments: Vec<RouteSegment>) -> Self {
        let zones: BTreeMap<String, Zone> = zones
            .into_iter()
            .map(|zone| (zone.zone_id.clone(), zone))
            .collect();

        let segments = segments
            .into_iter()
            .filter(|segment| zones.contains_key(&segment.zone_id))
            .map(|segment| MatchSegment {
                origin_key: normalize_name(&segment.origin),
                destination_key: normalize_name(&segment.destination),
                zone_id: segment.zone_id,
            })
            .collect();

        Self { zones, segments }
    }

    /// Find the zone covering an (origin, destination) pair in either
    /// direction. `None` means no configured segment covers the pair.
    pub fn match_zone(&self, origin: &str, destination: &str) -> Option<&Zone> {
        let origin_key = normalize_name(origin);
        let destination_key = normalize_name(destination);

        self.segments
            .iter()
            .find(|segment| {
                (segment.origin_key == origin_key && segment.destination_key == destination_key)
                    || (segment.origin_key == destination_key
                        && segment.destination_key == origin_key)
            })
            .and_then(|segment| self.zones.get(&segment.zone_id))
    }

    pub fn zone(&self, zone_id: &str) -> Option<&Zone> {
        self.zones.get(zone_id)
    }

    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(origin: &str, destination: &str, zone_id: &str) -> RouteSegment {
        RouteSegment {
            origin: origin.to_string(),
            destination: destination.to_string(),
            zone_id: zone_id.to_string(),
            distance_km: 100,
        }
    }

    fn catalog() -> ZoneCatalog {
        ZoneCatalog::new(
            vec![
                Zone::from_percent("z-centro", "Centro", 20.0).unwrap(),
                Zone::from_percent("z-sur", "Sur", 12.5).unwrap(),
            ],
            vec![
                segment("Santiago", "Valparaíso", "z-centro"),
                segment("Santiago", "Rancagua", "z-sur"),
            ],
        )
    }

    #[test]
    fn matching_is_direction_agnostic() {
        let catalog = catalog();
        let forward = catalog.match_zone("Santiago", "Valparaíso").unwrap();
        let reverse = catalog.match_zone("Valparaíso", "Santiago").unwrap();
        assert_eq!(forward.zone_id, "z-centro");
        assert_eq!(reverse.zone_id, "z-centro");
    }

    #[test]
    fn matching_is_insensitive_to_case_diacritics_whitespace() {
        let catalog = catalog();
        let zone = catalog.match_zone("  valparaiso ", "SANTIAGO").unwrap();
        assert_eq!(zone.zone_id, "z-centro");
    }

    #[test]
    fn unconfigured_pair_returns_none() {
        let catalog = catalog();
        assert!(catalog.match_zone("Santiago", "Viña del Mar").is_none());
    }

    #[test]
    fn duplicate_pairs_resolve_to_first_configured_segment() {
        let catalog = ZoneCatalog::new(
            vec![
                Zone::from_percent("z-a", "A", 10.0).unwrap(),
                Zone::from_percent("z-b", "B", 30.0).unwrap(),
            ],
            vec![
                segment("Talca", "Curicó", "z-a"),
                segment("Curicó", "Talca", "z-b"),
            ],
        );
        assert_eq!(catalog.match_zone("Talca", "Curicó").unwrap().zone_id, "z-a");
        assert_eq!(catalog.match_zone("Curicó", "Talca").unwrap().zone_id, "z-a");
    }

    #[test]
    fn segments_with_unknown_zone_are_dropped() {
        let catalog = ZoneCatalog::new(
            vec![Zone::from_percent("z-a", "A", 10.0).unwrap()],
            vec![
                segment("Talca", "Linares", "z-missing"),
                segment("Talca", "Curicó", "z-a"),
            ],
        );
        assert_eq!(catalog.segment_count(), 1);
        assert!(catalog.match_zone("Talca", "Linares").is_none());
    }

    #[test]
    fn percent_conversion_validates_bounds() {
        assert_eq!(commission_bps_from_percent(20.0).unwrap(), 2000);
        assert_eq!(commission_bps_from_percent(12.5).unwrap(), 1250);
        assert_eq!(commission_bps_from_percent(0.0).unwrap(), 0);
        assert_eq!(commission_bps_from_percent(100.0).unwrap(), 10_000);
        assert!(commission_bps_from_percent(-1.0).is_err());
        assert!(commission_bps_from_percent(100.5).is_err());
        assert!(commission_bps_from_percent(f64::NAN).is_err());
    }
}
