use crate::error::SettlementError;
use crate::period::DateRange;
use crate::types::Trip;
use crate::zone::{RouteSegment, Zone};
use async_trait::async_trait;

/// Snapshot provider for imported trips. The import pipeline owns the
/// data; the engine only reads it.
#[async_trait]
pub trait TripSource: Send + Sync {
    fn source_id(&self) -> &'static str;

    /// Trips whose travel date falls inside `range`. Sources may
    /// over-deliver; the allocator filters again.
    async fn fetch_trips(&self, range: &DateRange) -> Result<Vec<Trip>, SettlementError>;
}

/// Snapshot provider for zone and route-segment configuration.
#[async_trait]
pub trait ZoneSource: Send + Sync {
    fn source_id(&self) -> &'static str;

    async fn fetch_zones(&self) -> Result<Vec<Zone>, SettlementError>;

    async fn fetch_segments(&self) -> Result<Vec<RouteSegment>, SettlementError>;
}
