//! `TripWeaver` - Budget-aware trip orchestration
//!
//! This library plans multi-leg trips end to end: it splits a total budget
//! into spending envelopes, picks transport modes and costs, geocodes
//! generated activities, applies feasibility corrections, and reconciles
//! actual spending against the plan.

pub mod booking;
pub mod budget;
pub mod cache;
pub mod config;
pub mod error;
pub mod feasibility;
pub mod geocode;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod provider;
pub mod routing;
pub mod transport;

// Re-export core types for public API
pub use booking::{BookingOption, DEMO_DISCLAIMER};
pub use budget::{BudgetAllocation, BudgetCategory, ReconciliationReport};
pub use cache::{CacheStore, MemoryCache, PersistentCache};
pub use config::TripWeaverConfig;
pub use error::TripWeaverError;
pub use geocode::{GeocodeResolver, GeocodingApi, OpenMeteoGeocoder};
pub use models::{
    BudgetTier, Coordinate, Currency, Segment, SegmentKind, TransportMode, TravelStyle, Trip,
    TripLeg,
};
pub use orchestrator::{OrchestrationResult, Orchestrator};
pub use provider::{SuggestionProvider, SuggestionRequest, SuggestionResponse};
pub use routing::{GraphHopperClient, RoutingApi};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, TripWeaverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
