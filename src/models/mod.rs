//! Data models for the trip orchestration engine

pub mod location;
pub mod segment;
pub mod trip;

pub use location::Coordinate;
pub use segment::{
    ACCOMMODATION_ORDER, ActivityMetadata, AccommodationMetadata, LocalTransportMetadata,
    OUTBOUND_ORDER, RETURN_ORDER, Segment, SegmentKind, SegmentMetadata, TransportMetadata,
};
pub use trip::{BudgetTier, Currency, TransportMode, TravelStyle, Trip, TripLeg};
