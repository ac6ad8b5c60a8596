//! Trip input model
//!
//! A [`Trip`] is created by the caller and read-only to the engine. It carries
//! the budget, the ordered destination legs, traveler preferences, and the
//! currency of record.

use serde::{Deserialize, Serialize};

/// Coarse budget positioning, selects ratio tables and cost ceilings
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BudgetTier {
    Budget,
    /// Canonical external spelling is "mid-range" on every surface
    #[serde(rename = "mid-range")]
    MidRange,
    Luxury,
}

impl BudgetTier {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetTier::Budget => "budget",
            BudgetTier::MidRange => "mid-range",
            BudgetTier::Luxury => "luxury",
        }
    }
}

/// Travel style, drives activity caps and the road-trip transport rules
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TravelStyle {
    Relaxation,
    CityExplorer,
    Adventure,
    Business,
    RoadTrip,
}

impl TravelStyle {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelStyle::Relaxation => "relaxation",
            TravelStyle::CityExplorer => "city_explorer",
            TravelStyle::Adventure => "adventure",
            TravelStyle::Business => "business",
            TravelStyle::RoadTrip => "road_trip",
        }
    }
}

/// Transport mode for travel segments
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Flight,
    Train,
    Bus,
    Car,
    Bike,
}

impl TransportMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Flight => "flight",
            TransportMode::Train => "train",
            TransportMode::Bus => "bus",
            TransportMode::Car => "car",
            TransportMode::Bike => "bike",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "flight" => Some(TransportMode::Flight),
            "train" => Some(TransportMode::Train),
            "bus" => Some(TransportMode::Bus),
            "car" => Some(TransportMode::Car),
            "bike" => Some(TransportMode::Bike),
            _ => None,
        }
    }

    /// Modes covered by the traveler's own vehicle
    #[must_use]
    pub fn is_own_vehicle(&self) -> bool {
        matches!(self, TransportMode::Car | TransportMode::Bike)
    }
}

/// Currency of record for a trip. `exchange_rate` is units per USD.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Currency {
    /// ISO 4217 code, e.g. "EUR"
    pub code: String,
    /// Units of this currency per US dollar
    pub exchange_rate: f64,
}

impl Currency {
    #[must_use]
    pub fn new<S: Into<String>>(code: S, exchange_rate: f64) -> Self {
        Self {
            code: code.into(),
            exchange_rate,
        }
    }

    /// US dollars at parity
    #[must_use]
    pub fn usd() -> Self {
        Self::new("USD", 1.0)
    }
}

/// One stop of the trip: a location and how many days are spent there
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TripLeg {
    pub location: String,
    pub days: u32,
}

impl TripLeg {
    #[must_use]
    pub fn new<S: Into<String>>(location: S, days: u32) -> Self {
        Self {
            location: location.into(),
            days,
        }
    }
}

/// Caller-provided trip parameters, read-only to the engine
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Trip {
    /// Start and return location
    pub origin: String,
    /// Headline destination (first leg location for multi-stop trips)
    pub destination: String,
    /// Ordered (location, day-count) legs
    pub legs: Vec<TripLeg>,
    pub travelers: u32,
    pub currency: Currency,
    pub total_budget: f64,
    pub budget_tier: BudgetTier,
    pub travel_style: TravelStyle,
    pub has_own_vehicle: bool,
    /// When set, single-segment additions are hard-rejected past the budget
    pub strict_budget: bool,
    /// Explicit transport preference, honored over heuristics
    pub transport_preference: Option<TransportMode>,
}

impl Trip {
    /// Total trip length in days (sum over legs)
    #[must_use]
    pub fn total_days(&self) -> u32 {
        self.legs.iter().map(|l| l.days).sum()
    }

    /// Nights spent away; a single-day trip has none
    #[must_use]
    pub fn total_nights(&self) -> u32 {
        self.total_days().saturating_sub(1)
    }

    /// Location the traveler is in on the given 1-based day
    #[must_use]
    pub fn location_for_day(&self, day: u32) -> &str {
        let mut remaining = day;
        for leg in &self.legs {
            if remaining <= leg.days {
                return &leg.location;
            }
            remaining -= leg.days;
        }
        self.legs
            .last()
            .map_or(self.destination.as_str(), |l| l.location.as_str())
    }

    /// First day spent at the leg with the given index
    #[must_use]
    pub fn first_day_of_leg(&self, index: usize) -> u32 {
        1 + self
            .legs
            .iter()
            .take(index)
            .map(|l| l.days)
            .sum::<u32>()
    }
}
