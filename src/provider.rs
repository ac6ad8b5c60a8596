//! Suggestion provider seam
//!
//! Activity suggestions come from an external generative service behind the
//! [`SuggestionProvider`] trait. The orchestrator only depends on the trait,
//! so tests and offline runs plug in scripted providers.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::budget::BudgetAllocation;
use crate::models::Trip;

/// Request envelope sent to the suggestion provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionRequest {
    pub destination: String,
    pub total_days: u32,
    pub budget: f64,
    pub travelers: u32,
    pub currency: String,
    /// Destination for each day, index 0 = day 1
    pub day_locations: Vec<String>,
    pub budget_tier: String,
    /// Whole activity envelope for the trip
    pub activity_budget: f64,
    pub activity_per_day: f64,
    pub travel_style: String,
    /// Transport and accommodation are planned locally, never requested
    pub exclude_transport: bool,
    pub exclude_accommodation: bool,
}

impl SuggestionRequest {
    #[must_use]
    pub fn for_trip(trip: &Trip, allocation: &BudgetAllocation) -> Self {
        let day_locations = (1..=trip.total_days())
            .map(|day| trip.location_for_day(day).to_string())
            .collect();
        Self {
            destination: trip.destination.clone(),
            total_days: trip.total_days(),
            budget: trip.total_budget,
            travelers: trip.travelers,
            currency: trip.currency.code.clone(),
            day_locations,
            budget_tier: trip.budget_tier.as_str().to_string(),
            activity_budget: allocation.activity.allocated,
            activity_per_day: allocation.activity_per_day,
            travel_style: trip.travel_style.as_str().to_string(),
            exclude_transport: true,
            exclude_accommodation: true,
        }
    }
}

/// One suggested activity, as returned by the provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuggestedActivity {
    pub title: String,
    /// "HH:MM", when the provider schedules it
    #[serde(default)]
    pub time: Option<String>,
    #[serde(rename = "type", default)]
    pub activity_type: Option<String>,
    /// Place name to geocode, usually more specific than the day location
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub estimated_cost: f64,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub safety_warning: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuggestedDay {
    pub activities: Vec<SuggestedActivity>,
}

/// Provider response: one entry per day, index 0 = day 1
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuggestionResponse {
    pub days: Vec<SuggestedDay>,
}

/// Source of generated activity suggestions
#[async_trait]
pub trait SuggestionProvider: Send + Sync {
    async fn generate(&self, request: &SuggestionRequest) -> Result<SuggestionResponse>;

    /// Trip-wide bonus suggestions outside the day plan. Optional; the
    /// default provider has none.
    async fn hidden_gems(&self, _request: &SuggestionRequest) -> Result<Vec<SuggestedActivity>> {
        Ok(Vec::new())
    }
}
