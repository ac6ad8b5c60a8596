//! Trip orchestration state machine
//!
//! Runs the planning phases strictly in order over a shared budget
//! allocation and segment list. All mutation happens synchronously between
//! suspension points; the only awaits are the provider, geocoding, and
//! routing calls, each of which degrades to a deterministic fallback
//! instead of aborting the run.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::booking;
use crate::budget::{
    AllocationOptions, BudgetAllocation, BudgetCategory, ReconciliationReport, allocate, reconcile,
};
use crate::cache::CacheStore;
use crate::feasibility::{GuardContext, apply_guards};
use crate::geocode::GeocodeResolver;
use crate::models::{
    ActivityMetadata, BudgetTier, Segment, SegmentKind, SegmentMetadata, Trip,
};
use crate::provider::{SuggestionProvider, SuggestionRequest, SuggestionResponse};
use crate::routing::RoutingApi;
use crate::transport::{TransportPlanner, insert_pairwise_local_transport};

/// Called once per phase with a short human-readable status line
pub type ProgressCallback<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// Titles or types containing these mark provider output that duplicates
/// locally planned transport or accommodation
const SANITIZE_KEYWORDS: &[&str] = &[
    "hotel",
    "hostel",
    "check-in",
    "check in",
    "flight",
    "train",
    "bus",
    "transfer",
    "airport",
    "taxi",
    "accommodation",
];

/// Per-day cost rollup for the final itinerary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCost {
    pub day_number: u32,
    pub transport: f64,
    pub accommodation: f64,
    pub activities: f64,
    pub total: f64,
}

/// Everything a caller needs to render the planned trip
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationResult {
    pub allocation: BudgetAllocation,
    pub segments: Vec<Segment>,
    pub daily_summary: Vec<DailyCost>,
    /// Trip-wide bonus suggestions, never counted toward the budget
    pub hidden_gems: Vec<Segment>,
    pub reconciliation: ReconciliationReport,
    /// Human-readable log of every correction made along the way
    pub corrections: Vec<String>,
}

pub struct Orchestrator {
    resolver: Arc<GeocodeResolver>,
    cache: Arc<dyn CacheStore>,
    provider: Arc<dyn SuggestionProvider>,
    routing: Option<Arc<dyn RoutingApi>>,
}

impl Orchestrator {
    pub fn new(
        resolver: Arc<GeocodeResolver>,
        cache: Arc<dyn CacheStore>,
        provider: Arc<dyn SuggestionProvider>,
    ) -> Self {
        Self {
            resolver,
            cache,
            provider,
            routing: None,
        }
    }

    #[must_use]
    pub fn with_routing(mut self, routing: Arc<dyn RoutingApi>) -> Self {
        self.routing = Some(routing);
        self
    }

    /// Run all planning phases for a trip.
    ///
    /// Provider and geocoding failures degrade instead of aborting: a failed
    /// provider call yields an itinerary without activities, a failed lookup
    /// marks its segment `geocode_failed`.
    #[instrument(skip(self, trip, progress), fields(destination = %trip.destination))]
    pub async fn orchestrate(
        &self,
        trip: &Trip,
        progress: Option<ProgressCallback<'_>>,
    ) -> OrchestrationResult {
        let report = |message: &str| {
            info!("{message}");
            if let Some(callback) = progress {
                callback(message);
            }
        };

        // Phase 1: budget allocation
        report("Allocating budget");
        if trip.total_budget <= 0.0 || trip.total_days() == 0 {
            return Self::empty_result(trip);
        }
        let mut allocation = allocate(trip.total_budget, &AllocationOptions::for_trip(trip));

        let planner = TransportPlanner::new(self.resolver.as_ref(), self.cache.as_ref());
        let planner = match &self.routing {
            Some(routing) => planner.with_routing(routing.as_ref()),
            None => planner,
        };

        // Phase 2: outbound and intercity transport
        report("Planning transport");
        let mut transport = Vec::new();
        let outbound = planner.build_outbound_segment(trip, &mut allocation).await;
        let had_outbound = outbound.is_some();
        transport.extend(outbound);
        transport.extend(planner.build_intercity_segments(trip, &mut allocation).await);

        // Phase 3: accommodation
        report("Planning accommodation");
        let accommodation = planner.build_accommodation_segments(trip, &mut allocation);

        // Phase 4: activity generation
        report("Generating activities");
        let request = SuggestionRequest::for_trip(trip, &allocation);
        let response = match self.provider.generate(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("suggestion provider failed, continuing without activities: {e}");
                SuggestionResponse::default()
            }
        };

        let mut corrections = Vec::new();
        let mut response = response;
        sanitize_response(&mut response, &mut corrections);
        scale_activity_costs(&mut response, allocation.activity.allocated, &mut corrections);

        let activities = self
            .build_activity_segments(trip, &response, &mut allocation)
            .await;

        // Phase 4d: feasibility guards
        report("Checking feasibility");
        let context = GuardContext::new(
            trip.travel_style,
            trip.budget_tier,
            trip.total_days(),
            had_outbound,
            &transport,
        );
        let (activities, mut issues) = apply_guards(activities, &context);
        corrections.append(&mut issues);

        // Phase 5: pairwise local transport
        report("Inserting local transport");
        let hops = insert_pairwise_local_transport(
            &activities,
            trip.budget_tier,
            &trip.currency,
            &mut allocation,
        );

        // Phase 6: return transport
        report("Planning the return leg");
        let return_leg = if had_outbound {
            planner.build_return_segment(trip, &mut allocation).await
        } else {
            None
        };
        transport.extend(return_leg);

        // Phase 7: booking suggestions are deferred; they need the stable
        // segment identifiers assigned on store, see `booking::suggest`.

        let mut segments: Vec<Segment> = transport;
        segments.extend(accommodation);
        segments.extend(activities);
        segments.extend(hops);

        // Phase 9: hidden gems, isolated from the budget
        report("Collecting hidden gems");
        let hidden_gems = match self.provider.hidden_gems(&request).await {
            Ok(gems) => gems
                .into_iter()
                .map(|gem| {
                    let mut segment = Segment::new(SegmentKind::HiddenGem, 0, gem.title.clone());
                    segment.location = gem.location.unwrap_or_default();
                    segment.estimated_cost = gem.estimated_cost;
                    segment.metadata = SegmentMetadata::Activity(ActivityMetadata {
                        time: gem.time,
                        activity_type: gem.activity_type,
                        notes: gem.notes,
                        safety_warning: gem.safety_warning,
                        geocode_failed: false,
                    });
                    segment
                })
                .collect(),
            Err(e) => {
                warn!("hidden gem lookup failed, continuing without: {e}");
                Vec::new()
            }
        };

        // Phase 10: reconciliation with one trim pass
        report("Reconciling the budget");
        let mut reconciliation = reconcile(&allocation, &segments);
        if !reconciliation.balanced && reconciliation.overshoot > 0.0 {
            trim_overshoot(&mut segments, reconciliation.overshoot, &mut corrections);
            reconciliation = reconcile(&allocation, &segments);
        }

        finalize_order(&mut segments);

        // Phase 8 output, computed over the final list
        let daily_summary = daily_summary(&segments);

        OrchestrationResult {
            allocation,
            segments,
            daily_summary,
            hidden_gems,
            reconciliation,
            corrections,
        }
    }

    /// Booking options for an already-orchestrated travel segment
    #[must_use]
    pub fn booking_options(
        &self,
        trip: &Trip,
        segment: &Segment,
        allocation: &BudgetAllocation,
        bookable_segments: usize,
    ) -> Vec<booking::BookingOption> {
        booking::suggest(
            segment,
            trip.currency.exchange_rate,
            &booking::SuggestOptions {
                is_luxury: trip.budget_tier == BudgetTier::Luxury,
                upgrade_pool: allocation.upgrade_pool.remaining,
                bookable_segments,
            },
        )
    }

    fn empty_result(trip: &Trip) -> OrchestrationResult {
        OrchestrationResult {
            allocation: BudgetAllocation::empty(),
            segments: Vec::new(),
            daily_summary: Vec::new(),
            hidden_gems: Vec::new(),
            reconciliation: ReconciliationReport::empty(trip.total_budget.max(0.0)),
            corrections: Vec::new(),
        }
    }

    /// Phase 4c: geocode sanitized activities and turn them into segments
    async fn build_activity_segments(
        &self,
        trip: &Trip,
        response: &SuggestionResponse,
        allocation: &mut BudgetAllocation,
    ) -> Vec<Segment> {
        let mut lookups = Vec::new();
        let mut pending = Vec::new();

        for (day_index, day) in response.days.iter().enumerate() {
            let day_number = day_index as u32 + 1;
            if day_number > trip.total_days() {
                break;
            }
            let day_location = trip.location_for_day(day_number).to_string();

            for (position, activity) in day.activities.iter().enumerate() {
                let place = activity
                    .location
                    .clone()
                    .filter(|l| !l.trim().is_empty())
                    .unwrap_or_else(|| day_location.clone());
                lookups.push((
                    place.clone(),
                    Some(activity.title.clone()),
                    Some(day_location.clone()),
                ));
                pending.push((day_number, position, place, activity.clone()));
            }
        }

        let coordinates = self.resolver.resolve_batch(&lookups).await;

        pending
            .into_iter()
            .zip(coordinates)
            .map(|((day_number, position, place, activity), coordinate)| {
                let mut segment =
                    Segment::new(SegmentKind::Activity, day_number, activity.title.clone());
                segment.order_index = position as f64 + 1.0;
                segment.location = place;
                segment.estimated_cost = activity.estimated_cost;
                segment.coordinate = coordinate;
                segment.metadata = SegmentMetadata::Activity(ActivityMetadata {
                    time: activity.time,
                    activity_type: activity.activity_type,
                    notes: activity.notes,
                    safety_warning: activity.safety_warning,
                    geocode_failed: coordinate.is_none(),
                });
                allocation.deduct(BudgetCategory::Activity, segment.estimated_cost);
                segment
            })
            .collect()
    }
}

/// Whole-word occurrence check, so "bus" does not match "business" or
/// "train" match "training"
fn contains_word(haystack: &str, keyword: &str) -> bool {
    let mut offset = 0;
    while let Some(pos) = haystack[offset..].find(keyword) {
        let start = offset + pos;
        let end = start + keyword.len();
        let clear_before = haystack[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let clear_after = haystack[end..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric());
        if clear_before && clear_after {
            return true;
        }
        offset = start + 1;
    }
    false
}

/// Phase 4a: drop provider activities that duplicate transport or
/// accommodation, matched by whole keyword in the title or type
fn sanitize_response(response: &mut SuggestionResponse, corrections: &mut Vec<String>) {
    for day in &mut response.days {
        day.activities.retain(|activity| {
            let haystack = format!(
                "{} {}",
                activity.title.to_lowercase(),
                activity.activity_type.as_deref().unwrap_or("").to_lowercase()
            );
            let duplicate = SANITIZE_KEYWORDS.iter().any(|k| contains_word(&haystack, k));
            if duplicate {
                corrections.push(format!(
                    "Removed suggested '{}': transport and accommodation are planned separately",
                    activity.title
                ));
            }
            !duplicate
        });
    }
}

/// Phase 4b: scale activity costs down proportionally when their sum
/// exceeds the activity envelope
fn scale_activity_costs(
    response: &mut SuggestionResponse,
    envelope: f64,
    corrections: &mut Vec<String>,
) {
    let sum: f64 = response
        .days
        .iter()
        .flat_map(|d| &d.activities)
        .map(|a| a.estimated_cost)
        .sum();
    if sum <= envelope || sum <= 0.0 {
        return;
    }

    let factor = envelope / sum;
    for activity in response.days.iter_mut().flat_map(|d| &mut d.activities) {
        activity.estimated_cost = (activity.estimated_cost * factor).round();
    }
    corrections.push(format!(
        "Scaled activity costs by {:.0}% to fit the {envelope:.0} activity budget",
        factor * 100.0
    ));
}

/// Delete the cheapest trimmable segments until the overshoot is covered.
/// Local transport goes first, then activities; transport legs and
/// accommodation are never trimmed automatically.
fn trim_overshoot(segments: &mut Vec<Segment>, overshoot: f64, corrections: &mut Vec<String>) {
    let mut remaining = overshoot;

    for kind in [SegmentKind::LocalTransport, SegmentKind::Activity] {
        while remaining > 0.0 {
            let cheapest = segments
                .iter()
                .enumerate()
                .filter(|(_, s)| s.kind == kind && s.estimated_cost > 0.0)
                .min_by(|(_, a), (_, b)| a.estimated_cost.total_cmp(&b.estimated_cost))
                .map(|(i, _)| i);
            let Some(index) = cheapest else { break };

            let removed = segments.remove(index);
            remaining -= removed.estimated_cost;
            corrections.push(format!(
                "Removed '{}' ({:.0}) to bring the trip back under budget",
                removed.title, removed.estimated_cost
            ));
        }
    }
}

/// Terminal ordering: sort by (day, order) and re-index order_index to
/// dense per-day integers, collapsing the transient 0.5 offsets
fn finalize_order(segments: &mut [Segment]) {
    segments.sort_by(|a, b| {
        a.day_number
            .cmp(&b.day_number)
            .then(a.order_index.total_cmp(&b.order_index))
    });

    let mut current_day = None;
    let mut next_index = 1.0;
    for segment in segments.iter_mut() {
        if current_day != Some(segment.day_number) {
            current_day = Some(segment.day_number);
            next_index = 1.0;
        }
        segment.order_index = next_index;
        next_index += 1.0;
    }
}

/// Phase 8: per-day rollup, hidden gems excluded by construction
fn daily_summary(segments: &[Segment]) -> Vec<DailyCost> {
    let mut by_day: std::collections::BTreeMap<u32, DailyCost> = std::collections::BTreeMap::new();

    for segment in segments {
        let entry = by_day.entry(segment.day_number).or_insert(DailyCost {
            day_number: segment.day_number,
            transport: 0.0,
            accommodation: 0.0,
            activities: 0.0,
            total: 0.0,
        });
        match segment.kind {
            SegmentKind::OutboundTravel
            | SegmentKind::IntercityTravel
            | SegmentKind::ReturnTravel
            | SegmentKind::LocalTransport => entry.transport += segment.estimated_cost,
            SegmentKind::Accommodation => entry.accommodation += segment.estimated_cost,
            SegmentKind::Activity => entry.activities += segment.estimated_cost,
            SegmentKind::HiddenGem => {}
        }
        entry.total += segment.estimated_cost;
    }

    by_day.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{SuggestedActivity, SuggestedDay};

    fn activity(title: &str, cost: f64) -> SuggestedActivity {
        SuggestedActivity {
            title: title.to_string(),
            estimated_cost: cost,
            ..Default::default()
        }
    }

    #[test]
    fn test_sanitize_strips_transport_lookalikes() {
        let mut response = SuggestionResponse {
            days: vec![SuggestedDay {
                activities: vec![
                    activity("Check in at the Grand Hotel", 0.0),
                    activity("Colosseum tour", 25.0),
                    activity("Airport transfer", 40.0),
                ],
            }],
        };
        let mut corrections = Vec::new();
        sanitize_response(&mut response, &mut corrections);
        assert_eq!(response.days[0].activities.len(), 1);
        assert_eq!(response.days[0].activities[0].title, "Colosseum tour");
        assert_eq!(corrections.len(), 2);
    }

    #[test]
    fn test_sanitize_keeps_keyword_lookalike_words() {
        let mut response = SuggestionResponse {
            days: vec![SuggestedDay {
                activities: vec![
                    activity("Business district walking tour", 15.0),
                    activity("Personal training session", 30.0),
                    activity("Scenic train ride", 20.0),
                ],
            }],
        };
        let mut corrections = Vec::new();
        sanitize_response(&mut response, &mut corrections);

        // "bus" must not match inside "business", nor "train" inside
        // "training"; the standalone word still does
        let kept: Vec<&str> = response.days[0]
            .activities
            .iter()
            .map(|a| a.title.as_str())
            .collect();
        assert_eq!(
            kept,
            vec!["Business district walking tour", "Personal training session"]
        );
        assert_eq!(corrections.len(), 1);
    }

    #[test]
    fn test_costs_scaled_to_fit_envelope() {
        let mut response = SuggestionResponse {
            days: vec![SuggestedDay {
                activities: vec![activity("a", 2000.0), activity("b", 1000.0)],
            }],
        };
        let mut corrections = Vec::new();
        scale_activity_costs(&mut response, 1000.0, &mut corrections);
        let costs: Vec<f64> = response.days[0]
            .activities
            .iter()
            .map(|a| a.estimated_cost)
            .collect();
        assert_eq!(costs, vec![667.0, 333.0]);
        assert_eq!(corrections.len(), 1);
    }

    #[test]
    fn test_costs_untouched_when_they_fit() {
        let mut response = SuggestionResponse {
            days: vec![SuggestedDay {
                activities: vec![activity("a", 100.0)],
            }],
        };
        let mut corrections = Vec::new();
        scale_activity_costs(&mut response, 1000.0, &mut corrections);
        assert_eq!(response.days[0].activities[0].estimated_cost, 100.0);
        assert!(corrections.is_empty());
    }

    #[test]
    fn test_trim_removes_cheapest_local_transport_first() {
        let mut segments = Vec::new();
        let mut hop = Segment::new(SegmentKind::LocalTransport, 1, "hop");
        hop.estimated_cost = 5.0;
        segments.push(hop);
        let mut museum = Segment::new(SegmentKind::Activity, 1, "museum");
        museum.estimated_cost = 30.0;
        segments.push(museum);
        let mut stay = Segment::new(SegmentKind::Accommodation, 1, "stay");
        stay.estimated_cost = 100.0;
        segments.push(stay);

        let mut corrections = Vec::new();
        trim_overshoot(&mut segments, 20.0, &mut corrections);
        // Hop (5) first, then the museum (30) covers the rest; the stay is untouchable
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].kind, SegmentKind::Accommodation);
        assert_eq!(corrections.len(), 2);
    }

    #[test]
    fn test_finalize_assigns_dense_per_day_order() {
        let mut segments = Vec::new();
        for (day, order) in [(2u32, 0.5), (1, 500.0), (1, -2.0), (1, 1.5), (2, 2.0)] {
            let mut s = Segment::new(SegmentKind::Activity, day, format!("{day}-{order}"));
            s.order_index = order;
            segments.push(s);
        }
        finalize_order(&mut segments);
        let got: Vec<(u32, f64)> = segments.iter().map(|s| (s.day_number, s.order_index)).collect();
        assert_eq!(got, vec![(1, 1.0), (1, 2.0), (1, 3.0), (2, 1.0), (2, 2.0)]);
        assert_eq!(segments[0].title, "1--2");
    }

    #[test]
    fn test_daily_summary_rollup() {
        let mut flight = Segment::new(SegmentKind::OutboundTravel, 1, "flight");
        flight.estimated_cost = 120.0;
        let mut stay = Segment::new(SegmentKind::Accommodation, 1, "stay");
        stay.estimated_cost = 80.0;
        let mut museum = Segment::new(SegmentKind::Activity, 2, "museum");
        museum.estimated_cost = 25.0;

        let summary = daily_summary(&[flight, stay, museum]);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].transport, 120.0);
        assert_eq!(summary[0].accommodation, 80.0);
        assert_eq!(summary[0].total, 200.0);
        assert_eq!(summary[1].activities, 25.0);
    }
}
