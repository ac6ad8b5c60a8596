//! End-to-end orchestration tests over scripted provider and geocoding mocks

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use tripweaver::cache::{CacheStore, MemoryCache};
use tripweaver::geocode::{GeocodeResolver, GeocodingApi};
use tripweaver::models::{
    BudgetTier, Coordinate, Currency, SegmentKind, TransportMode, TravelStyle, Trip, TripLeg,
};
use tripweaver::orchestrator::Orchestrator;
use tripweaver::provider::{
    SuggestedActivity, SuggestedDay, SuggestionProvider, SuggestionRequest, SuggestionResponse,
};

/// Geocoder backed by a fixed place table
struct ScriptedGeo {
    places: HashMap<String, Coordinate>,
}

impl ScriptedGeo {
    fn empty() -> Self {
        Self {
            places: HashMap::new(),
        }
    }

    fn with(places: &[(&str, f64, f64)]) -> Self {
        Self {
            places: places
                .iter()
                .map(|&(name, lat, lon)| (name.to_string(), Coordinate::new(lat, lon)))
                .collect(),
        }
    }
}

#[async_trait]
impl GeocodingApi for ScriptedGeo {
    async fn search(&self, query: &str) -> Result<Option<Coordinate>> {
        Ok(self.places.get(query).copied())
    }
}

/// Provider that replays a canned response
struct ScriptedProvider {
    days: Vec<SuggestedDay>,
    gems: Vec<SuggestedActivity>,
}

#[async_trait]
impl SuggestionProvider for ScriptedProvider {
    async fn generate(&self, _request: &SuggestionRequest) -> Result<SuggestionResponse> {
        Ok(SuggestionResponse {
            days: self.days.clone(),
        })
    }

    async fn hidden_gems(&self, _request: &SuggestionRequest) -> Result<Vec<SuggestedActivity>> {
        Ok(self.gems.clone())
    }
}

struct FailingProvider;

#[async_trait]
impl SuggestionProvider for FailingProvider {
    async fn generate(&self, _request: &SuggestionRequest) -> Result<SuggestionResponse> {
        Err(anyhow!("upstream model unavailable"))
    }
}

fn activity(title: &str, location: Option<&str>, time: Option<&str>, cost: f64) -> SuggestedActivity {
    SuggestedActivity {
        title: title.to_string(),
        time: time.map(str::to_string),
        activity_type: Some("sightseeing".to_string()),
        location: location.map(str::to_string),
        estimated_cost: cost,
        notes: None,
        safety_warning: None,
    }
}

fn orchestrator(geo: ScriptedGeo, provider: impl SuggestionProvider + 'static) -> Orchestrator {
    let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
    let resolver = Arc::new(GeocodeResolver::new(Arc::new(geo), cache.clone()));
    Orchestrator::new(resolver, cache, Arc::new(provider))
}

fn base_trip() -> Trip {
    Trip {
        origin: "Berlin".to_string(),
        destination: "Rome".to_string(),
        legs: vec![TripLeg::new("Rome", 2)],
        travelers: 1,
        currency: Currency::usd(),
        total_budget: 3000.0,
        budget_tier: BudgetTier::MidRange,
        travel_style: TravelStyle::CityExplorer,
        has_own_vehicle: false,
        strict_budget: false,
        transport_preference: None,
    }
}

/// Full happy path: transport, accommodation, activities, balanced budget
#[tokio::test]
async fn test_full_orchestration_happy_path() {
    let provider = ScriptedProvider {
        days: vec![
            SuggestedDay {
                activities: vec![
                    activity("Colosseum tour", Some("Rome"), Some("10:00"), 30.0),
                    activity("Forum walk", Some("Rome"), Some("14:00"), 20.0),
                ],
            },
            SuggestedDay {
                activities: vec![activity("Vatican museums", Some("Rome"), Some("09:30"), 40.0)],
            },
        ],
        gems: Vec::new(),
    };
    let result = orchestrator(ScriptedGeo::empty(), provider)
        .orchestrate(&base_trip(), None)
        .await;

    let kinds: Vec<SegmentKind> = result.segments.iter().map(|s| s.kind).collect();
    assert!(kinds.contains(&SegmentKind::OutboundTravel));
    assert!(kinds.contains(&SegmentKind::ReturnTravel));
    // Two days means one night
    assert_eq!(
        kinds.iter().filter(|&&k| k == SegmentKind::Accommodation).count(),
        1
    );
    assert_eq!(
        kinds.iter().filter(|&&k| k == SegmentKind::Activity).count(),
        3
    );

    assert!(result.reconciliation.balanced);
    assert_eq!(result.daily_summary.len(), 2);
    assert!(result.daily_summary[0].total > 0.0);

    // Dense per-day ordering on the final list
    let mut day_one = result.segments.iter().filter(|s| s.day_number == 1);
    assert_eq!(day_one.next().map(|s| s.order_index), Some(1.0));
    for day in [1u32, 2] {
        let orders: Vec<f64> = result
            .segments
            .iter()
            .filter(|s| s.day_number == day)
            .map(|s| s.order_index)
            .collect();
        let expected: Vec<f64> = (1..=orders.len()).map(|i| i as f64).collect();
        assert_eq!(orders, expected);
    }
}

/// Provider costs overshooting the activity envelope are scaled down to fit
#[tokio::test]
async fn test_activity_costs_scaled_into_envelope() {
    let provider = ScriptedProvider {
        days: vec![
            SuggestedDay {
                activities: vec![activity("Private tour", Some("Rome"), None, 1500.0)],
            },
            SuggestedDay {
                activities: vec![activity("Opera box", Some("Rome"), None, 1500.0)],
            },
        ],
        gems: Vec::new(),
    };
    let mut trip = base_trip();
    trip.total_budget = 4000.0; // activity envelope = 1000

    let result = orchestrator(ScriptedGeo::empty(), provider)
        .orchestrate(&trip, None)
        .await;

    let activity_total: f64 = result
        .segments
        .iter()
        .filter(|s| s.kind == SegmentKind::Activity)
        .map(|s| s.estimated_cost)
        .sum();
    assert!(activity_total <= 1001.0, "got {activity_total}");
    assert!(
        result
            .corrections
            .iter()
            .any(|c| c.contains("Scaled activity costs"))
    );
}

/// A single-day trip with travel keeps at most three geocoded activities
#[tokio::test]
async fn test_single_day_trip_capped_at_three_activities() {
    let places: Vec<(String, f64, f64)> = (0..7)
        .map(|i| (format!("spot-{i}"), 41.89 + f64::from(i) * 0.002, 12.49))
        .collect();
    let geo = ScriptedGeo {
        places: places
            .iter()
            .map(|(n, lat, lon)| (n.clone(), Coordinate::new(*lat, *lon)))
            .collect(),
    };
    let provider = ScriptedProvider {
        days: vec![SuggestedDay {
            activities: (0..7)
                .map(|i| activity(&format!("stop {i}"), Some(&format!("spot-{i}")), None, 10.0))
                .collect(),
        }],
        gems: Vec::new(),
    };

    let mut trip = base_trip();
    trip.legs = vec![TripLeg::new("Rome", 1)];
    trip.travel_style = TravelStyle::Adventure;

    let result = orchestrator(geo, provider).orchestrate(&trip, None).await;
    let activities = result
        .segments
        .iter()
        .filter(|s| s.kind == SegmentKind::Activity)
        .count();
    assert_eq!(activities, 3);
    assert!(result.corrections.len() >= 4);
}

/// An explicit flight preference is honored and costed even over the envelope
#[tokio::test]
async fn test_explicit_flight_never_downgraded() {
    let provider = ScriptedProvider {
        days: Vec::new(),
        gems: Vec::new(),
    };
    let mut trip = base_trip();
    trip.legs = vec![TripLeg::new("Tokyo", 2)];
    trip.destination = "Tokyo".to_string();
    trip.transport_preference = Some(TransportMode::Flight);
    trip.total_budget = 400.0; // intercity envelope far below any flight

    let result = orchestrator(ScriptedGeo::empty(), provider)
        .orchestrate(&trip, None)
        .await;

    let outbound = result
        .segments
        .iter()
        .find(|s| s.kind == SegmentKind::OutboundTravel)
        .expect("outbound leg missing");
    let metadata = outbound.metadata.as_transport().unwrap();
    assert_eq!(metadata.mode, TransportMode::Flight);
    assert!(metadata.user_locked);
    // Long-haul flight base rate, recorded in full despite the envelope
    assert_eq!(outbound.estimated_cost, 320.0);

    // Nothing trimmable exists, so the overshoot stays visible
    assert!(!result.reconciliation.balanced);
    assert!(!result.reconciliation.violations.is_empty());
}

/// Two nearby activities get exactly one local-transport hop at minimum fare
#[tokio::test]
async fn test_local_transport_inserted_between_nearby_activities() {
    let geo = ScriptedGeo::with(&[
        ("Pantheon", 41.8986, 12.4769),
        ("Piazza Navona", 41.8992, 12.4731),
    ]);
    let provider = ScriptedProvider {
        days: vec![SuggestedDay {
            activities: vec![
                activity("Pantheon visit", Some("Pantheon"), Some("09:00"), 0.0),
                activity("Navona stroll", Some("Piazza Navona"), Some("11:00"), 0.0),
            ],
        }],
        gems: Vec::new(),
    };
    let mut trip = base_trip();
    trip.origin = "Rome".to_string(); // no outbound or return legs
    trip.legs = vec![TripLeg::new("Rome", 1)];

    let result = orchestrator(geo, provider).orchestrate(&trip, None).await;

    let hops: Vec<_> = result
        .segments
        .iter()
        .filter(|s| s.kind == SegmentKind::LocalTransport)
        .collect();
    assert_eq!(hops.len(), 1);
    // Mid-range minimum fare beats 0.32 km at the per-km rate
    assert_eq!(hops[0].estimated_cost, 5.0);

    // The hop lands between the two activities in the final ordering
    let day_kinds: Vec<SegmentKind> = result
        .segments
        .iter()
        .filter(|s| s.day_number == 1)
        .map(|s| s.kind)
        .collect();
    assert_eq!(
        day_kinds,
        vec![
            SegmentKind::Activity,
            SegmentKind::LocalTransport,
            SegmentKind::Activity
        ]
    );
}

/// Zero budget short-circuits to an empty, balanced result
#[tokio::test]
async fn test_zero_budget_short_circuits() {
    let provider = ScriptedProvider {
        days: Vec::new(),
        gems: Vec::new(),
    };
    let mut trip = base_trip();
    trip.total_budget = 0.0;

    let result = orchestrator(ScriptedGeo::empty(), provider)
        .orchestrate(&trip, None)
        .await;
    assert!(result.segments.is_empty());
    assert!(result.reconciliation.balanced);
    assert_eq!(result.allocation.total, 0.0);
}

/// A failing provider degrades to an itinerary without activities
#[tokio::test]
async fn test_provider_failure_degrades_gracefully() {
    let result = orchestrator(ScriptedGeo::empty(), FailingProvider)
        .orchestrate(&base_trip(), None)
        .await;

    assert!(
        result
            .segments
            .iter()
            .all(|s| s.kind != SegmentKind::Activity)
    );
    assert!(
        result
            .segments
            .iter()
            .any(|s| s.kind == SegmentKind::OutboundTravel)
    );
    assert!(
        result
            .segments
            .iter()
            .any(|s| s.kind == SegmentKind::Accommodation)
    );
    assert!(result.reconciliation.balanced);
}

/// Hidden gems are isolated: day zero, excluded from spending
#[tokio::test]
async fn test_hidden_gems_never_counted_toward_budget() {
    let provider = ScriptedProvider {
        days: Vec::new(),
        gems: vec![activity("Back-alley trattoria", Some("Rome"), None, 50.0)],
    };
    let result = orchestrator(ScriptedGeo::empty(), provider)
        .orchestrate(&base_trip(), None)
        .await;

    assert_eq!(result.hidden_gems.len(), 1);
    assert_eq!(result.hidden_gems[0].day_number, 0);
    assert_eq!(result.hidden_gems[0].kind, SegmentKind::HiddenGem);

    let spent_without_gems: f64 = result.segments.iter().map(|s| s.estimated_cost).sum();
    assert!((result.reconciliation.total_spent - spent_without_gems).abs() < 1e-6);
}

/// Progress callback fires for every phase
#[tokio::test]
async fn test_progress_callback_reports_phases() {
    use std::sync::Mutex;

    let provider = ScriptedProvider {
        days: Vec::new(),
        gems: Vec::new(),
    };
    let messages: Mutex<Vec<String>> = Mutex::new(Vec::new());
    let record = |message: &str| {
        messages.lock().unwrap().push(message.to_string());
    };

    orchestrator(ScriptedGeo::empty(), provider)
        .orchestrate(&base_trip(), Some(&record))
        .await;

    let seen = messages.into_inner().unwrap();
    assert!(seen.len() >= 8);
    assert_eq!(seen[0], "Allocating budget");
    assert!(seen.iter().any(|m| m.contains("Reconciling")));
}

/// Booking options for an orchestrated travel segment are deterministic
/// and capped at three, best score first.
#[tokio::test]
async fn test_booking_options_for_outbound_segment() {
    let provider = ScriptedProvider {
        days: Vec::new(),
        gems: Vec::new(),
    };
    let trip = base_trip();
    let orch = orchestrator(ScriptedGeo::empty(), provider);
    let result = orch.orchestrate(&trip, None).await;

    let outbound = result
        .segments
        .iter()
        .find(|s| s.kind == SegmentKind::OutboundTravel)
        .unwrap();

    let first = orch.booking_options(&trip, outbound, &result.allocation, 2);
    let second = orch.booking_options(&trip, outbound, &result.allocation, 2);

    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
    for pair in first.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    assert!(first.iter().all(|o| o.price > 0.0 && !o.provider.is_empty()));
}
