//! Transport decision engine
//!
//! Distance tiers, transport-mode decisioning, cost tables, envelope-aware
//! costing with a downgrade ladder, and the travel/accommodation/local-hop
//! segment builders. All tables are explicit constants so they can be tuned
//! without touching algorithm code.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::budget::{BudgetAllocation, BudgetCategory};
use crate::cache::CacheStore;
use crate::geocode::GeocodeResolver;
use crate::models::{
    ACCOMMODATION_ORDER, AccommodationMetadata, BudgetTier, Currency, LocalTransportMetadata,
    OUTBOUND_ORDER, RETURN_ORDER, Segment, SegmentKind, SegmentMetadata, TransportMetadata,
    TransportMode, TravelStyle, Trip,
};
use crate::routing::{RoutingApi, cached_route};

/// Coarse discretization of travel distance, indexes the cost/time tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceTier {
    Local,
    Short,
    Medium,
    Long,
}

impl DistanceTier {
    /// Classify a great-circle distance in km
    #[must_use]
    pub fn classify(km: f64) -> Self {
        if km < 100.0 {
            DistanceTier::Local
        } else if km < 500.0 {
            DistanceTier::Short
        } else if km <= 1200.0 {
            DistanceTier::Medium
        } else {
            DistanceTier::Long
        }
    }

    /// Representative distance used by per-km cost and time estimates
    #[must_use]
    pub fn approx_km(&self) -> f64 {
        match self {
            DistanceTier::Local => 50.0,
            DistanceTier::Short => 300.0,
            DistanceTier::Medium => 850.0,
            DistanceTier::Long => 2000.0,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceTier::Local => "local",
            DistanceTier::Short => "short",
            DistanceTier::Medium => "medium",
            DistanceTier::Long => "long",
        }
    }

    fn index(self) -> usize {
        match self {
            DistanceTier::Local => 0,
            DistanceTier::Short => 1,
            DistanceTier::Medium => 2,
            DistanceTier::Long => 3,
        }
    }
}

/// Curated pairs of well-known nearby cities; a match short-circuits the
/// distance-tier lookup to `short` without any geocoding
const SAME_REGION_PAIRS: &[(&str, &str)] = &[
    ("kyoto", "osaka"),
    ("kyoto", "nara"),
    ("osaka", "nara"),
    ("tokyo", "yokohama"),
    ("florence", "pisa"),
    ("florence", "siena"),
    ("rome", "naples"),
    ("madrid", "toledo"),
    ("seville", "cordoba"),
    ("munich", "salzburg"),
    ("vienna", "bratislava"),
    ("amsterdam", "rotterdam"),
    ("amsterdam", "utrecht"),
    ("brussels", "bruges"),
    ("prague", "dresden"),
    ("san francisco", "san jose"),
    ("los angeles", "san diego"),
];

/// Base one-way cost per traveler in USD, indexed by [`DistanceTier`]
const FLIGHT_COST_USD: [f64; 4] = [90.0, 120.0, 180.0, 320.0];
const TRAIN_COST_USD: [f64; 4] = [15.0, 40.0, 70.0, 130.0];
const BUS_COST_USD: [f64; 4] = [8.0, 20.0, 35.0, 60.0];
/// Own-vehicle running cost per km in USD
const CAR_COST_PER_KM_USD: f64 = 0.22;
const BIKE_COST_PER_KM_USD: f64 = 0.05;

/// Walked most-to-least expensive when a preferred mode overshoots its envelope
const DOWNGRADE_LADDER: [TransportMode; 4] = [
    TransportMode::Flight,
    TransportMode::Train,
    TransportMode::Bus,
    TransportMode::Car,
];

/// Cost-of-living index by currency code, relative to USD purchasing power
const KNOWN_COST_OF_LIVING: &[(&str, f64)] = &[
    ("USD", 1.0),
    ("EUR", 1.05),
    ("GBP", 1.15),
    ("CHF", 1.35),
    ("JPY", 0.75),
    ("KRW", 0.8),
    ("CNY", 0.6),
    ("SGD", 1.1),
    ("AUD", 0.95),
    ("CAD", 0.9),
    ("NZD", 0.95),
    ("INR", 0.35),
    ("THB", 0.45),
    ("VND", 0.3),
    ("IDR", 0.35),
    ("MXN", 0.5),
    ("BRL", 0.55),
    ("TRY", 0.4),
];

/// Cost-of-living for an unknown currency, inferred from the exchange-rate
/// magnitude (units per USD). Large rates mean cheap destinations. Bucket
/// boundaries: <2, <10, <50, <200, <1000, and everything above.
#[must_use]
pub fn bucket_cost_of_living(exchange_rate: f64) -> f64 {
    if exchange_rate < 2.0 {
        1.0
    } else if exchange_rate < 10.0 {
        0.85
    } else if exchange_rate < 50.0 {
        0.7
    } else if exchange_rate < 200.0 {
        0.55
    } else if exchange_rate < 1000.0 {
        0.4
    } else {
        0.3
    }
}

/// Cost-of-living index for a currency, by code or by rate bucket
#[must_use]
pub fn cost_of_living_index(code: &str, exchange_rate: f64) -> f64 {
    let upper = code.to_uppercase();
    KNOWN_COST_OF_LIVING
        .iter()
        .find(|(known, _)| *known == upper)
        .map_or_else(|| bucket_cost_of_living(exchange_rate), |&(_, index)| index)
}

/// Effective multiplier from base USD costs to trip-currency costs
#[must_use]
pub fn effective_multiplier(currency: &Currency) -> f64 {
    currency.exchange_rate * cost_of_living_index(&currency.code, currency.exchange_rate)
}

/// Base cost of one leg in the trip currency
#[must_use]
pub fn mode_cost(
    mode: TransportMode,
    tier: DistanceTier,
    travelers: u32,
    currency: &Currency,
) -> f64 {
    let base_usd = match mode {
        TransportMode::Flight => FLIGHT_COST_USD[tier.index()],
        TransportMode::Train => TRAIN_COST_USD[tier.index()],
        TransportMode::Bus => BUS_COST_USD[tier.index()],
        TransportMode::Car => CAR_COST_PER_KM_USD * tier.approx_km(),
        TransportMode::Bike => BIKE_COST_PER_KM_USD * tier.approx_km(),
    };
    (base_usd * f64::from(travelers) * effective_multiplier(currency)).round()
}

fn normalize_place(place: &str) -> String {
    place.trim().to_lowercase()
}

fn same_region_pair(a: &str, b: &str) -> bool {
    SAME_REGION_PAIRS.iter().any(|(x, y)| {
        (a.contains(x) && b.contains(y)) || (a.contains(y) && b.contains(x))
    })
}

/// Shared-country heuristic: both names carry the same trailing ", Country"
/// qualifier
fn shared_country_keyword(a: &str, b: &str) -> bool {
    let tail = |name: &str| {
        name.rsplit(',')
            .next()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty() && t.len() > 2)
    };
    match (tail(a), tail(b)) {
        (Some(ta), Some(tb)) => ta == tb && a != b,
        _ => false,
    }
}

/// Distance tier between two place names. Symmetric in its arguments.
///
/// Resolution order: curated same-region pairs, haversine over geocoded
/// endpoints, shared-country keyword, then `short`. The default is
/// deliberately `short` rather than `medium`: unknown places must not
/// inflate costs.
pub async fn distance_tier(resolver: &GeocodeResolver, from: &str, to: &str) -> DistanceTier {
    let a = normalize_place(from);
    let b = normalize_place(to);

    if a == b {
        return DistanceTier::Local;
    }
    if same_region_pair(&a, &b) {
        return DistanceTier::Short;
    }

    let from_coord = resolver.resolve(from, None, None).await;
    let to_coord = resolver.resolve(to, None, None).await;
    if let (Some(fc), Some(tc)) = (from_coord, to_coord) {
        return DistanceTier::classify(fc.distance_km(&tc));
    }

    if shared_country_keyword(&a, &b) {
        return DistanceTier::Short;
    }

    DistanceTier::Short
}

/// Rough driving time for a tier's representative distance
#[must_use]
pub fn estimate_drive_hours(tier: DistanceTier) -> f64 {
    tier.approx_km() / 75.0
}

/// Rough leg duration by mode over a given distance
#[must_use]
pub fn estimate_duration_hours(mode: TransportMode, km: f64) -> f64 {
    match mode {
        TransportMode::Flight => 1.0 + km / 700.0,
        TransportMode::Train => km / 100.0,
        TransportMode::Bus => km / 70.0,
        TransportMode::Car => km / 75.0,
        TransportMode::Bike => km / 20.0,
    }
}

/// Decide the transport mode for a leg.
///
/// Road-trip style forces ground transport. Otherwise an explicit user
/// preference wins (with the sub-2h flight sanity clamp to train), then the
/// own-vehicle rule, then drive-time heuristics.
#[must_use]
pub fn decide_mode(trip: &Trip, tier: DistanceTier, drive_hours: f64) -> TransportMode {
    if trip.travel_style == TravelStyle::RoadTrip {
        return if trip.has_own_vehicle && tier.approx_km() <= 800.0 {
            TransportMode::Car
        } else if tier.approx_km() <= 300.0 {
            TransportMode::Bus
        } else {
            TransportMode::Train
        };
    }

    if let Some(preference) = trip.transport_preference {
        if preference == TransportMode::Flight && drive_hours < 2.0 {
            debug!("flight preference clamped to train for a sub-2h drive");
            return TransportMode::Train;
        }
        return preference;
    }

    if trip.has_own_vehicle && drive_hours <= 6.0 {
        return TransportMode::Car;
    }

    if drive_hours >= 8.0 {
        return if trip.budget_tier == BudgetTier::Budget {
            TransportMode::Train
        } else {
            TransportMode::Flight
        };
    }

    match tier {
        DistanceTier::Local | DistanceTier::Short => {
            if trip.budget_tier == BudgetTier::Budget {
                TransportMode::Bus
            } else {
                TransportMode::Train
            }
        }
        DistanceTier::Medium | DistanceTier::Long => TransportMode::Train,
    }
}

/// Outcome of envelope-aware costing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostDecision {
    pub mode: TransportMode,
    pub cost: f64,
    /// Cost or mode was altered to fit the envelope
    pub adjusted: bool,
    /// Explicit user choice; mode must never be downgraded
    pub user_locked: bool,
}

/// Fit a leg's cost into the intercity envelope.
///
/// An explicitly chosen mode is honored even when it overshoots the envelope:
/// user intent beats strict budget compliance on outbound/return legs. Other
/// modes walk the downgrade ladder; when nothing fits, the cost is clamped to
/// the remaining envelope.
#[must_use]
pub fn envelope_aware_cost(
    preferred: TransportMode,
    tier: DistanceTier,
    travelers: u32,
    currency: &Currency,
    remaining: f64,
    user_explicit: bool,
) -> CostDecision {
    if remaining <= 0.0 {
        return CostDecision {
            mode: preferred,
            cost: 0.0,
            adjusted: true,
            user_locked: user_explicit,
        };
    }

    let preferred_cost = mode_cost(preferred, tier, travelers, currency);
    if preferred_cost <= remaining {
        return CostDecision {
            mode: preferred,
            cost: preferred_cost,
            adjusted: false,
            user_locked: user_explicit,
        };
    }

    if user_explicit {
        warn!(
            mode = preferred.as_str(),
            cost = preferred_cost,
            remaining,
            "explicit transport choice exceeds its envelope; honoring it anyway"
        );
        return CostDecision {
            mode: preferred,
            cost: preferred_cost,
            adjusted: false,
            user_locked: true,
        };
    }

    let start = DOWNGRADE_LADDER
        .iter()
        .position(|&m| m == preferred)
        .map_or(0, |i| i + 1);
    let mut cheapest = (preferred, preferred_cost);

    for &mode in &DOWNGRADE_LADDER[start.min(DOWNGRADE_LADDER.len())..] {
        let cost = mode_cost(mode, tier, travelers, currency);
        if cost <= remaining {
            return CostDecision {
                mode,
                cost,
                adjusted: true,
                user_locked: false,
            };
        }
        if cost < cheapest.1 {
            cheapest = (mode, cost);
        }
    }

    // Known approximation: the recorded cost is the envelope remainder, not
    // the cheapest mode's true cost, so actual spending is understated here.
    CostDecision {
        mode: cheapest.0,
        cost: remaining.round().max(0.0),
        adjusted: true,
        user_locked: false,
    }
}

/// Per-tier local-hop fares in USD: (minimum fare, per-km rate)
fn local_fare(tier: BudgetTier) -> (f64, f64) {
    match tier {
        BudgetTier::Budget => (2.0, 0.5),
        BudgetTier::MidRange => (5.0, 1.2),
        BudgetTier::Luxury => (12.0, 2.5),
    }
}

/// Hops shorter than this need no transport segment
const MIN_HOP_KM: f64 = 0.2;
/// Pairs farther apart than this are treated as geocoding errors
const MAX_PLAUSIBLE_HOP_KM: f64 = 50.0;
/// Distance substituted for implausible or half-resolved pairs
const FALLBACK_HOP_KM: f64 = 5.0;
/// Distance assumed when exactly one endpoint lacks coordinates
const HALF_RESOLVED_HOP_KM: f64 = 1.0;

/// Insert a local-transport segment between each consecutive pair of
/// same-day activities.
pub fn insert_pairwise_local_transport(
    activities: &[Segment],
    tier: BudgetTier,
    currency: &Currency,
    allocation: &mut BudgetAllocation,
) -> Vec<Segment> {
    let mut by_day: std::collections::BTreeMap<u32, Vec<&Segment>> =
        std::collections::BTreeMap::new();
    for segment in activities.iter().filter(|s| s.kind == SegmentKind::Activity) {
        by_day.entry(segment.day_number).or_default().push(segment);
    }

    let (min_fare, per_km) = local_fare(tier);
    let multiplier = effective_multiplier(currency);
    let mut hops = Vec::new();

    for day_activities in by_day.values_mut() {
        day_activities.sort_by(|a, b| a.order_index.total_cmp(&b.order_index));

        for pair in day_activities.windows(2) {
            let (from, to) = (pair[0], pair[1]);

            let distance_km = match (from.coordinate, to.coordinate) {
                (Some(fc), Some(tc)) => {
                    let d = fc.distance_km(&tc);
                    if d > MAX_PLAUSIBLE_HOP_KM {
                        // A 50+ km hop between same-day activities is a
                        // geocoding error, not a real journey
                        FALLBACK_HOP_KM
                    } else {
                        d
                    }
                }
                (None, None) => continue,
                _ => HALF_RESOLVED_HOP_KM,
            };

            if distance_km <= MIN_HOP_KM || allocation.local_transport.remaining <= 0.0 {
                continue;
            }

            let cost = (min_fare.max(distance_km * per_km) * multiplier).round();
            allocation.deduct(BudgetCategory::LocalTransport, cost);

            let mode = if distance_km <= 3.0 { "metro" } else { "taxi" };
            let mut hop = Segment::new(
                SegmentKind::LocalTransport,
                from.day_number,
                format!("Local transport to {}", to.title),
            );
            hop.location = to.location.clone();
            hop.order_index = from.order_index + 0.5;
            hop.estimated_cost = cost;
            hop.metadata = SegmentMetadata::LocalTransport(LocalTransportMetadata {
                mode: mode.to_string(),
                distance_km: (distance_km * 10.0).round() / 10.0,
            });
            hops.push(hop);
        }
    }

    hops
}

/// Per-leg profile feeding mode decision and costing
struct LegProfile {
    tier: DistanceTier,
    distance_km: f64,
    drive_hours: f64,
    route_duration_hours: Option<f64>,
}

/// Builds travel and accommodation segments against a budget allocation
pub struct TransportPlanner<'a> {
    resolver: &'a GeocodeResolver,
    cache: &'a dyn CacheStore,
    routing: Option<&'a dyn RoutingApi>,
}

impl<'a> TransportPlanner<'a> {
    pub fn new(resolver: &'a GeocodeResolver, cache: &'a dyn CacheStore) -> Self {
        Self {
            resolver,
            cache,
            routing: None,
        }
    }

    #[must_use]
    pub fn with_routing(mut self, routing: &'a dyn RoutingApi) -> Self {
        self.routing = Some(routing);
        self
    }

    async fn leg_profile(&self, from: &str, to: &str) -> LegProfile {
        let tier = distance_tier(self.resolver, from, to).await;
        let mut profile = LegProfile {
            tier,
            distance_km: tier.approx_km(),
            drive_hours: estimate_drive_hours(tier),
            route_duration_hours: None,
        };

        let from_coord = self.resolver.resolve(from, None, None).await;
        let to_coord = self.resolver.resolve(to, None, None).await;
        if let (Some(fc), Some(tc)) = (from_coord, to_coord) {
            profile.distance_km = fc.distance_km(&tc);

            // Real routing data, when available, overrides the estimates
            if let Some(routing) = self.routing {
                match cached_route(routing, self.cache, &fc, &tc).await {
                    Ok(route) => {
                        profile.tier = DistanceTier::classify(route.distance_km());
                        profile.distance_km = route.distance_km();
                        profile.drive_hours = route.duration_hours();
                        profile.route_duration_hours = Some(route.duration_hours());
                    }
                    Err(e) => debug!("routing lookup failed, keeping estimates: {e}"),
                }
            }
        }

        profile
    }

    async fn build_travel_segment(
        &self,
        trip: &Trip,
        from: &str,
        to: &str,
        kind: SegmentKind,
        day_number: u32,
        order_index: f64,
        allocation: &mut BudgetAllocation,
    ) -> Segment {
        let profile = self.leg_profile(from, to).await;
        let mode = decide_mode(trip, profile.tier, profile.drive_hours);
        let user_explicit = trip.transport_preference == Some(mode);

        // Return legs are costed at the undiscounted rate for symmetry with
        // the outbound leg instead of re-walking the downgrade ladder.
        let decision = if kind == SegmentKind::ReturnTravel {
            CostDecision {
                mode,
                cost: mode_cost(mode, profile.tier, trip.travelers, &trip.currency),
                adjusted: false,
                user_locked: user_explicit,
            }
        } else {
            envelope_aware_cost(
                mode,
                profile.tier,
                trip.travelers,
                &trip.currency,
                allocation.intercity.remaining,
                user_explicit,
            )
        };
        allocation.deduct(BudgetCategory::Intercity, decision.cost);

        let duration_hours = match (decision.mode == mode, profile.route_duration_hours) {
            (true, Some(routed)) if mode == TransportMode::Car => routed,
            _ => estimate_duration_hours(decision.mode, profile.distance_km),
        };

        let mut metadata = TransportMetadata::new(decision.mode, round1(duration_hours));
        metadata.budget_adjusted = decision.adjusted;
        metadata.user_locked = decision.user_locked;

        // Long ground legs outside luxury trips are overnight candidates
        let overnight_mode = matches!(decision.mode, TransportMode::Bus | TransportMode::Train);
        if overnight_mode
            && trip.budget_tier != BudgetTier::Luxury
            && (6.0..=16.0).contains(&duration_hours)
        {
            metadata.is_overnight = true;
            metadata.departure = Some("21:00".to_string());
            metadata.arrival = Some("07:00".to_string());
        }

        let mut segment = Segment::new(kind, day_number, format!("{from} to {to}"));
        segment.location = to.to_string();
        segment.order_index = order_index;
        segment.estimated_cost = decision.cost;
        segment.metadata = SegmentMetadata::Transport(metadata);
        segment
    }

    /// Travel from the origin to the first leg, if they differ
    pub async fn build_outbound_segment(
        &self,
        trip: &Trip,
        allocation: &mut BudgetAllocation,
    ) -> Option<Segment> {
        let first = trip.legs.first()?;
        if trip.origin.is_empty()
            || normalize_place(&trip.origin) == normalize_place(&first.location)
        {
            return None;
        }
        Some(
            self.build_travel_segment(
                trip,
                &trip.origin,
                &first.location,
                SegmentKind::OutboundTravel,
                1,
                OUTBOUND_ORDER,
                allocation,
            )
            .await,
        )
    }

    /// One travel segment per leg boundary, scheduled on the arrival day
    pub async fn build_intercity_segments(
        &self,
        trip: &Trip,
        allocation: &mut BudgetAllocation,
    ) -> Vec<Segment> {
        let mut segments = Vec::new();
        for i in 1..trip.legs.len() {
            let from = &trip.legs[i - 1].location;
            let to = &trip.legs[i].location;
            let day = trip.first_day_of_leg(i);
            segments.push(
                self.build_travel_segment(
                    trip,
                    from,
                    to,
                    SegmentKind::IntercityTravel,
                    day,
                    -1.0,
                    allocation,
                )
                .await,
            );
        }
        segments
    }

    /// Travel back to the origin on the final day, symmetric with outbound
    pub async fn build_return_segment(
        &self,
        trip: &Trip,
        allocation: &mut BudgetAllocation,
    ) -> Option<Segment> {
        let last = trip.legs.last()?;
        if trip.origin.is_empty()
            || normalize_place(&trip.origin) == normalize_place(&last.location)
        {
            return None;
        }
        Some(
            self.build_travel_segment(
                trip,
                &last.location,
                &trip.origin,
                SegmentKind::ReturnTravel,
                trip.total_days().max(1),
                RETURN_ORDER,
                allocation,
            )
            .await,
        )
    }

    /// One accommodation segment per night, at that night's leg location
    pub fn build_accommodation_segments(
        &self,
        trip: &Trip,
        allocation: &mut BudgetAllocation,
    ) -> Vec<Segment> {
        let per_night = allocation.accommodation_per_night.round();
        let mut segments = Vec::new();

        for day in 1..=trip.total_nights() {
            let location = trip.location_for_day(day).to_string();
            allocation.deduct(BudgetCategory::Accommodation, per_night);

            let mut segment =
                Segment::new(SegmentKind::Accommodation, day, format!("Night in {location}"));
            segment.location = location;
            segment.order_index = ACCOMMODATION_ORDER;
            segment.estimated_cost = per_night;
            segment.metadata = SegmentMetadata::Accommodation(AccommodationMetadata::default());
            segments.push(segment);
        }
        segments
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
