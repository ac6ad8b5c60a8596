//! Booking suggestion engine
//!
//! Synthetic provider options for bookable travel segments. Candidates are
//! generated from a seed derived from the segment identity, so repeated calls
//! for the same segment return identical options instead of reshuffling on
//! every render.

use std::hash::{DefaultHasher, Hash, Hasher};

use rand::{RngExt, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::models::{Segment, TransportMode};

/// Attached to every option; these are never live offers
pub const DEMO_DISCLAIMER: &str = "Demo mode: synthetic option, not a live booking";

const FLIGHT_PROVIDERS: &[&str] = &[
    "SkyLink Air",
    "AeroJet",
    "GlobalWings",
    "TransContinental",
    "BlueHorizon Air",
];
const TRAIN_PROVIDERS: &[&str] = &[
    "RailConnect",
    "EuroTrack",
    "ExpressRail",
    "InterCity Lines",
    "NightStar Rail",
];
const BUS_PROVIDERS: &[&str] = &[
    "CityCoach",
    "RoadRunner Lines",
    "ComfortBus",
    "GreenWay Coaches",
    "MetroLink Bus",
];

/// Fallback base price in USD when a segment's cost was clamped to zero
const FALLBACK_BASE_USD: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingOption {
    pub provider: String,
    pub price: f64,
    /// Synthetic review score, 3.5 to 5.0
    pub rating: f64,
    pub duration_hours: f64,
    /// Options are sorted descending by this
    pub score: f64,
    pub tag: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SuggestOptions {
    pub is_luxury: bool,
    /// Unspent luxury upgrade budget, split across bookable segments
    pub upgrade_pool: f64,
    /// Number of bookable travel segments in the whole trip
    pub bookable_segments: usize,
}

fn segment_seed(segment: &Segment) -> u64 {
    let mut hasher = DefaultHasher::new();
    segment.title.hash(&mut hasher);
    segment.day_number.hash(&mut hasher);
    segment.kind.hash(&mut hasher);
    hasher.finish()
}

fn providers_for(mode: TransportMode) -> &'static [&'static str] {
    match mode {
        TransportMode::Flight => FLIGHT_PROVIDERS,
        TransportMode::Train => TRAIN_PROVIDERS,
        TransportMode::Bus => BUS_PROVIDERS,
        TransportMode::Car | TransportMode::Bike => &[],
    }
}

/// Generate up to three booking options for a travel segment, plus a premium
/// upgrade on luxury trips with leftover pool.
///
/// Own-vehicle modes get a single pass-through option at actual cost; there
/// is nothing to book for them.
#[must_use]
pub fn suggest(segment: &Segment, currency_rate: f64, options: &SuggestOptions) -> Vec<BookingOption> {
    let Some(metadata) = segment.metadata.as_transport() else {
        return Vec::new();
    };
    if !segment.kind.is_bookable_travel() {
        return Vec::new();
    }

    if matches!(metadata.mode, TransportMode::Car | TransportMode::Bike) {
        return vec![BookingOption {
            provider: "Own vehicle".to_string(),
            price: segment.estimated_cost,
            rating: 5.0,
            duration_hours: metadata.duration_hours,
            score: 5.0,
            tag: DEMO_DISCLAIMER.to_string(),
        }];
    }

    let providers = providers_for(metadata.mode);
    let base_price = if segment.estimated_cost > 0.0 {
        segment.estimated_cost
    } else {
        FALLBACK_BASE_USD * currency_rate
    };

    let mut rng = StdRng::seed_from_u64(segment_seed(segment));
    let count = rng.random_range(4..=5).min(providers.len());

    let mut candidates: Vec<BookingOption> = (0..count)
        .map(|i| {
            let price = (base_price * rng.random_range(0.8..1.25)).round();
            let rating = (rng.random_range(3.5..5.0_f64) * 10.0).round() / 10.0;
            let duration_hours =
                (metadata.duration_hours * rng.random_range(0.9..1.15) * 10.0).round() / 10.0;
            // Cheaper and better-rated wins; small penalty for slow options
            let score = rating * 20.0 - (price / base_price) * 10.0 - duration_hours;
            BookingOption {
                provider: providers[i].to_string(),
                price,
                rating,
                duration_hours,
                score: (score * 10.0).round() / 10.0,
                tag: DEMO_DISCLAIMER.to_string(),
            }
        })
        .collect();

    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates.truncate(3);

    if options.is_luxury && options.upgrade_pool > 0.0 {
        let share = options.upgrade_pool / options.bookable_segments.max(1) as f64;
        let best_price = candidates.first().map_or(base_price, |c| c.price);
        candidates.push(BookingOption {
            provider: format!("{} First Class", providers[0]),
            price: (best_price + share).round(),
            rating: 5.0,
            duration_hours: metadata.duration_hours,
            score: 100.0,
            tag: format!("Premium upgrade ({DEMO_DISCLAIMER})"),
        });
    }

    candidates
}
