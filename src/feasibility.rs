//! Feasibility guards
//!
//! Seven ordered, pure corrections applied to generated activity segments:
//! each guard takes the current segment list and returns the corrected list
//! plus a human-readable issue string for every mutation. Issues are
//! surfaced as corrections, never as fatal errors.

use chrono::NaiveTime;
use tracing::debug;

use crate::models::{BudgetTier, Coordinate, Segment, SegmentKind, TravelStyle};

/// Trip-level facts the guards need
#[derive(Debug, Clone)]
pub struct GuardContext {
    pub travel_style: TravelStyle,
    pub budget_tier: BudgetTier,
    pub total_days: u32,
    /// Trip starts somewhere other than its first destination
    pub is_intercity_trip: bool,
    /// Arrival time of the outbound leg, when known
    pub arrival_day_one: Option<NaiveTime>,
    /// Departure time of the return leg, when known
    pub final_departure: Option<NaiveTime>,
}

impl GuardContext {
    /// Build a context from the trip facts and the already-built transport
    /// segments, pulling arrival/departure times out of their metadata.
    #[must_use]
    pub fn new(
        travel_style: TravelStyle,
        budget_tier: BudgetTier,
        total_days: u32,
        is_intercity_trip: bool,
        transport_segments: &[Segment],
    ) -> Self {
        let time_of = |kind: SegmentKind, arrival: bool| {
            transport_segments
                .iter()
                .find(|s| s.kind == kind)
                .and_then(|s| s.metadata.as_transport())
                .and_then(|m| {
                    if arrival {
                        m.arrival.as_deref()
                    } else {
                        m.departure.as_deref()
                    }
                })
                .and_then(parse_time)
        };

        Self {
            travel_style,
            budget_tier,
            total_days,
            is_intercity_trip,
            arrival_day_one: time_of(SegmentKind::OutboundTravel, true),
            final_departure: time_of(SegmentKind::ReturnTravel, false),
        }
    }
}

type Guard = fn(Vec<Segment>, &GuardContext) -> (Vec<Segment>, Vec<String>);

/// Guards run in this order; later guards see earlier corrections
const GUARDS: [Guard; 7] = [
    guard_single_day_intercity,
    guard_activity_count,
    guard_arrival_buffer,
    guard_departure_buffer,
    guard_geo_reorder,
    guard_daily_time_cap,
    guard_cost_ceiling,
];

/// Run all seven guards over the activity segments
#[must_use]
pub fn apply_guards(
    activities: Vec<Segment>,
    context: &GuardContext,
) -> (Vec<Segment>, Vec<String>) {
    let mut segments = activities;
    let mut issues = Vec::new();
    for guard in GUARDS {
        let (next, mut found) = guard(segments, context);
        segments = next;
        issues.append(&mut found);
    }
    if !issues.is_empty() {
        debug!(corrections = issues.len(), "feasibility guards made corrections");
    }
    (segments, issues)
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

fn activity_time(segment: &Segment) -> Option<NaiveTime> {
    segment
        .metadata
        .as_activity()
        .and_then(|a| a.time.as_deref())
        .and_then(parse_time)
}

fn days_of(segments: &[Segment]) -> Vec<u32> {
    let mut days: Vec<u32> = segments.iter().map(|s| s.day_number).collect();
    days.sort_unstable();
    days.dedup();
    days
}

/// Maximum activities per day by travel style
#[must_use]
pub fn style_activity_cap(style: TravelStyle) -> usize {
    match style {
        TravelStyle::Relaxation => 3,
        TravelStyle::CityExplorer => 4,
        TravelStyle::Adventure => 5,
        TravelStyle::Business => 2,
        TravelStyle::RoadTrip => 4,
    }
}

/// Per-activity cost ceiling by budget tier, blunts hallucinated prices
#[must_use]
pub fn tier_cost_ceiling(tier: BudgetTier) -> f64 {
    match tier {
        BudgetTier::Budget => 500.0,
        BudgetTier::MidRange => 2000.0,
        BudgetTier::Luxury => 8000.0,
    }
}

/// Guard 1: a single-day trip to another city with six or more geocoded
/// activities keeps only three. A safety net for long-haul day trips; the
/// ordinary per-style cap is guard 2.
fn guard_single_day_intercity(
    mut segments: Vec<Segment>,
    context: &GuardContext,
) -> (Vec<Segment>, Vec<String>) {
    let mut issues = Vec::new();
    if context.total_days != 1 || !context.is_intercity_trip {
        return (segments, issues);
    }

    let geocoded = segments.iter().filter(|s| s.coordinate.is_some()).count();
    if geocoded < 6 {
        return (segments, issues);
    }

    let mut kept = 0;
    segments.retain(|s| {
        if s.coordinate.is_none() {
            return true;
        }
        kept += 1;
        if kept > 3 {
            issues.push(format!(
                "Removed '{}': a single-day trip with travel cannot fit more than 3 activities",
                s.title
            ));
            false
        } else {
            true
        }
    });
    (segments, issues)
}

/// Guard 2: cap activities per day by travel style, dropping the highest
/// order_index (lowest priority) first
fn guard_activity_count(
    mut segments: Vec<Segment>,
    context: &GuardContext,
) -> (Vec<Segment>, Vec<String>) {
    let cap = style_activity_cap(context.travel_style);
    let mut issues = Vec::new();

    for day in days_of(&segments) {
        let mut indexed: Vec<(usize, f64)> = segments
            .iter()
            .enumerate()
            .filter(|(_, s)| s.day_number == day)
            .map(|(i, s)| (i, s.order_index))
            .collect();
        if indexed.len() <= cap {
            continue;
        }
        indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
        let drop: Vec<usize> = indexed.iter().take(indexed.len() - cap).map(|&(i, _)| i).collect();

        let mut position = 0;
        segments.retain(|s| {
            let dropped = drop.contains(&position);
            if dropped {
                issues.push(format!(
                    "Removed '{}' on day {day}: exceeds the {} activity limit of {cap} per day",
                    s.title,
                    context.travel_style.as_str()
                ));
            }
            position += 1;
            !dropped
        });
    }
    (segments, issues)
}

/// Guard 3: day-1 activities scheduled before arrival plus a 30-minute
/// buffer are shifted, not dropped
fn guard_arrival_buffer(
    mut segments: Vec<Segment>,
    context: &GuardContext,
) -> (Vec<Segment>, Vec<String>) {
    let mut issues = Vec::new();
    let Some(arrival) = context.arrival_day_one else {
        return (segments, issues);
    };
    let earliest = arrival + chrono::Duration::minutes(30);

    for segment in segments.iter_mut().filter(|s| s.day_number == 1) {
        if let Some(time) = activity_time(segment) {
            if time < earliest {
                if let Some(meta) = segment.metadata.as_activity_mut() {
                    meta.time = Some(earliest.format("%H:%M").to_string());
                }
                issues.push(format!(
                    "Shifted '{}' to {} to leave time after arrival",
                    segment.title,
                    earliest.format("%H:%M")
                ));
            }
        }
    }
    (segments, issues)
}

/// Guard 4: drop the final day's last activity when its end time (60 minutes
/// after start) intrudes into the 90-minute pre-departure window
fn guard_departure_buffer(
    mut segments: Vec<Segment>,
    context: &GuardContext,
) -> (Vec<Segment>, Vec<String>) {
    let mut issues = Vec::new();
    let Some(departure) = context.final_departure else {
        return (segments, issues);
    };
    let final_day = context.total_days;
    let cutoff = departure - chrono::Duration::minutes(90);

    let last = segments
        .iter()
        .enumerate()
        .filter(|(_, s)| s.day_number == final_day)
        .filter_map(|(i, s)| activity_time(s).map(|t| (i, t)))
        .max_by_key(|&(_, t)| t);

    if let Some((index, start)) = last {
        let end = start + chrono::Duration::minutes(60);
        if end > cutoff {
            let removed = segments.remove(index);
            issues.push(format!(
                "Removed '{}': it would end too close to the {} departure",
                removed.title,
                departure.format("%H:%M")
            ));
        }
    }
    (segments, issues)
}

/// Greedy nearest-neighbor walk over one day's geocoded activities.
/// Returns the visit order as indices into `day` plus indices of outliers
/// (next hop over 40 km) that should be dropped.
fn nearest_neighbor_order(day: &[(&Segment, Coordinate)]) -> (Vec<usize>, Vec<usize>) {
    const OUTLIER_KM: f64 = 40.0;

    let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    let start = day
        .iter()
        .enumerate()
        .min_by_key(|(_, (s, _))| activity_time(s).unwrap_or(end_of_day))
        .map_or(0, |(i, _)| i);

    let mut order = vec![start];
    let mut dropped = Vec::new();
    let mut remaining: Vec<usize> = (0..day.len()).filter(|&i| i != start).collect();
    let mut current = start;

    while !remaining.is_empty() {
        let here = day[current].1;
        let position = remaining
            .iter()
            .enumerate()
            .min_by(|&(_, &a), &(_, &b)| {
                here.distance_km(&day[a].1).total_cmp(&here.distance_km(&day[b].1))
            })
            .map_or(0, |(p, _)| p);
        let next = remaining.remove(position);

        if here.distance_km(&day[next].1) > OUTLIER_KM {
            dropped.push(next);
        } else {
            order.push(next);
            current = next;
        }
    }
    (order, dropped)
}

/// Guard 5: reorder each day's geocoded activities into a nearest-neighbor
/// tour starting from the earliest-scheduled one; hops over 40 km mark the
/// farther activity as an outlier and drop it. Non-geocoded activities keep
/// their relative order after the tour.
fn guard_geo_reorder(
    segments: Vec<Segment>,
    _context: &GuardContext,
) -> (Vec<Segment>, Vec<String>) {
    let mut issues = Vec::new();
    let mut result: Vec<Segment> = Vec::with_capacity(segments.len());

    for day in days_of(&segments) {
        let day_segments: Vec<&Segment> =
            segments.iter().filter(|s| s.day_number == day).collect();
        let geocoded: Vec<(&Segment, Coordinate)> = day_segments
            .iter()
            .filter_map(|s| s.coordinate.map(|c| (*s, c)))
            .collect();

        if geocoded.len() < 2 {
            result.extend(day_segments.into_iter().cloned());
            continue;
        }

        let (order, dropped) = nearest_neighbor_order(&geocoded);
        for &outlier in &dropped {
            issues.push(format!(
                "Removed '{}' on day {day}: over 40 km from the rest of the day's plan",
                geocoded[outlier].0.title
            ));
        }

        let mut reordered: Vec<Segment> =
            order.iter().map(|&i| geocoded[i].0.clone()).collect();
        reordered.extend(
            day_segments
                .iter()
                .filter(|s| s.coordinate.is_none())
                .map(|s| (*s).clone()),
        );
        for (position, segment) in reordered.iter_mut().enumerate() {
            segment.order_index = position as f64 + 1.0;
        }
        result.extend(reordered);
    }
    (result, issues)
}

/// Guard 6: trim each day to at most 600 active minutes, modeling 60 minutes
/// per activity plus 30 minutes between activities
fn guard_daily_time_cap(
    mut segments: Vec<Segment>,
    _context: &GuardContext,
) -> (Vec<Segment>, Vec<String>) {
    const DAILY_CAP_MINUTES: i64 = 600;
    const ACTIVITY_MINUTES: i64 = 60;
    const BUFFER_MINUTES: i64 = 30;

    let minutes_for = |count: i64| {
        if count == 0 {
            0
        } else {
            count * ACTIVITY_MINUTES + (count - 1) * BUFFER_MINUTES
        }
    };

    let mut issues = Vec::new();
    for day in days_of(&segments) {
        loop {
            let day_indices: Vec<usize> = segments
                .iter()
                .enumerate()
                .filter(|(_, s)| s.day_number == day)
                .map(|(i, _)| i)
                .collect();
            if minutes_for(day_indices.len() as i64) <= DAILY_CAP_MINUTES {
                break;
            }
            let last = day_indices
                .into_iter()
                .max_by(|&a, &b| segments[a].order_index.total_cmp(&segments[b].order_index));
            if let Some(index) = last {
                let removed = segments.remove(index);
                issues.push(format!(
                    "Removed '{}' on day {day}: the day exceeds 10 hours of activities",
                    removed.title
                ));
            } else {
                break;
            }
        }
    }
    (segments, issues)
}

/// Guard 7: hard-clamp per-activity cost to the budget-tier ceiling
fn guard_cost_ceiling(
    mut segments: Vec<Segment>,
    context: &GuardContext,
) -> (Vec<Segment>, Vec<String>) {
    let ceiling = tier_cost_ceiling(context.budget_tier);
    let mut issues = Vec::new();
    for segment in &mut segments {
        if segment.estimated_cost > ceiling {
            issues.push(format!(
                "Capped cost of '{}' from {:.0} to {ceiling:.0}",
                segment.title, segment.estimated_cost
            ));
            segment.estimated_cost = ceiling;
        }
    }
    (segments, issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ActivityMetadata, Coordinate, SegmentMetadata, TransportMetadata, TransportMode,
    };

    fn context(style: TravelStyle) -> GuardContext {
        GuardContext {
            travel_style: style,
            budget_tier: BudgetTier::MidRange,
            total_days: 3,
            is_intercity_trip: true,
            arrival_day_one: None,
            final_departure: None,
        }
    }

    fn activity(
        day: u32,
        order: f64,
        title: &str,
        time: Option<&str>,
        coordinate: Option<Coordinate>,
    ) -> Segment {
        let mut s = Segment::new(SegmentKind::Activity, day, title);
        s.order_index = order;
        s.coordinate = coordinate;
        s.metadata = SegmentMetadata::Activity(ActivityMetadata {
            time: time.map(str::to_string),
            ..Default::default()
        });
        s
    }

    #[test]
    fn test_context_reads_transport_times() {
        let mut outbound = Segment::new(SegmentKind::OutboundTravel, 1, "Berlin to Rome");
        let mut meta = TransportMetadata::new(TransportMode::Train, 11.0);
        meta.arrival = Some("07:00".to_string());
        outbound.metadata = SegmentMetadata::Transport(meta);

        let mut back = Segment::new(SegmentKind::ReturnTravel, 3, "Rome to Berlin");
        let mut meta = TransportMetadata::new(TransportMode::Train, 11.0);
        meta.departure = Some("21:00".to_string());
        back.metadata = SegmentMetadata::Transport(meta);

        let ctx = GuardContext::new(
            TravelStyle::CityExplorer,
            BudgetTier::MidRange,
            3,
            true,
            &[outbound, back],
        );
        assert_eq!(ctx.arrival_day_one, parse_time("07:00"));
        assert_eq!(ctx.final_departure, parse_time("21:00"));
    }

    #[test]
    fn test_style_cap_drops_highest_order_first() {
        let segments = vec![
            activity(1, 1.0, "first", None, None),
            activity(1, 2.0, "second", None, None),
            activity(1, 3.0, "third", None, None),
        ];
        let (kept, issues) = guard_activity_count(segments, &context(TravelStyle::Business));
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|s| s.title != "third"));
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("third"));
    }

    #[test]
    fn test_single_day_trip_capped_at_three() {
        let segments: Vec<Segment> = (0..7)
            .map(|i| {
                activity(
                    1,
                    f64::from(i),
                    &format!("a{i}"),
                    None,
                    Some(Coordinate::new(48.8, 2.3 + f64::from(i) * 0.001)),
                )
            })
            .collect();
        let mut ctx = context(TravelStyle::Adventure);
        ctx.total_days = 1;
        let (kept, issues) = guard_single_day_intercity(segments, &ctx);
        assert_eq!(kept.len(), 3);
        assert_eq!(issues.len(), 4);
    }

    #[test]
    fn test_single_day_cap_skipped_for_multi_day_trips() {
        let segments: Vec<Segment> = (0..7)
            .map(|i| {
                activity(
                    1,
                    f64::from(i),
                    &format!("a{i}"),
                    None,
                    Some(Coordinate::new(48.8, 2.3)),
                )
            })
            .collect();
        let (kept, issues) = guard_single_day_intercity(segments, &context(TravelStyle::Adventure));
        assert_eq!(kept.len(), 7);
        assert!(issues.is_empty());
    }

    #[test]
    fn test_arrival_shifts_early_activities() {
        let mut ctx = context(TravelStyle::CityExplorer);
        ctx.arrival_day_one = parse_time("10:00");
        let segments = vec![
            activity(1, 1.0, "early", Some("09:00"), None),
            activity(1, 2.0, "late", Some("14:00"), None),
        ];
        let (kept, issues) = guard_arrival_buffer(segments, &ctx);
        assert_eq!(kept.len(), 2);
        assert_eq!(
            kept[0].metadata.as_activity().unwrap().time.as_deref(),
            Some("10:30")
        );
        assert_eq!(
            kept[1].metadata.as_activity().unwrap().time.as_deref(),
            Some("14:00")
        );
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn test_departure_drops_conflicting_last_activity() {
        let mut ctx = context(TravelStyle::CityExplorer);
        ctx.final_departure = parse_time("18:00");
        // Last activity ends 18:00, inside the 90-minute buffer before 18:00
        let segments = vec![
            activity(3, 1.0, "morning", Some("10:00"), None),
            activity(3, 2.0, "conflicting", Some("17:00"), None),
        ];
        let (kept, issues) = guard_departure_buffer(segments, &ctx);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].title, "morning");
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn test_departure_keeps_activities_clear_of_buffer() {
        let mut ctx = context(TravelStyle::CityExplorer);
        ctx.final_departure = parse_time("21:00");
        let segments = vec![activity(3, 1.0, "dinner", Some("17:00"), None)];
        let (kept, issues) = guard_departure_buffer(segments, &ctx);
        assert_eq!(kept.len(), 1);
        assert!(issues.is_empty());
    }

    #[test]
    fn test_geo_reorder_builds_nearest_neighbor_tour() {
        // Three points on a line; the scheduled earliest is on one end, so the
        // tour must visit them in line order rather than the given order
        let segments = vec![
            activity(1, 1.0, "middle", Some("12:00"), Some(Coordinate::new(48.85, 2.35))),
            activity(1, 2.0, "west", Some("09:00"), Some(Coordinate::new(48.85, 2.30))),
            activity(1, 3.0, "east", Some("15:00"), Some(Coordinate::new(48.85, 2.40))),
        ];
        let (kept, issues) = guard_geo_reorder(segments, &context(TravelStyle::CityExplorer));
        assert!(issues.is_empty());
        let titles: Vec<&str> = kept.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["west", "middle", "east"]);
        assert_eq!(kept[0].order_index, 1.0);
        assert_eq!(kept[2].order_index, 3.0);
    }

    #[test]
    fn test_geo_reorder_drops_forty_km_outlier() {
        let segments = vec![
            activity(1, 1.0, "center", Some("09:00"), Some(Coordinate::new(48.85, 2.35))),
            activity(1, 2.0, "nearby", None, Some(Coordinate::new(48.86, 2.36))),
            // ~85 km away
            activity(1, 3.0, "faraway", None, Some(Coordinate::new(49.43, 2.82))),
        ];
        let (kept, issues) = guard_geo_reorder(segments, &context(TravelStyle::CityExplorer));
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|s| s.title != "faraway"));
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("faraway"));
    }

    #[test]
    fn test_geo_reorder_appends_non_geocoded_in_original_order() {
        let segments = vec![
            activity(1, 1.0, "geo-a", Some("09:00"), Some(Coordinate::new(48.85, 2.35))),
            activity(1, 2.0, "no-geo-1", None, None),
            activity(1, 3.0, "geo-b", None, Some(Coordinate::new(48.86, 2.36))),
            activity(1, 4.0, "no-geo-2", None, None),
        ];
        let (kept, _) = guard_geo_reorder(segments, &context(TravelStyle::CityExplorer));
        let titles: Vec<&str> = kept.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["geo-a", "geo-b", "no-geo-1", "no-geo-2"]);
    }

    fn tour_length(segments: &[Segment]) -> f64 {
        let coords: Vec<Coordinate> = segments.iter().filter_map(|s| s.coordinate).collect();
        coords.windows(2).map(|w| w[0].distance_km(&w[1])).sum()
    }

    #[test]
    fn test_geo_reorder_never_lengthens_the_tour() {
        let fixtures: Vec<Vec<Segment>> = vec![
            // A scrambled east-west line
            vec![
                activity(1, 1.0, "d", Some("09:00"), Some(Coordinate::new(48.85, 2.38))),
                activity(1, 2.0, "a", None, Some(Coordinate::new(48.85, 2.30))),
                activity(1, 3.0, "c", None, Some(Coordinate::new(48.85, 2.36))),
                activity(1, 4.0, "b", None, Some(Coordinate::new(48.85, 2.33))),
            ],
            // Two tight clusters visited alternately
            vec![
                activity(1, 1.0, "n1", Some("09:00"), Some(Coordinate::new(41.90, 12.47))),
                activity(1, 2.0, "s1", None, Some(Coordinate::new(41.85, 12.50))),
                activity(1, 3.0, "n2", None, Some(Coordinate::new(41.91, 12.48))),
                activity(1, 4.0, "s2", None, Some(Coordinate::new(41.86, 12.51))),
            ],
            // Already optimal, must stay that way
            vec![
                activity(1, 1.0, "p1", Some("09:00"), Some(Coordinate::new(35.01, 135.76))),
                activity(1, 2.0, "p2", None, Some(Coordinate::new(35.02, 135.77))),
                activity(1, 3.0, "p3", None, Some(Coordinate::new(35.03, 135.78))),
            ],
        ];

        for fixture in fixtures {
            let before = tour_length(&fixture);
            let (kept, _) = guard_geo_reorder(fixture, &context(TravelStyle::CityExplorer));
            let after = tour_length(&kept);
            assert!(
                after <= before + 1e-9,
                "reorder lengthened the tour: {before} km -> {after} km"
            );
        }
    }

    #[test]
    fn test_daily_time_cap_trims_to_seven() {
        // 8 activities model to 8*60 + 7*30 = 690 min; 7 fit exactly at 600
        let segments: Vec<Segment> = (0..8)
            .map(|i| activity(1, f64::from(i), &format!("a{i}"), None, None))
            .collect();
        let (kept, issues) = guard_daily_time_cap(segments, &context(TravelStyle::Adventure));
        assert_eq!(kept.len(), 7);
        assert_eq!(issues.len(), 1);
        assert!(kept.iter().all(|s| s.title != "a7"));
    }

    #[test]
    fn test_cost_ceiling_clamps_per_tier() {
        let mut expensive = activity(1, 1.0, "heli tour", None, None);
        expensive.estimated_cost = 12_000.0;
        let cheap = activity(1, 2.0, "museum", None, None);

        let mut ctx = context(TravelStyle::CityExplorer);
        ctx.budget_tier = BudgetTier::Budget;
        let (kept, issues) = guard_cost_ceiling(vec![expensive, cheap], &ctx);
        assert_eq!(kept[0].estimated_cost, 500.0);
        assert_eq!(kept[1].estimated_cost, 0.0);
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn test_full_pipeline_composes() {
        let mut ctx = context(TravelStyle::Business);
        ctx.budget_tier = BudgetTier::Budget;
        let mut pricey = activity(1, 1.0, "gala", None, None);
        pricey.estimated_cost = 900.0;
        let segments = vec![
            pricey,
            activity(1, 2.0, "meeting", None, None),
            activity(1, 3.0, "extra", None, None),
        ];
        let (kept, issues) = apply_guards(segments, &ctx);
        // Business cap drops "extra", cost ceiling clamps "gala"
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].estimated_cost, 500.0);
        assert_eq!(issues.len(), 2);
    }
}
