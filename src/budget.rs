//! Budget allocation and reconciliation
//!
//! A total budget is split into named envelopes by ratio tables keyed on
//! travel style and budget tier. Envelopes carry a mutable remaining balance
//! that every segment-building step deducts from; deductions clamp at zero
//! and never fail. Reconciliation compares actual segment costs against the
//! envelopes and is recomputed whenever segments change.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::TripWeaverError;
use crate::models::{BudgetTier, Segment, SegmentKind, TravelStyle, Trip};

/// Fractional envelope shares; normalized before use
#[derive(Debug, Clone, Copy)]
pub struct RatioTable {
    pub intercity: f64,
    pub accommodation: f64,
    pub local_transport: f64,
    pub activity: f64,
    pub buffer: f64,
    pub upgrade_pool: f64,
}

/// Baseline split for most style/tier combinations
pub const DEFAULT_RATIOS: RatioTable = RatioTable {
    intercity: 0.20,
    accommodation: 0.30,
    local_transport: 0.10,
    activity: 0.25,
    buffer: 0.15,
    upgrade_pool: 0.0,
};

/// Road trips spend more on getting around and less on local hops
pub const ROAD_TRIP_RATIOS: RatioTable = RatioTable {
    intercity: 0.35,
    accommodation: 0.25,
    local_transport: 0.05,
    activity: 0.20,
    buffer: 0.15,
    upgrade_pool: 0.0,
};

/// Luxury trips reserve an upgrade pool for premium booking options
pub const LUXURY_RATIOS: RatioTable = RatioTable {
    intercity: 0.18,
    accommodation: 0.32,
    local_transport: 0.08,
    activity: 0.22,
    buffer: 0.10,
    upgrade_pool: 0.10,
};

/// Named sub-budget categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetCategory {
    Intercity,
    Accommodation,
    LocalTransport,
    Activity,
    Buffer,
    UpgradePool,
}

impl BudgetCategory {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetCategory::Intercity => "intercity",
            BudgetCategory::Accommodation => "accommodation",
            BudgetCategory::LocalTransport => "local_transport",
            BudgetCategory::Activity => "activity",
            BudgetCategory::Buffer => "buffer",
            BudgetCategory::UpgradePool => "upgrade_pool",
        }
    }

    /// Fixed segment-kind to category mapping used by reconciliation.
    /// Hidden gems are isolated from the budget and map to nothing.
    #[must_use]
    pub fn for_kind(kind: SegmentKind) -> Option<BudgetCategory> {
        match kind {
            SegmentKind::OutboundTravel
            | SegmentKind::IntercityTravel
            | SegmentKind::ReturnTravel => Some(BudgetCategory::Intercity),
            SegmentKind::Accommodation => Some(BudgetCategory::Accommodation),
            SegmentKind::LocalTransport => Some(BudgetCategory::LocalTransport),
            SegmentKind::Activity => Some(BudgetCategory::Activity),
            SegmentKind::HiddenGem => None,
        }
    }
}

/// An allocated amount plus its mutable remaining balance
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub allocated: f64,
    pub remaining: f64,
}

impl Envelope {
    fn of(allocated: f64) -> Self {
        Self {
            allocated,
            remaining: allocated.max(0.0),
        }
    }
}

/// Inputs to [`allocate`]
#[derive(Debug, Clone)]
pub struct AllocationOptions {
    pub travel_style: TravelStyle,
    pub budget_tier: BudgetTier,
    pub total_days: u32,
    pub total_nights: u32,
    pub travelers: u32,
    pub has_own_vehicle: bool,
}

impl AllocationOptions {
    #[must_use]
    pub fn for_trip(trip: &Trip) -> Self {
        Self {
            travel_style: trip.travel_style,
            budget_tier: trip.budget_tier,
            total_days: trip.total_days(),
            total_nights: trip.total_nights(),
            travelers: trip.travelers,
            has_own_vehicle: trip.has_own_vehicle,
        }
    }
}

/// Envelope allocation for one orchestration run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetAllocation {
    pub total: f64,
    pub intercity: Envelope,
    pub accommodation: Envelope,
    pub local_transport: Envelope,
    pub activity: Envelope,
    pub buffer: Envelope,
    pub upgrade_pool: Envelope,
    pub activity_per_day: f64,
    pub accommodation_per_night: f64,
    /// Non-fatal allocation anomalies, e.g. a negative buffer after rounding
    pub soft_violations: Vec<String>,
}

impl BudgetAllocation {
    /// Allocation with everything zeroed, used for degenerate trips
    #[must_use]
    pub fn empty() -> Self {
        Self {
            total: 0.0,
            intercity: Envelope::of(0.0),
            accommodation: Envelope::of(0.0),
            local_transport: Envelope::of(0.0),
            activity: Envelope::of(0.0),
            buffer: Envelope::of(0.0),
            upgrade_pool: Envelope::of(0.0),
            activity_per_day: 0.0,
            accommodation_per_night: 0.0,
            soft_violations: Vec::new(),
        }
    }

    #[must_use]
    pub fn envelope(&self, category: BudgetCategory) -> &Envelope {
        match category {
            BudgetCategory::Intercity => &self.intercity,
            BudgetCategory::Accommodation => &self.accommodation,
            BudgetCategory::LocalTransport => &self.local_transport,
            BudgetCategory::Activity => &self.activity,
            BudgetCategory::Buffer => &self.buffer,
            BudgetCategory::UpgradePool => &self.upgrade_pool,
        }
    }

    fn envelope_mut(&mut self, category: BudgetCategory) -> &mut Envelope {
        match category {
            BudgetCategory::Intercity => &mut self.intercity,
            BudgetCategory::Accommodation => &mut self.accommodation,
            BudgetCategory::LocalTransport => &mut self.local_transport,
            BudgetCategory::Activity => &mut self.activity,
            BudgetCategory::Buffer => &mut self.buffer,
            BudgetCategory::UpgradePool => &mut self.upgrade_pool,
        }
    }

    /// Deduct a cost from a category. Remaining clamps at zero; this is a
    /// side effect only and never fails.
    pub fn deduct(&mut self, category: BudgetCategory, cost: f64) {
        let envelope = self.envelope_mut(category);
        envelope.remaining = (envelope.remaining - cost).max(0.0);
        debug!(
            category = category.as_str(),
            cost,
            remaining = envelope.remaining,
            "budget deduction"
        );
    }

    /// Sum of allocated amounts across all envelopes
    #[must_use]
    pub fn allocated_sum(&self) -> f64 {
        self.intercity.allocated
            + self.accommodation.allocated
            + self.local_transport.allocated
            + self.activity.allocated
            + self.buffer.allocated
            + self.upgrade_pool.allocated
    }
}

fn ratio_table(style: TravelStyle, tier: BudgetTier) -> RatioTable {
    if tier == BudgetTier::Luxury {
        LUXURY_RATIOS
    } else if style == TravelStyle::RoadTrip {
        ROAD_TRIP_RATIOS
    } else {
        DEFAULT_RATIOS
    }
}

/// Split a total budget into category envelopes.
///
/// The base ratio table is chosen by style and tier; an owned vehicle outside
/// road-trip mode shifts half of the intercity share into activities. Ratios
/// are normalized, multiplied out, and rounded to whole units; any rounding
/// overshoot is trimmed from the buffer.
#[must_use]
pub fn allocate(total_budget: f64, options: &AllocationOptions) -> BudgetAllocation {
    if total_budget <= 0.0 {
        return BudgetAllocation::empty();
    }

    let mut ratios = ratio_table(options.travel_style, options.budget_tier);

    if options.has_own_vehicle && options.travel_style != TravelStyle::RoadTrip {
        let shift = ratios.intercity / 2.0;
        ratios.intercity -= shift;
        ratios.activity += shift;
    }

    let ratio_sum = ratios.intercity
        + ratios.accommodation
        + ratios.local_transport
        + ratios.activity
        + ratios.buffer
        + ratios.upgrade_pool;
    let scale = total_budget / ratio_sum;

    let mut allocation = BudgetAllocation {
        total: total_budget,
        intercity: Envelope::of((ratios.intercity * scale).round()),
        accommodation: Envelope::of((ratios.accommodation * scale).round()),
        local_transport: Envelope::of((ratios.local_transport * scale).round()),
        activity: Envelope::of((ratios.activity * scale).round()),
        buffer: Envelope::of((ratios.buffer * scale).round()),
        upgrade_pool: Envelope::of((ratios.upgrade_pool * scale).round()),
        activity_per_day: 0.0,
        accommodation_per_night: 0.0,
        soft_violations: Vec::new(),
    };

    // Rounding can push the sum past the total; trim the buffer by the
    // overshoot. A buffer that was already 0 goes negative, which is a soft
    // violation rather than a fatal one.
    let overshoot = allocation.allocated_sum() - total_budget;
    if overshoot > 0.0 {
        allocation.buffer.allocated -= overshoot;
        allocation.buffer.remaining = allocation.buffer.allocated.max(0.0);
        if allocation.buffer.allocated < 0.0 {
            allocation.soft_violations.push(format!(
                "buffer envelope trimmed below zero ({:.0}) to absorb rounding overshoot",
                allocation.buffer.allocated
            ));
        }
    }

    allocation.activity_per_day = if options.total_days > 0 {
        allocation.activity.allocated / f64::from(options.total_days)
    } else {
        0.0
    };
    allocation.accommodation_per_night = if options.total_nights > 0 {
        allocation.accommodation.allocated / f64::from(options.total_nights)
    } else {
        0.0
    };

    allocation
}

/// Balanced/overshoot verdict against the allocated envelopes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconciliationReport {
    pub balanced: bool,
    pub total_budget: f64,
    pub total_spent: f64,
    pub overshoot: f64,
    pub by_category: BTreeMap<BudgetCategory, f64>,
    pub violations: Vec<String>,
}

impl ReconciliationReport {
    /// Report for a trip with no segments, trivially balanced
    #[must_use]
    pub fn empty(total_budget: f64) -> Self {
        Self {
            balanced: true,
            total_budget,
            total_spent: 0.0,
            overshoot: 0.0,
            by_category: BTreeMap::new(),
            violations: Vec::new(),
        }
    }
}

/// Sum actual segment costs per category and compare to the allocation
#[must_use]
pub fn reconcile(allocation: &BudgetAllocation, segments: &[Segment]) -> ReconciliationReport {
    let mut by_category: BTreeMap<BudgetCategory, f64> = BTreeMap::new();
    let mut total_spent = 0.0;

    for segment in segments {
        let Some(category) = BudgetCategory::for_kind(segment.kind) else {
            continue;
        };
        *by_category.entry(category).or_insert(0.0) += segment.estimated_cost;
        total_spent += segment.estimated_cost;
    }

    let mut violations = Vec::new();
    for (&category, &spent) in &by_category {
        let allocated = allocation.envelope(category).allocated;
        if spent > allocated + 0.5 {
            violations.push(format!(
                "{} spending of {:.0} exceeds its envelope of {:.0}",
                category.as_str(),
                spent,
                allocated
            ));
        }
    }

    let overshoot = (total_spent - allocation.total).max(0.0);
    if overshoot > 0.0 {
        violations.push(format!(
            "total spending of {total_spent:.0} exceeds the budget of {:.0}",
            allocation.total
        ));
    }

    ReconciliationReport {
        balanced: violations.is_empty(),
        total_budget: allocation.total,
        total_spent,
        overshoot,
        by_category,
        violations,
    }
}

/// Hard strict-budget check for a prospective single-segment addition.
/// Rejects with the specific numbers when the sum would exceed the limit.
pub fn check_strict_budget(
    current_total: f64,
    addition: f64,
    limit: f64,
) -> Result<(), TripWeaverError> {
    if current_total + addition > limit {
        return Err(TripWeaverError::budget_exceeded(
            current_total,
            addition,
            limit,
        ));
    }
    Ok(())
}

/// Strict-budget guard over a trip's persisted segments. Hidden gems never
/// count toward the budget, and the guard is only enforced on strict trips.
pub fn enforce_strict_budget(
    trip: &Trip,
    segments: &[Segment],
    addition: f64,
) -> Result<(), TripWeaverError> {
    if !trip.strict_budget {
        return Ok(());
    }
    let current_total: f64 = segments
        .iter()
        .filter(|s| s.kind != SegmentKind::HiddenGem)
        .map(|s| s.estimated_cost)
        .sum();
    check_strict_budget(current_total, addition, trip.total_budget)
}
