//! Segment model
//!
//! Segments are the sole output artifact of the engine: day-scheduled units
//! with a discriminated kind and kind-specific metadata. Metadata is a tagged
//! union rather than a loose key/value bag; the open-schema shape expected by
//! the external segment store is produced by [`Segment::to_store_record`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::models::location::Coordinate;
use crate::models::trip::TransportMode;

/// Sentinel order index for the outbound leg (sorts before everything)
pub const OUTBOUND_ORDER: f64 = -2.0;
/// Sentinel order index for the return leg (sorts after everything)
pub const RETURN_ORDER: f64 = 1000.0;
/// Order index for nightly accommodation (sorts after the day's activities)
pub const ACCOMMODATION_ORDER: f64 = 500.0;

/// Discriminant for the seven segment kinds
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    OutboundTravel,
    IntercityTravel,
    ReturnTravel,
    Accommodation,
    LocalTransport,
    Activity,
    HiddenGem,
}

impl SegmentKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentKind::OutboundTravel => "outbound_travel",
            SegmentKind::IntercityTravel => "intercity_travel",
            SegmentKind::ReturnTravel => "return_travel",
            SegmentKind::Accommodation => "accommodation",
            SegmentKind::LocalTransport => "local_transport",
            SegmentKind::Activity => "activity",
            SegmentKind::HiddenGem => "hidden_gem",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "outbound_travel" => Some(SegmentKind::OutboundTravel),
            "intercity_travel" => Some(SegmentKind::IntercityTravel),
            "return_travel" => Some(SegmentKind::ReturnTravel),
            "accommodation" => Some(SegmentKind::Accommodation),
            "local_transport" => Some(SegmentKind::LocalTransport),
            "activity" => Some(SegmentKind::Activity),
            "hidden_gem" => Some(SegmentKind::HiddenGem),
            _ => None,
        }
    }

    /// Travel kinds that can carry booking options
    #[must_use]
    pub fn is_bookable_travel(&self) -> bool {
        matches!(
            self,
            SegmentKind::OutboundTravel | SegmentKind::IntercityTravel | SegmentKind::ReturnTravel
        )
    }
}

/// Metadata for outbound/intercity/return travel segments
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TransportMetadata {
    pub mode: TransportMode,
    pub duration_hours: f64,
    /// Overnight-eligible trips get a default 21:00 -> 07:00 window
    pub is_overnight: bool,
    pub departure: Option<String>,
    pub arrival: Option<String>,
    /// Cost was altered (downgraded or clamped) to fit the envelope
    pub budget_adjusted: bool,
    /// Mode was explicitly chosen by the user and must not be downgraded
    pub user_locked: bool,
}

impl TransportMetadata {
    #[must_use]
    pub fn new(mode: TransportMode, duration_hours: f64) -> Self {
        Self {
            mode,
            duration_hours,
            is_overnight: false,
            departure: None,
            arrival: None,
            budget_adjusted: false,
            user_locked: false,
        }
    }
}

/// Metadata for nightly accommodation segments
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct AccommodationMetadata {
    pub check_in: Option<String>,
    pub notes: Option<String>,
}

/// Metadata for activity and hidden-gem segments
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ActivityMetadata {
    /// Scheduled start time, "HH:MM"
    pub time: Option<String>,
    pub activity_type: Option<String>,
    pub notes: Option<String>,
    pub safety_warning: Option<String>,
    /// All resolver tiers failed for this activity's location
    pub geocode_failed: bool,
}

/// Metadata for pairwise local-transport hops
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LocalTransportMetadata {
    /// Hop mode label, e.g. "taxi" or "metro"
    pub mode: String,
    pub distance_km: f64,
}

/// Kind-specific segment metadata as a tagged union
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SegmentMetadata {
    Transport(TransportMetadata),
    Accommodation(AccommodationMetadata),
    Activity(ActivityMetadata),
    LocalTransport(LocalTransportMetadata),
    #[default]
    None,
}

impl SegmentMetadata {
    #[must_use]
    pub fn as_transport(&self) -> Option<&TransportMetadata> {
        match self {
            SegmentMetadata::Transport(t) => Some(t),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_activity(&self) -> Option<&ActivityMetadata> {
        match self {
            SegmentMetadata::Activity(a) => Some(a),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_activity_mut(&mut self) -> Option<&mut ActivityMetadata> {
        match self {
            SegmentMetadata::Activity(a) => Some(a),
            _ => None,
        }
    }
}

/// A day-scheduled itinerary unit
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Segment {
    pub kind: SegmentKind,
    /// 1-based trip day; 0 for trip-wide items such as hidden gems
    pub day_number: u32,
    /// Sort key within a day. Fractional offsets are used transiently during
    /// local-transport insertion; the orchestrator re-indexes to dense
    /// integers before handing segments out.
    pub order_index: f64,
    pub title: String,
    pub location: String,
    pub estimated_cost: f64,
    pub coordinate: Option<Coordinate>,
    pub metadata: SegmentMetadata,
}

impl Segment {
    #[must_use]
    pub fn new<S: Into<String>>(kind: SegmentKind, day_number: u32, title: S) -> Self {
        Self {
            kind,
            day_number,
            order_index: 0.0,
            title: title.into(),
            location: String::new(),
            estimated_cost: 0.0,
            coordinate: None,
            metadata: SegmentMetadata::None,
        }
    }

    /// Whether this activity's location failed every resolver tier
    #[must_use]
    pub fn geocode_failed(&self) -> bool {
        self.metadata
            .as_activity()
            .is_some_and(|a| a.geocode_failed)
    }

    /// Flatten into the open key/value record shape of the external store
    #[must_use]
    pub fn to_store_record(&self) -> Value {
        let mut meta = Map::new();
        match &self.metadata {
            SegmentMetadata::Transport(t) => {
                meta.insert("transport_mode".into(), json!(t.mode.as_str()));
                meta.insert("duration_hours".into(), json!(t.duration_hours));
                meta.insert("isOvernight".into(), json!(t.is_overnight));
                if let Some(dep) = &t.departure {
                    meta.insert("departure".into(), json!(dep));
                }
                if let Some(arr) = &t.arrival {
                    meta.insert("arrival".into(), json!(arr));
                }
            }
            SegmentMetadata::Accommodation(a) => {
                if let Some(check_in) = &a.check_in {
                    meta.insert("check_in".into(), json!(check_in));
                }
                if let Some(notes) = &a.notes {
                    meta.insert("notes".into(), json!(notes));
                }
            }
            SegmentMetadata::Activity(a) => {
                if let Some(time) = &a.time {
                    meta.insert("time".into(), json!(time));
                }
                if let Some(kind) = &a.activity_type {
                    meta.insert("activityType".into(), json!(kind));
                }
                if let Some(notes) = &a.notes {
                    meta.insert("notes".into(), json!(notes));
                }
                if let Some(warning) = &a.safety_warning {
                    meta.insert("safety_warning".into(), json!(warning));
                }
                if a.geocode_failed {
                    meta.insert("geocode_failed".into(), json!(true));
                }
            }
            SegmentMetadata::LocalTransport(l) => {
                meta.insert("transport_mode".into(), json!(l.mode));
                meta.insert("distance_km".into(), json!(l.distance_km));
            }
            SegmentMetadata::None => {}
        }
        if let Some(coord) = &self.coordinate {
            meta.insert("latitude".into(), json!(coord.latitude));
            meta.insert("longitude".into(), json!(coord.longitude));
        }

        json!({
            "type": self.kind.as_str(),
            "day_number": self.day_number,
            "order_index": self.order_index,
            "title": self.title,
            "location": self.location,
            "estimated_cost": self.estimated_cost,
            "metadata": Value::Object(meta),
        })
    }

    /// Rebuild a segment from an open-schema store record. Unknown or
    /// malformed metadata keys are ignored; only the kind and title are
    /// required.
    #[must_use]
    pub fn from_store_record(record: &Value) -> Option<Self> {
        let kind = SegmentKind::parse(record.get("type")?.as_str()?)?;
        let title = record.get("title")?.as_str()?.to_string();

        let mut segment = Segment::new(kind, 0, title);
        segment.day_number = record
            .get("day_number")
            .and_then(Value::as_u64)
            .and_then(|d| u32::try_from(d).ok())
            .unwrap_or(0);
        segment.order_index = record
            .get("order_index")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        segment.location = record
            .get("location")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        segment.estimated_cost = record
            .get("estimated_cost")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);

        let meta = record.get("metadata").and_then(Value::as_object);
        let field_str = |key: &str| {
            meta.and_then(|m| m.get(key))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let field_f64 = |key: &str| meta.and_then(|m| m.get(key)).and_then(Value::as_f64);
        let field_bool = |key: &str| {
            meta.and_then(|m| m.get(key))
                .and_then(Value::as_bool)
                .unwrap_or(false)
        };

        if let (Some(lat), Some(lon)) = (field_f64("latitude"), field_f64("longitude")) {
            segment.coordinate = Some(Coordinate::new(lat, lon));
        }

        segment.metadata = match kind {
            SegmentKind::OutboundTravel
            | SegmentKind::IntercityTravel
            | SegmentKind::ReturnTravel => {
                let mode = field_str("transport_mode")
                    .and_then(|m| TransportMode::parse(&m))
                    .unwrap_or(TransportMode::Train);
                let mut t = TransportMetadata::new(mode, field_f64("duration_hours").unwrap_or(0.0));
                t.is_overnight = field_bool("isOvernight");
                t.departure = field_str("departure");
                t.arrival = field_str("arrival");
                SegmentMetadata::Transport(t)
            }
            SegmentKind::Accommodation => SegmentMetadata::Accommodation(AccommodationMetadata {
                check_in: field_str("check_in"),
                notes: field_str("notes"),
            }),
            SegmentKind::Activity | SegmentKind::HiddenGem => {
                SegmentMetadata::Activity(ActivityMetadata {
                    time: field_str("time"),
                    activity_type: field_str("activityType"),
                    notes: field_str("notes"),
                    safety_warning: field_str("safety_warning"),
                    geocode_failed: field_bool("geocode_failed"),
                })
            }
            SegmentKind::LocalTransport => SegmentMetadata::LocalTransport(LocalTransportMetadata {
                mode: field_str("transport_mode").unwrap_or_default(),
                distance_km: field_f64("distance_km").unwrap_or(0.0),
            }),
        };

        Some(segment)
    }
}
