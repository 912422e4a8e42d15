//! Sources, triggers and the per-type channel table.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Simulated wall-clock instant.
pub type Timestamp = DateTime<Utc>;

/// Filter dictionary: key -> set of values.
///
/// Ordered so that iteration (and therefore any log output) is stable.
pub type FilterValues = BTreeMap<String, BTreeSet<String>>;

/// Reserved filter key carrying the source's type.
pub const SOURCE_TYPE_FILTER_KEY: &str = "source_type";

/// Default source lifetime.
pub const DEFAULT_EXPIRY_DAYS: i64 = 30;

/// Shortest lifetime a source may request.
pub const MIN_EXPIRY_DAYS: i64 = 1;

// ============================================================================
// SOURCE TYPE
// ============================================================================

/// How a source was registered: on click (navigation) or on view (event).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Navigation,
    Event,
}

/// Per-type output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSpec {
    /// Number of distinguishable `trigger_data` values
    pub trigger_data_cardinality: u64,

    /// Reporting windows the source can report in
    pub num_windows: usize,

    /// Reports a single source may back over its lifetime
    pub max_reports: usize,

    /// Window deadlines (days after `source_time`) that precede expiry
    pub early_deadline_days: &'static [i64],
}

const NAVIGATION_CHANNEL: ChannelSpec = ChannelSpec {
    trigger_data_cardinality: 8,
    num_windows: 3,
    max_reports: 3,
    early_deadline_days: &[2, 7],
};

const EVENT_CHANNEL: ChannelSpec = ChannelSpec {
    trigger_data_cardinality: 2,
    num_windows: 1,
    max_reports: 1,
    early_deadline_days: &[],
};

impl SourceType {
    /// Returns the type name as it appears in input and report bodies.
    pub fn name(&self) -> &'static str {
        match self {
            SourceType::Navigation => "navigation",
            SourceType::Event => "event",
        }
    }

    /// Returns the channel constants for this type.
    pub fn channel(&self) -> &'static ChannelSpec {
        match self {
            SourceType::Navigation => &NAVIGATION_CHANNEL,
            SourceType::Event => &EVENT_CHANNEL,
        }
    }

    /// Reduces raw trigger data into this type's output space.
    pub fn sanitize_trigger_data(&self, trigger_data: u64) -> u64 {
        trigger_data % self.channel().trigger_data_cardinality
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "navigation" => Ok(SourceType::Navigation),
            "event" => Ok(SourceType::Event),
            _ => Err(format!("unknown source type: {}", s)),
        }
    }
}

// ============================================================================
// SOURCE
// ============================================================================

/// A registered ad exposure (click or view).
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    /// Registration time
    pub source_time: Timestamp,

    /// Origin the source was registered on
    pub source_origin: String,

    pub source_type: SourceType,

    pub source_event_id: u64,

    /// Site on which the source may be attributed
    pub destination: String,

    /// Origin that receives the report
    pub reporting_origin: String,

    /// Requested lifetime, clamped by [`Source::effective_expiry`]
    pub expiry: Duration,

    pub priority: i64,

    /// User-supplied filter data (without the implicit `source_type` key)
    pub filter_data: FilterValues,

    pub debug_key: Option<u64>,
}

impl Source {
    /// Creates a source with default expiry, priority and filter data.
    pub fn new(
        source_time: Timestamp,
        source_type: SourceType,
        destination: impl Into<String>,
        reporting_origin: impl Into<String>,
    ) -> Self {
        Self {
            source_time,
            source_origin: "https://source.example".to_string(),
            source_type,
            source_event_id: 0,
            destination: destination.into(),
            reporting_origin: reporting_origin.into(),
            expiry: Duration::days(DEFAULT_EXPIRY_DAYS),
            priority: 0,
            filter_data: FilterValues::new(),
            debug_key: None,
        }
    }

    /// Sets the origin the source was registered on.
    pub fn with_source_origin(mut self, origin: impl Into<String>) -> Self {
        self.source_origin = origin.into();
        self
    }

    /// Sets the source event id.
    pub fn with_event_id(mut self, id: u64) -> Self {
        self.source_event_id = id;
        self
    }

    /// Sets the requested expiry.
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the filter data.
    pub fn with_filter_data(mut self, filter_data: FilterValues) -> Self {
        self.filter_data = filter_data;
        self
    }

    /// Sets the debug key.
    pub fn with_debug_key(mut self, debug_key: u64) -> Self {
        self.debug_key = Some(debug_key);
        self
    }

    /// Returns the expiry clamped to the allowed `[1 day, 30 days]` range.
    pub fn effective_expiry(&self) -> Duration {
        self.expiry
            .max(Duration::days(MIN_EXPIRY_DAYS))
            .min(Duration::days(DEFAULT_EXPIRY_DAYS))
    }

    /// Returns the first instant at which the source is expired.
    ///
    /// `None` if the addition leaves the representable time range.
    pub fn expiry_time(&self) -> Option<Timestamp> {
        self.source_time.checked_add_signed(self.effective_expiry())
    }

    /// Returns the filter data the matcher sees, including `source_type`.
    pub fn filter_data_with_type(&self) -> FilterValues {
        let mut data = self.filter_data.clone();
        data.insert(
            SOURCE_TYPE_FILTER_KEY.to_string(),
            BTreeSet::from([self.source_type.name().to_string()]),
        );
        data
    }
}

// ============================================================================
// TRIGGER
// ============================================================================

/// One event-level configuration inside a trigger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventTriggerData {
    pub trigger_data: u64,
    pub priority: i64,
    pub dedup_key: Option<i64>,
    pub filters: FilterValues,
    pub not_filters: FilterValues,
}

impl EventTriggerData {
    /// Creates an event trigger with the given data and default fields.
    pub fn new(trigger_data: u64) -> Self {
        Self {
            trigger_data,
            ..Default::default()
        }
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the dedup key.
    pub fn with_dedup_key(mut self, dedup_key: i64) -> Self {
        self.dedup_key = Some(dedup_key);
        self
    }

    /// Sets the filters.
    pub fn with_filters(mut self, filters: FilterValues) -> Self {
        self.filters = filters;
        self
    }

    /// Sets the negated filters.
    pub fn with_not_filters(mut self, not_filters: FilterValues) -> Self {
        self.not_filters = not_filters;
        self
    }
}

/// A registered conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub trigger_time: Timestamp,

    /// Site the conversion happened on
    pub destination: String,

    /// Origin that receives the report
    pub reporting_origin: String,

    pub debug_key: Option<u64>,

    pub filters: FilterValues,

    pub not_filters: FilterValues,

    /// Evaluated in order; the first one that pairs with a source wins
    pub event_triggers: Vec<EventTriggerData>,
}

impl Trigger {
    /// Creates a trigger with no filters and no event triggers.
    pub fn new(
        trigger_time: Timestamp,
        destination: impl Into<String>,
        reporting_origin: impl Into<String>,
    ) -> Self {
        Self {
            trigger_time,
            destination: destination.into(),
            reporting_origin: reporting_origin.into(),
            debug_key: None,
            filters: FilterValues::new(),
            not_filters: FilterValues::new(),
            event_triggers: Vec::new(),
        }
    }

    /// Appends an event trigger.
    pub fn with_event_trigger(mut self, event_trigger: EventTriggerData) -> Self {
        self.event_triggers.push(event_trigger);
        self
    }

    /// Sets the top-level filters.
    pub fn with_filters(mut self, filters: FilterValues) -> Self {
        self.filters = filters;
        self
    }

    /// Sets the top-level negated filters.
    pub fn with_not_filters(mut self, not_filters: FilterValues) -> Self {
        self.not_filters = not_filters;
        self
    }

    /// Sets the debug key.
    pub fn with_debug_key(mut self, debug_key: u64) -> Self {
        self.debug_key = Some(debug_key);
        self
    }

    /// Returns the event triggers, substituting a default when none were given.
    pub fn effective_event_triggers(&self) -> Vec<EventTriggerData> {
        if self.event_triggers.is_empty() {
            vec![EventTriggerData::default()]
        } else {
            self.event_triggers.clone()
        }
    }
}

// ============================================================================
// EVENTS
// ============================================================================

/// A source or trigger registration.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Source(Source),
    Trigger(Trigger),
}

impl Event {
    /// Returns the registration time.
    pub fn time(&self) -> Timestamp {
        match self {
            Event::Source(source) => source.source_time,
            Event::Trigger(trigger) => trigger.trigger_time,
        }
    }
}

/// A validated event paired with the JSON it was parsed from.
///
/// The original value is echoed back verbatim in rejection records.
#[derive(Debug, Clone, PartialEq)]
pub struct InputEvent {
    pub event: Event,
    pub original: serde_json::Value,
}

impl InputEvent {
    /// Pairs an event with its original JSON.
    pub fn new(event: Event, original: serde_json::Value) -> Self {
        Self { event, original }
    }
}

/// Builds a filter dictionary from literal pairs.
///
/// ```ignore
/// let data = filter_values(&[("product", &["shoes", "hats"])]);
/// ```
pub fn filter_values(entries: &[(&str, &[&str])]) -> FilterValues {
    entries
        .iter()
        .map(|(key, values)| {
            (
                key.to_string(),
                values.iter().map(|v| v.to_string()).collect(),
            )
        })
        .collect()
}

/// Converts whole seconds since the Unix epoch into a timestamp.
pub fn timestamp_from_secs(secs: i64) -> Option<Timestamp> {
    DateTime::<Utc>::from_timestamp(secs, 0)
}
