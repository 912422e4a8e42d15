//! Reports, rejection records and the simulation output aggregate.

use crate::types::{Source, SourceType, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Why a source or trigger did not produce a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RejectionReason {
    /// No active, unexpired source for the destination and reporting origin
    NoMatchingSource,
    /// Candidate sources existed but filters excluded all of them
    NoMatchingSourceFilterData,
    /// Too many reporting origins for the destination (source-level)
    ExcessiveReportingOrigins,
    /// Too many unexpired sources for the source origin (source-level)
    InsufficientSourceCapacity,
    /// Dedup key already consumed for the selected source
    Deduplicated,
    /// Report cap reached and the trigger does not outrank any stored report
    PriorityTooLow,
    /// Attribution rate limit reached
    ExcessiveAttributions,
    /// Report replaced by randomized response
    Noised,
    /// Only expired sources matched
    Expired,
    /// Internal inconsistency (out-of-order registration, time overflow)
    Internal,
}

impl RejectionReason {
    /// Returns the camelCase name used in the output.
    pub fn name(&self) -> &'static str {
        match self {
            RejectionReason::NoMatchingSource => "noMatchingSource",
            RejectionReason::NoMatchingSourceFilterData => "noMatchingSourceFilterData",
            RejectionReason::ExcessiveReportingOrigins => "excessiveReportingOrigins",
            RejectionReason::InsufficientSourceCapacity => "insufficientSourceCapacity",
            RejectionReason::Deduplicated => "deduplicated",
            RejectionReason::PriorityTooLow => "priorityTooLow",
            RejectionReason::ExcessiveAttributions => "excessiveAttributions",
            RejectionReason::Noised => "noised",
            RejectionReason::Expired => "expired",
            RejectionReason::Internal => "internal",
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A true attribution held by its source until the source is finalized.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingReport {
    /// Serial number, unique within a run
    pub serial: u64,

    pub trigger_time: Timestamp,

    /// Already reduced into the source type's output space
    pub trigger_data: u64,

    pub priority: i64,

    pub trigger_debug_key: Option<u64>,

    pub report_time: Timestamp,

    /// Trigger JSON, needed if the report is later dropped for noise
    pub original_trigger: Value,
}

/// Source fields copied into every report it backs.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSource {
    pub source_type: SourceType,
    pub source_event_id: u64,
    pub destination: String,
    pub reporting_origin: String,
    pub debug_key: Option<u64>,
}

impl From<&Source> for ReportSource {
    fn from(source: &Source) -> Self {
        Self {
            source_type: source.source_type,
            source_event_id: source.source_event_id,
            destination: source.destination.clone(),
            reporting_origin: source.reporting_origin.clone(),
            debug_key: source.debug_key,
        }
    }
}

/// A report whose delivery time and contents are final.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledReport {
    pub report_time: Timestamp,

    pub source: ReportSource,

    pub trigger_data: u64,

    /// Always `None` for fake reports synthesized by randomized response
    pub trigger_debug_key: Option<u64>,

    pub report_id: Uuid,

    pub randomized_trigger_rate: f64,
}

/// Rendered report time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportTime {
    Seconds(i64),
    Iso8601(String),
}

/// An event-level report as written to the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub report_time: ReportTime,
    pub report_url: String,
    pub report: Map<String, Value>,
}

/// A source that was never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedSource {
    pub reason: RejectionReason,
    pub source: Value,
}

/// A trigger that produced no report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedTrigger {
    pub reason: RejectionReason,
    pub trigger: Value,
}

/// Result of one simulation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutput {
    pub event_level_reports: Vec<Report>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected_sources: Vec<RejectedSource>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected_triggers: Vec<RejectedTrigger>,
}

/// Counters collected during a run, logged when it finishes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationStats {
    pub sources_registered: u64,
    pub triggers_processed: u64,
    pub attributions: u64,

    /// Stored reports evicted by a higher-priority trigger
    pub reports_replaced: u64,

    /// Sources whose randomized response picked the random outcome
    pub sources_randomized: u64,

    pub fake_reports: u64,
}
