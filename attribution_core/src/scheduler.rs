//! The Report Scheduler - delivery windows and report rendering.
//!
//! Scheduling and rendering are separate on purpose: the time format and
//! redaction switches shape output only and never feed back into matching.

use crate::config::{DelayMode, ReportTimeFormat, SimulationOptions};
use crate::report::{Report, ReportTime, ScheduledReport};
use crate::types::{Source, Timestamp};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// Delay between a window closing and its reports being sent.
pub const REPORT_DELIVERY_DELAY_HOURS: i64 = 1;

/// Path appended to the reporting origin for event-level reports.
pub const EVENT_REPORT_PATH: &str = "/.well-known/attribution-reporting/report-event-attribution";

/// Fields of assembled aggregatable reports removed by `remove_assembled_report`.
pub const ASSEMBLED_REPORT_FIELDS: [&str; 3] = [
    "shared_info",
    "aggregation_service_payloads",
    "source_registration_time",
];

/// Returns the URL a report for `reporting_origin` is sent to.
pub fn report_url(reporting_origin: &str) -> String {
    format!("{}{}", reporting_origin.trim_end_matches('/'), EVENT_REPORT_PATH)
}

/// Assigns delivery times to reports.
#[derive(Debug, Clone, Copy)]
pub struct ReportScheduler {
    delay_mode: DelayMode,
}

impl ReportScheduler {
    /// Creates a scheduler for the given delay mode.
    pub fn new(delay_mode: DelayMode) -> Self {
        Self { delay_mode }
    }

    /// Returns the window deadlines of a source, relative to `source_time`.
    ///
    /// One entry per window of the source type. Early deadlines past the
    /// source's expiry collapse onto the expiry.
    pub fn window_deadlines(source: &Source) -> Vec<Duration> {
        let channel = source.source_type.channel();
        let expiry = source.effective_expiry();

        (0..channel.num_windows)
            .map(|window| match channel.early_deadline_days.get(window) {
                Some(days) => Duration::days(*days).min(expiry),
                None => expiry,
            })
            .collect()
    }

    /// Returns the window a trigger at `trigger_time` falls into.
    pub fn window_index(source: &Source, trigger_time: Timestamp) -> usize {
        let elapsed = trigger_time - source.source_time;
        let deadlines = Self::window_deadlines(source);

        deadlines
            .iter()
            .position(|deadline| elapsed <= *deadline)
            .unwrap_or(deadlines.len().saturating_sub(1))
    }

    /// Returns the delivery time of a true attribution.
    pub fn report_time(&self, source: &Source, trigger_time: Timestamp) -> Timestamp {
        match self.delay_mode {
            DelayMode::None => trigger_time,
            DelayMode::Default => {
                let window = Self::window_index(source, trigger_time);
                self.window_report_time(source, window)
            }
        }
    }

    /// Returns the delivery time of a report in a given window.
    ///
    /// Used for fake reports, which have no trigger time.
    pub fn window_report_time(&self, source: &Source, window: usize) -> Timestamp {
        match self.delay_mode {
            DelayMode::None => source.source_time,
            DelayMode::Default => {
                let deadlines = Self::window_deadlines(source);
                let deadline = deadlines
                    .get(window)
                    .or(deadlines.last())
                    .copied()
                    .unwrap_or_else(|| source.effective_expiry());
                // registration rejects sources whose last delivery is unrepresentable
                source
                    .source_time
                    .checked_add_signed(deadline + Duration::hours(REPORT_DELIVERY_DELAY_HOURS))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC)
            }
        }
    }
}

/// Renders scheduled reports into output form.
#[derive(Debug, Clone, Copy)]
pub struct ReportFormatter {
    time_format: ReportTimeFormat,
    remove_report_ids: bool,
    remove_assembled_report: bool,
}

impl ReportFormatter {
    /// Creates a formatter from the output-shaping options.
    pub fn from_options(options: &SimulationOptions) -> Self {
        Self {
            time_format: options.report_time_format,
            remove_report_ids: options.remove_report_ids,
            remove_assembled_report: options.remove_assembled_report,
        }
    }

    /// Renders a timestamp in the configured format.
    pub fn format_time(&self, time: Timestamp) -> ReportTime {
        match self.time_format {
            ReportTimeFormat::SecondsSinceUnixEpoch => ReportTime::Seconds(time.timestamp()),
            ReportTimeFormat::Iso8601 => ReportTime::Iso8601(time.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }

    /// Renders a report.
    pub fn format(&self, report: &ScheduledReport) -> Report {
        let mut body = Map::new();
        body.insert(
            "attribution_destination".to_string(),
            Value::String(report.source.destination.clone()),
        );
        body.insert(
            "source_event_id".to_string(),
            Value::String(report.source.source_event_id.to_string()),
        );
        body.insert("trigger_data".to_string(), Value::String(report.trigger_data.to_string()));
        body.insert("report_id".to_string(), Value::String(report.report_id.to_string()));
        body.insert(
            "source_type".to_string(),
            Value::String(report.source.source_type.name().to_string()),
        );
        body.insert(
            "randomized_trigger_rate".to_string(),
            serde_json::json!(report.randomized_trigger_rate),
        );
        if let Some(key) = report.source.debug_key {
            body.insert("source_debug_key".to_string(), Value::String(key.to_string()));
        }
        if let Some(key) = report.trigger_debug_key {
            body.insert("trigger_debug_key".to_string(), Value::String(key.to_string()));
        }

        self.redact(&mut body);

        Report {
            report_time: self.format_time(report.report_time),
            report_url: report_url(&report.source.reporting_origin),
            report: body,
        }
    }

    /// Removes fields the redaction switches ask for.
    pub fn redact(&self, body: &mut Map<String, Value>) {
        if self.remove_report_ids {
            body.remove("report_id");
        }
        if self.remove_assembled_report {
            for field in ASSEMBLED_REPORT_FIELDS {
                body.remove(field);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ReportSource;
    use crate::types::{timestamp_from_secs, SourceType};
    use serde_json::json;
    use uuid::Uuid;

    const DAY: i64 = 86_400;
    const HOUR: i64 = 3_600;

    fn t(secs: i64) -> Timestamp {
        timestamp_from_secs(secs).unwrap()
    }

    fn source(source_type: SourceType) -> Source {
        Source::new(t(1_000), source_type, "https://shop.test", "https://r.test")
    }

    fn scheduled(report_time: Timestamp) -> ScheduledReport {
        ScheduledReport {
            report_time,
            source: ReportSource {
                source_type: SourceType::Event,
                source_event_id: 123,
                destination: "https://shop.test".to_string(),
                reporting_origin: "https://r.test".to_string(),
                debug_key: Some(7),
            },
            trigger_data: 1,
            trigger_debug_key: None,
            report_id: Uuid::nil(),
            randomized_trigger_rate: 0.0000025,
        }
    }

    #[test]
    fn test_navigation_windows() {
        let deadlines = ReportScheduler::window_deadlines(&source(SourceType::Navigation));
        assert_eq!(
            deadlines,
            vec![Duration::days(2), Duration::days(7), Duration::days(30)]
        );
    }

    #[test]
    fn test_short_expiry_collapses_windows() {
        let short = source(SourceType::Navigation).with_expiry(Duration::days(3));
        let deadlines = ReportScheduler::window_deadlines(&short);
        assert_eq!(deadlines, vec![Duration::days(2), Duration::days(3), Duration::days(3)]);
    }

    #[test]
    fn test_event_single_window() {
        let deadlines = ReportScheduler::window_deadlines(&source(SourceType::Event));
        assert_eq!(deadlines, vec![Duration::days(30)]);
    }

    #[test]
    fn test_report_time_default_delay() {
        let scheduler = ReportScheduler::new(DelayMode::Default);
        let nav = source(SourceType::Navigation);

        // within first window
        assert_eq!(scheduler.report_time(&nav, t(1_000 + HOUR)), t(1_000 + 2 * DAY + HOUR));
        // exactly on the deadline still belongs to that window
        assert_eq!(scheduler.report_time(&nav, t(1_000 + 2 * DAY)), t(1_000 + 2 * DAY + HOUR));
        // second window
        assert_eq!(scheduler.report_time(&nav, t(1_000 + 3 * DAY)), t(1_000 + 7 * DAY + HOUR));
        // final window
        assert_eq!(scheduler.report_time(&nav, t(1_000 + 8 * DAY)), t(1_000 + 30 * DAY + HOUR));
    }

    #[test]
    fn test_report_time_no_delay() {
        let scheduler = ReportScheduler::new(DelayMode::None);
        let nav = source(SourceType::Navigation);
        assert_eq!(scheduler.report_time(&nav, t(1_010)), t(1_010));
        assert_eq!(scheduler.window_report_time(&nav, 2), t(1_000));
    }

    #[test]
    fn test_report_url() {
        assert_eq!(
            report_url("https://r.test"),
            "https://r.test/.well-known/attribution-reporting/report-event-attribution"
        );
    }

    #[test]
    fn test_format_seconds() {
        let formatter = ReportFormatter::from_options(&SimulationOptions::default());
        let report = formatter.format(&scheduled(t(10)));

        assert_eq!(report.report_time, ReportTime::Seconds(10));
        assert_eq!(
            serde_json::to_value(&report.report).unwrap(),
            json!({
                "attribution_destination": "https://shop.test",
                "source_event_id": "123",
                "trigger_data": "1",
                "report_id": "00000000-0000-0000-0000-000000000000",
                "source_type": "event",
                "randomized_trigger_rate": 0.0000025,
                "source_debug_key": "7",
            })
        );
    }

    #[test]
    fn test_format_iso_and_redaction() {
        let options = SimulationOptions {
            report_time_format: ReportTimeFormat::Iso8601,
            remove_report_ids: true,
            ..Default::default()
        };
        let formatter = ReportFormatter::from_options(&options);
        let report = formatter.format(&scheduled(t(1_643_408_373)));

        assert_eq!(report.report_time, ReportTime::Iso8601("2022-01-28T22:19:33.000Z".to_string()));
        assert!(!report.report.contains_key("report_id"));
    }

    #[test]
    fn test_remove_assembled_report_fields() {
        let options = SimulationOptions {
            remove_assembled_report: true,
            ..Default::default()
        };
        let formatter = ReportFormatter::from_options(&options);

        let mut body = Map::new();
        body.insert("shared_info".to_string(), json!("{}"));
        body.insert("aggregation_service_payloads".to_string(), json!([]));
        body.insert("source_registration_time".to_string(), json!("0"));
        body.insert("report_id".to_string(), json!("abc"));
        formatter.redact(&mut body);

        assert_eq!(serde_json::to_value(&body).unwrap(), json!({"report_id": "abc"}));
    }
}
