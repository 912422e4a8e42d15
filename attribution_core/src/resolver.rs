//! The Attribution Resolver - pairs each trigger with at most one source.
//!
//! Pipeline per trigger:
//! 1. eligible sources for (destination, reporting origin), best first
//! 2. top-level filters against each source's filter data
//! 3. event triggers in order: own filters, best source, dedup check
//! 4. per-source report cap with priority-based replacement
//! 5. attribution rate limit
//!
//! A winning attribution deactivates the other eligible sources.

use crate::event_store::{EventStore, SourceId};
use crate::filters;
use crate::report::{PendingReport, RejectionReason};
use crate::scheduler::ReportScheduler;
use crate::types::{EventTriggerData, Trigger};
use serde_json::Value;
use tracing::debug;

/// A successful attribution.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribution {
    /// Source the trigger attributed to
    pub source: SourceId,

    /// The stored candidate report
    pub report: PendingReport,

    /// Lower-priority report evicted to make room, if any
    pub replaced: Option<PendingReport>,
}

/// Resolves triggers against an [`EventStore`].
pub struct AttributionResolver {
    scheduler: ReportScheduler,
    next_serial: u64,
}

impl AttributionResolver {
    /// Creates a resolver that schedules reports with `scheduler`.
    pub fn new(scheduler: ReportScheduler) -> Self {
        Self {
            scheduler,
            next_serial: 0,
        }
    }

    /// Attributes a trigger at its `trigger_time`.
    ///
    /// Every rejection is terminal for the trigger.
    pub fn attribute(
        &mut self,
        store: &mut EventStore,
        trigger: &Trigger,
        original: &Value,
    ) -> Result<Attribution, RejectionReason> {
        let now = trigger.trigger_time;

        let eligible = store.eligible_sources(&trigger.destination, &trigger.reporting_origin, now);
        if eligible.is_empty() {
            return Err(
                if store.has_expired_sources(&trigger.destination, &trigger.reporting_origin, now) {
                    RejectionReason::Expired
                } else {
                    RejectionReason::NoMatchingSource
                },
            );
        }

        let candidates: Vec<SourceId> = eligible
            .iter()
            .copied()
            .filter(|id| {
                let data = store.get(*id).source.filter_data_with_type();
                filters::matches(&trigger.filters, &trigger.not_filters, &data)
            })
            .collect();
        if candidates.is_empty() {
            return Err(RejectionReason::NoMatchingSourceFilterData);
        }

        let (source_id, event_trigger) = select_pairing(store, &candidates, trigger)?;

        let stored = store.get(source_id);
        let source = stored.source.clone();
        let channel = source.source_type.channel();

        // Report cap: replace the weakest stored report or give up.
        let mut evict = None;
        if stored.reports.len() >= channel.max_reports {
            let weakest = stored
                .reports
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    a.priority
                        .cmp(&b.priority)
                        .then(b.trigger_time.cmp(&a.trigger_time))
                });
            match weakest {
                Some((index, report)) if event_trigger.priority > report.priority => evict = Some(index),
                _ => return Err(RejectionReason::PriorityTooLow),
            }
        }

        if store.attribution_count(&source, now) >= store.limits().max_attributions_per_window {
            return Err(RejectionReason::ExcessiveAttributions);
        }

        let serial = self.next_serial;
        self.next_serial += 1;

        let report = PendingReport {
            serial,
            trigger_time: now,
            trigger_data: source.source_type.sanitize_trigger_data(event_trigger.trigger_data),
            priority: event_trigger.priority,
            trigger_debug_key: trigger.debug_key,
            report_time: self.scheduler.report_time(&source, now),
            original_trigger: original.clone(),
        };

        let stored = store.get_mut(source_id);
        let replaced = evict.map(|index| stored.reports.remove(index));
        stored.reports.push(report.clone());
        if let Some(key) = event_trigger.dedup_key {
            stored.dedup_keys.insert(key);
        }

        if let Some(old) = &replaced {
            debug!(
                "{}: report #{} (priority {}) replaced by #{} (priority {})",
                source_id, old.serial, old.priority, serial, report.priority
            );
            store.forget_attribution(old.serial);
        }
        store.record_attribution(&source, serial, now);
        store.invalidate(eligible.into_iter().filter(|id| *id != source_id));

        debug!(
            "Trigger at {} attributed to {} (trigger_data={}, report_time={})",
            now, source_id, report.trigger_data, report.report_time
        );

        Ok(Attribution {
            source: source_id,
            report,
            replaced,
        })
    }
}

/// Picks the first (source, event trigger) pairing that survives filters
/// and deduplication.
///
/// `candidates` is already best-first, so the first filter match is the
/// highest-priority, most recent source.
fn select_pairing(
    store: &EventStore,
    candidates: &[SourceId],
    trigger: &Trigger,
) -> Result<(SourceId, EventTriggerData), RejectionReason> {
    let mut last_reason = RejectionReason::NoMatchingSource;

    for event_trigger in trigger.effective_event_triggers() {
        let selected = candidates.iter().copied().find(|id| {
            let data = store.get(*id).source.filter_data_with_type();
            filters::matches(&event_trigger.filters, &event_trigger.not_filters, &data)
        });

        let Some(id) = selected else {
            last_reason = RejectionReason::NoMatchingSourceFilterData;
            continue;
        };

        if let Some(key) = event_trigger.dedup_key {
            if store.get(id).dedup_keys.contains(&key) {
                last_reason = RejectionReason::Deduplicated;
                continue;
            }
        }

        return Ok((id, event_trigger));
    }

    Err(last_reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AttributionLimits, DelayMode};
    use crate::types::{filter_values, timestamp_from_secs, Source, SourceType, Timestamp};
    use proptest::prelude::*;
    use serde_json::json;

    const DEST: &str = "https://shop.test";
    const ORIGIN: &str = "https://r.test";

    fn t(secs: i64) -> Timestamp {
        timestamp_from_secs(secs).unwrap()
    }

    fn setup() -> (EventStore, AttributionResolver) {
        (
            EventStore::new(AttributionLimits::default()),
            AttributionResolver::new(ReportScheduler::new(DelayMode::None)),
        )
    }

    fn trigger(secs: i64, event_trigger: EventTriggerData) -> Trigger {
        Trigger::new(t(secs), DEST, ORIGIN).with_event_trigger(event_trigger)
    }

    #[test]
    fn test_simple_attribution() {
        let (mut store, mut resolver) = setup();
        let id = store
            .register_source(Source::new(t(0), SourceType::Navigation, DEST, ORIGIN), json!({}))
            .unwrap();

        let attribution = resolver
            .attribute(&mut store, &trigger(10, EventTriggerData::new(5)), &json!({"t": 1}))
            .unwrap();

        assert_eq!(attribution.source, id);
        assert_eq!(attribution.report.trigger_data, 5);
        assert_eq!(attribution.report.report_time, t(10));
        assert_eq!(attribution.report.original_trigger, json!({"t": 1}));
        assert_eq!(store.get(id).reports.len(), 1);
    }

    #[test]
    fn test_no_source() {
        let (mut store, mut resolver) = setup();
        let result = resolver.attribute(&mut store, &trigger(10, EventTriggerData::new(1)), &json!({}));
        assert_eq!(result, Err(RejectionReason::NoMatchingSource));
    }

    #[test]
    fn test_expired_source() {
        let (mut store, mut resolver) = setup();
        store
            .register_source(
                Source::new(t(0), SourceType::Event, DEST, ORIGIN).with_expiry(chrono::Duration::days(1)),
                json!({}),
            )
            .unwrap();
        let result = resolver.attribute(&mut store, &trigger(86_400, EventTriggerData::new(1)), &json!({}));
        assert_eq!(result, Err(RejectionReason::Expired));
    }

    #[test]
    fn test_trigger_data_is_sanitized() {
        let (mut store, mut resolver) = setup();
        store
            .register_source(Source::new(t(0), SourceType::Event, DEST, ORIGIN), json!({}))
            .unwrap();
        let attribution = resolver
            .attribute(&mut store, &trigger(1, EventTriggerData::new(7)), &json!({}))
            .unwrap();
        assert_eq!(attribution.report.trigger_data, 1);
    }

    #[test]
    fn test_top_level_filters_reject() {
        let (mut store, mut resolver) = setup();
        store
            .register_source(
                Source::new(t(0), SourceType::Navigation, DEST, ORIGIN)
                    .with_filter_data(filter_values(&[("product", &["shoes"])])),
                json!({}),
            )
            .unwrap();

        let filtered = trigger(5, EventTriggerData::new(1)).with_filters(filter_values(&[("product", &["hats"])]));
        assert_eq!(
            resolver.attribute(&mut store, &filtered, &json!({})),
            Err(RejectionReason::NoMatchingSourceFilterData)
        );
    }

    #[test]
    fn test_source_type_filter() {
        let (mut store, mut resolver) = setup();
        store
            .register_source(Source::new(t(0), SourceType::Navigation, DEST, ORIGIN), json!({}))
            .unwrap();

        let only_events = trigger(5, EventTriggerData::new(1))
            .with_filters(filter_values(&[("source_type", &["event"])]));
        assert_eq!(
            resolver.attribute(&mut store, &only_events, &json!({})),
            Err(RejectionReason::NoMatchingSourceFilterData)
        );
    }

    #[test]
    fn test_first_matching_event_trigger_wins() {
        let (mut store, mut resolver) = setup();
        store
            .register_source(
                Source::new(t(0), SourceType::Navigation, DEST, ORIGIN)
                    .with_filter_data(filter_values(&[("geo", &["us"])])),
                json!({}),
            )
            .unwrap();

        let trig = Trigger::new(t(5), DEST, ORIGIN)
            .with_event_trigger(EventTriggerData::new(1).with_filters(filter_values(&[("geo", &["fr"])])))
            .with_event_trigger(EventTriggerData::new(2).with_not_filters(filter_values(&[("geo", &["fr"])])))
            .with_event_trigger(EventTriggerData::new(3));

        let attribution = resolver.attribute(&mut store, &trig, &json!({})).unwrap();
        assert_eq!(attribution.report.trigger_data, 2);
    }

    #[test]
    fn test_event_trigger_filters_pick_lower_priority_source() {
        let (mut store, mut resolver) = setup();
        store
            .register_source(
                Source::new(t(0), SourceType::Navigation, DEST, ORIGIN)
                    .with_priority(1)
                    .with_filter_data(filter_values(&[("campaign", &["a"])])),
                json!({}),
            )
            .unwrap();
        let high = store
            .register_source(
                Source::new(t(1), SourceType::Navigation, DEST, ORIGIN)
                    .with_priority(9)
                    .with_filter_data(filter_values(&[("campaign", &["b"])])),
                json!({}),
            )
            .unwrap();

        let trig = trigger(5, EventTriggerData::new(1).with_filters(filter_values(&[("campaign", &["a"])])));
        let attribution = resolver.attribute(&mut store, &trig, &json!({})).unwrap();
        assert_ne!(attribution.source, high);
    }

    #[test]
    fn test_dedup_key() {
        let (mut store, mut resolver) = setup();
        store
            .register_source(Source::new(t(0), SourceType::Navigation, DEST, ORIGIN), json!({}))
            .unwrap();

        let first = trigger(5, EventTriggerData::new(1).with_dedup_key(789));
        let second = trigger(6, EventTriggerData::new(2).with_dedup_key(789).with_priority(100));

        assert!(resolver.attribute(&mut store, &first, &json!({})).is_ok());
        assert_eq!(
            resolver.attribute(&mut store, &second, &json!({})),
            Err(RejectionReason::Deduplicated)
        );
    }

    #[test]
    fn test_dedup_falls_through_to_next_event_trigger() {
        let (mut store, mut resolver) = setup();
        store
            .register_source(Source::new(t(0), SourceType::Navigation, DEST, ORIGIN), json!({}))
            .unwrap();

        resolver
            .attribute(&mut store, &trigger(5, EventTriggerData::new(1).with_dedup_key(1)), &json!({}))
            .unwrap();

        let trig = Trigger::new(t(6), DEST, ORIGIN)
            .with_event_trigger(EventTriggerData::new(2).with_dedup_key(1))
            .with_event_trigger(EventTriggerData::new(3).with_dedup_key(2));
        let attribution = resolver.attribute(&mut store, &trig, &json!({})).unwrap();
        assert_eq!(attribution.report.trigger_data, 3);
    }

    #[test]
    fn test_priority_replacement() {
        let (mut store, mut resolver) = setup();
        let id = store
            .register_source(Source::new(t(0), SourceType::Event, DEST, ORIGIN), json!({}))
            .unwrap();

        resolver
            .attribute(&mut store, &trigger(1, EventTriggerData::new(0).with_priority(5)), &json!({}))
            .unwrap();

        // equal priority does not replace
        assert_eq!(
            resolver.attribute(&mut store, &trigger(2, EventTriggerData::new(1).with_priority(5)), &json!({})),
            Err(RejectionReason::PriorityTooLow)
        );

        let attribution = resolver
            .attribute(&mut store, &trigger(3, EventTriggerData::new(1).with_priority(6)), &json!({}))
            .unwrap();
        assert_eq!(attribution.replaced.map(|r| r.priority), Some(5));
        assert_eq!(store.get(id).reports.len(), 1);
        assert_eq!(store.get(id).reports[0].priority, 6);
    }

    #[test]
    fn test_navigation_report_cap() {
        let (mut store, mut resolver) = setup();
        let id = store
            .register_source(Source::new(t(0), SourceType::Navigation, DEST, ORIGIN), json!({}))
            .unwrap();

        for secs in 1..=3 {
            resolver
                .attribute(&mut store, &trigger(secs, EventTriggerData::new(0)), &json!({}))
                .unwrap();
        }
        assert_eq!(
            resolver.attribute(&mut store, &trigger(4, EventTriggerData::new(0)), &json!({})),
            Err(RejectionReason::PriorityTooLow)
        );

        // among equal priorities the most recent report is evicted
        let attribution = resolver
            .attribute(&mut store, &trigger(5, EventTriggerData::new(0).with_priority(1)), &json!({}))
            .unwrap();
        assert_eq!(attribution.replaced.map(|r| r.trigger_time), Some(t(3)));
        assert_eq!(store.get(id).reports.len(), 3);
    }

    #[test]
    fn test_winner_deactivates_competitors() {
        let (mut store, mut resolver) = setup();
        let loser = store
            .register_source(Source::new(t(0), SourceType::Navigation, DEST, ORIGIN), json!({}))
            .unwrap();
        let winner = store
            .register_source(Source::new(t(1), SourceType::Navigation, DEST, ORIGIN), json!({}))
            .unwrap();

        let attribution = resolver
            .attribute(&mut store, &trigger(5, EventTriggerData::new(0)), &json!({}))
            .unwrap();
        assert_eq!(attribution.source, winner);
        assert!(!store.get(loser).active);
        assert!(store.get(winner).active);
    }

    #[test]
    fn test_rate_limit() {
        let limits = AttributionLimits {
            max_attributions_per_window: 1,
            ..Default::default()
        };
        let mut store = EventStore::new(limits);
        let mut resolver = AttributionResolver::new(ReportScheduler::new(DelayMode::None));
        store
            .register_source(Source::new(t(0), SourceType::Navigation, DEST, ORIGIN), json!({}))
            .unwrap();

        resolver
            .attribute(&mut store, &trigger(1, EventTriggerData::new(0)), &json!({}))
            .unwrap();
        assert_eq!(
            resolver.attribute(&mut store, &trigger(2, EventTriggerData::new(0)), &json!({})),
            Err(RejectionReason::ExcessiveAttributions)
        );
    }

    proptest! {
        #[test]
        fn higher_priority_source_always_wins(low in -1000i64..1000, bump in 1i64..1000, later_is_high in any::<bool>()) {
            let (mut store, mut resolver) = setup();
            let (first, second) = if later_is_high { (low, low + bump) } else { (low + bump, low) };

            let a = store
                .register_source(Source::new(t(0), SourceType::Navigation, DEST, ORIGIN).with_priority(first), json!({}))
                .unwrap();
            let b = store
                .register_source(Source::new(t(1), SourceType::Navigation, DEST, ORIGIN).with_priority(second), json!({}))
                .unwrap();

            let attribution = resolver
                .attribute(&mut store, &trigger(2, EventTriggerData::new(0)), &json!({}))
                .unwrap();
            prop_assert_eq!(attribution.source, if later_is_high { b } else { a });
        }

        #[test]
        fn disjoint_destinations_never_attribute(secs in 0i64..1_000_000, offset in 0i64..1_000) {
            let (mut store, mut resolver) = setup();
            store
                .register_source(Source::new(t(secs), SourceType::Navigation, "https://a.test", ORIGIN), json!({}))
                .unwrap();

            let trig = Trigger::new(t(secs + offset), "https://b.test", ORIGIN)
                .with_event_trigger(EventTriggerData::new(0));
            prop_assert_eq!(
                resolver.attribute(&mut store, &trig, &json!({})),
                Err(RejectionReason::NoMatchingSource)
            );
        }
    }
}
