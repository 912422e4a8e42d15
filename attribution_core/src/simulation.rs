//! The Simulation Driver - runs one event stream to completion.
//!
//! Events are processed in time order. Before each event, every source
//! whose expiry is at or before the event time is finalized: its
//! randomized outcome is drawn once and its reports are scheduled.
//! Whatever is still pending when the stream ends is finalized last.

use crate::config::SimulationOptions;
use crate::error::ConfigError;
use crate::event_store::{EventStore, Finalization, SourceId};
use crate::noise::{NoiseEngine, RandomizedOutcome};
use crate::report::{
    RejectedSource, RejectedTrigger, RejectionReason, ReportSource, ScheduledReport, SimulationOutput,
    SimulationStats,
};
use crate::resolver::AttributionResolver;
use crate::scheduler::{ReportFormatter, ReportScheduler};
use crate::types::{Event, InputEvent, Source, Timestamp, Trigger};
use attribution_env::noise_rng;
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tracing::{debug, info};

/// Runs a full simulation over `events`.
///
/// Events are ordered by time; at equal times sources come before
/// triggers, otherwise input order is kept.
pub fn run_simulation(mut events: Vec<InputEvent>, options: &SimulationOptions) -> Result<SimulationOutput, ConfigError> {
    let mut simulation = Simulation::new(options.clone())?;

    events.sort_by_key(|input| (input.event.time(), matches!(input.event, Event::Trigger(_))));
    for input in events {
        simulation.process(input);
    }

    Ok(simulation.finish())
}

/// Owns every component for one run.
pub struct Simulation {
    store: EventStore,
    resolver: AttributionResolver,
    scheduler: ReportScheduler,
    noise: NoiseEngine,
    formatter: ReportFormatter,

    /// Pending finalizations, earliest expiry first
    pending: BinaryHeap<Reverse<(Timestamp, SourceId)>>,

    reports: Vec<ScheduledReport>,
    rejected_sources: Vec<RejectedSource>,
    rejected_triggers: Vec<RejectedTrigger>,
    stats: SimulationStats,
}

impl Simulation {
    /// Validates `options` and sets up an empty run.
    pub fn new(options: SimulationOptions) -> Result<Self, ConfigError> {
        options.validate()?;

        let scheduler = ReportScheduler::new(options.delay_mode);
        let rng = noise_rng(options.noise_seed);
        info!(
            "Simulation configured: noise={:?} seeded={} delay={:?}",
            options.noise_mode,
            rng.is_seeded(),
            options.delay_mode
        );
        let noise = NoiseEngine::new(options.noise_mode, options.randomized_response_rates, rng);

        Ok(Self {
            store: EventStore::new(options.limits.clone()),
            resolver: AttributionResolver::new(scheduler),
            scheduler,
            noise,
            formatter: ReportFormatter::from_options(&options),
            pending: BinaryHeap::new(),
            reports: Vec::new(),
            rejected_sources: Vec::new(),
            rejected_triggers: Vec::new(),
            stats: SimulationStats::default(),
        })
    }

    /// Returns the counters collected so far.
    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    /// Processes one event.
    ///
    /// Events must arrive in time order; a late one is rejected as
    /// `internal`.
    pub fn process(&mut self, input: InputEvent) {
        self.finalize_expired(input.event.time());

        match input.event {
            Event::Source(source) => self.register_source(source, input.original),
            Event::Trigger(trigger) => self.process_trigger(trigger, input.original),
        }
    }

    /// Finalizes every remaining source and renders the output.
    pub fn finish(mut self) -> SimulationOutput {
        while let Some(Reverse((_, id))) = self.pending.pop() {
            self.finalize(id);
        }

        self.noise.order_reports(&mut self.reports);
        let event_level_reports = self.reports.iter().map(|r| self.formatter.format(r)).collect();

        info!(
            "Simulation complete: {} sources, {} triggers, {} attributions, {} replaced, \
             {} randomized sources, {} fake reports, {} reports",
            self.stats.sources_registered,
            self.stats.triggers_processed,
            self.stats.attributions,
            self.stats.reports_replaced,
            self.stats.sources_randomized,
            self.stats.fake_reports,
            self.reports.len()
        );

        SimulationOutput {
            event_level_reports,
            rejected_sources: self.rejected_sources,
            rejected_triggers: self.rejected_triggers,
        }
    }

    // ========================================================================
    // EVENTS
    // ========================================================================

    fn register_source(&mut self, source: Source, original: Value) {
        let time = source.source_time;
        match self.store.register_source(source, original.clone()) {
            Ok(id) => {
                let expiry_time = self.store.get(id).expiry_time;
                debug!("Registered {} at {} (expires {})", id, time, expiry_time);
                self.pending.push(Reverse((expiry_time, id)));
                self.stats.sources_registered += 1;
            }
            Err(reason) => {
                debug!("Source at {} rejected: {}", time, reason);
                self.rejected_sources.push(RejectedSource { reason, source: original });
            }
        }
    }

    fn process_trigger(&mut self, trigger: Trigger, original: Value) {
        self.stats.triggers_processed += 1;

        if let Err(reason) = self.store.register_trigger(&trigger) {
            self.reject_trigger(reason, original);
            return;
        }

        match self.resolver.attribute(&mut self.store, &trigger, &original) {
            Ok(attribution) => {
                self.stats.attributions += 1;
                if attribution.replaced.is_some() {
                    self.stats.reports_replaced += 1;
                }
            }
            Err(reason) => {
                debug!("Trigger at {} rejected: {}", trigger.trigger_time, reason);
                self.reject_trigger(reason, original);
            }
        }
    }

    fn reject_trigger(&mut self, reason: RejectionReason, trigger: Value) {
        self.rejected_triggers.push(RejectedTrigger { reason, trigger });
    }

    // ========================================================================
    // FINALIZATION
    // ========================================================================

    fn finalize_expired(&mut self, now: Timestamp) {
        while let Some(Reverse((expiry_time, id))) = self.pending.peek().copied() {
            if expiry_time > now {
                break;
            }
            self.pending.pop();
            self.finalize(id);
        }
    }

    fn finalize(&mut self, id: SourceId) {
        let stored = self.store.get_mut(id);
        if stored.finalization == Finalization::Finalized {
            return;
        }
        stored.finalization = Finalization::Finalized;
        let reports = std::mem::take(&mut stored.reports);
        let source = stored.source.clone();

        let report_source = ReportSource::from(&source);
        let rate = self.noise.effective_rate(source.source_type);

        match self.noise.apply_noise(source.source_type, reports) {
            RandomizedOutcome::Truthful(reports) => {
                for report in reports {
                    let report_id = self.noise.report_id();
                    self.reports.push(ScheduledReport {
                        report_time: report.report_time,
                        source: report_source.clone(),
                        trigger_data: report.trigger_data,
                        trigger_debug_key: report.trigger_debug_key,
                        report_id,
                        randomized_trigger_rate: rate,
                    });
                }
            }
            RandomizedOutcome::Randomized { dropped, fake } => {
                debug!(
                    "{} randomized: {} true reports dropped, {} fake reports",
                    id,
                    dropped.len(),
                    fake.len()
                );
                self.stats.sources_randomized += 1;
                self.stats.fake_reports += fake.len() as u64;

                for report in dropped {
                    self.reject_trigger(RejectionReason::Noised, report.original_trigger);
                }
                for fake_report in fake {
                    let report_id = self.noise.report_id();
                    self.reports.push(ScheduledReport {
                        report_time: self.scheduler.window_report_time(&source, fake_report.window),
                        source: report_source.clone(),
                        trigger_data: fake_report.trigger_data,
                        trigger_debug_key: None,
                        report_id,
                        randomized_trigger_rate: rate,
                    });
                }
            }
        }
    }
}
