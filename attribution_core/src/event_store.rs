//! The Event Store - registered sources and the bookkeeping attached to them.
//!
//! The store is the only owner of attribution state: dedup sets, stored
//! reports, per-destination reporting origins and the attribution
//! rate-limit ledger. The resolver mutates it through `&mut EventStore`;
//! nothing is global.

use crate::config::AttributionLimits;
use crate::report::{PendingReport, RejectionReason};
use crate::scheduler::REPORT_DELIVERY_DELAY_HOURS;
use crate::types::{Source, Timestamp, Trigger};
use chrono::Duration;
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

/// Index of a source inside the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub usize);

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

/// Whether a source's randomized outcome has been drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalization {
    Pending,
    Finalized,
}

/// A source plus its attribution state.
#[derive(Debug, Clone)]
pub struct StoredSource {
    pub id: SourceId,

    pub source: Source,

    /// Input JSON, echoed back if the source is ever rejected later
    pub original: Value,

    /// First instant at which the source no longer attributes
    pub expiry_time: Timestamp,

    /// Cleared when another source wins an attribution it competed for
    pub active: bool,

    /// Dedup keys consumed by triggers attributed to this source
    pub dedup_keys: HashSet<i64>,

    /// True attributions awaiting finalization
    pub reports: Vec<PendingReport>,

    pub finalization: Finalization,
}

impl StoredSource {
    /// Returns true once `as_of` reaches the expiry time.
    pub fn is_expired(&self, as_of: Timestamp) -> bool {
        as_of >= self.expiry_time
    }

    /// Returns true if triggers at `as_of` may attribute to this source.
    pub fn is_eligible(&self, as_of: Timestamp) -> bool {
        self.active && self.finalization == Finalization::Pending && !self.is_expired(as_of)
    }
}

/// One attribution counted against the rate limit.
#[derive(Debug, Clone)]
struct RateLimitRecord {
    serial: u64,
    source_origin: String,
    destination: String,
    reporting_origin: String,
    time: Timestamp,
}

/// Holds registered sources in registration order.
pub struct EventStore {
    limits: AttributionLimits,

    sources: Vec<StoredSource>,

    rate_limits: Vec<RateLimitRecord>,

    last_source_time: Option<Timestamp>,

    last_trigger_time: Option<Timestamp>,
}

impl EventStore {
    /// Creates an empty store enforcing the given limits.
    pub fn new(limits: AttributionLimits) -> Self {
        Self {
            limits,
            sources: Vec::new(),
            rate_limits: Vec::new(),
            last_source_time: None,
            last_trigger_time: None,
        }
    }

    /// Returns the limits this store enforces.
    pub fn limits(&self) -> &AttributionLimits {
        &self.limits
    }

    /// Registers a source.
    ///
    /// Source-level rejections happen here, independent of any trigger.
    pub fn register_source(&mut self, source: Source, original: Value) -> Result<SourceId, RejectionReason> {
        if self.last_source_time.is_some_and(|last| source.source_time < last) {
            return Err(RejectionReason::Internal);
        }
        let expiry_time = source.expiry_time().ok_or(RejectionReason::Internal)?;
        // reports may be delivered up to one delay past expiry
        if expiry_time
            .checked_add_signed(Duration::hours(REPORT_DELIVERY_DELAY_HOURS))
            .is_none()
        {
            return Err(RejectionReason::Internal);
        }
        let now = source.source_time;

        let origins: HashSet<&str> = self
            .sources
            .iter()
            .filter(|s| !s.is_expired(now) && s.source.destination == source.destination)
            .map(|s| s.source.reporting_origin.as_str())
            .collect();
        if !origins.contains(source.reporting_origin.as_str())
            && origins.len() >= self.limits.max_reporting_origins_per_destination
        {
            debug!(
                "Rejecting source for {}: {} reporting origins already registered",
                source.destination,
                origins.len()
            );
            return Err(RejectionReason::ExcessiveReportingOrigins);
        }

        let from_origin = self
            .sources
            .iter()
            .filter(|s| s.is_eligible(now) && s.source.source_origin == source.source_origin)
            .count();
        if from_origin >= self.limits.max_sources_per_origin {
            return Err(RejectionReason::InsufficientSourceCapacity);
        }

        let id = SourceId(self.sources.len());
        self.last_source_time = Some(now);
        self.sources.push(StoredSource {
            id,
            source,
            original,
            expiry_time,
            active: true,
            dedup_keys: HashSet::new(),
            reports: Vec::new(),
            finalization: Finalization::Pending,
        });

        Ok(id)
    }

    /// Registers a trigger's arrival.
    ///
    /// Triggers are not stored; only their ordering is checked.
    pub fn register_trigger(&mut self, trigger: &Trigger) -> Result<(), RejectionReason> {
        if self.last_trigger_time.is_some_and(|last| trigger.trigger_time < last) {
            return Err(RejectionReason::Internal);
        }
        self.last_trigger_time = Some(trigger.trigger_time);
        Ok(())
    }

    /// Returns sources a trigger at `as_of` may attribute to.
    ///
    /// Ordered by priority (highest first), then by registration time
    /// (most recent first).
    pub fn eligible_sources(&self, destination: &str, reporting_origin: &str, as_of: Timestamp) -> Vec<SourceId> {
        let mut eligible: Vec<&StoredSource> = self
            .sources
            .iter()
            .filter(|s| {
                s.is_eligible(as_of)
                    && s.source.source_time <= as_of
                    && s.source.destination == destination
                    && s.source.reporting_origin == reporting_origin
            })
            .collect();

        eligible.sort_by(|a, b| {
            b.source
                .priority
                .cmp(&a.source.priority)
                .then(b.source.source_time.cmp(&a.source.source_time))
                .then(b.id.cmp(&a.id))
        });

        eligible.into_iter().map(|s| s.id).collect()
    }

    /// Returns true if an active source matched but has expired by `as_of`.
    pub fn has_expired_sources(&self, destination: &str, reporting_origin: &str, as_of: Timestamp) -> bool {
        self.sources.iter().any(|s| {
            s.active
                && s.is_expired(as_of)
                && s.source.destination == destination
                && s.source.reporting_origin == reporting_origin
        })
    }

    /// Returns a stored source.
    ///
    /// Ids only come from this store, so they are always in range.
    pub fn get(&self, id: SourceId) -> &StoredSource {
        &self.sources[id.0]
    }

    /// Returns a stored source mutably.
    pub fn get_mut(&mut self, id: SourceId) -> &mut StoredSource {
        &mut self.sources[id.0]
    }

    /// Marks sources as no longer eligible for attribution.
    pub fn invalidate(&mut self, ids: impl IntoIterator<Item = SourceId>) {
        for id in ids {
            let stored = self.get_mut(id);
            if stored.active {
                debug!("Invalidating {}", id);
                stored.active = false;
            }
        }
    }

    /// Counts attributions inside the rate-limit window ending at `as_of`.
    pub fn attribution_count(&self, source: &Source, as_of: Timestamp) -> usize {
        // a window reaching past the earliest representable time covers everything
        let window_start = as_of.checked_sub_signed(self.limits.rate_limit_window);
        self.rate_limits
            .iter()
            .filter(|r| {
                window_start.map_or(true, |start| r.time > start)
                    && r.source_origin == source.source_origin
                    && r.destination == source.destination
                    && r.reporting_origin == source.reporting_origin
            })
            .count()
    }

    /// Records an attribution against the rate limit.
    pub fn record_attribution(&mut self, source: &Source, serial: u64, time: Timestamp) {
        self.rate_limits.push(RateLimitRecord {
            serial,
            source_origin: source.source_origin.clone(),
            destination: source.destination.clone(),
            reporting_origin: source.reporting_origin.clone(),
            time,
        });
    }

    /// Releases the rate-limit slot of a replaced report.
    pub fn forget_attribution(&mut self, serial: u64) {
        self.rate_limits.retain(|r| r.serial != serial);
    }
}
