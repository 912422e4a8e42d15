//! The Noise Engine - randomized response over a source's output alphabet.
//!
//! A source's output is a multiset of at most `max_reports` buckets, where a
//! bucket is a (`trigger_data`, window) pair. The alphabet is every such
//! multiset, including the empty one, so it has
//! `C(max_reports + buckets, max_reports)` states. A state index is decoded
//! with the combinatorial number system ("stars and bars"): each star is a
//! report slot, and the number of bars before it picks a bucket, zero bars
//! meaning the slot stays empty.

use crate::config::{NoiseMode, RandomizedResponseRates};
use crate::report::{PendingReport, ScheduledReport};
use crate::types::SourceType;
use attribution_env::NoiseRng;
use rand::seq::SliceRandom;
use rand::Rng;
use uuid::{Builder, Uuid};

/// A report synthesized by randomized response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FakeReport {
    pub trigger_data: u64,
    pub window: usize,
}

/// What a source reports once its fate is drawn.
#[derive(Debug, Clone, PartialEq)]
pub enum RandomizedOutcome {
    /// The true attributions are reported
    Truthful(Vec<PendingReport>),

    /// A random state was drawn; true attributions are dropped
    Randomized {
        dropped: Vec<PendingReport>,
        fake: Vec<FakeReport>,
    },
}

/// Binomial coefficient `C(n, k)`, zero when `k > n`.
pub fn binomial(n: u64, k: u64) -> u64 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut result: u128 = 1;
    for i in 0..k as u128 {
        result = result * (n as u128 - i) / (i + 1);
    }
    result as u64
}

/// Number of distinct outputs a source of this type can produce.
pub fn num_states(source_type: SourceType) -> u64 {
    let channel = source_type.channel();
    let buckets = channel.trigger_data_cardinality * channel.num_windows as u64;
    let max_reports = channel.max_reports as u64;
    binomial(max_reports + buckets, max_reports)
}

/// Star positions for `index`, highest first.
fn star_indices(num_stars: u64, mut index: u64) -> Vec<u64> {
    let mut stars = Vec::with_capacity(num_stars as usize);
    for rank in (1..=num_stars).rev() {
        // largest position whose coefficient still fits
        let mut position = rank - 1;
        while binomial(position + 1, rank) <= index {
            position += 1;
        }
        stars.push(position);
        index -= binomial(position, rank);
    }
    stars
}

/// Decodes a state index into the fake reports it stands for.
///
/// `index` must be below [`num_states`] for the source type.
pub fn decode_state(source_type: SourceType, index: u64) -> Vec<FakeReport> {
    let channel = source_type.channel();
    let num_stars = channel.max_reports as u64;

    star_indices(num_stars, index)
        .into_iter()
        .enumerate()
        .filter_map(|(i, position)| {
            let stars_before = num_stars - 1 - i as u64;
            let bars = position - stars_before;
            if bars == 0 {
                return None;
            }
            let bucket = bars - 1;
            Some(FakeReport {
                trigger_data: bucket % channel.trigger_data_cardinality,
                window: (bucket / channel.trigger_data_cardinality) as usize,
            })
        })
        .collect()
}

/// Applies randomized response and shuffling with an injected generator.
pub struct NoiseEngine {
    mode: NoiseMode,
    rates: RandomizedResponseRates,
    rng: Box<dyn NoiseRng>,
}

impl NoiseEngine {
    /// Creates a noise engine.
    pub fn new(mode: NoiseMode, rates: RandomizedResponseRates, rng: Box<dyn NoiseRng>) -> Self {
        Self { mode, rates, rng }
    }

    /// Returns the flip rate actually applied to a source type.
    pub fn effective_rate(&self, source_type: SourceType) -> f64 {
        match self.mode {
            NoiseMode::None => 0.0,
            NoiseMode::Default => self.rates.for_type(source_type),
        }
    }

    /// Draws a source's fate.
    ///
    /// Called exactly once per source, after no further trigger can
    /// attribute to it.
    pub fn apply_noise(&mut self, source_type: SourceType, reports: Vec<PendingReport>) -> RandomizedOutcome {
        if self.mode == NoiseMode::None {
            return RandomizedOutcome::Truthful(reports);
        }

        let rate = self.effective_rate(source_type);
        if !self.rng.gen_bool(rate) {
            return RandomizedOutcome::Truthful(reports);
        }

        let state = self.rng.gen_range(0..num_states(source_type));
        RandomizedOutcome::Randomized {
            dropped: reports,
            fake: decode_state(source_type, state),
        }
    }

    /// Orders reports by delivery time.
    ///
    /// With noise on, reports sharing a delivery time are shuffled so that
    /// their order does not leak arrival order.
    pub fn order_reports(&mut self, reports: &mut [ScheduledReport]) {
        reports.sort_by_key(|r| r.report_time);
        if self.mode == NoiseMode::None {
            return;
        }

        let mut start = 0;
        while start < reports.len() {
            let time = reports[start].report_time;
            let end = reports[start..]
                .iter()
                .position(|r| r.report_time != time)
                .map_or(reports.len(), |offset| start + offset);
            reports[start..end].shuffle(&mut *self.rng);
            start = end;
        }
    }

    /// Generates a v4 report id from the noise generator.
    pub fn report_id(&mut self) -> Uuid {
        Builder::from_random_bytes(self.rng.next_u128().to_be_bytes()).into_uuid()
    }
}
