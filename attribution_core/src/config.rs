//! Simulation options and engine limits.

use crate::error::ConfigError;
use crate::types::SourceType;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Whether randomized response and shuffling are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseMode {
    /// Sources are subject to randomized response, windows are shuffled
    #[default]
    Default,
    /// True outcomes pass through untouched
    None,
}

/// Whether reports are batched into reporting windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayMode {
    /// Reports are sent after the reporting window closes
    #[default]
    Default,
    /// Reports are sent at attribution time
    None,
}

/// How `report_time` is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportTimeFormat {
    /// Integer seconds, e.g. `1643408373`
    #[default]
    SecondsSinceUnixEpoch,
    /// ISO 8601 with milliseconds, e.g. `"2022-01-28T22:19:33.000Z"`
    Iso8601,
}

impl std::str::FromStr for NoiseMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(NoiseMode::Default),
            "none" => Ok(NoiseMode::None),
            _ => Err(ConfigError::unknown("noise mode", s)),
        }
    }
}

impl std::str::FromStr for DelayMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(DelayMode::Default),
            "none" => Ok(DelayMode::None),
            _ => Err(ConfigError::unknown("delay mode", s)),
        }
    }
}

impl std::str::FromStr for ReportTimeFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "seconds_since_unix_epoch" => Ok(ReportTimeFormat::SecondsSinceUnixEpoch),
            "iso8601" => Ok(ReportTimeFormat::Iso8601),
            _ => Err(ConfigError::unknown("report time format", s)),
        }
    }
}

/// Probability that a source reports a random outcome instead of the truth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RandomizedResponseRates {
    pub navigation: f64,
    pub event: f64,
}

impl RandomizedResponseRates {
    /// Returns the rate for a source type.
    pub fn for_type(&self, source_type: SourceType) -> f64 {
        match source_type {
            SourceType::Navigation => self.navigation,
            SourceType::Event => self.event,
        }
    }
}

impl Default for RandomizedResponseRates {
    fn default() -> Self {
        Self {
            navigation: 0.0024,
            event: 0.0000025,
        }
    }
}

/// Everything the invoking driver may configure.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimulationOptions {
    pub noise_mode: NoiseMode,

    /// 128-bit XorShift128+ seed; only valid with `NoiseMode::Default`
    pub noise_seed: Option<u128>,

    pub randomized_response_rates: RandomizedResponseRates,

    pub delay_mode: DelayMode,

    pub report_time_format: ReportTimeFormat,

    /// Drop the randomly generated `report_id` from report bodies
    pub remove_report_ids: bool,

    /// Drop assembled aggregatable-report fields from report bodies
    pub remove_assembled_report: bool,

    pub limits: AttributionLimits,
}

impl SimulationOptions {
    /// Checks the options before any event is processed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.noise_seed.is_some() && self.noise_mode != NoiseMode::Default {
            return Err(ConfigError::SeedWithoutNoise);
        }

        for source_type in [SourceType::Navigation, SourceType::Event] {
            let rate = self.randomized_response_rates.for_type(source_type);
            // NaN fails the range check too
            if !(0.0..=1.0).contains(&rate) {
                return Err(ConfigError::RateOutOfRange {
                    source_type: source_type.name().to_string(),
                    rate,
                });
            }
        }

        Ok(())
    }
}

/// Bounds enforced by the event store and resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributionLimits {
    /// Distinct reporting origins per destination across unexpired sources
    pub max_reporting_origins_per_destination: usize,

    /// Unexpired sources per source origin
    pub max_sources_per_origin: usize,

    /// Attributions per (source origin, destination, reporting origin)
    /// inside one rate-limit window
    pub max_attributions_per_window: usize,

    pub rate_limit_window: Duration,
}

impl Default for AttributionLimits {
    fn default() -> Self {
        Self {
            max_reporting_origins_per_destination: 100,
            max_sources_per_origin: 1024,
            max_attributions_per_window: 100,
            rate_limit_window: Duration::days(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = SimulationOptions::default();
        assert_eq!(options.noise_mode, NoiseMode::Default);
        assert_eq!(options.delay_mode, DelayMode::Default);
        assert_eq!(options.report_time_format, ReportTimeFormat::SecondsSinceUnixEpoch);
        assert_eq!(options.randomized_response_rates.navigation, 0.0024);
        assert_eq!(options.randomized_response_rates.event, 0.0000025);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_seed_requires_noise() {
        let options = SimulationOptions {
            noise_mode: NoiseMode::None,
            noise_seed: Some(1),
            ..Default::default()
        };
        assert_eq!(options.validate(), Err(ConfigError::SeedWithoutNoise));
    }

    #[test]
    fn test_rate_range() {
        let mut options = SimulationOptions::default();
        options.randomized_response_rates.event = 1.5;
        assert!(matches!(options.validate(), Err(ConfigError::RateOutOfRange { .. })));

        options.randomized_response_rates.event = f64::NAN;
        assert!(options.validate().is_err());

        options.randomized_response_rates.event = 1.0;
        options.randomized_response_rates.navigation = 0.0;
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_parse_modes() {
        assert_eq!("none".parse::<NoiseMode>().unwrap(), NoiseMode::None);
        assert_eq!("default".parse::<DelayMode>().unwrap(), DelayMode::Default);
        assert_eq!("iso8601".parse::<ReportTimeFormat>().unwrap(), ReportTimeFormat::Iso8601);
        assert!("noise".parse::<NoiseMode>().is_err());
        assert!("later".parse::<DelayMode>().is_err());
    }
}
