//! Command-line switches.
//!
//! Switch names keep underscores (`--noise_mode`, `--report_time_format`)
//! so existing invocations keep working.

use attribution_core::{
    ConfigError, DelayMode, NoiseMode, RandomizedResponseRates, ReportTimeFormat, SimulationOptions,
};
use attribution_env::parse_seed;
use clap::Parser;

const ABOUT: &str = "Simulates the Attribution Reporting API for sources and triggers read from stdin.";

const LONG_ABOUT: &str = "\
Simulates the Attribution Reporting API for sources and triggers read from
stdin, and writes the generated reports, if any, to stdout with associated
metadata.

Sources and triggers are registered in chronological order according to their
`source_time` and `trigger_time` fields.

Input is a JSON dictionary with optional `sources` and `triggers` lists.
Numeric fields inside `registration_config` are base-10 strings.

With --input_mode=multi every stdin line is its own document, and the run
stops with exit code 1 at the first line that fails, blank lines included.";

/// How stdin is split into simulations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    /// The whole of stdin is one document
    #[default]
    Single,
    /// Each line is an independent document (JSON Lines)
    Multi,
}

impl std::str::FromStr for InputMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(InputMode::Single),
            "multi" => Ok(InputMode::Multi),
            _ => Err(ConfigError::unknown("input mode", s)),
        }
    }
}

/// Attribution reporting simulator
#[derive(Parser, Debug, Clone)]
#[command(name = "attribution-sim")]
#[command(about = ABOUT, long_about = LONG_ABOUT)]
#[command(disable_version_flag = true)]
pub struct Args {
    /// Copy the input to the output in a top-level `input` field
    #[arg(long = "copy_input_to_output")]
    pub copy_input_to_output: bool,

    /// Report delivery: `default` (reporting windows) or `none` (immediate)
    #[arg(long = "delay_mode", default_value = "default")]
    pub delay_mode: String,

    /// `default` (randomized response and shuffling) or `none`
    #[arg(long = "noise_mode", default_value = "default")]
    pub noise_mode: String,

    /// 128-bit hex seed for the XorShift128+ noise generator
    #[arg(long = "noise_seed")]
    pub noise_seed: Option<String>,

    /// Randomized response rate for event sources, in [0, 1]
    #[arg(long = "randomized_response_rate_event")]
    pub randomized_response_rate_event: Option<f64>,

    /// Randomized response rate for navigation sources, in [0, 1]
    #[arg(long = "randomized_response_rate_navigation")]
    pub randomized_response_rate_navigation: Option<f64>,

    /// `single` (one document) or `multi` (one document per line)
    #[arg(long = "input_mode", default_value = "single")]
    pub input_mode: String,

    /// Remove the randomly generated `report_id` from report bodies
    #[arg(long = "remove_report_ids")]
    pub remove_report_ids: bool,

    /// `seconds_since_unix_epoch` or `iso8601`
    #[arg(long = "report_time_format", default_value = "seconds_since_unix_epoch")]
    pub report_time_format: String,

    /// Remove randomly generated assembled-report fields from report bodies
    #[arg(long = "remove_assembled_report")]
    pub remove_assembled_report: bool,

    /// Print the tool version and exit
    #[arg(short = 'v', long)]
    pub version: bool,

    /// Debug logging on stderr
    #[arg(long)]
    pub verbose: bool,
}

impl Args {
    /// Builds validated simulation options from the switches.
    pub fn simulation_options(&self) -> Result<SimulationOptions, ConfigError> {
        let noise_mode: NoiseMode = self.noise_mode.parse()?;

        let noise_seed = match &self.noise_seed {
            Some(_) if noise_mode != NoiseMode::Default => return Err(ConfigError::SeedWithoutNoise),
            Some(seed) => Some(parse_seed(seed)?),
            None => None,
        };

        let defaults = RandomizedResponseRates::default();
        let options = SimulationOptions {
            noise_mode,
            noise_seed,
            randomized_response_rates: RandomizedResponseRates {
                navigation: self.randomized_response_rate_navigation.unwrap_or(defaults.navigation),
                event: self.randomized_response_rate_event.unwrap_or(defaults.event),
            },
            delay_mode: self.delay_mode.parse::<DelayMode>()?,
            report_time_format: self.report_time_format.parse::<ReportTimeFormat>()?,
            remove_report_ids: self.remove_report_ids,
            remove_assembled_report: self.remove_assembled_report,
            ..Default::default()
        };

        options.validate()?;
        Ok(options)
    }

    /// Returns the parsed input mode.
    pub fn input_mode(&self) -> Result<InputMode, ConfigError> {
        self.input_mode.parse()
    }
}
