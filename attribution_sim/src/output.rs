//! Runs one input document through the engine and renders the result.

use crate::error::{InputError, RunError};
use crate::input::parse_input;
use attribution_core::{run_simulation, SimulationOptions};
use serde_json::Value;
use tracing::debug;

/// Output-shaping switches of the driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
    /// Echo the input document in a top-level `input` field
    pub copy_input_to_output: bool,

    /// Pretty-print (single mode) instead of one compact line (multi mode)
    pub pretty: bool,
}

/// Simulates one JSON document and returns the output JSON.
pub fn process_json_string(
    json_input: &str,
    options: &SimulationOptions,
    output_options: OutputOptions,
) -> Result<String, RunError> {
    let input: Value = serde_json::from_str(json_input).map_err(InputError::from)?;
    let events = parse_input(&input)?;
    debug!("Parsed {} events", events.len());

    let output = run_simulation(events, options)?;

    let mut rendered = serde_json::to_value(&output).map_err(RunError::Output)?;
    if output_options.copy_input_to_output {
        if let Value::Object(map) = &mut rendered {
            map.insert("input".to_string(), input);
        }
    }

    if output_options.pretty {
        serde_json::to_string_pretty(&rendered)
    } else {
        serde_json::to_string(&rendered)
    }
    .map_err(RunError::Output)
}
