//! Attribution Reporting Simulator CLI
//!
//! Reads sources and triggers as JSON from stdin, runs them through
//! [`attribution_core`], and writes the reports and rejections to stdout.
//!
//! ```text
//! stdin ──► input (validate) ──► attribution_core ──► output (render) ──► stdout
//!                                                          │
//!                                   logs, errors ──────────┴─────────► stderr
//! ```

pub mod cli;
pub mod error;
pub mod input;
pub mod output;

pub use cli::{Args, InputMode};
pub use error::{InputError, RunError};
pub use input::parse_input;
pub use output::{process_json_string, OutputOptions};
