//! Attribution Reporting Simulation Engine
//!
//! Replays a time-ordered stream of ad sources (clicks and views) and
//! conversion triggers, pairs triggers with sources, applies the
//! randomized-response privacy mechanism, and schedules the resulting
//! event-level reports.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                     Simulation Driver                      │
//! │                                                            │
//! │  events ──► ┌─────────────┐   ┌─────────────────────────┐  │
//! │  (by time)  │ Event Store │◄──│  Attribution Resolver   │  │
//! │             └──────┬──────┘   │   (Filter Matcher)      │  │
//! │                    │          └─────────────────────────┘  │
//! │        expiry heap │                                       │
//! │                    ▼                                       │
//! │             ┌─────────────┐   ┌─────────────────────────┐  │
//! │             │ Noise Engine│──►│    Report Scheduler     │──┼─► output
//! │             └─────────────┘   └─────────────────────────┘  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use attribution_core::{run_simulation, SimulationOptions};
//!
//! let options = SimulationOptions::default();
//! let output = run_simulation(events, &options)?;
//! println!("{}", serde_json::to_string_pretty(&output)?);
//! ```

pub mod config;
pub mod error;
pub mod event_store;
pub mod filters;
pub mod noise;
pub mod report;
pub mod resolver;
pub mod scheduler;
pub mod simulation;
pub mod types;

pub use config::{AttributionLimits, DelayMode, NoiseMode, RandomizedResponseRates, ReportTimeFormat, SimulationOptions};
pub use error::ConfigError;
pub use event_store::{EventStore, SourceId};
pub use noise::NoiseEngine;
pub use report::{
    RejectedSource, RejectedTrigger, RejectionReason, Report, ReportTime, SimulationOutput, SimulationStats,
};
pub use resolver::{Attribution, AttributionResolver};
pub use scheduler::{ReportFormatter, ReportScheduler};
pub use simulation::{run_simulation, Simulation};
pub use types::{
    Event, EventTriggerData, FilterValues, InputEvent, Source, SourceType, Timestamp, Trigger,
    SOURCE_TYPE_FILTER_KEY,
};
