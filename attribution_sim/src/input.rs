//! Input parsing - turns the JSON document into validated engine events.
//!
//! Numeric fields inside `registration_config` are base-10 strings so that
//! full 64-bit values survive JSON. Origins are normalized to their
//! serialized form, so `https://A.test:443/path` and `https://a.test` are
//! the same origin.

use crate::error::InputError;
use attribution_core::types::{timestamp_from_secs, Timestamp};
use attribution_core::{
    Event, EventTriggerData, FilterValues, InputEvent, Source, SourceType, Trigger, SOURCE_TYPE_FILTER_KEY,
};
use chrono::Duration;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use url::Url;

// ============================================================================
// RAW RECORDS
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawSource {
    source_time: i64,
    source_origin: String,
    source_type: String,
    registration_config: RawSourceConfig,
}

#[derive(Debug, Deserialize)]
struct RawSourceConfig {
    source_event_id: String,
    destination: String,
    reporting_origin: String,
    #[serde(default)]
    expiry: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    filter_data: FilterValues,
    #[serde(default)]
    debug_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTrigger {
    trigger_time: i64,
    destination: String,
    reporting_origin: String,
    #[serde(default)]
    registration_config: RawTriggerConfig,
}

#[derive(Debug, Default, Deserialize)]
struct RawTriggerConfig {
    #[serde(default)]
    debug_key: Option<String>,
    #[serde(default)]
    filters: FilterValues,
    #[serde(default)]
    not_filters: FilterValues,
    #[serde(default)]
    event_triggers: Vec<RawEventTrigger>,
}

#[derive(Debug, Deserialize)]
struct RawEventTrigger {
    #[serde(default)]
    trigger_data: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    dedup_key: Option<String>,
    #[serde(default)]
    filters: FilterValues,
    #[serde(default)]
    not_filters: FilterValues,
}

// ============================================================================
// PARSING
// ============================================================================

/// Parses a whole input document.
///
/// Sources come first, then triggers, each in document order; the engine
/// orders them by time.
pub fn parse_input(input: &Value) -> Result<Vec<InputEvent>, InputError> {
    let document = input
        .as_object()
        .ok_or_else(|| InputError::invalid("input", "must be a dictionary"))?;

    let mut events = Vec::new();

    for (index, value) in list(document.get("sources"), "sources")?.iter().enumerate() {
        let path = format!("sources[{}]", index);
        let source = parse_source(value, &path)?;
        events.push(InputEvent::new(Event::Source(source), value.clone()));
    }

    for (index, value) in list(document.get("triggers"), "triggers")?.iter().enumerate() {
        let path = format!("triggers[{}]", index);
        let trigger = parse_trigger(value, &path)?;
        events.push(InputEvent::new(Event::Trigger(trigger), value.clone()));
    }

    Ok(events)
}

fn list<'a>(value: Option<&'a Value>, path: &str) -> Result<&'a [Value], InputError> {
    match value {
        None => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(InputError::invalid(path, "must be a list")),
    }
}

/// Parses one source record.
pub fn parse_source(value: &Value, path: &str) -> Result<Source, InputError> {
    let raw: RawSource = deserialize(value, path)?;
    let config = raw.registration_config;
    let config_path = format!("{}.registration_config", path);

    let source_type = SourceType::from_str(&raw.source_type)
        .map_err(|message| InputError::invalid(format!("{}.source_type", path), message))?;

    if config.filter_data.contains_key(SOURCE_TYPE_FILTER_KEY) {
        return Err(InputError::invalid(
            format!("{}.filter_data", config_path),
            format!("must not contain the reserved key `{}`", SOURCE_TYPE_FILTER_KEY),
        ));
    }

    let mut source = Source::new(
        parse_time(raw.source_time, &format!("{}.source_time", path))?,
        source_type,
        parse_origin(&config.destination, &format!("{}.destination", config_path))?,
        parse_origin(&config.reporting_origin, &format!("{}.reporting_origin", config_path))?,
    )
    .with_source_origin(parse_origin(&raw.source_origin, &format!("{}.source_origin", path))?)
    .with_event_id(parse_number(&config.source_event_id, &format!("{}.source_event_id", config_path))?)
    .with_filter_data(config.filter_data);

    if let Some(expiry) = &config.expiry {
        let expiry_path = format!("{}.expiry", config_path);
        let millis: i64 = parse_number(expiry, &expiry_path)?;
        let expiry = Duration::try_milliseconds(millis)
            .ok_or_else(|| InputError::invalid(expiry_path, "out of range"))?;
        source = source.with_expiry(expiry);
    }
    if let Some(priority) = &config.priority {
        source = source.with_priority(parse_number(priority, &format!("{}.priority", config_path))?);
    }
    if let Some(debug_key) = &config.debug_key {
        source = source.with_debug_key(parse_number(debug_key, &format!("{}.debug_key", config_path))?);
    }

    Ok(source)
}

/// Parses one trigger record.
pub fn parse_trigger(value: &Value, path: &str) -> Result<Trigger, InputError> {
    let raw: RawTrigger = deserialize(value, path)?;
    let config = raw.registration_config;
    let config_path = format!("{}.registration_config", path);

    let mut trigger = Trigger::new(
        parse_time(raw.trigger_time, &format!("{}.trigger_time", path))?,
        parse_origin(&raw.destination, &format!("{}.destination", path))?,
        parse_origin(&raw.reporting_origin, &format!("{}.reporting_origin", path))?,
    )
    .with_filters(config.filters)
    .with_not_filters(config.not_filters);

    if let Some(debug_key) = &config.debug_key {
        trigger = trigger.with_debug_key(parse_number(debug_key, &format!("{}.debug_key", config_path))?);
    }

    for (index, raw) in config.event_triggers.into_iter().enumerate() {
        let path = format!("{}.event_triggers[{}]", config_path, index);
        trigger = trigger.with_event_trigger(parse_event_trigger(raw, &path)?);
    }

    Ok(trigger)
}

fn parse_event_trigger(raw: RawEventTrigger, path: &str) -> Result<EventTriggerData, InputError> {
    let trigger_data = match &raw.trigger_data {
        Some(value) => parse_number(value, &format!("{}.trigger_data", path))?,
        None => 0,
    };

    let mut event_trigger = EventTriggerData::new(trigger_data)
        .with_filters(raw.filters)
        .with_not_filters(raw.not_filters);

    if let Some(priority) = &raw.priority {
        event_trigger = event_trigger.with_priority(parse_number(priority, &format!("{}.priority", path))?);
    }
    if let Some(dedup_key) = &raw.dedup_key {
        event_trigger = event_trigger.with_dedup_key(parse_number(dedup_key, &format!("{}.dedup_key", path))?);
    }

    Ok(event_trigger)
}

fn deserialize<T: DeserializeOwned>(value: &Value, path: &str) -> Result<T, InputError> {
    T::deserialize(value).map_err(|e| InputError::invalid(path, e.to_string()))
}

fn parse_time(secs: i64, path: &str) -> Result<Timestamp, InputError> {
    timestamp_from_secs(secs).ok_or_else(|| InputError::invalid(path, format!("time out of range: {}", secs)))
}

/// Parses a base-10 string into a number.
pub fn parse_number<T: FromStr>(value: &str, path: &str) -> Result<T, InputError> {
    value
        .parse()
        .map_err(|_| InputError::invalid(path, format!("must be a base-10 integer string: {:?}", value)))
}

/// Normalizes an `http`/`https` URL to its serialized origin.
pub fn parse_origin(value: &str, path: &str) -> Result<String, InputError> {
    let url = Url::parse(value).map_err(|e| InputError::invalid(path, format!("invalid origin {:?}: {}", value, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url.origin().ascii_serialization()),
        scheme => Err(InputError::invalid(
            path,
            format!("origin must use http or https, not {}", scheme),
        )),
    }
}
