//! Filter matching between trigger filters and source filter data.
//!
//! Only keys present on both sides are compared. A key the source never
//! declared cannot constrain it, and a key the trigger never mentions
//! imposes nothing.

use crate::types::FilterValues;

/// Checks a trigger's `filters` / `not_filters` against a source's data.
///
/// - `filters`: every shared key needs a non-empty intersection
/// - `not_filters`: every shared key needs an empty intersection
pub fn matches(filters: &FilterValues, not_filters: &FilterValues, source_data: &FilterValues) -> bool {
    shared_keys_satisfy(filters, source_data, true) && shared_keys_satisfy(not_filters, source_data, false)
}

fn shared_keys_satisfy(trigger: &FilterValues, source_data: &FilterValues, want_intersection: bool) -> bool {
    trigger.iter().all(|(key, trigger_values)| match source_data.get(key) {
        None => true,
        Some(source_values) => {
            let intersects = trigger_values.intersection(source_values).next().is_some();
            intersects == want_intersection
        }
    })
}
