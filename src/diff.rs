use serde_json::Value;

use crate::types::*;

pub(crate) fn diff_json(
    previous: &Value,
    current: &Value,
    path_prefix: &str,
    changes: &mut Vec<(String, Value, Value)>,
) {
    match (previous, current) {
        (Value::Object(prev_map), Value::Object(curr_map)) => {
            for (key, curr_val) in curr_map {
                let path = if path_prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{path_prefix}.{key}")
                };
                match prev_map.get(key) {
                    Some(prev_val) => diff_json(prev_val, curr_val, &path, changes),
                    None => {
                        if curr_val.is_object() {
                            let empty = Value::Object(serde_json::Map::new());
                            diff_json(&empty, curr_val, &path, changes);
                        } else {
                            changes.push((path, Value::Null, curr_val.clone()));
                        }
                    }
                }
            }
        }
        (prev, curr) if prev != curr => {
            changes.push((path_prefix.to_string(), prev.clone(), curr.clone()));
        }
        _ => {}
    }
}

/// Events for every driver whose value or unit differs from `previous`.
/// `force` reports all of `current`.
pub(crate) fn driver_events(
    address: &str,
    previous: &[DriverValue],
    current: &[DriverValue],
    force: bool,
) -> Vec<Event> {
    current
        .iter()
        .filter(|dv| {
            force
                || !previous
                    .iter()
                    .any(|p| p.driver == dv.driver && p.value == dv.value && p.uom == dv.uom)
        })
        .map(|dv| Event::DriverChanged {
            address: address.to_string(),
            driver: dv.driver,
            value: dv.value,
            uom: dv.uom,
        })
        .collect()
}

/// Replace the stored values for the drivers in `updates`, keeping the rest.
pub(crate) fn merge_drivers(stored: &mut Vec<DriverValue>, updates: &[DriverValue]) {
    for dv in updates {
        match stored.iter_mut().find(|s| s.driver == dv.driver) {
            Some(s) => *s = *dv,
            None => stored.push(*dv),
        }
    }
}
