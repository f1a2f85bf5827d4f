// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Order-controlled edits on `serde_yaml` mappings.
//!
//! `serde_yaml::Mapping` preserves insertion order but offers no
//! positional insert, so these helpers rebuild the mapping when a key has
//! to land at a specific spot. Key order is what keeps generated text
//! diff-stable, so every mutation here is explicit about it.

use serde_yaml::{Mapping, Value};

/// Removes `key` preserving the order of the remaining entries.
pub(crate) fn shift_remove(map: &mut Mapping, key: &str) -> Option<Value> {
    if !map.contains_key(key) {
        return None;
    }
    let mut removed = None;
    let old = std::mem::take(map);
    for (k, v) in old {
        if removed.is_none() && k.as_str() == Some(key) {
            removed = Some(v);
            continue;
        }
        map.insert(k, v);
    }
    removed
}

/// Replaces the value of `key` in place, or inserts it immediately after
/// the first present anchor from `after` (anchors are tried in order; with
/// no anchor present the key lands at the front).
pub(crate) fn insert_ordered(map: &mut Mapping, key: &str, value: Value, after: &[&str]) {
    if let Some(slot) = map.get_mut(key) {
        *slot = value;
        return;
    }
    let anchor = after
        .iter()
        .find_map(|a| position_of(map, a))
        .map_or(0, |idx| idx + 1);

    let old = std::mem::take(map);
    for (idx, (k, v)) in old.into_iter().enumerate() {
        if idx == anchor {
            map.insert(Value::String(key.to_owned()), value.clone());
        }
        map.insert(k, v);
    }
    // Anchor at or past the end: append.
    if !map.contains_key(key) {
        map.insert(Value::String(key.to_owned()), value);
    }
}

/// Renames `old_key` to `new_key` keeping its position and value.
pub(crate) fn rename_key(map: &mut Mapping, old_key: &str, new_key: &str) -> bool {
    if !map.contains_key(old_key) {
        return false;
    }
    let old = std::mem::take(map);
    for (k, v) in old {
        if k.as_str() == Some(old_key) {
            map.insert(Value::String(new_key.to_owned()), v);
        } else {
            map.insert(k, v);
        }
    }
    true
}

fn position_of(map: &Mapping, key: &str) -> Option<usize> {
    map.iter().position(|(k, _)| k.as_str() == Some(key))
}

/// Borrows the mapping under `key` mutably, creating an empty one when
/// absent (appended at the end).
pub(crate) fn child_mapping_mut<'a>(map: &'a mut Mapping, key: &str) -> &'a mut Mapping {
    if !map.contains_key(key) {
        map.insert(
            Value::String(key.to_owned()),
            Value::Mapping(Mapping::new()),
        );
    } else if map.get(key).and_then(Value::as_mapping).is_none() {
        // Replace a scalar/null placeholder (e.g. `nodes:`) with a mapping.
        if let Some(slot) = map.get_mut(key) {
            *slot = Value::Mapping(Mapping::new());
        }
    }
    match map.get_mut(key) {
        Some(Value::Mapping(child)) => child,
        _ => unreachable!("child mapping was just ensured"),
    }
}

/// Borrows the sequence under `key` mutably, creating an empty one when
/// absent (appended at the end).
pub(crate) fn child_sequence_mut<'a>(map: &'a mut Mapping, key: &str) -> &'a mut Vec<Value> {
    if map.get(key).and_then(Value::as_sequence).is_none() {
        map.insert(Value::String(key.to_owned()), Value::Sequence(Vec::new()));
    }
    match map.get_mut(key) {
        Some(Value::Sequence(seq)) => seq,
        _ => unreachable!("child sequence was just ensured"),
    }
}
