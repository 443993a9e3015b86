//! This module is about turning a page of raw cast events into per-ability timelines.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Timestamps of every cast, grouped by ability id.
pub type SkillTimeline = BTreeMap<String, Vec<i64>>;

/// Group the timestamps of the `cast` events of `events` by ability id, keeping only `abilities` if given.
///
/// Events of other types, and events without an ability id or a timestamp, are skipped.
/// An `abilityGameID` of 0 is how the log marks a cast with no ability, so it counts as missing.
pub fn skill_timeline(events: &[Value], abilities: Option<&BTreeSet<i64>>) -> SkillTimeline {
    let mut timeline = SkillTimeline::new();
    for event in events {
        if event.get("type").and_then(Value::as_str) != Some("cast") {
            continue
        }
        let ability = match event.get("abilityGameID").and_then(Value::as_i64) {
            Some(ability) if ability != 0 => ability,
            _ => continue,
        };
        if let Some(abilities) = abilities {
            if !abilities.contains(&ability) {
                continue
            }
        }
        let timestamp = match event.get("timestamp").and_then(Value::as_i64) {
            Some(timestamp) => timestamp,
            None => continue,
        };
        timeline.entry(ability.to_string()).or_default().push(timestamp);
    }
    timeline
}

/// Parse a comma separated list of ability ids, such as `100, 200`.
pub fn parse_ability_ids(list: &str) -> Result<BTreeSet<i64>, std::num::ParseIntError> {
    list.split(',').map(|id| id.trim().parse::<i64>()).collect()
}
