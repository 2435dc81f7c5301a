//! Grouping of owner-tagged schedules.

use indexmap::IndexMap;

use crate::models::Schedule;

/// Bucket for schedules without an owner tag.
pub const UNKNOWN_OWNER: &str = "Unknown";

/// Group schedules by owner nickname.
///
/// Owners appear in first-seen order; each owner's schedules keep their
/// input order.
pub fn group_by_owner(schedules: &[Schedule]) -> IndexMap<String, Vec<Schedule>> {
    let mut groups: IndexMap<String, Vec<Schedule>> = IndexMap::new();
    for schedule in schedules {
        let owner = schedule
            .owner_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(UNKNOWN_OWNER);
        groups
            .entry(owner.to_string())
            .or_default()
            .push(schedule.clone());
    }
    groups
}
