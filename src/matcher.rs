use log::info;

use crate::{calendar::HourBlockCode, slot::CleanSlot};

/// Keeps the slots whose time-range label is exactly the site's label for
/// `code`. An empty result means no availability, not a failure.
pub fn filter_by_hour_block(slots: Vec<CleanSlot>, code: HourBlockCode) -> Vec<CleanSlot> {
    let target = code.label();
    let matched: Vec<CleanSlot> = slots
        .into_iter()
        .filter(|slot| slot.time_range == target)
        .collect();
    info!("{} slots open at {}", matched.len(), target);
    matched
}
