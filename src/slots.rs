//! Slot grid: the canonical set of bookable time labels a resource offers on
//! any given day, derived purely from its `BookingConfig`.

use crate::model::{BookingConfig, SlotTime};

/// Generate the ordered slot labels for `[start, end)` stepping by
/// `duration_min`. The end time itself is never emitted; a trailing window
/// shorter than `duration_min` yields no partial slot.
pub fn generate_slots(start: SlotTime, end: SlotTime, duration_min: u32) -> Vec<SlotTime> {
    let mut slots = Vec::new();
    if duration_min == 0 {
        return slots;
    }
    let mut t = u32::from(start.minutes());
    let end = u32::from(end.minutes());
    while t < end {
        // t < end < MINUTES_PER_DAY, so the label always constructs.
        slots.push(SlotTime::from_minutes(t as u16).expect("slot stays within the day"));
        t += duration_min;
    }
    slots
}

/// True iff `time` is a member of the resource's slot grid: inside
/// `[start, end)` and aligned to the slot duration. This predicate is the
/// authoritative validity check for incoming booking times.
pub fn is_valid_slot(time: SlotTime, config: &BookingConfig) -> bool {
    if config.duration_min == 0 {
        return false;
    }
    if time < config.start || time >= config.end {
        return false;
    }
    u32::from(time.minutes() - config.start.minutes()) % config.duration_min == 0
}
