use crate::model::*;
use crate::slots::generate_slots;

// ── Availability Algorithm ────────────────────────────────────────

/// Compute the slot-by-slot availability of one resource for one day.
///
/// `bookings` is that day's ledger slice, any status. A slot is available
/// iff no confirmed booking occupies it. The occupying booking is attached
/// when present; failing that, the most recent cancelled booking at the
/// slot is attached as history (it does not block).
pub fn day_availability(resource: &Resource, bookings: &[Booking]) -> Vec<SlotStatus> {
    let grid = generate_slots(
        resource.config.start,
        resource.config.end,
        resource.config.duration_min,
    );

    grid.into_iter()
        .map(|time| {
            let confirmed = bookings
                .iter()
                .find(|b| b.time == time && b.status.is_confirmed());
            let attached = confirmed.or_else(|| {
                bookings
                    .iter()
                    .filter(|b| b.time == time)
                    .max_by_key(|b| (b.created_at, b.id))
            });
            SlotStatus {
                time,
                is_available: confirmed.is_none(),
                booking: attached.map(|b| SlotBooking {
                    id: b.id,
                    owner_id: b.owner_id.clone(),
                    owner_email: b.owner_email.clone(),
                    status: b.status,
                }),
            }
        })
        .collect()
}
