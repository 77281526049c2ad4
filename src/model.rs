use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — creation stamps and durations.
pub type Ms = i64;

/// A canonical slot label: wall-clock minutes since midnight, rendered as
/// zero-padded 24-hour `HH:MM`. Parsing is the only constructor from text,
/// so a `SlotTime` is syntactically valid by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotTime(u16);

pub const MINUTES_PER_DAY: u16 = 24 * 60;

impl SlotTime {
    pub fn from_minutes(minutes: u16) -> Option<Self> {
        (minutes < MINUTES_PER_DAY).then_some(Self(minutes))
    }

    pub fn minutes(&self) -> u16 {
        self.0
    }

    pub fn to_naive_time(&self) -> chrono::NaiveTime {
        chrono::NaiveTime::from_hms_opt(u32::from(self.0) / 60, u32::from(self.0) % 60, 0)
            .expect("minutes stay below 24:00")
    }
}

impl fmt::Display for SlotTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl FromStr for SlotTime {
    type Err = ParseSlotTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, m) = s.split_once(':').ok_or(ParseSlotTimeError)?;
        // Hour may be unpadded ("9:00"); minutes are always two digits.
        if h.is_empty()
            || h.len() > 2
            || m.len() != 2
            || !h.bytes().all(|b| b.is_ascii_digit())
            || !m.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(ParseSlotTimeError);
        }
        let hours: u16 = h.parse().map_err(|_| ParseSlotTimeError)?;
        let minutes: u16 = m.parse().map_err(|_| ParseSlotTimeError)?;
        if hours > 23 || minutes > 59 {
            return Err(ParseSlotTimeError);
        }
        Ok(Self(hours * 60 + minutes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseSlotTimeError;

impl fmt::Display for ParseSlotTimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected a 24-hour HH:MM time")
    }
}

impl std::error::Error for ParseSlotTimeError {}

impl Serialize for SlotTime {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SlotTime {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SlotTimeVisitor;

        impl serde::de::Visitor<'_> for SlotTimeVisitor {
            type Value = SlotTime;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a 24-hour HH:MM time")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<SlotTime, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(SlotTimeVisitor)
    }
}

/// Per-resource booking window and slot size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfig {
    /// Slot length in minutes.
    pub duration_min: u32,
    /// Opening time, inclusive.
    pub start: SlotTime,
    /// Closing time, exclusive — the closing label itself is never bookable.
    pub end: SlotTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Stable string key, e.g. `"room-2"`.
    pub id: String,
    pub name: String,
    pub description: String,
    /// Inactive resources are hidden from listings and take no new bookings;
    /// their existing bookings remain valid history.
    pub is_active: bool,
    pub config: BookingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, BookingStatus::Confirmed)
    }
}

/// One reservation of one slot on one resource on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub resource_id: String,
    /// Snapshot of the resource name at creation time; survives renames.
    pub resource_name: String,
    pub owner_id: String,
    pub owner_email: String,
    /// Day-granularity by construction.
    pub date: NaiveDate,
    pub time: SlotTime,
    pub status: BookingStatus,
    pub created_at: Ms,
}

impl Booking {
    /// The instant this booking's slot begins.
    pub fn slot_start(&self) -> NaiveDateTime {
        self.date.and_time(self.time.to_naive_time())
    }

    fn sort_key(&self) -> (NaiveDate, SlotTime, Ms, Ulid) {
        (self.date, self.time, self.created_at, self.id)
    }
}

/// One resource plus its booking ledger. All mutation happens under the
/// owning engine's exclusive write lock for this resource.
#[derive(Debug, Clone)]
pub struct ResourceState {
    pub resource: Resource,
    /// All bookings ever taken on this resource, sorted by (date, time,
    /// created_at). Cancelled bookings are retained as history.
    bookings: Vec<Booking>,
    /// Occupancy index: the unique constraint on `(date, time)` restricted
    /// to confirmed bookings. `insert_confirmed` refuses an occupied key, so
    /// uniqueness is enforced here in the store, not by callers.
    confirmed: HashMap<(NaiveDate, SlotTime), Ulid>,
}

impl ResourceState {
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            bookings: Vec::new(),
            confirmed: HashMap::new(),
        }
    }

    /// Atomic check-and-insert of a confirmed booking. Returns the occupying
    /// booking id if the slot is already held.
    pub fn insert_confirmed(&mut self, booking: Booking) -> Result<(), Ulid> {
        debug_assert!(booking.status.is_confirmed());
        match self.confirmed.entry((booking.date, booking.time)) {
            Entry::Occupied(e) => return Err(*e.get()),
            Entry::Vacant(v) => {
                v.insert(booking.id);
            }
        }
        let pos = self
            .bookings
            .partition_point(|b| b.sort_key() <= booking.sort_key());
        self.bookings.insert(pos, booking);
        Ok(())
    }

    /// Transition a booking to cancelled, freeing its slot. Idempotent:
    /// cancelling an already-cancelled booking changes nothing.
    pub fn cancel(&mut self, id: Ulid) -> Option<&Booking> {
        let booking = self.bookings.iter_mut().find(|b| b.id == id)?;
        if booking.status.is_confirmed() {
            booking.status = BookingStatus::Cancelled;
            let key = (booking.date, booking.time);
            if self.confirmed.get(&key) == Some(&id) {
                self.confirmed.remove(&key);
            }
        }
        Some(booking)
    }

    /// Point lookup for the conflict check.
    pub fn find_confirmed(&self, date: NaiveDate, time: SlotTime) -> Option<&Booking> {
        let id = self.confirmed.get(&(date, time))?;
        self.booking(*id)
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    /// All bookings (any status) on the given date. Binary search over the
    /// sorted ledger, so days outside the range cost nothing.
    pub fn bookings_on(&self, date: NaiveDate) -> &[Booking] {
        let lo = self.bookings.partition_point(|b| b.date < date);
        let hi = self.bookings.partition_point(|b| b.date <= date);
        &self.bookings[lo..hi]
    }

    /// All bookings with `start <= date <= end`, any status.
    pub fn bookings_between(&self, start: NaiveDate, end: NaiveDate) -> &[Booking] {
        let lo = self.bookings.partition_point(|b| b.date < start);
        let hi = self.bookings.partition_point(|b| b.date <= end);
        &self.bookings[lo..hi.max(lo)]
    }

    pub fn bookings(&self) -> &[Booking] {
        &self.bookings
    }
}

/// The event types — flat, no nesting beyond config. This is the WAL record
/// format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ResourceCreated {
        id: String,
        name: String,
        description: String,
        is_active: bool,
        config: BookingConfig,
    },
    ResourceUpdated {
        id: String,
        name: String,
        description: String,
        is_active: bool,
        config: BookingConfig,
    },
    BookingCreated {
        id: Ulid,
        resource_id: String,
        resource_name: String,
        owner_id: String,
        owner_email: String,
        date: NaiveDate,
        time: SlotTime,
        created_at: Ms,
    },
    BookingCancelled {
        id: Ulid,
        resource_id: String,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceSummary {
    pub resource_id: String,
    pub name: String,
    pub description: String,
    pub config: BookingConfig,
}

impl ResourceSummary {
    pub fn of(resource: &Resource) -> Self {
        Self {
            resource_id: resource.id.clone(),
            name: resource.name.clone(),
            description: resource.description.clone(),
            config: resource.config,
        }
    }
}

/// The booking attached to a slot in an availability view. Cancelled
/// bookings appear here as history without blocking the slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotBooking {
    pub id: Ulid,
    pub owner_id: String,
    pub owner_email: String,
    pub status: BookingStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotStatus {
    pub time: SlotTime,
    pub is_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking: Option<SlotBooking>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityView {
    pub resource: ResourceSummary,
    pub slots: Vec<SlotStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> SlotTime {
        s.parse().unwrap()
    }

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn room() -> Resource {
        Resource {
            id: "room-1".into(),
            name: "Meeting Room 1".into(),
            description: "Main conference room".into(),
            is_active: true,
            config: BookingConfig {
                duration_min: 60,
                start: t("09:00"),
                end: t("17:00"),
            },
        }
    }

    fn booking(date: &str, time: &str, created_at: Ms) -> Booking {
        Booking {
            id: Ulid::new(),
            resource_id: "room-1".into(),
            resource_name: "Meeting Room 1".into(),
            owner_id: "u1".into(),
            owner_email: "u1@example.com".into(),
            date: d(date),
            time: t(time),
            status: BookingStatus::Confirmed,
            created_at,
        }
    }

    #[test]
    fn slot_time_parse_and_format() {
        assert_eq!(t("09:00").minutes(), 540);
        assert_eq!(t("9:00"), t("09:00")); // unpadded hour accepted
        assert_eq!(t("00:00").minutes(), 0);
        assert_eq!(t("23:59").minutes(), 1439);
        assert_eq!(t("16:30").to_string(), "16:30");
        assert_eq!(t("9:05").to_string(), "09:05"); // always rendered padded
    }

    #[test]
    fn slot_time_rejects_malformed() {
        for bad in ["", "9", "09:0", "09:000", "24:00", "12:60", "ab:cd", "12-30", "009:00", " 9:00"] {
            assert!(bad.parse::<SlotTime>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn slot_time_ordering() {
        assert!(t("09:00") < t("09:30"));
        assert!(t("09:30") < t("17:00"));
    }

    #[test]
    fn slot_time_serde_roundtrip() {
        let json = serde_json::to_string(&t("08:15")).unwrap();
        assert_eq!(json, "\"08:15\"");
        let back: SlotTime = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t("08:15"));
        assert!(serde_json::from_str::<SlotTime>("\"25:00\"").is_err());
    }

    #[test]
    fn insert_confirmed_keeps_sort_order() {
        let mut rs = ResourceState::new(room());
        rs.insert_confirmed(booking("2024-06-11", "09:00", 3)).unwrap();
        rs.insert_confirmed(booking("2024-06-10", "15:00", 1)).unwrap();
        rs.insert_confirmed(booking("2024-06-10", "09:00", 2)).unwrap();

        let keys: Vec<_> = rs.bookings().iter().map(|b| (b.date, b.time)).collect();
        assert_eq!(
            keys,
            vec![
                (d("2024-06-10"), t("09:00")),
                (d("2024-06-10"), t("15:00")),
                (d("2024-06-11"), t("09:00")),
            ]
        );
    }

    #[test]
    fn insert_confirmed_rejects_occupied_slot() {
        let mut rs = ResourceState::new(room());
        let first = booking("2024-06-10", "09:00", 1);
        let first_id = first.id;
        rs.insert_confirmed(first).unwrap();

        let result = rs.insert_confirmed(booking("2024-06-10", "09:00", 2));
        assert_eq!(result, Err(first_id));
        assert_eq!(rs.bookings().len(), 1);
    }

    #[test]
    fn cancel_frees_slot_for_reinsert() {
        let mut rs = ResourceState::new(room());
        let b = booking("2024-06-10", "09:00", 1);
        let id = b.id;
        rs.insert_confirmed(b).unwrap();

        let cancelled = rs.cancel(id).unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert!(rs.find_confirmed(d("2024-06-10"), t("09:00")).is_none());

        // Slot is open again; history is retained.
        rs.insert_confirmed(booking("2024-06-10", "09:00", 2)).unwrap();
        assert_eq!(rs.bookings().len(), 2);
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut rs = ResourceState::new(room());
        let b = booking("2024-06-10", "09:00", 1);
        let id = b.id;
        rs.insert_confirmed(b).unwrap();

        rs.cancel(id).unwrap();
        let again = rs.cancel(id).unwrap();
        assert_eq!(again.status, BookingStatus::Cancelled);
    }

    #[test]
    fn cancel_does_not_evict_successor_from_index() {
        // Cancel the old booking only after a new one took the same slot:
        // the index entry belongs to the new booking and must survive.
        let mut rs = ResourceState::new(room());
        let old = booking("2024-06-10", "09:00", 1);
        let old_id = old.id;
        rs.insert_confirmed(old).unwrap();
        rs.cancel(old_id).unwrap();

        let new = booking("2024-06-10", "09:00", 2);
        let new_id = new.id;
        rs.insert_confirmed(new).unwrap();

        rs.cancel(old_id); // no-op
        assert_eq!(rs.find_confirmed(d("2024-06-10"), t("09:00")).unwrap().id, new_id);
    }

    #[test]
    fn cancel_unknown_returns_none() {
        let mut rs = ResourceState::new(room());
        assert!(rs.cancel(Ulid::new()).is_none());
    }

    #[test]
    fn bookings_on_selects_single_day() {
        let mut rs = ResourceState::new(room());
        rs.insert_confirmed(booking("2024-06-09", "09:00", 1)).unwrap();
        rs.insert_confirmed(booking("2024-06-10", "09:00", 2)).unwrap();
        rs.insert_confirmed(booking("2024-06-10", "10:00", 3)).unwrap();
        rs.insert_confirmed(booking("2024-06-11", "09:00", 4)).unwrap();

        let day = rs.bookings_on(d("2024-06-10"));
        assert_eq!(day.len(), 2);
        assert!(day.iter().all(|b| b.date == d("2024-06-10")));

        assert!(rs.bookings_on(d("2024-06-12")).is_empty());
    }

    #[test]
    fn slot_start_combines_date_and_time() {
        let b = booking("2024-06-10", "09:30", 1);
        assert_eq!(b.slot_start().to_string(), "2024-06-10 09:30:00");
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingCreated {
            id: Ulid::new(),
            resource_id: "room-2".into(),
            resource_name: "Meeting Room 2".into(),
            owner_id: "u9".into(),
            owner_email: "u9@example.com".into(),
            date: d("2024-06-10"),
            time: t("09:00"),
            created_at: 1_700_000_000_000,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
