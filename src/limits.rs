//! Operational bounds. Every externally supplied value is checked against one
//! of these before it can reach the ledger or the WAL.

/// Shortest bookable slot in minutes.
pub const MIN_SLOT_MINUTES: u32 = 15;

/// Longest bookable slot in minutes (8 hours).
pub const MAX_SLOT_MINUTES: u32 = 480;

pub const MAX_RESOURCES: usize = 10_000;

pub const MAX_RESOURCE_ID_LEN: usize = 128;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_DESCRIPTION_LEN: usize = 1024;
pub const MAX_OWNER_LEN: usize = 256;

/// Widest date range a single listing query may cover, in days.
pub const MAX_RANGE_DAYS: i64 = 366;

/// Longest accepted wire request line in bytes.
pub const MAX_LINE_LEN: usize = 64 * 1024;
