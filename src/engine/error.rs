use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::{BookingConfig, SlotTime};

#[derive(Debug)]
pub enum EngineError {
    /// Resource is unknown or inactive.
    ResourceNotFound(String),
    BookingNotFound(Ulid),
    ResourceExists(String),
    /// Time is syntactically fine but not on the resource's slot grid.
    InvalidSlot { time: SlotTime, config: BookingConfig },
    InvalidConfig(&'static str),
    /// The slot already holds a confirmed booking.
    SlotConflict {
        resource_id: String,
        date: NaiveDate,
        time: SlotTime,
    },
    /// Cancel attempted by a principal that does not own the booking.
    NotOwner(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::ResourceNotFound(id) => write!(f, "resource not found: {id}"),
            EngineError::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::ResourceExists(id) => write!(f, "resource already exists: {id}"),
            EngineError::InvalidSlot { time, config } => write!(
                f,
                "{time} is not a valid time slot: must be between {} and {} at {} minute intervals",
                config.start, config.end, config.duration_min
            ),
            EngineError::SlotConflict { resource_id, date, time } => write!(
                f,
                "time slot is already booked: {resource_id} on {date} at {time}"
            ),
            EngineError::NotOwner(id) => {
                write!(f, "you can only cancel your own bookings: {id}")
            }
            EngineError::InvalidConfig(msg) => write!(f, "invalid booking config: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
