use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::slots::is_valid_slot;

use super::{Engine, EngineError, now_ms};

fn validate_config(config: &BookingConfig) -> Result<(), EngineError> {
    if config.duration_min < MIN_SLOT_MINUTES || config.duration_min > MAX_SLOT_MINUTES {
        return Err(EngineError::InvalidConfig(
            "slot duration must be between 15 and 480 minutes",
        ));
    }
    if config.start >= config.end {
        return Err(EngineError::InvalidConfig("start time must be before end time"));
    }
    Ok(())
}

fn validate_resource(resource: &Resource) -> Result<(), EngineError> {
    if resource.id.is_empty() || resource.id.len() > MAX_RESOURCE_ID_LEN {
        return Err(EngineError::LimitExceeded("resource id length"));
    }
    if resource.name.is_empty() || resource.name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("resource name length"));
    }
    if resource.description.len() > MAX_DESCRIPTION_LEN {
        return Err(EngineError::LimitExceeded("resource description too long"));
    }
    validate_config(&resource.config)
}

fn validate_owner(owner_id: &str, owner_email: &str) -> Result<(), EngineError> {
    if owner_id.len() > MAX_OWNER_LEN || owner_email.len() > MAX_OWNER_LEN {
        return Err(EngineError::LimitExceeded("owner identifier too long"));
    }
    Ok(())
}

impl Engine {
    // ── Administrative path ──────────────────────────────────

    pub async fn create_resource(&self, resource: Resource) -> Result<(), EngineError> {
        validate_resource(&resource)?;
        if self.resources.len() >= MAX_RESOURCES {
            return Err(EngineError::LimitExceeded("too many resources"));
        }
        if self.resources.contains_key(&resource.id) {
            return Err(EngineError::ResourceExists(resource.id));
        }

        let event = Event::ResourceCreated {
            id: resource.id.clone(),
            name: resource.name.clone(),
            description: resource.description.clone(),
            is_active: resource.is_active,
            config: resource.config,
        };
        self.wal_append(&event).await?;
        let id = resource.id.clone();
        self.resources
            .insert(id, Arc::new(RwLock::new(ResourceState::new(resource))));
        Ok(())
    }

    /// Update a resource's display fields, active flag, or booking config.
    /// Deactivation goes through here; resources are never deleted.
    pub async fn update_resource(
        &self,
        id: &str,
        name: String,
        description: String,
        is_active: bool,
        config: BookingConfig,
    ) -> Result<Resource, EngineError> {
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("resource name length"));
        }
        if description.len() > MAX_DESCRIPTION_LEN {
            return Err(EngineError::LimitExceeded("resource description too long"));
        }
        validate_config(&config)?;
        let rs = self
            .get_resource(id)
            .ok_or_else(|| EngineError::ResourceNotFound(id.to_string()))?;
        let mut guard = rs.write().await;

        let event = Event::ResourceUpdated {
            id: id.to_string(),
            name,
            description,
            is_active,
            config,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(guard.resource.clone())
    }

    // ── Booking Transaction ──────────────────────────────────

    /// Create a confirmed booking: validate, check the slot, commit — all
    /// under the resource's write lock, so two identical requests serialize
    /// and exactly one of them wins the slot.
    pub async fn create_booking(
        &self,
        resource_id: &str,
        date: NaiveDate,
        time: SlotTime,
        owner_id: &str,
        owner_email: &str,
    ) -> Result<Booking, EngineError> {
        validate_owner(owner_id, owner_email)?;
        let rs = self
            .get_resource(resource_id)
            .ok_or_else(|| EngineError::ResourceNotFound(resource_id.to_string()))?;
        let mut guard = rs.write().await;

        // Inactive resources take no new bookings.
        if !guard.resource.is_active {
            return Err(EngineError::ResourceNotFound(resource_id.to_string()));
        }
        if !is_valid_slot(time, &guard.resource.config) {
            return Err(EngineError::InvalidSlot {
                time,
                config: guard.resource.config,
            });
        }
        if guard.find_confirmed(date, time).is_some() {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::SlotConflict {
                resource_id: resource_id.to_string(),
                date,
                time,
            });
        }

        let booking = Booking {
            id: Ulid::new(),
            resource_id: resource_id.to_string(),
            resource_name: guard.resource.name.clone(),
            owner_id: owner_id.to_string(),
            owner_email: owner_email.to_string(),
            date,
            time,
            status: BookingStatus::Confirmed,
            created_at: now_ms(),
        };
        let event = Event::BookingCreated {
            id: booking.id,
            resource_id: booking.resource_id.clone(),
            resource_name: booking.resource_name.clone(),
            owner_id: booking.owner_id.clone(),
            owner_email: booking.owner_email.clone(),
            date,
            time,
            created_at: booking.created_at,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
        Ok(booking)
    }

    /// Transition `confirmed → cancelled`, owner-scoped. Cancelling an
    /// already-cancelled booking is idempotent success.
    pub async fn cancel_booking(
        &self,
        booking_id: Ulid,
        requester_id: &str,
    ) -> Result<Booking, EngineError> {
        let (resource_id, mut guard) = self.resolve_booking_write(&booking_id).await?;

        {
            let booking = guard
                .booking(booking_id)
                .ok_or(EngineError::BookingNotFound(booking_id))?;
            if booking.owner_id != requester_id {
                return Err(EngineError::NotOwner(booking_id));
            }
            if !booking.status.is_confirmed() {
                return Ok(booking.clone());
            }
        }

        let event = Event::BookingCancelled {
            id: booking_id,
            resource_id,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
        Ok(guard
            .booking(booking_id)
            .expect("cancelled booking remains in the ledger")
            .clone())
    }
}
