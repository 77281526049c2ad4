use chrono::{NaiveDate, NaiveDateTime};
use futures::future::join_all;

use crate::limits::*;
use crate::model::*;

use super::availability::day_availability;
use super::{Engine, EngineError, SharedResourceState};

impl Engine {
    /// Active resources, ordered by id.
    pub async fn list_resources(&self) -> Vec<Resource> {
        let shared = self.all_resources();
        let guards = join_all(shared.iter().map(|rs| rs.read())).await;
        let mut out: Vec<Resource> = guards
            .iter()
            .filter(|g| g.resource.is_active)
            .map(|g| g.resource.clone())
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// The day view: resource summary plus one `SlotStatus` per grid slot.
    /// Read-only; fails `ResourceNotFound` for missing or inactive resources.
    pub async fn availability(
        &self,
        resource_id: &str,
        date: NaiveDate,
    ) -> Result<AvailabilityView, EngineError> {
        let rs = self
            .get_resource(resource_id)
            .ok_or_else(|| EngineError::ResourceNotFound(resource_id.to_string()))?;
        let guard = rs.read().await;
        if !guard.resource.is_active {
            return Err(EngineError::ResourceNotFound(resource_id.to_string()));
        }
        Ok(AvailabilityView {
            resource: ResourceSummary::of(&guard.resource),
            slots: day_availability(&guard.resource, guard.bookings_on(date)),
        })
    }

    /// Confirmed bookings with `start <= date <= end`, optionally restricted
    /// to one resource. Feeds the month calendar. An unknown resource filter
    /// yields an empty list, not an error.
    pub async fn bookings_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        resource_id: Option<&str>,
    ) -> Result<Vec<Booking>, EngineError> {
        if end < start {
            return Ok(Vec::new());
        }
        if (end - start).num_days() > MAX_RANGE_DAYS {
            return Err(EngineError::LimitExceeded("date range too wide"));
        }

        let targets: Vec<SharedResourceState> = match resource_id {
            Some(id) => self.get_resource(id).into_iter().collect(),
            None => self.all_resources(),
        };
        let guards = join_all(targets.iter().map(|rs| rs.read())).await;

        let mut out: Vec<Booking> = guards
            .iter()
            .flat_map(|g| {
                g.bookings_between(start, end)
                    .iter()
                    .filter(|b| b.status.is_confirmed())
                    .cloned()
            })
            .collect();
        out.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then(a.time.cmp(&b.time))
                .then_with(|| a.resource_id.cmp(&b.resource_id))
        });
        Ok(out)
    }

    /// The owner's bookings (any status) whose slot starts at or after `now`,
    /// ordered by (date, time) ascending.
    pub async fn my_bookings(&self, owner_id: &str, now: NaiveDateTime) -> Vec<Booking> {
        let shared = self.all_resources();
        let guards = join_all(shared.iter().map(|rs| rs.read())).await;

        let mut out: Vec<Booking> = guards
            .iter()
            .flat_map(|g| {
                g.bookings()
                    .iter()
                    .filter(|b| b.owner_id == owner_id && b.slot_start() >= now)
                    .cloned()
            })
            .collect();
        out.sort_by(|a, b| a.date.cmp(&b.date).then(a.time.cmp(&b.time)));
        out
    }

    fn all_resources(&self) -> Vec<SharedResourceState> {
        self.resources.iter().map(|e| e.value().clone()).collect()
    }
}
