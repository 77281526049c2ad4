mod availability;
mod error;
mod mutations;
mod queries;

pub use availability::day_availability;
pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

pub type SharedResourceState = Arc<RwLock<ResourceState>>;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(wal: &mut Wal, batch: &mut [(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The booking engine: resource registry + booking ledger behind one WAL.
///
/// Every resource's ledger lives under its own `RwLock`; all writes to it
/// happen with the write guard held, so the conflict check and the insert
/// form a single serializable critical section per resource.
pub struct Engine {
    pub(super) resources: DashMap<String, SharedResourceState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Reverse lookup: booking id → resource id. Cancelled bookings stay
    /// mapped — they remain addressable history.
    pub(super) booking_index: DashMap<Ulid, String>,
}

/// Apply an event directly to a ResourceState (no locking — caller holds the lock).
fn apply_to_resource(rs: &mut ResourceState, event: &Event, booking_index: &DashMap<Ulid, String>) {
    match event {
        Event::ResourceUpdated {
            name,
            description,
            is_active,
            config,
            ..
        } => {
            rs.resource.name = name.clone();
            rs.resource.description = description.clone();
            rs.resource.is_active = *is_active;
            rs.resource.config = *config;
        }
        Event::BookingCreated {
            id,
            resource_id,
            resource_name,
            owner_id,
            owner_email,
            date,
            time,
            created_at,
        } => {
            let booking = Booking {
                id: *id,
                resource_id: resource_id.clone(),
                resource_name: resource_name.clone(),
                owner_id: owner_id.clone(),
                owner_email: owner_email.clone(),
                date: *date,
                time: *time,
                status: BookingStatus::Confirmed,
                created_at: *created_at,
            };
            match rs.insert_confirmed(booking) {
                Ok(()) => {
                    booking_index.insert(*id, resource_id.clone());
                }
                Err(holder) => {
                    // Reachable only from a WAL that violated the constraint.
                    tracing::warn!("dropping booking {id}: slot already held by {holder}");
                }
            }
        }
        Event::BookingCancelled { id, .. } => {
            rs.cancel(*id);
        }
        // ResourceCreated is handled at the DashMap level, not here
        Event::ResourceCreated { .. } => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            resources: DashMap::new(),
            wal_tx,
            booking_index: DashMap::new(),
        };

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking_write
        // here because this may run inside an async context.
        for event in &events {
            match event {
                Event::ResourceCreated {
                    id,
                    name,
                    description,
                    is_active,
                    config,
                } => {
                    let rs = ResourceState::new(Resource {
                        id: id.clone(),
                        name: name.clone(),
                        description: description.clone(),
                        is_active: *is_active,
                        config: *config,
                    });
                    engine.resources.insert(id.clone(), Arc::new(RwLock::new(rs)));
                }
                other => {
                    if let Some(resource_id) = event_resource_id(other)
                        && let Some(entry) = engine.resources.get(resource_id)
                    {
                        let rs_arc = entry.clone();
                        let mut guard = rs_arc.try_write().expect("replay: uncontended write");
                        apply_to_resource(&mut guard, other, &engine.booking_index);
                    }
                }
            }
        }

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_resource(&self, id: &str) -> Option<SharedResourceState> {
        self.resources.get(id).map(|e| e.value().clone())
    }

    pub fn resource_for_booking(&self, booking_id: &Ulid) -> Option<String> {
        self.booking_index.get(booking_id).map(|e| e.value().clone())
    }

    /// WAL-append + apply in one call.
    pub(super) async fn persist_and_apply(
        &self,
        rs: &mut ResourceState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_resource(rs, event, &self.booking_index);
        Ok(())
    }

    /// Lookup booking → resource, get resource, acquire write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(String, tokio::sync::OwnedRwLockWriteGuard<ResourceState>), EngineError> {
        let resource_id = self
            .resource_for_booking(booking_id)
            .ok_or(EngineError::BookingNotFound(*booking_id))?;
        let rs = self
            .get_resource(&resource_id)
            .ok_or_else(|| EngineError::ResourceNotFound(resource_id.clone()))?;
        let guard = rs.write_owned().await;
        Ok((resource_id, guard))
    }

    /// Compact the WAL by rewriting it with only the events needed to recreate
    /// the current state. Cancelled bookings are re-emitted as create + cancel
    /// pairs so history survives compaction.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        let resource_ids: Vec<String> = self.resources.iter().map(|e| e.key().clone()).collect();
        for id in resource_ids {
            let Some(rs) = self.get_resource(&id) else {
                continue;
            };
            let guard = rs.read().await;

            events.push(Event::ResourceCreated {
                id: guard.resource.id.clone(),
                name: guard.resource.name.clone(),
                description: guard.resource.description.clone(),
                is_active: guard.resource.is_active,
                config: guard.resource.config,
            });

            for booking in guard.bookings() {
                events.push(Event::BookingCreated {
                    id: booking.id,
                    resource_id: booking.resource_id.clone(),
                    resource_name: booking.resource_name.clone(),
                    owner_id: booking.owner_id.clone(),
                    owner_email: booking.owner_email.clone(),
                    date: booking.date,
                    time: booking.time,
                    created_at: booking.created_at,
                });
                if !booking.status.is_confirmed() {
                    events.push(Event::BookingCancelled {
                        id: booking.id,
                        resource_id: booking.resource_id.clone(),
                    });
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Extract the resource id an event applies to (None for ResourceCreated,
/// which is handled at the map level).
fn event_resource_id(event: &Event) -> Option<&str> {
    match event {
        Event::ResourceUpdated { id, .. } => Some(id),
        Event::BookingCreated { resource_id, .. }
        | Event::BookingCancelled { resource_id, .. } => Some(resource_id),
        Event::ResourceCreated { .. } => None,
    }
}
