use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use ulid::Ulid;

use crate::engine::{Engine, EngineError};
use crate::limits::MAX_LINE_LEN;
use crate::model::{BookingConfig, Resource, SlotTime};

/// One request per line: a JSON object tagged by `"op"`. Callers arrive with
/// an already-resolved principal — `owner_id`/`owner_email` are passed
/// through as-is, never interpreted here.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    ListResources,
    GetAvailability {
        resource_id: String,
        date: NaiveDate,
    },
    ListBookings {
        start_date: NaiveDate,
        end_date: NaiveDate,
        #[serde(default)]
        resource_id: Option<String>,
    },
    MyBookings {
        owner_id: String,
    },
    CreateBooking {
        resource_id: String,
        date: NaiveDate,
        time: SlotTime,
        owner_id: String,
        owner_email: String,
    },
    CancelBooking {
        booking_id: Ulid,
        owner_id: String,
    },
    CreateResource {
        resource_id: String,
        name: String,
        #[serde(default)]
        description: String,
        #[serde(default = "default_active")]
        is_active: bool,
        config: BookingConfig,
    },
    UpdateResource {
        resource_id: String,
        name: String,
        #[serde(default)]
        description: String,
        #[serde(default = "default_active")]
        is_active: bool,
        config: BookingConfig,
    },
}

fn default_active() -> bool {
    true
}

/// Wire error code for an engine failure. Distinct codes let callers show
/// "already booked, pick another slot" instead of a generic failure.
pub fn error_code(e: &EngineError) -> &'static str {
    match e {
        EngineError::ResourceNotFound(_) => "resource_not_found",
        EngineError::BookingNotFound(_) => "booking_not_found",
        EngineError::ResourceExists(_) => "resource_exists",
        EngineError::InvalidSlot { .. } => "invalid_slot",
        EngineError::InvalidConfig(_) => "invalid_config",
        EngineError::SlotConflict { .. } => "slot_conflict",
        EngineError::NotOwner(_) => "forbidden",
        EngineError::LimitExceeded(_) => "limit_exceeded",
        EngineError::WalError(_) => "internal",
    }
}

pub async fn dispatch(engine: &Engine, req: Request) -> Result<Value, EngineError> {
    match req {
        Request::ListResources => Ok(json!({ "resources": engine.list_resources().await })),
        Request::GetAvailability { resource_id, date } => {
            let view = engine.availability(&resource_id, date).await?;
            Ok(json!(view))
        }
        Request::ListBookings {
            start_date,
            end_date,
            resource_id,
        } => {
            let bookings = engine
                .bookings_in_range(start_date, end_date, resource_id.as_deref())
                .await?;
            Ok(json!({ "bookings": bookings }))
        }
        Request::MyBookings { owner_id } => {
            let bookings = engine
                .my_bookings(&owner_id, Utc::now().naive_utc())
                .await;
            Ok(json!({ "bookings": bookings }))
        }
        Request::CreateBooking {
            resource_id,
            date,
            time,
            owner_id,
            owner_email,
        } => {
            let booking = engine
                .create_booking(&resource_id, date, time, &owner_id, &owner_email)
                .await?;
            Ok(json!({ "booking": booking }))
        }
        Request::CancelBooking { booking_id, owner_id } => {
            let booking = engine.cancel_booking(booking_id, &owner_id).await?;
            Ok(json!({ "booking": booking }))
        }
        Request::CreateResource {
            resource_id,
            name,
            description,
            is_active,
            config,
        } => {
            let resource = Resource {
                id: resource_id,
                name,
                description,
                is_active,
                config,
            };
            engine.create_resource(resource.clone()).await?;
            Ok(json!({ "resource": resource }))
        }
        Request::UpdateResource {
            resource_id,
            name,
            description,
            is_active,
            config,
        } => {
            let resource = engine
                .update_resource(&resource_id, name, description, is_active, config)
                .await?;
            Ok(json!({ "resource": resource }))
        }
    }
}

/// Serve one connection: read JSON lines, execute, reply one JSON line each.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
) -> Result<(), LinesCodecError> {
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));

    while let Some(line) = framed.next().await {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<Request>(&line) {
            Ok(req) => {
                let op = crate::observability::request_label(&req);
                let start = Instant::now();
                let result = dispatch(&engine, req).await;
                metrics::histogram!(crate::observability::REQUEST_DURATION_SECONDS, "op" => op)
                    .record(start.elapsed().as_secs_f64());
                match result {
                    Ok(data) => {
                        metrics::counter!(crate::observability::REQUESTS_TOTAL,
                            "op" => op, "status" => "ok")
                        .increment(1);
                        json!({ "ok": true, "data": data })
                    }
                    Err(e) => {
                        metrics::counter!(crate::observability::REQUESTS_TOTAL,
                            "op" => op, "status" => "error")
                        .increment(1);
                        tracing::debug!("{op} failed: {e}");
                        json!({ "ok": false, "error": error_code(&e), "message": e.to_string() })
                    }
                }
            }
            Err(e) => json!({
                "ok": false,
                "error": "invalid_request",
                "message": e.to_string(),
            }),
        };

        framed.send(reply.to_string()).await?;
    }

    Ok(())
}
