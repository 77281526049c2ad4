//! End-to-end tests over the real TCP surface: a server task accepting
//! connections, a client speaking the JSON line protocol.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{Days, Utc};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LinesCodec};

use slotbook::engine::Engine;
use slotbook::wire;

async fn start_server(name: &str) -> SocketAddr {
    let dir = std::env::temp_dir().join("slotbook_test_wire");
    std::fs::create_dir_all(&dir).unwrap();
    let wal_path = dir.join(name);
    let _ = std::fs::remove_file(&wal_path);

    let engine = Arc::new(Engine::new(wal_path).unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            let engine = engine.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, engine).await;
            });
        }
    });

    addr
}

struct Client {
    framed: Framed<TcpStream, LinesCodec>,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let socket = TcpStream::connect(addr).await.unwrap();
        Self {
            framed: Framed::new(socket, LinesCodec::new()),
        }
    }

    async fn call(&mut self, req: Value) -> Value {
        self.framed.send(req.to_string()).await.unwrap();
        let line = self.framed.next().await.unwrap().unwrap();
        serde_json::from_str(&line).unwrap()
    }
}

/// A date far enough ahead that "my bookings" (which filters against the
/// real clock) will include it.
fn future_date() -> String {
    (Utc::now().date_naive() + Days::new(30)).to_string()
}

#[tokio::test]
async fn booking_flow_over_the_wire() {
    let addr = start_server("flow.wal").await;
    let mut client = Client::connect(addr).await;
    let date = future_date();

    let reply = client
        .call(json!({
            "op": "create_resource",
            "resource_id": "room-2",
            "name": "Meeting Room 2",
            "description": "Small meeting room",
            "config": { "duration_min": 30, "start": "09:00", "end": "17:00" }
        }))
        .await;
    assert_eq!(reply["ok"], json!(true));

    let reply = client.call(json!({ "op": "list_resources" })).await;
    assert_eq!(reply["data"]["resources"][0]["id"], json!("room-2"));

    // First booking wins the slot.
    let reply = client
        .call(json!({
            "op": "create_booking",
            "resource_id": "room-2",
            "date": date,
            "time": "09:00",
            "owner_id": "alice",
            "owner_email": "alice@example.com"
        }))
        .await;
    assert_eq!(reply["ok"], json!(true));
    let booking_id = reply["data"]["booking"]["id"].as_str().unwrap().to_string();
    assert_eq!(
        reply["data"]["booking"]["resource_name"],
        json!("Meeting Room 2")
    );

    // Second booking on the same triple is a conflict, not a generic error.
    let reply = client
        .call(json!({
            "op": "create_booking",
            "resource_id": "room-2",
            "date": date,
            "time": "09:00",
            "owner_id": "bob",
            "owner_email": "bob@example.com"
        }))
        .await;
    assert_eq!(reply["ok"], json!(false));
    assert_eq!(reply["error"], json!("slot_conflict"));

    // Availability shows 16 half-hour slots, 09:00 taken.
    let reply = client
        .call(json!({
            "op": "get_availability",
            "resource_id": "room-2",
            "date": date
        }))
        .await;
    let slots = reply["data"]["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 16);
    for slot in slots {
        let expect_free = slot["time"] != json!("09:00");
        assert_eq!(slot["is_available"], json!(expect_free), "at {}", slot["time"]);
    }

    // Only the owner may cancel.
    let reply = client
        .call(json!({
            "op": "cancel_booking",
            "booking_id": booking_id,
            "owner_id": "bob"
        }))
        .await;
    assert_eq!(reply["error"], json!("forbidden"));

    let reply = client
        .call(json!({
            "op": "my_bookings",
            "owner_id": "alice"
        }))
        .await;
    assert_eq!(reply["data"]["bookings"].as_array().unwrap().len(), 1);

    let reply = client
        .call(json!({
            "op": "cancel_booking",
            "booking_id": booking_id,
            "owner_id": "alice"
        }))
        .await;
    assert_eq!(reply["ok"], json!(true));
    assert_eq!(reply["data"]["booking"]["status"], json!("cancelled"));

    // The cancelled slot reopens and can be taken by someone else.
    let reply = client
        .call(json!({
            "op": "create_booking",
            "resource_id": "room-2",
            "date": date,
            "time": "09:00",
            "owner_id": "bob",
            "owner_email": "bob@example.com"
        }))
        .await;
    assert_eq!(reply["ok"], json!(true));

    // The month listing carries the confirmed booking.
    let reply = client
        .call(json!({
            "op": "list_bookings",
            "start_date": date,
            "end_date": date
        }))
        .await;
    let bookings = reply["data"]["bookings"].as_array().unwrap();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0]["owner_id"], json!("bob"));
}

#[tokio::test]
async fn invalid_requests_get_distinct_errors() {
    let addr = start_server("errors.wal").await;
    let mut client = Client::connect(addr).await;

    // Not JSON at all.
    let reply = client.call(json!("not an object")).await;
    assert_eq!(reply["error"], json!("invalid_request"));

    // Unknown op.
    let reply = client.call(json!({ "op": "drop_tables" })).await;
    assert_eq!(reply["error"], json!("invalid_request"));

    // Malformed time string.
    let reply = client
        .call(json!({
            "op": "create_booking",
            "resource_id": "room-1",
            "date": "2024-06-10",
            "time": "quarter past nine",
            "owner_id": "alice",
            "owner_email": "alice@example.com"
        }))
        .await;
    assert_eq!(reply["error"], json!("invalid_request"));

    // Well-formed but unknown resource.
    let reply = client
        .call(json!({
            "op": "get_availability",
            "resource_id": "ghost",
            "date": "2024-06-10"
        }))
        .await;
    assert_eq!(reply["error"], json!("resource_not_found"));
    assert!(reply["message"].as_str().unwrap().contains("ghost"));

    // Off-grid time on a real resource.
    let reply = client
        .call(json!({
            "op": "create_resource",
            "resource_id": "room-1",
            "name": "Meeting Room 1",
            "config": { "duration_min": 60, "start": "09:00", "end": "17:00" }
        }))
        .await;
    assert_eq!(reply["ok"], json!(true));

    let reply = client
        .call(json!({
            "op": "create_booking",
            "resource_id": "room-1",
            "date": "2024-06-10",
            "time": "09:30",
            "owner_id": "alice",
            "owner_email": "alice@example.com"
        }))
        .await;
    assert_eq!(reply["error"], json!("invalid_slot"));
}

#[tokio::test]
async fn concurrent_clients_one_winner() {
    let addr = start_server("concurrent.wal").await;
    let date = future_date();

    let mut setup = Client::connect(addr).await;
    let reply = setup
        .call(json!({
            "op": "create_resource",
            "resource_id": "room-1",
            "name": "Meeting Room 1",
            "config": { "duration_min": 60, "start": "09:00", "end": "17:00" }
        }))
        .await;
    assert_eq!(reply["ok"], json!(true));

    // Six clients race for the same slot over separate connections.
    let tasks: Vec<_> = (0..6)
        .map(|i| {
            let date = date.clone();
            tokio::spawn(async move {
                let mut client = Client::connect(addr).await;
                client
                    .call(json!({
                        "op": "create_booking",
                        "resource_id": "room-1",
                        "date": date,
                        "time": "10:00",
                        "owner_id": format!("user-{i}"),
                        "owner_email": format!("user-{i}@example.com")
                    }))
                    .await
            })
        })
        .collect();

    let mut wins = 0;
    let mut conflicts = 0;
    for task in tasks {
        let reply = task.await.unwrap();
        if reply["ok"] == json!(true) {
            wins += 1;
        } else {
            assert_eq!(reply["error"], json!("slot_conflict"));
            conflicts += 1;
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(conflicts, 5);
}
