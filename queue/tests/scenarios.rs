//! End-to-end queue scenarios, from wire frames to state.

#![allow(clippy::unwrap_used)] // Test code

use komiut_queue::{
    ErrorOrigin, QueueEvent, QueueEventBody, QueueState, QueueVehicle, reduce_event,
};
use komiut_testing::test_time;
use serde_json::json;

const ROUTE: &str = "route-42";

fn v1() -> QueueVehicle {
    QueueVehicle::new("V1", "KCA 111A", ROUTE, 1, 14).with_available_seats(3)
}

fn v2() -> QueueVehicle {
    QueueVehicle::new("V2", "KCB 222B", ROUTE, 2, 14).with_available_seats(0)
}

fn synced_state() -> QueueState {
    reduce_event(
        &QueueState::new(ROUTE),
        QueueEvent::synced(ROUTE, vec![v1(), v2()]),
        test_time(),
    )
}

#[test]
fn sync_into_empty_state() {
    let frame = json!({
        "type": "queueSynced",
        "routeId": ROUTE,
        "vehicles": [
            {
                "id": "entry-V2", "vehicleId": "V2", "registrationNumber": "KCB 222B",
                "routeId": ROUTE, "position": 2, "status": "waiting",
                "totalSeats": 14, "availableSeats": 0
            },
            {
                "id": "entry-V1", "vehicleId": "V1", "registrationNumber": "KCA 111A",
                "routeId": ROUTE, "position": 1, "status": "waiting",
                "totalSeats": 14, "availableSeats": 3
            }
        ]
    });

    let state = reduce_event(&QueueState::new(ROUTE), QueueEvent::decode(&frame), test_time());

    assert_eq!(state.vehicles, vec![v1(), v2()]);
    assert_eq!(state.total_available_seats(), 3);
    assert_eq!(state.first_vehicle(), Some(&v1()));
    assert!(!state.is_loading);
}

#[test]
fn departure_does_not_renumber() {
    let state = reduce_event(&synced_state(), QueueEvent::left(ROUTE, "V1"), test_time());

    assert_eq!(state.vehicles, vec![v2()]);
    assert_eq!(state.position_of("V2"), Some(2));
}

#[test]
fn negative_seat_count_clamps_to_zero() {
    let frame = json!({
        "type": "vehicleSeatCountChanged",
        "routeId": ROUTE,
        "vehicleId": "V1",
        "oldSeatCount": 3,
        "newSeatCount": -2,
    });

    let state = reduce_event(&synced_state(), QueueEvent::decode(&frame), test_time());

    assert_eq!(state.get_vehicle_by_id("V1").unwrap().available_seats, 0);
}

#[test]
fn unknown_type_decodes_to_error_event() {
    let event = QueueEvent::decode(&json!({ "type": "totally_unknown" }));

    assert_eq!(event.route_id, "");
    let QueueEventBody::Error(error) = &event.body else {
        unreachable!("unknown types decode to error events");
    };
    assert_eq!(error.message, "Unknown error");
    assert_eq!(error.origin, ErrorOrigin::Decode);

    // Surfaced as an error without disturbing the queue
    let state = reduce_event(&synced_state(), event, test_time());
    assert_eq!(state.vehicles, vec![v1(), v2()]);
    assert!(state.has_error());
}

#[test]
fn ghost_vehicle_is_a_no_op() {
    let previous = synced_state();
    let later = test_time() + chrono::Duration::seconds(5);

    let next = reduce_event(
        &previous,
        QueueEvent::position_changed(ROUTE, "ghost", 1, 2),
        later,
    );

    assert_eq!(next.vehicles, previous.vehicles);
    assert_eq!(next.last_updated, Some(later));
    assert_eq!(
        QueueState {
            last_updated: previous.last_updated,
            version: previous.version,
            ..next
        },
        previous
    );
}

#[test]
fn snake_case_frames_are_understood() {
    let frame = r#"{"type":"vehicle_status_changed","routeId":"route-42","vehicleId":"V1","oldStatus":"waiting","newStatus":"boarding"}"#;

    let state = reduce_event(&synced_state(), QueueEvent::decode_str(frame), test_time());

    let boarding: Vec<_> = state.boarding_vehicles().map(|v| v.vehicle_id.as_str()).collect();
    assert_eq!(boarding, ["V1"]);
}
