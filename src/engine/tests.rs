use std::sync::Arc;

use super::*;
use crate::calendar::CalendarQueue;
use crate::calendar::testing::RecordingCalendar;
use crate::limits::*;
use crate::seed::default_rooms;
use crate::slot::SlotError;

const M: Ms = 60_000; // 1 minute in ms
// 2025-01-06T00:00:00Z, a Monday
const DAY0: Ms = 1_736_121_600_000;

fn at(h: i64, m: i64) -> Ms {
    DAY0 + h * 60 * M + m * M
}

fn test_engine() -> Engine {
    Engine::new(default_rooms(), CalendarQueue::disabled()).unwrap()
}

fn booking(room: &str, start: Ms, end: Ms) -> NewReservation {
    NewReservation {
        room_id: RoomId::from(room),
        title: "Sync".into(),
        start,
        end,
        attendees: 4,
        purpose: None,
        created_by: None,
    }
}

fn rec(duration_minutes: i64, attendees: u32, equipment: &[Equipment], start_from: Ms) -> RecommendRequest {
    RecommendRequest {
        duration_minutes,
        attendees,
        required_equipment: equipment.iter().copied().collect(),
        start_from,
    }
}

fn ids(candidates: &[Candidate]) -> Vec<&str> {
    candidates.iter().map(|c| c.room.id.as_str()).collect()
}

// ── Construction ─────────────────────────────────────────

#[tokio::test]
async fn engine_seeds_rooms_in_id_order() {
    let engine = test_engine();
    let rooms = engine.list_rooms().await;
    assert_eq!(rooms.len(), 10);
    let listed: Vec<_> = rooms.iter().map(|r| r.id.as_str()).collect();
    let mut sorted = listed.clone();
    sorted.sort();
    assert_eq!(listed, sorted);
}

#[test]
fn duplicate_room_rejected() {
    let rooms = vec![
        Room::new("A", "Aquarium", 4, []),
        Room::new("A", "Attic", 6, []),
    ];
    match Engine::new(rooms, CalendarQueue::disabled()) {
        Err(EngineError::DuplicateRoom(id)) => assert_eq!(id.as_str(), "A"),
        Err(e) => panic!("expected DuplicateRoom, got {e}"),
        Ok(_) => panic!("expected DuplicateRoom"),
    }
}

#[test]
fn zero_capacity_room_rejected() {
    let rooms = vec![Room::new("A", "Closet", 0, [])];
    assert!(matches!(
        Engine::new(rooms, CalendarQueue::disabled()),
        Err(EngineError::InvalidField("capacity"))
    ));
}

#[test]
fn empty_inventory_is_allowed() {
    let engine = Engine::new(Vec::new(), CalendarQueue::disabled()).unwrap();
    assert_eq!(engine.ledger.room_count(), 0);
}

// ── Booking ──────────────────────────────────────────────

#[tokio::test]
async fn reserve_then_read_back() {
    let engine = test_engine();
    let mut new = booking("R2", at(10, 0), at(11, 0));
    new.purpose = Some("Roadmap".into());
    new.created_by = Some("dana".into());
    let r = engine.reserve(new).await.unwrap();

    assert_eq!(r.room_id.as_str(), "R2");
    assert_eq!(r.span, Span::new(at(10, 0), at(11, 0)));
    assert_eq!(r.purpose.as_deref(), Some("Roadmap"));
    assert_eq!(r.created_by, "dana");
    assert_eq!(engine.get_reservation(r.id).await, Some(r.clone()));
    assert_eq!(engine.list_reservations_for_room(&RoomId::from("R2")).await.unwrap(), vec![r]);
}

#[tokio::test]
async fn creator_defaults_to_anonymous() {
    let engine = test_engine();
    let r = engine.reserve(booking("R1", at(9, 0), at(9, 30))).await.unwrap();
    assert_eq!(r.created_by, DEFAULT_CREATOR);
}

#[tokio::test]
async fn overlapping_booking_conflicts_with_existing_id() {
    let engine = test_engine();
    let first = engine.reserve(booking("R2", at(10, 0), at(11, 0))).await.unwrap();

    match engine.reserve(booking("R2", at(10, 30), at(11, 30))).await {
        Err(EngineError::Conflict(id)) => assert_eq!(id, first.id),
        other => panic!("expected Conflict, got {other:?}"),
    }
    // Same slot on another room is fine.
    engine.reserve(booking("R3", at(10, 30), at(11, 30))).await.unwrap();
}

#[tokio::test]
async fn back_to_back_bookings_do_not_conflict() {
    let engine = test_engine();
    engine.reserve(booking("R2", at(10, 0), at(11, 0))).await.unwrap();
    engine.reserve(booking("R2", at(9, 0), at(10, 0))).await.unwrap();
    engine.reserve(booking("R2", at(11, 0), at(11, 15))).await.unwrap();
    assert_eq!(engine.list_reservations().await.len(), 3);
}

#[tokio::test]
async fn misaligned_or_bad_duration_never_reaches_ledger() {
    let engine = test_engine();

    // 20 minutes is not a whole number of slots.
    let err = engine.reserve(booking("R2", at(10, 0), at(10, 20))).await.unwrap_err();
    assert!(matches!(err, EngineError::Invalid(SlotError::Misaligned(_))));

    let err = engine.reserve(booking("R2", at(10, 5), at(11, 5))).await.unwrap_err();
    assert!(matches!(err, EngineError::Invalid(SlotError::Misaligned(_))));

    let err = engine.reserve(booking("R2", at(10, 0), at(12, 15))).await.unwrap_err();
    assert!(matches!(err, EngineError::Invalid(SlotError::DurationOutOfRange(135))));

    let err = engine.reserve(booking("R2", at(10, 0), at(10, 0))).await.unwrap_err();
    assert!(matches!(err, EngineError::Invalid(SlotError::EndNotAfterStart)));

    assert!(engine.list_reservations().await.is_empty());
    assert_eq!(engine.ledger.reservation_count(), 0);
}

#[tokio::test]
async fn field_validation() {
    let engine = test_engine();

    let mut new = booking("R1", at(9, 0), at(10, 0));
    new.title = "   ".into();
    assert!(matches!(engine.reserve(new).await, Err(EngineError::InvalidField("title"))));

    let mut new = booking("R1", at(9, 0), at(10, 0));
    new.attendees = 0;
    assert!(matches!(engine.reserve(new).await, Err(EngineError::InvalidField("attendees"))));

    let mut new = booking("R1", at(9, 0), at(10, 0));
    new.attendees = MAX_ATTENDEES + 1;
    assert!(matches!(engine.reserve(new).await, Err(EngineError::LimitExceeded(_))));

    let mut new = booking("R1", at(9, 0), at(10, 0));
    new.title = "x".repeat(MAX_TITLE_LEN + 1);
    assert!(matches!(engine.reserve(new).await, Err(EngineError::LimitExceeded(_))));

    let mut new = booking("R1", at(9, 0), at(10, 0));
    new.purpose = Some("x".repeat(MAX_PURPOSE_LEN + 1));
    assert!(matches!(engine.reserve(new).await, Err(EngineError::LimitExceeded(_))));
}

#[tokio::test]
async fn booking_may_exceed_capacity() {
    let engine = test_engine();
    let mut new = booking("R1", at(9, 0), at(10, 0));
    new.attendees = 40;
    engine.reserve(new).await.unwrap();
}

#[tokio::test]
async fn reserve_unknown_room() {
    let engine = test_engine();
    match engine.reserve(booking("R99", at(9, 0), at(10, 0))).await {
        Err(EngineError::RoomNotFound(id)) => assert_eq!(id.as_str(), "R99"),
        other => panic!("expected RoomNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_overlapping_reserves_exactly_one_wins() {
    let engine = Arc::new(test_engine());
    let mut handles = Vec::new();
    for i in 0..16 {
        let engine = engine.clone();
        // All overlap 10:30-11:00.
        let start = at(10, 0) + (i % 3) * 15 * M;
        handles.push(tokio::spawn(async move {
            engine.reserve(booking("R5", start, at(11, 0))).await
        }));
    }

    let mut wins = 0;
    let mut conflicts = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => wins += 1,
            Err(EngineError::Conflict(_)) => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(conflicts, 15);
    assert_eq!(engine.list_reservations_for_room(&RoomId::from("R5")).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_disjoint_reserves_all_win() {
    let engine = Arc::new(test_engine());
    let mut handles = Vec::new();
    for i in 0..8 {
        let engine = engine.clone();
        let start = at(8, 0) + i * 60 * M;
        handles.push(tokio::spawn(async move {
            engine.reserve(booking("R7", start, start + 60 * M)).await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }
    assert_eq!(engine.list_reservations().await.len(), 8);
}

// ── Availability ─────────────────────────────────────────

#[tokio::test]
async fn availability_around_existing_booking() {
    let engine = test_engine();
    let r2 = RoomId::from("R2");
    engine.reserve(booking("R2", at(10, 0), at(11, 0))).await.unwrap();

    assert!(!engine.is_available(&r2, at(10, 30), at(11, 0)).await.unwrap());
    assert!(!engine.is_available(&r2, at(9, 30), at(12, 0)).await.unwrap());
    assert!(engine.is_available(&r2, at(9, 0), at(10, 0)).await.unwrap());
    assert!(engine.is_available(&r2, at(11, 0), at(12, 0)).await.unwrap());
    // Other rooms are unaffected.
    assert!(engine.is_available(&RoomId::from("R3"), at(10, 0), at(11, 0)).await.unwrap());
}

#[tokio::test]
async fn availability_rejects_empty_interval_and_unknown_room() {
    let engine = test_engine();
    assert!(matches!(
        engine.is_available(&RoomId::from("R2"), at(11, 0), at(10, 0)).await,
        Err(EngineError::Invalid(SlotError::EndNotAfterStart))
    ));
    assert!(matches!(
        engine.is_available(&RoomId::from("nope"), at(10, 0), at(11, 0)).await,
        Err(EngineError::RoomNotFound(_))
    ));
}

#[tokio::test]
async fn availability_does_not_require_alignment() {
    let engine = test_engine();
    engine.reserve(booking("R2", at(10, 0), at(11, 0))).await.unwrap();
    assert!(engine.is_available(&RoomId::from("R2"), at(11, 0) + 1, at(11, 7)).await.unwrap());
    assert!(!engine.is_available(&RoomId::from("R2"), at(10, 59), at(11, 7)).await.unwrap());
}

// ── Cancellation ─────────────────────────────────────────

#[tokio::test]
async fn cancel_frees_the_slot() {
    let engine = test_engine();
    let r2 = RoomId::from("R2");
    let r = engine.reserve(booking("R2", at(10, 0), at(11, 0))).await.unwrap();
    assert!(!engine.is_available(&r2, at(10, 0), at(11, 0)).await.unwrap());

    let removed = engine.cancel(r.id).await.unwrap();
    assert_eq!(removed, r);
    assert!(engine.is_available(&r2, at(10, 0), at(11, 0)).await.unwrap());
    assert_eq!(engine.get_reservation(r.id).await, None);

    // The slot can be booked again.
    engine.reserve(booking("R2", at(10, 0), at(11, 0))).await.unwrap();
}

#[tokio::test]
async fn cancel_unknown_reservation() {
    let engine = test_engine();
    let id = Ulid::new();
    assert!(matches!(engine.cancel(id).await, Err(EngineError::ReservationNotFound(e)) if e == id));
}

#[tokio::test]
async fn remove_reports_whether_anything_went() {
    let engine = test_engine();
    let r = engine.reserve(booking("R4", at(13, 0), at(14, 0))).await.unwrap();
    assert!(engine.remove(r.id).await);
    assert!(!engine.remove(r.id).await);
    assert_eq!(engine.ledger.reservation_count(), 0);
}

// ── Recommendation ───────────────────────────────────────

#[tokio::test]
async fn recommend_tie_breaks_by_room_id() {
    let rooms = vec![
        Room::new("R4", "Delta", 8, [Equipment::Projector, Equipment::Whiteboard]),
        Room::new("R1", "Alpha", 4, [Equipment::Whiteboard]),
    ];
    let engine = Engine::new(rooms, CalendarQueue::disabled()).unwrap();
    let out = engine.recommend(&rec(60, 6, &[Equipment::Whiteboard], at(10, 0))).await.unwrap();
    assert_eq!(ids(&out), ["R1", "R4"]);
    assert_eq!(out[0].score, 2);
    assert_eq!(out[1].score, 2);
}

#[tokio::test]
async fn recommend_skips_booked_rooms() {
    let engine = test_engine();
    let wanted = [Equipment::Projector, Equipment::VideoConferencing];

    let before = engine.recommend(&rec(60, 12, &wanted, at(14, 0))).await.unwrap();
    assert_eq!(ids(&before), ["R6", "R7", "R10"]);

    engine.reserve(booking("R6", at(14, 30), at(15, 30))).await.unwrap();
    let after = engine.recommend(&rec(60, 12, &wanted, at(14, 0))).await.unwrap();
    assert_eq!(ids(&after), ["R7", "R10"]);

    // Outside the booked interval R6 is back.
    let later = engine.recommend(&rec(30, 12, &wanted, at(15, 30))).await.unwrap();
    assert_eq!(ids(&later), ["R6", "R7", "R10"]);
}

#[tokio::test]
async fn recommend_with_no_equipment_ranks_every_free_room() {
    let engine = test_engine();
    let out = engine.recommend(&rec(30, 6, &[], at(9, 0))).await.unwrap();
    assert_eq!(out.len(), 10);
    assert!(out.windows(2).all(|w| (w[0].score, &w[0].room.id) <= (w[1].score, &w[1].room.id)));
    assert_eq!(ids(&out)[..2], ["R2", "R3"]);
}

#[tokio::test]
async fn recommend_does_not_mutate() {
    let engine = test_engine();
    engine.reserve(booking("R9", at(10, 0), at(11, 0))).await.unwrap();
    let request = rec(60, 18, &[Equipment::VideoConferencing], at(10, 0));
    let first = engine.recommend(&request).await.unwrap();
    let second = engine.recommend(&request).await.unwrap();
    assert_eq!(ids(&first), ids(&second));
    assert_eq!(engine.ledger.reservation_count(), 1);
}

#[tokio::test]
async fn recommend_validates_request() {
    let engine = test_engine();
    assert!(matches!(
        engine.recommend(&rec(20, 4, &[], at(10, 0))).await,
        Err(EngineError::Invalid(SlotError::DurationOutOfRange(20)))
    ));
    assert!(matches!(
        engine.recommend(&rec(135, 4, &[], at(10, 0))).await,
        Err(EngineError::Invalid(SlotError::DurationOutOfRange(135)))
    ));
    assert!(matches!(
        engine.recommend(&rec(60, 0, &[], at(10, 0))).await,
        Err(EngineError::InvalidField("attendees"))
    ));
    assert!(matches!(
        engine.recommend(&rec(60, 4, &[], 0)).await,
        Err(EngineError::Invalid(SlotError::OutOfRange(0)))
    ));
}

// ── Snapshots and listings ───────────────────────────────

#[tokio::test]
async fn list_reservations_ordered_by_start_then_room() {
    let engine = test_engine();
    let c = engine.reserve(booking("R3", at(11, 0), at(12, 0))).await.unwrap();
    let b = engine.reserve(booking("R2", at(10, 0), at(11, 0))).await.unwrap();
    let a = engine.reserve(booking("R1", at(10, 0), at(11, 0))).await.unwrap();

    let listed: Vec<_> = engine.list_reservations().await.into_iter().map(|r| r.id).collect();
    assert_eq!(listed, vec![a.id, b.id, c.id]);
}

#[tokio::test]
async fn snapshot_pairs_rooms_with_their_reservations() {
    let engine = test_engine();
    engine.reserve(booking("R8", at(9, 0), at(10, 0))).await.unwrap();
    engine.reserve(booking("R8", at(10, 0), at(11, 0))).await.unwrap();

    let (rooms, reservations) = engine.snapshot().await;
    assert_eq!(rooms.len(), 10);
    assert_eq!(reservations.len(), 2);
    assert!(reservations.iter().all(|r| r.room_id.as_str() == "R8"));
    assert!(reservations[0].span.start < reservations[1].span.start);
}

#[tokio::test]
async fn list_reservations_for_unknown_room() {
    let engine = test_engine();
    assert!(matches!(
        engine.list_reservations_for_room(&RoomId::from("R0")).await,
        Err(EngineError::RoomNotFound(_))
    ));
}

// ── Calendar side channel ────────────────────────────────

#[tokio::test]
async fn calendar_failure_does_not_roll_back() {
    let client = Arc::new(RecordingCalendar::failing());
    let (queue, handle) = CalendarQueue::spawn(client.clone(), 8);
    let engine = Engine::new(default_rooms(), queue).unwrap();

    let r = engine.reserve(booking("R1", at(9, 0), at(10, 0))).await.unwrap();
    drop(engine);
    handle.await.unwrap();

    assert_eq!(client.calls(), vec!["create:Sync"]);
    // The booking was committed before the calendar was even called.
    assert_eq!(r.room_id.as_str(), "R1");
}

#[tokio::test]
async fn calendar_mirrors_create_and_cancel() {
    let client = Arc::new(RecordingCalendar::default());
    let (queue, handle) = CalendarQueue::spawn(client.clone(), 8);
    let engine = Engine::new(default_rooms(), queue).unwrap();

    let r = engine.reserve(booking("R1", at(9, 0), at(10, 0))).await.unwrap();
    engine.cancel(r.id).await.unwrap();
    drop(engine);
    handle.await.unwrap();

    assert_eq!(client.calls(), vec!["create:Sync", "delete:evt0"]);
}

#[tokio::test]
async fn rejected_booking_is_not_mirrored() {
    let client = Arc::new(RecordingCalendar::default());
    let (queue, handle) = CalendarQueue::spawn(client.clone(), 8);
    let engine = Engine::new(default_rooms(), queue).unwrap();

    engine.reserve(booking("R1", at(9, 0), at(10, 0))).await.unwrap();
    engine.reserve(booking("R1", at(9, 30), at(10, 30))).await.unwrap_err();
    drop(engine);
    handle.await.unwrap();

    assert_eq!(client.calls().len(), 1);
}
