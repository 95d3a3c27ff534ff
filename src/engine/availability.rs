use crate::model::*;

/// Whether `room_id` is free for the whole of `span`, given every reservation
/// in the ledger. Reservations for other rooms are ignored; a room with no
/// reservations is vacuously available.
///
/// Linear in the number of reservations. Under a room lock the engine asks
/// the same question of [`RoomState::is_free`], which binary-searches the
/// room's start-ordered list and must agree with this function.
pub fn is_available(room_id: &RoomId, span: &Span, reservations: &[Reservation]) -> bool {
    reservations
        .iter()
        .filter(|r| &r.room_id == room_id)
        .all(|r| !r.span.overlaps(span))
}
