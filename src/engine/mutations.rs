use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::MAX_RESERVATIONS_PER_ROOM;
use crate::model::*;

use super::conflict::{check_no_conflict, validate_new_reservation};
use super::{Engine, EngineError};

impl Engine {
    /// Book a room if, and only if, the interval is free.
    ///
    /// Validation, the overlap check and the append all happen while holding
    /// the room's write lock, so two overlapping requests for the same room
    /// cannot both succeed.
    pub async fn reserve(&self, new: NewReservation) -> Result<Reservation, EngineError> {
        let span = validate_new_reservation(&new)?;
        let rs = self
            .get_room(&new.room_id)
            .ok_or_else(|| EngineError::RoomNotFound(new.room_id.clone()))?;
        let mut guard = rs.write().await;
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many reservations on room"));
        }

        if let Err(e) = check_no_conflict(&guard, &span) {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            debug!("booking on {} rejected: {e}", new.room_id);
            return Err(e);
        }

        let reservation = new.into_reservation(Ulid::new(), span);
        self.commit(&mut guard, LedgerEvent::ReservationCreated(reservation.clone()));
        info!(
            "reserved {} on room {} [{}, {})",
            reservation.id, reservation.room_id, reservation.span.start, reservation.span.end
        );
        Ok(reservation)
    }

    /// Cancel a reservation, returning what was removed.
    pub async fn cancel(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let mut guard = self.resolve_reservation_write(&id).await?;
        // A concurrent cancel may have won the race for the lock.
        let reservation = guard
            .find(id)
            .cloned()
            .ok_or(EngineError::ReservationNotFound(id))?;
        self.commit(&mut guard, LedgerEvent::ReservationCancelled(reservation.clone()));
        info!("cancelled {id} on room {}", reservation.room_id);
        Ok(reservation)
    }

    /// `true` iff a reservation with this id existed and was removed.
    pub async fn remove(&self, id: Ulid) -> bool {
        self.cancel(id).await.is_ok()
    }
}
