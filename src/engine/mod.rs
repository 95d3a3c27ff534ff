mod availability;
mod conflict;
mod error;
mod ledger;
mod mutations;
mod queries;
mod recommend;
#[cfg(test)]
mod tests;

pub use availability::is_available;
pub use error::EngineError;
pub use ledger::{Ledger, SharedRoomState};
pub use recommend::recommend;

use tracing::info;
use ulid::Ulid;

use crate::calendar::CalendarQueue;
use crate::limits::MAX_ROOMS;
use crate::model::*;

use self::conflict::validate_room;

/// Room inventory, the reservation ledger, and the booking rules around them.
///
/// Every room has its own lock. Mutations hold exactly one room's write lock
/// for the whole check-and-append; multi-room reads take read locks in room-id
/// order.
pub struct Engine {
    pub ledger: Ledger,
    calendar: CalendarQueue,
}

impl Engine {
    /// Seed the inventory. Rooms are immutable from here on.
    pub fn new(rooms: Vec<Room>, calendar: CalendarQueue) -> Result<Self, EngineError> {
        if rooms.len() > MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        let ledger = Ledger::new();
        for room in rooms {
            validate_room(&room)?;
            if ledger.contains_room(&room.id) {
                return Err(EngineError::DuplicateRoom(room.id));
            }
            ledger.insert_room(room);
        }
        info!("engine ready with {} rooms", ledger.room_count());
        Ok(Self { ledger, calendar })
    }

    pub fn get_room(&self, id: &RoomId) -> Option<SharedRoomState> {
        self.ledger.get_room(id)
    }

    /// Apply a committed event, then hand it to the calendar side channel.
    pub(super) fn commit(&self, rs: &mut RoomState, event: LedgerEvent) {
        self.ledger.apply(rs, &event);
        metrics::gauge!(crate::observability::RESERVATIONS_ACTIVE)
            .set(self.ledger.reservation_count() as f64);
        self.calendar.enqueue(event);
    }

    /// Lookup reservation → room, acquire that room's write lock.
    pub(super) async fn resolve_reservation_write(
        &self,
        id: &Ulid,
    ) -> Result<tokio::sync::OwnedRwLockWriteGuard<RoomState>, EngineError> {
        let room_id = self
            .ledger
            .room_for_reservation(id)
            .ok_or(EngineError::ReservationNotFound(*id))?;
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        Ok(rs.write_owned().await)
    }
}
