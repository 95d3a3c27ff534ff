use ulid::Ulid;

use crate::model::*;
use crate::slot::SlotError;

use super::conflict::validate_request;
use super::recommend::recommend;
use super::{Engine, EngineError};

impl Engine {
    /// Whether `room_id` has no reservation overlapping `[start, end)`.
    pub async fn is_available(&self, room_id: &RoomId, start: Ms, end: Ms) -> Result<bool, EngineError> {
        let span = Span::checked(start, end).ok_or(SlotError::EndNotAfterStart)?;
        let rs = self
            .get_room(room_id)
            .ok_or_else(|| EngineError::RoomNotFound(room_id.clone()))?;
        let guard = rs.read().await;
        Ok(guard.is_free(&span))
    }

    /// Ranked rooms for `request` against a consistent snapshot of the ledger.
    pub async fn recommend(&self, request: &RecommendRequest) -> Result<Vec<Candidate>, EngineError> {
        validate_request(request)?;
        let (rooms, reservations) = self.snapshot().await;
        Ok(recommend(request, &rooms, &reservations))
    }

    /// Every room and every reservation as of one instant.
    ///
    /// Read locks are taken in room-id order and all held until the copy is
    /// done. Writers only ever hold a single room lock, so this cannot
    /// deadlock.
    pub async fn snapshot(&self) -> (Vec<Room>, Vec<Reservation>) {
        let mut guards = Vec::new();
        for id in self.ledger.room_ids() {
            if let Some(rs) = self.get_room(&id) {
                guards.push(rs.read_owned().await);
            }
        }
        let rooms = guards.iter().map(|g| g.room.clone()).collect();
        let mut reservations: Vec<Reservation> = guards
            .iter()
            .flat_map(|g| g.reservations.iter().cloned())
            .collect();
        sort_reservations(&mut reservations);
        (rooms, reservations)
    }

    /// Rooms in id order.
    pub async fn list_rooms(&self) -> Vec<Room> {
        let mut rooms = Vec::with_capacity(self.ledger.room_count());
        for id in self.ledger.room_ids() {
            if let Some(rs) = self.get_room(&id) {
                rooms.push(rs.read().await.room.clone());
            }
        }
        rooms
    }

    /// All reservations ordered by (start, room, id).
    pub async fn list_reservations(&self) -> Vec<Reservation> {
        self.snapshot().await.1
    }

    pub async fn list_reservations_for_room(&self, room_id: &RoomId) -> Result<Vec<Reservation>, EngineError> {
        let rs = self
            .get_room(room_id)
            .ok_or_else(|| EngineError::RoomNotFound(room_id.clone()))?;
        let guard = rs.read().await;
        Ok(guard.reservations.clone())
    }

    pub async fn get_reservation(&self, id: Ulid) -> Option<Reservation> {
        let room_id = self.ledger.room_for_reservation(&id)?;
        let rs = self.get_room(&room_id)?;
        let guard = rs.read().await;
        guard.find(id).cloned()
    }
}

fn sort_reservations(reservations: &mut [Reservation]) {
    reservations.sort_by(|a, b| {
        a.span
            .start
            .cmp(&b.span.start)
            .then_with(|| a.room_id.cmp(&b.room_id))
            .then_with(|| a.id.cmp(&b.id))
    });
}
