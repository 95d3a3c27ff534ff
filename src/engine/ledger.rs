use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

/// The authoritative set of rooms and their reservations.
///
/// Mutating methods take the room's state by `&mut`, i.e. the caller already
/// holds that room's write lock. None of them check for overlaps: that check
/// belongs to whoever took the lock.
pub struct Ledger {
    rooms: DashMap<RoomId, SharedRoomState>,
    reservation_to_room: DashMap<Ulid, RoomId>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            reservation_to_room: DashMap::new(),
        }
    }

    // ── Rooms ────────────────────────────────────────────────

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn contains_room(&self, id: &RoomId) -> bool {
        self.rooms.contains_key(id)
    }

    pub fn get_room(&self, id: &RoomId) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn insert_room(&self, room: Room) {
        let id = room.id.clone();
        self.rooms.insert(id, Arc::new(RwLock::new(RoomState::new(room))));
    }

    /// Room ids in ascending order, which is also the lock order for
    /// multi-room reads.
    pub fn room_ids(&self) -> Vec<RoomId> {
        let mut ids: Vec<RoomId> = self.rooms.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    // ── Reservation index ────────────────────────────────────

    pub fn room_for_reservation(&self, id: &Ulid) -> Option<RoomId> {
        self.reservation_to_room.get(id).map(|e| e.value().clone())
    }

    pub fn reservation_count(&self) -> usize {
        self.reservation_to_room.len()
    }

    // ── Mutation ─────────────────────────────────────────────

    pub fn add(&self, rs: &mut RoomState, reservation: Reservation) {
        self.reservation_to_room
            .insert(reservation.id, reservation.room_id.clone());
        rs.insert_reservation(reservation);
    }

    pub fn remove(&self, rs: &mut RoomState, id: Ulid) -> Option<Reservation> {
        let removed = rs.remove_reservation(id)?;
        self.reservation_to_room.remove(&id);
        Some(removed)
    }

    pub fn apply(&self, rs: &mut RoomState, event: &LedgerEvent) {
        match event {
            LedgerEvent::ReservationCreated(reservation) => self.add(rs, reservation.clone()),
            LedgerEvent::ReservationCancelled(reservation) => {
                self.remove(rs, reservation.id);
            }
        }
    }
}
