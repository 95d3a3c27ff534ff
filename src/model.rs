use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use ulid::Ulid;

/// Unix milliseconds, UTC.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// `None` unless `start < end`.
    pub fn checked(start: Ms, end: Ms) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        crate::slot::overlaps(self.start, self.end, other.start, other.end)
    }
}

// ── Inventory ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Capabilities a room can offer. Declaration order is the canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Equipment {
    Projector,
    #[serde(alias = "tvconf")]
    VideoConferencing,
    Whiteboard,
}

impl Equipment {
    pub fn as_str(self) -> &'static str {
        match self {
            Equipment::Projector => "projector",
            Equipment::VideoConferencing => "video-conferencing",
            Equipment::Whiteboard => "whiteboard",
        }
    }
}

impl fmt::Display for Equipment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Equipment {
    type Err = UnknownEquipment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "projector" => Ok(Equipment::Projector),
            "video-conferencing" | "videoconferencing" | "tvconf" => Ok(Equipment::VideoConferencing),
            "whiteboard" => Ok(Equipment::Whiteboard),
            _ => Err(UnknownEquipment(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEquipment(pub String);

impl fmt::Display for UnknownEquipment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown equipment: {}", self.0)
    }
}

impl std::error::Error for UnknownEquipment {}

/// Unordered set of equipment tags; iterates in canonical order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct EquipmentSet(BTreeSet<Equipment>);

impl EquipmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: Equipment) -> bool {
        self.0.insert(tag)
    }

    pub fn contains(&self, tag: Equipment) -> bool {
        self.0.contains(&tag)
    }

    /// Subset test: every tag in `required` is present in `self`.
    pub fn contains_all(&self, required: &EquipmentSet) -> bool {
        required.0.is_subset(&self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Equipment> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Equipment> for EquipmentSet {
    fn from_iter<I: IntoIterator<Item = Equipment>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for EquipmentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, tag) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(tag.as_str())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub capacity: u32,
    #[serde(default)]
    pub equipment: EquipmentSet,
}

impl Room {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        capacity: u32,
        equipment: impl IntoIterator<Item = Equipment>,
    ) -> Self {
        Self {
            id: RoomId::new(id),
            name: name.into(),
            capacity,
            equipment: equipment.into_iter().collect(),
        }
    }
}

// ── Reservations ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub id: Ulid,
    pub room_id: RoomId,
    pub title: String,
    pub span: Span,
    pub attendees: u32,
    pub purpose: Option<String>,
    pub created_by: String,
}

/// A booking request before the ledger has assigned it an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub room_id: RoomId,
    pub title: String,
    pub start: Ms,
    pub end: Ms,
    pub attendees: u32,
    pub purpose: Option<String>,
    pub created_by: Option<String>,
}

pub const DEFAULT_CREATOR: &str = "anonymous";

impl NewReservation {
    pub fn into_reservation(self, id: Ulid, span: Span) -> Reservation {
        Reservation {
            id,
            room_id: self.room_id,
            title: self.title,
            span,
            attendees: self.attendees,
            purpose: self.purpose,
            created_by: self.created_by.unwrap_or_else(|| DEFAULT_CREATOR.to_string()),
        }
    }
}

/// One room plus its reservations, the unit of locking.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub room: Room,
    /// Sorted by `span.start`; pairwise non-overlapping.
    pub reservations: Vec<Reservation>,
}

impl RoomState {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            reservations: Vec::new(),
        }
    }

    /// Insert maintaining sort order by span.start.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.span.start, |r| r.span.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove_reservation(&mut self, id: Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    pub fn find(&self, id: Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    /// Reservations whose span overlaps the query window.
    ///
    /// Non-overlapping reservations sorted by start are also sorted by end,
    /// so both bounds come from binary search.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.span.start < query.end);
        let left_bound = self.reservations[..right_bound].partition_point(|r| r.span.end <= query.start);
        self.reservations[left_bound..right_bound]
            .iter()
            .filter(move |r| r.span.overlaps(query))
    }

    pub fn is_free(&self, query: &Span) -> bool {
        self.overlapping(query).next().is_none()
    }
}

/// Committed ledger mutations, in the order they were applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    ReservationCreated(Reservation),
    ReservationCancelled(Reservation),
}

impl LedgerEvent {
    pub fn reservation(&self) -> &Reservation {
        match self {
            LedgerEvent::ReservationCreated(r) | LedgerEvent::ReservationCancelled(r) => r,
        }
    }
}

// ── Recommendation ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecommendRequest {
    pub duration_minutes: i64,
    pub attendees: u32,
    pub required_equipment: EquipmentSet,
    pub start_from: Ms,
}

/// A room and its fit for one request; lower score is better.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub room: Room,
    pub score: u32,
}
