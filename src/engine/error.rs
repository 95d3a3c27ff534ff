use ulid::Ulid;

use crate::model::RoomId;
use crate::slot::SlotError;

#[derive(Debug)]
pub enum EngineError {
    RoomNotFound(RoomId),
    ReservationNotFound(Ulid),
    /// Overlaps the existing reservation with this id.
    Conflict(Ulid),
    Invalid(SlotError),
    InvalidField(&'static str),
    DuplicateRoom(RoomId),
    LimitExceeded(&'static str),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::RoomNotFound(id) => write!(f, "room not found: {id}"),
            EngineError::ReservationNotFound(id) => write!(f, "reservation not found: {id}"),
            EngineError::Conflict(id) => {
                write!(f, "time slot is not available: overlaps reservation {id}")
            }
            EngineError::Invalid(e) => write!(f, "invalid request: {e}"),
            EngineError::InvalidField(field) => write!(f, "invalid value for {field}"),
            EngineError::DuplicateRoom(id) => write!(f, "duplicate room id: {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Invalid(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SlotError> for EngineError {
    fn from(e: SlotError) -> Self {
        EngineError::Invalid(e)
    }
}
