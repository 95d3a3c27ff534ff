use crate::limits::*;
use crate::model::*;
use crate::slot::{validate_booking_span, validate_duration_minutes, validate_instant_range};

use super::EngineError;

/// Field checks for a booking; returns the validated span.
pub(crate) fn validate_new_reservation(new: &NewReservation) -> Result<Span, EngineError> {
    if new.title.trim().is_empty() {
        return Err(EngineError::InvalidField("title"));
    }
    if new.title.len() > MAX_TITLE_LEN {
        return Err(EngineError::LimitExceeded("title too long"));
    }
    if let Some(ref p) = new.purpose
        && p.len() > MAX_PURPOSE_LEN
    {
        return Err(EngineError::LimitExceeded("purpose too long"));
    }
    if let Some(ref c) = new.created_by
        && c.len() > MAX_CREATOR_LEN
    {
        return Err(EngineError::LimitExceeded("created_by too long"));
    }
    validate_attendees(new.attendees)?;
    Ok(validate_booking_span(new.start, new.end)?)
}

pub(crate) fn validate_request(request: &RecommendRequest) -> Result<(), EngineError> {
    validate_duration_minutes(request.duration_minutes)?;
    validate_instant_range(request.start_from)?;
    validate_attendees(request.attendees)
}

fn validate_attendees(attendees: u32) -> Result<(), EngineError> {
    if attendees == 0 {
        return Err(EngineError::InvalidField("attendees"));
    }
    if attendees > MAX_ATTENDEES {
        return Err(EngineError::LimitExceeded("too many attendees"));
    }
    Ok(())
}

pub(crate) fn validate_room(room: &Room) -> Result<(), EngineError> {
    if room.id.as_str().is_empty() {
        return Err(EngineError::InvalidField("room id"));
    }
    if room.capacity == 0 {
        return Err(EngineError::InvalidField("capacity"));
    }
    if room.name.len() > MAX_ROOM_NAME_LEN {
        return Err(EngineError::LimitExceeded("room name too long"));
    }
    Ok(())
}

/// Fails with the first reservation in `rs` that overlaps `span`.
pub(crate) fn check_no_conflict(rs: &RoomState, span: &Span) -> Result<(), EngineError> {
    match rs.overlapping(span).next() {
        Some(existing) => Err(EngineError::Conflict(existing.id)),
        None => Ok(()),
    }
}
