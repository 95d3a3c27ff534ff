use crate::model::*;
use crate::slot::end_of;

use super::availability::is_available;

/// Rank the rooms that can host `request`.
///
/// A room qualifies when it carries every required equipment tag (extra
/// equipment is fine) and has no reservation overlapping
/// `[start_from, start_from + duration)`. Capacity is not a filter: it only
/// feeds the score `|capacity - attendees|`, so tight fits sort first.
/// Equal scores are ordered by room id.
pub fn recommend(request: &RecommendRequest, rooms: &[Room], reservations: &[Reservation]) -> Vec<Candidate> {
    let end = end_of(request.start_from, request.duration_minutes);
    let Some(window) = Span::checked(request.start_from, end) else {
        return Vec::new();
    };

    let mut candidates: Vec<Candidate> = rooms
        .iter()
        .filter(|room| room.equipment.contains_all(&request.required_equipment))
        .filter(|room| is_available(&room.id, &window, reservations))
        .map(|room| Candidate {
            room: room.clone(),
            score: room.capacity.abs_diff(request.attendees),
        })
        .collect();

    candidates.sort_by(|a, b| a.score.cmp(&b.score).then_with(|| a.room.id.cmp(&b.room.id)));
    candidates
}
