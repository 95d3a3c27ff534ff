//! The 15-minute booking grid: alignment, interval arithmetic and the
//! textual form of instants.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::limits::{MAX_VALID_TIMESTAMP_MS, MIN_VALID_TIMESTAMP_MS};
use crate::model::{Ms, Span};

pub const MINUTE_MS: Ms = 60_000;
pub const SLOT_MINUTES: i64 = 15;
pub const SLOT_MS: Ms = SLOT_MINUTES * MINUTE_MS;
pub const MIN_DURATION_MINUTES: i64 = 15;
pub const MAX_DURATION_MINUTES: i64 = 120;

/// True iff `instant` sits on a quarter hour with zero seconds and millis.
///
/// Unix time has no leap seconds, so the grid is simply every multiple of
/// 15 minutes since the epoch.
pub fn is_aligned(instant: Ms) -> bool {
    instant.rem_euclid(SLOT_MS) == 0
}

/// `start + duration_minutes`. Saturates instead of overflowing.
pub fn end_of(start: Ms, duration_minutes: i64) -> Ms {
    start.saturating_add(duration_minutes.saturating_mul(MINUTE_MS))
}

/// Half-open intersection test. Back-to-back intervals do not overlap.
pub fn overlaps(a_start: Ms, a_end: Ms, b_start: Ms, b_end: Ms) -> bool {
    a_start < b_end && b_start < a_end
}

pub fn validate_duration_minutes(minutes: i64) -> Result<(), SlotError> {
    if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&minutes) || minutes % SLOT_MINUTES != 0 {
        return Err(SlotError::DurationOutOfRange(minutes));
    }
    Ok(())
}

pub fn validate_instant_range(instant: Ms) -> Result<(), SlotError> {
    if !(MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&instant) {
        return Err(SlotError::OutOfRange(instant));
    }
    Ok(())
}

/// Everything a bookable interval must satisfy before it may reach the ledger.
pub fn validate_booking_span(start: Ms, end: Ms) -> Result<Span, SlotError> {
    validate_instant_range(start)?;
    validate_instant_range(end)?;
    if !is_aligned(start) {
        return Err(SlotError::Misaligned(start));
    }
    if !is_aligned(end) {
        return Err(SlotError::Misaligned(end));
    }
    let span = Span::checked(start, end).ok_or(SlotError::EndNotAfterStart)?;
    let minutes = span.duration_ms() / MINUTE_MS;
    if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&minutes) {
        return Err(SlotError::DurationOutOfRange(minutes));
    }
    Ok(span)
}

/// Accepts RFC 3339 with any offset (normalized to UTC) or integer Unix millis.
pub fn parse_instant(text: &str) -> Result<Ms, SlotError> {
    let text = text.trim();
    if let Ok(ms) = text.parse::<i64>() {
        return Ok(ms);
    }
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
        .map_err(|e| SlotError::BadInstant(format!("{text}: {e}")))
}

/// `2025-01-06T10:00:00.000Z`
pub fn format_instant(instant: Ms) -> String {
    match DateTime::<Utc>::from_timestamp_millis(instant) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => instant.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotError {
    Misaligned(Ms),
    EndNotAfterStart,
    DurationOutOfRange(i64),
    OutOfRange(Ms),
    BadInstant(String),
}

impl std::fmt::Display for SlotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotError::Misaligned(t) => {
                write!(f, "{} is not aligned to {SLOT_MINUTES} minutes", format_instant(*t))
            }
            SlotError::EndNotAfterStart => write!(f, "end must be after start"),
            SlotError::DurationOutOfRange(m) => write!(
                f,
                "duration {m} min must be a multiple of {SLOT_MINUTES} between {MIN_DURATION_MINUTES} and {MAX_DURATION_MINUTES}"
            ),
            SlotError::OutOfRange(t) => write!(f, "timestamp out of range: {t}"),
            SlotError::BadInstant(s) => write!(f, "bad instant: {s}"),
        }
    }
}

impl std::error::Error for SlotError {}
