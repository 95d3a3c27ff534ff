//! Best-effort mirroring of the ledger into an external calendar.
//!
//! The engine pushes committed [`LedgerEvent`]s onto a bounded queue and never
//! waits for the calendar. A background task drains the queue and calls the
//! [`CalendarClient`]. Failures are logged and counted, never reported back:
//! a booking that committed stays committed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use ulid::Ulid;

use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEventInput {
    pub subject: String,
    pub start: Ms,
    pub end: Ms,
    pub attendee_emails: Vec<String>,
    pub body: Option<String>,
}

impl From<&Reservation> for CalendarEventInput {
    fn from(r: &Reservation) -> Self {
        Self {
            subject: r.title.clone(),
            start: r.span.start,
            end: r.span.end,
            attendee_emails: Vec::new(),
            body: r.purpose.clone(),
        }
    }
}

#[derive(Debug)]
pub enum CalendarError {
    Rejected(String),
    Unavailable(String),
}

impl std::fmt::Display for CalendarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalendarError::Rejected(msg) => write!(f, "calendar rejected request: {msg}"),
            CalendarError::Unavailable(msg) => write!(f, "calendar unavailable: {msg}"),
        }
    }
}

impl std::error::Error for CalendarError {}

#[async_trait]
pub trait CalendarClient: Send + Sync {
    /// Returns the calendar's id for the new event.
    async fn create_event(&self, input: &CalendarEventInput) -> Result<String, CalendarError>;
    async fn delete_event(&self, event_id: &str) -> Result<(), CalendarError>;
}

/// Accepts everything and talks to nobody.
#[derive(Debug, Default)]
pub struct NoopCalendarClient;

#[async_trait]
impl CalendarClient for NoopCalendarClient {
    async fn create_event(&self, _input: &CalendarEventInput) -> Result<String, CalendarError> {
        Ok(format!("noop_{}", Ulid::new()))
    }

    async fn delete_event(&self, _event_id: &str) -> Result<(), CalendarError> {
        Ok(())
    }
}

/// Sending half of the side channel. Cheap to clone.
#[derive(Clone, Default)]
pub struct CalendarQueue {
    tx: Option<mpsc::Sender<LedgerEvent>>,
}

impl CalendarQueue {
    /// A queue that drops everything, for engines without a calendar.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Spawn the sync task. It exits once every clone of the queue is dropped.
    pub fn spawn(client: Arc<dyn CalendarClient>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(calendar_sync_loop(client, rx));
        (Self { tx: Some(tx) }, handle)
    }

    /// Never blocks. A full queue drops the event.
    pub fn enqueue(&self, event: LedgerEvent) {
        let Some(tx) = &self.tx else { return };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(
                    "calendar queue full, dropping sync for reservation {}",
                    event.reservation().id
                );
                metrics::counter!(crate::observability::CALENDAR_QUEUE_DROPPED_TOTAL).increment(1);
            }
            Err(TrySendError::Closed(_)) => {
                debug!("calendar sync task gone, event not mirrored");
            }
        }
    }
}

async fn calendar_sync_loop(client: Arc<dyn CalendarClient>, mut rx: mpsc::Receiver<LedgerEvent>) {
    // reservation id → calendar event id
    let mut mirrored: HashMap<Ulid, String> = HashMap::new();

    while let Some(event) = rx.recv().await {
        match event {
            LedgerEvent::ReservationCreated(reservation) => {
                let input = CalendarEventInput::from(&reservation);
                match client.create_event(&input).await {
                    Ok(event_id) => {
                        debug!("mirrored reservation {} as calendar event {event_id}", reservation.id);
                        mirrored.insert(reservation.id, event_id);
                    }
                    Err(e) => {
                        warn!("calendar create failed for reservation {}: {e}", reservation.id);
                        metrics::counter!(crate::observability::CALENDAR_SYNC_FAILURES_TOTAL)
                            .increment(1);
                    }
                }
            }
            LedgerEvent::ReservationCancelled(reservation) => {
                let Some(event_id) = mirrored.remove(&reservation.id) else {
                    continue;
                };
                if let Err(e) = client.delete_event(&event_id).await {
                    warn!("calendar delete failed for event {event_id}: {e}");
                    metrics::counter!(crate::observability::CALENDAR_SYNC_FAILURES_TOTAL).increment(1);
                }
            }
        }
    }
    debug!("calendar sync loop stopped");
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingCalendar;
    use super::*;

    fn reservation(title: &str) -> Reservation {
        Reservation {
            id: Ulid::new(),
            room_id: RoomId::from("R1"),
            title: title.into(),
            span: Span::new(1_000, 2_000),
            attendees: 4,
            purpose: Some("planning".into()),
            created_by: "me".into(),
        }
    }

    #[tokio::test]
    async fn create_then_cancel_is_mirrored() {
        let client = Arc::new(RecordingCalendar::default());
        let (queue, handle) = CalendarQueue::spawn(client.clone(), 16);

        let r = reservation("retro");
        queue.enqueue(LedgerEvent::ReservationCreated(r.clone()));
        queue.enqueue(LedgerEvent::ReservationCancelled(r));
        drop(queue);
        handle.await.unwrap();

        assert_eq!(client.calls(), vec!["create:retro", "delete:evt0"]);
    }

    #[tokio::test]
    async fn failed_create_skips_delete() {
        let client = Arc::new(RecordingCalendar::failing());
        let (queue, handle) = CalendarQueue::spawn(client.clone(), 16);

        let r = reservation("1:1");
        queue.enqueue(LedgerEvent::ReservationCreated(r.clone()));
        queue.enqueue(LedgerEvent::ReservationCancelled(r));
        drop(queue);
        handle.await.unwrap();

        // Nothing was mirrored, so there is nothing to delete.
        assert_eq!(client.calls(), vec!["create:1:1"]);
    }

    #[tokio::test]
    async fn disabled_queue_drops_silently() {
        let queue = CalendarQueue::disabled();
        queue.enqueue(LedgerEvent::ReservationCreated(reservation("x")));
    }

    #[test]
    fn event_input_from_reservation() {
        let r = reservation("design review");
        let input = CalendarEventInput::from(&r);
        assert_eq!(input.subject, "design review");
        assert_eq!(input.start, 1_000);
        assert_eq!(input.end, 2_000);
        assert_eq!(input.body.as_deref(), Some("planning"));
        assert!(input.attendee_emails.is_empty());
    }

    #[tokio::test]
    async fn noop_client_returns_ids() {
        let client = NoopCalendarClient;
        let id = client
            .create_event(&CalendarEventInput::from(&reservation("x")))
            .await
            .unwrap();
        assert!(id.starts_with("noop_"));
        client.delete_event(&id).await.unwrap();
    }
}
