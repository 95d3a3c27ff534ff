use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "roomwise_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "roomwise_query_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "roomwise_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "roomwise_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "roomwise_connections_rejected_total";

// ── Ledger ──────────────────────────────────────────────────────

/// Gauge: reservations currently in the ledger.
pub const RESERVATIONS_ACTIVE: &str = "roomwise_reservations_active";

/// Counter: bookings refused because the slot was taken.
pub const BOOKING_CONFLICTS_TOTAL: &str = "roomwise_booking_conflicts_total";

// ── Calendar side channel ───────────────────────────────────────

/// Counter: calendar create/delete calls that failed.
pub const CALENDAR_SYNC_FAILURES_TOTAL: &str = "roomwise_calendar_sync_failures_total";

/// Counter: events dropped because the calendar queue was full.
pub const CALENDAR_QUEUE_DROPPED_TOTAL: &str = "roomwise_calendar_queue_dropped_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::SelectRooms => "select_rooms",
        Command::SelectReservations { .. } => "select_reservations",
        Command::SelectAvailability { .. } => "select_availability",
        Command::SelectRecommendations { .. } => "select_recommendations",
        Command::InsertReservation { .. } => "insert_reservation",
        Command::DeleteReservation { .. } => "delete_reservation",
    }
}
