use std::net::SocketAddr;

// ── Booking traffic ─────────────────────────────────────────────

/// Counter: bookings created.
pub const BOOKINGS_CREATED_TOTAL: &str = "courtside_bookings_created_total";

/// Counter: bookings rejected because the slot overlapped an active booking.
pub const BOOKING_CONFLICTS_TOTAL: &str = "courtside_booking_conflicts_total";

/// Counter: bookings cancelled by their owner or an admin.
pub const BOOKINGS_CANCELLED_TOTAL: &str = "courtside_bookings_cancelled_total";

/// Counter: bookings moved to completed by the sweeper.
pub const BOOKINGS_COMPLETED_TOTAL: &str = "courtside_bookings_completed_total";

/// Gauge: active bookings, sampled once per sweep.
pub const ACTIVE_BOOKINGS: &str = "courtside_active_bookings";

// ── Reminders ───────────────────────────────────────────────────

/// Counter: reminders delivered and recorded.
pub const REMINDERS_SENT_TOTAL: &str = "courtside_reminders_sent_total";

/// Counter: reminder deliveries that failed and will be retried.
pub const REMINDER_FAILURES_TOTAL: &str = "courtside_reminder_failures_total";

/// Histogram: duration of one sweep in seconds.
pub const SWEEP_DURATION_SECONDS: &str = "courtside_sweep_duration_seconds";

// ── WAL ─────────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "courtside_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "courtside_wal_flush_batch_size";

/// Install the Prometheus exporter on `port`. No-op if `port` is None. A failed
/// install is logged and the process runs on without metrics.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::error!("failed to install Prometheus exporter on {addr}: {e}"),
    }
}
