use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use crate::dispatch::{Dispatcher, ReminderSummary};
use crate::engine::{Engine, now_ms};
use crate::model::{MINUTE_MS, Ms};

pub const DEFAULT_REMINDER_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub completed: usize,
    pub reminded: usize,
    pub failed: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Advances time-dependent booking state: completes ended bookings and sends
/// each due reminder once. Every write goes through the ledger's
/// precondition-checked paths, so sweeping again never repeats an effect.
pub struct Sweeper {
    engine: Arc<Engine>,
    dispatcher: Arc<dyn Dispatcher>,
    reminder_window: Ms,
    /// One sweep at a time, so two passes never dispatch the same reminder.
    running: Mutex<()>,
}

impl Sweeper {
    pub fn new(engine: Arc<Engine>, dispatcher: Arc<dyn Dispatcher>, reminder_window: Duration) -> Self {
        let window_minutes = (reminder_window.as_secs() / 60) as Ms;
        Self {
            engine,
            dispatcher,
            reminder_window: window_minutes * MINUTE_MS,
            running: Mutex::new(()),
        }
    }

    pub async fn sweep(&self, now: Ms) -> SweepReport {
        let _running = self.running.lock().await;
        let started = Instant::now();
        let mut report = SweepReport::default();

        self.complete_ended(now, &mut report).await;
        self.send_reminders(now, &mut report).await;

        metrics::histogram!(crate::observability::SWEEP_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        metrics::gauge!(crate::observability::ACTIVE_BOOKINGS).set(self.engine.active_booking_count() as f64);
        if report.is_empty() {
            debug!("sweep: nothing to do");
        } else {
            info!(
                completed = report.completed,
                reminded = report.reminded,
                failed = report.failed,
                "sweep finished"
            );
        }
        report
    }

    async fn complete_ended(&self, now: Ms, report: &mut SweepReport) {
        for id in self.engine.collect_ended_bookings(now) {
            match self.engine.complete_booking(id, now).await {
                Ok(true) => {
                    report.completed += 1;
                    metrics::counter!(crate::observability::BOOKINGS_COMPLETED_TOTAL).increment(1);
                    debug!(booking = %id, "booking completed");
                }
                // Cancelled in the meantime.
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(booking = %id, "completion failed: {e}");
                }
            }
        }
    }

    async fn send_reminders(&self, now: Ms, report: &mut SweepReport) {
        for booking in self.engine.collect_reminder_candidates(now, self.reminder_window) {
            let Some(recipient) = booking.recipient.as_deref() else {
                continue;
            };
            let summary = ReminderSummary::from(&booking);
            if let Err(e) = self.dispatcher.send(recipient, &summary).await {
                report.failed += 1;
                metrics::counter!(crate::observability::REMINDER_FAILURES_TOTAL).increment(1);
                warn!(booking = %booking.id, "{e}; will retry next sweep");
                continue;
            }
            match self.engine.mark_reminder_sent(booking.id, now).await {
                Ok(true) => {
                    report.reminded += 1;
                    metrics::counter!(crate::observability::REMINDERS_SENT_TOTAL).increment(1);
                }
                Ok(false) => debug!(booking = %booking.id, "reminder sent but booking no longer active"),
                Err(e) => {
                    report.failed += 1;
                    warn!(booking = %booking.id, "reminder sent but not recorded: {e}");
                }
            }
        }
    }
}

/// Background task that sweeps on a fixed period until `shutdown` changes or its sender
/// is dropped. The first sweep runs immediately; a sweep in progress always finishes.
pub async fn run_sweeper(sweeper: Arc<Sweeper>, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                sweeper.sweep(now_ms()).await;
            }
            _ = shutdown.changed() => break,
        }
    }
    info!("sweeper stopped");
}

/// Background task that compacts the WAL once enough records have piled up.
pub async fn run_compactor(
    engine: Arc<Engine>,
    threshold: u64,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => break,
        }
        match engine.appends_since_compact().await {
            Ok(appended) if appended >= threshold => match engine.compact().await {
                Ok(records) => info!(appended, records, "WAL compacted"),
                Err(e) => error!("WAL compaction failed: {e}"),
            },
            Ok(_) => {}
            Err(e) => warn!("compactor skip: {e}"),
        }
    }
    debug!("compactor stopped");
}
