mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod registry;
mod store;

pub use availability::{merge_overlapping, subtract_intervals};
pub use conflict::now_ms;
pub use error::EngineError;
pub use registry::CourtRegistry;
pub use store::LedgerStore;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{error, info, warn};

use crate::model::*;
use crate::wal::Wal;
use conflict::check_no_conflict;

pub type SharedDaySheet = Arc<RwLock<DaySheet>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush the batch before any non-append command sees the file.
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(wal: &mut Wal, batch: &mut [(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    let result = match append_err {
        Some(e) => Err(e),
        None => wal.flush_sync(),
    };
    // Callers of a failed batch are told nothing was stored, so none of it may
    // survive in the file to be replayed later.
    if result.is_err()
        && let Err(e) = wal.discard_uncommitted()
    {
        error!("failed to discard uncommitted WAL records: {e}");
    }
    result
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let _ = response.send(wal.rewrite(&events));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        // Appends never reach here: the writer loop batches them.
        WalCommand::Append { response, .. } => {
            let _ = response.send(Err(io::Error::other("append routed outside batch")));
        }
    }
}

/// The reservation ledger: court registry, booking records, per-`(court, day)` sheets,
/// and the WAL that makes them durable.
pub struct Engine {
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) registry: CourtRegistry,
    pub(super) store: LedgerStore,
    /// Every append + apply holds this shared; compaction holds it exclusively so no
    /// record can land between the snapshot and the file swap.
    pub(super) compaction_gate: RwLock<()>,
}

impl Engine {
    /// Replay the WAL at `wal_path` and start its writer task. Must run inside a tokio runtime.
    pub fn open(wal_path: PathBuf) -> io::Result<Self> {
        let (wal, events) = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            wal_tx,
            registry: CourtRegistry::new(),
            store: LedgerStore::new(),
            compaction_gate: RwLock::new(()),
        };

        // We're the sole owner of every sheet during replay, so try_write always
        // succeeds. Never block here: this may run inside an async context.
        for event in &events {
            engine.replay_event(event);
        }
        info!(
            events = events.len(),
            courts = engine.registry.len(),
            bookings = engine.store.booking_count(),
            "ledger replayed from {}",
            wal_path.display()
        );

        Ok(engine)
    }

    fn replay_event(&self, event: &Event) {
        match self.store.event_sheet_key(event) {
            Some(key) => {
                let sheet = self.store.sheet(key);
                if let Ok(mut guard) = sheet.try_write() {
                    if let Event::BookingCreated { booking } = event
                        && booking.is_active()
                        && let Err(e) = check_no_conflict(&guard, &booking.slot.span())
                    {
                        warn!(booking = %booking.id, "skipping replayed booking: {e}");
                        return;
                    }
                    self.store.apply_event(&mut guard, event);
                }
            }
            None => self.registry.apply_event(event),
        }
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append then apply to the sheet the caller holds. Nothing is applied if the
    /// append fails.
    pub(super) async fn persist_and_apply(
        &self,
        sheet: &mut DaySheet,
        event: &Event,
    ) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.read().await;
        self.wal_append(event).await?;
        self.store.apply_event(sheet, event);
        Ok(())
    }

    pub(super) async fn persist_court_event(&self, event: &Event) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.read().await;
        self.wal_append(event).await?;
        self.registry.apply_event(event);
        Ok(())
    }

    /// Number of records appended since the last compaction.
    pub async fn appends_since_compact(&self) -> Result<u64, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))
    }

    /// Minimal event list that recreates the current state.
    fn snapshot_events(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self
            .registry
            .list()
            .into_iter()
            .map(|c| Event::CourtProvisioned {
                id: c.id,
                number: c.number,
                name: c.name,
                location: c.location,
                active: c.active,
            })
            .collect();
        let mut bookings = self.store.all_bookings();
        bookings.sort_by_key(|b| b.id);
        events.extend(bookings.into_iter().map(|booking| Event::BookingCreated { booking }));
        events
    }

    /// Rewrite the WAL as a snapshot of the current state.
    pub async fn compact(&self) -> Result<usize, EngineError> {
        let _gate = self.compaction_gate.write().await;
        let events = self.snapshot_events();
        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        Ok(count)
    }
}
