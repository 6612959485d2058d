mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod store;

pub use availability::plan_open_dates;
pub use conflict::parse_start;
pub use error::EngineError;
pub use store::{BookingStore, SharedCalendar};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, OwnedRwLockWriteGuard, RwLock};
use tracing::info;

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::directory::Directory;
use crate::model::*;
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    /// One commit unit: all events land in the same fsync.
    Append {
        events: Vec<Event>,
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

type PendingAppend = (Vec<Event>, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// Blocks for the first append, drains whatever else is already queued,
/// then flushes the whole batch with a single fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (events, response) = match cmd {
            WalCommand::Append { events, response } => (events, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(events, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { events, response }) => batch.push((events, response)),
                Ok(other) => {
                    // Appends queued before it must reach the old file first.
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
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    let events: usize = batch.iter().map(|(e, _)| e.len()).sum();
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(events as f64);
    let flush_start = std::time::Instant::now();

    let mut result = Ok(());
    'append: for (events, _) in batch.iter() {
        for event in events {
            if let Err(e) = wal.append_buffered(event) {
                result = Err(e);
                break 'append;
            }
        }
    }
    // Flush even after a failed append so stray buffered bytes do not
    // leak into the next batch; every caller in this batch sees the error.
    let flushed = wal.flush_sync();
    let result = result.and(flushed);

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::stage_compaction(wal.path(), &events)
                .and_then(|()| wal.commit_compaction());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

/// The booking engine: lifecycle transitions, conflict checks and
/// read-side projections over one WAL-backed store.
pub struct Engine {
    pub(super) store: BookingStore,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) directory: Arc<dyn Directory>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) config: EngineConfig,
    /// Held shared by every commit and exclusively by compaction, so no
    /// append can slip between the compaction snapshot and the file swap.
    pub(super) commit_gate: RwLock<()>,
}

impl Engine {
    /// Replay the WAL at `wal_path` and start the writer task.
    /// Must be called inside a tokio runtime.
    pub fn new(
        wal_path: PathBuf,
        directory: Arc<dyn Directory>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            store: BookingStore::new(),
            wal_tx,
            directory,
            clock,
            config,
            commit_gate: RwLock::new(()),
        };

        // We're the sole owner of these calendars, so try_write always succeeds.
        // Never block here: this may run inside an async context.
        for event in &events {
            let cal = engine.store.calendar_or_insert(event.doctor_id());
            let mut guard = cal
                .try_write()
                .map_err(|_| io::Error::other("replay: calendar unexpectedly locked"))?;
            engine.store.apply_event(&mut guard, event);
        }
        if !events.is_empty() {
            info!(
                "replayed {} events, {} live bookings",
                events.len(),
                engine.store.booking_count()
            );
        }
        metrics::gauge!(crate::observability::BOOKINGS_ACTIVE)
            .set(engine.store.booking_count() as f64);

        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn directory(&self) -> &dyn Directory {
        self.directory.as_ref()
    }

    pub fn store(&self) -> &BookingStore {
        &self.store
    }

    /// Write events to the WAL as one commit unit.
    pub(super) async fn wal_append(&self, events: Vec<Event>) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append then apply. Nothing is applied if the append fails.
    pub(super) async fn persist_and_apply(
        &self,
        cal: &mut DoctorCalendar,
        events: Vec<Event>,
    ) -> Result<(), EngineError> {
        if events.is_empty() {
            return Ok(());
        }
        self.wal_append(events.clone()).await?;
        for event in &events {
            self.store.apply_event(cal, event);
        }
        metrics::gauge!(crate::observability::BOOKINGS_ACTIVE)
            .set(self.store.booking_count() as f64);
        Ok(())
    }

    /// Lookup booking → doctor, acquire that doctor's write lock, and confirm
    /// the booking is still there once the lock is held.
    pub(super) async fn resolve_booking_write(
        &self,
        id: &BookingId,
    ) -> Result<OwnedRwLockWriteGuard<DoctorCalendar>, EngineError> {
        let doctor_id = self
            .store
            .doctor_for_booking(id)
            .ok_or(EngineError::NotFound(*id))?;
        let cal = self
            .store
            .calendar(&doctor_id)
            .ok_or(EngineError::NotFound(*id))?;
        let guard = cal.write_owned().await;
        if guard.get(*id).is_none() {
            return Err(EngineError::NotFound(*id));
        }
        Ok(guard)
    }
}
