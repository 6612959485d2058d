use std::time::Instant;

use tokio::sync::oneshot;
use tracing::{debug, info};
use ulid::Ulid;

use crate::auth::{authorize, Caller, Operation};
use crate::limits::*;
use crate::model::*;
use crate::observability::{self, record_operation};

use super::conflict::{check_conflict, parse_start, validate_start};
use super::store::BookingStore;
use super::{Engine, EngineError, WalCommand};

impl Engine {
    /// A patient asks for a consultation. The request is stored as `Pending`
    /// and reserves nothing; conflicts are settled when an admin schedules it.
    pub async fn create_booking(
        &self,
        caller: &Caller,
        request: BookingRequest,
    ) -> Result<Booking, EngineError> {
        let started = Instant::now();
        let result = self.create_booking_inner(caller, request).await;
        record_operation(Operation::Create, &result, started);
        result
    }

    async fn create_booking_inner(
        &self,
        caller: &Caller,
        request: BookingRequest,
    ) -> Result<Booking, EngineError> {
        authorize(caller, Operation::Create)?;
        let doctor_id = request.doctor_id.ok_or(EngineError::MissingField("doctor"))?;
        let clinic_id = request.clinic_id.ok_or(EngineError::MissingField("clinic"))?;
        let start = request.start.ok_or(EngineError::MissingField("start_time"))?;
        if let Some(ref n) = request.notes
            && n.len() > MAX_NOTES_LEN
        {
            return Err(EngineError::LimitExceeded("notes too long"));
        }
        validate_start(start)?;

        let now = self.clock.now();
        if start <= now {
            return Err(EngineError::PastDate);
        }
        if !self.directory.is_affiliated(doctor_id, clinic_id) {
            return Err(EngineError::UnaffiliatedDoctor {
                doctor_id,
                clinic_id,
            });
        }

        let _gate = self.commit_gate.read().await;
        let cal = self.store.calendar_or_insert(doctor_id);
        let mut guard = cal.write().await;
        if guard.len() >= MAX_BOOKINGS_PER_DOCTOR {
            return Err(EngineError::LimitExceeded("too many bookings for doctor"));
        }

        let id = Ulid::new();
        let event = Event::BookingRequested {
            id,
            doctor_id,
            patient_id: caller.id,
            clinic_id,
            span: Span::slot(start),
            created_at: now,
            notes: request.notes,
        };
        self.persist_and_apply(&mut guard, vec![event]).await?;
        info!("booking {id} requested: doctor {doctor_id} clinic {clinic_id} at {start}");
        guard.get(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// An admin assigns (or moves) the booking's slot and confirms it.
    /// `new_start` is the caller's raw ISO 8601 text.
    pub async fn schedule_booking(
        &self,
        caller: &Caller,
        id: BookingId,
        new_start: Option<&str>,
    ) -> Result<Booking, EngineError> {
        let started = Instant::now();
        let result = self.schedule_booking_inner(caller, id, new_start).await;
        record_operation(Operation::Schedule, &result, started);
        result
    }

    async fn schedule_booking_inner(
        &self,
        caller: &Caller,
        id: BookingId,
        new_start: Option<&str>,
    ) -> Result<Booking, EngineError> {
        authorize(caller, Operation::Schedule)?;
        let text = new_start.ok_or(EngineError::MissingField("start_time"))?;
        let start = parse_start(text, &self.config.utc_offset)?;
        validate_start(start)?;
        let span = Span::slot(start);

        let _gate = self.commit_gate.read().await;
        let mut guard = self.resolve_booking_write(&id).await?;
        let (doctor_id, clinic_id, status) = match guard.get(id) {
            Some(b) => (b.doctor_id, b.clinic_id, b.status),
            None => return Err(EngineError::NotFound(id)),
        };
        if !status.is_open() {
            return Err(EngineError::InvalidState { id, status });
        }
        if let Err(e) = check_conflict(&guard, clinic_id, &span, Some(id), &self.config.utc_offset) {
            debug!("schedule {id} rejected: {e}");
            return Err(e);
        }

        let event = Event::BookingScheduled { id, doctor_id, span };
        self.persist_and_apply(&mut guard, vec![event]).await?;
        info!("booking {id} confirmed for {}", span.start);
        guard.get(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// An admin records payment for a completed consultation.
    pub async fn set_paid(&self, caller: &Caller, id: BookingId) -> Result<Booking, EngineError> {
        let started = Instant::now();
        let result = self.set_paid_inner(caller, id).await;
        record_operation(Operation::SetPaid, &result, started);
        result
    }

    async fn set_paid_inner(&self, caller: &Caller, id: BookingId) -> Result<Booking, EngineError> {
        authorize(caller, Operation::SetPaid)?;

        let _gate = self.commit_gate.read().await;
        let mut guard = self.resolve_booking_write(&id).await?;
        // Status is read under the same lock that the write below holds.
        let (doctor_id, status) = match guard.get(id) {
            Some(b) => (b.doctor_id, b.status),
            None => return Err(EngineError::NotFound(id)),
        };
        if status != BookingStatus::Completed {
            return Err(EngineError::InvalidState { id, status });
        }

        let event = Event::StatusChanged {
            id,
            doctor_id,
            status: BookingStatus::Paid,
        };
        self.persist_and_apply(&mut guard, vec![event]).await?;
        info!("booking {id} paid");
        guard.get(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// An admin cancels a booking that has not started yet.
    pub async fn delete_booking(&self, caller: &Caller, id: BookingId) -> Result<(), EngineError> {
        let started = Instant::now();
        let result = self.delete_booking_inner(caller, id).await;
        record_operation(Operation::Delete, &result, started);
        result
    }

    async fn delete_booking_inner(&self, caller: &Caller, id: BookingId) -> Result<(), EngineError> {
        authorize(caller, Operation::Delete)?;

        let _gate = self.commit_gate.read().await;
        let mut guard = self.resolve_booking_write(&id).await?;
        let now = self.clock.now();
        let (doctor_id, start, status) = match guard.get(id) {
            Some(b) => (b.doctor_id, b.start(), b.status),
            None => return Err(EngineError::NotFound(id)),
        };
        if start <= now {
            return Err(EngineError::AlreadyStarted(id));
        }
        if !status.is_open() {
            return Err(EngineError::InvalidState { id, status });
        }

        let event = Event::BookingDeleted { id, doctor_id };
        self.persist_and_apply(&mut guard, vec![event]).await?;
        info!("booking {id} cancelled");
        Ok(())
    }

    /// Bulk status update on one doctor's calendar: every booking in `from`
    /// matching `pred` moves to `to`, committed as a single WAL unit.
    pub(super) async fn bulk_update_status(
        &self,
        cal: &mut DoctorCalendar,
        from: BookingStatus,
        pred: impl Fn(&Booking) -> bool,
        to: BookingStatus,
    ) -> Result<usize, EngineError> {
        let doctor_id = cal.doctor_id;
        let events: Vec<Event> = cal
            .matching_status(from, pred)
            .into_iter()
            .map(|id| Event::StatusChanged {
                id,
                doctor_id,
                status: to,
            })
            .collect();
        let moved = events.len();
        self.persist_and_apply(cal, events).await?;
        Ok(moved)
    }

    /// Advance statuses by time: `Confirmed` bookings whose start has passed
    /// become `InProgress`, then `InProgress` bookings whose end has passed
    /// become `Completed`. Running it again with the same `now` changes nothing.
    pub async fn sweep_statuses(&self, now: Ms) -> Result<SweepReport, EngineError> {
        let sweep_start = Instant::now();
        let mut report = SweepReport::default();

        let _gate = self.commit_gate.read().await;
        for doctor_id in self.store.doctor_ids() {
            let Some(cal) = self.store.calendar(&doctor_id) else {
                continue;
            };
            let mut guard = cal.write().await;
            report.started += self
                .bulk_update_status(
                    &mut guard,
                    BookingStatus::Confirmed,
                    |b| b.start() <= now,
                    BookingStatus::InProgress,
                )
                .await?;
            report.completed += self
                .bulk_update_status(
                    &mut guard,
                    BookingStatus::InProgress,
                    |b| b.end() <= now,
                    BookingStatus::Completed,
                )
                .await?;
        }

        metrics::counter!(observability::SWEEP_TRANSITIONS_TOTAL, "to" => "in_progress")
            .increment(report.started as u64);
        metrics::counter!(observability::SWEEP_TRANSITIONS_TOTAL, "to" => "completed")
            .increment(report.completed as u64);
        metrics::histogram!(observability::SWEEP_DURATION_SECONDS)
            .record(sweep_start.elapsed().as_secs_f64());
        Ok(report)
    }

    /// Rewrite the WAL with only the events needed to recreate current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.commit_gate.write().await;

        let mut events = Vec::with_capacity(self.store.booking_count() * 2);
        for doctor_id in self.store.doctor_ids() {
            if let Some(cal) = self.store.calendar(&doctor_id) {
                let guard = cal.read().await;
                BookingStore::snapshot_events(&guard, &mut events);
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
