use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap};

use crate::directory::{ClinicInfo, DoctorInfo};
use crate::limits::*;
use crate::model::*;

use super::conflict::{check_conflict, validate_start};
use super::{Engine, EngineError};

/// Heap entry ranked by `(start, id)`; the heap's top is the latest candidate.
struct Ranked(Booking);

impl Ranked {
    fn key(&self) -> (Ms, BookingId) {
        (self.0.start(), self.0.id)
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

fn require_specialization(specialization: &str) -> Result<&str, EngineError> {
    let s = specialization.trim();
    if s.is_empty() {
        return Err(EngineError::MissingField("specialization"));
    }
    if s.len() > MAX_SPECIALIZATION_LEN {
        return Err(EngineError::LimitExceeded("specialization too long"));
    }
    Ok(s)
}

impl Engine {
    pub async fn get_booking(&self, id: BookingId) -> Result<Booking, EngineError> {
        let doctor_id = self
            .store
            .doctor_for_booking(&id)
            .ok_or(EngineError::NotFound(id))?;
        let cal = self
            .store
            .calendar(&doctor_id)
            .ok_or(EngineError::NotFound(id))?;
        let guard = cal.read().await;
        guard.get(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Bookings matching `filter`, ordered by start time then id.
    pub async fn list_bookings(&self, filter: &BookingFilter) -> Vec<Booking> {
        self.list_bookings_capped(filter, MAX_LIST_RESULTS).await
    }

    /// The first `cap` matches in `(start, id)` order. Never holds more than
    /// `cap` clones at once.
    pub(super) async fn list_bookings_capped(
        &self,
        filter: &BookingFilter,
        cap: usize,
    ) -> Vec<Booking> {
        if cap == 0 {
            return Vec::new();
        }
        let doctors = match filter.doctor_id {
            Some(d) => vec![d],
            None => self.store.doctor_ids(),
        };
        let mut kept: BinaryHeap<Ranked> = BinaryHeap::with_capacity(cap);
        for doctor_id in doctors {
            let Some(cal) = self.store.calendar(&doctor_id) else {
                continue;
            };
            let guard = cal.read().await;
            for b in guard.bookings.iter().filter(|b| filter.matches(b)) {
                if kept.len() >= cap {
                    let Some(latest) = kept.peek() else { break };
                    let (latest_start, latest_id) = latest.key();
                    if b.start() > latest_start {
                        // Calendar is sorted by start: nothing later can rank.
                        break;
                    }
                    if (b.start(), b.id) >= (latest_start, latest_id) {
                        continue;
                    }
                    kept.pop();
                }
                kept.push(Ranked(b.clone()));
            }
        }
        kept.into_sorted_vec().into_iter().map(|r| r.0).collect()
    }

    /// Would `[start, start + 1h)` at `clinic_id` collide with the doctor's
    /// slot-holding bookings? `exclude` skips a booking being moved.
    pub async fn check_conflict(
        &self,
        doctor_id: DoctorId,
        clinic_id: ClinicId,
        start: Ms,
        exclude: Option<BookingId>,
    ) -> Result<(), EngineError> {
        validate_start(start)?;
        let Some(cal) = self.store.calendar(&doctor_id) else {
            return Ok(());
        };
        let guard = cal.read().await;
        check_conflict(&guard, clinic_id, &Span::slot(start), exclude, &self.config.utc_offset)
    }

    // ── Directory projections ────────────────────────────────

    pub fn specializations_in_use(&self) -> BTreeSet<String> {
        self.directory.specializations_in_use()
    }

    pub fn clinics_for(&self, specialization: &str) -> Result<Vec<ClinicInfo>, EngineError> {
        let s = require_specialization(specialization)?;
        Ok(self.directory.clinics_for(s))
    }

    pub fn doctors_at(
        &self,
        clinic_id: ClinicId,
        specialization: &str,
    ) -> Result<Vec<DoctorInfo>, EngineError> {
        let s = require_specialization(specialization)?;
        Ok(self.directory.doctors_at(clinic_id, s))
    }
}
