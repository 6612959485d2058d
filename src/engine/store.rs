use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::model::*;

pub type SharedCalendar = Arc<RwLock<DoctorCalendar>>;

/// Per-doctor calendars plus a booking → doctor index.
///
/// The calendar lock is the isolation boundary: whoever holds a doctor's
/// write lock may check and then mutate that doctor's bookings atomically.
pub struct BookingStore {
    calendars: DashMap<DoctorId, SharedCalendar>,
    booking_to_doctor: DashMap<BookingId, DoctorId>,
}

impl Default for BookingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingStore {
    pub fn new() -> Self {
        Self {
            calendars: DashMap::new(),
            booking_to_doctor: DashMap::new(),
        }
    }

    // ── Calendars ────────────────────────────────────────────

    pub fn calendar(&self, doctor_id: &DoctorId) -> Option<SharedCalendar> {
        self.calendars.get(doctor_id).map(|e| e.value().clone())
    }

    pub fn calendar_or_insert(&self, doctor_id: DoctorId) -> SharedCalendar {
        self.calendars
            .entry(doctor_id)
            .or_insert_with(|| Arc::new(RwLock::new(DoctorCalendar::new(doctor_id))))
            .value()
            .clone()
    }

    pub fn doctor_ids(&self) -> Vec<DoctorId> {
        self.calendars.iter().map(|e| *e.key()).collect()
    }

    // ── Booking index ────────────────────────────────────────

    pub fn doctor_for_booking(&self, id: &BookingId) -> Option<DoctorId> {
        self.booking_to_doctor.get(id).map(|e| *e.value())
    }

    pub fn booking_count(&self) -> usize {
        self.booking_to_doctor.len()
    }

    // ── Event application ────────────────────────────────────

    /// Apply a committed event to the doctor's calendar (caller holds the lock).
    pub fn apply_event(&self, cal: &mut DoctorCalendar, event: &Event) {
        match event {
            Event::BookingRequested {
                id,
                doctor_id,
                patient_id,
                clinic_id,
                span,
                created_at,
                notes,
            } => {
                cal.insert(Booking {
                    id: *id,
                    doctor_id: *doctor_id,
                    patient_id: *patient_id,
                    clinic_id: *clinic_id,
                    span: *span,
                    status: BookingStatus::Pending,
                    created_at: *created_at,
                    notes: notes.clone(),
                });
                self.booking_to_doctor.insert(*id, *doctor_id);
            }
            Event::BookingScheduled { id, span, .. } => {
                if cal.move_to(*id, *span)
                    && let Some(b) = cal.get_mut(*id)
                {
                    b.status = BookingStatus::Confirmed;
                }
            }
            Event::StatusChanged { id, status, .. } => {
                if let Some(b) = cal.get_mut(*id) {
                    b.status = *status;
                }
            }
            Event::BookingDeleted { id, .. } => {
                cal.remove(*id);
                self.booking_to_doctor.remove(id);
            }
        }
    }

    /// Events that recreate `cal` from nothing.
    pub fn snapshot_events(cal: &DoctorCalendar, out: &mut Vec<Event>) {
        for b in &cal.bookings {
            out.push(Event::BookingRequested {
                id: b.id,
                doctor_id: b.doctor_id,
                patient_id: b.patient_id,
                clinic_id: b.clinic_id,
                span: b.span,
                created_at: b.created_at,
                notes: b.notes.clone(),
            });
            if b.status != BookingStatus::Pending {
                out.push(Event::StatusChanged {
                    id: b.id,
                    doctor_id: b.doctor_id,
                    status: b.status,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn requested(id: BookingId, doctor_id: DoctorId, start: Ms) -> Event {
        Event::BookingRequested {
            id,
            doctor_id,
            patient_id: Ulid::new(),
            clinic_id: Ulid::new(),
            span: Span::slot(start),
            created_at: 0,
            notes: None,
        }
    }

    #[tokio::test]
    async fn apply_full_lifecycle() {
        let store = BookingStore::new();
        let doctor = Ulid::new();
        let id = Ulid::new();
        let cal = store.calendar_or_insert(doctor);
        let mut guard = cal.write().await;

        store.apply_event(&mut guard, &requested(id, doctor, HOUR_MS));
        assert_eq!(store.doctor_for_booking(&id), Some(doctor));
        assert_eq!(guard.get(id).unwrap().status, BookingStatus::Pending);

        store.apply_event(
            &mut guard,
            &Event::BookingScheduled {
                id,
                doctor_id: doctor,
                span: Span::slot(5 * HOUR_MS),
            },
        );
        let b = guard.get(id).unwrap();
        assert_eq!(b.status, BookingStatus::Confirmed);
        assert_eq!(b.span, Span::slot(5 * HOUR_MS));

        store.apply_event(
            &mut guard,
            &Event::StatusChanged {
                id,
                doctor_id: doctor,
                status: BookingStatus::InProgress,
            },
        );
        assert_eq!(guard.get(id).unwrap().status, BookingStatus::InProgress);

        store.apply_event(&mut guard, &Event::BookingDeleted { id, doctor_id: doctor });
        assert!(guard.is_empty());
        assert_eq!(store.doctor_for_booking(&id), None);
        assert_eq!(store.booking_count(), 0);
    }

    #[tokio::test]
    async fn calendar_or_insert_is_idempotent() {
        let store = BookingStore::new();
        let doctor = Ulid::new();
        let a = store.calendar_or_insert(doctor);
        let b = store.calendar_or_insert(doctor);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.doctor_ids(), vec![doctor]);
        assert!(store.calendar(&Ulid::new()).is_none());
    }

    #[tokio::test]
    async fn snapshot_replays_to_same_state() {
        let store = BookingStore::new();
        let doctor = Ulid::new();
        let cal = store.calendar_or_insert(doctor);
        let mut guard = cal.write().await;
        let pending = Ulid::new();
        let paid = Ulid::new();
        store.apply_event(&mut guard, &requested(pending, doctor, HOUR_MS));
        store.apply_event(&mut guard, &requested(paid, doctor, 3 * HOUR_MS));
        store.apply_event(
            &mut guard,
            &Event::StatusChanged {
                id: paid,
                doctor_id: doctor,
                status: BookingStatus::Paid,
            },
        );

        let mut events = Vec::new();
        BookingStore::snapshot_events(&guard, &mut events);
        assert_eq!(events.len(), 3);

        let fresh = BookingStore::new();
        let mut rebuilt = DoctorCalendar::new(doctor);
        for e in &events {
            fresh.apply_event(&mut rebuilt, e);
        }
        assert_eq!(rebuilt.bookings, guard.bookings);
    }
}
