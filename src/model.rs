use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

pub type BookingId = Ulid;
pub type DoctorId = Ulid;
pub type PatientId = Ulid;
pub type ClinicId = Ulid;

pub const HOUR_MS: Ms = 3_600_000;
pub const DAY_MS: Ms = 24 * HOUR_MS;

/// Every booking lasts exactly this long; the end is never caller-supplied.
pub const BOOKING_DURATION_MS: Ms = HOUR_MS;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// The one-hour slot beginning at `start`.
    pub fn slot(start: Ms) -> Self {
        Self::new(start, start + BOOKING_DURATION_MS)
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Calendar date of `t` as seen from `offset`.
pub fn local_date(t: Ms, offset: &FixedOffset) -> NaiveDate {
    DateTime::from_timestamp_millis(t)
        .unwrap_or_default()
        .with_timezone(offset)
        .date_naive()
}

/// The `[00:00, 24:00)` window of `date` in `offset`, as Unix milliseconds.
pub fn day_span(date: NaiveDate, offset: &FixedOffset) -> Span {
    let midnight_utc = date.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
    let start = midnight_utc - offset.local_minus_utc() as Ms * 1000;
    Span::new(start, start + DAY_MS)
}

/// Lifecycle position of a booking. Declaration order is lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Paid,
}

impl BookingStatus {
    /// A pending request reserves nothing; every later status occupies its slot.
    pub fn holds_slot(self) -> bool {
        self != BookingStatus::Pending
    }

    /// Statuses from which an admin may still move or cancel the booking.
    pub fn is_open(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Paid => "paid",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub doctor_id: DoctorId,
    pub patient_id: PatientId,
    pub clinic_id: ClinicId,
    pub span: Span,
    pub status: BookingStatus,
    pub created_at: Ms,
    pub notes: Option<String>,
}

impl Booking {
    pub fn start(&self) -> Ms {
        self.span.start
    }

    pub fn end(&self) -> Ms {
        self.span.end
    }
}

/// All bookings of one doctor, sorted by `span.start`.
#[derive(Debug, Clone)]
pub struct DoctorCalendar {
    pub doctor_id: DoctorId,
    pub bookings: Vec<Booking>,
}

impl DoctorCalendar {
    pub fn new(doctor_id: DoctorId) -> Self {
        Self {
            doctor_id,
            bookings: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }

    /// Insert booking maintaining sort order by span.start.
    pub fn insert(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn remove(&mut self, id: BookingId) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn get(&self, id: BookingId) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn get_mut(&mut self, id: BookingId) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Move a booking to a new span, keeping the sort order.
    pub fn move_to(&mut self, id: BookingId, span: Span) -> bool {
        match self.remove(id) {
            Some(mut booking) => {
                booking.span = span;
                self.insert(booking);
                true
            }
            None => false,
        }
    }

    /// Bookings whose span overlaps `query`, other than `exclude`.
    /// Every booking is one slot long, so both ends of the scan are found by
    /// binary search: nothing starting a full slot before `query.start` can
    /// reach it, and nothing starting at or after `query.end` can either.
    pub fn overlapping(
        &self,
        query: &Span,
        exclude: Option<BookingId>,
    ) -> impl Iterator<Item = &Booking> {
        let left_bound = self
            .bookings
            .partition_point(|b| b.span.start + BOOKING_DURATION_MS <= query.start);
        let right_bound = self.bookings.partition_point(|b| b.span.start < query.end);
        self.bookings[left_bound..right_bound.max(left_bound)]
            .iter()
            .filter(move |b| b.span.end > query.start && Some(b.id) != exclude)
    }

    /// Bookings whose start falls inside `window`, other than `exclude`.
    pub fn starting_within(
        &self,
        window: Span,
        exclude: Option<BookingId>,
    ) -> impl Iterator<Item = &Booking> {
        let left = self.bookings.partition_point(|b| b.span.start < window.start);
        let right = self.bookings.partition_point(|b| b.span.start < window.end);
        self.bookings[left..right]
            .iter()
            .filter(move |b| Some(b.id) != exclude)
    }

    /// Bookings starting on the calendar `date` in `offset`, other than `exclude`.
    pub fn on_date(
        &self,
        date: NaiveDate,
        offset: &FixedOffset,
        exclude: Option<BookingId>,
    ) -> impl Iterator<Item = &Booking> + use<'_> {
        self.starting_within(day_span(date, offset), exclude)
    }

    /// Ids of bookings in `from` matching `pred`. Does not mutate; callers
    /// persist the transition before applying it.
    pub fn matching_status(
        &self,
        from: BookingStatus,
        pred: impl Fn(&Booking) -> bool,
    ) -> Vec<BookingId> {
        self.bookings
            .iter()
            .filter(|b| b.status == from && pred(b))
            .map(|b| b.id)
            .collect()
    }
}

/// WAL record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BookingRequested {
        id: BookingId,
        doctor_id: DoctorId,
        patient_id: PatientId,
        clinic_id: ClinicId,
        span: Span,
        created_at: Ms,
        notes: Option<String>,
    },
    BookingScheduled {
        id: BookingId,
        doctor_id: DoctorId,
        span: Span,
    },
    StatusChanged {
        id: BookingId,
        doctor_id: DoctorId,
        status: BookingStatus,
    },
    BookingDeleted {
        id: BookingId,
        doctor_id: DoctorId,
    },
}

impl Event {
    pub fn doctor_id(&self) -> DoctorId {
        match self {
            Event::BookingRequested { doctor_id, .. }
            | Event::BookingScheduled { doctor_id, .. }
            | Event::StatusChanged { doctor_id, .. }
            | Event::BookingDeleted { doctor_id, .. } => *doctor_id,
        }
    }
}

// ── Request / query types ────────────────────────────────────────

/// A patient's request for a consultation. Fields are optional because the
/// surrounding layer forwards whatever the caller sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingRequest {
    pub doctor_id: Option<DoctorId>,
    pub clinic_id: Option<ClinicId>,
    pub start: Option<Ms>,
    pub notes: Option<String>,
}

/// Conjunctive filter for listing bookings. `None` matches anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BookingFilter {
    pub status: Option<BookingStatus>,
    pub clinic_id: Option<ClinicId>,
    pub doctor_id: Option<DoctorId>,
    pub patient_id: Option<PatientId>,
}

impl BookingFilter {
    pub fn matches(&self, b: &Booking) -> bool {
        self.status.is_none_or(|s| s == b.status)
            && self.clinic_id.is_none_or(|c| c == b.clinic_id)
            && self.doctor_id.is_none_or(|d| d == b.doctor_id)
            && self.patient_id.is_none_or(|p| p == b.patient_id)
    }
}

/// Outcome of one status sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Confirmed → InProgress.
    pub started: usize,
    /// InProgress → Completed.
    pub completed: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.started == 0 && self.completed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking_at(start: Ms, status: BookingStatus) -> Booking {
        Booking {
            id: Ulid::new(),
            doctor_id: Ulid::nil(),
            patient_id: Ulid::nil(),
            clinic_id: Ulid::nil(),
            span: Span::slot(start),
            status,
            created_at: 0,
            notes: None,
        }
    }

    #[test]
    fn span_basics() {
        let s = Span::slot(100);
        assert_eq!(s.end - s.start, HOUR_MS);
        assert!(s.overlaps(&Span::new(100 + HOUR_MS - 1, 100 + 2 * HOUR_MS)));
        assert!(!s.overlaps(&Span::slot(100 + HOUR_MS))); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn status_order_is_lifecycle_order() {
        use BookingStatus::*;
        assert!(Pending < Confirmed);
        assert!(Confirmed < InProgress);
        assert!(InProgress < Completed);
        assert!(Completed < Paid);
        assert!(!Pending.holds_slot());
        assert!(Paid.holds_slot());
        assert!(Confirmed.is_open());
        assert!(!InProgress.is_open());
    }

    #[test]
    fn local_date_respects_offset() {
        // 2026-10-18T23:30:00Z
        let t: Ms = 1_792_366_200_000;
        let utc = FixedOffset::east_opt(0).unwrap();
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(local_date(t, &utc), NaiveDate::from_ymd_opt(2026, 10, 18).unwrap());
        assert_eq!(local_date(t, &plus_two), NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
    }

    #[test]
    fn day_span_covers_local_day() {
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let span = day_span(date, &plus_two);
        assert_eq!(span.end - span.start, DAY_MS);
        assert_eq!(local_date(span.start, &plus_two), date);
        assert_eq!(local_date(span.end - 1, &plus_two), date);
        assert_ne!(local_date(span.end, &plus_two), date);
    }

    #[test]
    fn calendar_ordering() {
        let mut cal = DoctorCalendar::new(Ulid::new());
        cal.insert(booking_at(3 * HOUR_MS, BookingStatus::Pending));
        cal.insert(booking_at(HOUR_MS, BookingStatus::Pending));
        cal.insert(booking_at(2 * HOUR_MS, BookingStatus::Pending));
        let starts: Vec<Ms> = cal.bookings.iter().map(|b| b.start()).collect();
        assert_eq!(starts, vec![HOUR_MS, 2 * HOUR_MS, 3 * HOUR_MS]);
    }

    #[test]
    fn move_to_keeps_order() {
        let mut cal = DoctorCalendar::new(Ulid::new());
        let first = booking_at(HOUR_MS, BookingStatus::Pending);
        let id = first.id;
        cal.insert(first);
        cal.insert(booking_at(2 * HOUR_MS, BookingStatus::Pending));
        assert!(cal.move_to(id, Span::slot(5 * HOUR_MS)));
        assert_eq!(cal.bookings[1].id, id);
        assert_eq!(cal.bookings[1].end(), 6 * HOUR_MS);
        assert!(!cal.move_to(Ulid::new(), Span::slot(0)));
    }

    #[test]
    fn overlapping_skips_adjacent_and_excluded() {
        let mut cal = DoctorCalendar::new(Ulid::new());
        let a = booking_at(0, BookingStatus::Confirmed);
        let b = booking_at(HOUR_MS / 2, BookingStatus::Confirmed);
        let a_id = a.id;
        cal.insert(a);
        cal.insert(b);
        cal.insert(booking_at(3 * HOUR_MS, BookingStatus::Confirmed));

        let query = Span::slot(HOUR_MS);
        let hits: Vec<_> = cal.overlapping(&query, None).collect();
        assert_eq!(hits.len(), 1); // [0,1h) is adjacent; [30m,1h30m) overlaps

        let query = Span::slot(0);
        assert_eq!(cal.overlapping(&query, None).count(), 2);
        assert_eq!(cal.overlapping(&query, Some(a_id)).count(), 1);
    }

    #[test]
    fn overlapping_empty_calendar() {
        let cal = DoctorCalendar::new(Ulid::new());
        assert_eq!(cal.overlapping(&Span::new(0, DAY_MS), None).count(), 0);
    }

    #[test]
    fn on_date_uses_start_only() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let mut cal = DoctorCalendar::new(Ulid::new());
        // Starts 23:30 on day 0, ends on day 1.
        cal.insert(booking_at(DAY_MS - HOUR_MS / 2, BookingStatus::Confirmed));
        cal.insert(booking_at(DAY_MS + HOUR_MS, BookingStatus::Confirmed));
        let day0 = local_date(0, &utc);
        let day1 = local_date(DAY_MS, &utc);
        assert_eq!(cal.on_date(day0, &utc, None).count(), 1);
        assert_eq!(cal.on_date(day1, &utc, None).count(), 1);
    }

    #[test]
    fn starting_within_bounds() {
        let mut cal = DoctorCalendar::new(Ulid::new());
        for i in 0..5 {
            cal.insert(booking_at(i * HOUR_MS, BookingStatus::Pending));
        }
        let window = Span::new(HOUR_MS, 3 * HOUR_MS);
        assert_eq!(cal.starting_within(window, None).count(), 2);
    }

    #[test]
    fn matching_status_only_selects_from_status() {
        let mut cal = DoctorCalendar::new(Ulid::new());
        cal.insert(booking_at(0, BookingStatus::Confirmed));
        cal.insert(booking_at(HOUR_MS, BookingStatus::Pending));
        cal.insert(booking_at(10 * HOUR_MS, BookingStatus::Confirmed));

        let ids = cal.matching_status(BookingStatus::Confirmed, |b| b.start() <= 2 * HOUR_MS);
        assert_eq!(ids, vec![cal.bookings[0].id]);
        // Read-only: nothing moved.
        assert_eq!(cal.bookings[0].status, BookingStatus::Confirmed);
    }

    #[test]
    fn filter_is_conjunctive() {
        let b = booking_at(0, BookingStatus::Confirmed);
        assert!(BookingFilter::default().matches(&b));
        let f = BookingFilter {
            status: Some(BookingStatus::Confirmed),
            doctor_id: Some(b.doctor_id),
            ..Default::default()
        };
        assert!(f.matches(&b));
        let f = BookingFilter {
            status: Some(BookingStatus::Confirmed),
            patient_id: Some(Ulid::new()),
            ..Default::default()
        };
        assert!(!f.matches(&b));
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingRequested {
            id: Ulid::new(),
            doctor_id: Ulid::new(),
            patient_id: Ulid::new(),
            clinic_id: Ulid::new(),
            span: Span::slot(HOUR_MS),
            created_at: 0,
            notes: Some("first visit".into()),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
