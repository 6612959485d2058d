use chrono::{DateTime, FixedOffset, NaiveDateTime};

use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Naive forms accepted by `parse_start`, read in the engine's offset.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO 8601 start time. Text with an explicit offset keeps it;
/// naive text is interpreted in `offset`.
pub fn parse_start(text: &str, offset: &FixedOffset) -> Result<Ms, EngineError> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.timestamp_millis());
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            let as_utc = naive.and_utc().timestamp_millis();
            return Ok(as_utc - offset.local_minus_utc() as Ms * 1000);
        }
    }
    Err(EngineError::InvalidTimeFormat(text.to_string()))
}

pub(crate) fn validate_start(start: Ms) -> Result<(), EngineError> {
    if !(MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS - BOOKING_DURATION_MS).contains(&start) {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    Ok(())
}

/// Check a proposed slot against the doctor's slot-holding bookings.
///
/// Time overlap is checked first and wins; only then is the one-clinic-per-day
/// rule applied. `exclude` is the booking being moved, if any.
pub(crate) fn check_conflict(
    cal: &DoctorCalendar,
    clinic_id: ClinicId,
    span: &Span,
    exclude: Option<BookingId>,
    offset: &FixedOffset,
) -> Result<(), EngineError> {
    if let Some(hit) = cal
        .overlapping(span, exclude)
        .find(|b| b.status.holds_slot())
    {
        return Err(EngineError::DoctorDoubleBooked(hit.id));
    }

    let date = local_date(span.start, offset);
    if let Some(other) = cal
        .on_date(date, offset, exclude)
        .find(|b| b.status.holds_slot() && b.clinic_id != clinic_id)
    {
        return Err(EngineError::ClinicMismatchSameDay {
            existing: other.id,
            clinic_id: other.clinic_id,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn booking(start: Ms, clinic_id: ClinicId, status: BookingStatus) -> Booking {
        Booking {
            id: Ulid::new(),
            doctor_id: Ulid::nil(),
            patient_id: Ulid::new(),
            clinic_id,
            span: Span::slot(start),
            status,
            created_at: 0,
            notes: None,
        }
    }

    #[test]
    fn parse_rfc3339_keeps_offset() {
        let t = parse_start("2026-10-19T10:00:00+02:00", &utc()).unwrap();
        let z = parse_start("2026-10-19T08:00:00Z", &utc()).unwrap();
        assert_eq!(t, z);
    }

    #[test]
    fn parse_naive_uses_engine_offset() {
        let plus_three = FixedOffset::east_opt(3 * 3600).unwrap();
        let naive = parse_start("2026-10-19T10:00:00", &plus_three).unwrap();
        let explicit = parse_start("2026-10-19T07:00:00Z", &utc()).unwrap();
        assert_eq!(naive, explicit);
        assert_eq!(parse_start("2026-10-19 10:00", &plus_three).unwrap(), naive);
        assert_eq!(parse_start("2026-10-19T10:00", &plus_three).unwrap(), naive);
        assert_eq!(parse_start(" 2026-10-19T10:00:00.000 ", &plus_three).unwrap(), naive);
    }

    #[test]
    fn parse_rejects_garbage() {
        for bad in ["", "tomorrow", "2026-13-01T10:00:00", "19.10.2026 10:00"] {
            assert!(
                matches!(parse_start(bad, &utc()), Err(EngineError::InvalidTimeFormat(_))),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn validate_start_range() {
        assert!(validate_start(0).is_ok());
        assert!(validate_start(-1).is_err());
        assert!(validate_start(MAX_VALID_TIMESTAMP_MS).is_err());
    }

    #[test]
    fn overlap_is_double_booking() {
        let clinic = Ulid::new();
        let mut cal = DoctorCalendar::new(Ulid::nil());
        let existing = booking(10 * HOUR_MS, clinic, BookingStatus::Confirmed);
        let existing_id = existing.id;
        cal.insert(existing);

        let proposed = Span::slot(10 * HOUR_MS + HOUR_MS / 2);
        let err = check_conflict(&cal, clinic, &proposed, None, &utc()).unwrap_err();
        assert!(matches!(err, EngineError::DoctorDoubleBooked(id) if id == existing_id));
    }

    #[test]
    fn adjacent_slot_is_free() {
        let clinic = Ulid::new();
        let mut cal = DoctorCalendar::new(Ulid::nil());
        cal.insert(booking(10 * HOUR_MS, clinic, BookingStatus::Confirmed));
        assert!(check_conflict(&cal, clinic, &Span::slot(11 * HOUR_MS), None, &utc()).is_ok());
        assert!(check_conflict(&cal, clinic, &Span::slot(9 * HOUR_MS), None, &utc()).is_ok());
    }

    #[test]
    fn excluded_booking_does_not_conflict_with_itself() {
        let clinic = Ulid::new();
        let mut cal = DoctorCalendar::new(Ulid::nil());
        let b = booking(10 * HOUR_MS, clinic, BookingStatus::Confirmed);
        let id = b.id;
        cal.insert(b);
        let same = Span::slot(10 * HOUR_MS);
        assert!(check_conflict(&cal, clinic, &same, Some(id), &utc()).is_ok());
    }

    #[test]
    fn pending_requests_reserve_nothing() {
        let clinic = Ulid::new();
        let other_clinic = Ulid::new();
        let mut cal = DoctorCalendar::new(Ulid::nil());
        cal.insert(booking(10 * HOUR_MS, other_clinic, BookingStatus::Pending));
        assert!(check_conflict(&cal, clinic, &Span::slot(10 * HOUR_MS), None, &utc()).is_ok());
    }

    #[test]
    fn completed_and_paid_still_hold_their_slot() {
        let clinic = Ulid::new();
        let mut cal = DoctorCalendar::new(Ulid::nil());
        cal.insert(booking(10 * HOUR_MS, clinic, BookingStatus::Paid));
        let err = check_conflict(&cal, clinic, &Span::slot(10 * HOUR_MS), None, &utc()).unwrap_err();
        assert!(matches!(err, EngineError::DoctorDoubleBooked(_)));
    }

    #[test]
    fn other_clinic_same_day_rejected() {
        let c1 = Ulid::new();
        let c2 = Ulid::new();
        let mut cal = DoctorCalendar::new(Ulid::nil());
        let b = booking(DAY_MS + 9 * HOUR_MS, c1, BookingStatus::Confirmed);
        let b_id = b.id;
        cal.insert(b);

        let later_same_day = Span::slot(DAY_MS + 15 * HOUR_MS);
        let err = check_conflict(&cal, c2, &later_same_day, None, &utc()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::ClinicMismatchSameDay { existing, clinic_id } if existing == b_id && clinic_id == c1
        ));

        // Same clinic is fine, and so is another clinic on the next day.
        assert!(check_conflict(&cal, c1, &later_same_day, None, &utc()).is_ok());
        let next_day = Span::slot(2 * DAY_MS + 9 * HOUR_MS);
        assert!(check_conflict(&cal, c2, &next_day, None, &utc()).is_ok());
    }

    #[test]
    fn overlap_reported_before_clinic_mismatch() {
        let c1 = Ulid::new();
        let c2 = Ulid::new();
        let mut cal = DoctorCalendar::new(Ulid::nil());
        cal.insert(booking(10 * HOUR_MS, c1, BookingStatus::Confirmed));
        let err = check_conflict(&cal, c2, &Span::slot(10 * HOUR_MS), None, &utc()).unwrap_err();
        assert!(matches!(err, EngineError::DoctorDoubleBooked(_)));
    }

    #[test]
    fn day_boundary_follows_offset() {
        let c1 = Ulid::new();
        let c2 = Ulid::new();
        let plus_three = FixedOffset::east_opt(3 * 3600).unwrap();
        let mut cal = DoctorCalendar::new(Ulid::nil());
        // 22:00Z on day 0 is 01:00 on day 1 at +03:00.
        cal.insert(booking(22 * HOUR_MS, c1, BookingStatus::Confirmed));
        let morning_day1 = Span::slot(DAY_MS + 6 * HOUR_MS);
        assert!(check_conflict(&cal, c2, &morning_day1, None, &utc()).is_ok());
        assert!(check_conflict(&cal, c2, &morning_day1, None, &plus_three).is_err());
    }
}
