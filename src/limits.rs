use crate::model::Ms;

/// 1970-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 9999-12-31T23:59:59.999Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_799_999;

pub const MAX_NOTES_LEN: usize = 4096;
pub const MAX_BOOKINGS_PER_DOCTOR: usize = 100_000;
pub const MAX_HORIZON_DAYS: u32 = 366;
pub const MAX_LIST_RESULTS: usize = 10_000;
pub const MAX_SPECIALIZATION_LEN: usize = 255;
