use ulid::Ulid;

use crate::auth::{Operation, Role};
use crate::model::{BookingStatus, ClinicId};

#[derive(Debug)]
pub enum EngineError {
    Forbidden {
        operation: Operation,
        role: Role,
    },
    MissingField(&'static str),
    InvalidTimeFormat(String),
    PastDate,
    UnaffiliatedDoctor {
        doctor_id: Ulid,
        clinic_id: ClinicId,
    },
    /// Carries the id of the booking already holding the slot.
    DoctorDoubleBooked(Ulid),
    /// Carries the same-day booking at another clinic.
    ClinicMismatchSameDay {
        existing: Ulid,
        clinic_id: ClinicId,
    },
    InvalidState {
        id: Ulid,
        status: BookingStatus,
    },
    AlreadyStarted(Ulid),
    NotFound(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    /// Short machine-readable kind, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Forbidden { .. } => "forbidden",
            EngineError::MissingField(_) => "missing_field",
            EngineError::InvalidTimeFormat(_) => "invalid_time_format",
            EngineError::PastDate => "past_date",
            EngineError::UnaffiliatedDoctor { .. } => "unaffiliated_doctor",
            EngineError::DoctorDoubleBooked(_) => "doctor_double_booked",
            EngineError::ClinicMismatchSameDay { .. } => "clinic_mismatch_same_day",
            EngineError::InvalidState { .. } => "invalid_state",
            EngineError::AlreadyStarted(_) => "already_started",
            EngineError::NotFound(_) => "not_found",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::WalError(_) => "wal_error",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Forbidden { operation, role } => {
                write!(f, "role {role} may not {}", operation.as_str())
            }
            EngineError::MissingField(field) => write!(f, "missing required field: {field}"),
            EngineError::InvalidTimeFormat(input) => {
                write!(f, "invalid time format (expected ISO 8601): {input:?}")
            }
            EngineError::PastDate => write!(f, "start time must be in the future"),
            EngineError::UnaffiliatedDoctor {
                doctor_id,
                clinic_id,
            } => write!(f, "doctor {doctor_id} does not work at clinic {clinic_id}"),
            EngineError::DoctorDoubleBooked(id) => {
                write!(f, "doctor already booked at this time: {id}")
            }
            EngineError::ClinicMismatchSameDay {
                existing,
                clinic_id,
            } => write!(
                f,
                "doctor already works at clinic {clinic_id} that day (booking {existing})"
            ),
            EngineError::InvalidState { id, status } => {
                write!(f, "booking {id} is {status}; transition not allowed")
            }
            EngineError::AlreadyStarted(id) => write!(f, "booking {id} has already started"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
