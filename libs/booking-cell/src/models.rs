// libs/booking-cell/src/models.rs
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use lawyer_cell::models::LawyerError;
use shared_utils::time::TimeError;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// Widest buffer any stored appointment is expected to carry. Store fetch
/// windows widen by this amount so exact buffered checks never miss a row.
pub const MAX_APPOINTMENT_BUFFER_MINUTES: i64 = 120;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub lawyer_id: Uuid,
    pub client_id: Uuid,
    pub scheduled_start_time: DateTime<Utc>,
    pub scheduled_end_time: DateTime<Utc>,
    pub consultation_type: ConsultationType,
    pub duration_minutes: i64,
    pub status: AppointmentStatus,
    pub buffer_before_minutes: i64,
    pub buffer_after_minutes: i64,
    pub base_amount: f64,
    pub total_amount: f64,
    pub client_timezone: String,
    pub lawyer_timezone: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// Start of the interval no other appointment may enter.
    pub fn buffered_start(&self) -> DateTime<Utc> {
        self.scheduled_start_time - Duration::minutes(self.buffer_before_minutes)
    }

    /// End of the interval no other appointment may enter.
    pub fn buffered_end(&self) -> DateTime<Utc> {
        self.scheduled_end_time + Duration::minutes(self.buffer_after_minutes)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    /// Statuses that occupy the lawyer's calendar for conflict purposes.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Pending
                | AppointmentStatus::Confirmed
                | AppointmentStatus::InProgress
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::InProgress => write!(f, "in_progress"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationType {
    #[serde(alias = "Video", alias = "video_call")]
    Video,

    #[serde(alias = "Phone", alias = "phone_call")]
    Phone,

    #[serde(alias = "InPerson", alias = "in_office")]
    InPerson,
}

impl ConsultationType {
    /// Applied last in the pricing chain.
    pub fn price_multiplier(&self) -> f64 {
        match self {
            ConsultationType::Phone => 0.90,
            ConsultationType::InPerson => 1.20,
            ConsultationType::Video => 1.00,
        }
    }
}

impl fmt::Display for ConsultationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsultationType::Video => write!(f, "video"),
            ConsultationType::Phone => write!(f, "phone"),
            ConsultationType::InPerson => write!(f, "in_person"),
        }
    }
}

// ==============================================================================
// RESERVATION LOCK
// ==============================================================================

/// Short-TTL claim on a time interval. At most one active, unexpired lock may
/// intersect a given (lawyer, consultation type) interval, except re-locks by
/// the same holder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationLock {
    pub id: Uuid,
    pub lawyer_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub consultation_type: ConsultationType,
    pub holder_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl ReservationLock {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

// ==============================================================================
// SLOT MODELS (transient, never persisted)
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableSlot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Start/end rendered in the client's requested timezone (RFC 3339).
    pub local_start: String,
    pub local_end: String,
    pub duration_minutes: i64,
    pub consultation_type: ConsultationType,
    pub base_price: f64,
    pub total_price: f64,
    pub price_modifiers: Vec<PriceModifier>,
    pub is_available: bool,
    pub unavailable_reason: Option<String>,
    pub buffer_minutes: i64,
}

/// One pricing adjustment applied to a slot, in application order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceModifier {
    pub label: String,
    /// Change to the running total this modifier produced (signed).
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotQuote {
    pub base_price: f64,
    pub total_price: f64,
    pub modifiers: Vec<PriceModifier>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateSlotsRequest {
    pub lawyer_id: Uuid,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub consultation_type: ConsultationType,
    pub duration_minutes: i64,
    pub client_timezone: String,
    pub include_unavailable: bool,
    pub is_emergency: bool,
}

// ==============================================================================
// BOOKING REQUEST / VALIDATION MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub lawyer_id: Uuid,
    pub client_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub consultation_type: ConsultationType,
    pub duration_minutes: i64,
    pub client_timezone: String,
    pub is_emergency: bool,
    pub notes: Option<String>,
}

/// Aggregate result of the booking validator. Warnings never block a booking;
/// any error does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub conflict: Option<ConflictDetail>,
    pub suggested_alternatives: Vec<AvailableSlot>,
}

impl ValidationOutcome {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: vec![],
            warnings: vec![],
            conflict: None,
            suggested_alternatives: vec![],
        }
    }
}

// ==============================================================================
// CONFLICT DETECTION MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictDetail {
    /// An existing non-cancelled appointment whose buffered interval
    /// intersects the candidate.
    Appointment {
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    },
    /// An unavailability period covering (part of) the candidate window.
    Unavailability { reason: Option<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheckResponse {
    pub has_conflict: bool,
    pub detail: Option<ConflictDetail>,
    pub suggested_alternatives: Vec<AvailableSlot>,
}

impl ConflictCheckResponse {
    pub fn clear() -> Self {
        Self {
            has_conflict: false,
            detail: None,
            suggested_alternatives: vec![],
        }
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum BookingError {
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Booking policy violation: {0}")]
    PolicyViolation(String),

    #[error("Requested slot conflicts with an existing booking or unavailability")]
    SlotConflict {
        detail: ConflictDetail,
        alternatives: Vec<AvailableSlot>,
    },

    #[error("Slot is locked by another client until {expires_at}")]
    SlotLocked { expires_at: DateTime<Utc> },

    #[error("Lawyer is not verified for bookings")]
    LawyerNotVerified,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Booking validation failed: {}", .0.errors.join("; "))]
    ValidationFailed(ValidationOutcome),

    #[error("Transaction failure: {0}")]
    TransactionFailure(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<LawyerError> for BookingError {
    fn from(err: LawyerError) -> Self {
        match err {
            LawyerError::NotFound => BookingError::NotFound("Lawyer"),
            LawyerError::TemplateNotFound => BookingError::NotFound("Availability template"),
            LawyerError::ValidationError(msg) => BookingError::PolicyViolation(msg),
            LawyerError::ScheduleConflict => {
                BookingError::PolicyViolation("Schedule conflict".to_string())
            }
            LawyerError::DatabaseError(msg) => BookingError::DatabaseError(msg),
        }
    }
}

impl From<TimeError> for BookingError {
    fn from(err: TimeError) -> Self {
        match err {
            TimeError::InvalidTimezone(name) => BookingError::InvalidTimezone(name),
            TimeError::NonexistentLocalTime(time, tz) => BookingError::PolicyViolation(format!(
                "Local time {} does not exist in timezone {}",
                time, tz
            )),
        }
    }
}
