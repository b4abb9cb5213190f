// libs/lawyer-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// LAWYER PROFILE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LawyerProfile {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    /// IANA timezone the lawyer's availability templates are expressed in.
    pub timezone: String,
    pub hourly_rate: f64,
    pub is_verified: bool,
    pub is_active: bool,
    pub specialization: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LawyerProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

// ==============================================================================
// BOOKING POLICY
// ==============================================================================

/// Per-lawyer booking constraints. Created lazily with defaults the first time
/// a policy is requested for a lawyer that has none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingPolicy {
    pub id: Uuid,
    pub lawyer_id: Uuid,
    pub min_advance_hours: i64,
    pub max_advance_days: i64,
    pub allow_same_day_booking: bool,
    pub same_day_booking_fee: f64,
    pub buffer_time_minutes: i64,
    pub min_consultation_duration: i64,
    pub max_consultation_duration: i64,
    pub free_cancellation_hours: i64,
    pub max_bookings_per_client_per_day: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookingPolicy {
    pub fn default_for(lawyer_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            lawyer_id,
            min_advance_hours: 24,
            max_advance_days: 30,
            allow_same_day_booking: false,
            same_day_booking_fee: 0.0,
            buffer_time_minutes: 15,
            min_consultation_duration: 30,
            max_consultation_duration: 120,
            free_cancellation_hours: 24,
            max_bookings_per_client_per_day: 3,
            created_at: now,
            updated_at: now,
        }
    }
}

// ==============================================================================
// AVAILABILITY MODELS
// ==============================================================================

/// One weekly recurring availability window, in the lawyer's local time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityTemplate {
    pub id: Uuid,
    pub lawyer_id: Uuid,
    /// 0 = Sunday through 6 = Saturday.
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTemplateRequest {
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// A date range during which the lawyer is unavailable, optionally narrowed to
/// a time-of-day sub-range. Without times the whole day is blocked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnavailabilityPeriod {
    pub id: Uuid,
    pub lawyer_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UnavailabilityPeriod {
    pub fn is_all_day(&self) -> bool {
        self.start_time.is_none() || self.end_time.is_none()
    }

    pub fn covers_date(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum LawyerError {
    #[error("Lawyer not found")]
    NotFound,

    #[error("Availability template not found")]
    TemplateNotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Availability conflicts with existing schedule")]
    ScheduleConflict,

    #[error("Database error: {0}")]
    DatabaseError(String),
}
