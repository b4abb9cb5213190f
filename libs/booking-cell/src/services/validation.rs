use std::sync::Arc;

use chrono::Duration;
use tracing::debug;
use uuid::Uuid;

use lawyer_cell::services::profile::LawyerProfileService;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_utils::clock::{system_clock, Clock};
use shared_utils::time::TimezoneName;

use crate::models::{BookingError, BookingRequest, ValidationOutcome};
use crate::services::conflict::ConflictDetectionService;

/// Slot starts must land on this grid relative to the hour.
const SLOT_ALIGNMENT_MINUTES: i64 = 15;

/// Tolerated drift between `duration_minutes` and `end - start`.
const DURATION_TOLERANCE_MINUTES: i64 = 1;

/// Multi-stage validation of a booking request.
///
/// Stages run in a fixed order and the first failing stage short-circuits the
/// rest, but errors within a stage accumulate so the caller sees everything
/// wrong at that level at once. Warnings never block.
pub struct BookingValidationService {
    profile_service: LawyerProfileService,
    conflict_service: ConflictDetectionService,
    clock: Arc<dyn Clock>,
}

impl BookingValidationService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    pub fn with_clock(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            profile_service: LawyerProfileService::new(supabase, Arc::clone(&clock)),
            conflict_service: ConflictDetectionService::with_clock(config, Arc::clone(&clock)),
            clock,
        }
    }

    /// Validate `request` through every stage. Pass `exclude_appointment_id`
    /// when rescheduling so the appointment being moved does not conflict
    /// with itself.
    pub async fn validate(
        &self,
        request: &BookingRequest,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<ValidationOutcome, BookingError> {
        debug!(
            "Validating booking request for lawyer {} at {}",
            request.lawyer_id, request.start_time
        );

        TimezoneName::parse(&request.client_timezone)?;

        let mut outcome = ValidationOutcome::valid();

        // Stage 1: the lawyer must exist and be bookable.
        let lawyer = self
            .profile_service
            .get_lawyer(request.lawyer_id, auth_token)
            .await?;
        if !lawyer.is_verified {
            outcome.errors.push("Lawyer is not verified".to_string());
        }
        if !lawyer.is_active {
            outcome.errors.push("Lawyer is not active".to_string());
        }
        if !outcome.errors.is_empty() {
            outcome.is_valid = false;
            return Ok(outcome);
        }

        let policy = self
            .profile_service
            .get_booking_policy(request.lawyer_id, auth_token)
            .await?;

        // Stage 2: duration against the policy's bounds and the slot grid.
        if request.duration_minutes < policy.min_consultation_duration {
            outcome.errors.push(format!(
                "Duration {} minutes is below the minimum of {}",
                request.duration_minutes, policy.min_consultation_duration
            ));
        }
        if request.duration_minutes > policy.max_consultation_duration {
            outcome.errors.push(format!(
                "Duration {} minutes exceeds the maximum of {}",
                request.duration_minutes, policy.max_consultation_duration
            ));
        }
        if request.duration_minutes % SLOT_ALIGNMENT_MINUTES != 0 {
            outcome.errors.push(format!(
                "Duration must be a multiple of {} minutes",
                SLOT_ALIGNMENT_MINUTES
            ));
        }
        if !outcome.errors.is_empty() {
            outcome.is_valid = false;
            return Ok(outcome);
        }

        // Stage 3: internal consistency of the requested interval.
        let now = self.clock.now();
        if request.start_time <= now {
            outcome
                .errors
                .push("Start time must be in the future".to_string());
        }
        if request.end_time <= request.start_time {
            outcome
                .errors
                .push("End time must be after start time".to_string());
        }
        let span_minutes = (request.end_time - request.start_time).num_minutes();
        if (span_minutes - request.duration_minutes).abs() > DURATION_TOLERANCE_MINUTES {
            outcome.errors.push(format!(
                "Interval spans {} minutes but duration_minutes is {}",
                span_minutes, request.duration_minutes
            ));
        }
        if !outcome.errors.is_empty() {
            outcome.is_valid = false;
            return Ok(outcome);
        }

        // Stage 4: booking window. A start exactly at the minimum advance is
        // accepted; same-day permission downgrades the short-notice error to
        // a warning.
        let advance = request.start_time - now;
        if advance < Duration::hours(policy.min_advance_hours) {
            if policy.allow_same_day_booking {
                let warning = if policy.same_day_booking_fee > 0.0 {
                    format!(
                        "Less than {} hours notice; same-day fee applies",
                        policy.min_advance_hours
                    )
                } else {
                    format!("Less than {} hours notice", policy.min_advance_hours)
                };
                outcome.warnings.push(warning);
            } else {
                outcome.errors.push(format!(
                    "Bookings require at least {} hours notice",
                    policy.min_advance_hours
                ));
            }
        }
        if advance > Duration::days(policy.max_advance_days) {
            outcome.errors.push(format!(
                "Bookings cannot be made more than {} days in advance",
                policy.max_advance_days
            ));
        }
        if !outcome.errors.is_empty() {
            outcome.is_valid = false;
            return Ok(outcome);
        }

        // Stage 5: calendar conflicts.
        let conflicts = self
            .conflict_service
            .check_conflicts(
                request.lawyer_id,
                request.start_time,
                request.end_time,
                request.consultation_type,
                policy.buffer_time_minutes,
                exclude_appointment_id,
                auth_token,
            )
            .await?;
        if conflicts.has_conflict {
            outcome
                .errors
                .push("Requested time conflicts with the lawyer's calendar".to_string());
            outcome.conflict = conflicts.detail;
            outcome.suggested_alternatives = conflicts.suggested_alternatives;
            outcome.is_valid = false;
            return Ok(outcome);
        }

        // Stage 6: soft daily cap per client. Over the cap is a warning, not
        // a rejection.
        let count = self
            .conflict_service
            .count_client_appointments_on_day(request.client_id, request.start_time, auth_token)
            .await?;
        if count >= policy.max_bookings_per_client_per_day {
            outcome.warnings.push(format!(
                "Client already has {} bookings that day (cap {})",
                count, policy.max_bookings_per_client_per_day
            ));
        }

        Ok(outcome)
    }
}
