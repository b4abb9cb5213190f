use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use lawyer_cell::services::profile::LawyerProfileService;
use shared_config::AppConfig;
use shared_database::supabase::{is_conflict_error, SupabaseClient};
use shared_utils::clock::{system_clock, Clock};
use shared_utils::time::TimezoneName;

use crate::models::{
    Appointment, BookingError, BookingRequest, ValidationOutcome,
};
use crate::services::locks::ReservationLockService;
use crate::services::pricing::{quote_slot, PricingInput};
use crate::services::validation::BookingValidationService;

/// Commits validated booking requests as pending appointments.
///
/// The commit path re-runs full validation at write time, so a stale lock or
/// a race with another client surfaces here rather than as a double booking.
/// The store's exclusion constraint is the final arbiter: a 409 on insert
/// becomes `TransactionFailure` and the caller may retry once.
pub struct BookingService {
    supabase: Arc<SupabaseClient>,
    profile_service: LawyerProfileService,
    validation_service: BookingValidationService,
    lock_service: ReservationLockService,
    clock: Arc<dyn Clock>,
}

impl BookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    pub fn with_clock(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            profile_service: LawyerProfileService::new(Arc::clone(&supabase), Arc::clone(&clock)),
            validation_service: BookingValidationService::with_clock(config, Arc::clone(&clock)),
            lock_service: ReservationLockService::with_clock(config, Arc::clone(&clock)),
            supabase,
            clock,
        }
    }

    /// Validate, price, and persist a booking in one pass.
    ///
    /// `lock_id` is optional: holding a live lock is the normal path, but a
    /// booking without one is still accepted when validation passes. The lock
    /// is released best-effort after the insert; a failed release is logged
    /// and never fails the booking.
    #[instrument(skip(self, request, auth_token), fields(lawyer_id = %request.lawyer_id, client_id = %request.client_id))]
    pub async fn commit_booking(
        &self,
        request: &BookingRequest,
        lock_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        debug!(
            "Committing booking for lawyer {} client {} at {}",
            request.lawyer_id, request.client_id, request.start_time
        );

        if let Some(id) = lock_id {
            let live = self
                .lock_service
                .get_live_lock(id, request.client_id, auth_token)
                .await?;
            if live.is_none() {
                warn!("Lock {} expired or missing at commit time", id);
            }
        }

        let outcome = self
            .validation_service
            .validate(request, None, auth_token)
            .await?;
        let outcome = Self::reject_if_invalid(outcome)?;

        for warning in &outcome.warnings {
            debug!("Booking warning: {}", warning);
        }

        let appointment = self.insert_appointment(request, auth_token).await?;

        info!(
            event = "booking_committed",
            appointment_id = %appointment.id,
            lawyer_id = %request.lawyer_id,
            client_id = %request.client_id,
            start_time = %request.start_time,
            total_amount = appointment.total_amount,
            "Booking committed"
        );

        if let Some(id) = lock_id {
            if let Err(e) = self.lock_service.release(id, auth_token).await {
                warn!("Failed to release lock {} after commit: {}", id, e);
            }
        }

        Ok(appointment)
    }

    /// Validate moving an existing appointment to the interval in `request`,
    /// without writing anything. The appointment being moved is excluded from
    /// conflict checks.
    pub async fn validate_reschedule(
        &self,
        appointment_id: Uuid,
        request: &BookingRequest,
        auth_token: &str,
    ) -> Result<ValidationOutcome, BookingError> {
        self.validation_service
            .validate(request, Some(appointment_id), auth_token)
            .await
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        let row = result
            .into_iter()
            .next()
            .ok_or(BookingError::NotFound("Appointment"))?;

        serde_json::from_value(row)
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse appointment: {}", e)))
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    fn reject_if_invalid(outcome: ValidationOutcome) -> Result<ValidationOutcome, BookingError> {
        if outcome.is_valid {
            return Ok(outcome);
        }

        if let Some(detail) = outcome.conflict {
            return Err(BookingError::SlotConflict {
                detail,
                alternatives: outcome.suggested_alternatives,
            });
        }

        Err(BookingError::ValidationFailed(outcome))
    }

    async fn insert_appointment(
        &self,
        request: &BookingRequest,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let lawyer = self
            .profile_service
            .get_lawyer(request.lawyer_id, auth_token)
            .await?;
        let policy = self
            .profile_service
            .get_booking_policy(request.lawyer_id, auth_token)
            .await?;
        let lawyer_tz = TimezoneName::parse(&lawyer.timezone)?.resolve();

        let now = self.clock.now();
        let quote = quote_slot(&PricingInput {
            start_utc: request.start_time,
            duration_minutes: request.duration_minutes,
            consultation_type: request.consultation_type,
            hourly_rate: lawyer.hourly_rate,
            policy: &policy,
            is_emergency: request.is_emergency,
            lawyer_tz,
            now,
        });

        let body = json!({
            "lawyer_id": request.lawyer_id,
            "client_id": request.client_id,
            "scheduled_start_time": request.start_time.to_rfc3339(),
            "scheduled_end_time": request.end_time.to_rfc3339(),
            "consultation_type": request.consultation_type,
            "duration_minutes": request.duration_minutes,
            "status": "pending",
            "buffer_before_minutes": policy.buffer_time_minutes,
            "buffer_after_minutes": policy.buffer_time_minutes,
            "base_amount": quote.base_price,
            "total_amount": quote.total_price,
            "client_timezone": request.client_timezone,
            "lawyer_timezone": lawyer.timezone,
            "notes": request.notes,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339(),
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(body),
                Some(headers),
            )
            .await
            .map_err(|e| {
                if is_conflict_error(&e) {
                    // Lost the race to another writer between validation and
                    // insert; the exclusion constraint caught it.
                    BookingError::TransactionFailure(
                        "Concurrent booking won the slot".to_string(),
                    )
                } else {
                    BookingError::DatabaseError(e.to_string())
                }
            })?;

        result
            .into_iter()
            .next()
            .ok_or_else(|| BookingError::DatabaseError("Insert returned no row".to_string()))
    }
}
