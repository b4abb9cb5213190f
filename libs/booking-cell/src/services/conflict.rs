use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use lawyer_cell::services::profile::LawyerProfileService;
use lawyer_cell::services::schedule::ScheduleService;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_utils::clock::{system_clock, Clock};
use shared_utils::time::{intervals_overlap, local_to_utc, TimezoneName};

use crate::models::{
    Appointment, BookingError, ConflictCheckResponse, ConflictDetail, ConsultationType,
    GenerateSlotsRequest, MAX_APPOINTMENT_BUFFER_MINUTES,
};
use crate::services::slots::SlotGenerationService;

/// Days ahead to search when proposing alternatives for a conflicted request.
const ALTERNATIVE_SEARCH_DAYS: i64 = 7;
const MAX_ALTERNATIVES: usize = 3;

pub struct ConflictDetectionService {
    supabase: Arc<SupabaseClient>,
    profile_service: LawyerProfileService,
    schedule_service: ScheduleService,
    slot_service: SlotGenerationService,
    clock: Arc<dyn Clock>,
}

impl ConflictDetectionService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    pub fn with_clock(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            profile_service: LawyerProfileService::new(Arc::clone(&supabase), Arc::clone(&clock)),
            schedule_service: ScheduleService::new(Arc::clone(&supabase), Arc::clone(&clock)),
            slot_service: SlotGenerationService::with_clock(config, Arc::clone(&clock)),
            supabase,
            clock,
        }
    }

    /// Check whether `[start, end)`, extended past its end by
    /// `buffer_minutes`, collides with any non-cancelled appointment's
    /// buffered interval or any unavailability period. The first collision
    /// wins; on conflict up to three alternative slots over the following
    /// week are attached.
    ///
    /// `exclude_appointment_id` keeps a reschedule from conflicting with the
    /// appointment being moved.
    pub async fn check_conflicts(
        &self,
        lawyer_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        consultation_type: ConsultationType,
        buffer_minutes: i64,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<ConflictCheckResponse, BookingError> {
        debug!(
            "Checking conflicts for lawyer {} from {} to {}",
            lawyer_id, start_time, end_time
        );

        // Stored appointments carry their own buffers, so the candidate only
        // extends past its end; expanding both sides as well would count the
        // buffer twice and reject the boundary slot the generator offers.
        let candidate_start = start_time;
        let candidate_end = end_time + Duration::minutes(buffer_minutes);

        let detail = match self
            .find_appointment_collision(
                lawyer_id,
                candidate_start,
                candidate_end,
                exclude_appointment_id,
                auth_token,
            )
            .await?
        {
            Some(apt) => Some(ConflictDetail::Appointment {
                start_time: apt.scheduled_start_time,
                end_time: apt.scheduled_end_time,
            }),
            None => self
                .find_unavailability_collision(lawyer_id, candidate_start, candidate_end, auth_token)
                .await?
                .map(|reason| ConflictDetail::Unavailability { reason }),
        };

        let Some(detail) = detail else {
            return Ok(ConflictCheckResponse::clear());
        };

        warn!(
            event = "booking_conflict",
            lawyer_id = %lawyer_id,
            start_time = %start_time,
            "Conflict detected for requested slot"
        );

        let duration_minutes = (end_time - start_time).num_minutes();
        let suggested_alternatives = self
            .suggest_alternatives(
                lawyer_id,
                start_time,
                consultation_type,
                duration_minutes,
                auth_token,
            )
            .await
            .unwrap_or_else(|e| {
                warn!("Failed to generate alternative slots: {}", e);
                vec![]
            });

        Ok(ConflictCheckResponse {
            has_conflict: true,
            detail: Some(detail),
            suggested_alternatives,
        })
    }

    /// Count of a client's active appointments on the UTC day containing
    /// `instant`. Used by the validator's soft daily cap.
    pub async fn count_client_appointments_on_day(
        &self,
        client_id: Uuid,
        instant: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<i32, BookingError> {
        let date = instant.date_naive();
        let start_of_day = date.and_time(chrono::NaiveTime::MIN).and_utc();
        let end_of_day = start_of_day + Duration::days(1);

        let query_parts = vec![
            format!("client_id=eq.{}", client_id),
            format!(
                "scheduled_start_time=gte.{}",
                urlencoding::encode(&start_of_day.to_rfc3339())
            ),
            format!(
                "scheduled_start_time=lt.{}",
                urlencoding::encode(&end_of_day.to_rfc3339())
            ),
            "status=in.(pending,confirmed,in_progress)".to_string(),
        ];

        let path = format!("/rest/v1/appointments?{}", query_parts.join("&"));

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        Ok(result.len() as i32)
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    /// First active appointment whose buffered interval intersects the
    /// candidate window, if any. The store query is widened so rows whose own
    /// buffer reaches into the candidate are not missed; the exact check
    /// happens here.
    async fn find_appointment_collision(
        &self,
        lawyer_id: Uuid,
        candidate_start: DateTime<Utc>,
        candidate_end: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Option<Appointment>, BookingError> {
        let widened_start = candidate_start - Duration::minutes(MAX_APPOINTMENT_BUFFER_MINUTES);
        let widened_end = candidate_end + Duration::minutes(MAX_APPOINTMENT_BUFFER_MINUTES);

        let mut query_parts = vec![
            format!("lawyer_id=eq.{}", lawyer_id),
            format!(
                "scheduled_start_time=lt.{}",
                urlencoding::encode(&widened_end.to_rfc3339())
            ),
            format!(
                "scheduled_end_time=gt.{}",
                urlencoding::encode(&widened_start.to_rfc3339())
            ),
            "status=in.(pending,confirmed,in_progress)".to_string(),
        ];

        if let Some(exclude_id) = exclude_appointment_id {
            query_parts.push(format!("id=neq.{}", exclude_id));
        }

        let path = format!(
            "/rest/v1/appointments?{}&order=scheduled_start_time.asc",
            query_parts.join("&")
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        let appointments: Vec<Appointment> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<Appointment>, _>>()
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse appointments: {}", e)))?;

        Ok(appointments.into_iter().find(|apt| {
            apt.status.is_active()
                && intervals_overlap(
                    candidate_start,
                    candidate_end,
                    apt.buffered_start(),
                    apt.buffered_end(),
                )
        }))
    }

    /// Reason string of the first unavailability period covering the window.
    async fn find_unavailability_collision(
        &self,
        lawyer_id: Uuid,
        candidate_start: DateTime<Utc>,
        candidate_end: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Option<Option<String>>, BookingError> {
        let lawyer = self.profile_service.get_lawyer(lawyer_id, auth_token).await?;
        let lawyer_tz = TimezoneName::parse(&lawyer.timezone)?.resolve();

        let from_date = candidate_start.date_naive() - Duration::days(1);
        let to_date = candidate_end.date_naive() + Duration::days(1);

        let periods = self
            .schedule_service
            .get_unavailability_for_range(lawyer_id, from_date, to_date, auth_token)
            .await?;

        for period in &periods {
            let mut date = period.start_date.max(from_date);
            let last = period.end_date.min(to_date);

            while date <= last {
                if self.period_blocks_window(period, date, lawyer_tz, candidate_start, candidate_end)
                {
                    return Ok(Some(period.reason.clone().or_else(|| {
                        Some("Lawyer unavailable".to_string())
                    })));
                }
                date += Duration::days(1);
            }
        }

        Ok(None)
    }

    fn period_blocks_window(
        &self,
        period: &lawyer_cell::models::UnavailabilityPeriod,
        date: NaiveDate,
        lawyer_tz: chrono_tz::Tz,
        candidate_start: DateTime<Utc>,
        candidate_end: DateTime<Utc>,
    ) -> bool {
        if period.is_all_day() {
            // Whole lawyer-local day is blocked.
            let (Ok(day_start), Ok(day_end)) = (
                local_to_utc(date, chrono::NaiveTime::MIN, lawyer_tz),
                local_to_utc(date + Duration::days(1), chrono::NaiveTime::MIN, lawyer_tz),
            ) else {
                return true;
            };
            return intervals_overlap(candidate_start, candidate_end, day_start, day_end);
        }

        let (Some(p_start), Some(p_end)) = (period.start_time, period.end_time) else {
            return false;
        };
        let (Ok(blocked_start), Ok(blocked_end)) = (
            local_to_utc(date, p_start, lawyer_tz),
            local_to_utc(date, p_end, lawyer_tz),
        ) else {
            return true;
        };

        intervals_overlap(candidate_start, candidate_end, blocked_start, blocked_end)
    }

    async fn suggest_alternatives(
        &self,
        lawyer_id: Uuid,
        from: DateTime<Utc>,
        consultation_type: ConsultationType,
        duration_minutes: i64,
        auth_token: &str,
    ) -> Result<Vec<crate::models::AvailableSlot>, BookingError> {
        let lawyer = self.profile_service.get_lawyer(lawyer_id, auth_token).await?;

        let request = GenerateSlotsRequest {
            lawyer_id,
            from_date: from.date_naive(),
            to_date: from.date_naive() + Duration::days(ALTERNATIVE_SEARCH_DAYS),
            consultation_type,
            duration_minutes,
            client_timezone: lawyer.timezone.clone(),
            include_unavailable: false,
            is_emergency: false,
        };

        let mut slots = self.slot_service.generate_slots(&request, auth_token).await?;
        slots.retain(|slot| slot.is_available && slot.start_time > self.clock.now());
        slots.truncate(MAX_ALTERNATIVES);

        Ok(slots)
    }
}
