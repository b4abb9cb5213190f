use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use lawyer_cell::models::{BookingPolicy, UnavailabilityPeriod};
use lawyer_cell::services::profile::LawyerProfileService;
use lawyer_cell::services::schedule::ScheduleService;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_utils::clock::{system_clock, Clock};
use shared_utils::time::{intervals_overlap, local_to_utc, utc_to_local, TimezoneName};

use crate::models::{
    Appointment, AvailableSlot, BookingError, GenerateSlotsRequest,
    MAX_APPOINTMENT_BUFFER_MINUTES,
};
use crate::services::pricing::{quote_slot, PricingInput};

/// Generates priced, bookable slots from weekly availability templates,
/// booking policy windows, and the lawyer's current calendar.
pub struct SlotGenerationService {
    supabase: Arc<SupabaseClient>,
    profile_service: LawyerProfileService,
    schedule_service: ScheduleService,
    clock: Arc<dyn Clock>,
    granularity_minutes: i64,
}

impl SlotGenerationService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    pub fn with_clock(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            profile_service: LawyerProfileService::new(Arc::clone(&supabase), Arc::clone(&clock)),
            schedule_service: ScheduleService::new(Arc::clone(&supabase), Arc::clone(&clock)),
            supabase,
            clock,
            granularity_minutes: config.slot_granularity_minutes,
        }
    }

    /// Enumerate candidate slots for each day in the requested range.
    ///
    /// Deterministic for a fixed store state and clock: repeated calls with no
    /// intervening writes return identical output. "No slots" is an empty
    /// list, never an error; per-slot problems degrade that slot to
    /// unavailable instead of failing the whole request.
    pub async fn generate_slots(
        &self,
        request: &GenerateSlotsRequest,
        auth_token: &str,
    ) -> Result<Vec<AvailableSlot>, BookingError> {
        debug!(
            "Generating slots for lawyer {} from {} to {}",
            request.lawyer_id, request.from_date, request.to_date
        );

        let client_tz = TimezoneName::parse(&request.client_timezone)?.resolve();

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
        let buffer = policy.buffer_time_minutes;
        let slot_span = request.duration_minutes + buffer;

        let appointments = self
            .get_active_appointments_in_range(
                request.lawyer_id,
                request.from_date.and_time(chrono::NaiveTime::MIN).and_utc() - Duration::days(1),
                request.to_date.and_time(chrono::NaiveTime::MIN).and_utc() + Duration::days(2),
                auth_token,
            )
            .await?;

        let unavailability = self
            .schedule_service
            .get_unavailability_for_range(
                request.lawyer_id,
                request.from_date - Duration::days(1),
                request.to_date + Duration::days(1),
                auth_token,
            )
            .await?;

        let min_start = now + Duration::hours(policy.min_advance_hours);
        let horizon = now + Duration::days(policy.max_advance_days);

        let mut slots = Vec::new();
        let mut date = request.from_date;

        while date <= request.to_date {
            let day_of_week = shared_utils::time::day_of_week_index(date);
            let templates = self
                .schedule_service
                .get_templates_for_weekday(request.lawyer_id, day_of_week, auth_token)
                .await?;

            'templates: for template in &templates {
                let window_start = match local_to_utc(date, template.start_time, lawyer_tz) {
                    Ok(ts) => ts,
                    Err(e) => {
                        warn!("Skipping template {} on {}: {}", template.id, date, e);
                        continue;
                    }
                };
                let window_end = match local_to_utc(date, template.end_time, lawyer_tz) {
                    Ok(ts) => ts,
                    Err(e) => {
                        warn!("Skipping template {} on {}: {}", template.id, date, e);
                        continue;
                    }
                };

                let mut current = window_start;
                while current + Duration::minutes(slot_span) <= window_end {
                    let candidate = current;
                    current += Duration::minutes(self.granularity_minutes);

                    if candidate > horizon {
                        // Everything later this day is past the max-advance
                        // window too.
                        break 'templates;
                    }

                    if candidate < min_start {
                        // Same-day bookings are still offered (with the fee)
                        // when the policy allows them.
                        if !(policy.allow_same_day_booking && candidate > now) {
                            continue;
                        }
                    }

                    let slot_end = candidate + Duration::minutes(request.duration_minutes);
                    let buffered_end = slot_end + Duration::minutes(buffer);

                    let unavailable_reason = self.find_collision(
                        candidate,
                        buffered_end,
                        date,
                        lawyer_tz,
                        &appointments,
                        &unavailability,
                    );

                    let is_available = unavailable_reason.is_none();
                    if !is_available && !request.include_unavailable {
                        continue;
                    }

                    let quote = quote_slot(&PricingInput {
                        start_utc: candidate,
                        duration_minutes: request.duration_minutes,
                        consultation_type: request.consultation_type,
                        hourly_rate: lawyer.hourly_rate,
                        policy: &policy,
                        is_emergency: request.is_emergency,
                        lawyer_tz,
                        now,
                    });

                    slots.push(AvailableSlot {
                        start_time: candidate,
                        end_time: slot_end,
                        local_start: utc_to_local(candidate, client_tz).to_rfc3339(),
                        local_end: utc_to_local(slot_end, client_tz).to_rfc3339(),
                        duration_minutes: request.duration_minutes,
                        consultation_type: request.consultation_type,
                        base_price: quote.base_price,
                        total_price: quote.total_price,
                        price_modifiers: quote.modifiers,
                        is_available,
                        unavailable_reason,
                        buffer_minutes: buffer,
                    });
                }
            }

            date += Duration::days(1);
        }

        slots.sort_by(|a, b| a.start_time.cmp(&b.start_time));

        debug!("Generated {} slots", slots.len());
        Ok(slots)
    }

    /// Reason the buffered candidate interval is not bookable, if any.
    fn find_collision(
        &self,
        buffered_start: DateTime<Utc>,
        buffered_end: DateTime<Utc>,
        date: chrono::NaiveDate,
        lawyer_tz: chrono_tz::Tz,
        appointments: &[Appointment],
        unavailability: &[UnavailabilityPeriod],
    ) -> Option<String> {
        for apt in appointments {
            if intervals_overlap(
                buffered_start,
                buffered_end,
                apt.buffered_start(),
                apt.buffered_end(),
            ) {
                return Some("Conflicts with an existing appointment".to_string());
            }
        }

        for period in unavailability {
            if !period.covers_date(date) {
                continue;
            }

            if period.is_all_day() {
                return Some(
                    period
                        .reason
                        .clone()
                        .unwrap_or_else(|| "Lawyer unavailable".to_string()),
                );
            }

            // Time-bound period: build the blocked UTC interval for this day.
            let (Some(p_start), Some(p_end)) = (period.start_time, period.end_time) else {
                continue;
            };
            let (Ok(blocked_start), Ok(blocked_end)) = (
                local_to_utc(date, p_start, lawyer_tz),
                local_to_utc(date, p_end, lawyer_tz),
            ) else {
                // A DST gap inside the blocked window: be conservative and
                // treat the slot as unavailable.
                return Some(
                    period
                        .reason
                        .clone()
                        .unwrap_or_else(|| "Lawyer unavailable".to_string()),
                );
            };

            if intervals_overlap(buffered_start, buffered_end, blocked_start, blocked_end) {
                return Some(
                    period
                        .reason
                        .clone()
                        .unwrap_or_else(|| "Lawyer unavailable".to_string()),
                );
            }
        }

        None
    }

    async fn get_active_appointments_in_range(
        &self,
        lawyer_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, BookingError> {
        let widened_start = start - Duration::minutes(MAX_APPOINTMENT_BUFFER_MINUTES);
        let widened_end = end + Duration::minutes(MAX_APPOINTMENT_BUFFER_MINUTES);

        let query_parts = vec![
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

        Ok(appointments)
    }
}
