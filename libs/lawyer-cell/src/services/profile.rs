use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;
use shared_utils::clock::Clock;

use crate::models::{BookingPolicy, LawyerError, LawyerProfile};

pub struct LawyerProfileService {
    supabase: Arc<SupabaseClient>,
    clock: Arc<dyn Clock>,
}

impl LawyerProfileService {
    pub fn new(supabase: Arc<SupabaseClient>, clock: Arc<dyn Clock>) -> Self {
        Self { supabase, clock }
    }

    /// Fetch a lawyer profile by id.
    pub async fn get_lawyer(
        &self,
        lawyer_id: Uuid,
        auth_token: &str,
    ) -> Result<LawyerProfile, LawyerError> {
        debug!("Fetching lawyer profile: {}", lawyer_id);

        let path = format!("/rest/v1/lawyers?id=eq.{}", lawyer_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| LawyerError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(LawyerError::NotFound);
        }

        let lawyer: LawyerProfile = serde_json::from_value(result[0].clone())
            .map_err(|e| LawyerError::DatabaseError(format!("Failed to parse lawyer: {}", e)))?;

        Ok(lawyer)
    }

    /// Fetch the lawyer's booking policy, creating one with defaults on first
    /// use.
    pub async fn get_booking_policy(
        &self,
        lawyer_id: Uuid,
        auth_token: &str,
    ) -> Result<BookingPolicy, LawyerError> {
        debug!("Fetching booking policy for lawyer: {}", lawyer_id);

        let path = format!("/rest/v1/booking_policies?lawyer_id=eq.{}", lawyer_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| LawyerError::DatabaseError(e.to_string()))?;

        if let Some(row) = result.first() {
            let policy: BookingPolicy = serde_json::from_value(row.clone())
                .map_err(|e| LawyerError::DatabaseError(format!("Failed to parse policy: {}", e)))?;
            return Ok(policy);
        }

        self.create_default_policy(lawyer_id, auth_token).await
    }

    async fn create_default_policy(
        &self,
        lawyer_id: Uuid,
        auth_token: &str,
    ) -> Result<BookingPolicy, LawyerError> {
        let now: DateTime<Utc> = self.clock.now();
        let policy = BookingPolicy::default_for(lawyer_id, now);

        let policy_data = json!({
            "id": policy.id,
            "lawyer_id": policy.lawyer_id,
            "min_advance_hours": policy.min_advance_hours,
            "max_advance_days": policy.max_advance_days,
            "allow_same_day_booking": policy.allow_same_day_booking,
            "same_day_booking_fee": policy.same_day_booking_fee,
            "buffer_time_minutes": policy.buffer_time_minutes,
            "min_consultation_duration": policy.min_consultation_duration,
            "max_consultation_duration": policy.max_consultation_duration,
            "free_cancellation_hours": policy.free_cancellation_hours,
            "max_bookings_per_client_per_day": policy.max_bookings_per_client_per_day,
            "created_at": policy.created_at.to_rfc3339(),
            "updated_at": policy.updated_at.to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/booking_policies",
                Some(auth_token),
                Some(policy_data),
                Some(headers),
            )
            .await
            .map_err(|e| LawyerError::DatabaseError(e.to_string()))?;

        let created: BookingPolicy = result
            .first()
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| LawyerError::DatabaseError(format!("Failed to parse policy: {}", e)))?
            .unwrap_or(policy);

        info!("Created default booking policy for lawyer {}", lawyer_id);
        Ok(created)
    }
}
