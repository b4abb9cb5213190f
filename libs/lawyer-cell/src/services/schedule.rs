use std::sync::Arc;

use chrono::NaiveDate;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;
use shared_utils::clock::Clock;

use crate::models::{AvailabilityTemplate, CreateTemplateRequest, LawyerError, UnavailabilityPeriod};

/// Read side of the lawyer's weekly availability and unavailability records,
/// plus template creation with overlap rejection.
pub struct ScheduleService {
    supabase: Arc<SupabaseClient>,
    clock: Arc<dyn Clock>,
}

impl ScheduleService {
    pub fn new(supabase: Arc<SupabaseClient>, clock: Arc<dyn Clock>) -> Self {
        Self { supabase, clock }
    }

    /// Create a weekly availability template for a lawyer.
    pub async fn create_template(
        &self,
        lawyer_id: Uuid,
        request: CreateTemplateRequest,
        auth_token: &str,
    ) -> Result<AvailabilityTemplate, LawyerError> {
        debug!("Creating availability template for lawyer: {}", lawyer_id);

        if request.start_time >= request.end_time {
            return Err(LawyerError::ValidationError(
                "Start time must be before end time".to_string(),
            ));
        }

        if request.day_of_week < 0 || request.day_of_week > 6 {
            return Err(LawyerError::ValidationError(
                "Day of week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
            ));
        }

        self.check_template_conflicts(lawyer_id, &request, auth_token)
            .await?;

        let now = self.clock.now();
        let template_data = json!({
            "lawyer_id": lawyer_id,
            "day_of_week": request.day_of_week,
            "start_time": request.start_time.format("%H:%M:%S").to_string(),
            "end_time": request.end_time.format("%H:%M:%S").to_string(),
            "is_active": true,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
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
                "/rest/v1/availability_templates",
                Some(auth_token),
                Some(template_data),
                Some(headers),
            )
            .await
            .map_err(|e| LawyerError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(LawyerError::DatabaseError(
                "Failed to create availability template".to_string(),
            ));
        }

        let template: AvailabilityTemplate = serde_json::from_value(result[0].clone())
            .map_err(|e| LawyerError::DatabaseError(format!("Failed to parse template: {}", e)))?;

        debug!("Availability template created with ID: {}", template.id);
        Ok(template)
    }

    /// Deactivate a template. Slots are no longer generated from it.
    pub async fn deactivate_template(
        &self,
        template_id: Uuid,
        auth_token: &str,
    ) -> Result<(), LawyerError> {
        debug!("Deactivating availability template: {}", template_id);

        let path = format!("/rest/v1/availability_templates?id=eq.{}", template_id);
        let update = json!({
            "is_active": false,
            "updated_at": self.clock.now().to_rfc3339()
        });

        let _: Vec<Value> = self
            .supabase
            .request(Method::PATCH, &path, Some(auth_token), Some(update))
            .await
            .map_err(|e| LawyerError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    /// Active templates for a given weekday (0 = Sunday), ordered by start.
    pub async fn get_templates_for_weekday(
        &self,
        lawyer_id: Uuid,
        day_of_week: i32,
        auth_token: &str,
    ) -> Result<Vec<AvailabilityTemplate>, LawyerError> {
        let path = format!(
            "/rest/v1/availability_templates?lawyer_id=eq.{}&day_of_week=eq.{}&is_active=eq.true&order=start_time.asc",
            lawyer_id, day_of_week
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| LawyerError::DatabaseError(e.to_string()))?;

        let templates: Vec<AvailabilityTemplate> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<AvailabilityTemplate>, _>>()
            .map_err(|e| LawyerError::DatabaseError(format!("Failed to parse templates: {}", e)))?;

        Ok(templates)
    }

    /// Unavailability periods intersecting `[from_date, to_date]`.
    pub async fn get_unavailability_for_range(
        &self,
        lawyer_id: Uuid,
        from_date: NaiveDate,
        to_date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<UnavailabilityPeriod>, LawyerError> {
        let path = format!(
            "/rest/v1/unavailability_periods?lawyer_id=eq.{}&start_date=lte.{}&end_date=gte.{}&order=start_date.asc",
            lawyer_id, to_date, from_date
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| LawyerError::DatabaseError(e.to_string()))?;

        let periods: Vec<UnavailabilityPeriod> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<UnavailabilityPeriod>, _>>()
            .map_err(|e| LawyerError::DatabaseError(format!("Failed to parse periods: {}", e)))?;

        Ok(periods)
    }

    async fn check_template_conflicts(
        &self,
        lawyer_id: Uuid,
        request: &CreateTemplateRequest,
        auth_token: &str,
    ) -> Result<(), LawyerError> {
        let existing = self
            .get_templates_for_weekday(lawyer_id, request.day_of_week, auth_token)
            .await?;

        for template in existing {
            if request.start_time < template.end_time && template.start_time < request.end_time {
                return Err(LawyerError::ScheduleConflict);
            }
        }

        Ok(())
    }
}
