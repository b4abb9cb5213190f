//! Fixtures shared by integration tests across cells. Not compiled into
//! production binaries; cells pull it in as a regular dependency of their
//! test targets.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub lock_ttl_minutes: i64,
    pub slot_granularity_minutes: i64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            lock_ttl_minutes: 10,
            slot_granularity_minutes: 15,
        }
    }
}

impl TestConfig {
    pub fn with_url(url: &str) -> AppConfig {
        let base = Self::default();
        AppConfig {
            supabase_url: url.to_string(),
            supabase_anon_key: base.supabase_anon_key,
            lock_ttl_minutes: base.lock_ttl_minutes,
            slot_granularity_minutes: base.slot_granularity_minutes,
        }
    }
}

/// Canned PostgREST rows for the tables the booking flow touches.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn lawyer_row(id: Uuid, timezone: &str, hourly_rate: f64) -> Value {
        json!({
            "id": id,
            "first_name": "Ada",
            "last_name": "Counsel",
            "timezone": timezone,
            "hourly_rate": hourly_rate,
            "is_verified": true,
            "is_active": true,
            "specialization": "contract_law",
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn unverified_lawyer_row(id: Uuid) -> Value {
        let mut row = Self::lawyer_row(id, "UTC", 100.0);
        row["is_verified"] = json!(false);
        row
    }

    pub fn policy_row(lawyer_id: Uuid) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "lawyer_id": lawyer_id,
            "min_advance_hours": 24,
            "max_advance_days": 30,
            "allow_same_day_booking": false,
            "same_day_booking_fee": 0.0,
            "buffer_time_minutes": 15,
            "min_consultation_duration": 30,
            "max_consultation_duration": 120,
            "free_cancellation_hours": 24,
            "max_bookings_per_client_per_day": 3,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn template_row(lawyer_id: Uuid, day_of_week: i32, start: &str, end: &str) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "lawyer_id": lawyer_id,
            "day_of_week": day_of_week,
            "start_time": start,
            "end_time": end,
            "is_active": true,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn appointment_row(
        lawyer_id: Uuid,
        client_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        buffer_minutes: i64,
    ) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "lawyer_id": lawyer_id,
            "client_id": client_id,
            "scheduled_start_time": start.to_rfc3339(),
            "scheduled_end_time": end.to_rfc3339(),
            "consultation_type": "video",
            "duration_minutes": (end - start).num_minutes(),
            "status": "confirmed",
            "buffer_before_minutes": buffer_minutes,
            "buffer_after_minutes": buffer_minutes,
            "base_amount": 100.0,
            "total_amount": 100.0,
            "client_timezone": "UTC",
            "lawyer_timezone": "UTC",
            "notes": null,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn lock_row(
        lawyer_id: Uuid,
        holder_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "lawyer_id": lawyer_id,
            "start_time": start.to_rfc3339(),
            "end_time": end.to_rfc3339(),
            "consultation_type": "video",
            "holder_id": holder_id,
            "expires_at": expires_at.to_rfc3339(),
            "is_active": true,
            "created_at": "2025-01-01T00:00:00Z"
        })
    }
}
