use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_utils::clock::{system_clock, Clock};
use shared_utils::time::intervals_overlap;

use crate::models::{BookingError, ConsultationType, ReservationLock};

fn representation_headers() -> reqwest::header::HeaderMap {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        "Prefer",
        reqwest::header::HeaderValue::from_static("return=representation"),
    );
    headers
}

/// Short-TTL reservation locks over (lawyer, consultation type) intervals.
///
/// The lock is a user-experience device, not the correctness mechanism: the
/// commit path re-validates and the store's exclusion constraint has the last
/// word. A crashed holder therefore costs at most one TTL of slot visibility.
pub struct ReservationLockService {
    supabase: Arc<SupabaseClient>,
    clock: Arc<dyn Clock>,
    ttl_minutes: i64,
}

impl ReservationLockService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    pub fn with_clock(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            clock,
            ttl_minutes: config.lock_ttl_minutes,
        }
    }

    /// Acquire a lock on `[start_time, end_time)` for `holder_id`.
    ///
    /// Expired locks for the lawyer are purged first, so acquisition also
    /// amortizes cleanup. If the same holder already locks an overlapping
    /// interval the existing lock is refreshed to a full TTL and returned,
    /// which makes retries idempotent. A live lock held by anyone else yields
    /// `SlotLocked` with its expiry.
    #[instrument(skip(self, auth_token))]
    pub async fn acquire(
        &self,
        lawyer_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        consultation_type: ConsultationType,
        holder_id: Uuid,
        auth_token: &str,
    ) -> Result<ReservationLock, BookingError> {
        let now = self.clock.now();

        self.purge_expired(lawyer_id, now, auth_token).await?;

        let existing = self
            .get_active_locks(lawyer_id, consultation_type, auth_token)
            .await?;

        for lock in existing {
            if lock.is_expired(now)
                || !intervals_overlap(start_time, end_time, lock.start_time, lock.end_time)
            {
                continue;
            }

            if lock.holder_id == holder_id {
                return self.refresh(lock, now, auth_token).await;
            }

            debug!(
                "Slot for lawyer {} at {} held by another client until {}",
                lawyer_id, start_time, lock.expires_at
            );
            return Err(BookingError::SlotLocked {
                expires_at: lock.expires_at,
            });
        }

        let expires_at = now + Duration::minutes(self.ttl_minutes);
        let body = json!({
            "lawyer_id": lawyer_id,
            "start_time": start_time.to_rfc3339(),
            "end_time": end_time.to_rfc3339(),
            "consultation_type": consultation_type,
            "holder_id": holder_id,
            "expires_at": expires_at.to_rfc3339(),
            "is_active": true,
            "created_at": now.to_rfc3339(),
        });

        let created: Vec<ReservationLock> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/reservation_locks",
                Some(auth_token),
                Some(body),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        let lock = created
            .into_iter()
            .next()
            .ok_or_else(|| BookingError::DatabaseError("Lock insert returned no row".to_string()))?;

        info!(
            event = "slot_locked",
            lock_id = %lock.id,
            lawyer_id = %lawyer_id,
            holder_id = %holder_id,
            expires_at = %lock.expires_at,
            "Reservation lock acquired"
        );

        Ok(lock)
    }

    /// Release a lock. Idempotent: releasing a lock that is already gone or
    /// inactive only logs a warning.
    pub async fn release(&self, lock_id: Uuid, auth_token: &str) -> Result<(), BookingError> {
        let path = format!(
            "/rest/v1/reservation_locks?id=eq.{}&is_active=eq.true",
            lock_id
        );
        let body = json!({ "is_active": false });

        let updated: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(body),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        if updated.is_empty() {
            warn!("Release of lock {} matched no active row", lock_id);
        } else {
            debug!("Released reservation lock {}", lock_id);
        }

        Ok(())
    }

    /// Fetch the lock a commit wants to consume, if it is still live and held
    /// by `holder_id`.
    pub async fn get_live_lock(
        &self,
        lock_id: Uuid,
        holder_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<ReservationLock>, BookingError> {
        let path = format!(
            "/rest/v1/reservation_locks?id=eq.{}&is_active=eq.true",
            lock_id
        );

        let result: Vec<ReservationLock> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        let now = self.clock.now();
        Ok(result
            .into_iter()
            .find(|lock| lock.holder_id == holder_id && !lock.is_expired(now)))
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn refresh(
        &self,
        lock: ReservationLock,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<ReservationLock, BookingError> {
        let expires_at = now + Duration::minutes(self.ttl_minutes);
        let path = format!("/rest/v1/reservation_locks?id=eq.{}", lock.id);
        let body = json!({ "expires_at": expires_at.to_rfc3339() });

        let updated: Vec<ReservationLock> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(body),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        debug!("Refreshed reservation lock {} to {}", lock.id, expires_at);

        Ok(updated.into_iter().next().unwrap_or(ReservationLock {
            expires_at,
            ..lock
        }))
    }

    /// Deactivate every expired lock for the lawyer in one PATCH.
    async fn purge_expired(
        &self,
        lawyer_id: Uuid,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<(), BookingError> {
        let path = format!(
            "/rest/v1/reservation_locks?lawyer_id=eq.{}&is_active=eq.true&expires_at=lt.{}",
            lawyer_id,
            urlencoding::encode(&now.to_rfc3339())
        );
        let body = json!({ "is_active": false });

        let purged: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(body),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        if !purged.is_empty() {
            debug!("Purged {} expired locks for lawyer {}", purged.len(), lawyer_id);
        }

        Ok(())
    }

    async fn get_active_locks(
        &self,
        lawyer_id: Uuid,
        consultation_type: ConsultationType,
        auth_token: &str,
    ) -> Result<Vec<ReservationLock>, BookingError> {
        let path = format!(
            "/rest/v1/reservation_locks?lawyer_id=eq.{}&consultation_type=eq.{}&is_active=eq.true&order=created_at.asc",
            lawyer_id, consultation_type
        );

        let result: Vec<ReservationLock> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        Ok(result)
    }
}
