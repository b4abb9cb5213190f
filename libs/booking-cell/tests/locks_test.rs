use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use booking_cell::models::{BookingError, ConsultationType};
use booking_cell::services::locks::ReservationLockService;
use shared_utils::clock::FixedClock;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

fn fixed_now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0).unwrap()
}

async fn mount_purge_mock(mock_server: &MockServer) {
    // Amortized cleanup PATCH targets expired rows by lawyer.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/reservation_locks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_acquire_on_free_interval_creates_lock() {
    let mock_server = MockServer::start().await;
    let lawyer_id = Uuid::new_v4();
    let holder_id = Uuid::new_v4();
    let start = fixed_now() + Duration::days(2);
    let end = start + Duration::hours(1);

    mount_purge_mock(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/reservation_locks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/reservation_locks"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::lock_row(
                lawyer_id,
                holder_id,
                start,
                end,
                fixed_now() + Duration::minutes(10),
            )
        ])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_url(&mock_server.uri());
    let service =
        ReservationLockService::with_clock(&config, Arc::new(FixedClock(fixed_now())));

    let lock = service
        .acquire(
            lawyer_id,
            start,
            end,
            ConsultationType::Video,
            holder_id,
            "test-token",
        )
        .await
        .unwrap();

    assert_eq!(lock.holder_id, holder_id);
    assert_eq!(lock.expires_at, fixed_now() + Duration::minutes(10));
    assert!(lock.is_active);
}

#[tokio::test]
async fn test_acquire_rejected_while_another_holder_is_live() {
    let mock_server = MockServer::start().await;
    let lawyer_id = Uuid::new_v4();
    let start = fixed_now() + Duration::days(2);
    let end = start + Duration::hours(1);
    let other_expiry = fixed_now() + Duration::minutes(7);

    mount_purge_mock(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/reservation_locks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::lock_row(
                lawyer_id,
                Uuid::new_v4(),
                start,
                end,
                other_expiry,
            )
        ])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_url(&mock_server.uri());
    let service =
        ReservationLockService::with_clock(&config, Arc::new(FixedClock(fixed_now())));

    let err = service
        .acquire(
            lawyer_id,
            start,
            end,
            ConsultationType::Video,
            Uuid::new_v4(),
            "test-token",
        )
        .await
        .unwrap_err();

    match err {
        BookingError::SlotLocked { expires_at } => assert_eq!(expires_at, other_expiry),
        other => panic!("Expected SlotLocked, got {:?}", other),
    }
}

#[tokio::test]
async fn test_acquire_after_expiry_succeeds() {
    let mock_server = MockServer::start().await;
    let lawyer_id = Uuid::new_v4();
    let holder_id = Uuid::new_v4();
    let start = fixed_now() + Duration::days(2);
    let end = start + Duration::hours(1);

    mount_purge_mock(&mock_server).await;
    // The competing lock expired a minute ago; it no longer blocks.
    Mock::given(method("GET"))
        .and(path("/rest/v1/reservation_locks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::lock_row(
                lawyer_id,
                Uuid::new_v4(),
                start,
                end,
                fixed_now() - Duration::minutes(1),
            )
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/reservation_locks"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::lock_row(
                lawyer_id,
                holder_id,
                start,
                end,
                fixed_now() + Duration::minutes(10),
            )
        ])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_url(&mock_server.uri());
    let service =
        ReservationLockService::with_clock(&config, Arc::new(FixedClock(fixed_now())));

    let lock = service
        .acquire(
            lawyer_id,
            start,
            end,
            ConsultationType::Video,
            holder_id,
            "test-token",
        )
        .await
        .unwrap();
    assert_eq!(lock.holder_id, holder_id);
}

#[tokio::test]
async fn test_same_holder_reacquire_refreshes_ttl() {
    let mock_server = MockServer::start().await;
    let lawyer_id = Uuid::new_v4();
    let holder_id = Uuid::new_v4();
    let start = fixed_now() + Duration::days(2);
    let end = start + Duration::hours(1);

    let existing = MockSupabaseResponses::lock_row(
        lawyer_id,
        holder_id,
        start,
        end,
        fixed_now() + Duration::minutes(3),
    );
    let lock_id = existing["id"].as_str().unwrap().to_string();
    let refreshed_expiry = fixed_now() + Duration::minutes(10);
    let mut refreshed = existing.clone();
    refreshed["expires_at"] = json!(refreshed_expiry.to_rfc3339());

    // The refresh PATCH targets the lock by id; the purge PATCH targets by
    // lawyer, so the id matcher keeps them apart.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/reservation_locks"))
        .and(query_param("id", format!("eq.{}", lock_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([refreshed])))
        .mount(&mock_server)
        .await;
    mount_purge_mock(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/reservation_locks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([existing])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_url(&mock_server.uri());
    let service =
        ReservationLockService::with_clock(&config, Arc::new(FixedClock(fixed_now())));

    let lock = service
        .acquire(
            lawyer_id,
            start,
            end,
            ConsultationType::Video,
            holder_id,
            "test-token",
        )
        .await
        .unwrap();

    assert_eq!(lock.holder_id, holder_id);
    assert_eq!(lock.expires_at, refreshed_expiry);
}

#[tokio::test]
async fn test_release_is_idempotent() {
    let mock_server = MockServer::start().await;

    // No matching active row: release still succeeds.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/reservation_locks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_url(&mock_server.uri());
    let service =
        ReservationLockService::with_clock(&config, Arc::new(FixedClock(fixed_now())));

    service.release(Uuid::new_v4(), "test-token").await.unwrap();
    service.release(Uuid::new_v4(), "test-token").await.unwrap();
}
