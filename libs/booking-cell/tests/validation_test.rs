use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use booking_cell::models::{BookingRequest, ConflictDetail, ConsultationType};
use booking_cell::services::validation::BookingValidationService;
use shared_utils::clock::FixedClock;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

fn fixed_now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0).unwrap()
}

fn booking_request(lawyer_id: Uuid, start: chrono::DateTime<Utc>) -> BookingRequest {
    BookingRequest {
        lawyer_id,
        client_id: Uuid::new_v4(),
        start_time: start,
        end_time: start + Duration::hours(1),
        consultation_type: ConsultationType::Video,
        duration_minutes: 60,
        client_timezone: "UTC".to_string(),
        is_emergency: false,
        notes: None,
    }
}

async fn mount_lawyer_and_policy(mock_server: &MockServer, lawyer_id: Uuid) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/lawyers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::lawyer_row(lawyer_id, "UTC", 100.0)
        ])))
        .mount(mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/booking_policies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::policy_row(lawyer_id)
        ])))
        .mount(mock_server)
        .await;
}

async fn mount_empty_calendar(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/unavailability_periods"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_templates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_unverified_lawyer_fails_first_stage() {
    let mock_server = MockServer::start().await;
    let lawyer_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/lawyers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::unverified_lawyer_row(lawyer_id)
        ])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_url(&mock_server.uri());
    let service =
        BookingValidationService::with_clock(&config, Arc::new(FixedClock(fixed_now())));

    let outcome = service
        .validate(
            &booking_request(lawyer_id, fixed_now() + Duration::days(2)),
            None,
            "test-token",
        )
        .await
        .unwrap();

    assert!(!outcome.is_valid);
    assert!(outcome.errors.iter().any(|e| e.contains("not verified")));
}

#[tokio::test]
async fn test_duration_bounds_accumulate_within_stage() {
    let mock_server = MockServer::start().await;
    let lawyer_id = Uuid::new_v4();
    mount_lawyer_and_policy(&mock_server, lawyer_id).await;

    let config = TestConfig::with_url(&mock_server.uri());
    let service =
        BookingValidationService::with_clock(&config, Arc::new(FixedClock(fixed_now())));

    // 20 minutes: below the 30-minute minimum and off the 15-minute grid.
    let start = fixed_now() + Duration::days(2);
    let mut request = booking_request(lawyer_id, start);
    request.duration_minutes = 20;
    request.end_time = start + Duration::minutes(20);

    let outcome = service.validate(&request, None, "test-token").await.unwrap();

    assert!(!outcome.is_valid);
    assert_eq!(outcome.errors.len(), 2);
}

#[tokio::test]
async fn test_start_exactly_at_minimum_advance_is_accepted() {
    let mock_server = MockServer::start().await;
    let lawyer_id = Uuid::new_v4();
    mount_lawyer_and_policy(&mock_server, lawyer_id).await;
    mount_empty_calendar(&mock_server).await;

    let config = TestConfig::with_url(&mock_server.uri());
    let service =
        BookingValidationService::with_clock(&config, Arc::new(FixedClock(fixed_now())));

    // Policy requires 24 hours notice; exactly 24 hours out must pass.
    let outcome = service
        .validate(
            &booking_request(lawyer_id, fixed_now() + Duration::hours(24)),
            None,
            "test-token",
        )
        .await
        .unwrap();

    assert!(outcome.is_valid, "errors: {:?}", outcome.errors);
    assert!(outcome.errors.is_empty());
}

#[tokio::test]
async fn test_too_short_notice_is_rejected_without_same_day_permission() {
    let mock_server = MockServer::start().await;
    let lawyer_id = Uuid::new_v4();
    mount_lawyer_and_policy(&mock_server, lawyer_id).await;

    let config = TestConfig::with_url(&mock_server.uri());
    let service =
        BookingValidationService::with_clock(&config, Arc::new(FixedClock(fixed_now())));

    let outcome = service
        .validate(
            &booking_request(lawyer_id, fixed_now() + Duration::hours(23)),
            None,
            "test-token",
        )
        .await
        .unwrap();

    assert!(!outcome.is_valid);
    assert!(outcome.errors.iter().any(|e| e.contains("24 hours")));
}

#[tokio::test]
async fn test_beyond_max_advance_is_rejected() {
    let mock_server = MockServer::start().await;
    let lawyer_id = Uuid::new_v4();
    mount_lawyer_and_policy(&mock_server, lawyer_id).await;

    let config = TestConfig::with_url(&mock_server.uri());
    let service =
        BookingValidationService::with_clock(&config, Arc::new(FixedClock(fixed_now())));

    let outcome = service
        .validate(
            &booking_request(lawyer_id, fixed_now() + Duration::days(31)),
            None,
            "test-token",
        )
        .await
        .unwrap();

    assert!(!outcome.is_valid);
    assert!(outcome.errors.iter().any(|e| e.contains("30 days")));
}

#[tokio::test]
async fn test_request_at_buffer_boundary_is_accepted() {
    let mock_server = MockServer::start().await;
    let lawyer_id = Uuid::new_v4();
    mount_lawyer_and_policy(&mock_server, lawyer_id).await;

    // Existing appointment ends 10:00 with a 15-minute buffer: the first
    // admissible start is exactly 10:15.
    let apt_start = Utc.with_ymd_and_hms(2025, 6, 4, 9, 0, 0).unwrap();
    let apt_end = Utc.with_ymd_and_hms(2025, 6, 4, 10, 0, 0).unwrap();
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                lawyer_id,
                Uuid::new_v4(),
                apt_start,
                apt_end,
                15,
            )
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/unavailability_periods"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_url(&mock_server.uri());
    let service =
        BookingValidationService::with_clock(&config, Arc::new(FixedClock(fixed_now())));

    let outcome = service
        .validate(
            &booking_request(
                lawyer_id,
                Utc.with_ymd_and_hms(2025, 6, 4, 10, 15, 0).unwrap(),
            ),
            None,
            "test-token",
        )
        .await
        .unwrap();

    assert!(outcome.is_valid, "errors: {:?}", outcome.errors);
    assert!(outcome.conflict.is_none());
}

#[tokio::test]
async fn test_request_inside_buffer_window_is_rejected() {
    let mock_server = MockServer::start().await;
    let lawyer_id = Uuid::new_v4();
    mount_lawyer_and_policy(&mock_server, lawyer_id).await;

    // 10:10 falls inside the 10:00-10:15 buffer tail of the appointment.
    let apt_start = Utc.with_ymd_and_hms(2025, 6, 4, 9, 0, 0).unwrap();
    let apt_end = Utc.with_ymd_and_hms(2025, 6, 4, 10, 0, 0).unwrap();
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                lawyer_id,
                Uuid::new_v4(),
                apt_start,
                apt_end,
                15,
            )
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/unavailability_periods"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_templates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_url(&mock_server.uri());
    let service =
        BookingValidationService::with_clock(&config, Arc::new(FixedClock(fixed_now())));

    let outcome = service
        .validate(
            &booking_request(
                lawyer_id,
                Utc.with_ymd_and_hms(2025, 6, 4, 10, 10, 0).unwrap(),
            ),
            None,
            "test-token",
        )
        .await
        .unwrap();

    assert!(!outcome.is_valid);
    match outcome.conflict {
        Some(ConflictDetail::Appointment {
            start_time,
            end_time,
        }) => {
            assert_eq!(start_time, apt_start);
            assert_eq!(end_time, apt_end);
        }
        other => panic!("Expected appointment conflict, got {:?}", other),
    }
}

#[tokio::test]
async fn test_short_notice_warning_omits_fee_when_fee_is_zero() {
    let mock_server = MockServer::start().await;
    let lawyer_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/lawyers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::lawyer_row(lawyer_id, "UTC", 100.0)
        ])))
        .mount(&mock_server)
        .await;
    // Same-day bookings allowed, but the lawyer charges no fee for them.
    let mut policy = MockSupabaseResponses::policy_row(lawyer_id);
    policy["allow_same_day_booking"] = json!(true);
    Mock::given(method("GET"))
        .and(path("/rest/v1/booking_policies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([policy])))
        .mount(&mock_server)
        .await;
    mount_empty_calendar(&mock_server).await;

    let config = TestConfig::with_url(&mock_server.uri());
    let service =
        BookingValidationService::with_clock(&config, Arc::new(FixedClock(fixed_now())));

    let outcome = service
        .validate(
            &booking_request(lawyer_id, fixed_now() + Duration::hours(2)),
            None,
            "test-token",
        )
        .await
        .unwrap();

    assert!(outcome.is_valid, "errors: {:?}", outcome.errors);
    assert!(outcome.warnings.iter().any(|w| w.contains("hours notice")));
    assert!(outcome.warnings.iter().all(|w| !w.contains("fee")));
}

#[tokio::test]
async fn test_calendar_conflict_carries_detail() {
    let mock_server = MockServer::start().await;
    let lawyer_id = Uuid::new_v4();
    mount_lawyer_and_policy(&mock_server, lawyer_id).await;

    let start = fixed_now() + Duration::days(2);
    let apt_start = start - Duration::minutes(30);
    let apt_end = start + Duration::minutes(30);
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                lawyer_id,
                Uuid::new_v4(),
                apt_start,
                apt_end,
                15,
            )
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/unavailability_periods"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;
    // No templates, so the alternatives search comes back empty.
    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_templates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_url(&mock_server.uri());
    let service =
        BookingValidationService::with_clock(&config, Arc::new(FixedClock(fixed_now())));

    let outcome = service
        .validate(&booking_request(lawyer_id, start), None, "test-token")
        .await
        .unwrap();

    assert!(!outcome.is_valid);
    match outcome.conflict {
        Some(ConflictDetail::Appointment {
            start_time,
            end_time,
        }) => {
            assert_eq!(start_time, apt_start);
            assert_eq!(end_time, apt_end);
        }
        other => panic!("Expected appointment conflict, got {:?}", other),
    }
}
