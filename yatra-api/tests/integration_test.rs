//! Drives the router in-process over the in-memory ledger.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;
use yatra_api::{app, middleware::issue_token, AppState, AuthConfig, Metrics};
use yatra_booking::{BookingRules, BookingService};
use yatra_catalog::{BatchRepository, PricingConfig, Trip};
use yatra_core::{LogNotificationSink, Role};

const SECRET: &str = "test-secret";

struct TestApp {
    router: Router,
    trip_id: Uuid,
    batch_id: Uuid,
}

async fn test_app(departs_in: Duration) -> TestApp {
    let (service, ledger) = BookingService::in_memory(
        Arc::new(LogNotificationSink),
        BookingRules::default(),
        PricingConfig::default(),
    );
    let trip = Trip::new("Kedarkantha Trek", 12_000, 10).with_origin_price("Dehradun", 13_000);
    ledger.save_trip(&trip).await.unwrap();

    let start = Utc::now() + departs_in;
    let batch = service
        .inventory()
        .create_batch(trip.id, start, start + Duration::days(6), None)
        .await
        .unwrap();

    let state = AppState {
        service: Arc::new(service),
        auth: AuthConfig {
            secret: SECRET.to_string(),
            expiration: 3600,
        },
        metrics: Arc::new(Metrics::new().unwrap()),
    };

    TestApp {
        router: app(state),
        trip_id: trip.id,
        batch_id: batch.id,
    }
}

fn token(subject: &str, role: Role) -> String {
    issue_token(SECRET, subject, role, 3600).unwrap()
}

async fn send(app: &TestApp, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

async fn create_booking(app: &TestApp, traveller: &str) -> Uuid {
    let (status, body) = send(
        app,
        "POST",
        "/v1/bookings",
        Some(traveller),
        Some(json!({
            "trip_id": app.trip_id,
            "batch_id": app.batch_id,
            "traveller_count": 2,
            "total_amount": 24_000,
            "pickup_location": "Dehradun",
            "contact_name": "Arjun",
            "contact_phone": "9811122233",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["booking_status"], "initiated");
    assert_eq!(body["advance_due"], 4_800);
    body["id"].as_str().unwrap().parse().unwrap()
}

async fn upload_advance(app: &TestApp, traveller: &str, booking_id: Uuid) {
    let (status, body) = send(
        app,
        "POST",
        &format!("/v1/bookings/{}/proofs", booking_id),
        Some(traveller),
        Some(json!({
            "stage": "advance",
            "asset_reference": "uploads/advance.jpg",
            "claimed_amount": 4_800,
            "transaction_note": "UPI 4411",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["advance_proof_status"], "uploaded");
}

async fn verify_advance(app: &TestApp, staff: &str, booking_id: Uuid) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        &format!("/v1/admin/bookings/{}/review", booking_id),
        Some(staff),
        Some(json!({ "stage": "advance", "outcome": "verified" })),
    )
    .await
}

#[tokio::test]
async fn test_batches_are_public_and_quoted() {
    let app = test_app(Duration::days(30)).await;

    let (status, body) = send(
        &app,
        "GET",
        &format!("/v1/trips/{}/batches?pickup=dehradun", app.trip_id),
        None,
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let offers = body.as_array().unwrap();
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0]["available_seats"], 10);
    assert_eq!(offers[0]["quote"]["base_price"], 13_000);
}

#[tokio::test]
async fn test_unknown_trip_is_not_found() {
    let app = test_app(Duration::days(30)).await;
    let (status, body) = send(&app, "GET", &format!("/v1/trips/{}/batches", Uuid::new_v4()), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("Trip not found"));
}

#[tokio::test]
async fn test_bookings_require_a_valid_token() {
    let app = test_app(Duration::days(30)).await;
    let body = json!({ "trip_id": app.trip_id });

    let (status, _) = send(&app, "POST", "/v1/bookings", None, Some(body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let forged = issue_token("other-secret", "t-1", Role::Traveller, 3600).unwrap();
    let (status, _) = send(&app, "POST", "/v1/bookings", Some(&forged), Some(body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_advance_verification_confirms_and_counts() {
    let app = test_app(Duration::days(30)).await;
    let traveller = token("traveller-1", Role::Traveller);
    let staff = token("staff-1", Role::Staff);

    let id = create_booking(&app, &traveller).await;
    upload_advance(&app, &traveller, id).await;

    let (status, body) = verify_advance(&app, &staff, id).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["booking_status"], "confirmed");
    assert_eq!(body["payment_status"], "advance_verified");
    assert_eq!(body["advance_paid"], 4_800);
    assert_eq!(body["seats_held"], 2);

    let (_, offers) = send(&app, "GET", &format!("/v1/trips/{}/batches", app.trip_id), None, None).await;
    assert_eq!(offers[0]["available_seats"], 8);

    let (status, metrics) = send(&app, "GET", "/metrics", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(metrics.as_str().unwrap().contains("yatra_payment_reviews_total"));

    // A second verification of the same stage is a conflict.
    let (status, _) = verify_advance(&app, &staff, id).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_review_without_proof_is_unprocessable() {
    let app = test_app(Duration::days(30)).await;
    let traveller = token("traveller-1", Role::Traveller);
    let staff = token("staff-1", Role::Staff);

    let id = create_booking(&app, &traveller).await;
    let (status, _) = verify_advance(&app, &staff, id).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_travellers_cannot_reach_staff_routes() {
    let app = test_app(Duration::days(30)).await;
    let traveller = token("traveller-1", Role::Traveller);

    let id = create_booking(&app, &traveller).await;
    upload_advance(&app, &traveller, id).await;

    let (status, _) = verify_advance(&app, &traveller, id).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, "GET", "/v1/admin/reconciliation", Some(&traveller), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        "GET",
        &format!("/v1/bookings/{}/balance-reminder", id),
        Some(&traveller),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_other_travellers_cannot_read_a_booking() {
    let app = test_app(Duration::days(30)).await;
    let owner = token("traveller-1", Role::Traveller);
    let stranger = token("traveller-2", Role::Traveller);

    let id = create_booking(&app, &owner).await;

    let (status, _) = send(&app, "GET", &format!("/v1/bookings/{}", id), Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "GET", &format!("/v1/bookings/{}", id), Some(&stranger), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_late_cancellation_needs_confirmation_then_refund_once() {
    let app = test_app(Duration::hours(30)).await;
    let traveller = token("traveller-1", Role::Traveller);
    let staff = token("staff-1", Role::Staff);

    let id = create_booking(&app, &traveller).await;
    upload_advance(&app, &traveller, id).await;
    let (status, _) = verify_advance(&app, &staff, id).await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/v1/admin/bookings/{}/cancel", id);
    let (status, body) = send(
        &app,
        "POST",
        &uri,
        Some(&staff),
        Some(json!({ "reason": "Traveller unwell", "refund_amount": 2_400 })),
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert!(body["error"].as_str().unwrap().contains("48h"));

    let (status, body) = send(
        &app,
        "POST",
        &uri,
        Some(&staff),
        Some(json!({ "reason": "Traveller unwell", "refund_amount": 2_400, "confirm_late": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["booking"]["booking_status"], "cancelled");
    assert_eq!(body["booking"]["seats_held"], 0);
    assert_eq!(body["refund"]["status"], "pending");
    let refund_id = body["refund"]["id"].as_str().unwrap().to_string();

    let process = format!("/v1/admin/refunds/{}/process", refund_id);
    let (status, body) = send(&app, "POST", &process, Some(&staff), None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["refund"]["status"], "processed");
    assert_eq!(body["booking"]["booking_status"], "refunded");

    let (status, _) = send(&app, "POST", &process, Some(&staff), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_owner_cancels_through_the_traveller_route() {
    let app = test_app(Duration::days(10)).await;
    let owner = token("traveller-1", Role::Traveller);
    let stranger = token("traveller-2", Role::Traveller);
    let staff = token("staff-1", Role::Staff);

    let id = create_booking(&app, &owner).await;
    upload_advance(&app, &owner, id).await;
    let (status, _) = verify_advance(&app, &staff, id).await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/v1/bookings/{}/cancel", id);
    let request = json!({ "reason": "Exams moved", "refund_amount": 4_800 });

    let (status, _) = send(&app, "POST", &uri, Some(&stranger), Some(request.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, "POST", &uri, Some(&owner), Some(request)).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["booking"]["booking_status"], "cancelled");
    assert_eq!(body["refund"]["amount"], 4_800);
    assert_eq!(body["refund"]["status"], "pending");

    let (_, offers) = send(&app, "GET", &format!("/v1/trips/{}/batches", app.trip_id), None, None).await;
    assert_eq!(offers[0]["available_seats"], 10);
}

#[tokio::test]
async fn test_staff_send_balance_reminder() {
    let app = test_app(Duration::days(30)).await;
    let traveller = token("traveller-1", Role::Traveller);
    let staff = token("staff-1", Role::Staff);

    let id = create_booking(&app, &traveller).await;
    upload_advance(&app, &traveller, id).await;
    let (status, _) = verify_advance(&app, &staff, id).await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/v1/admin/bookings/{}/balance-reminder", id);
    let (status, _) = send(&app, "POST", &uri, Some(&traveller), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, "POST", &uri, Some(&staff), None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["amount_due"], 19_200);
}

#[tokio::test]
async fn test_manual_payment_and_reconciliation_filters() {
    let app = test_app(Duration::days(30)).await;
    let traveller = token("traveller-1", Role::Traveller);
    let staff = token("staff-1", Role::Staff);

    let id = create_booking(&app, &traveller).await;
    let (status, body) = send(
        &app,
        "POST",
        &format!("/v1/admin/bookings/{}/payments", id),
        Some(&staff),
        Some(json!({ "amount": 1_000, "method": "cash", "external_transaction_id": null })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["status"], "recorded");

    let (status, body) = send(&app, "GET", "/v1/admin/reconciliation", Some(&staff), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bookings_checked"], 1);

    let (status, _) = send(&app, "GET", "/v1/admin/reconciliation?kind=bogus", Some(&staff), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_audit_trail_requires_admin() {
    let app = test_app(Duration::days(30)).await;
    let staff = token("staff-1", Role::Staff);
    let admin = token("admin-1", Role::Admin);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/v1/admin/batches/{}/seats", app.batch_id),
        Some(&staff),
        Some(json!({ "seats_booked": 4 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["seats_booked"], 4);

    let uri = format!("/v1/admin/audit?entity_type=batch&entity_id={}", app.batch_id);
    let (status, _) = send(&app, "GET", &uri, Some(&staff), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, "GET", &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["action"], "seats_overridden");
    assert_eq!(entries[0]["actor_id"], "staff-1");
}

#[tokio::test]
async fn test_closed_batch_rejects_new_bookings() {
    let app = test_app(Duration::days(30)).await;
    let traveller = token("traveller-1", Role::Traveller);
    let staff = token("staff-1", Role::Staff);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/v1/admin/batches/{}/status", app.batch_id),
        Some(&staff),
        Some(json!({ "status": "closed" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["status"], "closed");

    let (status, _) = send(
        &app,
        "POST",
        "/v1/bookings",
        Some(&traveller),
        Some(json!({
            "trip_id": app.trip_id,
            "batch_id": app.batch_id,
            "traveller_count": 1,
            "total_amount": 12_000,
            "contact_name": "Arjun",
            "contact_phone": "9811122233",
        })),
    )
    .await;
    assert!(status == StatusCode::CONFLICT || status == StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_tiers() {
    let app = test_app(Duration::days(30)).await;
    let traveller = token("traveller-1", Role::Traveller);
    let staff = token("staff-1", Role::Staff);
    let admin = token("admin-1", Role::Admin);
    let root = token("root-1", Role::SuperAdmin);

    let soft = create_booking(&app, &traveller).await;
    let hard = create_booking(&app, &traveller).await;

    let (status, _) = send(&app, "DELETE", &format!("/v1/admin/bookings/{}", soft), Some(&staff), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, "DELETE", &format!("/v1/admin/bookings/{}", soft), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "GET", &format!("/v1/bookings/{}", soft), Some(&traveller), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let hard_uri = format!("/v1/admin/bookings/{}?hard=true", hard);
    let (status, _) = send(&app, "DELETE", &hard_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = send(&app, "DELETE", &hard_uri, Some(&root), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, _) = send(&app, "GET", &format!("/v1/bookings/{}", hard), Some(&root), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
