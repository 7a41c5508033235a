//! Concurrent advance verifications racing for the last seats of a batch.
//!
//! Run with: `cargo test --test seat_race_test`

use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::task::JoinSet;
use uuid::Uuid;
use yatra_booking::{
    BookingError, BookingRules, BookingService, BookingState, ContactInfo, InMemoryLedger, NewBooking,
    PaymentStage, ProofStatus, ProofUpload,
};
use yatra_catalog::{Batch, BatchRepository, PricingConfig, Trip};
use yatra_core::{Actor, AuditFilter, AuditRepository, LogNotificationSink, Role};
use yatra_shared::Masked;

async fn setup(batch_size: u32, seats_booked: u32) -> (Arc<BookingService>, Arc<InMemoryLedger>, Batch) {
    let (service, ledger) = BookingService::in_memory(
        Arc::new(LogNotificationSink),
        BookingRules::default(),
        PricingConfig::default(),
    );
    let trip = Trip::new("Chadar Trek", 24_000, batch_size);
    ledger.save_trip(&trip).await.unwrap();

    let start = Utc::now() + Duration::days(21);
    let batch = service
        .inventory()
        .create_batch(trip.id, start, start + Duration::days(8), None)
        .await
        .unwrap();
    let batch = ledger.set_seats_booked(batch.id, seats_booked).await.unwrap();
    (Arc::new(service), ledger, batch)
}

/// Create `n` single-traveller bookings with uploaded advance proofs.
async fn pending_bookings(service: &BookingService, batch: &Batch, n: usize) -> Vec<Uuid> {
    let mut ids = Vec::with_capacity(n);
    for i in 0..n {
        let actor = Actor::new(format!("traveller-{}", i), Role::Traveller);
        let request = NewBooking {
            trip_id: batch.trip_id,
            batch_id: Some(batch.id),
            traveller_count: 1,
            total_amount: 24_000,
            pickup_location: None,
            contact: ContactInfo {
                name: format!("Traveller {}", i),
                phone: Masked::new(format!("98000000{:02}", i)),
                email: None,
            },
        };
        let booking = service.create_booking(request, &actor).await.unwrap();
        let upload = ProofUpload {
            stage: PaymentStage::Advance,
            asset_reference: format!("uploads/advance-{}.png", i),
            claimed_amount: Some(4_800),
            transaction_note: None,
        };
        service.upload_proof(booking.id, upload, &actor).await.unwrap();
        ids.push(booking.id);
    }
    ids
}

async fn verify_all(service: Arc<BookingService>, ids: &[Uuid]) -> (usize, usize) {
    let mut set = JoinSet::new();
    for (i, id) in ids.iter().copied().enumerate() {
        let service = service.clone();
        set.spawn(async move {
            let staff = Actor::new(format!("staff-{}", i % 3), Role::Staff);
            service.verify(id, PaymentStage::Advance, None, &staff).await
        });
    }

    let (mut confirmed, mut sold_out) = (0, 0);
    while let Some(joined) = set.join_next().await {
        match joined.unwrap() {
            Ok(_) => confirmed += 1,
            Err(BookingError::SeatsUnavailable { .. }) => sold_out += 1,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    (confirmed, sold_out)
}

/// Scenario A: one seat left, two verifications; exactly one wins.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_last_seat_goes_to_exactly_one_booking() {
    let (service, ledger, batch) = setup(10, 9).await;
    let ids = pending_bookings(&service, &batch, 2).await;

    let (confirmed, sold_out) = verify_all(service.clone(), &ids).await;
    assert_eq!((confirmed, sold_out), (1, 1));

    let batch = ledger.get_batch(batch.id).await.unwrap().unwrap();
    assert_eq!(batch.seats_booked, 10);
    assert_eq!(batch.available_seats, Some(0));

    // The loser is untouched: still waiting on review, no money or audit rows.
    let staff = Actor::new("staff-0", Role::Staff);
    let mut losers = 0;
    for id in ids {
        let booking = service.get_booking(id, &staff).await.unwrap();
        if booking.state == BookingState::Initiated {
            losers += 1;
            assert_eq!(booking.advance_proof.status, ProofStatus::Uploaded);
            assert!(service.payments_for(id).await.unwrap().is_empty());
            let trail = ledger
                .list(&AuditFilter {
                    entity_type: None,
                    entity_id: Some(id),
                })
                .await
                .unwrap();
            assert!(trail.is_empty());
        }
    }
    assert_eq!(losers, 1);
}

/// N simultaneous verifications against K remaining seats yield exactly K
/// confirmations.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_n_racers_for_k_seats() {
    let (service, ledger, batch) = setup(20, 15).await;
    let ids = pending_bookings(&service, &batch, 12).await;

    let (confirmed, sold_out) = verify_all(service.clone(), &ids).await;
    assert_eq!(confirmed, 5);
    assert_eq!(sold_out, 7);

    let batch = ledger.get_batch(batch.id).await.unwrap().unwrap();
    assert_eq!(batch.seats_booked, 20);
    assert!(batch.seats_booked <= batch.batch_size);
    assert_eq!(batch.available_seats, Some(0));
}

/// The same booking verified from several staff sessions at once is
/// credited and seated exactly once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_verifications_settle_once() {
    let (service, ledger, batch) = setup(10, 0).await;
    let id = pending_bookings(&service, &batch, 1).await[0];

    let mut set = JoinSet::new();
    for i in 0..6 {
        let service = service.clone();
        set.spawn(async move {
            let staff = Actor::new(format!("staff-{}", i), Role::Staff);
            service.verify(id, PaymentStage::Advance, None, &staff).await
        });
    }

    let mut ok = 0;
    while let Some(joined) = set.join_next().await {
        match joined.unwrap() {
            Ok(_) => ok += 1,
            Err(BookingError::AlreadySettled { .. }) | Err(BookingError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    assert_eq!(ok, 1);

    assert_eq!(ledger.get_batch(batch.id).await.unwrap().unwrap().seats_booked, 1);
    assert_eq!(service.payments_for(id).await.unwrap().len(), 1);
}
