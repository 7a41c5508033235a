//! The booking state machine.
//!
//! Every state change goes through [`apply`], which validates the event against
//! the current state and returns the next booking plus the seat movement the
//! storage layer must perform in the same commit. Nothing here touches storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BookingError;
use crate::models::{Booking, BookingState, PaymentStage, PaymentStatus, ProofStatus};

#[derive(Debug, Clone, PartialEq)]
pub enum BookingEvent {
    ProofUploaded {
        stage: PaymentStage,
        asset_reference: String,
        claimed_amount: Option<i64>,
        transaction_note: Option<String>,
    },
    ProofVerified {
        stage: PaymentStage,
        amount: Option<i64>,
    },
    ProofRejected {
        stage: PaymentStage,
        reason: String,
    },
    Cancelled {
        reason: String,
    },
    SoftDeleted,
    RefundProcessed,
    Expired,
}

impl BookingEvent {
    pub fn name(&self) -> String {
        match self {
            BookingEvent::ProofUploaded { stage, .. } => format!("{}_proof_uploaded", stage),
            BookingEvent::ProofVerified { stage, .. } => format!("{}_verified", stage),
            BookingEvent::ProofRejected { stage, .. } => format!("{}_rejected", stage),
            BookingEvent::Cancelled { .. } => "cancel".to_string(),
            BookingEvent::SoftDeleted => "soft_delete".to_string(),
            BookingEvent::RefundProcessed => "refund_processed".to_string(),
            BookingEvent::Expired => "expire".to_string(),
        }
    }
}

/// Seat movement bundled with a commit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SeatEffect {
    None,
    Reserve { batch_id: Uuid, seats: u32 },
    Release { batch_id: Uuid, seats: u32 },
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub booking: Booking,
    pub seats: SeatEffect,
    /// Amount credited by a verification.
    pub credited: Option<i64>,
}

fn invalid(booking: &Booking, event: &BookingEvent) -> BookingError {
    BookingError::InvalidTransition {
        from: booking.state.to_string(),
        event: event.name(),
    }
}

fn settled(booking: &Booking, stage: PaymentStage) -> BookingError {
    BookingError::AlreadySettled {
        booking_id: booking.id,
        stage,
    }
}

fn missing(booking: &Booking, stage: PaymentStage) -> BookingError {
    BookingError::MissingProof {
        booking_id: booking.id,
        stage,
    }
}

fn release_held(booking: &mut Booking) -> SeatEffect {
    match booking.batch_id {
        Some(batch_id) if booking.seats_held > 0 => {
            let seats = booking.seats_held;
            booking.seats_held = 0;
            SeatEffect::Release { batch_id, seats }
        }
        _ => SeatEffect::None,
    }
}

fn non_empty(value: &str, what: &str) -> Result<String, BookingError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BookingError::Validation(format!("{} must not be empty", what)));
    }
    Ok(trimmed.to_string())
}

/// Reject amounts no booking of this size could carry.
fn within_total(booking: &Booking, amount: Option<i64>, what: &str) -> Result<(), BookingError> {
    match amount {
        Some(a) if a < 0 => Err(BookingError::Validation(format!("{} must not be negative", what))),
        Some(a) if a > booking.total_amount => Err(BookingError::Validation(format!(
            "{} {} exceeds booking total {}",
            what, a, booking.total_amount
        ))),
        _ => Ok(()),
    }
}

/// Add `value` to one side of the ledger, keeping the combined total representable.
fn credit(paid: i64, other: i64, value: i64) -> Result<i64, BookingError> {
    paid.checked_add(value)
        .filter(|sum| sum.checked_add(other).is_some())
        .ok_or_else(|| BookingError::Validation(format!("credit of {} overflows the amount paid", value)))
}

/// Validate `event` against the booking's current state and compute the next
/// booking. The input is never modified; on error nothing has changed.
pub fn apply(booking: &Booking, event: &BookingEvent, now: DateTime<Utc>) -> Result<Transition, BookingError> {
    // Deleted bookings stay in the ledger; only an outstanding refund may still settle.
    if booking.is_deleted && *event != BookingEvent::RefundProcessed {
        return Err(invalid(booking, event));
    }

    let mut next = booking.clone();
    let mut seats = SeatEffect::None;
    let mut credited = None;

    match event {
        BookingEvent::ProofUploaded {
            stage,
            asset_reference,
            claimed_amount,
            transaction_note,
        } => {
            let reference = non_empty(asset_reference, "asset reference")?;
            within_total(booking, *claimed_amount, "claimed amount")?;

            match (stage, booking.state) {
                (PaymentStage::Advance, BookingState::Initiated) => {}
                (PaymentStage::Advance, BookingState::Confirmed(_)) => {
                    return Err(settled(booking, PaymentStage::Advance))
                }
                (PaymentStage::Balance, BookingState::Confirmed(PaymentStatus::AdvanceVerified))
                | (PaymentStage::Balance, BookingState::Confirmed(PaymentStatus::BalancePending)) => {
                    next.state = BookingState::Confirmed(PaymentStatus::BalancePending);
                }
                (PaymentStage::Balance, BookingState::Confirmed(PaymentStatus::FullyPaid)) => {
                    return Err(settled(booking, PaymentStage::Balance))
                }
                _ => return Err(invalid(booking, event)),
            }

            let proof = next.proof_mut(*stage);
            proof.asset_reference = Some(reference);
            proof.status = ProofStatus::Uploaded;
            proof.claimed_amount = *claimed_amount;
            proof.transaction_note = transaction_note
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string);
            proof.rejection_reason = None;
            proof.uploaded_at = Some(now);
            proof.reviewed_at = None;
        }

        BookingEvent::ProofVerified { stage, amount } => {
            within_total(booking, *amount, "verified amount")?;

            match stage {
                PaymentStage::Advance => {
                    match booking.state {
                        BookingState::Initiated => {}
                        BookingState::Confirmed(PaymentStatus::PendingAdvance) => {}
                        BookingState::Confirmed(_) => return Err(settled(booking, PaymentStage::Advance)),
                        _ => return Err(invalid(booking, event)),
                    }
                    if !booking.advance_proof.awaiting_review() {
                        return Err(missing(booking, PaymentStage::Advance));
                    }

                    let value = amount
                        .or(booking.advance_proof.claimed_amount)
                        .unwrap_or(booking.advance_due);
                    next.advance_paid = credit(booking.advance_paid, booking.balance_paid, value)?;
                    credited = Some(value);

                    // Seats are taken exactly once, on the first advance verification.
                    if let Some(batch_id) = booking.batch_id {
                        if booking.seats_held == 0 {
                            next.seats_held = booking.traveller_count;
                            seats = SeatEffect::Reserve {
                                batch_id,
                                seats: booking.traveller_count,
                            };
                        }
                    }
                    next.state = BookingState::Confirmed(PaymentStatus::AdvanceVerified);
                }
                PaymentStage::Balance => {
                    match booking.state {
                        BookingState::Confirmed(PaymentStatus::FullyPaid) => {
                            return Err(settled(booking, PaymentStage::Balance))
                        }
                        BookingState::Confirmed(PaymentStatus::BalancePending)
                        | BookingState::Confirmed(PaymentStatus::AdvanceVerified) => {}
                        _ => return Err(invalid(booking, event)),
                    }
                    if !booking.balance_proof.awaiting_review() {
                        return Err(missing(booking, PaymentStage::Balance));
                    }

                    let value = amount
                        .or(booking.balance_proof.claimed_amount)
                        .unwrap_or_else(|| booking.balance_due());
                    next.balance_paid = credit(booking.balance_paid, booking.advance_paid, value)?;
                    credited = Some(value);
                    next.state = BookingState::Confirmed(PaymentStatus::FullyPaid);
                }
            }

            let proof = next.proof_mut(*stage);
            proof.status = ProofStatus::Verified;
            proof.rejection_reason = None;
            proof.reviewed_at = Some(now);
        }

        BookingEvent::ProofRejected { stage, reason } => {
            let reason = non_empty(reason, "rejection reason")?;

            match (stage, booking.state) {
                (PaymentStage::Advance, BookingState::Initiated) => {}
                (PaymentStage::Advance, BookingState::Confirmed(_)) => {
                    return Err(settled(booking, PaymentStage::Advance))
                }
                (PaymentStage::Balance, BookingState::Confirmed(PaymentStatus::BalancePending))
                | (PaymentStage::Balance, BookingState::Confirmed(PaymentStatus::AdvanceVerified)) => {
                    next.state = BookingState::Confirmed(PaymentStatus::AdvanceVerified);
                }
                (PaymentStage::Balance, BookingState::Confirmed(PaymentStatus::FullyPaid)) => {
                    return Err(settled(booking, PaymentStage::Balance))
                }
                _ => return Err(invalid(booking, event)),
            }
            if !booking.proof(*stage).awaiting_review() {
                return Err(missing(booking, *stage));
            }

            let proof = next.proof_mut(*stage);
            proof.status = ProofStatus::Rejected;
            proof.rejection_reason = Some(reason);
            proof.reviewed_at = Some(now);
        }

        BookingEvent::Cancelled { reason } => {
            let reason = non_empty(reason, "cancellation reason")?;
            next.state = match booking.state {
                BookingState::Initiated => BookingState::Cancelled(PaymentStatus::PendingAdvance),
                BookingState::Confirmed(p) => BookingState::Cancelled(p),
                _ => return Err(invalid(booking, event)),
            };
            next.cancellation_reason = Some(reason);
            seats = release_held(&mut next);
        }

        BookingEvent::SoftDeleted => {
            next.state = match booking.state {
                BookingState::Initiated => BookingState::Cancelled(PaymentStatus::PendingAdvance),
                BookingState::Confirmed(p) => BookingState::Cancelled(p),
                other => other,
            };
            seats = release_held(&mut next);
            next.is_deleted = true;
        }

        BookingEvent::RefundProcessed => {
            // A second refund on an already refunded booking only touches the refund row.
            next.state = match booking.state {
                BookingState::Cancelled(p) | BookingState::Refunded(p) => BookingState::Refunded(p),
                _ => return Err(invalid(booking, event)),
            };
        }

        BookingEvent::Expired => {
            let no_proof = matches!(
                booking.advance_proof.status,
                ProofStatus::Pending | ProofStatus::Rejected
            );
            if booking.state != BookingState::Initiated || !no_proof {
                return Err(invalid(booking, event));
            }
            next.state = BookingState::Expired;
        }
    }

    next.version = booking.version + 1;
    next.updated_at = now;

    Ok(Transition {
        booking: next,
        seats,
        credited,
    })
}
