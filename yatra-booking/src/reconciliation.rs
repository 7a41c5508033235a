use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::{BookingStatus, Payment, PaymentStatus, Refund, RefundStatus};
use crate::repository::LedgerSnapshot;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    /// Marked fully paid but no payment row exists.
    PaidNoPaymentRecord,
    /// Fully paid, but the payment rows do not sum to the total.
    AmountMismatch,
    /// A processed refund exists while the booking is not refunded.
    RefundNotMarked,
    /// Confirmed with nothing ever collected.
    MissingPayment,
}

impl MismatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MismatchKind::PaidNoPaymentRecord => "paid_no_payment_record",
            MismatchKind::AmountMismatch => "amount_mismatch",
            MismatchKind::RefundNotMarked => "refund_not_marked",
            MismatchKind::MissingPayment => "missing_payment",
        }
    }
}

impl FromStr for MismatchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paid_no_payment_record" => Ok(MismatchKind::PaidNoPaymentRecord),
            "amount_mismatch" => Ok(MismatchKind::AmountMismatch),
            "refund_not_marked" => Ok(MismatchKind::RefundNotMarked),
            "missing_payment" => Ok(MismatchKind::MissingPayment),
            other => Err(format!("unknown mismatch kind '{}'", other)),
        }
    }
}

/// One read-only finding. Corrections go through the normal privileged writes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Mismatch {
    pub booking_id: Uuid,
    pub kind: MismatchKind,
    pub description: String,
    pub booking_total: i64,
    pub payments_total: i64,
    pub refunds_processed_total: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconciliationFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Empty means every kind.
    #[serde(default)]
    pub kinds: Vec<MismatchKind>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub generated_at: DateTime<Utc>,
    pub bookings_checked: usize,
    pub mismatches: Vec<Mismatch>,
}

/// Cross-checks bookings against their payment and refund rows.
pub struct ReconciliationEngine;

impl ReconciliationEngine {
    pub fn reconcile(snapshot: &LedgerSnapshot, filter: &ReconciliationFilter) -> Vec<Mismatch> {
        let mut payments: HashMap<Uuid, Vec<&Payment>> = HashMap::new();
        for p in &snapshot.payments {
            payments.entry(p.booking_id).or_default().push(p);
        }
        let mut refunds: HashMap<Uuid, Vec<&Refund>> = HashMap::new();
        for r in &snapshot.refunds {
            refunds.entry(r.booking_id).or_default().push(r);
        }

        let mut found = Vec::new();
        for booking in &snapshot.bookings {
            if filter.from.is_some_and(|from| booking.created_at < from)
                || filter.to.is_some_and(|to| booking.created_at > to)
            {
                continue;
            }

            let linked = payments.get(&booking.id).map(Vec::as_slice).unwrap_or_default();
            let payments_total: i64 = linked.iter().map(|p| p.amount).sum();
            let refunds_processed_total: i64 = refunds
                .get(&booking.id)
                .into_iter()
                .flatten()
                .filter(|r| r.status == RefundStatus::Processed)
                .map(|r| r.amount)
                .sum();
            let has_processed_refund = refunds
                .get(&booking.id)
                .into_iter()
                .flatten()
                .any(|r| r.status == RefundStatus::Processed);

            let mut flag = |kind: MismatchKind, description: String| {
                found.push(Mismatch {
                    booking_id: booking.id,
                    kind,
                    description,
                    booking_total: booking.total_amount,
                    payments_total,
                    refunds_processed_total,
                });
            };

            let payment_status = booking.payment_status();
            let booking_status = booking.booking_status();

            if payment_status == PaymentStatus::FullyPaid {
                if linked.is_empty() {
                    flag(
                        MismatchKind::PaidNoPaymentRecord,
                        "Booking is fully paid but has no payment record".to_string(),
                    );
                } else if payments_total != booking.total_amount {
                    flag(
                        MismatchKind::AmountMismatch,
                        format!(
                            "Payments sum to {} but the booking total is {}",
                            payments_total, booking.total_amount
                        ),
                    );
                }
            }

            if has_processed_refund && booking_status != BookingStatus::Refunded {
                flag(
                    MismatchKind::RefundNotMarked,
                    format!(
                        "Refund of {} processed but booking is {}",
                        refunds_processed_total,
                        booking_status.as_str()
                    ),
                );
            }

            if booking_status == BookingStatus::Confirmed
                && payment_status == PaymentStatus::PendingAdvance
                && linked.is_empty()
                && booking.advance_paid == 0
            {
                flag(
                    MismatchKind::MissingPayment,
                    "Booking is confirmed but no payment was ever collected".to_string(),
                );
            }
        }

        if !filter.kinds.is_empty() {
            found.retain(|m| filter.kinds.contains(&m.kind));
        }
        found
    }
}
