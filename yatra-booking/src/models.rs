use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;
use uuid::Uuid;
use yatra_shared::Masked;

/// Booking status as exposed to clients and storage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Initiated,
    Confirmed,
    Cancelled,
    Refunded,
    Expired,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Initiated => "initiated",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Refunded => "refunded",
            BookingStatus::Expired => "expired",
        }
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initiated" | "pending" => Ok(BookingStatus::Initiated),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "refunded" => Ok(BookingStatus::Refunded),
            "expired" => Ok(BookingStatus::Expired),
            other => Err(format!("unknown booking status '{}'", other)),
        }
    }
}

/// Money-side progress of a booking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    PendingAdvance,
    AdvanceVerified,
    BalancePending,
    FullyPaid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::PendingAdvance => "pending_advance",
            PaymentStatus::AdvanceVerified => "advance_verified",
            PaymentStatus::BalancePending => "balance_pending",
            PaymentStatus::FullyPaid => "fully_paid",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_advance" | "pending" => Ok(PaymentStatus::PendingAdvance),
            "advance_verified" => Ok(PaymentStatus::AdvanceVerified),
            "balance_pending" => Ok(PaymentStatus::BalancePending),
            "fully_paid" => Ok(PaymentStatus::FullyPaid),
            other => Err(format!("unknown payment status '{}'", other)),
        }
    }
}

/// The one authoritative lifecycle state of a booking.
///
/// Booking status and payment status are projections of this value, so an
/// impossible pairing such as `expired`/`fully_paid` cannot be represented.
/// Terminal states remember how far payment had progressed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingState {
    Initiated,
    Confirmed(PaymentStatus),
    Cancelled(PaymentStatus),
    Refunded(PaymentStatus),
    Expired,
}

impl BookingState {
    pub fn booking_status(&self) -> BookingStatus {
        match self {
            BookingState::Initiated => BookingStatus::Initiated,
            BookingState::Confirmed(_) => BookingStatus::Confirmed,
            BookingState::Cancelled(_) => BookingStatus::Cancelled,
            BookingState::Refunded(_) => BookingStatus::Refunded,
            BookingState::Expired => BookingStatus::Expired,
        }
    }

    pub fn payment_status(&self) -> PaymentStatus {
        match self {
            BookingState::Initiated | BookingState::Expired => PaymentStatus::PendingAdvance,
            BookingState::Confirmed(p) | BookingState::Cancelled(p) | BookingState::Refunded(p) => *p,
        }
    }

    /// Rebuild from the two stored columns. Pairings the lifecycle never
    /// produces (e.g. `confirmed` + `pending_advance` from a legacy import) are
    /// kept as-is so reconciliation can flag them. `initiated` and `expired`
    /// carry no payment progress, so anything stored beside them is dropped
    /// with a warning.
    pub fn from_parts(booking: BookingStatus, payment: PaymentStatus) -> Self {
        if matches!(booking, BookingStatus::Initiated | BookingStatus::Expired)
            && payment != PaymentStatus::PendingAdvance
        {
            warn!(
                "Dropping payment status '{}' stored with booking status '{}'",
                payment.as_str(),
                booking.as_str()
            );
        }
        match booking {
            BookingStatus::Initiated => BookingState::Initiated,
            BookingStatus::Confirmed => BookingState::Confirmed(payment),
            BookingStatus::Cancelled => BookingState::Cancelled(payment),
            BookingStatus::Refunded => BookingState::Refunded(payment),
            BookingStatus::Expired => BookingState::Expired,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingState::Cancelled(_) | BookingState::Refunded(_) | BookingState::Expired
        )
    }
}

impl fmt::Display for BookingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            self.booking_status().as_str(),
            self.payment_status().as_str()
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStage {
    Advance,
    Balance,
}

impl PaymentStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStage::Advance => "advance",
            PaymentStage::Balance => "balance",
        }
    }
}

impl fmt::Display for PaymentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "advance" => Ok(PaymentStage::Advance),
            "balance" => Ok(PaymentStage::Balance),
            other => Err(format!("unknown payment stage '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProofStatus {
    Pending,
    Uploaded,
    Verified,
    Rejected,
}

impl ProofStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProofStatus::Pending => "pending",
            ProofStatus::Uploaded => "uploaded",
            ProofStatus::Verified => "verified",
            ProofStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ProofStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProofStatus::Pending),
            "uploaded" => Ok(ProofStatus::Uploaded),
            "verified" => Ok(ProofStatus::Verified),
            "rejected" => Ok(ProofStatus::Rejected),
            other => Err(format!("unknown proof status '{}'", other)),
        }
    }
}

/// Evidence of one manual payment stage. `asset_reference` is an opaque token
/// issued by external object storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Proof {
    pub asset_reference: Option<String>,
    pub status: ProofStatus,
    pub claimed_amount: Option<i64>,
    pub transaction_note: Option<String>,
    pub rejection_reason: Option<String>,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl Default for Proof {
    fn default() -> Self {
        Self {
            asset_reference: None,
            status: ProofStatus::Pending,
            claimed_amount: None,
            transaction_note: None,
            rejection_reason: None,
            uploaded_at: None,
            reviewed_at: None,
        }
    }
}

impl Proof {
    /// Uploaded and waiting for staff.
    pub fn awaiting_review(&self) -> bool {
        self.status == ProofStatus::Uploaded && self.asset_reference.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContactInfo {
    pub name: String,
    pub phone: Masked<String>,
    pub email: Option<String>,
}

/// One traveller party's reservation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub traveller_id: String,
    pub traveller_count: u32,
    pub total_amount: i64,
    pub advance_due: i64,
    pub advance_paid: i64,
    pub balance_paid: i64,
    pub pickup_location: Option<String>,
    pub contact: ContactInfo,
    pub state: BookingState,
    pub advance_proof: Proof,
    pub balance_proof: Proof,
    /// Seats this booking currently holds on its batch. Non-zero only between
    /// advance verification and cancellation.
    pub seats_held: u32,
    pub cancellation_reason: Option<String>,
    pub is_deleted: bool,
    /// Bumped on every committed transition; storage compares it before writing.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(
        trip_id: Uuid,
        batch_id: Option<Uuid>,
        traveller_id: String,
        traveller_count: u32,
        total_amount: i64,
        advance_due: i64,
        contact: ContactInfo,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            trip_id,
            batch_id,
            traveller_id,
            traveller_count,
            total_amount,
            advance_due,
            advance_paid: 0,
            balance_paid: 0,
            pickup_location: None,
            contact,
            state: BookingState::Initiated,
            advance_proof: Proof::default(),
            balance_proof: Proof::default(),
            seats_held: 0,
            cancellation_reason: None,
            is_deleted: false,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn booking_status(&self) -> BookingStatus {
        self.state.booking_status()
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.state.payment_status()
    }

    pub fn proof(&self, stage: PaymentStage) -> &Proof {
        match stage {
            PaymentStage::Advance => &self.advance_proof,
            PaymentStage::Balance => &self.balance_proof,
        }
    }

    pub fn proof_mut(&mut self, stage: PaymentStage) -> &mut Proof {
        match stage {
            PaymentStage::Advance => &mut self.advance_proof,
            PaymentStage::Balance => &mut self.balance_proof,
        }
    }

    /// Saturates rather than wrapping on rows written outside the lifecycle.
    pub fn amount_paid(&self) -> i64 {
        self.advance_paid.saturating_add(self.balance_paid)
    }

    /// Outstanding balance, never negative.
    pub fn balance_due(&self) -> i64 {
        self.total_amount.saturating_sub(self.amount_paid()).max(0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    ManualProof,
    BankTransfer,
    Upi,
    Cash,
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::ManualProof => "manual_proof",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Upi => "upi",
            PaymentMethod::Cash => "cash",
            PaymentMethod::Other => "other",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual_proof" => Ok(PaymentMethod::ManualProof),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "upi" => Ok(PaymentMethod::Upi),
            "cash" => Ok(PaymentMethod::Cash),
            "other" => Ok(PaymentMethod::Other),
            other => Err(format!("unknown payment method '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentRecordStatus {
    /// Written by proof verification.
    Verified,
    /// Written directly by staff.
    Recorded,
}

impl PaymentRecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentRecordStatus::Verified => "verified",
            PaymentRecordStatus::Recorded => "recorded",
        }
    }
}

impl FromStr for PaymentRecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "verified" => Ok(PaymentRecordStatus::Verified),
            "recorded" => Ok(PaymentRecordStatus::Recorded),
            other => Err(format!("unknown payment record status '{}'", other)),
        }
    }
}

/// Evidenced money-in event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub stage: Option<PaymentStage>,
    pub amount: i64,
    pub method: PaymentMethod,
    pub status: PaymentRecordStatus,
    pub external_transaction_id: Option<String>,
    pub recorded_by: String,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn verified(
        booking_id: Uuid,
        stage: PaymentStage,
        amount: i64,
        external_transaction_id: Option<String>,
        recorded_by: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            stage: Some(stage),
            amount,
            method: PaymentMethod::ManualProof,
            status: PaymentRecordStatus::Verified,
            external_transaction_id,
            recorded_by: recorded_by.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn recorded(
        booking_id: Uuid,
        amount: i64,
        method: PaymentMethod,
        external_transaction_id: Option<String>,
        recorded_by: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            stage: None,
            amount,
            method,
            status: PaymentRecordStatus::Recorded,
            external_transaction_id,
            recorded_by: recorded_by.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Processed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Pending => "pending",
            RefundStatus::Processed => "processed",
        }
    }
}

impl FromStr for RefundStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RefundStatus::Pending),
            "processed" => Ok(RefundStatus::Processed),
            other => Err(format!("unknown refund status '{}'", other)),
        }
    }
}

/// Money-out obligation for a cancelled booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Refund {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub amount: i64,
    pub status: RefundStatus,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub processed_by: Option<String>,
}

impl Refund {
    pub fn pending(booking_id: Uuid, amount: i64, reason: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            amount,
            status: RefundStatus::Pending,
            reason: reason.to_string(),
            created_at: Utc::now(),
            processed_at: None,
            processed_by: None,
        }
    }

    pub fn mark_processed(&mut self, processed_by: &str) {
        self.status = RefundStatus::Processed;
        self.processed_at = Some(Utc::now());
        self.processed_by = Some(processed_by.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_projections() {
        let state = BookingState::Confirmed(PaymentStatus::BalancePending);
        assert_eq!(state.booking_status(), BookingStatus::Confirmed);
        assert_eq!(state.payment_status(), PaymentStatus::BalancePending);
        assert_eq!(state.to_string(), "confirmed/balance_pending");

        assert_eq!(BookingState::Expired.payment_status(), PaymentStatus::PendingAdvance);
        assert!(BookingState::Refunded(PaymentStatus::FullyPaid).is_terminal());
        assert!(!BookingState::Initiated.is_terminal());
    }

    #[test]
    fn test_from_parts_round_trips_projections() {
        let state = BookingState::Cancelled(PaymentStatus::AdvanceVerified);
        let rebuilt = BookingState::from_parts(state.booking_status(), state.payment_status());
        assert_eq!(rebuilt, state);

        // Legacy pairing survives so it can be reported.
        let legacy = BookingState::from_parts(BookingStatus::Confirmed, PaymentStatus::PendingAdvance);
        assert_eq!(legacy, BookingState::Confirmed(PaymentStatus::PendingAdvance));

        // Progress stored beside `initiated`/`expired` has nowhere to live.
        let stray = BookingState::from_parts(BookingStatus::Initiated, PaymentStatus::FullyPaid);
        assert_eq!(stray, BookingState::Initiated);
        let stray = BookingState::from_parts(BookingStatus::Expired, PaymentStatus::AdvanceVerified);
        assert_eq!(stray, BookingState::Expired);
    }

    #[test]
    fn test_balance_due_never_negative() {
        let contact = ContactInfo {
            name: "Asha".to_string(),
            phone: Masked::new("9876543210".to_string()),
            email: None,
        };
        let mut booking = Booking::new(Uuid::new_v4(), None, "t-1".to_string(), 2, 10_000, 2_000, contact);
        booking.advance_paid = 2_000;
        assert_eq!(booking.balance_due(), 8_000);
        booking.balance_paid = 9_000;
        assert_eq!(booking.balance_due(), 0);

        booking.advance_paid = i64::MAX;
        assert_eq!(booking.amount_paid(), i64::MAX);
        assert_eq!(booking.balance_due(), 0);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("pending".parse::<BookingStatus>().unwrap(), BookingStatus::Initiated);
        assert_eq!("fully_paid".parse::<PaymentStatus>().unwrap(), PaymentStatus::FullyPaid);
        assert!("settled".parse::<PaymentStatus>().is_err());
    }
}
