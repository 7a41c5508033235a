pub mod models;
pub mod error;
pub mod lifecycle;
pub mod rules;
pub mod repository;
pub mod memory;
pub mod manager;
pub mod verification;
pub mod cancellation;
pub mod reconciliation;
pub mod service;

pub use cancellation::{CancelRequest, CancellationHandler, CancellationOutcome, CancellationPolicy, RefundOutcome};
pub use error::{BookingError, BookingResult};
pub use lifecycle::{BookingEvent, SeatEffect, Transition};
pub use manager::{BookingManager, ManualPayment, NewBooking, ProofUpload};
pub use memory::InMemoryLedger;
pub use models::{
    Booking, BookingState, BookingStatus, ContactInfo, Payment, PaymentMethod, PaymentRecordStatus, PaymentStage,
    PaymentStatus, Proof, ProofStatus, Refund, RefundStatus,
};
pub use reconciliation::{Mismatch, MismatchKind, ReconciliationEngine, ReconciliationFilter, ReconciliationReport};
pub use repository::{BookingCommit, BookingFilter, BookingRepository, LedgerSnapshot};
pub use rules::BookingRules;
pub use service::{BatchOffer, BookingService};
pub use verification::{BalanceReminder, PaymentVerifier, ReviewDecision, ReviewOutcome};
