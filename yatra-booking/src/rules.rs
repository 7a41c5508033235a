use serde::{Deserialize, Serialize};

/// Operator-tunable business rules. Loaded from the `business_rules`
/// configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BookingRules {
    /// Share of the total due up front to confirm a seat.
    pub advance_percent: f64,
    /// Cancelling closer than this to departure needs explicit confirmation.
    pub late_cancellation_hours: i64,
    pub balance_due_days_before_departure: i64,
    /// Initiated bookings without an advance proof expire after this long.
    pub initiated_ttl_hours: i64,
    pub reconciliation_interval_seconds: u64,
    pub expiry_interval_seconds: u64,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            advance_percent: 20.0,
            late_cancellation_hours: 48,
            balance_due_days_before_departure: 7,
            initiated_ttl_hours: 72,
            reconciliation_interval_seconds: 3600,
            expiry_interval_seconds: 900,
        }
    }
}

impl BookingRules {
    pub fn advance_due(&self, total_amount: i64) -> i64 {
        (total_amount as f64 * self.advance_percent / 100.0).round() as i64
    }
}
