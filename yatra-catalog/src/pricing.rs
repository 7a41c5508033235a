use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of the time-to-departure adjustment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyPolicy {
    /// Price rises as departure approaches.
    Surge,
    /// Price falls as departure approaches, to clear unsold seats.
    Clearance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Turn the engine off and quote the base price (badges still computed).
    pub enabled: bool,

    /// Surcharge at 100% occupancy; scales with occupancy squared.
    pub scarcity_max_percent: f64,

    /// Occupancy at or above which "Filling Fast" is shown.
    pub filling_fast_threshold: f64,

    /// Remaining seats at or below which "Last Few Seats" is shown.
    pub last_seats_threshold: u32,

    pub urgency_policy: UrgencyPolicy,

    /// Days before departure when the urgency factor starts to apply.
    pub urgency_window_days: i64,

    /// Magnitude of the urgency adjustment on departure day.
    pub urgency_max_percent: f64,

    /// Departures at least this far away get the early-bird discount.
    pub early_bird_days: i64,
    pub early_bird_percent: f64,

    /// Clamp band for the combined adjustment.
    pub min_adjustment_percent: f64,
    pub max_adjustment_percent: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scarcity_max_percent: 15.0,
            filling_fast_threshold: 0.8,
            last_seats_threshold: 3,
            urgency_policy: UrgencyPolicy::Surge,
            urgency_window_days: 14,
            urgency_max_percent: 10.0,
            early_bird_days: 60,
            early_bird_percent: 5.0,
            min_adjustment_percent: -20.0,
            max_adjustment_percent: 25.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PriceBadge {
    FillingFast,
    LastFewSeats,
    SoldOut,
    DepartingSoon,
    LastMinuteDeal,
    EarlyBird,
}

impl PriceBadge {
    pub fn label(&self) -> &'static str {
        match self {
            PriceBadge::FillingFast => "Filling Fast",
            PriceBadge::LastFewSeats => "Last Few Seats",
            PriceBadge::SoldOut => "Sold Out",
            PriceBadge::DepartingSoon => "Departing Soon",
            PriceBadge::LastMinuteDeal => "Last Minute Deal",
            PriceBadge::EarlyBird => "Early Bird",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PricingInput {
    pub base_price: i64,
    pub batch_size: u32,
    pub seats_available: u32,
    pub departure: DateTime<Utc>,
    /// Reference instant; passed in so quotes stay reproducible.
    pub as_of: DateTime<Utc>,
}

/// Advisory price for display or booking. Never mutates anything.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceQuote {
    pub base_price: i64,
    pub effective_price: i64,
    pub adjustment_percent: f64,
    pub badges: Vec<PriceBadge>,
}

/// Occupancy and time-to-departure pricing.
pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    /// Occupancy surcharge: quadratic in the booked fraction.
    pub fn calculate_scarcity_percent(&self, batch_size: u32, seats_available: u32) -> f64 {
        let occupancy = occupancy(batch_size, seats_available);
        occupancy * occupancy * self.config.scarcity_max_percent
    }

    /// Signed urgency adjustment for whole days left before departure.
    pub fn calculate_urgency_percent(&self, days_to_departure: i64) -> f64 {
        let days = days_to_departure.max(0);
        let window = self.config.urgency_window_days;

        if window > 0 && days <= window {
            let magnitude = self.config.urgency_max_percent * (window - days) as f64 / window as f64;
            return match self.config.urgency_policy {
                UrgencyPolicy::Surge => magnitude,
                UrgencyPolicy::Clearance => -magnitude,
            };
        }

        if days >= self.config.early_bird_days {
            return -self.config.early_bird_percent;
        }

        0.0
    }

    pub fn price(&self, input: &PricingInput) -> PriceQuote {
        let base_price = input.base_price.max(0);
        let available = input.seats_available.min(input.batch_size);
        let days = days_to_departure(input.departure, input.as_of);
        let badges = self.badges(input.batch_size, available, days);

        if !self.config.enabled {
            return PriceQuote {
                base_price,
                effective_price: base_price,
                adjustment_percent: 0.0,
                badges,
            };
        }

        let raw = self.calculate_scarcity_percent(input.batch_size, available)
            + self.calculate_urgency_percent(days);
        let clamped = raw
            .max(self.config.min_adjustment_percent)
            .min(self.config.max_adjustment_percent);
        let adjustment_percent = (clamped * 100.0).round() / 100.0;

        let effective = (base_price as f64 * (1.0 + adjustment_percent / 100.0)).round() as i64;

        PriceQuote {
            base_price,
            effective_price: effective.max(0),
            adjustment_percent,
            badges,
        }
    }

    fn badges(&self, batch_size: u32, available: u32, days: i64) -> Vec<PriceBadge> {
        let mut badges = Vec::new();

        if batch_size > 0 && available == 0 {
            badges.push(PriceBadge::SoldOut);
        } else if available > 0 {
            if occupancy(batch_size, available) >= self.config.filling_fast_threshold {
                badges.push(PriceBadge::FillingFast);
            }
            if available <= self.config.last_seats_threshold {
                badges.push(PriceBadge::LastFewSeats);
            }
        }

        let window = self.config.urgency_window_days;
        if window > 0 && days <= window {
            badges.push(match self.config.urgency_policy {
                UrgencyPolicy::Surge => PriceBadge::DepartingSoon,
                UrgencyPolicy::Clearance => PriceBadge::LastMinuteDeal,
            });
        } else if days >= self.config.early_bird_days {
            badges.push(PriceBadge::EarlyBird);
        }

        badges
    }
}

impl Default for PricingEngine {
    fn default() -> Self {
        Self::new(PricingConfig::default())
    }
}

fn occupancy(batch_size: u32, seats_available: u32) -> f64 {
    if batch_size == 0 {
        return 0.0;
    }
    let booked = batch_size.saturating_sub(seats_available);
    booked as f64 / batch_size as f64
}

fn days_to_departure(departure: DateTime<Utc>, as_of: DateTime<Utc>) -> i64 {
    (departure - as_of).num_days().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn input(batch_size: u32, available: u32, days_out: i64) -> PricingInput {
        PricingInput {
            base_price: 10000,
            batch_size,
            seats_available: available,
            departure: as_of() + Duration::days(days_out),
            as_of: as_of(),
        }
    }

    #[test]
    fn test_same_inputs_same_quote() {
        let engine = PricingEngine::default();
        let a = engine.price(&input(20, 3, 5));
        let b = engine.price(&input(20, 3, 5));
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_batch_mid_horizon_is_base_price() {
        let engine = PricingEngine::default();
        let quote = engine.price(&input(20, 20, 30));
        assert_eq!(quote.adjustment_percent, 0.0);
        assert_eq!(quote.effective_price, 10000);
        assert!(quote.badges.is_empty());
    }

    #[test]
    fn test_scarcity_increases_with_occupancy() {
        let engine = PricingEngine::default();
        let half = engine.price(&input(20, 10, 30));
        let nearly_full = engine.price(&input(20, 2, 30));
        assert!(nearly_full.effective_price > half.effective_price);
        // 0.9^2 * 15 = 12.15
        assert_eq!(nearly_full.adjustment_percent, 12.15);
        assert_eq!(nearly_full.effective_price, 11215);
    }

    #[test]
    fn test_filling_fast_badge_threshold() {
        let engine = PricingEngine::default();
        let below = engine.price(&input(10, 3, 30));
        assert!(!below.badges.contains(&PriceBadge::FillingFast));

        let at = engine.price(&input(10, 2, 30));
        assert!(at.badges.contains(&PriceBadge::FillingFast));
        assert!(at.badges.contains(&PriceBadge::LastFewSeats));

        let sold_out = engine.price(&input(10, 0, 30));
        assert!(sold_out.badges.contains(&PriceBadge::SoldOut));
        assert!(!sold_out.badges.contains(&PriceBadge::FillingFast));
    }

    #[test]
    fn test_surge_policy_raises_price_near_departure() {
        let engine = PricingEngine::default();
        let quote = engine.price(&input(20, 20, 0));
        assert_eq!(quote.adjustment_percent, 10.0);
        assert_eq!(quote.effective_price, 11000);
        assert!(quote.badges.contains(&PriceBadge::DepartingSoon));
    }

    #[test]
    fn test_clearance_policy_lowers_price_near_departure() {
        let engine = PricingEngine::new(PricingConfig {
            urgency_policy: UrgencyPolicy::Clearance,
            ..PricingConfig::default()
        });
        let quote = engine.price(&input(20, 20, 7));
        assert_eq!(quote.adjustment_percent, -5.0);
        assert_eq!(quote.effective_price, 9500);
        assert!(quote.badges.contains(&PriceBadge::LastMinuteDeal));
    }

    #[test]
    fn test_early_bird_discount() {
        let engine = PricingEngine::default();
        let quote = engine.price(&input(20, 20, 90));
        assert_eq!(quote.adjustment_percent, -5.0);
        assert!(quote.badges.contains(&PriceBadge::EarlyBird));
    }

    #[test]
    fn test_adjustment_is_clamped_to_band() {
        let engine = PricingEngine::new(PricingConfig {
            scarcity_max_percent: 40.0,
            urgency_max_percent: 30.0,
            ..PricingConfig::default()
        });
        let high = engine.price(&input(10, 1, 0));
        assert_eq!(high.adjustment_percent, 25.0);
        assert_eq!(high.effective_price, 12500);

        let low_engine = PricingEngine::new(PricingConfig {
            urgency_policy: UrgencyPolicy::Clearance,
            urgency_max_percent: 50.0,
            ..PricingConfig::default()
        });
        let low = low_engine.price(&input(10, 10, 0));
        assert_eq!(low.adjustment_percent, -20.0);
        assert_eq!(low.effective_price, 8000);
    }

    #[test]
    fn test_effective_price_never_negative() {
        let engine = PricingEngine::default();
        let mut i = input(10, 10, 0);
        i.base_price = -500;
        let quote = engine.price(&i);
        assert_eq!(quote.effective_price, 0);
    }

    #[test]
    fn test_past_departure_treated_as_departure_day() {
        let engine = PricingEngine::default();
        let past = engine.price(&input(20, 20, -3));
        let today = engine.price(&input(20, 20, 0));
        assert_eq!(past, today);
    }

    #[test]
    fn test_disabled_engine_quotes_base_price() {
        let engine = PricingEngine::new(PricingConfig {
            enabled: false,
            ..PricingConfig::default()
        });
        let quote = engine.price(&input(10, 1, 0));
        assert_eq!(quote.effective_price, 10000);
        assert!(quote.badges.contains(&PriceBadge::FillingFast));
    }
}
