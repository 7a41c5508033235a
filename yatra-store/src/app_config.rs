use serde::Deserialize;
use std::env;
use yatra_booking::BookingRules;
use yatra_catalog::PricingConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    /// Without a broker, notifications go to the log.
    pub kafka: Option<KafkaConfig>,
    pub auth: AuthConfig,
    #[serde(default)]
    pub business_rules: BookingRules,
    #[serde(default)]
    pub pricing: PricingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_notification_topic")]
    pub notification_topic: String,
}

fn default_notification_topic() -> String {
    "yatra.notifications".to_string()
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Developer overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `YATRA__BUSINESS_RULES__ADVANCE_PERCENT=25`
            .add_source(config::Environment::with_prefix("YATRA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};
    use yatra_catalog::UrgencyPolicy;

    fn parse(toml: &str) -> Config {
        config::Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_minimal_config_uses_rule_defaults() {
        let config = parse(
            r#"
            [server]
            port = 8080
            [database]
            url = "postgres://localhost/yatra"
            [auth]
            jwt_secret = "secret"
            jwt_expiration_seconds = 3600
            "#,
        );

        assert!(config.kafka.is_none());
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.business_rules.late_cancellation_hours, 48);
        assert_eq!(config.business_rules.advance_percent, 20.0);
        assert_eq!(config.pricing.urgency_policy, UrgencyPolicy::Surge);
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = parse(
            r#"
            [server]
            port = 9000
            [database]
            url = "postgres://db/yatra"
            [kafka]
            brokers = "kafka:9092"
            [auth]
            jwt_secret = "secret"
            jwt_expiration_seconds = 60
            [business_rules]
            advance_percent = 25.0
            late_cancellation_hours = 72
            [pricing]
            urgency_policy = "clearance"
            max_adjustment_percent = 20.0
            "#,
        );

        let kafka = config.kafka.unwrap();
        assert_eq!(kafka.notification_topic, "yatra.notifications");
        assert_eq!(config.business_rules.advance_percent, 25.0);
        assert_eq!(config.business_rules.late_cancellation_hours, 72);
        assert_eq!(config.business_rules.initiated_ttl_hours, 72);
        assert_eq!(config.pricing.urgency_policy, UrgencyPolicy::Clearance);
        assert_eq!(config.pricing.max_adjustment_percent, 20.0);
        assert_eq!(config.pricing.min_adjustment_percent, -20.0);
    }
}
