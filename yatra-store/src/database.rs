use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;
use yatra_booking::BookingRules;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

#[derive(sqlx::FromRow)]
struct RuleRow {
    rule_key: String,
    rule_value: Value,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Operator overrides stored in `business_rules`, layered over the file
    /// configuration. Rows look like `{"value": <number>}`; unknown keys are
    /// ignored.
    pub async fn fetch_business_rules(&self, defaults: BookingRules) -> Result<BookingRules, sqlx::Error> {
        let rows: Vec<RuleRow> = sqlx::query_as("SELECT rule_key, rule_value FROM business_rules")
            .fetch_all(&self.pool)
            .await?;

        let mut rules = defaults;
        for row in rows {
            apply_rule(&mut rules, &row.rule_key, &row.rule_value);
        }
        Ok(rules)
    }
}

fn apply_rule(rules: &mut BookingRules, key: &str, value: &Value) {
    let Some(v) = value.get("value") else {
        return;
    };
    match key {
        "advance_percent" => {
            if let Some(f) = v.as_f64() {
                rules.advance_percent = f;
            }
        }
        "late_cancellation_hours" => {
            if let Some(h) = v.as_i64() {
                rules.late_cancellation_hours = h;
            }
        }
        "balance_due_days_before_departure" => {
            if let Some(d) = v.as_i64() {
                rules.balance_due_days_before_departure = d;
            }
        }
        "initiated_ttl_hours" => {
            if let Some(h) = v.as_i64() {
                rules.initiated_ttl_hours = h;
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rule_rows_override_known_keys_only() {
        let mut rules = BookingRules::default();
        apply_rule(&mut rules, "advance_percent", &json!({ "value": 30.0 }));
        apply_rule(&mut rules, "late_cancellation_hours", &json!({ "value": 24 }));
        apply_rule(&mut rules, "initiated_ttl_hours", &json!({ "wrong": 1 }));
        apply_rule(&mut rules, "tax_rate", &json!({ "value": 0.18 }));

        assert_eq!(rules.advance_percent, 30.0);
        assert_eq!(rules.late_cancellation_hours, 24);
        assert_eq!(rules.initiated_ttl_hours, BookingRules::default().initiated_ttl_hours);
    }
}
