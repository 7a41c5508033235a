pub mod app_config;
pub mod database;
pub mod events;
pub mod pg_ledger;

pub use app_config::Config;
pub use database::DbClient;
pub use events::{EventProducer, KafkaNotificationSink};
pub use pg_ledger::PgLedger;
