pub mod trip;
pub mod pricing;
pub mod inventory;

pub use trip::{Batch, BatchStatus, Trip};
pub use pricing::{PriceBadge, PriceQuote, PricingConfig, PricingEngine, PricingInput, UrgencyPolicy};
pub use inventory::{BatchRepository, InventoryError, InventoryManager};
