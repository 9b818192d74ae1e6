// crates/core/src/lib.rs
//! Domain logic for burntop: pricing resolution, decimal cost arithmetic,
//! streak transitions, and time periods. Everything here is CPU-only:
//! no IO, no database, no clock reads except where a date is passed in.

pub mod catalog;
pub mod error;
pub mod period;
pub mod pricing;
pub mod streak;
pub mod sync;

pub use catalog::{Catalog, CatalogEntry};
pub use error::CoreError;
pub use period::Period;
pub use pricing::{cache_efficiency, calculate_cost, ModelPricing, TokenCounts};
pub use sync::SyncMessage;
