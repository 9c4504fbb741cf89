//! Services layer for household-service.

mod database;
pub mod error;
mod memory;
pub mod metrics;
mod store;

pub use database::Database;
pub use error::LedgerError;
pub use memory::InMemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use store::LedgerStore;
