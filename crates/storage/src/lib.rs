//! Storage abstractions for the back-office engine.
//!
//! Defines the async store traits, the optimistic-concurrency error
//! taxonomy, the transaction coordinator, and an in-memory backend used by
//! the engine tests.

pub mod coordinator;
pub mod error;
pub mod memory;
pub mod store;

pub use coordinator::{Retryable, TransactionBackend, TransactionCoordinator, TxConfig};
pub use error::StoreError;
pub use memory::InMemoryBackend;
pub use store::{InventoryStore, OrderStore};
