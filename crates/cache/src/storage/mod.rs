//! Storage traits and implementations
//!
//! Defines the per-account partition abstraction. The trait-based design
//! allows swapping between the persistent SQLite backend and the in-memory
//! backend used for tests and degraded operation.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryPartition;
pub use sqlite::SqlitePartition;
pub use traits::{
    ActionFate, DEFAULT_LIST_LIMIT, EmailFilter, EventFilter, PartitionStore,
};
