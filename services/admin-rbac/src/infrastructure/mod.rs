//! 基础设施层

pub mod memory;
pub mod persistence;

pub use memory::MemoryStore;
pub use persistence::{PostgresPolicySource, PostgresUnitOfWorkFactory};
