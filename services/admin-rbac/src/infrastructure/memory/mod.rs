//! 内存实现，用于测试与本地演示

mod store;

pub use store::{MemoryState, MemoryStore, MemoryUnitOfWork};
