//! 持久化层模块

pub mod policy_source;
pub mod schema;
pub mod tx_repositories;
pub mod unit_of_work;

pub use policy_source::PostgresPolicySource;
pub use schema::migrations;
pub use unit_of_work::{PostgresUnitOfWork, PostgresUnitOfWorkFactory};
