//! backoffice-adapter-postgres - PostgreSQL 适配器

mod connection;
mod error;
mod migration;
mod transaction;

pub use connection::*;
pub use error::*;
pub use migration::*;
pub use transaction::*;
