//! HTTP 接入层

pub mod authorization;
pub mod router;
pub mod transaction;

pub use authorization::{AuthzState, CurrentUser, authorization_middleware, identity_middleware};
pub use router::{AppState, build_router, protect};
pub use transaction::{TransactionScope, Tx, transaction_middleware};
