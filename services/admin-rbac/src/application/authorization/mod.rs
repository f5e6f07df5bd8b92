//! 授权应用层模块

pub mod enforcer;
pub mod reload;

pub use enforcer::{MODEL_CONF, PolicyEnforcer, build_enforcer};
pub use reload::spawn_auto_reload;
