//! 领域层

pub mod menu;
pub mod policy;
pub mod reconcile;
pub mod role;
pub mod unit_of_work;
pub mod user;

use serde::{Deserialize, Serialize};

/// 定义基于 UUID v7 的实体 ID
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            pub fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(uuid::Uuid::parse_str(s)?))
            }
        }
    };
}

pub(crate) use define_id;

/// 启用状态
///
/// 持久化为 `1` / `-1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Enabled,
    Disabled,
}

impl Status {
    pub fn as_i16(self) -> i16 {
        match self {
            Status::Enabled => 1,
            Status::Disabled => -1,
        }
    }

    pub fn from_i16(value: i16) -> Self {
        if value == 1 {
            Status::Enabled
        } else {
            Status::Disabled
        }
    }

    pub fn is_enabled(self) -> bool {
        self == Status::Enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Status::Enabled.as_i16(), 1);
        assert_eq!(Status::Disabled.as_i16(), -1);
        assert_eq!(Status::from_i16(1), Status::Enabled);
        assert_eq!(Status::from_i16(-1), Status::Disabled);
        assert_eq!(Status::from_i16(0), Status::Disabled);
    }
}
