//! 数据库迁移

use backoffice_adapter_postgres::Migration;

/// 按版本排列的全部迁移
pub fn migrations() -> Vec<Migration> {
    vec![
        Migration::new(
            1,
            "create_menus",
            include_str!("../../../migrations/0001_create_menus.sql"),
        ),
        Migration::new(
            2,
            "create_roles",
            include_str!("../../../migrations/0002_create_roles.sql"),
        ),
        Migration::new(
            3,
            "create_users",
            include_str!("../../../migrations/0003_create_users.sql"),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_are_increasing() {
        let versions: Vec<i64> = migrations().iter().map(|m| m.version).collect();
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
    }
}
