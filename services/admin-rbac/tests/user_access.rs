//! 用户菜单树、登录校验与角色约束

use admin_rbac::application::{
    ActionInput, CreateUserCommand, MenuCommand, MenuService, RoleCommand, RoleService,
    SuperAdmin, UpdateUserCommand, UserService,
};
use admin_rbac::domain::Status;
use admin_rbac::domain::menu::MenuId;
use admin_rbac::domain::role::{RoleId, RoleQuery};
use admin_rbac::domain::unit_of_work::{UnitOfWork, UnitOfWorkFactory};
use admin_rbac::domain::user::UserQuery;
use admin_rbac::infrastructure::MemoryStore;
use backoffice_errors::AppError;
use secrecy::Secret;

fn users() -> UserService {
    UserService::new(SuperAdmin {
        username: "root".into(),
        real_name: "Root".into(),
        password: Secret::new("root-password".to_string()),
    })
}

fn new_user(username: &str, role_ids: Vec<RoleId>) -> CreateUserCommand {
    CreateUserCommand {
        username: username.into(),
        real_name: username.to_uppercase(),
        password: Secret::new(format!("{}-password", username)),
        email: String::new(),
        phone: String::new(),
        status: Status::Enabled,
        role_ids,
        performed_by: "root".into(),
    }
}

/// System
/// ├── Menus (view)
/// └── Roles (view)
/// Reports
async fn seed_menus(uow: &dyn UnitOfWork) -> (MenuId, MenuId, MenuId, MenuId) {
    let service = MenuService::new();
    let mut system = MenuCommand::new("System", None);
    system.sequence = 1;
    let system = service.create(uow, system).await.unwrap();

    let mut menus = MenuCommand::new("Menus", Some(system))
        .with_action(ActionInput::new("view", "View").with_resource("GET", "/api/v1/menus"));
    menus.sequence = 1;
    let menus = service.create(uow, menus).await.unwrap();

    let mut roles = MenuCommand::new("Roles", Some(system))
        .with_action(ActionInput::new("view", "View").with_resource("GET", "/api/v1/roles"));
    roles.sequence = 2;
    let roles = service.create(uow, roles).await.unwrap();

    let mut reports = MenuCommand::new("Reports", None);
    reports.sequence = 2;
    let reports = service.create(uow, reports).await.unwrap();

    (system, menus, roles, reports)
}

#[tokio::test]
async fn menu_tree_includes_missing_ancestors() {
    let store = MemoryStore::new();
    let uow = store.begin().await.unwrap();
    let (system, menus, _, _) = seed_menus(uow.as_ref()).await;

    let view = MenuService::new().get(uow.as_ref(), menus).await.unwrap().actions[0].id;
    let role = RoleService::new()
        .create(uow.as_ref(), RoleCommand::new("menu-viewer").grant(menus, view))
        .await
        .unwrap();
    let user = users()
        .create(uow.as_ref(), new_user("alice", vec![role]))
        .await
        .unwrap();

    let tree = users().menu_tree(uow.as_ref(), &user.to_string()).await.unwrap();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].menu.id, system);
    assert_eq!(tree[0].children.len(), 1);
    assert_eq!(tree[0].children[0].menu.id, menus);
}

#[tokio::test]
async fn menu_tree_skips_disabled_menus_and_roles() {
    let store = MemoryStore::new();
    let uow = store.begin().await.unwrap();
    let (_, menus, _, _) = seed_menus(uow.as_ref()).await;

    let view = MenuService::new().get(uow.as_ref(), menus).await.unwrap().actions[0].id;
    let role = RoleService::new()
        .create(uow.as_ref(), RoleCommand::new("menu-viewer").grant(menus, view))
        .await
        .unwrap();
    let user = users()
        .create(uow.as_ref(), new_user("alice", vec![role]))
        .await
        .unwrap()
        .to_string();

    MenuService::new()
        .update_status(uow.as_ref(), menus, Status::Disabled)
        .await
        .unwrap();
    let err = users().menu_tree(uow.as_ref(), &user).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    MenuService::new()
        .update_status(uow.as_ref(), menus, Status::Enabled)
        .await
        .unwrap();
    RoleService::new()
        .update_status(uow.as_ref(), role, Status::Disabled)
        .await
        .unwrap();
    let err = users().menu_tree(uow.as_ref(), &user).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn user_without_roles_has_no_menus() {
    let store = MemoryStore::new();
    let uow = store.begin().await.unwrap();
    seed_menus(uow.as_ref()).await;
    let user = users()
        .create(uow.as_ref(), new_user("bob", Vec::new()))
        .await
        .unwrap();

    let err = users()
        .menu_tree(uow.as_ref(), &user.to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn super_admin_sees_every_enabled_menu() {
    let store = MemoryStore::new();
    let uow = store.begin().await.unwrap();
    let (system, _, _, reports) = seed_menus(uow.as_ref()).await;
    MenuService::new()
        .update_status(uow.as_ref(), reports, Status::Disabled)
        .await
        .unwrap();

    let tree = users().menu_tree(uow.as_ref(), "root").await.unwrap();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].menu.id, system);
    assert_eq!(tree[0].children.len(), 2);
}

#[tokio::test]
async fn verify_checks_password_and_status() {
    let store = MemoryStore::new();
    let uow = store.begin().await.unwrap();
    let service = users();
    let id = service
        .create(uow.as_ref(), new_user("carol", Vec::new()))
        .await
        .unwrap();

    let info = service
        .verify(uow.as_ref(), "carol", "carol-password")
        .await
        .unwrap();
    assert_eq!(info.user_id, id.to_string());

    let err = service.verify(uow.as_ref(), "carol", "wrong").await.unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));
    let err = service.verify(uow.as_ref(), "nobody", "x").await.unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));

    service
        .update_status(uow.as_ref(), id, Status::Disabled)
        .await
        .unwrap();
    let err = service
        .verify(uow.as_ref(), "carol", "carol-password")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let root = service
        .verify(uow.as_ref(), "root", "root-password")
        .await
        .unwrap();
    assert_eq!(root.user_id, "root");

    for attempt in ["root-passwore", "root-password ", ""] {
        let err = service.verify(uow.as_ref(), "root", attempt).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}

#[tokio::test]
async fn reserved_and_duplicate_usernames_are_rejected() {
    let store = MemoryStore::new();
    let uow = store.begin().await.unwrap();
    let service = users();
    service
        .create(uow.as_ref(), new_user("dave", Vec::new()))
        .await
        .unwrap();

    let err = service
        .create(uow.as_ref(), new_user("dave", Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    let err = service
        .create(uow.as_ref(), new_user("root", Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    let err = service
        .create(uow.as_ref(), new_user("erin", vec![RoleId::new()]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn update_reconciles_roles_and_keeps_password() {
    let store = MemoryStore::new();
    let uow = store.begin().await.unwrap();
    let roles = RoleService::new();
    let a = roles.create(uow.as_ref(), RoleCommand::new("a")).await.unwrap();
    let b = roles.create(uow.as_ref(), RoleCommand::new("b")).await.unwrap();
    let c = roles.create(uow.as_ref(), RoleCommand::new("c")).await.unwrap();

    let service = users();
    let id = service
        .create(uow.as_ref(), new_user("frank", vec![a, b]))
        .await
        .unwrap();
    let kept = service
        .get(uow.as_ref(), id)
        .await
        .unwrap()
        .user_roles
        .into_iter()
        .find(|ur| ur.role_id == b)
        .unwrap();

    service
        .update(
            uow.as_ref(),
            id,
            UpdateUserCommand {
                username: "frank".into(),
                real_name: "Frank".into(),
                password: None,
                email: "frank@example.com".into(),
                phone: String::new(),
                status: Status::Enabled,
                role_ids: vec![b, c, c],
            },
        )
        .await
        .unwrap();

    let user = service.get(uow.as_ref(), id).await.unwrap();
    let mut role_ids: Vec<RoleId> = user.user_roles.iter().map(|ur| ur.role_id).collect();
    role_ids.sort();
    let mut expected = vec![b, c];
    expected.sort();
    assert_eq!(role_ids, expected);
    assert!(user.user_roles.iter().any(|ur| ur.id == kept.id));
    assert_eq!(user.email, "frank@example.com");

    service
        .verify(uow.as_ref(), "frank", "frank-password")
        .await
        .unwrap();
}

#[tokio::test]
async fn role_delete_is_blocked_while_assigned() {
    let store = MemoryStore::new();
    let uow = store.begin().await.unwrap();
    let (_, menus, _, _) = seed_menus(uow.as_ref()).await;
    let view = MenuService::new().get(uow.as_ref(), menus).await.unwrap().actions[0].id;

    let roles = RoleService::new();
    let role = roles
        .create(uow.as_ref(), RoleCommand::new("viewer").grant(menus, view))
        .await
        .unwrap();
    let user = users()
        .create(uow.as_ref(), new_user("gina", vec![role]))
        .await
        .unwrap();

    let err = roles.delete(uow.as_ref(), role).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    users().delete(uow.as_ref(), user).await.unwrap();
    roles.delete(uow.as_ref(), role).await.unwrap();
    uow.commit().await.unwrap();

    let state = store.snapshot().await;
    assert!(state.roles.is_empty());
    assert!(state.role_menus.is_empty());
    assert!(state.user_roles.is_empty());
}

#[tokio::test]
async fn role_bindings_must_reference_own_menu() {
    let store = MemoryStore::new();
    let uow = store.begin().await.unwrap();
    let (_, menus, roles_menu, _) = seed_menus(uow.as_ref()).await;
    let view_of_roles = MenuService::new()
        .get(uow.as_ref(), roles_menu)
        .await
        .unwrap()
        .actions[0]
        .id;

    let err = RoleService::new()
        .create(uow.as_ref(), RoleCommand::new("broken").grant(menus, view_of_roles))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = RoleService::new()
        .create(uow.as_ref(), RoleCommand::new("ghost").grant(MenuId::new(), view_of_roles))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn roles_are_listed_by_filter() {
    let store = MemoryStore::new();
    let uow = store.begin().await.unwrap();
    let roles = RoleService::new();

    let mut ops = RoleCommand::new("ops");
    ops.remark = "on-call rotation".into();
    ops.sequence = 2;
    let ops = roles.create(uow.as_ref(), ops).await.unwrap();
    let mut audit = RoleCommand::new("audit");
    audit.sequence = 1;
    let audit = roles.create(uow.as_ref(), audit).await.unwrap();
    let mut legacy = RoleCommand::new("legacy-ops");
    legacy.status = Status::Disabled;
    legacy.sequence = 3;
    let legacy = roles.create(uow.as_ref(), legacy).await.unwrap();

    let all = roles.query(uow.as_ref(), &RoleQuery::default()).await.unwrap();
    let ids: Vec<RoleId> = all.iter().map(|r| r.id).collect();
    assert_eq!(ids, [audit, ops, legacy]);

    let query = RoleQuery {
        keyword: Some("ops".into()),
        ..Default::default()
    };
    let ids: Vec<RoleId> = roles
        .query(uow.as_ref(), &query)
        .await
        .unwrap()
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, [ops, legacy]);

    let query = RoleQuery {
        keyword: Some("call".into()),
        status: Some(Status::Enabled),
        ..Default::default()
    };
    let found = roles.query(uow.as_ref(), &query).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, ops);

    let user = users()
        .create(uow.as_ref(), new_user("hank", vec![legacy]))
        .await
        .unwrap();
    let query = RoleQuery {
        user_id: Some(user),
        ..Default::default()
    };
    let found = roles.query(uow.as_ref(), &query).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, legacy);
}

#[tokio::test]
async fn users_are_listed_with_roles_and_without_passwords() {
    let store = MemoryStore::new();
    let uow = store.begin().await.unwrap();
    let roles = RoleService::new();
    let viewer = roles.create(uow.as_ref(), RoleCommand::new("viewer")).await.unwrap();
    let editor = roles.create(uow.as_ref(), RoleCommand::new("editor")).await.unwrap();

    let service = users();
    let mut ivy = new_user("ivy", vec![viewer, editor]);
    ivy.email = "ivy@example.com".into();
    let ivy = service.create(uow.as_ref(), ivy).await.unwrap();
    let jack = service
        .create(uow.as_ref(), new_user("jack", vec![viewer]))
        .await
        .unwrap();
    let mut kim = new_user("kim", Vec::new());
    kim.status = Status::Disabled;
    service.create(uow.as_ref(), kim).await.unwrap();

    let all = service.query(uow.as_ref(), &UserQuery::default()).await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.iter().all(|u| u.password.is_none()));
    let listed_ivy = all.iter().find(|u| u.id == ivy).unwrap();
    assert_eq!(listed_ivy.user_roles.len(), 2);

    let query = UserQuery {
        role_ids: vec![viewer],
        ..Default::default()
    };
    let mut ids: Vec<_> = service
        .query(uow.as_ref(), &query)
        .await
        .unwrap()
        .iter()
        .map(|u| u.id)
        .collect();
    ids.sort();
    let mut expected = vec![ivy, jack];
    expected.sort();
    assert_eq!(ids, expected);

    let query = UserQuery {
        keyword: Some("example.com".into()),
        ..Default::default()
    };
    let found = service.query(uow.as_ref(), &query).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, ivy);

    let query = UserQuery {
        status: Some(Status::Disabled),
        ..Default::default()
    };
    let found = service.query(uow.as_ref(), &query).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].username, "kim");
    assert!(found[0].user_roles.is_empty());

    // 列表不带密码，但存储中的哈希保持不变
    service
        .verify(uow.as_ref(), "jack", "jack-password")
        .await
        .unwrap();
}
