//! 菜单树与动作同步

use admin_rbac::application::{
    ActionInput, ListMenusQuery, MenuCommand, MenuListResult, MenuService, RoleCommand,
    RoleService,
};
use admin_rbac::domain::menu::{MenuId, MenuQuery, build_tree, flatten};
use admin_rbac::domain::unit_of_work::{UnitOfWork, UnitOfWorkFactory};
use admin_rbac::infrastructure::MemoryStore;
use backoffice_errors::AppError;

async fn create(
    service: &MenuService,
    uow: &dyn UnitOfWork,
    name: &str,
    parent: Option<MenuId>,
) -> MenuId {
    service
        .create(uow, MenuCommand::new(name, parent))
        .await
        .unwrap()
}

#[tokio::test]
async fn reparent_propagates_descendant_paths() {
    let store = MemoryStore::new();
    let service = MenuService::new();
    let uow = store.begin().await.unwrap();

    let a = create(&service, uow.as_ref(), "A", None).await;
    let b = create(&service, uow.as_ref(), "B", None).await;
    let r = create(&service, uow.as_ref(), "R", Some(a)).await;
    let c = create(&service, uow.as_ref(), "C", Some(r)).await;
    let d = create(&service, uow.as_ref(), "D", Some(c)).await;

    let before = service.get(uow.as_ref(), c).await.unwrap();
    assert_eq!(before.parent_path, format!("{}/{}", a, r));

    let moved = service.reparent(uow.as_ref(), r, Some(b)).await.unwrap();
    assert_eq!(moved.parent_path, b.to_string());

    let c_after = service.get(uow.as_ref(), c).await.unwrap();
    assert_eq!(c_after.parent_path, format!("{}/{}", b, r));
    let d_after = service.get(uow.as_ref(), d).await.unwrap();
    assert_eq!(d_after.parent_path, format!("{}/{}/{}", b, r, c));

    // 移到根节点
    service.reparent(uow.as_ref(), r, None).await.unwrap();
    let c_root = service.get(uow.as_ref(), c).await.unwrap();
    assert_eq!(c_root.parent_path, r.to_string());

    uow.commit().await.unwrap();
}

#[tokio::test]
async fn reparent_rejects_cycles() {
    let store = MemoryStore::new();
    let service = MenuService::new();
    let uow = store.begin().await.unwrap();

    let a = create(&service, uow.as_ref(), "A", None).await;
    let b = create(&service, uow.as_ref(), "B", Some(a)).await;
    let c = create(&service, uow.as_ref(), "C", Some(b)).await;

    let err = service.reparent(uow.as_ref(), a, Some(c)).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    let err = service.reparent(uow.as_ref(), a, Some(a)).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // 同一父节点不做任何修改
    let same = service.reparent(uow.as_ref(), b, Some(a)).await.unwrap();
    assert_eq!(same.parent_path, a.to_string());
}

#[tokio::test]
async fn sibling_names_are_unique() {
    let store = MemoryStore::new();
    let service = MenuService::new();
    let uow = store.begin().await.unwrap();

    let a = create(&service, uow.as_ref(), "A", None).await;
    let b = create(&service, uow.as_ref(), "B", None).await;
    create(&service, uow.as_ref(), "Users", Some(a)).await;
    let users_b = create(&service, uow.as_ref(), "Users", Some(b)).await;

    let err = service
        .create(uow.as_ref(), MenuCommand::new("Users", Some(a)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = service.reparent(uow.as_ref(), users_b, Some(a)).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn delete_is_guarded_by_children() {
    let store = MemoryStore::new();
    let service = MenuService::new();
    let uow = store.begin().await.unwrap();

    let parent = create(&service, uow.as_ref(), "Parent", None).await;
    let child = create(&service, uow.as_ref(), "Child", Some(parent)).await;

    let err = service.delete(uow.as_ref(), parent).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    service.delete(uow.as_ref(), child).await.unwrap();
    service.delete(uow.as_ref(), parent).await.unwrap();

    let err = service.delete(uow.as_ref(), parent).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn delete_removes_actions_resources_and_grants() {
    let store = MemoryStore::new();
    let menus = MenuService::new();
    let roles = RoleService::new();
    let uow = store.begin().await.unwrap();

    let keep = menus
        .create(
            uow.as_ref(),
            MenuCommand::new("Roles", None).with_action(
                ActionInput::new("view", "View").with_resource("GET", "/api/v1/roles"),
            ),
        )
        .await
        .unwrap();
    let doomed = menus
        .create(
            uow.as_ref(),
            MenuCommand::new("Menus", None).with_action(
                ActionInput::new("view", "View").with_resource("GET", "/api/v1/menus"),
            ),
        )
        .await
        .unwrap();
    let keep_view = menus.get(uow.as_ref(), keep).await.unwrap().actions[0].id;
    let doomed_view = menus.get(uow.as_ref(), doomed).await.unwrap().actions[0].id;
    let role_id = roles
        .create(
            uow.as_ref(),
            RoleCommand::new("viewer")
                .grant(keep, keep_view)
                .grant(doomed, doomed_view),
        )
        .await
        .unwrap();

    menus.delete(uow.as_ref(), doomed).await.unwrap();
    uow.commit().await.unwrap();

    let state = store.snapshot().await;
    assert!(state.menus.iter().all(|m| m.id != doomed));
    assert_eq!(state.actions.len(), 1);
    assert_eq!(state.actions[0].menu_id, keep);
    assert_eq!(state.resources.len(), 1);
    assert_eq!(state.resources[0].path, "/api/v1/roles");
    assert_eq!(state.role_menus.len(), 1);
    assert_eq!(state.role_menus[0].role_id, role_id);
    assert_eq!(state.role_menus[0].menu_id, keep);
}

#[tokio::test]
async fn update_actions_reconciles_by_code() {
    let store = MemoryStore::new();
    let menus = MenuService::new();
    let roles = RoleService::new();
    let uow = store.begin().await.unwrap();

    let cmd = MenuCommand::new("Menus", None)
        .with_action(ActionInput::new("view", "View").with_resource("GET", "/api/v1/menus"))
        .with_action(
            ActionInput::new("edit", "Edit")
                .with_resource("PUT", "/api/v1/menus/:id")
                .with_resource("GET", "/api/v1/menus/:id"),
        );
    let menu_id = menus.create(uow.as_ref(), cmd).await.unwrap();
    let before = menus.get(uow.as_ref(), menu_id).await.unwrap();
    let view = before.actions.iter().find(|a| a.code == "view").unwrap().clone();
    let edit = before.actions.iter().find(|a| a.code == "edit").unwrap().clone();

    let role_id = roles
        .create(uow.as_ref(), RoleCommand::new("viewer").grant(menu_id, view.id))
        .await
        .unwrap();

    let diff = menus
        .update_actions(
            uow.as_ref(),
            menu_id,
            vec![
                ActionInput::new("edit", "Edit v2")
                    .with_resource("PUT", "/api/v1/menus/:id")
                    .with_resource("PATCH", "/api/v1/menus/:id/status"),
                ActionInput::new("delete", "Delete").with_resource("DELETE", "/api/v1/menus/:id"),
            ],
        )
        .await
        .unwrap();

    assert_eq!(diff.to_add.iter().map(|a| a.code.as_str()).collect::<Vec<_>>(), ["delete"]);
    assert_eq!(diff.to_remove.iter().map(|a| a.code.as_str()).collect::<Vec<_>>(), ["view"]);
    assert_eq!(diff.to_update.len(), 1);
    assert_eq!(diff.to_update[0].0.id, edit.id);
    assert_eq!(diff.to_update[0].1.name, "Edit v2");

    let after = menus.get(uow.as_ref(), menu_id).await.unwrap();
    let kept = after.actions.iter().find(|a| a.code == "edit").unwrap();
    assert_eq!(kept.id, edit.id);
    assert_eq!(kept.name, "Edit v2");
    let mut kept_resources: Vec<(String, String)> = kept
        .resources
        .iter()
        .map(|r| (r.method.clone(), r.path.clone()))
        .collect();
    kept_resources.sort();
    assert_eq!(
        kept_resources,
        [
            ("PATCH".to_string(), "/api/v1/menus/:id/status".to_string()),
            ("PUT".to_string(), "/api/v1/menus/:id".to_string()),
        ]
    );
    assert!(after.actions.iter().all(|a| a.code != "view"));

    // 删除动作时一并移除角色授权
    let role = roles.get(uow.as_ref(), role_id).await.unwrap();
    assert!(role.role_menus.is_empty());

    let state_resources = uow.resources().find_by_actions(&[view.id]).await.unwrap();
    assert!(state_resources.is_empty());
}

#[tokio::test]
async fn duplicate_action_codes_are_rejected() {
    let store = MemoryStore::new();
    let menus = MenuService::new();
    let uow = store.begin().await.unwrap();

    let cmd = MenuCommand::new("Menus", None)
        .with_action(ActionInput::new("view", "View"))
        .with_action(ActionInput::new("view", "View again"));
    let err = menus.create(uow.as_ref(), cmd).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn query_tree_round_trips() {
    let store = MemoryStore::new();
    let service = MenuService::new();
    let uow = store.begin().await.unwrap();

    let mut system = MenuCommand::new("System", None);
    system.sequence = 1;
    let system = service.create(uow.as_ref(), system).await.unwrap();
    let mut users = MenuCommand::new("Users", Some(system));
    users.sequence = 2;
    service.create(uow.as_ref(), users).await.unwrap();
    let mut menus = MenuCommand::new("Menus", Some(system));
    menus.sequence = 1;
    let menus = service.create(uow.as_ref(), menus).await.unwrap();
    service
        .create(uow.as_ref(), MenuCommand::new("Buttons", Some(menus)))
        .await
        .unwrap();

    let result = service
        .query(
            uow.as_ref(),
            ListMenusQuery {
                tree: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let MenuListResult::Tree(tree) = result else {
        panic!("expected tree result");
    };

    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].children.len(), 2);
    assert_eq!(tree[0].children[0].menu.name, "Menus");
    assert_eq!(tree[0].children[0].children[0].menu.name, "Buttons");
    assert_eq!(build_tree(flatten(&tree)), tree);
}

#[tokio::test]
async fn query_by_path_prefix_returns_subtree() {
    let store = MemoryStore::new();
    let service = MenuService::new();
    let uow = store.begin().await.unwrap();

    let a = create(&service, uow.as_ref(), "A", None).await;
    let b = create(&service, uow.as_ref(), "B", Some(a)).await;
    create(&service, uow.as_ref(), "C", Some(b)).await;
    create(&service, uow.as_ref(), "Other", None).await;

    let result = service
        .query(
            uow.as_ref(),
            ListMenusQuery {
                filter: MenuQuery {
                    prefix_parent_path: Some(a.to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let MenuListResult::List(list) = result else {
        panic!("expected list result");
    };
    let mut names: Vec<&str> = list.iter().map(|m| m.name.as_str()).collect();
    names.sort();
    assert_eq!(names, ["B", "C"]);
}

#[tokio::test]
async fn seeds_are_imported_recursively() {
    let store = MemoryStore::new();
    let service = MenuService::new();
    let seeds = serde_json::from_str(
        r#"[
            {"name": "System", "children": [
                {"name": "Menus", "actions": [{"code": "view", "name": "View",
                    "resources": [{"method": "GET", "path": "/api/v1/menus"}]}]},
                {"name": "Roles"}
            ]}
        ]"#,
    )
    .unwrap();

    let uow = store.begin().await.unwrap();
    let created = service.create_menus(uow.as_ref(), None, seeds).await.unwrap();
    uow.commit().await.unwrap();

    assert_eq!(created, 3);
    let state = store.snapshot().await;
    assert_eq!(state.menus.len(), 3);
    assert_eq!(state.actions.len(), 1);
    assert_eq!(state.resources.len(), 1);
    let system = state.menus.iter().find(|m| m.name == "System").unwrap();
    assert!(
        state
            .menus
            .iter()
            .filter(|m| m.name != "System")
            .all(|m| m.parent_path == system.id.to_string())
    );
}
