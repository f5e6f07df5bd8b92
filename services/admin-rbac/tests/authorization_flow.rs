//! 请求事务与授权规则的联动

use std::sync::Arc;

use admin_rbac::api::{AuthzState, TransactionScope, Tx, protect};
use admin_rbac::application::{
    ActionInput, CreateUserCommand, MenuCommand, MenuService, PolicyEnforcer, RoleCommand,
    RoleService, SuperAdmin, UserService,
};
use admin_rbac::domain::Status;
use admin_rbac::domain::menu::{ActionId, MenuId};
use admin_rbac::domain::role::RoleId;
use admin_rbac::domain::unit_of_work::UnitOfWorkFactory;
use admin_rbac::domain::user::UserId;
use admin_rbac::infrastructure::MemoryStore;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use backoffice_errors::AppError;
use secrecy::Secret;
use tower::ServiceExt;

struct Fixture {
    store: MemoryStore,
    enforcer: Arc<PolicyEnforcer>,
    menu_id: MenuId,
    view_id: ActionId,
    role_id: RoleId,
    user_id: UserId,
}

/// 菜单 `Menus` 带 view 动作；角色 viewer 未授权；用户 alice 属于 viewer
async fn fixture() -> Fixture {
    let store = MemoryStore::new();
    let uow = store.begin().await.unwrap();

    let menu_id = MenuService::new()
        .create(
            uow.as_ref(),
            MenuCommand::new("Menus", None).with_action(
                ActionInput::new("view", "View").with_resource("GET", "/api/v1/menus/:id"),
            ),
        )
        .await
        .unwrap();
    let view_id = MenuService::new()
        .get(uow.as_ref(), menu_id)
        .await
        .unwrap()
        .actions[0]
        .id;

    let role_id = RoleService::new()
        .create(uow.as_ref(), RoleCommand::new("viewer"))
        .await
        .unwrap();

    let user_id = users()
        .create(
            uow.as_ref(),
            CreateUserCommand {
                username: "alice".into(),
                real_name: "Alice".into(),
                password: Secret::new("alice-password".to_string()),
                email: String::new(),
                phone: String::new(),
                status: Status::Enabled,
                role_ids: vec![role_id],
                performed_by: "root".into(),
            },
        )
        .await
        .unwrap();
    uow.commit().await.unwrap();

    let enforcer = Arc::new(PolicyEnforcer::new(Arc::new(store.clone())));
    enforcer.reload().await.unwrap();

    Fixture {
        store,
        enforcer,
        menu_id,
        view_id,
        role_id,
        user_id,
    }
}

fn users() -> UserService {
    UserService::new(SuperAdmin {
        username: "root".into(),
        real_name: "Root".into(),
        password: Secret::new("root-password".to_string()),
    })
}

fn scope(f: &Fixture) -> Arc<TransactionScope> {
    Arc::new(TransactionScope::new(
        Arc::new(f.store.clone()),
        f.enforcer.clone(),
    ))
}

fn post_request(uri: &str) -> Request<Body> {
    Request::post(uri)
        .header("x-user-id", "root")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn grant_commit_reload_flips_decision() {
    let f = fixture().await;
    let alice = f.user_id.to_string();
    assert!(!f.enforcer.enforce(&alice, "/api/v1/menus/7", "GET").unwrap());

    let (role_id, menu_id, view_id) = (f.role_id, f.menu_id, f.view_id);
    let routes = Router::new().route(
        "/grant",
        post(move |Tx(uow): Tx| async move {
            RoleService::new()
                .update(
                    uow.as_ref(),
                    role_id,
                    RoleCommand::new("viewer").grant(menu_id, view_id),
                )
                .await?;
            Ok::<_, AppError>(StatusCode::OK)
        }),
    );
    let app = protect(routes, scope(&f), None);

    let generation = f.enforcer.generation();
    let response = app.oneshot(post_request("/grant")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert!(f.enforcer.generation() > generation);
    assert!(f.enforcer.enforce(&alice, "/api/v1/menus/7", "GET").unwrap());
    assert!(!f.enforcer.enforce(&alice, "/api/v1/menus/7", "DELETE").unwrap());
}

#[tokio::test]
async fn failed_handler_rolls_back_without_reload() {
    let f = fixture().await;
    let routes = Router::new().route(
        "/menus",
        post(|Tx(uow): Tx| async move {
            MenuService::new()
                .create(uow.as_ref(), MenuCommand::new("Draft", None))
                .await?;
            Err::<StatusCode, _>(AppError::validation("rejected after write"))
        }),
    );
    let app = protect(routes, scope(&f), None);

    let generation = f.enforcer.generation();
    let response = app.oneshot(post_request("/menus")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(f.enforcer.generation(), generation);
    let state = f.store.snapshot().await;
    assert!(state.menus.iter().all(|m| m.name != "Draft"));
}

#[tokio::test]
async fn conflict_response_rolls_back() {
    let f = fixture().await;
    let role_id = f.role_id;
    let routes = Router::new().route(
        "/roles/delete",
        post(move |Tx(uow): Tx| async move {
            RoleService::new().delete(uow.as_ref(), role_id).await?;
            Ok::<_, AppError>(StatusCode::NO_CONTENT)
        }),
    );
    let app = protect(routes, scope(&f), None);

    let response = app.oneshot(post_request("/roles/delete")).await.unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(f.store.snapshot().await.roles.len(), 1);
}

#[tokio::test]
async fn disabling_a_role_revokes_access() {
    let f = fixture().await;
    let alice = f.user_id.to_string();

    let uow = f.store.begin().await.unwrap();
    RoleService::new()
        .update(
            uow.as_ref(),
            f.role_id,
            RoleCommand::new("viewer").grant(f.menu_id, f.view_id),
        )
        .await
        .unwrap();
    uow.commit().await.unwrap();
    f.enforcer.reload().await.unwrap();
    assert!(f.enforcer.enforce(&alice, "/api/v1/menus/1", "GET").unwrap());

    let role_id = f.role_id;
    let routes = Router::new().route(
        "/roles/disable",
        post(move |Tx(uow): Tx| async move {
            RoleService::new()
                .update_status(uow.as_ref(), role_id, Status::Disabled)
                .await?;
            Ok::<_, AppError>(StatusCode::OK)
        }),
    );
    let app = protect(routes, scope(&f), None);
    let response = app.oneshot(post_request("/roles/disable")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(!f.enforcer.enforce(&alice, "/api/v1/menus/1", "GET").unwrap());
}

#[tokio::test]
async fn gate_rejects_before_handler_runs() {
    let f = fixture().await;
    let routes = Router::new().route(
        "/api/v1/menus/{id}",
        get(|Tx(_uow): Tx| async move { StatusCode::OK }),
    );
    let authz = Arc::new(AuthzState {
        enforcer: f.enforcer.clone(),
        ignore_prefixes: Vec::new(),
        super_admin: "root".into(),
    });
    let app = protect(routes, scope(&f), Some(authz));

    let commits = f.store.commit_count();
    let response = app
        .clone()
        .oneshot(
            Request::get("/api/v1/menus/3")
                .header("x-user-id", f.user_id.to_string())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(f.store.commit_count(), commits);

    let response = app
        .oneshot(
            Request::get("/api/v1/menus/3")
                .header("x-user-id", "root")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(f.store.commit_count(), commits + 1);
}

#[tokio::test]
async fn failed_reload_keeps_previous_decisions() {
    let f = fixture().await;
    let alice = f.user_id.to_string();

    let (role_id, menu_id, view_id) = (f.role_id, f.menu_id, f.view_id);
    f.store.set_policy_load_failure(true);
    let routes = Router::new().route(
        "/grant",
        post(move |Tx(uow): Tx| async move {
            RoleService::new()
                .update(
                    uow.as_ref(),
                    role_id,
                    RoleCommand::new("viewer").grant(menu_id, view_id),
                )
                .await?;
            Ok::<_, AppError>(StatusCode::OK)
        }),
    );
    let app = protect(routes, scope(&f), None);

    let response = app.oneshot(post_request("/grant")).await.unwrap();

    // 提交成功，规则仍是旧快照
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(f.store.snapshot().await.role_menus.len(), 1);
    assert!(!f.enforcer.enforce(&alice, "/api/v1/menus/7", "GET").unwrap());

    f.store.set_policy_load_failure(false);
    f.enforcer.reload().await.unwrap();
    assert!(f.enforcer.enforce(&alice, "/api/v1/menus/7", "GET").unwrap());
}
