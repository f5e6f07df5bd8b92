//! HTTP 路由装配

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router, middleware};
use backoffice_errors::AppResult;
use backoffice_telemetry::MetricsHandle;
use serde_json::json;

use super::authorization::{AuthzState, CurrentUser, authorization_middleware, identity_middleware};
use super::transaction::{TransactionScope, Tx, transaction_middleware};
use crate::application::{UserInfo, UserService};
use crate::domain::menu::MenuTree;

/// 处理器共享的服务
pub struct AppState {
    pub users: UserService,
}

/// 给业务路由套上 身份 → 授权 → 事务 三层中间件
///
/// `authz` 为 None 时不做权限判定。
pub fn protect(
    routes: Router,
    scope: Arc<TransactionScope>,
    authz: Option<Arc<AuthzState>>,
) -> Router {
    let routes = routes.layer(middleware::from_fn_with_state(scope, transaction_middleware));
    let routes = match authz {
        Some(state) => routes.layer(middleware::from_fn_with_state(
            state,
            authorization_middleware,
        )),
        None => routes,
    };
    routes.layer(middleware::from_fn(identity_middleware))
}

/// 完整路由
pub fn build_router(
    state: Arc<AppState>,
    scope: Arc<TransactionScope>,
    authz: Option<Arc<AuthzState>>,
    metrics: Option<MetricsHandle>,
) -> Router {
    let api = Router::new()
        .route("/api/v1/current/user", get(current_user))
        .route("/api/v1/current/menutree", get(current_menu_tree))
        .with_state(state);

    let mut router = Router::new()
        .merge(protect(api, scope, authz))
        .route("/health", get(health_check));

    if let Some(handle) = metrics {
        router = router.merge(
            Router::new()
                .route("/metrics", get(render_metrics))
                .with_state(handle),
        );
    }
    router
}

async fn current_user(
    State(state): State<Arc<AppState>>,
    Tx(uow): Tx,
    user: CurrentUser,
) -> AppResult<Json<UserInfo>> {
    let info = state.users.user_info(uow.as_ref(), &user.user_id).await?;
    Ok(Json(info))
}

async fn current_menu_tree(
    State(state): State<Arc<AppState>>,
    Tx(uow): Tx,
    user: CurrentUser,
) -> AppResult<Json<Vec<MenuTree>>> {
    let tree = state.users.menu_tree(uow.as_ref(), &user.user_id).await?;
    Ok(Json(tree))
}

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

async fn render_metrics(State(handle): State<MetricsHandle>) -> String {
    handle.render()
}
