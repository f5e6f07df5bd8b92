//! 身份与授权中间件

use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use backoffice_errors::AppError;
use http::request::Parts;
use tracing::{debug, error, warn};

use crate::application::PolicyEnforcer;

/// 网关转发的用户 ID 头
pub const USER_ID_HEADER: &str = "x-user-id";
/// 网关转发的用户名头
pub const USERNAME_HEADER: &str = "x-username";

/// 当前请求的用户
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub user_id: String,
    pub username: String,
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized("Missing user identity"))
    }
}

/// 身份中间件
///
/// 令牌已由网关校验，这里只读取转发的用户信息。
pub async fn identity_middleware(mut request: Request, next: Next) -> Response {
    let current = {
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        header(USER_ID_HEADER).map(|user_id| {
            let username = header(USERNAME_HEADER).unwrap_or_else(|| user_id.clone());
            CurrentUser { user_id, username }
        })
    };

    if let Some(user) = current {
        request.extensions_mut().insert(user);
    }

    next.run(request).await
}

/// 授权门禁的状态
pub struct AuthzState {
    pub enforcer: Arc<PolicyEnforcer>,
    pub ignore_prefixes: Vec<String>,
    /// 超级管理员不经过规则判定
    pub super_admin: String,
}

impl AuthzState {
    fn ignored(&self, path: &str) -> bool {
        self.ignore_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

/// 授权中间件，拒绝时不会执行受保护的处理器
pub async fn authorization_middleware(
    State(state): State<Arc<AuthzState>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if state.ignored(&path) {
        return next.run(request).await;
    }

    let Some(user) = request.extensions().get::<CurrentUser>().cloned() else {
        warn!(path = %path, "Request without user identity");
        return AppError::unauthorized("Missing user identity").into_response();
    };

    if user.user_id == state.super_admin {
        return next.run(request).await;
    }

    let method = request.method().as_str().to_string();
    match state.enforcer.enforce(&user.user_id, &path, &method) {
        Ok(true) => {
            metrics::counter!("admin_authz_decisions_total", "allowed" => "true").increment(1);
            debug!(user_id = %user.user_id, path = %path, method = %method, "Access granted");
            next.run(request).await
        }
        Ok(false) => {
            metrics::counter!("admin_authz_decisions_total", "allowed" => "false").increment(1);
            warn!(user_id = %user.user_id, path = %path, method = %method, "Access denied");
            AppError::forbidden("No permission to access this resource").into_response()
        }
        Err(e) => {
            metrics::counter!("admin_authz_decisions_total", "allowed" => "false").increment(1);
            error!(user_id = %user.user_id, error = %e, "Policy evaluation failed");
            AppError::forbidden("No permission to access this resource").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::policy::{GroupingRule, PermissionRule, PolicyRules, PolicySource};
    use async_trait::async_trait;
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
        middleware,
        routing::get,
    };
    use backoffice_errors::AppResult;
    use tower::ServiceExt;

    struct StaticSource(PolicyRules);

    #[async_trait]
    impl PolicySource for StaticSource {
        async fn load_rules(&self) -> AppResult<PolicyRules> {
            Ok(self.0.clone())
        }
    }

    async fn handler() -> impl IntoResponse {
        "OK"
    }

    async fn app() -> Router {
        let rules = PolicyRules {
            permissions: vec![PermissionRule {
                role: "viewer".into(),
                path: "/api/v1/menus/:id".into(),
                method: "GET".into(),
            }],
            groupings: vec![GroupingRule {
                user: "u1".into(),
                role: "viewer".into(),
            }],
        };
        let enforcer = Arc::new(PolicyEnforcer::new(Arc::new(StaticSource(rules))));
        enforcer.reload().await.unwrap();

        let state = Arc::new(AuthzState {
            enforcer,
            ignore_prefixes: vec!["/api/v1/pub/".into()],
            super_admin: "root".into(),
        });

        Router::new()
            .route("/api/v1/menus/{id}", get(handler).delete(handler))
            .route("/api/v1/pub/login", get(handler))
            .layer(middleware::from_fn_with_state(state, authorization_middleware))
            .layer(middleware::from_fn(identity_middleware))
    }

    fn request(method: &str, uri: &str, user: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(USER_ID_HEADER, user);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_granted_route() {
        let response = app()
            .await
            .oneshot(request("GET", "/api/v1/menus/42", Some("u1")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_denied_method() {
        let response = app()
            .await
            .oneshot(request("DELETE", "/api/v1/menus/42", Some("u1")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_missing_identity() {
        let response = app()
            .await
            .oneshot(request("GET", "/api/v1/menus/42", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_ignored_prefix_skips_check() {
        let response = app()
            .await
            .oneshot(request("GET", "/api/v1/pub/login", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_super_admin_bypasses_rules() {
        let response = app()
            .await
            .oneshot(request("DELETE", "/api/v1/menus/42", Some("root")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
