//! 请求级事务
//!
//! 每个受保护请求在独立的 Unit of Work 中执行：
//! 处理器返回 4xx/5xx 或发生 panic 时回滚，否则提交；
//! 写请求提交成功后重新加载授权规则。

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use backoffice_errors::AppError;
use futures::FutureExt;
use http::request::Parts;
use tracing::{debug, error, warn};

use crate::application::PolicyEnforcer;
use crate::domain::unit_of_work::{UnitOfWork, UnitOfWorkFactory};

/// 请求扩展中的事务句柄
#[derive(Clone)]
pub struct Tx(pub Arc<dyn UnitOfWork>);

impl<S> FromRequestParts<S> for Tx
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Tx>()
            .cloned()
            .ok_or_else(|| AppError::internal("Transaction scope is not installed"))
    }
}

/// 事务作用域
pub struct TransactionScope {
    factory: Arc<dyn UnitOfWorkFactory>,
    enforcer: Arc<PolicyEnforcer>,
}

impl TransactionScope {
    pub fn new(factory: Arc<dyn UnitOfWorkFactory>, enforcer: Arc<PolicyEnforcer>) -> Self {
        Self { factory, enforcer }
    }

    /// 在事务中执行处理器
    ///
    /// 提交失败时响应已经生成，只记录错误并跳过规则重载。
    pub async fn execute<F, Fut>(&self, reload_after_commit: bool, handler: F) -> Response
    where
        F: FnOnce(Arc<dyn UnitOfWork>) -> Fut,
        Fut: Future<Output = Response>,
    {
        let uow: Arc<dyn UnitOfWork> = match self.factory.begin().await {
            Ok(uow) => Arc::from(uow),
            Err(e) => {
                error!(error = %e, "Failed to begin transaction");
                return e.into_response();
            }
        };

        let mut guard = OpenScope::new();
        let handle = uow.clone();
        let outcome = AssertUnwindSafe(async move { handler(handle).await })
            .catch_unwind()
            .await;

        let response = match outcome {
            Ok(response) => response,
            Err(panic) => {
                error!(panic = %panic_message(&panic), "Handler panicked, rolling back");
                rollback(uow.as_ref(), "panic").await;
                guard.close();
                return AppError::internal("Internal server error").into_response();
            }
        };

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let reason = if status.is_server_error() { "error" } else { "status" };
            debug!(status = status.as_u16(), "Handler failed, rolling back");
            rollback(uow.as_ref(), reason).await;
            guard.close();
            return response;
        }

        let committed = uow.commit().await;
        guard.close();
        match committed {
            Ok(()) => {
                metrics::counter!("admin_tx_committed_total").increment(1);
                if reload_after_commit {
                    if let Err(e) = self.enforcer.reload().await {
                        warn!(error = %e, "Policy reload after commit failed");
                    }
                }
            }
            Err(e) => {
                error!(
                    error = %e,
                    status = status.as_u16(),
                    "Commit failed after the response was produced"
                );
                metrics::counter!("admin_tx_commit_failed_total").increment(1);
            }
        }

        response
    }
}

/// 事务中间件，写请求提交后重载授权规则
pub async fn transaction_middleware(
    State(scope): State<Arc<TransactionScope>>,
    request: Request,
    next: Next,
) -> Response {
    let reload = !request.method().is_safe();
    scope
        .execute(reload, move |uow| async move {
            let mut request = request;
            request.extensions_mut().insert(Tx(uow));
            next.run(request).await
        })
        .await
}

async fn rollback(uow: &dyn UnitOfWork, reason: &'static str) {
    metrics::counter!("admin_tx_rolled_back_total", "reason" => reason).increment(1);
    if let Err(e) = uow.rollback().await {
        warn!(error = %e, reason, "Rollback failed");
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// 请求被取消时记录回滚，事务随句柄释放
struct OpenScope {
    open: bool,
}

impl OpenScope {
    fn new() -> Self {
        Self { open: true }
    }

    fn close(&mut self) {
        self.open = false;
    }
}

impl Drop for OpenScope {
    fn drop(&mut self) {
        if self.open {
            warn!("Request cancelled, transaction rolled back");
            metrics::counter!("admin_tx_rolled_back_total", "reason" => "cancelled").increment(1);
        }
    }
}
