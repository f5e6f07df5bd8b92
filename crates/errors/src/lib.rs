//! backoffice-errors - 统一错误处理
//!
//! 基于 RFC 7807 Problem Details 规范

use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(String),

    /// 策略重载失败 (只记录日志，不返回给调用方)
    #[error("Policy reload error: {0}")]
    PolicyReload(String),
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn policy_reload(msg: impl Into<String>) -> Self {
        Self::PolicyReload(msg.into())
    }

    /// 为错误附加上下文，保留错误类别
    pub fn context(self, ctx: impl AsRef<str>) -> Self {
        let ctx = ctx.as_ref();
        match self {
            Self::NotFound(m) => Self::NotFound(format!("{ctx}: {m}")),
            Self::Validation(m) => Self::Validation(format!("{ctx}: {m}")),
            Self::Conflict(m) => Self::Conflict(format!("{ctx}: {m}")),
            Self::Unauthorized(m) => Self::Unauthorized(format!("{ctx}: {m}")),
            Self::Forbidden(m) => Self::Forbidden(format!("{ctx}: {m}")),
            Self::Internal(m) => Self::Internal(format!("{ctx}: {m}")),
            Self::Database(m) => Self::Database(format!("{ctx}: {m}")),
            Self::PolicyReload(m) => Self::PolicyReload(format!("{ctx}: {m}")),
        }
    }

    /// 是否为服务端错误 (需要回滚并按 5xx 处理)
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// 转换为 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Validation(_) => 400,
            Self::Conflict(_) => 409,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::Internal(_) => 500,
            Self::Database(_) => 500,
            Self::PolicyReload(_) => 500,
        }
    }

    /// 转换为 Problem Details
    pub fn to_problem_details(&self) -> ProblemDetails {
        ProblemDetails {
            r#type: self.problem_type(),
            title: self.problem_title(),
            status: self.status_code(),
            detail: self.to_string(),
            instance: None,
        }
    }

    fn problem_type(&self) -> String {
        let slug = match self {
            Self::NotFound(_) => "not-found",
            Self::Validation(_) => "validation",
            Self::Conflict(_) => "conflict",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::Internal(_) => "internal",
            Self::Database(_) => "database",
            Self::PolicyReload(_) => "policy-reload",
        };
        format!("https://backoffice.local/problems/{slug}")
    }

    fn problem_title(&self) -> String {
        match self {
            Self::NotFound(_) => "Resource Not Found".to_string(),
            Self::Validation(_) => "Validation Error".to_string(),
            Self::Conflict(_) => "Conflict".to_string(),
            Self::Unauthorized(_) => "Unauthorized".to_string(),
            Self::Forbidden(_) => "Forbidden".to_string(),
            Self::Internal(_) => "Internal Server Error".to_string(),
            Self::Database(_) => "Database Error".to_string(),
            Self::PolicyReload(_) => "Policy Reload Error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let problem = self.to_problem_details();
        let status =
            StatusCode::from_u16(problem.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // 服务端错误不暴露内部细节
        let problem = if status.is_server_error() {
            ProblemDetails {
                detail: problem.title.clone(),
                ..problem
            }
        } else {
            problem
        };

        let body = serde_json::to_vec(&problem).unwrap_or_default();
        let mut response = (status, body).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

/// RFC 7807 Problem Details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDetails {
    pub r#type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

/// Result 类型别名
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::not_found("menu").status_code(), 404);
        assert_eq!(AppError::validation("name").status_code(), 400);
        assert_eq!(AppError::conflict("children").status_code(), 409);
        assert_eq!(AppError::database("down").status_code(), 500);
    }

    #[test]
    fn test_context_keeps_kind() {
        let err = AppError::not_found("Record not found").context("menu id");
        assert!(matches!(err, AppError::NotFound(ref m) if m == "menu id: Record not found"));
    }

    #[test]
    fn test_problem_details() {
        let problem = AppError::conflict("Menu has children").to_problem_details();
        assert_eq!(problem.status, 409);
        assert_eq!(problem.title, "Conflict");
        assert!(problem.r#type.ends_with("/conflict"));
        assert!(problem.detail.contains("Menu has children"));
    }

    #[test]
    fn test_into_response_hides_server_detail() {
        let response = AppError::database("connection refused to 10.0.0.1").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/problem+json"
        );
    }
}
