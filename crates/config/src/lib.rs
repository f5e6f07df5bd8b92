//! backoffice-config - 配置加载库

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use secrecy::Secret;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    // 开发环境: 10, 生产环境: 50
    match std::env::var("APP_ENV").as_deref() {
        Ok("production") => 50,
        _ => 10,
    }
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// 单个请求的处理时限，超时的请求事务回滚
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl ServerConfig {
    /// 监听地址
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 是否输出 JSON 格式日志
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: false,
        }
    }
}

/// 权限执行器配置
#[derive(Debug, Clone, Deserialize)]
pub struct EnforcerConfig {
    /// 是否启用鉴权
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 跳过鉴权的路径前缀
    #[serde(default)]
    pub ignore_path_prefixes: Vec<String>,
    /// 定时重载间隔 (秒)，0 表示关闭
    #[serde(default)]
    pub auto_reload_secs: u64,
}

fn default_true() -> bool {
    true
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ignore_path_prefixes: Vec::new(),
            auto_reload_secs: 0,
        }
    }
}

/// 超级管理员配置
#[derive(Debug, Clone, Deserialize)]
pub struct SuperAdminConfig {
    pub username: String,
    #[serde(default)]
    pub real_name: String,
    pub password: Secret<String>,
}

/// 初始化数据配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedConfig {
    /// 菜单初始化文件 (JSON)
    pub menu_file: Option<String>,
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_name: String,
    #[serde(default)]
    pub app_env: String,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub enforcer: EnforcerConfig,
    pub super_admin: SuperAdminConfig,
    #[serde(default)]
    pub seed: SeedConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 环境变量以 `APP_` 为前缀，`__` 分隔层级，例如 `APP_DATABASE__URL`
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let mut config: Self = Figment::new()
            .merge(Toml::file(format!("{}/default.toml", config_dir)))
            .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
            .merge(Env::prefixed("APP_").split("__"))
            .extract()?;

        config.app_env = env;
        Ok(config)
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }
}
