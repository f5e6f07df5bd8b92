//! admin-rbac 服务入口

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use admin_rbac::api::{AppState, AuthzState, TransactionScope, build_router};
use admin_rbac::application::{
    MenuSeed, MenuService, PolicyEnforcer, SuperAdmin, UserService, spawn_auto_reload,
};
use admin_rbac::domain::unit_of_work::UnitOfWorkFactory;
use admin_rbac::infrastructure::persistence::migrations;
use admin_rbac::infrastructure::{PostgresPolicySource, PostgresUnitOfWorkFactory};
use backoffice_adapter_postgres::{
    MigrationManager, PostgresConfig, TransactionManager, check_connection, create_pool,
};
use backoffice_config::AppConfig;
use backoffice_errors::{AppError, AppResult};
use secrecy::ExposeSecret;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const DEFAULT_ADMIN_PASSWORD: &str = "changeme";
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load("config")?;
    backoffice_telemetry::init(&config.telemetry.log_level, config.telemetry.json);
    let metrics = match backoffice_telemetry::init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Prometheus recorder not installed");
            None
        }
    };

    info!(app = %config.app_name, env = %config.app_env, "Starting admin-rbac");

    // 数据库
    let pg_config = PostgresConfig::new(config.database.url.expose_secret().clone())
        .with_max_connections(config.database.max_connections)
        .with_application_name(config.app_name.clone());
    let pool = create_pool(&pg_config).await?;
    let version = check_connection(&pool).await?;
    info!(%version, "Database reachable");

    let report = MigrationManager::new(pool.clone())
        .migrate(&migrations())
        .await?;
    info!(
        applied = ?report.applied,
        skipped = report.skipped.len(),
        modified = ?report.modified,
        "Migrations finished"
    );

    let factory: Arc<dyn UnitOfWorkFactory> = Arc::new(PostgresUnitOfWorkFactory::new(
        TransactionManager::new(pool.clone()),
    ));

    if let Some(path) = &config.seed.menu_file {
        seed_menus(factory.as_ref(), path).await?;
    }

    // 授权规则
    let enforcer = Arc::new(PolicyEnforcer::new(Arc::new(PostgresPolicySource::new(
        pool.clone(),
    ))));
    if let Err(e) = enforcer.reload().await {
        warn!(error = %e, "Initial policy load failed, all requests will be denied until reload");
    }
    if config.enforcer.auto_reload_secs > 0 {
        spawn_auto_reload(
            enforcer.clone(),
            Duration::from_secs(config.enforcer.auto_reload_secs),
        );
    }

    if config.is_production()
        && config.super_admin.password.expose_secret() == DEFAULT_ADMIN_PASSWORD
    {
        return Err("super_admin.password must be changed in production".into());
    }
    let super_admin = SuperAdmin {
        username: config.super_admin.username.clone(),
        real_name: config.super_admin.real_name.clone(),
        password: config.super_admin.password.clone(),
    };
    let authz = config.enforcer.enabled.then(|| {
        Arc::new(AuthzState {
            enforcer: enforcer.clone(),
            ignore_prefixes: config.enforcer.ignore_path_prefixes.clone(),
            super_admin: super_admin.username.clone(),
        })
    });
    if authz.is_none() {
        warn!("Authorization is disabled");
    }

    let scope = Arc::new(TransactionScope::new(factory, enforcer));
    let state = Arc::new(AppState {
        users: UserService::new(super_admin),
    });

    // 超时会丢弃处理器 future，事务按取消回滚
    let app = build_router(state, scope, authz, metrics)
        .layer(TimeoutLayer::new(Duration::from_secs(config.server.request_timeout_secs)))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = config.server.listen_addr().parse()?;
    info!(%addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// 菜单表为空时导入初始化菜单
async fn seed_menus(factory: &dyn UnitOfWorkFactory, path: &str) -> AppResult<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AppError::internal(format!("Failed to read menu file {}: {}", path, e)))?;
    let seeds: Vec<MenuSeed> = serde_json::from_str(&content)
        .map_err(|e| AppError::validation(format!("Invalid menu file {}: {}", path, e)))?;

    let uow = factory.begin().await?;
    if uow.menus().count().await? > 0 {
        uow.rollback().await?;
        return Ok(());
    }

    match MenuService::new().create_menus(uow.as_ref(), None, seeds).await {
        Ok(created) => {
            uow.commit().await?;
            info!(created, file = path, "Menus seeded");
            Ok(())
        }
        Err(e) => {
            uow.rollback().await?;
            Err(e.context("Menu seed failed"))
        }
    }
}
