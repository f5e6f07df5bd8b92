//! 权限执行器
//!
//! 基于 Casbin 的 RBAC 模型。每次重载从规则来源构建新的内存 Enforcer，
//! 通过 ArcSwap 原子替换当前快照；判定只读取快照，不加锁。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use arc_swap::ArcSwap;
use backoffice_errors::{AppError, AppResult};
use casbin::{CoreApi, DefaultModel, Enforcer, MemoryAdapter, MgmtApi};
use tracing::{debug, info, warn};

use crate::domain::policy::{PolicyRules, PolicySource};

/// Casbin 模型: 用户通过角色继承权限，路径支持 `:param` 通配
pub const MODEL_CONF: &str = r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[role_definition]
g = _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g(r.sub, p.sub) && keyMatch2(r.obj, p.obj) && r.act == p.act
"#;

/// 由规则集构建内存 Enforcer
pub async fn build_enforcer(rules: &PolicyRules) -> casbin::Result<Enforcer> {
    let model = DefaultModel::from_str(MODEL_CONF).await?;
    let adapter = MemoryAdapter::default();
    let mut enforcer = Enforcer::new(model, adapter).await?;

    let mut permissions = rules.permissions.clone();
    permissions.sort();
    permissions.dedup();
    for rule in permissions {
        enforcer
            .add_policy(vec![rule.role, rule.path, rule.method])
            .await?;
    }

    let mut groupings = rules.groupings.clone();
    groupings.sort();
    groupings.dedup();
    for rule in groupings {
        enforcer.add_grouping_policy(vec![rule.user, rule.role]).await?;
    }

    enforcer.build_role_links()?;
    Ok(enforcer)
}

/// 不可变的规则快照
struct PolicySnapshot {
    generation: u64,
    /// None 表示尚未加载，全部拒绝
    enforcer: Option<Enforcer>,
}

/// 权限执行器
pub struct PolicyEnforcer {
    source: Arc<dyn PolicySource>,
    active: ArcSwap<PolicySnapshot>,
    generations: AtomicU64,
}

impl PolicyEnforcer {
    pub fn new(source: Arc<dyn PolicySource>) -> Self {
        Self {
            source,
            active: ArcSwap::from_pointee(PolicySnapshot {
                generation: 0,
                enforcer: None,
            }),
            generations: AtomicU64::new(0),
        }
    }

    /// 判定 subject 能否以 method 访问 path
    pub fn enforce(&self, subject: &str, path: &str, method: &str) -> AppResult<bool> {
        let snapshot = self.active.load();
        let Some(enforcer) = snapshot.enforcer.as_ref() else {
            return Ok(false);
        };
        enforcer
            .enforce((subject, path, method))
            .map_err(|e| AppError::internal(format!("Policy evaluation failed: {}", e)))
    }

    /// 当前生效快照的代数，0 表示从未成功加载
    pub fn generation(&self) -> u64 {
        self.active.load().generation
    }

    /// 从规则来源重新计算并替换快照
    ///
    /// 失败时保留旧快照。并发重载时，较早开始的重载不会覆盖较晚开始的结果。
    pub async fn reload(&self) -> AppResult<()> {
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();

        let result = async {
            let rules = self.source.load_rules().await?;
            let enforcer = build_enforcer(&rules)
                .await
                .map_err(|e| AppError::policy_reload(e.to_string()))?;
            Ok::<_, AppError>((rules, enforcer))
        }
        .await;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        metrics::histogram!("admin_policy_reload_duration_ms").record(elapsed_ms);

        match result {
            Ok((rules, enforcer)) => {
                let installed = self.install(PolicySnapshot {
                    generation,
                    enforcer: Some(enforcer),
                });
                metrics::counter!("admin_policy_reload_total", "outcome" => "success")
                    .increment(1);
                info!(
                    generation,
                    installed,
                    permissions = rules.permissions.len(),
                    groupings = rules.groupings.len(),
                    elapsed_ms,
                    "Policy reloaded"
                );
                Ok(())
            }
            Err(e) => {
                metrics::counter!("admin_policy_reload_total", "outcome" => "failure")
                    .increment(1);
                warn!(
                    generation,
                    active_generation = self.generation(),
                    error = %e,
                    "Policy reload failed, keeping previous snapshot"
                );
                Err(AppError::policy_reload(e.to_string()))
            }
        }
    }

    /// 仅当新快照不比当前快照旧时替换
    fn install(&self, snapshot: PolicySnapshot) -> bool {
        let candidate = Arc::new(snapshot);
        let previous = self.active.rcu(|current| {
            if current.generation > candidate.generation {
                Arc::clone(current)
            } else {
                Arc::clone(&candidate)
            }
        });
        let installed = previous.generation <= candidate.generation;
        if !installed {
            debug!(
                stale = candidate.generation,
                current = previous.generation,
                "Discarded stale policy snapshot"
            );
        }
        installed
    }
}
