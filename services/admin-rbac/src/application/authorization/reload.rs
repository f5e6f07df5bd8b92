//! 定时重载
//!
//! 提交后重载失败时，旧快照会一直生效到下一次成功重载；定时任务为此设定上限。

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::enforcer::PolicyEnforcer;

/// 启动后台重载任务
pub fn spawn_auto_reload(enforcer: Arc<PolicyEnforcer>, period: Duration) -> JoinHandle<()> {
    info!(period_secs = period.as_secs_f64(), "Policy auto reload started");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 第一次 tick 立即返回
        ticker.tick().await;
        loop {
            ticker.tick().await;
            debug!("Periodic policy reload");
            // 失败已在 reload 内部记录
            let _ = enforcer.reload().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::policy::{PolicyRules, PolicySource};
    use async_trait::async_trait;
    use backoffice_errors::AppResult;

    struct EmptySource;

    #[async_trait]
    impl PolicySource for EmptySource {
        async fn load_rules(&self) -> AppResult<PolicyRules> {
            Ok(PolicyRules::default())
        }
    }

    #[tokio::test]
    async fn test_auto_reload_advances_generation() {
        let enforcer = Arc::new(PolicyEnforcer::new(Arc::new(EmptySource)));
        let handle = spawn_auto_reload(enforcer.clone(), Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.abort();

        assert!(enforcer.generation() >= 1);
    }
}
