//! PostgreSQL Unit of Work 实现

use std::sync::Arc;

use async_trait::async_trait;
use backoffice_adapter_postgres::TransactionManager;
use backoffice_errors::{AppError, AppResult};
use sqlx::{Postgres, Transaction};
use tokio::sync::Mutex;

use super::tx_repositories::{
    SharedTx, TxActionResourceRepository, TxMenuActionRepository, TxMenuRepository,
    TxRoleMenuRepository, TxRoleRepository, TxUserRepository, TxUserRoleRepository,
};
use crate::domain::menu::{ActionResourceRepository, MenuActionRepository, MenuRepository};
use crate::domain::role::{RoleMenuRepository, RoleRepository};
use crate::domain::unit_of_work::{UnitOfWork, UnitOfWorkFactory};
use crate::domain::user::{UserRepository, UserRoleRepository};

/// Postgres Unit of Work 工厂
pub struct PostgresUnitOfWorkFactory {
    transactions: TransactionManager,
}

impl PostgresUnitOfWorkFactory {
    pub fn new(transactions: TransactionManager) -> Self {
        Self { transactions }
    }
}

#[async_trait]
impl UnitOfWorkFactory for PostgresUnitOfWorkFactory {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let tx = self.transactions.begin().await?;
        Ok(Box::new(PostgresUnitOfWork::new(tx)))
    }
}

/// Postgres Unit of Work 实现
pub struct PostgresUnitOfWork {
    tx: SharedTx,
    menu_repo: TxMenuRepository,
    action_repo: TxMenuActionRepository,
    resource_repo: TxActionResourceRepository,
    role_repo: TxRoleRepository,
    role_menu_repo: TxRoleMenuRepository,
    user_repo: TxUserRepository,
    user_role_repo: TxUserRoleRepository,
}

impl PostgresUnitOfWork {
    pub fn new(tx: Transaction<'static, Postgres>) -> Self {
        let tx = Arc::new(Mutex::new(Some(tx)));

        Self {
            tx: tx.clone(),
            menu_repo: TxMenuRepository::new(tx.clone()),
            action_repo: TxMenuActionRepository::new(tx.clone()),
            resource_repo: TxActionResourceRepository::new(tx.clone()),
            role_repo: TxRoleRepository::new(tx.clone()),
            role_menu_repo: TxRoleMenuRepository::new(tx.clone()),
            user_repo: TxUserRepository::new(tx.clone()),
            user_role_repo: TxUserRoleRepository::new(tx),
        }
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    fn menus(&self) -> &dyn MenuRepository {
        &self.menu_repo
    }

    fn actions(&self) -> &dyn MenuActionRepository {
        &self.action_repo
    }

    fn resources(&self) -> &dyn ActionResourceRepository {
        &self.resource_repo
    }

    fn roles(&self) -> &dyn RoleRepository {
        &self.role_repo
    }

    fn role_menus(&self) -> &dyn RoleMenuRepository {
        &self.role_menu_repo
    }

    fn users(&self) -> &dyn UserRepository {
        &self.user_repo
    }

    fn user_roles(&self) -> &dyn UserRoleRepository {
        &self.user_role_repo
    }

    async fn commit(&self) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .take()
            .ok_or_else(|| AppError::internal("Transaction already consumed"))?;

        TransactionManager::commit(tx).await
    }

    async fn rollback(&self) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .take()
            .ok_or_else(|| AppError::internal("Transaction already consumed"))?;

        TransactionManager::rollback(tx).await
    }
}
