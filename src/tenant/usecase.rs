use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use super::entity::{ConcurrencyUpdate, NewTenant, Tenant, TenantUpdate};
use super::repository::TenantRepository;
use crate::broker::TenantManager;
use crate::error::TenantError;

/// Ties persisted tenant CRUD to Tenant Manager lifecycle calls (4.F).
pub struct TenantUseCase {
    pool: PgPool,
    manager: Arc<TenantManager>,
    default_workers: i32,
}

impl TenantUseCase {
    pub fn new(pool: PgPool, manager: Arc<TenantManager>, default_workers: i32) -> Self {
        Self {
            pool,
            manager,
            default_workers,
        }
    }

    /// Inserts the tenant row and creates its message partition in one
    /// transaction; on commit, starts its consumer. A consumer-start
    /// failure is logged, not propagated: the health supervisor reconciles.
    pub async fn create(&self, new: NewTenant) -> Result<Tenant, TenantError> {
        if new.name.trim().is_empty() {
            return Err(TenantError::InvalidInput("name must not be empty".to_string()));
        }
        if let Some(w) = new.workers {
            if w <= 0 {
                return Err(TenantError::InvalidInput("workers must be > 0".to_string()));
            }
        }

        let id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;
        let tenant = {
            let mut repo = TenantRepository::from_tx(&mut tx);
            let tenant = repo.create(id, &new, self.default_workers).await?;
            repo.create_partition(id).await?;
            tenant
        };
        tx.commit().await?;

        if let Err(e) = self.manager.start_consumer(id).await {
            tracing::warn!(tenant_id = %id, error = %e, "failed to start consumer for new tenant; supervisor will reconcile");
        }

        Ok(tenant)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Tenant, TenantError> {
        let mut repo = TenantRepository::new(&self.pool);
        repo.find_by_id(id)
            .await?
            .ok_or(TenantError::NotFound(id))
    }

    pub async fn list(&self) -> Result<Vec<Tenant>, TenantError> {
        let mut repo = TenantRepository::new(&self.pool);
        Ok(repo.list().await?)
    }

    pub async fn update(&self, id: Uuid, update: TenantUpdate) -> Result<Tenant, TenantError> {
        let mut repo = TenantRepository::new(&self.pool);
        repo.update(id, &update)
            .await?
            .ok_or(TenantError::NotFound(id))
    }

    /// Verifies existence, attempts `StopConsumer` (failure logged, not
    /// fatal), then drops the partition and deletes the row within one
    /// transaction (full-teardown DELETE semantics, §9 open question).
    pub async fn delete(&self, id: Uuid) -> Result<(), TenantError> {
        {
            let mut repo = TenantRepository::new(&self.pool);
            repo.find_by_id(id)
                .await?
                .ok_or(TenantError::NotFound(id))?;
        }

        if let Err(e) = self.manager.stop_consumer(id).await {
            tracing::warn!(tenant_id = %id, error = %e, "failed to stop consumer during delete");
        }

        let mut tx = self.pool.begin().await?;
        {
            let mut repo = TenantRepository::from_tx(&mut tx);
            repo.drop_partition(id).await?;
            let affected = repo.delete(id).await?;
            if affected == 0 {
                return Err(TenantError::NotFound(id));
            }
        }
        tx.commit().await?;
        Ok(())
    }

    /// Rejects `workers <= 0`. Updates persisted `workers`; if a live
    /// consumer exists, restarts it so the new count takes effect. Restart
    /// failure does not undo the persisted value.
    pub async fn update_concurrency(
        &self,
        id: Uuid,
        update: ConcurrencyUpdate,
    ) -> Result<(Tenant, bool), TenantError> {
        if update.workers <= 0 {
            return Err(TenantError::InvalidInput("workers must be > 0".to_string()));
        }

        let tenant = {
            let mut repo = TenantRepository::new(&self.pool);
            repo.update_workers(id, update.workers)
                .await?
                .ok_or(TenantError::NotFound(id))?
        };

        let had_consumer = self.manager.get_consumer(id).await.is_some();
        let restarted = if had_consumer {
            match self.manager.start_consumer(id).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(tenant_id = %id, error = %e, "failed to restart consumer after concurrency update");
                    false
                }
            }
        } else {
            true
        };

        Ok((tenant, restarted))
    }

    pub async fn start_consumer(&self, id: Uuid) -> Result<(), TenantError> {
        self.get_by_id(id).await?;
        self.manager.start_consumer(id).await.map_err(|e| match e {
            crate::error::ManagerError::Broker(e) => TenantError::Broker(e),
            crate::error::ManagerError::Storage(e) => TenantError::Storage(e),
            crate::error::ManagerError::NoConsumer(id) => TenantError::NotFound(id),
        })
    }

    pub fn manager(&self) -> &Arc<TenantManager> {
        &self.manager
    }
}
