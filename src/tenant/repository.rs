use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::entity::{NewTenant, Tenant, TenantUpdate};

/// Straight-through CRUD against the `tenants` table (4.F).
pub struct TenantRepository<'a> {
    executor: Executor<'a>,
}

enum Executor<'a> {
    Pool(&'a PgPool),
    Tx(&'a mut Transaction<'static, Postgres>),
}

impl<'a> TenantRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self {
            executor: Executor::Pool(pool),
        }
    }

    pub fn from_tx(tx: &'a mut Transaction<'static, Postgres>) -> Self {
        Self {
            executor: Executor::Tx(tx),
        }
    }

    pub async fn create(
        &mut self,
        id: Uuid,
        new: &NewTenant,
        default_workers: i32,
    ) -> Result<Tenant, sqlx::Error> {
        let workers = new.workers.unwrap_or(default_workers).max(1);
        let query = sqlx::query_as::<_, Tenant>(
            "INSERT INTO tenants (id, name, description, status, workers, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, now(), now())
             RETURNING id, name, description, status, workers, created_at, updated_at",
        )
        .bind(id)
        .bind(&new.name)
        .bind(&new.description)
        .bind(&new.status)
        .bind(workers);

        match &mut self.executor {
            Executor::Pool(pool) => query.fetch_one(*pool).await,
            Executor::Tx(tx) => query.fetch_one(&mut ***tx).await,
        }
    }

    pub async fn find_by_id(&mut self, id: Uuid) -> Result<Option<Tenant>, sqlx::Error> {
        let query = sqlx::query_as::<_, Tenant>(
            "SELECT id, name, description, status, workers, created_at, updated_at
             FROM tenants WHERE id = $1",
        )
        .bind(id);

        match &mut self.executor {
            Executor::Pool(pool) => query.fetch_optional(*pool).await,
            Executor::Tx(tx) => query.fetch_optional(&mut ***tx).await,
        }
    }

    pub async fn list(&mut self) -> Result<Vec<Tenant>, sqlx::Error> {
        let query = sqlx::query_as::<_, Tenant>(
            "SELECT id, name, description, status, workers, created_at, updated_at
             FROM tenants ORDER BY created_at ASC",
        );

        match &mut self.executor {
            Executor::Pool(pool) => query.fetch_all(*pool).await,
            Executor::Tx(tx) => query.fetch_all(&mut ***tx).await,
        }
    }

    pub async fn update(&mut self, id: Uuid, update: &TenantUpdate) -> Result<Option<Tenant>, sqlx::Error> {
        let query = sqlx::query_as::<_, Tenant>(
            "UPDATE tenants SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                status = COALESCE($4, status),
                updated_at = now()
             WHERE id = $1
             RETURNING id, name, description, status, workers, created_at, updated_at",
        )
        .bind(id)
        .bind(&update.name)
        .bind(&update.description)
        .bind(&update.status);

        match &mut self.executor {
            Executor::Pool(pool) => query.fetch_optional(*pool).await,
            Executor::Tx(tx) => query.fetch_optional(&mut ***tx).await,
        }
    }

    pub async fn update_workers(&mut self, id: Uuid, workers: i32) -> Result<Option<Tenant>, sqlx::Error> {
        let query = sqlx::query_as::<_, Tenant>(
            "UPDATE tenants SET workers = $2, updated_at = now()
             WHERE id = $1
             RETURNING id, name, description, status, workers, created_at, updated_at",
        )
        .bind(id)
        .bind(workers);

        match &mut self.executor {
            Executor::Pool(pool) => query.fetch_optional(*pool).await,
            Executor::Tx(tx) => query.fetch_optional(&mut ***tx).await,
        }
    }

    pub async fn delete(&mut self, id: Uuid) -> Result<u64, sqlx::Error> {
        let query = sqlx::query("DELETE FROM tenants WHERE id = $1").bind(id);

        let result = match &mut self.executor {
            Executor::Pool(pool) => query.execute(*pool).await?,
            Executor::Tx(tx) => query.execute(&mut ***tx).await?,
        };
        Ok(result.rows_affected())
    }

    pub async fn create_partition(&mut self, tenant_id: Uuid) -> Result<(), sqlx::Error> {
        let query = sqlx::query("SELECT create_messages_partition($1)").bind(tenant_id);
        match &mut self.executor {
            Executor::Pool(pool) => query.execute(*pool).await,
            Executor::Tx(tx) => query.execute(&mut ***tx).await,
        }?;
        Ok(())
    }

    pub async fn drop_partition(&mut self, tenant_id: Uuid) -> Result<(), sqlx::Error> {
        let query = sqlx::query("SELECT drop_messages_partition($1)").bind(tenant_id);
        match &mut self.executor {
            Executor::Pool(pool) => query.execute(*pool).await,
            Executor::Tx(tx) => query.execute(&mut ***tx).await,
        }?;
        Ok(())
    }
}
