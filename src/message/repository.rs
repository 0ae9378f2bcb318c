use futures_util::future::BoxFuture;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::entity::{decode_cursor, encode_cursor, Message, MessageUpdate, NewMessage, Page};
use crate::error::MessageError;

/// Tenant-partitioned message storage, cursor pagination, transactional
/// writes (4.G).
pub struct MessageRepository<'a> {
    executor: Executor<'a>,
}

enum Executor<'a> {
    Pool(&'a PgPool),
    Tx(&'a mut Transaction<'static, Postgres>),
}

impl<'a> MessageRepository<'a> {
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

    /// Ensures the tenant's partition exists before inserting. In
    /// production the tenant Create path is the sole partition creator;
    /// this call is a concession for tests that create messages directly
    /// (9. Design notes).
    pub async fn create(&mut self, tenant_id: Uuid, msg: NewMessage) -> Result<Message, MessageError> {
        let partition_query = sqlx::query("SELECT create_messages_partition($1)").bind(tenant_id);
        match &mut self.executor {
            Executor::Pool(pool) => partition_query.execute(*pool).await,
            Executor::Tx(tx) => partition_query.execute(&mut ***tx).await,
        }?;

        let id = Uuid::new_v4();
        let insert_query = sqlx::query_as::<_, Message>(
            "INSERT INTO messages (id, tenant_id, payload, created_at, updated_at)
             VALUES ($1, $2, $3, now(), now())
             RETURNING id, tenant_id, payload, created_at, updated_at",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(&msg.payload);

        let message = match &mut self.executor {
            Executor::Pool(pool) => insert_query.fetch_one(*pool).await,
            Executor::Tx(tx) => insert_query.fetch_one(&mut ***tx).await,
        }?;
        Ok(message)
    }

    pub async fn find_by_id(&mut self, tenant_id: Uuid, id: Uuid) -> Result<Message, MessageError> {
        let query = sqlx::query_as::<_, Message>(
            "SELECT id, tenant_id, payload, created_at, updated_at
             FROM messages WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(id);

        let row = match &mut self.executor {
            Executor::Pool(pool) => query.fetch_optional(*pool).await,
            Executor::Tx(tx) => query.fetch_optional(&mut ***tx).await,
        }?;
        row.ok_or(MessageError::NotFound { tenant_id, id })
    }

    pub async fn update(
        &mut self,
        tenant_id: Uuid,
        id: Uuid,
        update: MessageUpdate,
    ) -> Result<Message, MessageError> {
        let query = sqlx::query_as::<_, Message>(
            "UPDATE messages SET payload = $3, updated_at = now()
             WHERE tenant_id = $1 AND id = $2
             RETURNING id, tenant_id, payload, created_at, updated_at",
        )
        .bind(tenant_id)
        .bind(id)
        .bind(&update.payload);

        let row = match &mut self.executor {
            Executor::Pool(pool) => query.fetch_optional(*pool).await,
            Executor::Tx(tx) => query.fetch_optional(&mut ***tx).await,
        }?;
        row.ok_or(MessageError::NotFound { tenant_id, id })
    }

    pub async fn delete(&mut self, tenant_id: Uuid, id: Uuid) -> Result<(), MessageError> {
        let query = sqlx::query("DELETE FROM messages WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(id);

        let result = match &mut self.executor {
            Executor::Pool(pool) => query.execute(*pool).await,
            Executor::Tx(tx) => query.execute(&mut ***tx).await,
        }?;
        if result.rows_affected() == 0 {
            return Err(MessageError::NotFound { tenant_id, id });
        }
        Ok(())
    }

    /// Fetches `limit+1` rows ordered by `id` ascending, starting strictly
    /// after the cursor's id (or from the smallest id if absent). If the
    /// query returns `limit+1` rows, the id at index `limit-1` becomes the
    /// next cursor and the extra row is dropped.
    pub async fn find_by_tenant(
        &mut self,
        tenant_id: Uuid,
        cursor: Option<&str>,
        limit: i64,
    ) -> Result<Page<Message>, MessageError> {
        let after = decode_cursor(cursor)
            .map_err(|e| MessageError::InvalidInput(format!("invalid cursor: {e}")))?;

        let query = sqlx::query_as::<_, Message>(
            "SELECT id, tenant_id, payload, created_at, updated_at
             FROM messages
             WHERE tenant_id = $1 AND ($2::uuid IS NULL OR id > $2)
             ORDER BY id ASC
             LIMIT $3",
        )
        .bind(tenant_id)
        .bind(after)
        .bind(limit + 1);

        let mut rows = match &mut self.executor {
            Executor::Pool(pool) => query.fetch_all(*pool).await,
            Executor::Tx(tx) => query.fetch_all(&mut ***tx).await,
        }?;

        Ok(page_from_rows(&mut rows, limit))
    }

    /// Global analogue of `find_by_tenant` across all tenants.
    pub async fn find_all(&mut self, cursor: Option<&str>, limit: i64) -> Result<Page<Message>, MessageError> {
        let after = decode_cursor(cursor)
            .map_err(|e| MessageError::InvalidInput(format!("invalid cursor: {e}")))?;

        let query = sqlx::query_as::<_, Message>(
            "SELECT id, tenant_id, payload, created_at, updated_at
             FROM messages
             WHERE ($1::uuid IS NULL OR id > $1)
             ORDER BY id ASC
             LIMIT $2",
        )
        .bind(after)
        .bind(limit + 1);

        let mut rows = match &mut self.executor {
            Executor::Pool(pool) => query.fetch_all(*pool).await,
            Executor::Tx(tx) => query.fetch_all(&mut ***tx).await,
        }?;

        Ok(page_from_rows(&mut rows, limit))
    }
}

/// Runs `fn_` against a `MessageRepository` bound to a fresh transaction,
/// committing on `Ok` and rolling back on `Err` (4.G `WithTransaction`).
pub async fn with_transaction<F, T>(pool: &PgPool, fn_: F) -> Result<T, MessageError>
where
    F: for<'c> FnOnce(MessageRepository<'c>) -> BoxFuture<'c, Result<T, MessageError>>,
{
    let mut tx = pool.begin().await?;
    let repo = MessageRepository::from_tx(&mut tx);
    match fn_(repo).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            tx.rollback().await?;
            Err(e)
        }
    }
}

fn page_from_rows(rows: &mut Vec<Message>, limit: i64) -> Page<Message> {
    let limit = limit as usize;
    if rows.len() > limit {
        rows.truncate(limit);
        let next_cursor = rows.get(limit - 1).map(|m| encode_cursor(m.id));
        Page {
            data: std::mem::take(rows),
            next_cursor,
        }
    } else {
        Page {
            data: std::mem::take(rows),
            next_cursor: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn fake_message(id: Uuid) -> Message {
        Message {
            id,
            tenant_id: Uuid::nil(),
            payload: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn page_without_overflow_has_no_next_cursor() {
        let mut rows = vec![fake_message(Uuid::new_v4()), fake_message(Uuid::new_v4())];
        let page = page_from_rows(&mut rows, 10);
        assert_eq!(page.data.len(), 2);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn page_with_overflow_drops_extra_row_and_sets_cursor() {
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let mut rows: Vec<Message> = ids.iter().map(|id| fake_message(*id)).collect();
        let page = page_from_rows(&mut rows, 3);
        assert_eq!(page.data.len(), 3);
        assert_eq!(page.next_cursor, Some(ids[2].to_string()));
    }

    /// Mirrors the Go source's `TestMessageIntegration/Transaction_Management`
    /// (commit-on-success, rollback-on-error). Needs a reachable Postgres;
    /// skips rather than fails when `DATABASE_URL` isn't set.
    #[tokio::test]
    async fn with_transaction_commits_on_success_and_rolls_back_on_failure() {
        let Ok(database_url) = std::env::var("DATABASE_URL") else {
            eprintln!("skipping: DATABASE_URL not set");
            return;
        };
        let pool = PgPool::connect(&database_url)
            .await
            .expect("connect to test database");
        crate::database::schema::initialize_schema(&pool)
            .await
            .expect("initialize schema");

        let committed_tenant = Uuid::new_v4();
        let committed = with_transaction(&pool, |mut repo| {
            Box::pin(async move {
                repo.create(
                    committed_tenant,
                    NewMessage {
                        payload: serde_json::json!({"transaction": "success"}),
                    },
                )
                .await
            })
        })
        .await
        .expect("commit path should succeed");

        let found = MessageRepository::new(&pool)
            .find_by_id(committed_tenant, committed.id)
            .await
            .expect("committed message should be visible outside the transaction");
        assert_eq!(found.id, committed.id);

        let rollback_tenant = Uuid::new_v4();
        let result: Result<(), MessageError> = with_transaction(&pool, |mut repo| {
            Box::pin(async move {
                repo.create(
                    rollback_tenant,
                    NewMessage {
                        payload: serde_json::json!({"transaction": "fail"}),
                    },
                )
                .await?;
                Err(MessageError::InvalidInput("forced rollback".to_string()))
            })
        })
        .await;
        assert!(result.is_err());

        let page = MessageRepository::new(&pool)
            .find_by_tenant(rollback_tenant, None, 10)
            .await
            .expect("query after rollback");
        assert!(page.data.is_empty(), "rolled-back insert must not be visible");
    }
}
