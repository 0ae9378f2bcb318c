use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lapin::Connection;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::consumer::{self, TenantConsumer, STOP_GRACE};
use super::worker;
use crate::error::ManagerError;
use crate::shutdown::ShutdownBarrier;

/// The authoritative in-memory registry of live consumers and the
/// supervisor that keeps them alive (4.E).
pub struct TenantManager {
    connection: Arc<Connection>,
    pool: PgPool,
    registry: RwLock<HashMap<Uuid, Arc<TenantConsumer>>>,
    supervisor_stop: CancellationToken,
    max_retries: i64,
    message_ttl_ms: i32,
    heartbeat_stale: chrono::Duration,
    health_check_interval: Duration,
    shutdown: Arc<ShutdownBarrier>,
}

impl TenantManager {
    pub fn new(
        connection: Arc<Connection>,
        pool: PgPool,
        max_retries: i64,
        message_ttl_ms: i32,
        heartbeat_stale_secs: i64,
        health_check_interval_secs: u64,
        shutdown: Arc<ShutdownBarrier>,
    ) -> Self {
        Self {
            connection,
            pool,
            registry: RwLock::new(HashMap::new()),
            supervisor_stop: CancellationToken::new(),
            max_retries,
            message_ttl_ms,
            heartbeat_stale: chrono::Duration::seconds(heartbeat_stale_secs),
            health_check_interval: Duration::from_secs(health_check_interval_secs),
            shutdown,
        }
    }

    /// Launches the health supervisor task; returns immediately.
    pub fn start(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.run_supervisor().await });
    }

    /// Signals the supervisor to exit and stops every registered consumer.
    pub async fn stop(&self) {
        self.supervisor_stop.cancel();
        let ids: Vec<Uuid> = self.registry.read().await.keys().copied().collect();
        for id in ids {
            if let Err(e) = self.stop_consumer(id).await {
                tracing::warn!(tenant_id = %id, error = %e, "failed to stop consumer during shutdown");
            }
        }
    }

    async fn run_supervisor(&self) {
        let mut ticker = tokio::time::interval(self.health_check_interval);
        loop {
            tokio::select! {
                _ = self.supervisor_stop.cancelled() => {
                    tracing::info!("health supervisor exiting");
                    return;
                }
                _ = ticker.tick() => {
                    self.sweep_stale_consumers().await;
                }
            }
        }
    }

    async fn sweep_stale_consumers(&self) {
        let stale_ids: Vec<Uuid> = {
            let registry = self.registry.read().await;
            registry
                .iter()
                .filter(|(_, c)| c.heartbeat_age() > self.heartbeat_stale)
                .map(|(id, _)| *id)
                .collect()
        };
        for id in stale_ids {
            tracing::warn!(tenant_id = %id, "heartbeat stale, restarting consumer");
            if let Err(e) = self.restart_consumer(id).await {
                tracing::error!(tenant_id = %id, error = %e, "failed to restart stale consumer");
            }
        }
    }

    async fn restart_consumer(&self, id: Uuid) -> Result<(), ManagerError> {
        let _ = self.stop_consumer(id).await;
        self.start_consumer(id).await
    }

    /// If a consumer already exists for `id`, stop it first. Builds a new
    /// Consumer (4.D) and atomically inserts it into the registry.
    pub async fn start_consumer(&self, id: Uuid) -> Result<(), ManagerError> {
        if self.registry.read().await.contains_key(&id) {
            self.stop_consumer(id).await?;
        }

        let workers = fetch_worker_count(&self.pool, id).await;
        let consumer =
            consumer::start_consumer(&self.connection, id, workers, self.message_ttl_ms).await?;

        for worker_id in 0..workers.max(1) as usize {
            let consumer = Arc::clone(&consumer);
            let shutdown = Arc::clone(&self.shutdown);
            let max_retries = self.max_retries;
            tokio::spawn(async move {
                worker::run_worker(consumer, worker_id, max_retries, shutdown).await;
            });
        }

        tracing::info!(tenant_id = %id, workers, "started consumer with worker pool");
        self.registry.write().await.insert(id, consumer);
        Ok(())
    }

    /// Closes the stop signal, waits a brief grace for inflight loops to
    /// observe it, tears down broker resources, then removes the tenant
    /// from the registry. Best-effort: broker cleanup failures are logged,
    /// not propagated.
    pub async fn stop_consumer(&self, id: Uuid) -> Result<(), ManagerError> {
        let consumer = {
            let mut registry = self.registry.write().await;
            registry.remove(&id)
        }
        .ok_or(ManagerError::NoConsumer(id))?;

        consumer.stop.cancel();
        tokio::time::sleep(STOP_GRACE).await;

        if let Err(e) = consumer
            .channel
            .basic_cancel(&consumer.consumer_tag, Default::default())
            .await
        {
            tracing::warn!(tenant_id = %id, error = %e, "failed to cancel subscription");
        }
        if let Err(e) = consumer.channel.close(0, "consumer stopped").await {
            tracing::warn!(tenant_id = %id, error = %e, "failed to close channel");
        }

        let teardown_channel = match self.connection.create_channel().await {
            Ok(ch) => Some(ch),
            Err(e) => {
                tracing::warn!(tenant_id = %id, error = %e, "failed to open teardown channel");
                None
            }
        };
        if let Some(ch) = teardown_channel {
            if let Err(e) = super::topology::teardown_tenant_queues(&ch, &id).await {
                tracing::warn!(tenant_id = %id, error = %e, "failed to tear down queues");
            }
            let verify_channel = ch;
            let id_for_verify = id;
            tokio::spawn(async move {
                match verify_channel
                    .queue_declare(
                        &super::topology::main_queue_name(&id_for_verify),
                        lapin::options::QueueDeclareOptions {
                            passive: true,
                            ..Default::default()
                        },
                        Default::default(),
                    )
                    .await
                {
                    Ok(_) => tracing::error!(tenant_id = %id_for_verify, "queue still present after teardown"),
                    Err(_) => tracing::debug!(tenant_id = %id_for_verify, "verified queue absent after teardown"),
                }
            });
        }

        tracing::info!(tenant_id = %id, "stopped consumer");
        Ok(())
    }

    pub async fn get_consumer(&self, id: Uuid) -> Option<Arc<TenantConsumer>> {
        self.registry.read().await.get(&id).cloned()
    }

    pub async fn get_all_consumers(&self) -> Vec<Arc<TenantConsumer>> {
        self.registry.read().await.values().cloned().collect()
    }

    pub async fn update_heartbeat(&self, id: Uuid) {
        if let Some(consumer) = self.registry.read().await.get(&id) {
            consumer.touch_heartbeat();
        }
    }
}

async fn fetch_worker_count(pool: &PgPool, tenant_id: Uuid) -> i32 {
    match sqlx::query_scalar::<_, i32>("SELECT workers FROM tenants WHERE id = $1")
        .bind(tenant_id)
        .fetch_one(pool)
        .await
    {
        Ok(workers) if workers >= 1 => workers,
        Ok(_) => {
            tracing::warn!(%tenant_id, "configured workers < 1, clamping to 1");
            1
        }
        Err(e) => {
            tracing::warn!(%tenant_id, error = %e, "failed to read worker count, defaulting to 3");
            3
        }
    }
}
