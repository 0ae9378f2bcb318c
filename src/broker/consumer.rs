use std::sync::atomic::AtomicU32;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use lapin::{message::Delivery, options::*, types::FieldTable, Channel, Connection};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::topology;

/// The runtime object that owns a tenant's broker subscription and feeds its
/// worker pool (3. Data model "TenantConsumer"; 4.D).
pub struct TenantConsumer {
    pub tenant_id: Uuid,
    pub queue_name: String,
    pub consumer_tag: String,
    pub channel: Channel,
    pub stop: CancellationToken,
    pub last_heartbeat: StdMutex<DateTime<Utc>>,
    pub worker_count: AtomicU32,
    pub delivery_rx: tokio::sync::Mutex<mpsc::Receiver<Delivery>>,
    /// Carries the first fatal forwarder/consumer error, if any; best-effort,
    /// capacity 1 (mirrors the source's single-slot ErrorChannel).
    pub error_tx: mpsc::Sender<String>,
    pub error_rx: tokio::sync::Mutex<mpsc::Receiver<String>>,
}

impl TenantConsumer {
    pub fn touch_heartbeat(&self) {
        *self.last_heartbeat.lock().unwrap() = Utc::now();
    }

    pub fn heartbeat_age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(*self.last_heartbeat.lock().unwrap())
    }
}

/// Builds a Consumer for `tenant_id`: declares the broker topology, starts
/// consumption, and spawns the forwarder task (workers are spawned by the
/// caller, which owns the business-processing closure — 4.D steps 1-9;
/// step 10 is the caller's responsibility).
///
/// Any failure before consumption begins closes the channel and returns the
/// error; no partial consumer is ever exposed.
pub async fn start_consumer(
    connection: &Connection,
    tenant_id: Uuid,
    workers: i32,
    message_ttl_ms: i32,
) -> Result<std::sync::Arc<TenantConsumer>, lapin::Error> {
    let channel = connection.create_channel().await?;

    if let Err(e) = topology::ensure_dlx(&channel).await {
        let _ = channel.close(0, "setup failed").await;
        return Err(e);
    }

    let routing_key = match topology::ensure_dlq(&channel, &tenant_id).await {
        Ok(k) => k,
        Err(e) => {
            let _ = channel.close(0, "setup failed").await;
            return Err(e);
        }
    };

    let queue_name = topology::main_queue_name(&tenant_id);
    let args = topology::main_queue_args(&routing_key, message_ttl_ms);
    if let Err(e) = channel
        .queue_declare(
            &queue_name,
            QueueDeclareOptions {
                durable: true,
                exclusive: false,
                auto_delete: false,
                nowait: false,
                passive: false,
            },
            args,
        )
        .await
    {
        let _ = channel.close(0, "setup failed").await;
        return Err(e);
    }

    let workers = workers.max(1) as u32;
    let (delivery_tx, delivery_rx) = mpsc::channel(workers as usize * 10);
    let (error_tx, error_rx) = mpsc::channel(1);

    let consumer_tag = topology::consumer_tag(&tenant_id);
    let lapin_consumer = match channel
        .basic_consume(
            &queue_name,
            &consumer_tag,
            BasicConsumeOptions {
                no_ack: false,
                exclusive: false,
                no_local: false,
                nowait: false,
            },
            FieldTable::default(),
        )
        .await
    {
        Ok(c) => c,
        Err(e) => {
            let _ = channel.close(0, "setup failed").await;
            return Err(e);
        }
    };

    let consumer = std::sync::Arc::new(TenantConsumer {
        tenant_id,
        queue_name,
        consumer_tag,
        channel,
        stop: CancellationToken::new(),
        last_heartbeat: StdMutex::new(Utc::now()),
        worker_count: AtomicU32::new(workers),
        delivery_rx: tokio::sync::Mutex::new(delivery_rx),
        error_tx,
        error_rx: tokio::sync::Mutex::new(error_rx),
    });

    tokio::spawn(forward_messages(
        consumer.stop.clone(),
        lapin_consumer,
        delivery_tx,
        consumer.error_tx.clone(),
        consumer.tenant_id,
    ));

    Ok(consumer)
}

/// Copies deliveries from the broker consumer stream into the bounded
/// in-memory delivery channel until either is closed or the stop signal
/// fires (4.D step 9).
async fn forward_messages(
    stop: CancellationToken,
    mut lapin_consumer: lapin::Consumer,
    delivery_tx: mpsc::Sender<Delivery>,
    error_tx: mpsc::Sender<String>,
    tenant_id: Uuid,
) {
    loop {
        tokio::select! {
            _ = stop.cancelled() => {
                tracing::info!(%tenant_id, "stopping message forwarding");
                return;
            }
            next = lapin_consumer.next() => {
                let Some(next) = next else {
                    tracing::warn!(%tenant_id, "broker delivery stream closed unexpectedly");
                    let _ = error_tx.try_send("broker delivery stream closed".to_string());
                    return;
                };
                let delivery = match next {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::error!(%tenant_id, error = %e, "broker delivery error");
                        let _ = error_tx.try_send(e.to_string());
                        return;
                    }
                };
                tokio::select! {
                    _ = stop.cancelled() => {
                        tracing::info!(%tenant_id, "stopping message forwarding during dispatch");
                        return;
                    }
                    send_result = delivery_tx.send(delivery) => {
                        if send_result.is_err() {
                            tracing::warn!(%tenant_id, "delivery channel closed");
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// The short fixed wait after closing the stop signal (§5): a correctness
/// helper, not a contract.
pub const STOP_GRACE: Duration = Duration::from_millis(100);
