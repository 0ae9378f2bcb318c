use std::sync::Arc;
use std::time::Instant;

use lapin::{options::*, types::AMQPValue};

use super::consumer::TenantConsumer;
use super::retry::{self, Disposition, Outcome, RETRY_COUNT_HEADER};
use crate::shutdown::ShutdownBarrier;

/// Pulls deliveries from the Consumer's in-memory delivery channel and
/// applies business processing (4.C). Runs until the stop signal fires or
/// the delivery channel closes.
pub async fn run_worker(
    consumer: Arc<TenantConsumer>,
    worker_id: usize,
    max_retries: i64,
    shutdown: Arc<ShutdownBarrier>,
) {
    tracing::info!(tenant_id = %consumer.tenant_id, worker_id, "starting worker");

    loop {
        let delivery = {
            tokio::select! {
                biased;
                _ = consumer.stop.cancelled() => {
                    tracing::info!(tenant_id = %consumer.tenant_id, worker_id, "worker received stop signal");
                    return;
                }
                delivery = async {
                    let mut rx = consumer.delivery_rx.lock().await;
                    rx.recv().await
                } => delivery,
            }
        };

        let Some(delivery) = delivery else {
            tracing::info!(tenant_id = %consumer.tenant_id, worker_id, "delivery channel closed, stopping worker");
            return;
        };

        shutdown.add_task();
        let started_at = Instant::now();
        let delivery_tag = delivery.delivery_tag;
        let retry_count = retry_count_from_headers(&delivery);

        let payload: Result<serde_json::Value, _> = serde_json::from_slice(&delivery.data);
        let outcome = match &payload {
            Err(_) => Outcome::DecodeFailure,
            Ok(value) => {
                let force_error = value
                    .get("metadata")
                    .and_then(|m| m.get("force_error"))
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                if force_error {
                    Outcome::ProcessingFailure
                } else {
                    Outcome::Success
                }
            }
        };

        let disposition = retry::decide(outcome, retry_count, max_retries);
        let duration_ms = started_at.elapsed().as_millis();

        match disposition {
            Disposition::Ack => {
                if let Err(e) = consumer
                    .channel
                    .basic_ack(delivery_tag, BasicAckOptions::default())
                    .await
                {
                    tracing::error!(tenant_id = %consumer.tenant_id, worker_id, delivery_tag, error = %e, "failed to ack message");
                }
                tracing::debug!(tenant_id = %consumer.tenant_id, worker_id, delivery_tag, duration_ms, outcome = "ack", "message processed");
            }
            Disposition::NackRequeue { next_retry_count } => {
                if let Err(e) = consumer
                    .channel
                    .basic_nack(
                        delivery_tag,
                        BasicNackOptions {
                            multiple: false,
                            requeue: true,
                        },
                    )
                    .await
                {
                    tracing::error!(tenant_id = %consumer.tenant_id, worker_id, delivery_tag, error = %e, "failed to nack message for retry");
                }
                tracing::warn!(tenant_id = %consumer.tenant_id, worker_id, delivery_tag, duration_ms, retry_count = next_retry_count, outcome = "retry", "message requeued for retry");
            }
            Disposition::RejectToDlq => {
                if let Err(e) = consumer
                    .channel
                    .basic_reject(delivery_tag, BasicRejectOptions { requeue: false })
                    .await
                {
                    tracing::error!(tenant_id = %consumer.tenant_id, worker_id, delivery_tag, error = %e, "failed to reject message to dlq");
                }
                tracing::error!(tenant_id = %consumer.tenant_id, worker_id, delivery_tag, duration_ms, retry_count, outcome = "dlq", "message routed to dead-letter queue");
            }
        }

        consumer.touch_heartbeat();
        shutdown.done_task();
    }
}

fn retry_count_from_headers(delivery: &lapin::message::Delivery) -> i64 {
    let Some(headers) = delivery.properties.headers().as_ref() else {
        return 0;
    };
    match headers.inner().get(RETRY_COUNT_HEADER) {
        Some(AMQPValue::LongInt(n)) => (*n).into(),
        Some(AMQPValue::LongLongInt(n)) => *n,
        Some(AMQPValue::LongUInt(n)) => (*n).into(),
        _ => 0,
    }
}
