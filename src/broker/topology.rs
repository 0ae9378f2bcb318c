use lapin::{options::*, types::FieldTable, Channel, ExchangeKind};

pub const DLX_NAME: &str = "dlx.tenant";
pub const DLQ_PREFIX: &str = "dlq.tenant";
pub const DEFAULT_MESSAGE_TTL_MS: i32 = 1000 * 60 * 60 * 24;

pub fn main_queue_name(tenant_id: &uuid::Uuid) -> String {
    format!("tenant.{tenant_id}")
}

pub fn consumer_tag(tenant_id: &uuid::Uuid) -> String {
    format!("consumer.{tenant_id}")
}

fn dlq_name(tenant_id: &uuid::Uuid) -> String {
    format!("{DLQ_PREFIX}.{tenant_id}")
}

fn routing_key(tenant_id: &uuid::Uuid) -> String {
    format!("tenant.{tenant_id}")
}

/// Declares the shared dead-letter exchange. Idempotent.
pub async fn ensure_dlx(channel: &Channel) -> Result<(), lapin::Error> {
    channel
        .exchange_declare(
            DLX_NAME,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                auto_delete: false,
                internal: false,
                nowait: false,
                passive: false,
            },
            FieldTable::default(),
        )
        .await
}

/// Declares and binds the tenant's dead-letter queue, returning its routing key.
pub async fn ensure_dlq(channel: &Channel, tenant_id: &uuid::Uuid) -> Result<String, lapin::Error> {
    let name = dlq_name(tenant_id);
    channel
        .queue_declare(
            &name,
            QueueDeclareOptions {
                durable: true,
                exclusive: false,
                auto_delete: false,
                nowait: false,
                passive: false,
            },
            FieldTable::default(),
        )
        .await?;

    let key = routing_key(tenant_id);
    channel
        .queue_bind(
            &name,
            DLX_NAME,
            &key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    Ok(key)
}

/// Builds the queue-declaration arguments wiring a main queue to the DLX.
pub fn main_queue_args(routing_key: &str, ttl_ms: i32) -> FieldTable {
    let mut args = FieldTable::default();
    args.insert(
        "x-dead-letter-exchange".into(),
        lapin::types::AMQPValue::LongString(DLX_NAME.into()),
    );
    args.insert(
        "x-dead-letter-routing-key".into(),
        lapin::types::AMQPValue::LongString(routing_key.into()),
    );
    args.insert(
        "x-message-ttl".into(),
        lapin::types::AMQPValue::LongInt(ttl_ms),
    );
    args
}

/// Deletes the tenant's main queue and dead-letter queue. Best-effort: errors
/// are returned to the caller, who logs and proceeds (4.E StopConsumer).
pub async fn teardown_tenant_queues(
    channel: &Channel,
    tenant_id: &uuid::Uuid,
) -> Result<(), lapin::Error> {
    channel
        .queue_delete(&main_queue_name(tenant_id), QueueDeleteOptions::default())
        .await?;
    channel
        .queue_delete(&dlq_name(tenant_id), QueueDeleteOptions::default())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_queue_name_matches_bit_exact_format() {
        let id = uuid::Uuid::nil();
        assert_eq!(main_queue_name(&id), format!("tenant.{id}"));
    }

    #[test]
    fn consumer_tag_matches_bit_exact_format() {
        let id = uuid::Uuid::nil();
        assert_eq!(consumer_tag(&id), format!("consumer.{id}"));
    }

    #[test]
    fn dlq_name_and_routing_key_share_tenant_suffix() {
        let id = uuid::Uuid::nil();
        assert_eq!(dlq_name(&id), format!("dlq.tenant.{id}"));
        assert_eq!(routing_key(&id), format!("tenant.{id}"));
    }

    #[test]
    fn main_queue_args_carry_dlx_routing_key_and_ttl() {
        let args = main_queue_args("tenant.x", 1234);
        assert_eq!(
            args.inner().get("x-dead-letter-exchange"),
            Some(&lapin::types::AMQPValue::LongString(DLX_NAME.into()))
        );
        assert_eq!(
            args.inner().get("x-dead-letter-routing-key"),
            Some(&lapin::types::AMQPValue::LongString("tenant.x".into()))
        );
        assert_eq!(
            args.inner().get("x-message-ttl"),
            Some(&lapin::types::AMQPValue::LongInt(1234))
        );
    }
}
