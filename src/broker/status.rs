use lapin::{options::QueueDeclareOptions, types::FieldTable, Connection};
use serde::Serialize;
use uuid::Uuid;

use super::topology;

#[derive(Debug, Serialize)]
pub struct QueueStatus {
    pub message_count: u32,
    pub consumer_count: u32,
    pub workers: i32,
    /// The source reports this as a literal "N/A" string; never computed
    /// (9. Design notes, open question on processingRate).
    pub processing_rate: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DlqStatus {
    pub exists: bool,
    pub message_count: u32,
    pub consumer_count: u32,
}

async fn passive_declare(
    connection: &Connection,
    name: &str,
) -> Result<Option<(u32, u32)>, lapin::Error> {
    let channel = connection.create_channel().await?;
    let result = channel
        .queue_declare(
            name,
            QueueDeclareOptions {
                passive: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await;
    match result {
        Ok(queue) => Ok(Some((queue.message_count(), queue.consumer_count()))),
        Err(_) => Ok(None),
    }
}

pub async fn queue_status(
    connection: &Connection,
    tenant_id: Uuid,
    workers: i32,
) -> Result<QueueStatus, lapin::Error> {
    let name = topology::main_queue_name(&tenant_id);
    let (message_count, consumer_count) = passive_declare(connection, &name).await?.unwrap_or((0, 0));
    Ok(QueueStatus {
        message_count,
        consumer_count,
        workers,
        processing_rate: "N/A",
    })
}

pub async fn dlq_status(
    connection: &Connection,
    tenant_id: Uuid,
) -> Result<DlqStatus, lapin::Error> {
    let name = format!("{}.{}", topology::DLQ_PREFIX, tenant_id);
    match passive_declare(connection, &name).await? {
        Some((message_count, consumer_count)) => Ok(DlqStatus {
            exists: true,
            message_count,
            consumer_count,
        }),
        None => Ok(DlqStatus {
            exists: false,
            message_count: 0,
            consumer_count: 0,
        }),
    }
}
