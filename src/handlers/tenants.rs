use axum::{
    extract::{Path, State},
    response::Json,
};
use lapin::options::BasicPublishOptions;
use lapin::BasicProperties;
use serde::Serialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::broker::{status, topology};
use crate::error::AppError;
use crate::tenant::{ConcurrencyUpdate, NewTenant, Tenant, TenantUpdate};

pub async fn create_tenant(
    State(state): State<AppState>,
    Json(new): Json<NewTenant>,
) -> Result<Json<Tenant>, AppError> {
    let tenant = state.tenants.create(new).await?;
    Ok(Json(tenant))
}

pub async fn list_tenants(State(state): State<AppState>) -> Result<Json<Vec<Tenant>>, AppError> {
    Ok(Json(state.tenants.list().await?))
}

pub async fn get_tenant(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Tenant>, AppError> {
    Ok(Json(state.tenants.get_by_id(id).await?))
}

pub async fn update_tenant(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<TenantUpdate>,
) -> Result<Json<Tenant>, AppError> {
    Ok(Json(state.tenants.update(id, update).await?))
}

pub async fn delete_tenant(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(), AppError> {
    state.tenants.delete(id).await?;
    Ok(())
}

#[derive(Serialize)]
pub struct ConsumerSnapshot {
    tenant_id: Uuid,
    queue_name: String,
    consumer_tag: String,
    worker_count: u32,
}

pub async fn get_consumer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConsumerSnapshot>, AppError> {
    let consumer = state
        .manager
        .get_consumer(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("consumer {id}")))?;
    Ok(Json(ConsumerSnapshot {
        tenant_id: consumer.tenant_id,
        queue_name: consumer.queue_name.clone(),
        consumer_tag: consumer.consumer_tag.clone(),
        worker_count: consumer
            .worker_count
            .load(std::sync::atomic::Ordering::Relaxed),
    }))
}

pub async fn get_all_consumers(
    State(state): State<AppState>,
) -> Result<Json<Vec<ConsumerSnapshot>>, AppError> {
    let consumers = state.manager.get_all_consumers().await;
    Ok(Json(
        consumers
            .into_iter()
            .map(|c| ConsumerSnapshot {
                tenant_id: c.tenant_id,
                queue_name: c.queue_name.clone(),
                consumer_tag: c.consumer_tag.clone(),
                worker_count: c.worker_count.load(std::sync::atomic::Ordering::Relaxed),
            })
            .collect(),
    ))
}

#[derive(Serialize)]
pub struct ConcurrencyResponse {
    workers: i32,
    consumer_restarted: bool,
}

pub async fn update_concurrency(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<ConcurrencyUpdate>,
) -> Result<Json<ConcurrencyResponse>, AppError> {
    let (tenant, restarted) = state.tenants.update_concurrency(id, update).await?;
    Ok(Json(ConcurrencyResponse {
        workers: tenant.workers,
        consumer_restarted: restarted,
    }))
}

pub async fn publish(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<serde_json::Value>,
) -> Result<(), AppError> {
    state.tenants.get_by_id(id).await?;

    let routing_key = topology::main_queue_name(&id);
    let payload = serde_json::to_vec(&body)
        .map_err(|e| AppError::InvalidInput(format!("failed to encode payload: {e}")))?;

    let channel = state.connection.create_channel().await?;
    channel
        .basic_publish(
            "",
            &routing_key,
            BasicPublishOptions::default(),
            &payload,
            BasicProperties::default(),
        )
        .await?
        .await?;
    Ok(())
}

pub async fn queue_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<status::QueueStatus>, AppError> {
    let tenant = state.tenants.get_by_id(id).await?;
    let workers = match state.manager.get_consumer(id).await {
        Some(consumer) => consumer
            .worker_count
            .load(std::sync::atomic::Ordering::Relaxed) as i32,
        None => tenant.workers,
    };
    Ok(Json(
        status::queue_status(&state.connection, id, workers).await?,
    ))
}

pub async fn dlq_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<status::DlqStatus>, AppError> {
    state.tenants.get_by_id(id).await?;
    Ok(Json(status::dlq_status(&state.connection, id).await?))
}

pub async fn activate_consumer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(), AppError> {
    state.tenants.start_consumer(id).await?;
    Ok(())
}
