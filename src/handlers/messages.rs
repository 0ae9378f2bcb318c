use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::AppError;
use crate::message::{clamp_limit, Message, MessageRepository, MessageUpdate, NewMessage, Page};

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

pub async fn create_message(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    Json(new): Json<NewMessage>,
) -> Result<Json<Message>, AppError> {
    state.tenants.get_by_id(tenant_id).await?;
    let mut repo = MessageRepository::new(&state.pool);
    let message = repo.create(tenant_id, new).await?;
    Ok(Json(message))
}

pub async fn get_message(
    State(state): State<AppState>,
    Path((tenant_id, id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Message>, AppError> {
    let mut repo = MessageRepository::new(&state.pool);
    let message = repo.find_by_id(tenant_id, id).await?;
    Ok(Json(message))
}

pub async fn update_message(
    State(state): State<AppState>,
    Path((tenant_id, id)): Path<(Uuid, Uuid)>,
    Json(update): Json<MessageUpdate>,
) -> Result<Json<Message>, AppError> {
    let mut repo = MessageRepository::new(&state.pool);
    let message = repo.update(tenant_id, id, update).await?;
    Ok(Json(message))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path((tenant_id, id)): Path<(Uuid, Uuid)>,
) -> Result<(), AppError> {
    let mut repo = MessageRepository::new(&state.pool);
    repo.delete(tenant_id, id).await?;
    Ok(())
}

pub async fn list_messages_for_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Message>>, AppError> {
    let limit = clamp_limit(query.limit);
    let mut repo = MessageRepository::new(&state.pool);
    let page = repo
        .find_by_tenant(tenant_id, query.cursor.as_deref(), limit)
        .await?;
    Ok(Json(page))
}

pub async fn list_all_messages(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Message>>, AppError> {
    let limit = clamp_limit(query.limit);
    let mut repo = MessageRepository::new(&state.pool);
    let page = repo.find_all(query.cursor.as_deref(), limit).await?;
    Ok(Json(page))
}
