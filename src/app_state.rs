use std::sync::Arc;

use lapin::Connection;
use sqlx::PgPool;

use crate::broker::TenantManager;
use crate::config::Config;
use crate::shutdown::ShutdownBarrier;
use crate::tenant::TenantUseCase;

/// Shared state handed to every handler via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub connection: Arc<Connection>,
    pub tenants: Arc<TenantUseCase>,
    pub manager: Arc<TenantManager>,
    pub shutdown: Arc<ShutdownBarrier>,
    pub config: Arc<Config>,
}
