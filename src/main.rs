mod app_state;
mod broker;
mod config;
mod database;
mod error;
mod handlers;
mod message;
mod shutdown;
mod tenant;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use lapin::{Connection, ConnectionProperties};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use app_state::AppState;
use broker::TenantManager;
use config::Config;
use shutdown::ShutdownBarrier;
use tenant::TenantUseCase;

#[tokio::main]
async fn main() {
    init_logging();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "fatal startup error");
        std::process::exit(1);
    }
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("tenant_runtime=info,tower_http=info")
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run() -> anyhow::Result<()> {
    match dotenvy::dotenv() {
        Ok(_) => tracing::info!("environment variables loaded from .env file"),
        Err(_) => tracing::info!("no .env file found, using system environment"),
    }

    let config = Config::from_env()?;
    config.validate()?;
    tracing::info!(port = config.http_port, "configuration loaded");

    let pool = database::create_pool(&config.database_url).await?;
    database::schema::initialize_schema(&pool).await?;

    let connection = Arc::new(
        Connection::connect(&config.amqp_url, ConnectionProperties::default()).await?,
    );

    let shutdown = Arc::new(ShutdownBarrier::new(Duration::from_secs(
        config.shutdown_grace_secs,
    )));

    let manager = Arc::new(TenantManager::new(
        connection.clone(),
        pool.clone(),
        config.max_retries as i64,
        config.message_ttl_ms,
        config.heartbeat_stale_secs,
        config.health_check_interval_secs,
        Arc::clone(&shutdown),
    ));
    manager.start();

    let tenants = Arc::new(TenantUseCase::new(
        pool.clone(),
        Arc::clone(&manager),
        config.default_workers,
    ));

    let state = AppState {
        pool: pool.clone(),
        connection: connection.clone(),
        tenants,
        manager: Arc::clone(&manager),
        shutdown: Arc::clone(&shutdown),
        config: Arc::new(config.clone()),
    };

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "tenant runtime listening");

    let shutdown_token = CancellationToken::new();
    tokio::spawn(shutdown::signal_watcher(shutdown_token.clone()));

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
        .await?;

    let drain_manager = Arc::clone(&manager);
    shutdown::drain_and_close(shutdown, || async move {
        drain_manager.stop().await;
        connection.close(0, "shutting down").await.ok();
    })
    .await;

    tracing::info!("tenant runtime exited cleanly");
    Ok(())
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::permissive();

    let api = Router::new()
        .route(
            "/tenants",
            get(handlers::tenants::list_tenants).post(handlers::tenants::create_tenant),
        )
        .route(
            "/tenants/:id",
            get(handlers::tenants::get_tenant)
                .put(handlers::tenants::update_tenant)
                .delete(handlers::tenants::delete_tenant),
        )
        .route("/tenants/consumers", get(handlers::tenants::get_all_consumers))
        .route("/tenants/:id/consumers", get(handlers::tenants::get_consumer))
        .route(
            "/tenants/:id/config/concurrency",
            put(handlers::tenants::update_concurrency),
        )
        .route("/tenants/:id/publish", post(handlers::tenants::publish))
        .route("/tenants/:id/queue-status", get(handlers::tenants::queue_status))
        .route("/tenants/:id/dlq-status", get(handlers::tenants::dlq_status))
        .route(
            "/tenants/:id/consumer/activate",
            post(handlers::tenants::activate_consumer),
        )
        .route(
            "/tenants/:tenant_id/messages",
            get(handlers::messages::list_messages_for_tenant).post(handlers::messages::create_message),
        )
        .route(
            "/tenants/:tenant_id/messages/:id",
            get(handlers::messages::get_message)
                .put(handlers::messages::update_message)
                .delete(handlers::messages::delete_message),
        )
        .route("/messages", get(handlers::messages::list_all_messages));

    let shutdown_for_middleware = Arc::clone(&state.shutdown);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/api", api)
        .layer(middleware::from_fn(move |req, next| {
            let barrier = Arc::clone(&shutdown_for_middleware);
            async move { ShutdownBarrier::track_request(barrier, req, next).await }
        }))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
