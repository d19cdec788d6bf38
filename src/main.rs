use anyhow::Context;
use profilesite::{
    config::{
        session::{validate_production_config, SessionConfig},
        AppConfig,
    },
    db, routes,
    services::FsPictureStore,
    AppState,
};
use std::sync::Arc;
use tower_sessions_sqlx_store::SqliteStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "profilesite=debug,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    validate_production_config()?;

    // Database connection
    let pool = db::create_pool(&config.database_url)
        .await
        .with_context(|| format!("failed to open database {}", config.database_url))?;
    db::run_migrations(&pool).await?;

    // Picture directory, with the placeholder every new account points at
    let picture_store = FsPictureStore::init(&config.picture_dir)
        .await
        .with_context(|| {
            format!(
                "failed to prepare picture directory {}",
                config.picture_dir.display()
            )
        })?;
    tracing::info!(path = %picture_store.root().display(), "Picture store ready");

    // Session store
    let session_store = SqliteStore::new(pool.clone())
        .with_table_name("sessions")
        .map_err(anyhow::Error::msg)?;
    session_store.migrate().await?;
    let session_layer = SessionConfig::from_env().create_layer(session_store);

    let addr = config.socket_addr();
    let app_state = AppState::new(config, pool, Arc::new(picture_store));
    let app = routes::build_router(app_state, session_layer);

    tracing::info!("Server running on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
