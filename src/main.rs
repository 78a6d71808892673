use std::sync::Arc;

use anyhow::Context;
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use dotenv::dotenv;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use etancheconnect::{
    config::{Config, StoreBackend},
    db::{memory::MemoryStore, pgstore::PgDocumentStore, store::DocumentStore},
    routes::create_router,
    AppState, Collaborators,
};

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("⚠️ Using the in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set")?;
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await
                .context("🔥 Failed to connect to the database")?;
            tracing::info!("✅ Connection to the database is successful!");

            let store = PgDocumentStore::new(pool);
            store.migrate().await.context("documents table migration failed")?;
            Ok(Arc::new(store))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::init()?;
    let store = open_store(&config).await?;
    let collaborators = Collaborators::from_config(&config);
    let app_state = Arc::new(AppState::new(config.clone(), store, collaborators)?);

    if let Some(admin) = &config.bootstrap_admin {
        app_state
            .account_service
            .ensure_admin(&admin.account_id, &admin.email)
            .await?;
    }

    let allowed_origins = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE]);

    let app = create_router(app_state).layer(cors);

    tracing::info!("🚀 Server is running on http://localhost:{}", config.port);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("could not bind port {}", config.port))?;

    axum::serve(listener, app).await?;
    Ok(())
}
