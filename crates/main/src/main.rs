//! 主应用程序入口
//!
//! 装配连接池、注册表、房间总线与两个协调器，启动 Axum 服务。

use std::sync::Arc;

use application::{
    ChatService, ChatServiceDependencies, ChatUnitOfWork, ConferenceService,
    ConferenceServiceDependencies, ConnectionRegistry, RoomBus,
};
use config::AppConfig;
use infrastructure::{create_pg_pool, PgUnitOfWork, MIGRATOR};
use tracing_subscriber::EnvFilter;
use web_api::{build_router, AppState, TokenVerifier};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let app_config = match AppConfig::from_env() {
        Ok(app_config) => app_config,
        Err(err) => {
            tracing::warn!(error = %err, "falling back to development defaults");
            AppConfig::from_env_with_defaults()
        }
    };
    tracing::info!(
        database = app_config.database.url.split('@').next_back().unwrap_or("unknown"),
        "connecting to database"
    );

    let pg_pool = create_pg_pool(
        &app_config.database.url,
        app_config.database.max_connections,
    )
    .await?;
    MIGRATOR.run(&pg_pool).await?;

    let registry = Arc::new(ConnectionRegistry::new());
    let bus = Arc::new(RoomBus::new());
    let uow: Arc<dyn ChatUnitOfWork> = Arc::new(PgUnitOfWork::new(pg_pool));

    let chat_service = Arc::new(ChatService::new(ChatServiceDependencies {
        registry: registry.clone(),
        bus: bus.clone(),
    }));
    let conference_service = Arc::new(ConferenceService::new(ConferenceServiceDependencies {
        registry: registry.clone(),
        bus: bus.clone(),
    }));
    let verifier = Arc::new(TokenVerifier::new(&app_config.jwt.access_secret));

    let state = AppState {
        chat_service,
        conference_service,
        registry,
        bus,
        uow,
        verifier,
    };
    let app = build_router(state);

    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    tracing::info!(%addr, "starting server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
