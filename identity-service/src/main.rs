use identity_service::{
    build_router,
    config::IdentityConfig,
    db::{create_pool, run_migrations},
    services::{
        AuthService, Database, HttpIdentityExchange, JwtService, TenantScopePropagator,
        UserService,
    },
    utils::{CredentialHasher, FieldCipher},
    AppState,
};
use service_core::error::AppError;
use service_core::middleware::rate_limit::create_ip_rate_limiter;
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();

    // Load configuration - fail fast if invalid
    let config = IdentityConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )
    .map_err(AppError::ConfigError)?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting identity service"
    );

    let pool = create_pool(&config.database)
        .await
        .map_err(|e| AppError::DatabaseError(e.into()))?;
    run_migrations(&pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.into()))?;
    let database = Arc::new(Database::new(pool));
    tracing::info!("Database initialized successfully");

    let jwt = JwtService::new(&config.jwt).map_err(AppError::ConfigError)?;
    let hasher =
        CredentialHasher::new(config.security.pepper.clone()).map_err(AppError::ConfigError)?;
    let cipher = FieldCipher::new(&config.security.field_encryption_key)
        .map_err(|e| AppError::ConfigError(e.into()))?;

    let login_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.login_attempts,
        config.rate_limit.login_window_seconds,
    );

    let auth_service = AuthService::new(
        database.clone(),
        database.clone(),
        jwt.clone(),
        hasher.clone(),
    );
    let user_service = UserService::new(hasher, cipher);
    let propagator = TenantScopePropagator::new(database.clone(), database.clone());

    let state = AppState {
        config: config.clone(),
        credentials: database,
        jwt,
        auth_service,
        user_service,
        propagator,
        exchange: Arc::new(HttpIdentityExchange::new(config.oauth.clone())),
        login_rate_limiter,
    };

    let app = build_router(state);

    let addr = config.common.socket_addr();
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        AppError::InternalError(anyhow::anyhow!("Failed to bind {}: {}", addr, e))
    })?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| AppError::InternalError(anyhow::anyhow!("Server error: {}", e)))?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
