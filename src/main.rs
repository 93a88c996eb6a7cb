use cowrite_relay::{
    auth::{DocumentAccess, JwtIdentityProvider, OpenAccess, UnavailableAccess},
    config::Config,
    db::DbDocs,
    routes::create_app,
    AppState,
};
use std::panic;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "cowrite_relay=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });
    if config.is_development() {
        info!("Running in development mode, accepting sockets from {}", config.frontend_origin);
    }
    if config.jwt_secret.is_none() {
        warn!("No JWT secret configured - every WebSocket handshake will be refused");
    }

    // Token validation
    let identity = Arc::new(JwtIdentityProvider::new(
        config.jwt_secret.clone(),
        config.identity_cache_ttl(),
    ));

    // Document access checks if a database URL is provided
    let access: Arc<dyn DocumentAccess> = match &config.db_url {
        Some(db_url) => match DbDocs::new(db_url).await {
            Ok(db) => {
                info!("Database initialized successfully");
                Arc::new(db)
            }
            Err(e) => {
                error!("Failed to initialize database: {}", e);
                warn!("Refusing all WebSocket handshakes until the database is reachable");
                Arc::new(UnavailableAccess::new(e.to_string()))
            }
        },
        None => {
            warn!("No database URL configured - document ownership will not be checked");
            Arc::new(OpenAccess)
        }
    };

    let state = AppState::new(config, identity, access);
    let app = create_app(state.clone());

    // Start the server
    let address = state.config.server_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", address));

    info!("🚀 Server running on http://{}", address);
    info!("📡 WebSocket available at ws://{}/ws/{{documentId}}", address);
    info!("📚 Swagger UI available at http://{}/swagger", address);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }

    // Live sessions are not drained; they go away with the process.
    let stats = state.registry.stats().await;
    info!(
        sessions = stats.sessions,
        connections = stats.connections,
        "Server stopped"
    );
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
