//! Wayline Server - Main Entry Point
//!
//! Administrator authentication backend for the Wayline platform.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use wayline_server::audit::TracingAuditSink;
use wayline_server::auth::{
    self, AppState, AuthEngine, AuthPolicy, InMemorySessionRegistry, InMemoryTokenBlacklist,
    MfaEngine,
};
use wayline_server::auth::jwt::TokenService;
use wayline_server::config::Config;
use wayline_server::email::{Notifier, SmtpNotifier};
use wayline_server::store::{create_pool, run_migrations, PgCredentialStore};

/// How often expired sessions and blacklist entries are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wayline_server=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Wayline Server"
    );

    // Initialize database
    let db_pool = create_pool(&config.database_url).await?;
    run_migrations(&db_pool).await?;

    // Initialize SMTP notifier (optional - lockout alerts disabled if not configured)
    let notifier: Option<Arc<dyn Notifier>> = if config.has_smtp() {
        let smtp = SmtpNotifier::new(&config)?;
        match smtp.test_connection().await {
            Ok(()) => {
                info!("SMTP notifier connected");
                Some(Arc::new(smtp))
            }
            Err(e) => {
                tracing::warn!("SMTP connection test failed: {e}. Lockout alerts disabled.");
                None
            }
        }
    } else {
        info!("SMTP not configured; lockout alerts disabled");
        None
    };

    let engine = Arc::new(AuthEngine::new(
        Arc::new(PgCredentialStore::new(db_pool)),
        TokenService::new(&config)?,
        MfaEngine::new(&config.mfa_encryption_key, config.totp_issuer.clone())?,
        Arc::new(InMemorySessionRegistry::new()),
        Arc::new(InMemoryTokenBlacklist::new()),
        Arc::new(TracingAuditSink),
        notifier,
        AuthPolicy::from_config(&config),
    ));

    // Periodic sweep of expired sessions and blacklist entries
    let sweeper = Arc::clone(&engine);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            match sweeper.purge_expired().await {
                Ok((sessions, tokens)) if sessions > 0 || tokens > 0 => {
                    info!(sessions, tokens, "swept expired auth state");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "sweep failed"),
            }
        }
    });

    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let state = AppState { engine };
    let app = axum::Router::new()
        .nest("/auth", auth::router(state.clone()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = config.bind_address.parse()?;
    info!(%addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
