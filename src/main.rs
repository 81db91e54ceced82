use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shapes_live::{
    config::Config,
    db, routes,
    services::{
        broadcast::Topic,
        sessions::SessionStore,
        shapes::{MemoryShapeStore, PgShapeStore, ShapeStore},
        users::{Authenticator, MemoryAuthenticator, PgAuthenticator},
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let (directory, store, sessions): (Arc<dyn Authenticator>, Arc<dyn ShapeStore>, Arc<SessionStore>) =
        match config.database_url.as_deref() {
            Some(url) => {
                let pool = db::create_pool(url).await?;
                db::run_migrations(&pool).await?;
                info!("Database connected and migrations applied");
                let sessions = SessionStore::with_journal(pool.clone()).await?;
                (
                    Arc::new(PgAuthenticator::new(pool.clone())),
                    Arc::new(PgShapeStore::new(pool)),
                    Arc::new(sessions),
                )
            }
            None => {
                warn!("DATABASE_URL not set, running on in-memory stores");
                let directory = MemoryAuthenticator::new(bcrypt::DEFAULT_COST);
                if let (Some(username), Some(password)) =
                    (&config.dev_admin_username, &config.dev_admin_password)
                {
                    directory.add_user(username, password, true)?;
                    info!("Seeded in-memory staff user {}", username);
                }
                (
                    Arc::new(directory),
                    Arc::new(MemoryShapeStore::new()),
                    Arc::new(SessionStore::in_memory()),
                )
            }
        };

    let sweep_every = Duration::from_secs(config.revocation_sweep_seconds.max(1));
    let sweeper = sessions.clone().start_sweeper(sweep_every);

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(config, directory, store, sessions);
    let topic = state.topic.clone();
    let app = routes::router(state);

    info!("shapes-live API listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(topic))
        .await?;

    sweeper.abort();
    info!("Shut down");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM, after closing the topic so every open
/// WebSocket deregisters and ends.
async fn shutdown_signal(topic: Arc<Topic>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, closing topic {}", topic.name());
    topic.close();
}
