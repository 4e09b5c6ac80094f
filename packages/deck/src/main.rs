mod config;
mod conversations;
mod directory;
mod handlers;
mod hook;
mod store;
#[cfg(test)]
mod test_support;
mod ws;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::{get, post, put};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use deck_pty::{PtySpawner, SessionManager};

use config::DeckConfig;
use store::SessionStore;
use ws::broker::ConnectionBroker;

#[derive(Parser, Debug)]
#[command(name = "deck", version, about = "Local multi-terminal deck for AI coding CLIs")]
struct Cli {
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Directory holding config.toml, presets, and session state
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory of built frontend assets
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    debug: bool,
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub(crate) struct AppState {
    pub sessions: Arc<SessionManager>,
    pub broker: Arc<ConnectionBroker>,
    pub store: Arc<SessionStore>,
    pub config: Arc<DeckConfig>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug {
        "deck=debug,deck_pty=debug,tower_http=debug"
    } else {
        "deck=info,deck_pty=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let data_dir = cli.data_dir.unwrap_or_else(config::default_data_dir);
    let file = config::load(&data_dir)?;
    let config = Arc::new(DeckConfig::resolve(
        file,
        data_dir,
        cli.host,
        cli.port,
        cli.static_dir,
    ));

    let sessions = SessionManager::with_limits(
        Arc::new(PtySpawner),
        config.max_sessions,
        config.batch_window,
    );
    let broker = Arc::new(ConnectionBroker::new());
    let store = Arc::new(SessionStore::new(config.data_dir.clone()));

    ws::spawn_event_forwarder(sessions.clone(), broker.clone());

    let state = AppState {
        sessions: sessions.clone(),
        broker,
        store,
        config: config.clone(),
    };

    // Everything that is not an API route falls through to the built
    // frontend, with an index.html fallback for SPA routes.
    let static_service = ServeDir::new(&config.static_dir)
        .fallback(ServeFile::new(config.static_dir.join("index.html")));

    let app = Router::new()
        .route("/ws", get(ws::handler::websocket_handler))
        .route("/hook/notify", post(handlers::hook_notify))
        .route(
            "/api/presets",
            get(handlers::list_presets).post(handlers::save_preset),
        )
        .route(
            "/api/presets/{name}",
            put(handlers::update_preset).delete(handlers::delete_preset),
        )
        .route("/api/session", get(handlers::get_session))
        .fallback_service(static_service)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("deck listening on http://{}", addr);
    if hook::check() {
        info!("notification hook already registered");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down, terminating all sessions");
    sessions.kill_all();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
