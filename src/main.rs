extern crate pretty_env_logger;
#[macro_use] extern crate log;

use crate::auth::TokenManager;
use crate::clock::SystemClock;
use crate::config::ConfigError;
use crate::routes::AppState;
use crate::transport::ReqwestTransport;
use crate::wcl::QueryExecutor;
use std::sync::Arc;

mod auth;
mod clock;
mod config;
mod error;
mod query;
mod routes;
mod timeline;
mod transport;
mod wcl;

/// Error enumeration for reasons the proxy could not start or keep serving.
#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() {
    let dotenv = dotenvy::dotenv();
    pretty_env_logger::init();
    debug!("Logger initialized!");
    if let Ok(path) = dotenv {
        debug!("Loaded environment from {}", path.display());
    }

    if let Err(e) = serve().await {
        error!("Proxy stopped: {e}");
        std::process::exit(1);
    }
}

async fn serve() -> Result<(), StartupError> {
    trace!("Reading configuration...");
    let credential = config::credential()?;
    let addr = config::listen_addr()?;
    let diagnostics = config::diagnostics();
    debug!("Using {:?}", &credential);

    trace!("Creating new reqwest client...");
    let transport = Arc::new(ReqwestTransport::new(reqwest::Client::new()));
    trace!("Creating token manager...");
    let tokens = Arc::new(TokenManager::new(credential, transport.clone(), Arc::new(SystemClock)));
    let executor = Arc::new(QueryExecutor::new(tokens, transport));
    let app = routes::router(AppState { executor, diagnostics });

    trace!("Binding {addr}...");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("WCL Query Maker API is running on http://{addr}");
    if diagnostics {
        warn!("Diagnostic mode is on, error responses include internals");
    }
    axum::serve(listener, app).await?;
    Ok(())
}
