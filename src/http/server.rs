use actix_web::{dev::Server, web, App, HttpServer};

use crate::config::ServerConfig;
use super::routes::{configure, AppState};

/// Bind the HTTP server. Signal handling is left to the caller, which stops
/// the server through its handle once ingestion has wound down.
pub fn start_http_server(config: &ServerConfig, state: web::Data<AppState>) -> std::io::Result<Server> {
    let address = config.address();
    tracing::info!("🌐 Starting HTTP server on http://{}", address);

    let server = HttpServer::new(move || App::new().app_data(state.clone()).configure(configure))
        .shutdown_timeout(config.shutdown_timeout.as_secs())
        .disable_signals()
        .bind(&address)?
        .run();

    Ok(server)
}
