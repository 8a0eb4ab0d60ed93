mod routes;
mod server;

pub use routes::AppState;
pub use server::start_http_server;
