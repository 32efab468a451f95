//! HTTP networking: configuration, the axum router and handlers, the Tower
//! middleware stack, and graceful shutdown control.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod shutdown;

pub use config::*;
pub use handlers::AppState;
pub use middleware::build_http_layers;
pub use module::NetworkModule;
pub use shutdown::*;
