//! Infrastructure layer: HTTP transport, token storage, notice sinks,
//! configuration and logging.

pub mod config;
pub mod http_client;
pub mod logging;
pub mod notifier;
pub mod session_store;

// Re-export commonly used items
pub use config::{AppConfig, ConfigError, LoggingConfig};
pub use http_client::{LoginResponse, ProductsHttpClient};
pub use notifier::{BufferedNavigator, BufferedNotifier};
pub use session_store::{FileSessionStore, MemorySessionStore};
