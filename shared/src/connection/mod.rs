pub mod ack_manager;
pub mod bandwidth_monitor;
pub mod connection;
pub mod connection_config;
pub mod error;
pub mod flow_control;
pub mod ping_store;
pub mod security_tracker;
pub mod state;

pub use connection::Connection;
pub use connection_config::{ConnectionConfig, SecurityConfig};
pub use error::{ConfigError, ConnectionError};
pub use state::{CloseReason, ConnectionEvent, ConnectionState};
