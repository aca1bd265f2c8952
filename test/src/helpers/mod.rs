pub mod connection_pair;

pub use connection_pair::{closed_with, fast_config, ConnectionPair, TICK};

/// Installs env_logger once per test binary. Enable output with RUST_LOG.
pub fn init_logger() {
    env_logger::builder().is_test(true).try_init().ok();
}
