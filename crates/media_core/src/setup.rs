//! Logging setup for binaries built on top of this crate — `init_logging`.
//!
//! Mirrors `re_log::setup::setup_native_logging`'s shape (install once, derive
//! the filter from the environment, default to info) but speaks `tracing`
//! instead of `log`, since every `mc_*` crate instruments itself with
//! `tracing` macros.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

use mc_types::MediaCoreConfig;

static INIT: Once = Once::new();

/// Installs a `tracing-subscriber` `fmt` layer writing to stderr, once per
/// process. `config.log_filter` is used when `RUST_LOG` isn't set.
pub fn init_logging(config: &MediaCoreConfig) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();

        if std::env::var_os("RUST_BACKTRACE").is_none() && cfg!(debug_assertions) {
            std::env::set_var("RUST_BACKTRACE", "1");
        }
    });
}
