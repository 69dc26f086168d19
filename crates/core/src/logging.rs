//! Tracing setup for hosts and demos embedding a session.

use std::sync::Once;

use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Install a global `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Later calls are ignored, and so is an already-installed subscriber.
pub fn init_tracing() {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let fmt_layer = fmt::layer().with_target(true).with_thread_ids(true);

        if tracing_subscriber::registry().with(env_filter).with(fmt_layer).try_init().is_ok() {
            info!("rzview tracing initialized");
        }
    });
}
