//! Tracing subscriber setup for host processes.

use ascent_core::config::GeneralConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Install a global `fmt` subscriber.
///
/// The filter comes from `RUST_LOG` when set, otherwise from
/// `[general] log_level`. Returns `false` if a global subscriber was
/// already installed (tests, embedding hosts).
pub fn init_tracing(general: &GeneralConfig, json: bool) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&general.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry.with(fmt::layer().json()).try_init().is_ok()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init().is_ok()
    };
    if installed {
        tracing::info!(level = %general.log_level, json, "Tracing initialised");
    }
    installed
}
