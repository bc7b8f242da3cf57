pub mod aggregator;
pub mod cluster_tree;
pub mod clusterer;
pub mod column_writers;
pub mod config;
pub mod correlation;
pub mod csv_sink;
pub mod error;
pub mod fetcher;
pub mod loader;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod similarity;
pub mod sink;
pub mod snapshot;
pub mod throttle;

pub use error::*;
pub use model::*;

use tracing_subscriber::{EnvFilter, prelude::*};

/// Install the fmt subscriber, filtered by `RUST_LOG` (default `info`).
/// Calling it again is harmless.
pub fn init_tracing(service: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!(service, "tracing initialised");
    }
}
