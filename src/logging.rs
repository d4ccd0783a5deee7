//! Tracing subscriber setup.
//!
//! `local` logs human-readable text at debug level, `dev` logs JSON at debug
//! level, and `prod` logs JSON at info level. `RUST_LOG` overrides the level.
//! Logs go to stderr so command output on stdout stays clean.

use std::io;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Env;

/// Installs the global subscriber for `env`.
pub fn init(env: Env) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(env)));
    let registry = tracing_subscriber::registry().with(filter);

    match env {
        Env::Local => registry.with(fmt::layer().with_writer(io::stderr)).try_init(),
        Env::Dev | Env::Prod => registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .try_init(),
    }
    .map_err(|e| format!("failed to initialize logging: {e}"))
}

fn default_directive(env: Env) -> &'static str {
    match env {
        Env::Local | Env::Dev => "debug",
        Env::Prod => "info",
    }
}
