//! Tracing setup for programs and tests embedding the token gate.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "prometheus_token_gate=info";

/// Install an env-filtered fmt subscriber unless one is already set.
///
/// Thread names are printed, so refill and worker output (`tg-refill`,
/// `tg-worker-N`) can be told apart from the dispatcher's.
pub fn init_tracing() {
    init_tracing_with(DEFAULT_FILTER);
}

/// [`init_tracing`] with explicit fallback directives for when `RUST_LOG`
/// is unset or unparsable.
pub fn init_tracing_with(default_filter: &str) {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init();
}
