//! # Observability
//!
//! The runtime reports through `tracing`:
//!
//! - **Discovery**: one `debug` event per module, `info` once all roots are visited
//! - **Fixed point**: `debug` per bound import, constructed service and pass
//! - **Failures**: `warn` for stalled resolution, failing constructors and hooks
//! - **Lifecycle**: `info` per run hook and around shutdown
//!
//! ```bash
//! RUST_LOG=info cargo run -p modwire-shop    # lifecycle only
//! RUST_LOG=modwire=debug cargo run -p modwire-shop  # every resolved item
//! ```

/// Installs a compact `tracing-subscriber` filtered by `RUST_LOG`.
///
/// Call once per process; later calls are ignored.
pub fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}
