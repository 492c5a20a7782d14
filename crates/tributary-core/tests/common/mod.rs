//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Once;

use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Installs a test-writer subscriber once per test binary.
///
/// Honors `RUST_LOG`; defaults to `tributary_core=debug`.
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("tributary_core=debug")),
            )
            .with_test_writer()
            .init();
    });
}

/// Creates `n` channels of the given capacity.
pub fn channels<T>(n: usize, capacity: usize) -> (Vec<mpsc::Sender<T>>, Vec<mpsc::Receiver<T>>) {
    (0..n).map(|_| mpsc::channel(capacity)).unzip()
}
