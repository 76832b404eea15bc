//! Test support for `stackflow`: a scriptable in-process engine plus the
//! tracing and timeout helpers every integration test starts with.

pub mod builders;
pub mod mock_monitor;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Upper bound on any single awaited step in a test. Registrations run on
/// background tasks, so a missed resolve shows up as a hang.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Install a per-test tracing subscriber once per test binary.
///
/// Output goes through the test writer and is only shown for failing tests.
/// `RUST_LOG=stackflow=debug` shows every registration transition.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("stackflow=info"));

        // Another harness may already own the global subscriber.
        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Await `f`, failing the test if it takes longer than [`TEST_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(TEST_TIMEOUT, f).await {
        Ok(value) => value,
        Err(_) => panic!("test step did not finish within {TEST_TIMEOUT:?}"),
    }
}
