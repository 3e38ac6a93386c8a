pub mod builders;

use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Assert that `f` is still pending after a short grace period.
///
/// Returns the future back so the caller can keep polling it.
pub async fn assert_pending<F>(f: F) -> std::pin::Pin<Box<F>>
where
    F: std::future::Future,
{
    let mut f = Box::pin(f);
    let polled = tokio::time::timeout(std::time::Duration::from_millis(50), &mut f).await;
    assert!(polled.is_err(), "future resolved but was expected to stay pending");
    f
}

/// Poll `cond` until it holds, failing the test after 5 seconds.
pub async fn wait_until<C>(mut cond: C)
where
    C: FnMut() -> bool,
{
    with_timeout(async {
        while !cond() {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
    })
    .await
}
