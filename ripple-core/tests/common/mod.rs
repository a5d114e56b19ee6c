use std::str::FromStr;
use std::sync::Once;
use std::time::Duration;

use tracing::Level;

static TRACING: Once = Once::new();

/// Initialize tracing for tests. `LOG_LEVEL` overrides the default level.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let level = std::env::var("LOG_LEVEL")
            .ok()
            .and_then(|level| Level::from_str(&level).ok())
            .unwrap_or(Level::INFO);
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .try_init();
    });
}

/// Poll `condition` until it holds, failing the test after five seconds.
#[allow(unused)]
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
