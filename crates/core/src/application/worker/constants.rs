// Worker constants (no magic values)
use std::time::Duration;

/// Queue polled by the background pool
pub const DEFAULT_QUEUE: &str = "default";

/// Queue used by synchronous submissions; no pool worker polls it
pub const INLINE_QUEUE: &str = "inline";

/// Sleep duration when no jobs are available (100ms)
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_millis(100);

/// Sleep duration after worker error before retry (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Default retry base delay (1000ms = 1s)
pub const DEFAULT_RETRY_BASE_DELAY_MS: i64 = 1000;

/// Default backoff multiplier between attempts
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Default attempt budget: a single attempt, no automatic retry
pub const DEFAULT_MAX_ATTEMPTS: i32 = 1;

/// Default bound on one collaborator round trip (5 minutes)
pub const DEFAULT_COLLABORATOR_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default claim lease (10 minutes). Must exceed the collaborator timeout.
pub const DEFAULT_LEASE_MS: i64 = 10 * 60 * 1000;

/// How often the lease reaper scans for expired claims
pub const REAPER_INTERVAL: Duration = Duration::from_secs(30);
