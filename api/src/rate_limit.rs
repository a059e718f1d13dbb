use std::time::Duration;

use common_security::{RateLimitPolicy, SlidingWindowLimiter};
use tokio::time::interval;
use tracing::debug;

/// The login endpoint chains two independent limiters; both must permit.
/// Per-IP 10/min, per-account 5/min.
pub struct LoginLimiters {
    pub per_ip: SlidingWindowLimiter,
    pub per_account: SlidingWindowLimiter,
}

impl LoginLimiters {
    pub fn new(ip_limit: u32, account_limit: u32) -> Self {
        Self {
            per_ip: SlidingWindowLimiter::new(RateLimitPolicy { permit_limit: ip_limit, window: Duration::from_secs(60) }),
            per_account: SlidingWindowLimiter::new(RateLimitPolicy { permit_limit: account_limit, window: Duration::from_secs(60) }),
        }
    }

    pub fn sweep(&self) {
        self.per_ip.sweep();
        self.per_account.sweep();
    }
}

/// Periodically sweeps stale rate-limiter entries so the process-wide maps
/// don't grow unbounded.
pub fn spawn_sweeper(limiters: std::sync::Arc<LoginLimiters>) {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            limiters.sweep();
            debug!("swept login rate limiter state");
        }
    });
}

