use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Fixed permit/window policy for a protected endpoint. The login endpoint
/// chains two of these: per-IP 10/min and
/// per-account 5/min; both must permit.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub permit_limit: u32,
    pub window: Duration,
}

/// Sliding-window limiter over an identity string (IP, email, or a combined
/// key). The one process-wide mutable map in this crate; state lives behind
/// a `Mutex` and is swept on a timer to bound memory.
pub struct SlidingWindowLimiter {
    policy: RateLimitPolicy,
    hits: Mutex<HashMap<String, Vec<Instant>>>,
}

pub struct LimitOutcome {
    pub allowed: bool,
    pub retry_after: Duration,
}

impl SlidingWindowLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self { policy, hits: Mutex::new(HashMap::new()) }
    }

    /// Records an attempt for `identity` and reports whether it's permitted
    /// under the policy's window.
    pub fn check(&self, identity: &str) -> LimitOutcome {
        let now = Instant::now();
        let mut guard = self.hits.lock().expect("rate limiter mutex poisoned");
        let entry = guard.entry(identity.to_string()).or_default();
        entry.retain(|t| now.duration_since(*t) < self.policy.window);

        if entry.len() as u32 >= self.policy.permit_limit {
            let oldest = entry.first().copied().unwrap_or(now);
            let retry_after = self.policy.window.saturating_sub(now.duration_since(oldest));
            return LimitOutcome { allowed: false, retry_after };
        }

        entry.push(now);
        LimitOutcome { allowed: true, retry_after: Duration::ZERO }
    }

    /// Drops identities with no hits inside the window; called periodically
    /// so the map doesn't grow unbounded.
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut guard = self.hits.lock().expect("rate limiter mutex poisoned");
        guard.retain(|_, hits| {
            hits.retain(|t| now.duration_since(*t) < self.policy.window);
            !hits.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permits_up_to_limit_then_blocks() {
        let limiter = SlidingWindowLimiter::new(RateLimitPolicy { permit_limit: 3, window: Duration::from_secs(60) });
        for _ in 0..3 {
            assert!(limiter.check("203.0.113.10").allowed);
        }
        let outcome = limiter.check("203.0.113.10");
        assert!(!outcome.allowed);
        assert!(outcome.retry_after > Duration::ZERO);
    }

    #[test]
    fn distinct_identities_have_independent_windows() {
        let limiter = SlidingWindowLimiter::new(RateLimitPolicy { permit_limit: 1, window: Duration::from_secs(60) });
        assert!(limiter.check("a@example.com").allowed);
        assert!(limiter.check("b@example.com").allowed);
        assert!(!limiter.check("a@example.com").allowed);
    }

    #[test]
    fn sweep_removes_stale_entries() {
        let limiter = SlidingWindowLimiter::new(RateLimitPolicy { permit_limit: 1, window: Duration::from_millis(1) });
        limiter.check("x");
        std::thread::sleep(Duration::from_millis(5));
        limiter.sweep();
        assert!(limiter.hits.lock().unwrap().is_empty());
    }
}

