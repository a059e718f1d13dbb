pub mod context;
pub mod error;
pub mod ownership;
pub mod rate_limit;
pub mod roles;

pub use context::{SecurityContext, SecurityCtxExtractor};
pub use error::SecurityError;
pub use ownership::ensure_owner_or_admin;
pub use rate_limit::{LimitOutcome, RateLimitPolicy, SlidingWindowLimiter};
pub use roles::{ensure_any_role, ensure_role, Role};

