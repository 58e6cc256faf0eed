//! Rate limiting logic and state management.

mod key;
mod limiter;
mod policy;
mod record;

pub use key::RecordKey;
pub use limiter::RateLimiter;
pub use policy::{Policy, PolicySpec, PolicyTable};
pub use record::{Decision, RateLimitRecord};
