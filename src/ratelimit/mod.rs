//! Sliding window rate limiting for outbound requests.

mod limiter;
mod window;

pub use limiter::{Backoff, LimiterConfig, RateLimiter, INITIAL_BACKOFF};
pub use window::RateWindow;
