//! Rate limiting algorithms and per-key state management.

mod bucket;
mod key;
mod limiter;
mod registry;
mod window;

pub use bucket::TokenBucket;
pub use key::LimiterKey;
pub use limiter::RateLimiter;
pub use registry::LimiterRegistry;
pub use window::SlidingWindow;
