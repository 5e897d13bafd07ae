pub mod auth;
pub mod rate_limit;
pub mod resiliency;

pub use auth::{admin_auth_middleware, moderator_auth_middleware, user_auth_middleware, Claims, Role};
pub use rate_limit::{rate_limit_middleware, RateLimits, RateScope};
pub use resiliency::{circuit_breaker_middleware, CircuitBreaker, Resiliency};
