pub mod query_validator;
pub mod rate_limiter;

pub use query_validator::*;
pub use rate_limiter::*;
