mod actor;
mod scheduler;

pub use actor::{RateLimiterHandle, spawn};
pub use scheduler::{Permit, RateSnapshot, RateWindow};
