//! Remote host client: request builders, response classification, retries and rate limiting.

mod api;
mod budget;
mod client;
mod policy;
mod rate_limit;

pub use api::HostApi;
pub use budget::RequestBudget;
pub use client::{CommitListing, HostClient};
pub use policy::{HOST_BODY_PREVIEW_CHARS, HostAction, RateLimitHeaders, classify_host_error};
pub use rate_limit::{Permit, RateLimiterHandle, RateSnapshot, RateWindow, spawn as spawn_rate_limiter};
