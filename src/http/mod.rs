//! HTTP layer: per-product clients with credential injection and retries

mod gateway;
mod retry;

pub use gateway::{AtlassianHttpGateway, ProductClient};
pub use retry::{DEFAULT_RETRYABLE_STATUS_CODES, RetryConfig, RetryConfigBuilder, RetryPolicy};
