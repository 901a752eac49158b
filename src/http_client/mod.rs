//! Retryable HTTP clients shared by the HTTP based channel services.

mod client;
mod pool;

pub use client::create_retryable_http_client;
pub use pool::{HttpClientPool, HttpClientPoolError};
