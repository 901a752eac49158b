//! A shared pool of HTTP clients, one per retry policy.

use std::{collections::HashMap, sync::Arc, time::Duration};

use reqwest::Client as ReqwestClient;
use reqwest_middleware::ClientWithMiddleware;
use thiserror::Error;
use tokio::sync::RwLock;

use super::client::create_retryable_http_client;
use crate::config::HttpRetryConfig;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur within the `HttpClientPool`.
#[derive(Debug, Error)]
pub enum HttpClientPoolError {
    /// An error occurred while building the underlying `reqwest::Client`.
    #[error("Failed to create HTTP client: {0}")]
    HttpClientBuildError(String),
}

/// A pool for managing and reusing HTTP clients across channel services.
///
/// Clients are keyed by their `HttpRetryConfig`, so services sharing a retry
/// policy share connections while different policies stay isolated.
#[derive(Debug)]
pub struct HttpClientPool {
    clients: RwLock<HashMap<HttpRetryConfig, Arc<ClientWithMiddleware>>>,
    request_timeout: Duration,
}

impl HttpClientPool {
    /// Creates an empty pool with the default request timeout.
    pub fn new() -> Self {
        Self::with_request_timeout(REQUEST_TIMEOUT)
    }

    /// Creates an empty pool whose clients abort a single attempt after
    /// `request_timeout`.
    pub fn with_request_timeout(request_timeout: Duration) -> Self {
        Self { clients: RwLock::new(HashMap::new()), request_timeout }
    }

    /// Gets the client for `retry_policy`, creating it on first use.
    pub async fn get_or_create(
        &self,
        retry_policy: &HttpRetryConfig,
    ) -> Result<Arc<ClientWithMiddleware>, HttpClientPoolError> {
        if let Some(client) = self.clients.read().await.get(retry_policy) {
            return Ok(client.clone());
        }

        let mut clients = self.clients.write().await;
        // Another task may have created it while we waited for the write lock.
        if let Some(client) = clients.get(retry_policy) {
            return Ok(client.clone());
        }

        let base_client = ReqwestClient::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(self.request_timeout)
            .user_agent(concat!("herald/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HttpClientPoolError::HttpClientBuildError(e.to_string()))?;

        let client = Arc::new(create_retryable_http_client(retry_policy, base_client));
        clients.insert(retry_policy.clone(), client.clone());
        tracing::debug!(?retry_policy, "Created HTTP client");

        Ok(client)
    }

    /// Number of clients in the pool.
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Whether the pool holds no client.
    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}

impl Default for HttpClientPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pool_starts_empty() {
        assert!(HttpClientPool::new().is_empty().await);
    }

    #[tokio::test]
    async fn test_pool_returns_same_client() {
        let pool = HttpClientPool::new();
        let retry_config = HttpRetryConfig::default();
        let client1 = pool.get_or_create(&retry_config).await.unwrap();
        let client2 = pool.get_or_create(&retry_config).await.unwrap();

        assert!(Arc::ptr_eq(&client1, &client2));
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn test_pool_separates_policies() {
        let pool = HttpClientPool::new();
        let aggressive = HttpRetryConfig { max_retries: 10, ..Default::default() };
        let client1 = pool.get_or_create(&HttpRetryConfig::default()).await.unwrap();
        let client2 = pool.get_or_create(&aggressive).await.unwrap();

        assert!(!Arc::ptr_eq(&client1, &client2));
        assert_eq!(pool.len().await, 2);
    }

    #[tokio::test]
    async fn test_pool_concurrent_access() {
        let pool = Arc::new(HttpClientPool::new());
        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move { pool.get_or_create(&HttpRetryConfig::default()).await })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            assert!(result.unwrap().is_ok());
        }
        assert_eq!(pool.len().await, 1);
    }
}
