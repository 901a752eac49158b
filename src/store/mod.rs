//! Access to the watched resources.
//!
//! The controller reads resources through [`ResourceStore`] and writes state
//! back as JSON merge patches. [`InMemoryResourceStore`] keeps everything in
//! memory; [`FileResourceStore`] mirrors a directory of JSON documents.

mod file;
mod memory;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use file::FileResourceStore;
pub use memory::InMemoryResourceStore;

use crate::models::Resource;

/// Errors raised by a resource store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The resource does not exist.
    #[error("resource '{0}' not found")]
    NotFound(String),

    /// The resource document is not usable.
    #[error("invalid resource: {0}")]
    InvalidResource(String),

    /// Reading or writing the backing storage failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A document could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Keyed access to resources.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// The cached resource, `None` when it does not exist.
    async fn get(&self, key: &str) -> Result<Option<Resource>, StoreError>;

    /// The resource read from the backing storage, bypassing any cache.
    async fn get_fresh(&self, key: &str) -> Result<Option<Resource>, StoreError>;

    /// Applies a JSON merge patch and returns the updated resource. The
    /// cache is updated once the patch succeeded.
    async fn patch(&self, key: &str, patch: &Value) -> Result<Resource, StoreError>;

    /// Keys of every resource, in key order.
    async fn list_keys(&self) -> Result<Vec<String>, StoreError>;
}
