//! HTTP handlers
//!
//! Handlers validate at the trust boundary, then hand the blocking storage
//! work to a worker thread so the runtime is never stalled by SQLite or
//! filesystem I/O.

mod events;
mod health;
mod registrations;

pub use events::create_event;
pub use health::health;
pub use registrations::{
    create_registration, delete_registration, list_registrations, update_registration,
};

use super::error::ApiError;
use crate::storage::{Storage, StorageError, StorageResult};

/// Run `op` against storage on the blocking pool
async fn with_storage<T, F>(storage: &Storage, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&Storage) -> StorageResult<T> + Send + 'static,
    T: Send + 'static,
{
    let storage = storage.clone();
    let result = tokio::task::spawn_blocking(move || op(&storage))
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?;
    Ok(result?)
}
