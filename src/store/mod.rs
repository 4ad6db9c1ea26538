//! Persistence seam. The engine only ever talks to the `HostServiceStore`
//! capability; the Postgres implementation lives in `postgres`.

pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Event, Host, HostService, StatusCounts};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i32 },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

/// Narrow persistence contract consumed by the monitoring engine. The engine
/// never issues SQL itself.
#[async_trait]
pub trait HostServiceStore: Send + Sync {
    async fn host(&self, id: i32) -> Result<Host, StoreError>;
    async fn host_service(&self, id: i32) -> Result<HostService, StoreError>;
    async fn update_host_service(&self, hs: &HostService) -> Result<(), StoreError>;
    /// Active services on active hosts, the set the scheduler registers.
    async fn services_to_monitor(&self) -> Result<Vec<HostService>, StoreError>;
    async fn status_counts(&self) -> Result<StatusCounts, StoreError>;
    async fn insert_event(&self, event: &Event) -> Result<(), StoreError>;
}
