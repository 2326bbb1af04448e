//! Clinic data store.
//!
//! [`ClinicStore`] is the only way the workflow touches persisted state.
//! [`PostgrestStore`] talks to the hosted database over its REST interface;
//! [`MemoryStore`] keeps everything in process.

pub mod error;
pub mod memory;
pub mod models;
pub mod postgrest;
pub mod repository;

use psiclinic_config::{StoreBackend, StoreConfig};
use std::sync::Arc;
use tracing::{info, warn};

pub use error::StoreError;
pub use memory::MemoryStore;
pub use models::*;
pub use postgrest::PostgrestStore;
pub use repository::ClinicStore;

/// Builds the store selected by `store.backend`.
pub fn build_store(config: &StoreConfig) -> Result<Arc<dyn ClinicStore>, StoreError> {
    match config.backend {
        StoreBackend::Postgrest => {
            info!("Using PostgREST store at {}", config.url);
            Ok(Arc::new(PostgrestStore::new(config)?))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
