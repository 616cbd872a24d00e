use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use shared::domain::{Domain, NewUser, UserRecord};
use tracing::{info, warn};

use crate::config::Settings;

pub mod firebase;
pub mod memory;

/// Full result sets of a live query, one item per change. An `Err` item ends
/// the subscription.
pub type SnapshotStream = BoxStream<'static, Result<Vec<UserRecord>>>;

/// Push-capable document store holding the `users` collection.
#[async_trait]
pub trait RealtimeStore: Send + Sync {
    /// Inserts a document and returns the store-assigned id.
    async fn insert_user(&self, user: &NewUser) -> Result<String>;

    /// Opens a live query with an equality filter on `domain`. The first item
    /// is the current result set.
    async fn listen(&self, domain: Domain) -> Result<SnapshotStream>;
}

pub fn store_from_settings(settings: &Settings) -> Result<Arc<dyn RealtimeStore>> {
    match settings.realtime_url.as_deref() {
        Some(url) => {
            info!(
                %url,
                collection = %settings.realtime_collection,
                "realtime: using firebase store"
            );
            Ok(Arc::new(firebase::FirebaseRealtimeStore::new(
                url,
                settings.realtime_collection.clone(),
                settings.realtime_auth.clone(),
            )?))
        }
        None => {
            warn!("realtime: no realtime_url configured; using in-process store");
            Ok(Arc::new(memory::MemoryRealtimeStore::new()))
        }
    }
}
