use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{anyhow, Result};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use shared::domain::{Domain, NewUser, UserRecord};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

use super::{RealtimeStore, SnapshotStream};

#[derive(Debug, Clone, Default)]
struct Collection {
    documents: Vec<UserRecord>,
    failure: Option<String>,
}

/// In-process realtime store. Every change is fanned out to open listeners
/// through a watch channel.
pub struct MemoryRealtimeStore {
    collection: watch::Sender<Collection>,
    fail_inserts: AtomicBool,
    insert_attempts: AtomicUsize,
}

impl Default for MemoryRealtimeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRealtimeStore {
    pub fn new() -> Self {
        let (collection, _) = watch::channel(Collection::default());
        Self {
            collection,
            fail_inserts: AtomicBool::new(false),
            insert_attempts: AtomicUsize::new(0),
        }
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Breaks every open listener with `reason`; new listens fail until
    /// [`MemoryRealtimeStore::reconnect`].
    pub fn disconnect(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.collection
            .send_modify(|collection| collection.failure = Some(reason));
    }

    pub fn reconnect(&self) {
        self.collection
            .send_modify(|collection| collection.failure = None);
    }

    pub fn insert_attempts(&self) -> usize {
        self.insert_attempts.load(Ordering::SeqCst)
    }

    pub fn active_listeners(&self) -> usize {
        self.collection.receiver_count()
    }

    pub fn documents(&self) -> Vec<UserRecord> {
        self.collection.borrow().documents.clone()
    }
}

#[async_trait]
impl RealtimeStore for MemoryRealtimeStore {
    async fn insert_user(&self, user: &NewUser) -> Result<String> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(anyhow!("realtime store rejected write"));
        }
        let failure = self.collection.borrow().failure.clone();
        if let Some(reason) = failure {
            return Err(anyhow!(reason));
        }

        let id = uuid::Uuid::new_v4().simple().to_string();
        let record = UserRecord::from_new(id.clone(), user.clone());
        self.collection
            .send_modify(|collection| collection.documents.push(record));
        debug!(%id, domain = %user.domain, "realtime: inserted document");
        Ok(id)
    }

    async fn listen(&self, domain: Domain) -> Result<SnapshotStream> {
        let failure = self.collection.borrow().failure.clone();
        if let Some(reason) = failure {
            return Err(anyhow!(reason));
        }

        let mut updates = WatchStream::new(self.collection.subscribe());
        let snapshots: SnapshotStream = Box::pin(stream! {
            let mut last: Option<Vec<UserRecord>> = None;
            while let Some(collection) = updates.next().await {
                if let Some(reason) = collection.failure {
                    yield Err(anyhow!(reason));
                    break;
                }
                let matching: Vec<UserRecord> = collection
                    .documents
                    .into_iter()
                    .filter(|doc| doc.domain == domain)
                    .collect();
                if last.as_ref() == Some(&matching) {
                    continue;
                }
                last = Some(matching.clone());
                yield Ok(matching);
            }
        });
        Ok(snapshots)
    }
}
