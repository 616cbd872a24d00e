use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, PoisonError,
};

use futures::StreamExt;
use shared::domain::{Domain, UserRecord};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::realtime::RealtimeStore;

/// Cancellation handle for one live query. Cancelling (or dropping) the handle
/// guarantees no further callbacks.
pub struct SubscriptionHandle {
    domain: Domain,
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            debug!(domain = %self.domain, "realtime: subscription cancelled");
        }
        self.task.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// True once the pump task has stopped, whether cancelled or failed.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Owns at most one live subscription and replaces it on filter changes.
pub struct SubscriptionManager {
    store: Arc<dyn RealtimeStore>,
    active: Mutex<Option<SubscriptionHandle>>,
}

impl SubscriptionManager {
    pub fn new(store: Arc<dyn RealtimeStore>) -> Self {
        Self {
            store,
            active: Mutex::new(None),
        }
    }

    /// Opens a live query on `domain`. `on_update` receives the full result
    /// set after every change. On failure `on_error` runs once, the query is
    /// dropped and the consumer should treat the result set as empty.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe<U, E>(
        &self,
        domain: Domain,
        mut on_update: U,
        mut on_error: E,
    ) -> SubscriptionHandle
    where
        U: FnMut(Vec<UserRecord>) + Send + 'static,
        E: FnMut(anyhow::Error) + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let store = Arc::clone(&self.store);

        let task = tokio::spawn(async move {
            let mut snapshots = match store.listen(domain).await {
                Ok(snapshots) => snapshots,
                Err(err) => {
                    if !flag.load(Ordering::SeqCst) {
                        on_error(err);
                    }
                    return;
                }
            };

            while let Some(item) = snapshots.next().await {
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                match item {
                    Ok(users) => on_update(users),
                    Err(err) => {
                        on_error(err);
                        break;
                    }
                }
            }
        });

        info!(%domain, "realtime: subscribed");
        SubscriptionHandle {
            domain,
            cancelled,
            task,
        }
    }

    /// Cancels the held subscription, then opens and holds a new one.
    pub fn resubscribe<U, E>(&self, domain: Domain, on_update: U, on_error: E)
    where
        U: FnMut(Vec<UserRecord>) + Send + 'static,
        E: FnMut(anyhow::Error) + Send + 'static,
    {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = active.take() {
            previous.cancel();
        }
        *active = Some(self.subscribe(domain, on_update, on_error));
    }

    pub fn shutdown(&self) {
        let previous = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    pub fn active_domain(&self) -> Option<Domain> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|handle| !handle.is_cancelled())
            .map(SubscriptionHandle::domain)
    }
}

#[cfg(test)]
#[path = "tests/subscription_tests.rs"]
mod tests;
