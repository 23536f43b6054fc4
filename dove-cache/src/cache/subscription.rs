//! Live subscriptions to a cache type.
//!
//! A subscription holds interest in its type and every transitive dependency,
//! and runs a background task that resolves on creation and again whenever
//! something in that closure, or the principal, changes. The latest state is
//! published on a watch channel so reads never block.

use super::entry::{EntrySnapshot, EntryStatus};
use super::registry::{CacheEvent, CacheRegistry};
use super::traits::CacheType;
use dove_core::{CacheError, CacheId, DoveError, DoveResult};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// State of a subscribed value.
pub enum CacheView<T> {
    Pending,
    Ready(Arc<T>),
    Failed(DoveError),
}

impl<T> Clone for CacheView<T> {
    fn clone(&self) -> Self {
        match self {
            CacheView::Pending => CacheView::Pending,
            CacheView::Ready(value) => CacheView::Ready(value.clone()),
            CacheView::Failed(error) => CacheView::Failed(error.clone()),
        }
    }
}

impl<T> fmt::Debug for CacheView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheView::Pending => f.write_str("Pending"),
            CacheView::Ready(_) => f.write_str("Ready"),
            CacheView::Failed(error) => f.debug_tuple("Failed").field(error).finish(),
        }
    }
}

impl<T> CacheView<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, CacheView::Pending)
    }

    pub fn value(&self) -> Option<Arc<T>> {
        match self {
            CacheView::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&DoveError> {
        match self {
            CacheView::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// `(value, error)`: both `None` while pending.
    pub fn into_parts(self) -> (Option<Arc<T>>, Option<DoveError>) {
        match self {
            CacheView::Pending => (None, None),
            CacheView::Ready(value) => (Some(value), None),
            CacheView::Failed(error) => (None, Some(error)),
        }
    }

    fn from_snapshot(cache: CacheId, snapshot: &EntrySnapshot) -> Self
    where
        T: Send + Sync + 'static,
    {
        match snapshot.status {
            EntryStatus::Pending => CacheView::Pending,
            EntryStatus::Ready => match snapshot.typed::<T>() {
                Ok(Some(value)) => CacheView::Ready(value),
                Ok(None) => CacheView::Failed(CacheError::FetchAbandoned { cache }.into()),
                Err(error) => CacheView::Failed(error),
            },
            EntryStatus::Failed => CacheView::Failed(
                snapshot
                    .error
                    .clone()
                    .unwrap_or_else(|| CacheError::FetchAbandoned { cache }.into()),
            ),
        }
    }
}

/// A live view of cache type `C`. Dropping it releases its interest.
pub struct Subscription<C: CacheType> {
    registry: CacheRegistry,
    closure: BTreeSet<CacheId>,
    state: watch::Receiver<CacheView<C::Value>>,
    task: JoinHandle<()>,
}

impl<C: CacheType> Subscription<C> {
    pub(crate) fn spawn(registry: CacheRegistry) -> DoveResult<Self> {
        if !registry.contains(C::ID) {
            return Err(CacheError::UnknownCacheType { cache: C::ID }.into());
        }
        let closure = registry.graph().dependency_closure(C::ID);
        registry.acquire(&closure)?;
        // Subscribe before the first resolve so no invalidation is missed.
        let events = registry.events();
        let (tx, rx) = watch::channel(CacheView::Pending);
        let task = tokio::spawn(run::<C>(registry.clone(), closure.clone(), events, tx));
        tracing::debug!(cache = %C::ID, closure = closure.len(), "Subscribed");
        Ok(Self {
            registry,
            closure,
            state: rx,
            task,
        })
    }

    /// Latest state; `(None, None)` while pending. Never blocks.
    pub fn current(&self) -> (Option<Arc<C::Value>>, Option<DoveError>) {
        self.view().into_parts()
    }

    pub fn view(&self) -> CacheView<C::Value> {
        self.state.borrow().clone()
    }

    /// Wait for the next state transition.
    pub async fn changed(&mut self) -> DoveResult<CacheView<C::Value>> {
        self.state
            .changed()
            .await
            .map_err(|_| DoveError::from(CacheError::Closed))?;
        Ok(self.state.borrow_and_update().clone())
    }

    /// Wait until the state is not pending.
    pub async fn settled(&mut self) -> DoveResult<CacheView<C::Value>> {
        loop {
            let view = self.state.borrow_and_update().clone();
            if !view.is_pending() {
                return Ok(view);
            }
            self.state
                .changed()
                .await
                .map_err(|_| DoveError::from(CacheError::Closed))?;
        }
    }

    pub fn closure(&self) -> &BTreeSet<CacheId> {
        &self.closure
    }
}

impl<C: CacheType> Drop for Subscription<C> {
    fn drop(&mut self) {
        // Shared fetches run on their own tasks and are unaffected.
        self.task.abort();
        self.registry.release(&self.closure);
        tracing::debug!(cache = %C::ID, "Unsubscribed");
    }
}

impl<C: CacheType> fmt::Debug for Subscription<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("cache", &C::ID)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

async fn run<C: CacheType>(
    registry: CacheRegistry,
    closure: BTreeSet<CacheId>,
    mut events: broadcast::Receiver<CacheEvent>,
    tx: watch::Sender<CacheView<C::Value>>,
) {
    let mut published: Option<u64> = None;
    loop {
        if registry.is_stale(C::ID).unwrap_or(true) {
            tx.send_if_modified(|view| {
                if view.is_pending() {
                    false
                } else {
                    *view = CacheView::Pending;
                    true
                }
            });
            published = None;
        }

        match registry.resolve_entry(C::ID).await {
            Ok(snapshot) => {
                if published != Some(snapshot.stamp.revision) {
                    published = Some(snapshot.stamp.revision);
                    tx.send_replace(CacheView::from_snapshot(C::ID, &snapshot));
                }
            }
            Err(DoveError::Cache(CacheError::Closed)) => return,
            Err(error) => {
                published = None;
                tx.send_replace(CacheView::Failed(error));
            }
        }

        loop {
            match events.recv().await {
                Ok(CacheEvent::Invalidated { caches }) => {
                    if caches.iter().any(|id| closure.contains(id)) {
                        break;
                    }
                }
                Ok(CacheEvent::PrincipalChanged { .. }) => break,
                Ok(CacheEvent::Updated {
                    key,
                    status,
                    revision,
                }) => {
                    if !closure.contains(&key.cache()) {
                        continue;
                    }
                    let own_update = key.cache() == C::ID
                        && status != EntryStatus::Pending
                        && published != Some(revision);
                    if own_update || registry.is_stale(C::ID).unwrap_or(true) {
                        break;
                    }
                }
                Ok(CacheEvent::Discarded { .. }) => {}
                Ok(CacheEvent::Shutdown) | Err(broadcast::error::RecvError::Closed) => return,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(cache = %C::ID, skipped, "Subscription lagged, resolving again");
                    break;
                }
            }
        }
    }
}
