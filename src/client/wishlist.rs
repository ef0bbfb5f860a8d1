//! Optimistic wishlist state for client code.
//!
//! [`OptimisticWishlist`] keeps a local copy of the signed-in user's
//! wishlist. Toggles apply locally first, then go to the remote; when the
//! remote call fails the local copy is replaced by a fresh fetch instead of
//! being rolled back by hand. Concurrent toggles are not sequenced, so the
//! server's last write wins.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::services::WishlistService;
use crate::EcommerceError;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server error: {0}")]
    Server(String),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("wishlist is not initialised for a session")]
    NoSession,
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Authoritative wishlist for one signed-in user.
#[async_trait]
pub trait WishlistRemote: Send + Sync {
    async fn fetch(&self) -> Result<BTreeSet<Uuid>, RemoteError>;
    async fn add(&self, product_id: Uuid) -> Result<(), RemoteError>;
    async fn remove(&self, product_id: Uuid) -> Result<(), RemoteError>;
}

struct State<R> {
    remote: Option<Arc<R>>,
    items: BTreeSet<Uuid>,
    // Bumped by init and teardown; work started under an older value is dropped.
    generation: u64,
}

pub struct OptimisticWishlist<R> {
    state: Mutex<State<R>>,
}

impl<R> Default for OptimisticWishlist<R> {
    fn default() -> Self {
        Self { state: Mutex::new(State { remote: None, items: BTreeSet::new(), generation: 0 }) }
    }
}

impl<R: WishlistRemote> OptimisticWishlist<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the container to a session and loads its membership.
    pub async fn init(&self, remote: R) -> Result<(), ClientError> {
        let remote = Arc::new(remote);
        let generation = {
            let mut state = self.state.lock().await;
            state.generation += 1;
            state.remote = Some(remote.clone());
            state.items.clear();
            state.generation
        };
        let items = remote.fetch().await?;
        self.replace_if_current(generation, items).await;
        Ok(())
    }

    /// Drops the session. Results of calls still in flight are discarded.
    pub async fn teardown(&self) {
        let mut state = self.state.lock().await;
        state.generation += 1;
        state.remote = None;
        state.items.clear();
    }

    pub async fn contains(&self, product_id: Uuid) -> bool {
        self.state.lock().await.items.contains(&product_id)
    }

    pub async fn items(&self) -> BTreeSet<Uuid> {
        self.state.lock().await.items.clone()
    }

    /// Flips membership of `product_id` and returns the new local
    /// membership. A failed sync is logged and triggers a reload; it is
    /// not reported to the caller.
    pub async fn toggle(&self, product_id: Uuid) -> Result<bool, ClientError> {
        let (remote, generation, added) = {
            let mut state = self.state.lock().await;
            let remote = state.remote.clone().ok_or(ClientError::NoSession)?;
            let added = if state.items.remove(&product_id) {
                false
            } else {
                state.items.insert(product_id);
                true
            };
            (remote, state.generation, added)
        };

        let synced = if added { remote.add(product_id).await } else { remote.remove(product_id).await };
        if let Err(e) = synced {
            tracing::warn!(%product_id, added, error = %e, "wishlist sync failed, reloading");
            self.reload(&*remote, generation).await;
        }
        Ok(added)
    }

    async fn reload(&self, remote: &R, generation: u64) {
        match remote.fetch().await {
            Ok(items) => self.replace_if_current(generation, items).await,
            Err(e) => tracing::warn!(error = %e, "wishlist reload failed"),
        }
    }

    async fn replace_if_current(&self, generation: u64, items: BTreeSet<Uuid>) {
        let mut state = self.state.lock().await;
        if state.generation == generation {
            state.items = items;
        } else {
            tracing::debug!("discarding wishlist result from a previous session");
        }
    }
}

/// Remote backed directly by the in-process wishlist service.
#[derive(Clone)]
pub struct ServiceRemote {
    service: WishlistService,
    user_id: Uuid,
}

impl ServiceRemote {
    pub fn new(service: WishlistService, user_id: Uuid) -> Self {
        Self { service, user_id }
    }
}

fn server_error(e: EcommerceError) -> RemoteError {
    RemoteError::Server(e.to_string())
}

#[async_trait]
impl WishlistRemote for ServiceRemote {
    async fn fetch(&self) -> Result<BTreeSet<Uuid>, RemoteError> {
        Ok(self.service.get(self.user_id).await.map_err(server_error)?.product_ids)
    }

    async fn add(&self, product_id: Uuid) -> Result<(), RemoteError> {
        self.service.add(self.user_id, product_id).await.map(|_| ()).map_err(server_error)
    }

    async fn remove(&self, product_id: Uuid) -> Result<(), RemoteError> {
        self.service.remove(self.user_id, product_id).await.map(|_| ()).map_err(server_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    #[derive(Clone, Default)]
    struct FakeRemote {
        server: Arc<Mutex<BTreeSet<Uuid>>>,
        offline: Arc<AtomicBool>,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl WishlistRemote for FakeRemote {
        async fn fetch(&self) -> Result<BTreeSet<Uuid>, RemoteError> {
            Ok(self.server.lock().await.clone())
        }

        async fn add(&self, product_id: Uuid) -> Result<(), RemoteError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.offline.load(Ordering::SeqCst) {
                return Err(RemoteError::Network("offline".into()));
            }
            self.server.lock().await.insert(product_id);
            Ok(())
        }

        async fn remove(&self, product_id: Uuid) -> Result<(), RemoteError> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(RemoteError::Network("offline".into()));
            }
            self.server.lock().await.remove(&product_id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_toggle_online() {
        let remote = FakeRemote::default();
        let wishlist = OptimisticWishlist::new();
        wishlist.init(remote.clone()).await.unwrap();
        let p = Uuid::new_v4();

        assert!(wishlist.toggle(p).await.unwrap());
        assert!(remote.server.lock().await.contains(&p));
        assert!(!wishlist.toggle(p).await.unwrap());
        assert!(!wishlist.contains(p).await);
        assert!(remote.server.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_offline_toggle_reverts_after_reload() {
        let remote = FakeRemote::default();
        remote.offline.store(true, Ordering::SeqCst);
        let wishlist = OptimisticWishlist::new();
        wishlist.init(remote.clone()).await.unwrap();
        let p = Uuid::new_v4();

        // The optimistic guess is returned, not an error.
        assert!(wishlist.toggle(p).await.unwrap());
        assert!(!wishlist.contains(p).await);
    }

    #[tokio::test]
    async fn test_results_after_teardown_are_discarded() {
        let gate = Arc::new(Notify::new());
        let remote = FakeRemote { gate: Some(gate.clone()), ..Default::default() };
        remote.offline.store(true, Ordering::SeqCst);
        let kept = Uuid::new_v4();
        remote.server.lock().await.insert(kept);

        let wishlist = Arc::new(OptimisticWishlist::new());
        wishlist.init(remote.clone()).await.unwrap();
        let p = Uuid::new_v4();

        let task = tokio::spawn({
            let wishlist = wishlist.clone();
            async move { wishlist.toggle(p).await }
        });
        while !wishlist.contains(p).await {
            tokio::task::yield_now().await;
        }
        wishlist.teardown().await;
        gate.notify_one();

        assert!(task.await.unwrap().unwrap());
        assert!(wishlist.items().await.is_empty());
    }

    #[tokio::test]
    async fn test_toggle_requires_session() {
        let wishlist: OptimisticWishlist<FakeRemote> = OptimisticWishlist::new();
        assert!(matches!(wishlist.toggle(Uuid::new_v4()).await, Err(ClientError::NoSession)));
    }

    #[tokio::test]
    async fn test_service_remote_reconciles_unknown_product() {
        use crate::store::MemoryStore;

        let service = WishlistService::new(Arc::new(MemoryStore::new()));
        let wishlist = OptimisticWishlist::new();
        wishlist.init(ServiceRemote::new(service, Uuid::new_v4())).await.unwrap();

        // The server rejects an unknown product, so the local add is undone by the reload.
        let ghost = Uuid::new_v4();
        assert!(wishlist.toggle(ghost).await.unwrap());
        assert!(!wishlist.contains(ghost).await);
    }
}
