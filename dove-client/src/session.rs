//! Session context: one registry, one ledger, one active principal.
//!
//! A `Session` owns everything a front end needs and nothing is global.
//! Build one per connection and call [`Session::shutdown`] when done.

use crate::rpc::{RpcAccessor, TransactionSigner};
use async_trait::async_trait;
use dove_cache::{
    register_defaults, CacheRegistry, CacheType, EntrySnapshot, RegistryConfig, Snapshot,
};
use dove_core::{
    AccessorError, AccountKey, AccountMeta, CacheId, ConfirmationHandle, DoveConfig, DoveResult,
    Principal, RemoteAccessor, Submission, SubmissionStatus,
};
use dove_ledger::Ledger;
use futures_util::future::join_all;
use std::sync::Arc;

/// Accessor for mock mode. Every cache serves its mock value, so reads
/// find nothing and submissions are refused.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineAccessor;

#[async_trait]
impl RemoteAccessor for OfflineAccessor {
    async fn read_meta(&self, _key: &AccountKey) -> DoveResult<Option<AccountMeta>> {
        Ok(None)
    }

    async fn submit(&self, _submission: &Submission) -> DoveResult<ConfirmationHandle> {
        Err(AccessorError::Transport {
            reason: "mock backend cannot submit transactions".to_string(),
        }
        .into())
    }

    async fn status(&self, _handle: &ConfirmationHandle) -> DoveResult<SubmissionStatus> {
        Ok(SubmissionStatus::Pending)
    }

    async fn block_height(&self) -> DoveResult<u64> {
        Ok(0)
    }
}

#[derive(Debug)]
pub struct Session {
    config: DoveConfig,
    registry: CacheRegistry,
    ledger: Ledger,
}

impl Session {
    pub fn new(config: DoveConfig, accessor: Arc<dyn RemoteAccessor>) -> DoveResult<Self> {
        let registry_config = RegistryConfig::from_config(&config);
        Self::with_registry_config(config, registry_config, accessor)
    }

    /// Build with explicit registry settings, e.g. a pinned clock.
    pub fn with_registry_config(
        config: DoveConfig,
        registry_config: RegistryConfig,
        accessor: Arc<dyn RemoteAccessor>,
    ) -> DoveResult<Self> {
        config.validate()?;
        let registry =
            register_defaults(CacheRegistry::builder(accessor.clone()).with_config(registry_config))
                .build()?;
        let ledger = Ledger::from_config(accessor, Arc::new(registry.clone()), &config);
        tracing::info!(
            program_id = %config.program_id.short(),
            mock = config.mock_backend,
            "Session created"
        );
        Ok(Self {
            config,
            registry,
            ledger,
        })
    }

    /// Connect to the configured endpoint, or go offline in mock mode.
    ///
    /// With a signer, its principal becomes the active one.
    pub fn connect(
        config: DoveConfig,
        signer: Option<Arc<dyn TransactionSigner>>,
    ) -> DoveResult<Self> {
        let accessor: Arc<dyn RemoteAccessor> = if config.mock_backend {
            Arc::new(OfflineAccessor)
        } else {
            let rpc = RpcAccessor::from_config(&config)?;
            match &signer {
                Some(signer) => Arc::new(rpc.with_signer(signer.clone())),
                None => Arc::new(rpc),
            }
        };
        let session = Self::new(config, accessor)?;
        if let Some(signer) = signer {
            session.set_principal(Some(signer.principal()))?;
        }
        Ok(session)
    }

    pub fn config(&self) -> &DoveConfig {
        &self.config
    }

    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn principal(&self) -> DoveResult<Option<Principal>> {
        self.registry.principal()
    }

    pub fn set_principal(&self, principal: Option<Principal>) -> DoveResult<()> {
        self.registry.set_principal(principal)
    }

    pub async fn resolve<C: CacheType>(&self) -> DoveResult<Arc<C::Value>> {
        self.registry.resolve::<C>().await
    }

    /// Snapshot of whatever is fresh right now.
    pub fn snapshot(&self) -> DoveResult<Snapshot> {
        self.registry.snapshot()
    }

    /// Resolve `caches`, then snapshot. Fails with the first resolve error.
    pub async fn ready_snapshot(&self, caches: &[CacheId]) -> DoveResult<Snapshot> {
        let settled = join_all(caches.iter().map(|id| self.registry.resolve_entry(*id))).await;
        for (id, result) in caches.iter().zip(settled) {
            let entry = result?;
            if let Some(error) = entry.error {
                tracing::debug!(cache = %id, error = %error, "Cache not ready for snapshot");
                return Err(error);
            }
        }
        self.registry.snapshot()
    }

    /// Resolve every registered type, in dependency order.
    pub async fn resolve_all(&self) -> DoveResult<Vec<(CacheId, DoveResult<EntrySnapshot>)>> {
        let order = self.registry.graph().topological_order()?;
        let settled = join_all(order.iter().map(|id| self.registry.resolve_entry(*id))).await;
        Ok(order.into_iter().zip(settled).collect())
    }

    pub fn shutdown(&self) {
        self.registry.shutdown();
        tracing::info!("Session closed");
    }
}
