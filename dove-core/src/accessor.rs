//! Remote accessor contract.
//!
//! The accessor is the only path to the remote system: account reads,
//! submission, status and block height. Confirmation polling is provided on
//! top of those primitives.

use crate::error::{AccessorError, DoveResult};
use crate::identity::AccountKey;
use crate::instruction::Submission;
use async_trait::async_trait;
use std::time::Duration;

/// Account contents together with its owner program and native balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMeta {
    pub data: Vec<u8>,
    pub owner: AccountKey,
    pub lamports: u64,
}

/// Handle to a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfirmationHandle {
    pub signature: String,
    /// Last block height at which the submission can still land.
    pub last_valid_height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionStatus {
    Pending,
    Confirmed,
    Failed { reason: String },
}

#[async_trait]
pub trait RemoteAccessor: Send + Sync {
    /// Raw account data, `None` when the account does not exist.
    async fn read(&self, key: &AccountKey) -> DoveResult<Option<Vec<u8>>> {
        Ok(self.read_meta(key).await?.map(|meta| meta.data))
    }

    async fn read_meta(&self, key: &AccountKey) -> DoveResult<Option<AccountMeta>>;

    async fn submit(&self, submission: &Submission) -> DoveResult<ConfirmationHandle>;

    async fn status(&self, handle: &ConfirmationHandle) -> DoveResult<SubmissionStatus>;

    async fn block_height(&self) -> DoveResult<u64>;

    /// Poll until the submission is confirmed, fails, or the block height
    /// passes `expiry_height`.
    ///
    /// Returns within one `poll_interval` of the height being passed.
    async fn await_confirmation(
        &self,
        handle: &ConfirmationHandle,
        expiry_height: u64,
        poll_interval: Duration,
    ) -> DoveResult<()> {
        loop {
            let (status, height) =
                futures_util::future::join(self.status(handle), self.block_height()).await;
            match status? {
                SubmissionStatus::Confirmed => {
                    tracing::debug!(signature = %handle.signature, "Submission confirmed");
                    return Ok(());
                }
                SubmissionStatus::Failed { reason } => {
                    return Err(AccessorError::Failed { reason }.into());
                }
                SubmissionStatus::Pending => {}
            }
            let height = height?;
            if height > expiry_height {
                tracing::warn!(
                    signature = %handle.signature,
                    height,
                    expiry_height,
                    "Submission expired"
                );
                return Err(AccessorError::Expired {
                    height,
                    last_valid_height: expiry_height,
                }
                .into());
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}
