//! JSON-RPC remote accessor.
//!
//! Speaks the Solana-style JSON-RPC dialect: `getAccountInfo` (base64),
//! `getBlockHeight`, `getLatestBlockhash`, `sendTransaction` and
//! `getSignatureStatuses`. Keys travel base58-encoded. Signing is delegated to
//! a [`TransactionSigner`] supplied by the wallet.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use dove_core::{
    AccessorError, AccountKey, AccountMeta, ConfirmationHandle, DoveConfig, DoveResult,
    Principal, RemoteAccessor, Submission, SubmissionStatus,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ============================================================================
// SIGNER
// ============================================================================

/// Wallet collaborator that turns a submission into signed wire bytes.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// The key the signer pays and signs with.
    fn principal(&self) -> Principal;

    async fn sign(&self, submission: &Submission, recent_blockhash: &str) -> DoveResult<Vec<u8>>;
}

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct RpcAccount {
    /// `[payload, encoding]`
    data: (String, String),
    owner: String,
    lamports: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlockhash {
    blockhash: String,
    last_valid_block_height: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcSignatureStatus {
    err: Option<Value>,
    confirmation_status: Option<String>,
}

// ============================================================================
// ACCESSOR
// ============================================================================

pub struct RpcAccessor {
    client: Client,
    url: String,
    commitment: String,
    signer: Option<Arc<dyn TransactionSigner>>,
    next_id: AtomicU64,
}

impl RpcAccessor {
    pub fn from_config(config: &DoveConfig) -> DoveResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: config.rpc.url.clone(),
            commitment: config.rpc.commitment.clone(),
            signer: None,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn with_signer(mut self, signer: Arc<dyn TransactionSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> DoveResult<T> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport(format!("{} request failed: {}", method, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(transport(format!("{} returned HTTP {}: {}", method, status, body)));
        }

        let body: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| transport(format!("Failed to parse {} response: {}", method, e)))?;
        if let Some(error) = body.error {
            tracing::debug!(method, code = error.code, message = %error.message, "RPC error");
            return Err(rpc_error(method, error));
        }
        body.result
            .ok_or_else(|| transport(format!("{} response has no result", method)))
    }

    async fn latest_blockhash(&self) -> DoveResult<RpcBlockhash> {
        let reply: WithContext<RpcBlockhash> = self
            .call("getLatestBlockhash", json!([{ "commitment": self.commitment }]))
            .await?;
        Ok(reply.value)
    }
}

#[async_trait]
impl RemoteAccessor for RpcAccessor {
    async fn read_meta(&self, key: &AccountKey) -> DoveResult<Option<AccountMeta>> {
        let reply: WithContext<Option<RpcAccount>> = self
            .call(
                "getAccountInfo",
                json!([key.to_base58(), { "encoding": "base64", "commitment": self.commitment }]),
            )
            .await?;
        reply.value.map(decode_account).transpose()
    }

    async fn submit(&self, submission: &Submission) -> DoveResult<ConfirmationHandle> {
        let signer = self.signer.as_ref().ok_or_else(|| AccessorError::SignerUnavailable {
            reason: "no wallet connected".to_string(),
        })?;
        let blockhash = self.latest_blockhash().await?;
        let wire = signer.sign(submission, &blockhash.blockhash).await?;
        let signature: String = self
            .call(
                "sendTransaction",
                json!([
                    BASE64.encode(wire),
                    { "encoding": "base64", "preflightCommitment": self.commitment }
                ]),
            )
            .await?;
        tracing::info!(
            submission_id = %submission.id,
            signature = %signature,
            last_valid_height = blockhash.last_valid_block_height,
            "Transaction sent"
        );
        Ok(ConfirmationHandle {
            signature,
            last_valid_height: blockhash.last_valid_block_height,
        })
    }

    async fn status(&self, handle: &ConfirmationHandle) -> DoveResult<SubmissionStatus> {
        let reply: WithContext<Vec<Option<RpcSignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([[handle.signature], { "searchTransactionHistory": true }]),
            )
            .await?;
        let status = reply.value.into_iter().next().flatten();
        Ok(signature_status(status, &self.commitment))
    }

    async fn block_height(&self) -> DoveResult<u64> {
        self.call("getBlockHeight", json!([{ "commitment": self.commitment }]))
            .await
    }
}

impl fmt::Debug for RpcAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcAccessor")
            .field("url", &self.url)
            .field("commitment", &self.commitment)
            .field("signer", &self.signer.as_ref().map(|s| s.principal()))
            .finish()
    }
}

// ============================================================================
// DECODING
// ============================================================================

fn transport(reason: String) -> dove_core::DoveError {
    AccessorError::Transport { reason }.into()
}

/// `sendTransaction` errors are rejections and keep the program logs so the
/// ledger can extract a reason. Everything else is a transport failure.
fn rpc_error(method: &str, error: RpcErrorBody) -> dove_core::DoveError {
    if method == "sendTransaction" {
        let message = match error.data {
            Some(data) => format!("{} {}", error.message, data),
            None => error.message,
        };
        return AccessorError::Rejected { message }.into();
    }
    transport(format!("{} failed ({}): {}", method, error.code, error.message))
}

fn decode_account(account: RpcAccount) -> DoveResult<AccountMeta> {
    let (payload, encoding) = account.data;
    if encoding != "base64" {
        return Err(transport(format!("unexpected account encoding {}", encoding)));
    }
    let data = BASE64
        .decode(payload)
        .map_err(|e| transport(format!("invalid base64 account data: {}", e)))?;
    Ok(AccountMeta {
        data,
        owner: AccountKey::from_base58(&account.owner)?,
        lamports: account.lamports,
    })
}

fn commitment_rank(level: &str) -> u8 {
    match level {
        "processed" => 0,
        "confirmed" => 1,
        "finalized" => 2,
        _ => u8::MAX,
    }
}

fn signature_status(status: Option<RpcSignatureStatus>, commitment: &str) -> SubmissionStatus {
    let Some(status) = status else {
        return SubmissionStatus::Pending;
    };
    if let Some(err) = status.err {
        return SubmissionStatus::Failed {
            reason: err.to_string(),
        };
    }
    match status.confirmation_status.as_deref() {
        Some(level) if commitment_rank(level) >= commitment_rank(commitment) => {
            SubmissionStatus::Confirmed
        }
        _ => SubmissionStatus::Pending,
    }
}
