//! Error types for Dove client operations

use crate::identity::{AccountKey, CacheId};
use thiserror::Error;

/// Errors raised by a remote accessor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccessorError {
    #[error("Transport error: {reason}")]
    Transport { reason: String },

    #[error("Account not found: {key}")]
    MissingAccount { key: AccountKey },

    #[error("Submission rejected: {message}")]
    Rejected { message: String },

    #[error("Transaction failed: {reason}")]
    Failed { reason: String },

    #[error("Transaction expired (block height {height} exceeded {last_valid_height})")]
    Expired { height: u64, last_valid_height: u64 },

    #[error("No signer available: {reason}")]
    SignerUnavailable { reason: String },
}

/// Cache registry errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Unknown cache type: {cache}")]
    UnknownCacheType { cache: CacheId },

    #[error("Cache type registered twice: {cache}")]
    DuplicateCacheType { cache: CacheId },

    #[error("Cache {cache} depends on unregistered {dependency}")]
    UnknownDependency { cache: CacheId, dependency: CacheId },

    #[error("Dependency cycle detected: {path:?}")]
    DependencyCycle { path: Vec<CacheId> },

    #[error("Cache {cache} is not principal-scoped but depends on principal-scoped {dependency}")]
    PrincipalScopeViolation { cache: CacheId, dependency: CacheId },

    #[error("Dependency {dependency} of {cache} failed: {source}")]
    DependencyFailed {
        cache: CacheId,
        dependency: CacheId,
        source: Box<DoveError>,
    },

    #[error("Dependency {dependency} of {cache} is not ready")]
    DependencyNotReady { cache: CacheId, dependency: CacheId },

    #[error("{cache}: {what}")]
    MissingRemoteState { cache: CacheId, what: String },

    #[error("Cache value type mismatch for {cache}")]
    TypeMismatch { cache: CacheId },

    #[error("Fetch for {cache} was abandoned before settling")]
    FetchAbandoned { cache: CacheId },

    #[error("Cache registry is shut down")]
    Closed,

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// Transaction composition and submission errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Wallet not connected")]
    NotConnected,

    #[error("Required cache {cache} is not ready")]
    NotReady { cache: CacheId },

    #[error("{what}")]
    MissingState { what: String },

    #[error("Invalid amount for {field}: {reason}")]
    InvalidAmount { field: String, reason: String },

    #[error("Step {step} ({phase}) cannot follow a {after} step")]
    PhaseOrder {
        step: String,
        phase: String,
        after: String,
    },

    #[error("{reason}")]
    Rejected { reason: String },

    #[error("Accessor contract violated: {reason}")]
    ContractViolation { reason: String },
}

/// Protocol record and key errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Failed to decode {record}: {reason}")]
    Decode { record: &'static str, reason: String },

    #[error("Failed to encode {record}: {reason}")]
    Encode { record: &'static str, reason: String },

    #[error("Invalid account key {value}: {reason}")]
    InvalidKey { value: String, reason: String },

    #[error("Can't find oracle {key}")]
    OracleUnavailable { key: AccountKey },

    #[error("Unknown asset: {mint}")]
    UnknownAsset { mint: AccountKey },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing config path (use --config or DOVE_CONFIG)")]
    MissingConfigPath,

    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config: {reason}")]
    Parse { reason: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Coarse error taxonomy surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// A required cache or dependency has not resolved yet.
    NotReady,
    /// A read returned nothing for a key expected to exist.
    MissingRemoteState,
    /// The remote system rejected or reverted a submission.
    RemoteRejection,
    /// Confirmation was not observed before the expiry height.
    Expiry,
    /// The accessor could not reach the remote system.
    Transport,
    /// Bad input, configuration or cache graph.
    Invalid,
}

/// Master error type for all Dove errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DoveError {
    #[error("Accessor error: {0}")]
    Accessor(#[from] AccessorError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl DoveError {
    /// Classify this error. Dependency failures take the class of the
    /// underlying dependency error.
    pub fn class(&self) -> ErrorClass {
        match self {
            DoveError::Accessor(err) => match err {
                AccessorError::Transport { .. } | AccessorError::SignerUnavailable { .. } => {
                    ErrorClass::Transport
                }
                AccessorError::MissingAccount { .. } => ErrorClass::MissingRemoteState,
                AccessorError::Rejected { .. } | AccessorError::Failed { .. } => {
                    ErrorClass::RemoteRejection
                }
                AccessorError::Expired { .. } => ErrorClass::Expiry,
            },
            DoveError::Cache(err) => match err {
                CacheError::DependencyFailed { source, .. } => source.class(),
                CacheError::DependencyNotReady { .. } => ErrorClass::NotReady,
                CacheError::MissingRemoteState { .. } => ErrorClass::MissingRemoteState,
                _ => ErrorClass::Invalid,
            },
            DoveError::Ledger(err) => match err {
                LedgerError::NotReady { .. } => ErrorClass::NotReady,
                LedgerError::MissingState { .. } => ErrorClass::MissingRemoteState,
                LedgerError::Rejected { .. } => ErrorClass::RemoteRejection,
                _ => ErrorClass::Invalid,
            },
            DoveError::Protocol(ProtocolError::OracleUnavailable { .. }) => {
                ErrorClass::MissingRemoteState
            }
            DoveError::Protocol(_) | DoveError::Config(_) => ErrorClass::Invalid,
        }
    }
}

/// Result type alias for Dove operations.
pub type DoveResult<T> = Result<T, DoveError>;

// =============================================================================
// TESTS
// =============================================================================
