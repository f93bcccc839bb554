//! Top-level error taxonomy for the ledger core (§4.2, §7).

use crate::amount::Amount;
use displaydoc::Display;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by [`crate::ledger_service::LedgerService::record`] and
/// the other `LedgerService` entry points crossing the crate boundary
/// (`GetBalance`, `ReconcileBalance`) — `thiserror` here rather than
/// `displaydoc` since this is the one error type external callers match on
/// by variant (`DuplicateExternalID` / `NegativeBalanceForbidden`) rather
/// than just log.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("no handler is registered for transaction type {0:?}")]
    UnknownType(String),

    #[error("payload validation failed: {0}")]
    ValidationFailed(String),

    #[error("a completed transaction already exists for this (source, external_id)")]
    DuplicateExternalID,

    #[error("generated entries do not balance for asset {asset}: debits={debits} credits={credits}")]
    UnbalancedEntries {
        asset: String,
        debits: Amount,
        credits: Amount,
    },

    #[error("recording would drive account {account} asset {asset} balance below zero (delta {attempted_delta})")]
    NegativeBalanceForbidden {
        account: Uuid,
        asset: String,
        attempted_delta: String,
    },

    #[error("could not resolve or create an account for code {0:?}")]
    AccountResolutionFailed(String),

    #[error("occurred_at is in the future")]
    OccurredAtInFuture,

    #[error("database error: {0}")]
    Diesel(#[from] diesel::result::Error),

    #[error("database pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result of [`crate::ledger_service::LedgerService::reconcile_balance`]
/// (§4.3, §6).
#[derive(Debug, PartialEq, Eq)]
pub enum ReconcileResult {
    Ok,
    Mismatch { stored: Amount, computed: Amount },
}

/// Errors from the handler registry (§4.1).
#[derive(Display, Debug)]
pub enum RegistryError {
    /// a handler is already registered for transaction type {0:?}
    DuplicateRegistration(String),
}

impl std::error::Error for RegistryError {}

/// Errors surfaced by the wallet-sync driver (§4.6, §7).
#[derive(Display, Debug)]
pub enum SyncError {
    /// database error: {0}
    Database(diesel::result::Error),

    /// wallet-sync pool error: {0}
    Pool(diesel::r2d2::PoolError),

    /// transaction data provider error: {0}
    Provider(String),

    /// ledger error while recording decoded transaction: {0:?}
    Ledger(LedgerError),
}

impl std::error::Error for SyncError {}

impl From<diesel::result::Error> for SyncError {
    fn from(src: diesel::result::Error) -> Self {
        Self::Database(src)
    }
}

impl From<diesel::r2d2::PoolError> for SyncError {
    fn from(src: diesel::r2d2::PoolError) -> Self {
        Self::Pool(src)
    }
}

impl From<LedgerError> for SyncError {
    fn from(src: LedgerError) -> Self {
        Self::Ledger(src)
    }
}
