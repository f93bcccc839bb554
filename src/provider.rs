//! Transaction data provider (consumed) — §6, bounded-retry wrapper (§5, §7).

use std::time::Duration;

use chrono::{DateTime, Utc};
use retry::OperationResult;

use crate::types::DecodedTransaction;

/// `GetTransactions(ctx, address, chainID, since) → [DecodedTransaction]`.
/// Must return every confirmed transaction with `mined_at > since`; order is
/// not assumed — the sync service corrects it (§4.6 step 3).
pub trait TransactionDataProvider: Send + Sync {
    fn get_transactions(
        &self,
        address: &str,
        chain_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<DecodedTransaction>, ProviderError>;
}

/// Error taxonomy for provider calls (§7): transient conditions are
/// retried by [`with_retries`]; non-transient conditions fail the sync
/// pass for the wallet immediately.
#[derive(Debug, Clone)]
pub enum ProviderError {
    /// Network error or HTTP 429/5xx — retryable.
    Transient(String),
    /// Any other HTTP 4xx or malformed-response condition — not retryable.
    NonTransient(String),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::Transient(msg) => write!(f, "transient provider error: {msg}"),
            ProviderError::NonTransient(msg) => write!(f, "provider error: {msg}"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Exponential backoff via the `retry` crate: 1s then 2s between attempts,
/// 3 attempts total (§5, §7). Only [`ProviderError::Transient`] is retried;
/// `NonTransient` fails the sync pass for this wallet immediately by
/// short-circuiting out of `retry::retry` via `OperationResult::Err`.
pub fn with_retries<T>(
    mut call: impl FnMut() -> Result<T, ProviderError>,
) -> Result<T, ProviderError> {
    let delays = [1000u64, 2000].map(Duration::from_millis);
    retry::retry(delays, || match call() {
        Ok(v) => OperationResult::Ok(v),
        Err(ProviderError::Transient(msg)) => OperationResult::Retry(ProviderError::Transient(msg)),
        Err(ProviderError::NonTransient(msg)) => {
            OperationResult::Err(ProviderError::NonTransient(msg))
        }
    })
    .map_err(|e| e.error)
}
