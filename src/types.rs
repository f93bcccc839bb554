//! Ledger data model (§3) and the decoded-transaction input shape consumed
//! from the external transaction-data provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumString};
use uuid::Uuid;

use crate::amount::{Amount, UsdRate, UsdValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay, EnumString, Serialize, Deserialize)]
pub enum AccountType {
    #[strum(serialize = "CRYPTO_WALLET")]
    CryptoWallet,
    #[strum(serialize = "INCOME")]
    Income,
    #[strum(serialize = "EXPENSE")]
    Expense,
    #[strum(serialize = "GAS_FEE")]
    GasFee,
}

impl AccountType {
    /// Whether a `DEBIT` entry increases this account type's stored balance
    /// (§3, §4.7). `CRYPTO_WALLET` and `EXPENSE`/`GAS_FEE` accounts increase
    /// on debit (asset-increase / running-expense convention); `INCOME`
    /// accounts increase on credit.
    pub fn debit_increases(self) -> bool {
        !matches!(self, AccountType::Income)
    }
}

/// One row of `accounts` (§3). `code` is derived and unique; see
/// [`crate::db::account::wallet_account_code`] /
/// [`crate::db::account::nominal_account_code`].
#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub code: String,
    pub account_type: AccountType,
    pub asset_id: String,
    pub wallet_id: Option<Uuid>,
    pub chain_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay, EnumString, Serialize, Deserialize)]
pub enum TransactionStatus {
    #[strum(serialize = "COMPLETED")]
    Completed,
    #[strum(serialize = "FAILED")]
    Failed,
}

/// One row of `transactions` (§3). Immutable once `COMPLETED`.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: Uuid,
    pub tx_type: String,
    pub source: String,
    pub external_id: Option<String>,
    pub status: TransactionStatus,
    pub occurred_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    pub raw_data: serde_json::Value,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay, EnumString, Serialize, Deserialize)]
pub enum EntrySide {
    #[strum(serialize = "DEBIT")]
    Debit,
    #[strum(serialize = "CREDIT")]
    Credit,
}

/// One row of `entries` (§3). Append-only: never updated, never deleted.
#[derive(Debug, Clone)]
pub struct Entry {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub account_id: Uuid,
    pub side: EntrySide,
    pub entry_type: String,
    pub amount: Amount,
    pub asset_id: String,
    pub usd_rate: UsdRate,
    pub usd_value: UsdValue,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct Balance {
    pub account_id: Uuid,
    pub asset_id: String,
    pub balance: Amount,
    pub usd_value: UsdValue,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay, EnumString, Serialize, Deserialize)]
pub enum SyncStatus {
    #[strum(serialize = "PENDING")]
    Pending,
    #[strum(serialize = "SYNCING")]
    Syncing,
    #[strum(serialize = "SYNCED")]
    Synced,
    #[strum(serialize = "ERROR")]
    Error,
}

/// The core's view of a wallet (§3). Only `sync_status` and `last_sync_at`
/// are mutated by the core; everything else belongs to outer collaborators.
#[derive(Debug, Clone)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub chain_id: i64,
    pub address: String,
    pub sync_status: SyncStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_sync_error: Option<String>,
}

// --- Decoded transaction input shape (§3, §6) -----------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay, EnumString, Serialize, Deserialize)]
pub enum OperationType {
    #[strum(serialize = "TRADE")]
    Trade,
    #[strum(serialize = "DEPOSIT")]
    Deposit,
    #[strum(serialize = "WITHDRAW")]
    Withdraw,
    #[strum(serialize = "CLAIM")]
    Claim,
    #[strum(serialize = "RECEIVE")]
    Receive,
    #[strum(serialize = "SEND")]
    Send,
    #[strum(serialize = "EXECUTE")]
    Execute,
    #[strum(serialize = "APPROVE")]
    Approve,
    #[strum(serialize = "MINT")]
    Mint,
    #[strum(serialize = "BURN")]
    Burn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay, EnumString, Serialize, Deserialize)]
pub enum TransferDirection {
    #[strum(serialize = "IN")]
    In,
    #[strum(serialize = "OUT")]
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay, EnumString, Serialize, Deserialize)]
pub enum DecodedTxStatus {
    #[strum(serialize = "CONFIRMED")]
    Confirmed,
    #[strum(serialize = "PENDING")]
    Pending,
    #[strum(serialize = "FAILED")]
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub asset_symbol: String,
    pub contract_address: Option<String>,
    pub decimals: u32,
    pub amount: Amount,
    pub direction: TransferDirection,
    pub sender: String,
    pub recipient: String,
    /// USD price per unit, if the provider supplied one (§4.7 precedence).
    pub usd_price: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fee {
    pub asset_symbol: String,
    pub amount: Amount,
    pub usd_price: Option<f64>,
}

/// A single on-chain transaction enriched with per-transfer USD prices and a
/// high-level operation tag, as delivered by the external transaction-data
/// provider (§6). This is the normalized shape the core depends on; it is
/// never the vendor's own JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodedTransaction {
    pub id: String,
    pub tx_hash: String,
    pub chain_id: i64,
    pub operation_type: OperationType,
    pub protocol: Option<String>,
    pub transfers: Vec<Transfer>,
    pub fee: Option<Fee>,
    pub mined_at: DateTime<Utc>,
    pub status: DecodedTxStatus,
}
