//! Diesel row models for the ledger tables.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use super::schema::{account_balances, accounts, entries, transactions, wallets};
use crate::amount::{Amount, UsdRate, UsdValue};

// Account types (see types::AccountType).
pub const ACCOUNT_CRYPTO_WALLET: &str = "CRYPTO_WALLET";
pub const ACCOUNT_INCOME: &str = "INCOME";
pub const ACCOUNT_EXPENSE: &str = "EXPENSE";
pub const ACCOUNT_GAS_FEE: &str = "GAS_FEE";

// Transaction status.
pub const TX_COMPLETED: &str = "COMPLETED";
pub const TX_FAILED: &str = "FAILED";

// Entry side.
pub const SIDE_DEBIT: &str = "DEBIT";
pub const SIDE_CREDIT: &str = "CREDIT";

// Wallet sync status.
pub const SYNC_PENDING: &str = "PENDING";
pub const SYNC_SYNCING: &str = "SYNCING";
pub const SYNC_SYNCED: &str = "SYNCED";
pub const SYNC_ERROR: &str = "ERROR";

#[derive(Clone, Queryable, Identifiable, Debug)]
#[diesel(table_name = accounts)]
pub struct Account {
    pub id: Uuid,
    pub code: String,
    pub account_type: String,
    pub asset_id: String,
    pub wallet_id: Option<Uuid>,
    pub chain_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = accounts)]
pub struct NewAccount<'a> {
    pub id: Uuid,
    pub code: &'a str,
    pub account_type: &'a str,
    pub asset_id: &'a str,
    pub wallet_id: Option<Uuid>,
    pub chain_id: Option<i64>,
}

#[derive(Clone, Queryable, Identifiable, Debug)]
#[diesel(table_name = transactions)]
pub struct Transaction {
    pub id: Uuid,
    pub tx_type: String,
    pub source: String,
    pub external_id: Option<String>,
    pub status: String,
    pub occurred_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    pub raw_data: serde_json::Value,
    pub error_message: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = transactions)]
pub struct NewTransaction<'a> {
    pub id: Uuid,
    pub tx_type: &'a str,
    pub source: &'a str,
    pub external_id: Option<&'a str>,
    pub status: &'a str,
    pub occurred_at: DateTime<Utc>,
    pub raw_data: serde_json::Value,
    pub error_message: Option<&'a str>,
}

#[derive(Clone, Queryable, Identifiable, Debug)]
#[diesel(table_name = entries)]
pub struct Entry {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub account_id: Uuid,
    pub side: String,
    pub entry_type: String,
    pub amount: Amount,
    pub asset_id: String,
    pub usd_rate: UsdRate,
    pub usd_value: UsdValue,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

#[derive(Insertable)]
#[diesel(table_name = entries)]
pub struct NewEntry<'a> {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub account_id: Uuid,
    pub side: &'a str,
    pub entry_type: &'a str,
    pub amount: Amount,
    pub asset_id: &'a str,
    pub usd_rate: UsdRate,
    pub usd_value: UsdValue,
    pub occurred_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

#[derive(Clone, Queryable, Identifiable, Debug)]
#[diesel(table_name = account_balances, primary_key(account_id, asset_id))]
pub struct AccountBalance {
    pub account_id: Uuid,
    pub asset_id: String,
    pub balance: Amount,
    pub usd_value: UsdValue,
    pub last_updated: DateTime<Utc>,
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = account_balances)]
pub struct NewAccountBalance<'a> {
    pub account_id: Uuid,
    pub asset_id: &'a str,
    pub balance: Amount,
    pub usd_value: UsdValue,
}

#[derive(Clone, Queryable, Identifiable, Debug)]
#[diesel(table_name = wallets)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub chain_id: i64,
    pub address: String,
    pub sync_status: String,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_sync_error: Option<String>,
}
