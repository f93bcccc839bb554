//! Ledger service — `Record` orchestration, balance reconciliation,
//! idempotency and locking (§4.2, §4.3, component C4).

use std::{
    collections::{BTreeMap, HashMap},
    time::Duration,
};

use chrono::{DateTime, Utc};
use diesel::{
    prelude::*,
    result::{DatabaseErrorKind, Error as DieselError},
};
use retry::OperationResult;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    amount::{Amount, UsdValue},
    db::{
        account::{AccountModel, AccountStore},
        ledger_store::LedgerStore,
        schema::{accounts, transactions},
        Conn, LedgerDb,
    },
    error::{LedgerError, ReconcileResult},
    handler_registry::{GeneratedEntry, HandlerRegistry, Payload},
    types::{AccountType, EntrySide, Transaction},
};

/// Bounded retry count for persistence-transient failures (serialization
/// failure, deadlock) per §7 "Persistence transient ... Retry the whole
/// `Record` call (bounded, e.g., 3 attempts)". Expressed to `retry::retry`
/// as two delays between the three attempts.
const RECORD_RETRY_DELAYS_MS: [u64; 2] = [10, 10];

/// Optional filter for [`LedgerService::list_transactions`] (§6
/// `ListTransactions`).
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub wallet_id: Option<Uuid>,
    pub tx_type: Option<String>,
    pub asset_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: i64,
    pub page_size: i64,
}

pub struct LedgerService {
    db: LedgerDb,
    registry: HandlerRegistry,
}

impl LedgerService {
    pub fn new(db: LedgerDb, registry: HandlerRegistry) -> Self {
        Self { db, registry }
    }

    /// `Record(type, source, externalID?, occurredAt, payload)` (§4.2).
    ///
    /// Retries the whole call up to [`RECORD_RETRY_DELAYS_MS`]`.len() + 1`
    /// times on a persistence-transient failure (serialization failure /
    /// deadlock), via the `retry` crate; every other error is returned
    /// immediately without retry, matching the error taxonomy in §7.
    pub fn record(
        &self,
        tx_type: &str,
        source: &str,
        external_id: Option<&str>,
        occurred_at: DateTime<Utc>,
        payload: Payload,
    ) -> Result<Transaction, LedgerError> {
        let delays = RECORD_RETRY_DELAYS_MS.map(Duration::from_millis);
        retry::retry(delays, || {
            match self.record_once(tx_type, source, external_id, occurred_at, &payload) {
                Ok(tx) => OperationResult::Ok(tx),
                Err(LedgerError::Diesel(DieselError::DatabaseError(
                    DatabaseErrorKind::SerializationFailure,
                    info,
                ))) => {
                    warn!(tx_type, "serialization failure, retrying record");
                    OperationResult::Retry(LedgerError::Diesel(DieselError::DatabaseError(
                        DatabaseErrorKind::SerializationFailure,
                        info,
                    )))
                }
                Err(other) => OperationResult::Err(other),
            }
        })
        .map_err(|e| e.error)
    }

    fn record_once(
        &self,
        tx_type: &str,
        source: &str,
        external_id: Option<&str>,
        occurred_at: DateTime<Utc>,
        payload: &Payload,
    ) -> Result<Transaction, LedgerError> {
        // Step 1: resolve handler; validate; generate entries.
        let handler = self
            .registry
            .get(tx_type)
            .ok_or_else(|| LedgerError::UnknownType(tx_type.to_string()))?;

        handler
            .validate(payload)
            .map_err(LedgerError::ValidationFailed)?;

        let generated = handler
            .generate_entries(payload)
            .map_err(LedgerError::ValidationFailed)?;

        // Step 2: arithmetic pre-check — occurred_at, and per-asset balance.
        if occurred_at > Utc::now() {
            return Err(LedgerError::OccurredAtInFuture);
        }
        check_balanced(&generated)?;

        let mut conn = self.db.get_conn()?;

        // Step 3: open a persistence transaction with SERIALIZABLE-equivalent
        // semantics. Postgres's default isolation plus the explicit row
        // locks taken below (step 5) give us the equivalent guarantee (§5).
        conn.build_transaction()
            .serializable()
            .run(|conn| self.commit_generated(conn, tx_type, source, external_id, occurred_at, &generated))
    }

    fn commit_generated(
        &self,
        conn: &mut Conn,
        tx_type: &str,
        source: &str,
        external_id: Option<&str>,
        occurred_at: DateTime<Utc>,
        generated: &[GeneratedEntry],
    ) -> Result<Transaction, LedgerError> {
        // Step 4: resolve or create every distinct account referenced.
        let mut account_ids: HashMap<String, Uuid> = HashMap::new();
        for ge in generated {
            if account_ids.contains_key(&ge.account_code) {
                continue;
            }
            let account = AccountStore::resolve_or_create(
                &ge.account_code,
                ge.account_type,
                &ge.asset_id,
                ge.wallet_id,
                ge.chain_id,
                conn,
            )?;
            account_ids.insert(ge.account_code.clone(), account.id);
        }

        // Step 5: lock balance rows for every (account, asset) touched, in
        // ascending lexicographic order (§4.2 step 5, §5).
        let mut keys: Vec<(Uuid, String)> = generated
            .iter()
            .map(|ge| (account_ids[&ge.account_code], ge.asset_id.clone()))
            .collect();
        keys.sort();
        keys.dedup();
        AccountStore::lock_balances(&keys, conn)?;

        // Step 6: compute signed deltas per (account, asset) as separate
        // increase/decrease totals (never subtracting unsigned amounts
        // mid-accumulation), then re-read the now-locked balance rows and
        // reject if any CRYPTO_WALLET balance would go negative.
        let mut increases: BTreeMap<(Uuid, String), Amount> = BTreeMap::new();
        let mut decreases: BTreeMap<(Uuid, String), Amount> = BTreeMap::new();
        for ge in generated {
            let account_id = account_ids[&ge.account_code];
            let key = (account_id, ge.asset_id.clone());
            let debit_increases_here = ge.account_type.debit_increases();
            let is_increase = (ge.side == EntrySide::Debit) == debit_increases_here;
            let bucket = if is_increase { &mut increases } else { &mut decreases };
            let total = bucket.entry(key).or_insert_with(Amount::zero);
            *total = total.clone() + ge.amount.clone();
        }

        let mut keys_seen: Vec<(Uuid, String)> = increases.keys().chain(decreases.keys()).cloned().collect();
        keys_seen.sort();
        keys_seen.dedup();

        let mut new_balances: HashMap<(Uuid, String), Amount> = HashMap::new();
        for key in keys_seen {
            let (account_id, asset_id) = key.clone();
            let current = LedgerStore::read_balance(conn, account_id, &asset_id)?;
            let up = increases.get(&key).cloned().unwrap_or_else(Amount::zero);
            let down = decreases.get(&key).cloned().unwrap_or_else(Amount::zero);
            let increased = current.clone() + up;
            let next = match increased.checked_sub(&down) {
                Some(v) => v,
                None => {
                    return Err(LedgerError::NegativeBalanceForbidden {
                        account: account_id,
                        asset: asset_id.clone(),
                        attempted_delta: format!("-{down}"),
                    })
                }
            };
            new_balances.insert(key, next);
        }

        // Step 7: insert the transaction row. A unique violation on
        // (source, external_id) is translated to DuplicateExternalID by
        // LedgerStore and short-circuits here with nothing else committed.
        let raw_data = serde_json::to_value(
            generated
                .iter()
                .map(|ge| {
                    serde_json::json!({
                        "account_code": ge.account_code,
                        "side": ge.side.to_string(),
                        "entry_type": ge.entry_type,
                        "amount": ge.amount.to_string(),
                        "asset_id": ge.asset_id,
                    })
                })
                .collect::<Vec<_>>(),
        )
        .unwrap_or(serde_json::Value::Null);

        let tx_id = Uuid::new_v4();
        let transaction = LedgerStore::insert_transaction(
            conn,
            tx_id,
            tx_type,
            source,
            external_id,
            occurred_at,
            raw_data,
        )?;

        // Step 8: insert all entries.
        let new_entries: Vec<crate::db::models::NewEntry<'_>> = generated
            .iter()
            .map(|ge| crate::db::models::NewEntry {
                id: Uuid::new_v4(),
                transaction_id: transaction.id,
                account_id: account_ids[&ge.account_code],
                side: LedgerStore::entry_side_str(ge.side),
                entry_type: &ge.entry_type,
                amount: ge.amount.clone(),
                asset_id: &ge.asset_id,
                usd_rate: ge.usd_rate.clone(),
                usd_value: ge.usd_value.clone(),
                occurred_at,
                metadata: ge.metadata.clone(),
            })
            .collect();
        LedgerStore::insert_entries(conn, &new_entries)?;

        // Step 9: update balance rows.
        for ((account_id, asset_id), balance) in &new_balances {
            let usd_value = generated
                .iter()
                .find(|ge| account_ids[&ge.account_code] == *account_id && ge.asset_id == *asset_id)
                .map(|ge| ge.usd_value.clone())
                .unwrap_or_else(UsdValue::zero);
            LedgerStore::upsert_balance(conn, *account_id, asset_id, balance.clone(), usd_value)?;
        }

        debug!(tx_type, source, tx_id = %transaction.id, "recorded ledger transaction");

        // Step 10: commit happens implicitly when the closure returns Ok.
        Ok(transaction)
    }

    /// `GetBalance(ctx, accountID, assetID) → Balance | NotFound` (§6).
    pub fn get_balance(&self, account_id: Uuid, asset_id: &str) -> Result<Amount, LedgerError> {
        let mut conn = self.db.get_conn()?;
        LedgerStore::read_balance(&mut conn, account_id, asset_id)
    }

    /// `ListTransactions` (§6). Returns `(items, total)`.
    pub fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<(Vec<Transaction>, i64), LedgerError> {
        use crate::db::models;

        let mut conn = self.db.get_conn()?;

        let mut query = transactions::table.into_boxed();
        let mut count_query = transactions::table.into_boxed();

        if let Some(wallet_id) = filter.wallet_id {
            let account_ids: Vec<Uuid> = accounts::table
                .filter(accounts::wallet_id.eq(wallet_id))
                .select(accounts::id)
                .load(&mut conn)?;
            let tx_ids: Vec<Uuid> = crate::db::schema::entries::table
                .filter(crate::db::schema::entries::account_id.eq_any(account_ids))
                .select(crate::db::schema::entries::transaction_id)
                .distinct()
                .load(&mut conn)?;
            query = query.filter(transactions::id.eq_any(tx_ids.clone()));
            count_query = count_query.filter(transactions::id.eq_any(tx_ids));
        }
        if let Some(ref tx_type) = filter.tx_type {
            query = query.filter(transactions::tx_type.eq(tx_type.clone()));
            count_query = count_query.filter(transactions::tx_type.eq(tx_type.clone()));
        }
        if let Some(from) = filter.from {
            query = query.filter(transactions::occurred_at.ge(from));
            count_query = count_query.filter(transactions::occurred_at.ge(from));
        }
        if let Some(to) = filter.to {
            query = query.filter(transactions::occurred_at.le(to));
            count_query = count_query.filter(transactions::occurred_at.le(to));
        }

        let total: i64 = count_query.count().get_result(&mut conn)?;

        let page = filter.page.max(0);
        let page_size = filter.page_size.max(1);
        let rows: Vec<models::Transaction> = query
            .order(transactions::occurred_at.desc())
            .limit(page_size)
            .offset(page * page_size)
            .load(&mut conn)?;

        let items = rows.into_iter().map(to_domain_transaction).collect();
        Ok((items, total))
    }

    /// `ReconcileBalance(ctx, accountID, assetID) → ok | Mismatch` (§4.3,
    /// §6, §8 property 2). Read-only; never mutates stored balances.
    pub fn reconcile_balance(
        &self,
        account_id: Uuid,
        asset_id: &str,
    ) -> Result<ReconcileResult, LedgerError> {
        use crate::db::models;

        let mut conn = self.db.get_conn()?;

        let account: models::Account = accounts::table
            .find(account_id)
            .first(&mut conn)
            .map_err(|_| LedgerError::AccountResolutionFailed(account_id.to_string()))?;
        let account_type = match account.account_type.as_str() {
            models::ACCOUNT_CRYPTO_WALLET => AccountType::CryptoWallet,
            models::ACCOUNT_INCOME => AccountType::Income,
            models::ACCOUNT_EXPENSE => AccountType::Expense,
            _ => AccountType::GasFee,
        };

        let stored = LedgerStore::read_balance(&mut conn, account_id, asset_id)?;
        let computed = LedgerStore::recompute_from_entries(
            &mut conn,
            account_id,
            asset_id,
            account_type.debit_increases(),
        )?;

        if stored == computed {
            Ok(ReconcileResult::Ok)
        } else {
            Ok(ReconcileResult::Mismatch { stored, computed })
        }
    }
}

/// Per-asset Σdebits = Σcredits arithmetic pre-check (§4.2 step 2, §8
/// property 1).
fn check_balanced(generated: &[GeneratedEntry]) -> Result<(), LedgerError> {
    let mut debits: HashMap<&str, Amount> = HashMap::new();
    let mut credits: HashMap<&str, Amount> = HashMap::new();

    for ge in generated {
        let bucket = match ge.side {
            EntrySide::Debit => &mut debits,
            EntrySide::Credit => &mut credits,
        };
        let total = bucket.entry(ge.asset_id.as_str()).or_insert_with(Amount::zero);
        *total = total.clone() + ge.amount.clone();
    }

    let mut assets: Vec<&str> = debits.keys().chain(credits.keys()).copied().collect();
    assets.sort();
    assets.dedup();

    for asset in assets {
        let d = debits.get(asset).cloned().unwrap_or_else(Amount::zero);
        let c = credits.get(asset).cloned().unwrap_or_else(Amount::zero);
        if d != c {
            return Err(LedgerError::UnbalancedEntries {
                asset: asset.to_string(),
                debits: d,
                credits: c,
            });
        }
    }
    Ok(())
}

fn to_domain_transaction(row: crate::db::models::Transaction) -> Transaction {
    Transaction {
        id: row.id,
        tx_type: row.tx_type,
        source: row.source,
        external_id: row.external_id,
        status: if row.status == crate::db::models::TX_COMPLETED {
            crate::types::TransactionStatus::Completed
        } else {
            crate::types::TransactionStatus::Failed
        },
        occurred_at: row.occurred_at,
        recorded_at: row.recorded_at,
        raw_data: row.raw_data,
        error_message: row.error_message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::UsdRate;

    fn entry(
        code: &str,
        account_type: AccountType,
        side: EntrySide,
        amount: u64,
    ) -> GeneratedEntry {
        GeneratedEntry::new(
            code,
            account_type,
            side,
            "test",
            Amount::from(amount),
            "BTC",
            UsdRate::zero(),
            UsdValue::zero(),
        )
    }

    #[test]
    fn balanced_entries_pass_precheck() {
        let generated = vec![
            entry("wallet.a.BTC", AccountType::CryptoWallet, EntrySide::Debit, 100),
            entry("income.BTC", AccountType::Income, EntrySide::Credit, 100),
        ];
        assert!(check_balanced(&generated).is_ok());
    }

    #[test]
    fn unbalanced_entries_are_rejected() {
        let generated = vec![
            entry("wallet.a.BTC", AccountType::CryptoWallet, EntrySide::Debit, 100),
            entry("income.BTC", AccountType::Income, EntrySide::Credit, 50),
        ];
        let err = check_balanced(&generated).unwrap_err();
        assert!(matches!(err, LedgerError::UnbalancedEntries { .. }));
    }
}
