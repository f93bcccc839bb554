//! Append-only persistence for transactions and entries, plus denormalized
//! balance maintenance (§4.2 steps 7-9, §5, §6 persisted state layout).
//!
//! This module never decides *what* to write — that is the
//! [`crate::ledger_service::LedgerService`]'s job — it only knows how to
//! write it atomically and how to detect the unique-constraint races
//! described in §5.

use chrono::{DateTime, Utc};
use diesel::{prelude::*, result::DatabaseErrorKind, result::Error as DieselError};
use uuid::Uuid;

use super::{
    models::{self, NewAccountBalance, NewEntry, NewTransaction},
    schema::{account_balances, entries, transactions},
    wallet_db::Conn,
};
use crate::{
    amount::Amount,
    error::LedgerError,
    types::{EntrySide, Transaction as DomainTransaction, TransactionStatus},
};

pub struct LedgerStore;

impl LedgerStore {
    /// Inserts the transaction row. A unique-constraint violation on
    /// `(source, external_id)` is translated to `DuplicateExternalID`
    /// (§4.2 step 7, §5).
    pub fn insert_transaction(
        conn: &mut Conn,
        id: Uuid,
        tx_type: &str,
        source: &str,
        external_id: Option<&str>,
        occurred_at: DateTime<Utc>,
        raw_data: serde_json::Value,
    ) -> Result<DomainTransaction, LedgerError> {
        let new_tx = NewTransaction {
            id,
            tx_type,
            source,
            external_id,
            status: models::TX_COMPLETED,
            occurred_at,
            raw_data,
            error_message: None,
        };

        let row = diesel::insert_into(transactions::table)
            .values(&new_tx)
            .get_result::<models::Transaction>(conn)
            .map_err(|e| match e {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                    LedgerError::DuplicateExternalID
                }
                other => LedgerError::from(other),
            })?;

        Ok(to_domain_transaction(row))
    }

    pub fn insert_entries(
        conn: &mut Conn,
        new_entries: &[NewEntry<'_>],
    ) -> Result<(), LedgerError> {
        diesel::insert_into(entries::table)
            .values(new_entries)
            .execute(conn)?;
        Ok(())
    }

    /// Reads the current balance for `(account_id, asset_id)`, treating a
    /// missing row as zero (the row is created lazily on first mutation).
    pub fn read_balance(
        conn: &mut Conn,
        account_id: Uuid,
        asset_id: &str,
    ) -> Result<Amount, LedgerError> {
        let row = account_balances::table
            .filter(account_balances::account_id.eq(account_id))
            .filter(account_balances::asset_id.eq(asset_id))
            .first::<models::AccountBalance>(conn)
            .optional()?;
        Ok(row.map(|r| r.balance).unwrap_or_else(Amount::zero))
    }

    /// Applies `new_balance` to `(account_id, asset_id)`, upserting the row
    /// (§4.2 step 9). Must be called only while the row is locked by
    /// [`crate::db::account::AccountModel::lock_balances`].
    pub fn upsert_balance(
        conn: &mut Conn,
        account_id: Uuid,
        asset_id: &str,
        new_balance: Amount,
        new_usd_value: crate::amount::UsdValue,
    ) -> Result<(), LedgerError> {
        let row = NewAccountBalance {
            account_id,
            asset_id,
            balance: new_balance,
            usd_value: new_usd_value,
        };

        diesel::insert_into(account_balances::table)
            .values(&row)
            .on_conflict((account_balances::account_id, account_balances::asset_id))
            .do_update()
            .set((
                account_balances::balance.eq(&row.balance),
                account_balances::usd_value.eq(&row.usd_value),
                account_balances::last_updated.eq(diesel::dsl::now),
            ))
            .execute(conn)?;
        Ok(())
    }

    /// Recomputes the balance for `(account_id, asset_id)` directly from the
    /// entries ledger, honoring each account type's debit/credit convention
    /// (§4.3, §8 property 2). Used by [`Self::reconcile`] and the periodic
    /// consistency job.
    pub fn recompute_from_entries(
        conn: &mut Conn,
        account_id: Uuid,
        asset_id: &str,
        debit_increases: bool,
    ) -> Result<Amount, LedgerError> {
        let rows: Vec<(String, Amount)> = entries::table
            .inner_join(transactions::table)
            .filter(entries::account_id.eq(account_id))
            .filter(entries::asset_id.eq(asset_id))
            .filter(transactions::status.eq(models::TX_COMPLETED))
            .select((entries::side, entries::amount))
            .load(conn)?;

        let mut total = Amount::zero();
        let mut negative = false;
        for (side, amount) in rows {
            let is_debit = side == models::SIDE_DEBIT;
            let increases = is_debit == debit_increases;
            if increases {
                total = total + amount;
            } else {
                match total.checked_sub(&amount) {
                    Some(next) => total = next,
                    None => {
                        negative = true;
                        break;
                    }
                }
            }
        }

        if negative {
            return Err(LedgerError::Internal(format!(
                "reconciliation underflow for account {account_id} asset {asset_id}"
            )));
        }

        Ok(total)
    }

    pub fn entry_side_str(side: EntrySide) -> &'static str {
        match side {
            EntrySide::Debit => models::SIDE_DEBIT,
            EntrySide::Credit => models::SIDE_CREDIT,
        }
    }
}

fn to_domain_transaction(row: models::Transaction) -> DomainTransaction {
    DomainTransaction {
        id: row.id,
        tx_type: row.tx_type,
        source: row.source,
        external_id: row.external_id,
        status: if row.status == models::TX_COMPLETED {
            TransactionStatus::Completed
        } else {
            TransactionStatus::Failed
        },
        occurred_at: row.occurred_at,
        recorded_at: row.recorded_at,
        raw_data: row.raw_data,
        error_message: row.error_message,
    }
}
