//! DB impl for the Account model (§3, §4.2 step 4).

use diesel::prelude::*;
use uuid::Uuid;

use super::{
    models::{self, NewAccount},
    schema::accounts,
    wallet_db::Conn,
};
use crate::{
    error::LedgerError,
    types::{Account, AccountType},
};

/// Derives the unique, deterministic account code for a given type (§3):
/// `wallet.{walletID}.{assetID}` for wallet accounts, `income.{assetID}` /
/// `expense.{assetID}` for nominal accounts, or a caller-supplied nominal
/// code (e.g. `swap_clearing.{asset}`, `defi.{protocol}.{asset}`).
pub fn wallet_account_code(wallet_id: Uuid, asset_id: &str) -> String {
    format!("wallet.{wallet_id}.{asset_id}")
}

pub fn nominal_account_code(prefix: &str, asset_id: &str) -> String {
    format!("{prefix}.{asset_id}")
}

pub trait AccountModel {
    /// Resolves the account for `code`, creating it lazily on first
    /// reference (§3 "Accounts are created lazily on first reference").
    /// Creation races are resolved by the unique constraint on `code`: on
    /// conflict the loser re-selects (§4.2 step 4, §5).
    fn resolve_or_create(
        code: &str,
        account_type: AccountType,
        asset_id: &str,
        wallet_id: Option<Uuid>,
        chain_id: Option<i64>,
        conn: &mut Conn,
    ) -> Result<Account, LedgerError>;

    /// Locks the balance row(s) for the given accounts/assets in ascending
    /// `(account_id, asset_id)` order (§4.2 step 5, §5 locking discipline).
    fn lock_balances(
        keys: &[(Uuid, String)],
        conn: &mut Conn,
    ) -> Result<(), LedgerError>;
}

pub struct AccountStore;

impl AccountModel for AccountStore {
    fn resolve_or_create(
        code: &str,
        account_type: AccountType,
        asset_id: &str,
        wallet_id: Option<Uuid>,
        chain_id: Option<i64>,
        conn: &mut Conn,
    ) -> Result<Account, LedgerError> {
        if let Some(existing) = accounts::table
            .filter(accounts::code.eq(code))
            .first::<models::Account>(conn)
            .optional()?
        {
            return Ok(to_domain(existing));
        }

        let new_account = NewAccount {
            id: Uuid::new_v4(),
            code,
            account_type: account_type_str(account_type),
            asset_id,
            wallet_id,
            chain_id,
        };

        let inserted = diesel::insert_into(accounts::table)
            .values(&new_account)
            .on_conflict(accounts::code)
            .do_nothing()
            .get_result::<models::Account>(conn)
            .optional()?;

        match inserted {
            Some(row) => Ok(to_domain(row)),
            // Lost the creation race; the winner's row is now visible.
            None => {
                let row = accounts::table
                    .filter(accounts::code.eq(code))
                    .first::<models::Account>(conn)
                    .map_err(|_| LedgerError::AccountResolutionFailed(code.to_string()))?;
                Ok(to_domain(row))
            }
        }
    }

    fn lock_balances(keys: &[(Uuid, String)], conn: &mut Conn) -> Result<(), LedgerError> {
        let mut sorted: Vec<&(Uuid, String)> = keys.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        for (acct, asset) in sorted {
            diesel::sql_query(
                "SELECT balance FROM account_balances WHERE account_id = $1 AND asset_id = $2 FOR UPDATE",
            )
            .bind::<diesel::sql_types::Uuid, _>(*acct)
            .bind::<diesel::sql_types::Text, _>(asset.as_str())
            .execute(conn)?;
        }
        Ok(())
    }
}

fn account_type_str(t: AccountType) -> &'static str {
    match t {
        AccountType::CryptoWallet => models::ACCOUNT_CRYPTO_WALLET,
        AccountType::Income => models::ACCOUNT_INCOME,
        AccountType::Expense => models::ACCOUNT_EXPENSE,
        AccountType::GasFee => models::ACCOUNT_GAS_FEE,
    }
}

fn to_domain(row: models::Account) -> Account {
    let account_type = match row.account_type.as_str() {
        models::ACCOUNT_CRYPTO_WALLET => AccountType::CryptoWallet,
        models::ACCOUNT_INCOME => AccountType::Income,
        models::ACCOUNT_EXPENSE => AccountType::Expense,
        _ => AccountType::GasFee,
    };
    Account {
        id: row.id,
        code: row.code,
        account_type,
        asset_id: row.asset_id,
        wallet_id: row.wallet_id,
        chain_id: row.chain_id,
    }
}
