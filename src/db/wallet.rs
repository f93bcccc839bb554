//! DB-backed implementation of the wallet repository consumed by the sync
//! service and processor (§6 "Wallet repository (consumed)").

use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use super::{models, schema::wallets, wallet_db::Conn};
use crate::types::{SyncStatus, Wallet};

pub trait WalletRepository: Send + Sync {
    fn get_wallets_for_sync(
        &self,
        conn: &mut Conn,
        poll_interval: Duration,
    ) -> Result<Vec<Wallet>, diesel::result::Error>;

    fn get_wallets_by_address_and_user_id(
        &self,
        conn: &mut Conn,
        address: &str,
        user_id: Uuid,
    ) -> Result<Vec<Wallet>, diesel::result::Error>;

    /// Atomic compare-and-set of `sync_status` from `PENDING`/`SYNCED`/`ERROR`
    /// to `SYNCING` (§4.6 step 2). Returns `false` if another worker already
    /// claimed the wallet. `ERROR` is reclaimable so a wallet that stopped on
    /// a per-tx error is retried on its next due tick rather than stuck
    /// forever (§4.6 "each affected wallet is isolated", not abandoned).
    fn claim_wallet_for_sync(
        &self,
        conn: &mut Conn,
        wallet_id: Uuid,
    ) -> Result<bool, diesel::result::Error>;

    fn set_sync_completed_at(
        &self,
        conn: &mut Conn,
        wallet_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), diesel::result::Error>;

    fn set_sync_error(
        &self,
        conn: &mut Conn,
        wallet_id: Uuid,
        msg: &str,
    ) -> Result<(), diesel::result::Error>;
}

pub struct PgWalletRepository;

impl WalletRepository for PgWalletRepository {
    fn get_wallets_for_sync(
        &self,
        conn: &mut Conn,
        poll_interval: Duration,
    ) -> Result<Vec<Wallet>, diesel::result::Error> {
        let cutoff = Utc::now() - poll_interval;
        let rows = wallets::table
            .filter(
                wallets::sync_status
                    .eq(models::SYNC_PENDING)
                    .or(wallets::last_sync_at.lt(cutoff))
                    .or(wallets::last_sync_at.is_null()),
            )
            .filter(wallets::sync_status.ne(models::SYNC_SYNCING))
            .load::<models::Wallet>(conn)?;
        Ok(rows.into_iter().map(to_domain).collect())
    }

    fn get_wallets_by_address_and_user_id(
        &self,
        conn: &mut Conn,
        address: &str,
        user_id: Uuid,
    ) -> Result<Vec<Wallet>, diesel::result::Error> {
        let lowered = address.to_lowercase();
        let rows = wallets::table
            .filter(wallets::address.eq(lowered))
            .filter(wallets::user_id.eq(user_id))
            .load::<models::Wallet>(conn)?;
        Ok(rows.into_iter().map(to_domain).collect())
    }

    fn claim_wallet_for_sync(
        &self,
        conn: &mut Conn,
        wallet_id: Uuid,
    ) -> Result<bool, diesel::result::Error> {
        let affected = diesel::update(
            wallets::table.filter(wallets::id.eq(wallet_id)).filter(
                wallets::sync_status
                    .eq(models::SYNC_PENDING)
                    .or(wallets::sync_status.eq(models::SYNC_SYNCED))
                    .or(wallets::sync_status.eq(models::SYNC_ERROR)),
            ),
        )
        .set(wallets::sync_status.eq(models::SYNC_SYNCING))
        .execute(conn)?;
        Ok(affected == 1)
    }

    fn set_sync_completed_at(
        &self,
        conn: &mut Conn,
        wallet_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), diesel::result::Error> {
        diesel::update(wallets::table.filter(wallets::id.eq(wallet_id)))
            .set((
                wallets::sync_status.eq(models::SYNC_SYNCED),
                wallets::last_sync_at.eq(at),
                wallets::last_sync_error.eq(Option::<String>::None),
            ))
            .execute(conn)?;
        Ok(())
    }

    fn set_sync_error(
        &self,
        conn: &mut Conn,
        wallet_id: Uuid,
        msg: &str,
    ) -> Result<(), diesel::result::Error> {
        diesel::update(wallets::table.filter(wallets::id.eq(wallet_id)))
            .set((
                wallets::sync_status.eq(models::SYNC_ERROR),
                wallets::last_sync_error.eq(msg),
            ))
            .execute(conn)?;
        Ok(())
    }
}

fn to_domain(row: models::Wallet) -> Wallet {
    Wallet {
        id: row.id,
        user_id: row.user_id,
        chain_id: row.chain_id,
        address: row.address,
        sync_status: match row.sync_status.as_str() {
            models::SYNC_PENDING => SyncStatus::Pending,
            models::SYNC_SYNCING => SyncStatus::Syncing,
            models::SYNC_SYNCED => SyncStatus::Synced,
            _ => SyncStatus::Error,
        },
        last_sync_at: row.last_sync_at,
        last_sync_error: row.last_sync_error,
    }
}
