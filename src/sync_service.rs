//! Wallet synchronization engine (§4.6, component C8): periodic poller,
//! atomic per-wallet claim, bounded concurrency, and cursor discipline.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration as StdDuration,
};

use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::{
    db::{wallet::WalletRepository, LedgerDb},
    error::SyncError,
    processor::{ProcessOutcome, Processor},
    provider::{with_retries, ProviderError, TransactionDataProvider},
    types::Wallet,
};

/// Scheduling and concurrency knobs (§4.6, §9 "configuration is passed to
/// ... the sync service at construction" — never read from global state).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Driver tick interval; also used as the "due for resync" threshold
    /// for wallets not already PENDING (§4.6 step 1). Default 5 minutes.
    pub tick_interval: StdDuration,
    /// Bounded semaphore width: concurrent wallets in flight. Default 3.
    pub max_concurrency: usize,
    /// How far back to look on a wallet's first sync (§4.6 step 3a).
    /// Default 90 days.
    pub initial_lookback: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_interval: StdDuration::from_secs(5 * 60),
            max_concurrency: 3,
            initial_lookback: Duration::days(90),
        }
    }
}

/// The per-tick driver (§4.6). Holds no mutable global state beyond the
/// thread pool used to bound concurrency; everything else is read from the
/// database each tick.
pub struct SyncDriver {
    db: LedgerDb,
    wallet_repo: Arc<dyn WalletRepository>,
    provider: Arc<dyn TransactionDataProvider>,
    processor: Arc<Processor>,
    config: SyncConfig,
    pool: rayon::ThreadPool,
}

impl SyncDriver {
    pub fn new(
        db: LedgerDb,
        wallet_repo: Arc<dyn WalletRepository>,
        provider: Arc<dyn TransactionDataProvider>,
        processor: Arc<Processor>,
        config: SyncConfig,
    ) -> Result<Self, SyncError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_concurrency.max(1))
            .thread_name(|i| format!("sync-worker-{i}"))
            .build()
            .map_err(|e| SyncError::Provider(format!("failed building sync thread pool: {e}")))?;
        Ok(Self {
            db,
            wallet_repo,
            provider,
            processor,
            config,
            pool,
        })
    }

    /// One driver pass (§4.6 steps 1-3): claim due wallets, then fan out
    /// bounded by `config.max_concurrency`.
    pub fn tick(&self, stop_requested: &AtomicBool) -> Result<(), SyncError> {
        if stop_requested.load(Ordering::SeqCst) {
            return Ok(());
        }

        let wallets = {
            let mut conn = self.db.get_conn()?;
            self.wallet_repo
                .get_wallets_for_sync(&mut conn, self.config.tick_interval_chrono())?
        };

        let mut claimed = Vec::with_capacity(wallets.len());
        for wallet in wallets {
            if stop_requested.load(Ordering::SeqCst) {
                break;
            }
            let mut conn = self.db.get_conn()?;
            match self.wallet_repo.claim_wallet_for_sync(&mut conn, wallet.id) {
                Ok(true) => claimed.push(wallet),
                Ok(false) => debug!(wallet_id = %wallet.id, "wallet already claimed, skipping"),
                Err(e) => warn!(wallet_id = %wallet.id, error = %e, "failed to claim wallet"),
            }
        }

        info!(count = claimed.len(), "sync tick claimed wallets");

        self.pool.install(|| {
            claimed.par_iter().for_each(|wallet| {
                if stop_requested.load(Ordering::SeqCst) {
                    return;
                }
                if let Err(e) = self.sync_wallet(wallet) {
                    error!(wallet_id = %wallet.id, error = %e, "wallet sync pass failed");
                }
            });
        });

        Ok(())
    }

    /// One wallet's full pass (§4.6 step 3): fetch since the cursor, sort
    /// oldest-first, process in order, stop on the first non-duplicate
    /// error, and advance the cursor only to the last committed tx.
    fn sync_wallet(&self, wallet: &Wallet) -> Result<(), SyncError> {
        let since = wallet
            .last_sync_at
            .unwrap_or_else(|| Utc::now() - self.config.initial_lookback);

        let provider = Arc::clone(&self.provider);
        let address = wallet.address.clone();
        let chain_id = wallet.chain_id;
        let fetch_result = with_retries(|| provider.get_transactions(&address, chain_id, since));

        let mut transactions = match fetch_result {
            Ok(txs) => txs,
            Err(e) => {
                let mut conn = self.db.get_conn()?;
                self.wallet_repo
                    .set_sync_error(&mut conn, wallet.id, &provider_error_message(&e))?;
                return Ok(());
            }
        };

        // Providers often return newest-first; oldest-first processing is
        // required for cursor safety (§4.6 step 3c).
        transactions.sort_by_key(|t| t.mined_at);

        let mut conn = self.db.get_conn()?;
        let mut last_committed: Option<DateTime<Utc>> = None;

        for decoded_tx in &transactions {
            match self
                .processor
                .process(&mut conn, self.wallet_repo.as_ref(), wallet, decoded_tx)
            {
                ProcessOutcome::Committed => last_committed = Some(decoded_tx.mined_at),
                ProcessOutcome::Skipped => {}
                ProcessOutcome::Failed(err) => {
                    warn!(
                        wallet_id = %wallet.id,
                        tx_id = %decoded_tx.id,
                        error = ?err,
                        "stopping sync pass on first non-duplicate error"
                    );
                    if let Some(at) = last_committed {
                        self.wallet_repo.set_sync_completed_at(&mut conn, wallet.id, at)?;
                    }
                    self.wallet_repo
                        .set_sync_error(&mut conn, wallet.id, &format!("{err:?}"))?;
                    return Ok(());
                }
            }
        }

        let final_cursor = last_committed.unwrap_or_else(Utc::now);
        self.wallet_repo
            .set_sync_completed_at(&mut conn, wallet.id, final_cursor)?;
        debug!(wallet_id = %wallet.id, cursor = %final_cursor, "sync pass completed");
        Ok(())
    }
}

impl SyncConfig {
    fn tick_interval_chrono(&self) -> Duration {
        Duration::from_std(self.tick_interval).unwrap_or_else(|_| Duration::seconds(300))
    }
}

fn provider_error_message(err: &ProviderError) -> String {
    err.to_string()
}

/// Owning handle for the background sync thread, modeled on the teacher's
/// `SyncThread` (`full-service/src/service/sync.rs`): a join handle plus an
/// atomic stop flag, joined on `stop`/`Drop`.
pub struct SyncThread {
    join_handle: Option<thread::JoinHandle<()>>,
    stop_requested: Arc<AtomicBool>,
}

impl SyncThread {
    pub fn start(driver: Arc<SyncDriver>) -> Self {
        let stop_requested = Arc::new(AtomicBool::new(false));
        let thread_stop_requested = Arc::clone(&stop_requested);
        let tick_interval = driver.config.tick_interval;

        let join_handle = Some(
            thread::Builder::new()
                .name("ledger-sync".to_string())
                .spawn(move || {
                    debug!("sync thread started");
                    loop {
                        if thread_stop_requested.load(Ordering::SeqCst) {
                            debug!("sync thread stop requested");
                            break;
                        }
                        if let Err(e) = driver.tick(&thread_stop_requested) {
                            error!(error = %e, "sync tick failed");
                        }
                        thread::sleep(tick_interval);
                    }
                    debug!("sync thread stopped");
                })
                .expect("failed starting ledger sync thread"),
        );

        Self {
            join_handle,
            stop_requested,
        }
    }

    pub fn stop(&mut self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        if let Some(handle) = self.join_handle.take() {
            handle.join().expect("sync thread join failed");
        }
    }
}

impl Drop for SyncThread {
    fn drop(&mut self) {
        self.stop();
    }
}
