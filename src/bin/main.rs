//! Process entry point for the `ledger-sync` daemon: parses configuration,
//! opens the database, wires the handler registry, and runs the wallet sync
//! driver on its own thread until signaled to stop.

use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ledger_core::{
    config::Config,
    db::{wallet::PgWalletRepository, LedgerDb},
    handler_registry::HandlerRegistryBuilder,
    handlers,
    ledger_service::LedgerService,
    price_oracle::NullPriceOracle,
    processor::Processor,
    sync_service::{SyncConfig, SyncDriver, SyncThread},
};

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = Config::parse();
    init_tracing(&config);

    info!(commit = env!("VERGEN_GIT_SHA"), "starting ledger-sync");

    let db = LedgerDb::new_from_url(&config.database_url, config.database_max_connections)?;
    db.run_migrations()?;

    let mut registry_builder = HandlerRegistryBuilder::new();
    handlers::register_defaults(&mut registry_builder)?;
    let registry = registry_builder.build();

    let ledger = Arc::new(LedgerService::new(db.clone(), registry));
    let processor = Arc::new(Processor::new(ledger, Arc::new(NullPriceOracle)));

    // No production transaction data provider ships with the ledger core
    // itself (§9 "the transaction data provider is consumed, not owned");
    // operators wire a concrete implementation before deploying this binary.
    let provider: Arc<dyn ledger_core::provider::TransactionDataProvider> =
        Arc::new(UnconfiguredProvider);

    let sync_config = SyncConfig {
        tick_interval: config.sync_tick_interval,
        max_concurrency: config.sync_max_concurrency,
        initial_lookback: config.sync_initial_lookback,
    };

    let driver = Arc::new(SyncDriver::new(
        db,
        Arc::new(PgWalletRepository),
        provider,
        processor,
        sync_config,
    )?);

    let _sync_thread = SyncThread::start(driver);

    // No custom signal handling: SIGINT/SIGTERM take their default action
    // (immediate termination) and `_sync_thread`'s `Drop` is a best-effort
    // cleanup for the ordinary "return from main" path.
    loop {
        std::thread::sleep(std::time::Duration::from_secs(3600));
    }
}

struct UnconfiguredProvider;

impl ledger_core::provider::TransactionDataProvider for UnconfiguredProvider {
    fn get_transactions(
        &self,
        _address: &str,
        _chain_id: i64,
        _since: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<ledger_core::types::DecodedTransaction>, ledger_core::provider::ProviderError> {
        Err(ledger_core::provider::ProviderError::NonTransient(
            "no transaction data provider configured".to_string(),
        ))
    }
}
