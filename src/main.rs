//! TEA Disburser - batch native-token payments from funding wallets
//!
//! Sends a random amount from every funding wallet to every recipient
//! address, one transfer at a time, escalating the gas price on contention
//! and waiting for each receipt before moving on.

use anyhow::{Context, Result};
use ethers::utils::format_ether;
use std::sync::Arc;
use tracing::{error, info};

mod chain;
mod config;
mod disburse;
mod error;
mod logging;
mod metrics;
mod tx;

use chain::{EthersLedger, Ledger};
use config::{LoggingConfig, Settings};
use disburse::{load_accounts, load_string_list, DisbursementDriver, RunSummary};
use metrics::MetricsServer;
use tx::{ConfirmationPoller, FeePolicy, TransactionSender};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration; a broken config still gets logged with default sinks
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            let _guards = logging::init_logging(&LoggingConfig::default())?;
            error!("Configuration error: {:#}", e);
            return Err(e);
        }
    };

    // Initialize logging
    let guards = logging::init_logging(&settings.logging)?;

    info!("Starting TEA Disburser v{}", env!("CARGO_PKG_VERSION"));

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    let result = execute(&settings).await;
    match &result {
        Ok(summary) => info!(
            "Run {} finished: {} sent, {} failed, {} skipped",
            summary.run_id,
            summary.sent,
            summary.failed,
            summary.skipped()
        ),
        Err(e) => error!("Global error: {:#}", e),
    }

    if let Some(handle) = metrics_handle {
        handle.abort();
    }

    // Flush both log files before exiting
    drop(guards);
    result.map(|_| ())
}

/// Load inputs, connect, and run every transfer
async fn execute(settings: &Settings) -> Result<RunSummary> {
    let accounts = load_accounts(&settings.inputs.wallets_path)
        .context("Failed to load funding wallets")?;
    let destinations = load_string_list(&settings.inputs.addresses_path)
        .context("Failed to load recipient addresses")?;
    info!(
        "Loaded {} wallets and {} addresses",
        accounts.len(),
        destinations.len()
    );

    let ledger: Arc<dyn Ledger> = Arc::new(
        EthersLedger::connect(&settings.network)
            .await
            .context("Failed to connect to RPC endpoint")?,
    );

    let fee_policy = FeePolicy::new(settings.submission.default_gas_price()?);
    let poller = ConfirmationPoller::new(
        ledger.clone(),
        settings.confirmation.retries,
        settings.confirmation_delay(),
    );
    let sender = TransactionSender::new(ledger.clone(), fee_policy, poller, &settings.submission);
    let amounts = settings.amount_range()?;
    info!(
        "Sending between {} and {} {} per transfer",
        format_ether(amounts.min_wei()),
        format_ether(amounts.max_wei()),
        settings.disbursement.token_symbol
    );
    let driver = DisbursementDriver::new(ledger, sender, amounts, &settings.disbursement);

    Ok(driver.run(&accounts, &destinations).await)
}
