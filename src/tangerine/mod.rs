//! Tangerine account and transaction download.
//!
//! Logs into the Tangerine website in a browser page (answering the
//! one-time passcode challenge through a [`TangerineDelegate`]) and reads
//! the JSON served by the site's internal REST endpoints.

mod delegate;
mod error;
mod steps;

pub use delegate::{BridgeFactory, HostView, TangerineDelegate};
#[cfg(feature = "browser")]
pub use delegate::ChromiumBridgeFactory;
pub use error::TangerineDownloaderError;
pub use steps::{login_steps, transaction_steps, transactions_url, URL_DATE_FORMAT};

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use secrecy::SecretString;
use serde_json::Value;

use crate::clock::{Clock, SystemClock};
use crate::scraper::{RunnerOptions, StepError, StepRunner};

/// Name of the global object defined by [`SCRIPT_SOURCE`].
pub const SCRIPT_NAMESPACE: &str = "TangerineDownload";

/// Page functions used by the login and download steps.
pub const SCRIPT_SOURCE: &str = include_str!("TangerineDownload.js");

/// Downloads accounts and transactions from Tangerine.
///
/// `authorize_and_get_accounts` opens the browser and logs in; the same
/// browser session is reused by `download_account_transactions`.
pub struct TangerineDownloader {
    factory: Arc<dyn BridgeFactory>,
    delegate: Arc<dyn TangerineDelegate>,
    clock: Arc<dyn Clock>,
    runner_options: RunnerOptions,
    runner: Option<StepRunner>,
}

impl TangerineDownloader {
    pub fn new(factory: Arc<dyn BridgeFactory>, delegate: Arc<dyn TangerineDelegate>) -> Self {
        Self {
            factory,
            delegate,
            clock: Arc::new(SystemClock),
            runner_options: RunnerOptions::default(),
            runner: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_runner_options(mut self, options: RunnerOptions) -> Self {
        self.runner_options = options;
        self
    }

    /// Log in and return the raw account records.
    ///
    /// Every call opens a new browser (asking the delegate for a host view)
    /// and replaces any earlier session.
    pub async fn authorize_and_get_accounts(
        &mut self,
        username: &str,
        password: &SecretString,
    ) -> Result<Vec<Value>> {
        let host_view = self.delegate.provide_host_view();
        let bridge = self
            .factory
            .open(host_view)
            .await
            .context("Failed to open browser")?;

        let runner = self.runner.insert(
            StepRunner::new(bridge).with_options(self.runner_options.clone()),
        );

        tracing::info!("Logging into Tangerine");
        let steps = login_steps(username, password, self.delegate.clone());
        runner.run(&steps).await.map_err(into_anyhow)?;

        let accounts: Vec<Value> = runner
            .model()
            .get_as("accounts")
            .map_err(into_anyhow)?
            .ok_or(TangerineDownloaderError::AccountsLoadingFailed)?;

        tracing::info!(accounts = accounts.len(), "Loaded accounts");
        Ok(accounts)
    }

    /// Download transactions since `date_from` for each account.
    ///
    /// `accounts` maps a caller-chosen account name to the account record
    /// returned by [`authorize_and_get_accounts`](Self::authorize_and_get_accounts).
    /// Accounts are fetched one after another in the logged-in browser. A
    /// failing account does not stop the others; the last failure is
    /// returned once all accounts were tried.
    pub async fn download_account_transactions(
        &mut self,
        accounts: &BTreeMap<String, Value>,
        date_from: NaiveDateTime,
    ) -> Result<BTreeMap<String, Vec<Value>>> {
        let runner = self
            .runner
            .as_mut()
            .ok_or(TangerineDownloaderError::NotAuthorized)?;

        let date_to = self.clock.now();
        let mut transactions = BTreeMap::new();
        let mut last_error = None;

        for (name, account) in accounts {
            let number = account
                .get("number")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let url = transactions_url(number, date_from, date_to);

            tracing::info!(account = %name, "Downloading transactions");
            let steps = transaction_steps(&url, name);

            let downloaded = match runner.run(&steps).await {
                Ok(()) => runner
                    .model()
                    .get_as::<BTreeMap<String, Vec<Value>>>("transactions"),
                Err(err) => Err(err),
            };

            match downloaded {
                Ok(downloaded) => transactions.extend(downloaded.unwrap_or_default()),
                Err(err) => {
                    tracing::warn!(account = %name, error = %err, "Transaction download failed");
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(err) => Err(into_anyhow(err)),
            None => Ok(transactions),
        }
    }
}

/// Surface Tangerine failures raised by step handlers as their own type.
fn into_anyhow(err: StepError) -> anyhow::Error {
    match err.user_error::<TangerineDownloaderError>() {
        Some(inner) => anyhow::Error::new(*inner),
        None => anyhow::Error::new(err),
    }
}
