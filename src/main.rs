use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDate};
use clap::{Parser, Subcommand};
use dialoguer::console::Term;
use dialoguer::{Input, Password};
use secrecy::SecretString;
use serde_json::Value;
use tangerine_downloader::config::{default_config_path, ResolvedConfig};
use tangerine_downloader::duration::format_duration;
use tangerine_downloader::tangerine::{
    ChromiumBridgeFactory, HostView, TangerineDelegate, TangerineDownloader,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "tangerine-downloader")]
#[command(about = "Download Tangerine accounts and transactions")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Login ID (overrides the config file)
    #[arg(short, long)]
    username: Option<String>,

    /// Show the browser window instead of running hidden
    #[arg(long)]
    show_browser: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and print the account list
    Accounts,
    /// Log in and print transactions for every account
    Transactions {
        /// First day to download (defaults to `history_days` ago)
        #[arg(long)]
        since: Option<NaiveDate>,
    },
    /// Show current configuration
    Config,
}

/// Prompts on the terminal for the one-time passcode.
struct TerminalDelegate {
    host_view: Option<HostView>,
}

impl TangerineDelegate for TerminalDelegate {
    fn get_one_time_code(&self) -> String {
        Input::<String>::new()
            .with_prompt("Security code")
            .interact_text_on(&Term::stderr())
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "Failed to read security code");
                String::new()
            })
    }

    fn provide_host_view(&self) -> Option<HostView> {
        self.host_view
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,chromiumoxide=warn,chromiumoxide::conn=off,chromiumoxide::handler=off")
    });
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .init();
    } else {
        tracing_subscriber::registry().with(filter).with(layer).init();
    }
}

/// Name an account the way the Tangerine web app labels it.
fn account_name(account: &Value) -> String {
    ["display_name", "nickname", "description", "number"]
        .iter()
        .find_map(|key| {
            account
                .get(*key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        })
        .unwrap_or("unnamed")
        .to_string()
}

/// Key accounts by name, disambiguating accounts that share one with their
/// number, then with a counter, so every account keeps its own entry.
fn accounts_by_name(accounts: Vec<Value>) -> BTreeMap<String, Value> {
    let mut by_name = BTreeMap::new();
    for account in accounts {
        let base = account_name(&account);
        let mut name = base.clone();
        if by_name.contains_key(&name) {
            if let Some(number) = account
                .get("number")
                .and_then(Value::as_str)
                .filter(|n| !n.is_empty())
            {
                name = format!("{base} ({number})");
            }
        }
        let mut suffix = 2;
        while by_name.contains_key(&name) {
            name = format!("{base} ({suffix})");
            suffix += 1;
        }
        if name != base {
            tracing::debug!(account = %base, renamed = %name, "Account name already used");
        }
        by_name.insert(name, account);
    }
    by_name
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = ResolvedConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config: {}", config_path.display()))?;

    if let Command::Config = cli.command {
        println!("Config file: {}", config_path.display());
        println!("Config directory: {}", config.config_dir.display());
        match &config.browser.profile_dir {
            Some(dir) => println!("Browser profile: {}", dir.display()),
            None => println!("Browser profile: (temporary)"),
        }
        let show = |d: Option<std::time::Duration>| d.map(format_duration).unwrap_or("none".into());
        println!("Navigation timeout: {}", show(config.timeouts.navigation));
        println!("Script timeout: {}", show(config.timeouts.script));
        println!("Poll interval: {}", format_duration(config.timeouts.poll_interval));
        return Ok(());
    }

    let username = match cli.username.clone().or(config.tangerine.username.clone()) {
        Some(username) => username,
        None => Input::<String>::new()
            .with_prompt("Login ID")
            .interact_text_on(&Term::stderr())
            .context("Failed to read login ID")?,
    };
    let password = SecretString::from(
        Password::new()
            .with_prompt("Password")
            .interact_on(&Term::stderr())
            .context("Failed to read password")?,
    );

    let mut host_view = HostView::default();
    if let Some(width) = config.browser.window_width {
        host_view.width = width;
    }
    if let Some(height) = config.browser.window_height {
        host_view.height = height;
    }
    let delegate = TerminalDelegate {
        host_view: cli.show_browser.then_some(host_view),
    };

    let mut downloader = TangerineDownloader::new(
        Arc::new(ChromiumBridgeFactory::from_config(&config)),
        Arc::new(delegate),
    )
    .with_runner_options(config.runner_options());

    let accounts = downloader
        .authorize_and_get_accounts(&username, &password)
        .await?;

    let output = match cli.command {
        Command::Transactions { since } => {
            let since = since.unwrap_or_else(|| {
                Local::now().date_naive() - Duration::days(config.tangerine.history_days.into())
            });
            let by_name = accounts_by_name(accounts);

            let from = since
                .and_hms_opt(0, 0, 0)
                .context("Invalid start date")?;
            let transactions = downloader
                .download_account_transactions(&by_name, from)
                .await?;
            serde_json::to_string_pretty(&transactions)?
        }
        _ => serde_json::to_string_pretty(&accounts)?,
    };

    println!("{output}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_account_name_prefers_display_name() {
        let account = json!({"display_name": "Savings", "nickname": "Rainy day", "number": "123"});
        assert_eq!(account_name(&account), "Savings");
    }

    #[test]
    fn test_account_name_skips_empty_fields() {
        let account = json!({"display_name": "", "description": "Chequing", "number": "123"});
        assert_eq!(account_name(&account), "Chequing");
        assert_eq!(account_name(&json!({})), "unnamed");
    }

    #[test]
    fn test_accounts_sharing_a_name_are_all_kept() {
        let accounts = vec![
            json!({"nickname": "Savings", "number": "1"}),
            json!({"nickname": "Savings", "number": "2"}),
            json!({"number": ""}),
            json!({}),
        ];
        let by_name = accounts_by_name(accounts);

        assert_eq!(
            by_name.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["Savings", "Savings (2)", "unnamed", "unnamed (2)"]
        );
        assert_eq!(by_name["Savings"]["number"], json!("1"));
        assert_eq!(by_name["Savings (2)"]["number"], json!("2"));
    }

    #[test]
    fn test_account_number_disambiguates_before_counter() {
        let accounts = vec![
            json!({"display_name": "Chequing", "number": "4001"}),
            json!({"display_name": "Chequing", "number": "4002"}),
            json!({"display_name": "Chequing", "number": "4002"}),
        ];
        let by_name = accounts_by_name(accounts);

        assert_eq!(
            by_name.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["Chequing", "Chequing (2)", "Chequing (4002)"]
        );
    }

    #[test]
    fn test_cli_parses_transactions_since() {
        let cli = Cli::parse_from([
            "tangerine-downloader",
            "--show-browser",
            "transactions",
            "--since",
            "2024-03-01",
        ]);
        assert!(cli.show_browser);
        match cli.command {
            Command::Transactions { since } => {
                assert_eq!(since, NaiveDate::from_ymd_opt(2024, 3, 1));
            }
            _ => panic!("expected transactions command"),
        }
    }
}
