use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use super::{TangerineDelegate, TangerineDownloaderError};
use crate::scraper::{Directive, Model, ScriptArgs, Step, StepError};

const LOGIN_URL: &str = "https://www.tangerine.ca/app/#/login/login-id?locale=en_CA";
const ACCOUNTS_URL: &str = "https://secure.tangerine.ca/web/rest/pfm/v1/accounts";
const TRANSACTIONS_URL: &str = "https://secure.tangerine.ca/web/rest/pfm/v1/transactions";

const LOGIN_TITLE: &str = "Log in | Tangerine";
const PASSWORD_TITLE: &str = "Enter your Password | Tangerine";
const SECURITY_CODE_TITLE: &str = "Enter your Security Code | Tangerine";
const OVERVIEW_TITLE: &str = "Overview | Tangerine";

const LOGIN_ID_SELECTOR: &str = "input[aria-label='Login ID']";
const PASSWORD_SELECTOR: &str = "input[id='passwordId-input']";
const OTP_SELECTOR: &str = "input[id='login-otp-input']";

const PAGE_TIMEOUT: Duration = Duration::from_secs(5);
const SHORT_WAIT: Duration = Duration::from_secs(1);

/// Format of the period bounds in transaction queries.
pub const URL_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

fn short_wait() -> Step {
    Step::wait(SHORT_WAIT)
}

fn click_submit() -> Step {
    Step::call("clickSubmitButton", ScriptArgs::none())
}

fn wait_for_title(title: &str) -> Step {
    Step::wait_for("assertTitle", ScriptArgs::positional([title]), PAGE_TIMEOUT)
}

fn enter_field(selector: &str, value: &str) -> Step {
    Step::call("enterField", ScriptArgs::positional([selector, value]))
}

/// Steps that log in and store the account list under `accounts`.
///
/// When the browser profile is still logged in the credential steps are
/// skipped.
pub fn login_steps(
    username: &str,
    password: &SecretString,
    delegate: Arc<dyn TangerineDelegate>,
) -> Vec<Step> {
    let head = vec![
        Step::open_page(LOGIN_URL),
        Step::wait_for(
            "assertTitles",
            ScriptArgs::positional([LOGIN_TITLE, OVERVIEW_TITLE]),
            PAGE_TIMEOUT,
        ),
    ];

    let get_code = Step::async_process(move |mut model, completion| {
        let delegate = delegate.clone();
        tokio::task::spawn_blocking(move || {
            model.insert("otpFieldSelector", OTP_SELECTOR);
            model.insert("otp", delegate.get_one_time_code());
            completion.complete(model, Directive::Proceed);
        });
    });

    let credentials = vec![
        short_wait(),
        enter_field(LOGIN_ID_SELECTOR, username),
        short_wait(),
        click_submit(),
        wait_for_title(PASSWORD_TITLE),
        short_wait(),
        enter_field(PASSWORD_SELECTOR, password.expose_secret()),
        short_wait(),
        click_submit(),
        wait_for_title(SECURITY_CODE_TITLE),
        get_code,
        Step::call("enterField", ScriptArgs::keyed(["otpFieldSelector", "otp"])),
        short_wait(),
        click_submit(),
        short_wait(),
        wait_for_title(OVERVIEW_TITLE),
    ];

    // Index of the first step after the login form, counting the check below.
    let logged_in = head.len() + 1 + credentials.len();
    let check_logged_in = Step::run_script("getTitle", ScriptArgs::none(), move |response, _| {
        if response.as_str() == Some(OVERVIEW_TITLE) {
            Directive::JumpToStep(logged_in)
        } else {
            Directive::Proceed
        }
    });

    let tail = vec![
        short_wait(),
        Step::open_page(ACCOUNTS_URL),
        Step::run_script("getContent", ScriptArgs::none(), store_accounts),
    ];

    let mut steps = head;
    steps.push(check_logged_in);
    steps.extend(credentials);
    steps.extend(tail);
    steps
}

fn store_accounts(response: Value, model: &mut Model) -> Directive {
    match response.get("accounts") {
        Some(accounts @ Value::Array(_)) => {
            model.insert("accounts", accounts.clone());
            Directive::Proceed
        }
        _ => Directive::Fail(StepError::user(TangerineDownloaderError::AccountsLoadingFailed)),
    }
}

/// URL of the transactions endpoint for one account and period.
pub fn transactions_url(account_number: &str, from: NaiveDateTime, to: NaiveDateTime) -> String {
    format!(
        "{TRANSACTIONS_URL}?skip=0&accountIdentifiers={}&periodFrom={}&periodTo={}",
        urlencoding::encode(account_number),
        from.format(URL_DATE_FORMAT),
        to.format(URL_DATE_FORMAT),
    )
}

/// Steps that load one account's transactions into
/// `transactions[account_name]`, keeping entries for other accounts.
pub fn transaction_steps(url: &str, account_name: &str) -> Vec<Step> {
    let account_name = account_name.to_string();
    vec![
        Step::open_page(url),
        Step::run_script("getContent", ScriptArgs::none(), move |response, model| {
            let Some(Value::Array(transactions)) = response.get("transactions") else {
                return Directive::Fail(StepError::user(
                    TangerineDownloaderError::TransactionLoadingFailed,
                ));
            };

            let mut saved: BTreeMap<String, Vec<Value>> = match model.get_as("transactions") {
                Ok(saved) => saved.unwrap_or_default(),
                Err(err) => return Directive::Fail(err),
            };
            saved.insert(account_name.clone(), transactions.clone());

            match model.insert_serialized("transactions", &saved) {
                Ok(()) => Directive::Proceed,
                Err(err) => Directive::Fail(err),
            }
        }),
    ]
}
