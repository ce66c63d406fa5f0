/// Failures specific to the Tangerine download flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TangerineDownloaderError {
    /// No proper response from the accounts API.
    #[error("Could not parse the accounts from the server")]
    AccountsLoadingFailed,

    /// No proper response from the transactions API.
    #[error("Could not parse the transactions from the server")]
    TransactionLoadingFailed,

    /// Transactions were requested before a successful login.
    #[error("Not logged in; call authorize_and_get_accounts first")]
    NotAuthorized,
}
