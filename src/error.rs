//! Failure taxonomy for the exchange core
//!
//! Every failure is a typed result; nothing in this core panics on bad
//! input. `VerificationUnavailable` is deliberately distinct from
//! `AuthenticationFailed`: an unreachable identity directory is an
//! infrastructure fault and must never be reported as a false identity.

#[derive(Debug)]
pub enum ExchangeError {
    /// Signature invalid, or the presented key is not currently authorized
    /// for the claimed account.
    AuthenticationFailed,
    /// The identity directory could not be consulted. Retryable.
    VerificationUnavailable(String),
    AccountNotFound(String),
    QueryNotFound(String),
    ConsumerNotFound(String),
    /// A storage backend fault (e.g. the disbursement database).
    Ledger(String),
}

impl std::fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExchangeError::AuthenticationFailed => {
                write!(f, "authentication failed: signature rejected")
            }
            ExchangeError::VerificationUnavailable(detail) => {
                write!(f, "identity verification unavailable: {}", detail)
            }
            ExchangeError::AccountNotFound(id) => write!(f, "unknown account: {}", id),
            ExchangeError::QueryNotFound(id) => write!(f, "unknown query: {}", id),
            ExchangeError::ConsumerNotFound(id) => write!(f, "unknown consumer: {}", id),
            ExchangeError::Ledger(detail) => write!(f, "ledger error: {}", detail),
        }
    }
}

impl std::error::Error for ExchangeError {}
