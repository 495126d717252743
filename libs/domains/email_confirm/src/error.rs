use thiserror::Error;

use crate::kv::KvError;

#[derive(Debug, Error)]
pub enum ConfirmError {
    /// Malformed or missing input: nothing to confirm, or an unknown,
    /// expired, or malformed confirmation code
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// The uid is not a valid account identifier
    #[error("Invalid uid: {0}")]
    InvalidUid(u64),

    /// The account has no email on file
    #[error("Invalid email: account has no email set")]
    InvalidEmail,

    /// A validation email was already sent recently
    #[error("Validation email already sent, try again in {interval_minutes} minutes")]
    RateLimited { interval_minutes: u64 },

    /// Key-value store failure
    #[error("Store error: {0}")]
    Store(#[from] KvError),

    /// Email delivery failure, propagated from the transport
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

pub type ConfirmResult<T> = Result<T, ConfirmError>;
