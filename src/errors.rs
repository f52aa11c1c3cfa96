use thiserror::Error;

#[derive(Error, Debug)]
pub enum OtpError {
    #[error("Please wait {retry_after_seconds}s before requesting a new verification code")]
    CooldownActive { retry_after_seconds: u64 },

    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Identifier must not be empty")]
    InvalidIdentifier,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Diagnostics are only available in development")]
    DiagnosticsDisabled,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}
