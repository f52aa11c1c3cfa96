use crate::errors::OtpError;
use crate::record::{AttemptOutcome, InsertOutcome, OtpRecord, RateLimitDecision, RateLimitRecord};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

pub mod memory;

/// Process-local state behind the OTP manager and the rate limiter.
///
/// Every method is one atomic read-modify-write on the underlying table.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Storage: Send + Sync {
    /// Stores `record` unless a live record younger than `cooldown` exists,
    /// in which case the existing record is left untouched.
    async fn insert_otp(
        &self,
        identifier: &str,
        record: OtpRecord,
        cooldown: Duration,
    ) -> Result<InsertOutcome, OtpError>;

    async fn register_attempt(
        &self,
        identifier: &str,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<AttemptOutcome, OtpError>;

    /// Removes the record only if it still holds `code`.
    async fn consume_otp(&self, identifier: &str, code: &str) -> Result<bool, OtpError>;

    /// Unconditional delete; returns whether a record was present.
    async fn remove_otp(&self, identifier: &str) -> Result<bool, OtpError>;

    async fn get_otp(&self, identifier: &str) -> Result<Option<OtpRecord>, OtpError>;
    async fn otp_count(&self) -> Result<usize, OtpError>;
    async fn purge_expired_otps(&self, now: DateTime<Utc>) -> Result<usize, OtpError>;

    async fn hit_rate_limit(
        &self,
        key: &str,
        window: Duration,
        max_requests: u32,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, OtpError>;

    async fn get_rate_limit(&self, key: &str) -> Result<Option<RateLimitRecord>, OtpError>;
    async fn purge_expired_rate_limits(&self, now: DateTime<Utc>) -> Result<usize, OtpError>;
}

pub use self::memory::InMemoryStorage;
