use crate::clock::{Clock, SystemClock};
use crate::config::RateLimitConfig;
use crate::errors::OtpError;
use crate::service::normalize_identifier;
use crate::storage::Storage;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Fixed-window request counter keyed by an arbitrary string.
///
/// A burst straddling a window boundary can be admitted up to twice
/// `max_requests` times.
pub struct RateLimiter {
    storage: Arc<dyn Storage>,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
}

/// The flows that throttle per email address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    Signup,
    Login,
    Otp,
}

impl LimitScope {
    pub fn key(self, email: &str) -> String {
        let email = normalize_identifier(email).unwrap_or_default();
        format!("{}:{}", self, email)
    }
}

impl fmt::Display for LimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitScope::Signup => write!(f, "signup"),
            LimitScope::Login => write!(f, "login"),
            LimitScope::Otp => write!(f, "otp"),
        }
    }
}

impl RateLimiter {
    pub fn new(storage: Arc<dyn Storage>, config: RateLimitConfig) -> Self {
        Self::with_clock(storage, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        storage: Arc<dyn Storage>,
        config: RateLimitConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            config,
            clock,
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Counts one request against `key` and reports whether it is admitted.
    pub async fn is_allowed(&self, key: &str) -> Result<bool, OtpError> {
        let decision = self
            .storage
            .hit_rate_limit(
                key,
                self.config.window,
                self.config.max_requests,
                self.clock.now(),
            )
            .await?;

        if decision.allowed {
            debug!(key, count = decision.record.count, "request admitted");
        } else {
            info!(key, reset_at = %decision.record.reset_at, "rate limit exceeded");
        }
        Ok(decision.allowed)
    }

    /// Advisory only: a window that has lapsed but not yet been rolled over by
    /// [`RateLimiter::is_allowed`] still reports its old count.
    pub async fn remaining(&self, key: &str) -> Result<u32, OtpError> {
        Ok(match self.storage.get_rate_limit(key).await? {
            Some(record) => record.remaining(self.config.max_requests),
            None => self.config.max_requests,
        })
    }

    /// Blank emails are refused before admission so they never share a bucket.
    pub async fn check_rate_limit(&self, scope: LimitScope, email: &str) -> Result<(), OtpError> {
        if normalize_identifier(email).is_none() {
            return Err(OtpError::InvalidIdentifier);
        }
        if self.is_allowed(&scope.key(email)).await? {
            Ok(())
        } else {
            Err(OtpError::RateLimitExceeded)
        }
    }

    /// Drops windows whose reset time has passed.
    pub async fn purge_expired(&self) -> Result<usize, OtpError> {
        self.storage
            .purge_expired_rate_limits(self.clock.now())
            .await
    }
}
