use crate::errors::OtpError;
use chrono::{DateTime, Duration, Utc};

/// One outstanding verification challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpRecord {
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempts: u32,
}

/// Result of registering a verification attempt against a stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    NotFound,
    /// The record had expired and has been removed.
    Expired,
    /// The attempt cap was exceeded and the record has been removed.
    Exhausted,
    /// The record is still live; `attempts` already counts this attempt.
    Pending { code: String, attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Stored { replaced: bool },
    /// A recent record blocks issuance for `retry_after`.
    Cooldown { retry_after: Duration },
}

impl OtpRecord {
    pub fn new(code: String, now: DateTime<Utc>, ttl: Duration) -> Result<Self, OtpError> {
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| OtpError::ConfigError("OTP expiry out of range".to_string()))?;
        Ok(Self {
            code,
            created_at: now,
            expires_at,
            attempts: 0,
        })
    }

    /// A code is valid strictly before `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Time left before a replacement may be issued, if any.
    pub fn cooldown_remaining(&self, now: DateTime<Utc>, cooldown: Duration) -> Option<Duration> {
        if self.is_expired(now) {
            return None;
        }
        let elapsed = now - self.created_at;
        if elapsed < cooldown {
            Some(cooldown - elapsed)
        } else {
            None
        }
    }

    /// Applies the expiry check and the attempt increment. The caller removes
    /// the record on `Expired` and `Exhausted`.
    pub fn register_attempt(&mut self, now: DateTime<Utc>, max_attempts: u32) -> AttemptOutcome {
        if self.is_expired(now) {
            return AttemptOutcome::Expired;
        }
        self.attempts = self.attempts.saturating_add(1);
        if self.attempts > max_attempts {
            return AttemptOutcome::Exhausted;
        }
        AttemptOutcome::Pending {
            code: self.code.clone(),
            attempts: self.attempts,
        }
    }
}

/// Fixed-window counter for one limiter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub count: u32,
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub record: RateLimitRecord,
}

impl RateLimitRecord {
    pub fn open(now: DateTime<Utc>, window: Duration) -> Result<Self, OtpError> {
        let reset_at = now.checked_add_signed(window).ok_or_else(|| {
            OtpError::ConfigError("Rate limit window out of range".to_string())
        })?;
        Ok(Self { count: 1, reset_at })
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.reset_at < now
    }

    /// Fixed-window admission. A refused hit leaves `count` untouched, and an
    /// error leaves the record as it was.
    pub fn hit(
        &mut self,
        now: DateTime<Utc>,
        window: Duration,
        max_requests: u32,
    ) -> Result<bool, OtpError> {
        if self.is_stale(now) {
            *self = Self::open(now, window)?;
            return Ok(true);
        }
        if self.count >= max_requests {
            return Ok(false);
        }
        self.count += 1;
        Ok(true)
    }

    pub fn remaining(&self, max_requests: u32) -> u32 {
        max_requests.saturating_sub(self.count)
    }
}
