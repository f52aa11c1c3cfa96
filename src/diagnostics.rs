//! Development-only inspection of outstanding challenges.
//!
//! Compiled only with the `diagnostics` feature, and refused at runtime
//! unless the configured environment is development. `status` never exposes
//! the stored code; `self_test` returns only the code it issued itself.

use crate::errors::OtpError;
use crate::service::{normalize_identifier, OtpManager};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OtpStatus {
    pub exists: bool,
    pub attempts: u32,
    pub max_attempts: u32,
    pub attempts_remaining: u32,
    pub created_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub expires_in_seconds: u64,
    pub is_expired: bool,
    pub store_size: usize,
}

/// Result of an end-to-end issue and verify run against the live store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelfTestReport {
    pub code: String,
    pub verified: bool,
    pub final_status: OtpStatus,
}

impl OtpManager {
    pub async fn status(&self, identifier: &str) -> Result<OtpStatus, OtpError> {
        if !self.config.environment.is_development() {
            return Err(OtpError::DiagnosticsDisabled);
        }

        let max_attempts = self.config.otp_max_verify_attempts;
        let store_size = self.storage().otp_count().await?;
        let record = match normalize_identifier(identifier) {
            Some(identifier) => self.storage().get_otp(&identifier).await?,
            None => None,
        };

        let Some(record) = record else {
            return Ok(OtpStatus {
                exists: false,
                attempts: 0,
                max_attempts,
                attempts_remaining: 0,
                created_at: None,
                expires_at: None,
                expires_in_seconds: 0,
                is_expired: false,
                store_size,
            });
        };

        let now = self.clock().now();
        let expires_in_seconds = (record.expires_at - now).num_seconds().max(0) as u64;

        Ok(OtpStatus {
            exists: true,
            attempts: record.attempts,
            max_attempts,
            attempts_remaining: max_attempts.saturating_sub(record.attempts),
            created_at: Some(record.created_at),
            expires_at: Some(record.expires_at),
            expires_in_seconds,
            is_expired: record.is_expired(now),
            store_size,
        })
    }

    /// Clears any outstanding challenge for `identifier`, issues a fresh one
    /// and verifies it. The cooldown is bypassed by the clear.
    #[instrument(skip(self))]
    pub async fn self_test(&self, identifier: &str) -> Result<SelfTestReport, OtpError> {
        if !self.config.environment.is_development() {
            return Err(OtpError::DiagnosticsDisabled);
        }
        let identifier = normalize_identifier(identifier).ok_or(OtpError::InvalidIdentifier)?;

        self.storage().remove_otp(&identifier).await?;
        let challenge = self.issue(&identifier).await?;
        let verified = self.verify(&identifier, &challenge.code).await?;
        let final_status = self.status(&identifier).await?;

        info!(verified, "OTP self-test finished");
        Ok(SelfTestReport {
            code: challenge.code,
            verified,
            final_status,
        })
    }
}
