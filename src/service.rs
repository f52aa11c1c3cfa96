use crate::clock::{Clock, SystemClock};
use crate::code::{codes_match, generate_code};
use crate::config::GuardConfig;
use crate::email::{otp_body, EmailSender, OTP_SUBJECT};
use crate::errors::OtpError;
use crate::record::{AttemptOutcome, InsertOutcome, OtpRecord};
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// A freshly issued challenge. The code is returned regardless of whether
/// delivery later succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Detailed verification result. Callers facing end users should collapse
/// every non-`Verified` variant into one generic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified,
    NotFound,
    Expired,
    AttemptsExhausted,
    InvalidCandidate { attempts_used: u32 },
}

impl VerifyOutcome {
    pub fn is_verified(self) -> bool {
        self == VerifyOutcome::Verified
    }
}

pub struct OtpManager {
    pub config: GuardConfig,
    storage: Arc<dyn Storage>,
    email_sender: Arc<dyn EmailSender>,
    clock: Arc<dyn Clock>,
}

impl OtpManager {
    pub fn new(
        config: GuardConfig,
        storage: Arc<dyn Storage>,
        email_sender: Arc<dyn EmailSender>,
    ) -> Self {
        Self::with_clock(config, storage, email_sender, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: GuardConfig,
        storage: Arc<dyn Storage>,
        email_sender: Arc<dyn EmailSender>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            storage,
            email_sender,
            clock,
        }
    }

    /// Issues a new code for `identifier` and hands it to the email sender in
    /// a detached task.
    ///
    /// Fails with [`OtpError::CooldownActive`] while a live challenge younger
    /// than the cooldown exists; that challenge stays verifiable.
    #[instrument(skip(self), fields(request_id = %Uuid::new_v4()))]
    pub async fn issue(&self, identifier: &str) -> Result<Challenge, OtpError> {
        let identifier = normalize_identifier(identifier).ok_or(OtpError::InvalidIdentifier)?;

        let now = self.clock.now();
        let record = OtpRecord::new(generate_code(), now, self.config.otp_ttl())?;
        let challenge = Challenge {
            code: record.code.clone(),
            expires_at: record.expires_at,
        };

        match self
            .storage
            .insert_otp(&identifier, record, self.config.otp_cooldown())
            .await?
        {
            InsertOutcome::Cooldown { retry_after } => {
                info!(retry_after_ms = retry_after.num_milliseconds(), "OTP cooldown active");
                // Round up so a caller never retries a moment too early.
                let retry_after_seconds =
                    (retry_after.num_milliseconds().max(0) as u64).div_ceil(1000);
                return Err(OtpError::CooldownActive {
                    retry_after_seconds,
                });
            }
            InsertOutcome::Stored { replaced } => {
                info!(replaced, expires_at = %challenge.expires_at, "OTP issued");
            }
        }

        self.spawn_delivery(identifier, challenge.code.clone());
        Ok(challenge)
    }

    /// Delivery runs detached: a failure is logged and the stored code stays
    /// valid.
    fn spawn_delivery(&self, recipient: String, code: String) {
        let sender = self.email_sender.clone();
        let body = otp_body(&code, self.config.otp_expiry_seconds);
        tokio::spawn(async move {
            match sender.send_email(&recipient, OTP_SUBJECT, &body).await {
                Ok(()) => debug!(recipient = %recipient, "OTP delivered"),
                Err(e) => warn!(
                    recipient = %recipient,
                    error = %e,
                    "OTP delivery failed; code remains valid"
                ),
            }
        });
    }

    /// Checks `candidate` against the stored challenge. Expected negative
    /// outcomes all collapse to `Ok(false)`.
    pub async fn verify(&self, identifier: &str, candidate: &str) -> Result<bool, OtpError> {
        Ok(self.check(identifier, candidate).await?.is_verified())
    }

    #[instrument(skip(self, candidate), fields(request_id = %Uuid::new_v4()))]
    pub async fn check(&self, identifier: &str, candidate: &str) -> Result<VerifyOutcome, OtpError> {
        let Some(identifier) = normalize_identifier(identifier) else {
            return Ok(VerifyOutcome::NotFound);
        };

        let outcome = match self
            .storage
            .register_attempt(
                &identifier,
                self.config.otp_max_verify_attempts,
                self.clock.now(),
            )
            .await?
        {
            AttemptOutcome::NotFound => VerifyOutcome::NotFound,
            AttemptOutcome::Expired => VerifyOutcome::Expired,
            AttemptOutcome::Exhausted => VerifyOutcome::AttemptsExhausted,
            AttemptOutcome::Pending { code, attempts } => {
                if !codes_match(&code, candidate) {
                    VerifyOutcome::InvalidCandidate {
                        attempts_used: attempts,
                    }
                } else if self.storage.consume_otp(&identifier, &code).await? {
                    VerifyOutcome::Verified
                } else {
                    // Consumed or replaced by a concurrent request.
                    VerifyOutcome::NotFound
                }
            }
        };

        match outcome {
            VerifyOutcome::Verified => info!("OTP verified"),
            VerifyOutcome::InvalidCandidate { attempts_used } => info!(
                attempts_used,
                max_attempts = self.config.otp_max_verify_attempts,
                "OTP mismatch"
            ),
            other => info!(outcome = ?other, "OTP verification rejected"),
        }
        Ok(outcome)
    }

    /// Removes every challenge that has expired without being verified.
    pub async fn sweep(&self) -> Result<usize, OtpError> {
        let purged = self.storage.purge_expired_otps(self.clock.now()).await?;
        if purged > 0 {
            debug!(purged, "expired OTPs purged");
        }
        Ok(purged)
    }

    #[cfg_attr(not(feature = "diagnostics"), allow(dead_code))]
    pub(crate) fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    #[cfg_attr(not(feature = "diagnostics"), allow(dead_code))]
    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

/// Identifiers are emails: surrounding whitespace is dropped and case folded.
pub fn normalize_identifier(identifier: &str) -> Option<String> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::email::MockEmailSender;
    use crate::storage::{InMemoryStorage, MockStorage};
    use chrono::Duration;
    use mockall::predicate::*;

    fn quiet_sender() -> MockEmailSender {
        let mut mock_email = MockEmailSender::new();
        mock_email.expect_send_email().returning(|_, _, _| Ok(()));
        mock_email
    }

    #[tokio::test]
    async fn test_issue_stores_record_with_config_policy() {
        let mut mock_storage = MockStorage::new();
        let config = GuardConfig::default();

        mock_storage
            .expect_insert_otp()
            .with(
                eq("test@example.com"),
                function(|r: &OtpRecord| r.attempts == 0 && r.code.len() == 6),
                eq(Duration::seconds(60)),
            )
            .times(1)
            .returning(|_, _, _| Ok(InsertOutcome::Stored { replaced: false }));

        let service = OtpManager::new(config, Arc::new(mock_storage), Arc::new(quiet_sender()));

        let challenge = service.issue(" Test@Example.com ").await.unwrap();
        assert_eq!(challenge.code.len(), 6);
    }

    #[tokio::test]
    async fn test_issue_cooldown_skips_delivery() {
        let mut mock_storage = MockStorage::new();
        let mut mock_email = MockEmailSender::new();
        let config = GuardConfig::default();

        mock_storage.expect_insert_otp().returning(|_, _, _| {
            Ok(InsertOutcome::Cooldown {
                retry_after: Duration::milliseconds(40_500),
            })
        });
        mock_email.expect_send_email().never();

        let service = OtpManager::new(config, Arc::new(mock_storage), Arc::new(mock_email));

        let result = service.issue("test@example.com").await;
        assert!(matches!(
            result,
            Err(OtpError::CooldownActive {
                retry_after_seconds: 41
            })
        ));
    }

    #[tokio::test]
    async fn test_issue_rejects_blank_identifier() {
        let mock_storage = MockStorage::new();
        let service = OtpManager::new(
            GuardConfig::default(),
            Arc::new(mock_storage),
            Arc::new(MockEmailSender::new()),
        );

        assert!(matches!(
            service.issue("   ").await,
            Err(OtpError::InvalidIdentifier)
        ));
    }

    #[tokio::test]
    async fn test_issue_with_oversized_expiry_fails_without_storing() {
        let mut mock_storage = MockStorage::new();
        mock_storage.expect_insert_otp().never();

        let config = GuardConfig {
            otp_expiry_seconds: u64::MAX,
            ..GuardConfig::default()
        };
        let service = OtpManager::new(
            config,
            Arc::new(mock_storage),
            Arc::new(MockEmailSender::new()),
        );

        assert!(matches!(
            service.issue("test@example.com").await,
            Err(OtpError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_verify_otp_success_consumes() {
        let mut mock_storage = MockStorage::new();
        let config = GuardConfig::default();

        mock_storage
            .expect_register_attempt()
            .with(eq("test@example.com"), eq(3), always())
            .returning(|_, _, _| {
                Ok(AttemptOutcome::Pending {
                    code: "123456".to_string(),
                    attempts: 1,
                })
            });

        mock_storage
            .expect_consume_otp()
            .with(eq("test@example.com"), eq("123456"))
            .times(1)
            .returning(|_, _| Ok(true));

        let service = OtpManager::new(config, Arc::new(mock_storage), Arc::new(quiet_sender()));

        assert!(service.verify("test@example.com", " 123456 ").await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_otp_invalid_keeps_record() {
        let mut mock_storage = MockStorage::new();
        let config = GuardConfig::default();

        mock_storage.expect_register_attempt().returning(|_, _, _| {
            Ok(AttemptOutcome::Pending {
                code: "123456".to_string(),
                attempts: 2,
            })
        });
        mock_storage.expect_consume_otp().never();

        let service = OtpManager::new(config, Arc::new(mock_storage), Arc::new(quiet_sender()));

        let outcome = service.check("test@example.com", "000000").await.unwrap();
        assert_eq!(outcome, VerifyOutcome::InvalidCandidate { attempts_used: 2 });
    }

    #[tokio::test]
    async fn test_verify_lost_race_is_not_verified() {
        let mut mock_storage = MockStorage::new();

        mock_storage.expect_register_attempt().returning(|_, _, _| {
            Ok(AttemptOutcome::Pending {
                code: "123456".to_string(),
                attempts: 1,
            })
        });
        mock_storage.expect_consume_otp().returning(|_, _| Ok(false));

        let service = OtpManager::new(
            GuardConfig::default(),
            Arc::new(mock_storage),
            Arc::new(quiet_sender()),
        );

        assert!(!service.verify("test@example.com", "123456").await.unwrap());
    }

    #[tokio::test]
    async fn test_storage_fault_propagates() {
        let mut mock_storage = MockStorage::new();
        mock_storage
            .expect_register_attempt()
            .returning(|_, _, _| Err(OtpError::StorageError("Lock poisoned".into())));

        let service = OtpManager::new(
            GuardConfig::default(),
            Arc::new(mock_storage),
            Arc::new(quiet_sender()),
        );

        assert!(matches!(
            service.verify("test@example.com", "123456").await,
            Err(OtpError::StorageError(_))
        ));
    }

    #[tokio::test]
    async fn test_delivery_failure_keeps_code_valid() {
        let mut mock_email = MockEmailSender::new();
        mock_email
            .expect_send_email()
            .returning(|_, _, _| Err(OtpError::DeliveryFailed("smtp down".into())));

        let clock = Arc::new(ManualClock::starting_now());
        let service = OtpManager::with_clock(
            GuardConfig::default(),
            Arc::new(InMemoryStorage::new()),
            Arc::new(mock_email),
            clock,
        );

        let challenge = service.issue("user@example.com").await.unwrap();
        tokio::task::yield_now().await;

        assert!(service.verify("user@example.com", &challenge.code).await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_purges_only_expired() {
        let clock = Arc::new(ManualClock::starting_now());
        let service = OtpManager::with_clock(
            GuardConfig::default(),
            Arc::new(InMemoryStorage::new()),
            Arc::new(quiet_sender()),
            clock.clone(),
        );

        service.issue("old@example.com").await.unwrap();
        clock.advance(Duration::minutes(3));
        service.issue("new@example.com").await.unwrap();
        clock.advance(Duration::minutes(3));

        assert_eq!(service.sweep().await.unwrap(), 1);
        assert_eq!(service.storage().otp_count().await.unwrap(), 1);
    }

    #[test]
    fn test_normalize_identifier() {
        assert_eq!(
            normalize_identifier("  User@Example.COM\n"),
            Some("user@example.com".to_string())
        );
        assert_eq!(normalize_identifier(" \t "), None);
    }
}
