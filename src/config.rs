use chrono::Duration;

#[derive(Debug, Clone)]
pub struct GuardConfig {
    pub environment: Environment,
    pub otp_expiry_seconds: u64,
    pub otp_cooldown_seconds: u64,
    pub otp_max_verify_attempts: u32,
    pub rate_limit_window_ms: u64,
    pub rate_limit_max_requests: u32,
    pub sweep_interval_seconds: u64,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_starttls: bool,
    pub smtp_username: String,
    pub smtp_password: String,
    pub mail_from: String,
    pub mail_from_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn is_development(self) -> bool {
        self == Environment::Development
    }

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Production,
            otp_expiry_seconds: 300,
            otp_cooldown_seconds: 60,
            otp_max_verify_attempts: 3,
            rate_limit_window_ms: 15 * 60 * 1000,
            rate_limit_max_requests: 100,
            sweep_interval_seconds: 300,
            smtp_server: "localhost".to_string(),
            smtp_port: 1025,
            smtp_starttls: true,
            smtp_username: "".to_string(),
            smtp_password: "".to_string(),
            mail_from: "noreply@example.com".to_string(),
            mail_from_name: "Security Team".to_string(),
        }
    }
}

/// Window length and ceiling for a [`crate::RateLimiter`]. Static for the
/// limiter's lifetime.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
}

impl RateLimitConfig {
    pub fn new(window_ms: u64, max_requests: u32) -> Self {
        Self {
            window: millis(window_ms),
            max_requests,
        }
    }
}

/// Saturates instead of panicking; out-of-range windows are rejected by
/// [`GuardConfig::validate`] and by the checked arithmetic in the records.
fn millis(ms: u64) -> Duration {
    Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}

pub const MAX_OTP_EXPIRY_SECONDS: u64 = 24 * 60 * 60;
pub const MAX_RATE_LIMIT_WINDOW_MS: u64 = 7 * 24 * 60 * 60 * 1000;
pub const MAX_SWEEP_INTERVAL_SECONDS: u64 = 24 * 60 * 60;

impl From<&GuardConfig> for RateLimitConfig {
    fn from(config: &GuardConfig) -> Self {
        Self::new(config.rate_limit_window_ms, config.rate_limit_max_requests)
    }
}

use crate::errors::OtpError;

impl GuardConfig {
    pub fn otp_ttl(&self) -> Duration {
        millis(self.otp_expiry_seconds.saturating_mul(1000))
    }

    pub fn otp_cooldown(&self) -> Duration {
        millis(self.otp_cooldown_seconds.saturating_mul(1000))
    }

    pub fn rate_limit_window(&self) -> Duration {
        millis(self.rate_limit_window_ms)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_seconds)
    }

    pub fn validate(&self) -> Result<(), OtpError> {
        if self.otp_expiry_seconds == 0 {
            return Err(must_be_positive("OTP_EXPIRY_SECONDS"));
        }
        if self.otp_max_verify_attempts == 0 {
            return Err(must_be_positive("OTP_MAX_VERIFY_ATTEMPTS"));
        }
        if self.rate_limit_window_ms == 0 {
            return Err(must_be_positive("RATE_LIMIT_WINDOW_MS"));
        }
        if self.rate_limit_max_requests == 0 {
            return Err(must_be_positive("RATE_LIMIT_MAX_REQUESTS"));
        }
        if self.sweep_interval_seconds == 0 {
            return Err(must_be_positive("SWEEP_INTERVAL_SECONDS"));
        }
        if self.otp_expiry_seconds > MAX_OTP_EXPIRY_SECONDS {
            return Err(must_not_exceed("OTP_EXPIRY_SECONDS", MAX_OTP_EXPIRY_SECONDS));
        }
        if self.rate_limit_window_ms > MAX_RATE_LIMIT_WINDOW_MS {
            return Err(must_not_exceed("RATE_LIMIT_WINDOW_MS", MAX_RATE_LIMIT_WINDOW_MS));
        }
        if self.sweep_interval_seconds > MAX_SWEEP_INTERVAL_SECONDS {
            return Err(must_not_exceed(
                "SWEEP_INTERVAL_SECONDS",
                MAX_SWEEP_INTERVAL_SECONDS,
            ));
        }
        if self.otp_cooldown_seconds > self.otp_expiry_seconds {
            return Err(OtpError::ConfigError(
                "OTP_COOLDOWN_SECONDS must not exceed OTP_EXPIRY_SECONDS".to_string(),
            ));
        }
        Ok(())
    }

    /// Reads overrides from the environment. Without `APP_ENV` the
    /// environment stays production, so development-only behaviour must be
    /// opted into explicitly.
    pub fn from_env() -> Result<Self, OtpError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("APP_ENV") {
            config.environment = match val.to_lowercase().as_str() {
                "development" | "dev" => Environment::Development,
                "production" | "prod" => Environment::Production,
                "test" => Environment::Test,
                _ => {
                    return Err(OtpError::ConfigError(
                        "Invalid APP_ENV: must be 'development', 'production' or 'test'"
                            .to_string(),
                    ))
                }
            };
        }

        if let Ok(val) = std::env::var("OTP_EXPIRY_SECONDS") {
            config.otp_expiry_seconds = val
                .parse()
                .map_err(|_| OtpError::ConfigError("Invalid OTP_EXPIRY_SECONDS".to_string()))?;
        }
        if let Ok(val) = std::env::var("OTP_COOLDOWN_SECONDS") {
            config.otp_cooldown_seconds = val
                .parse()
                .map_err(|_| OtpError::ConfigError("Invalid OTP_COOLDOWN_SECONDS".to_string()))?;
        }
        if let Ok(val) = std::env::var("OTP_MAX_VERIFY_ATTEMPTS") {
            config.otp_max_verify_attempts = val.parse().map_err(|_| {
                OtpError::ConfigError("Invalid OTP_MAX_VERIFY_ATTEMPTS".to_string())
            })?;
        }
        if let Ok(val) = std::env::var("RATE_LIMIT_WINDOW_MS") {
            config.rate_limit_window_ms = val
                .parse()
                .map_err(|_| OtpError::ConfigError("Invalid RATE_LIMIT_WINDOW_MS".to_string()))?;
        }
        if let Ok(val) = std::env::var("RATE_LIMIT_MAX_REQUESTS") {
            config.rate_limit_max_requests = val.parse().map_err(|_| {
                OtpError::ConfigError("Invalid RATE_LIMIT_MAX_REQUESTS".to_string())
            })?;
        }
        if let Ok(val) = std::env::var("SWEEP_INTERVAL_SECONDS") {
            config.sweep_interval_seconds = val.parse().map_err(|_| {
                OtpError::ConfigError("Invalid SWEEP_INTERVAL_SECONDS".to_string())
            })?;
        }

        if let Ok(val) = std::env::var("SMTP_HOST") {
            config.smtp_server = val;
        }
        if let Ok(val) = std::env::var("SMTP_PORT") {
            config.smtp_port = val
                .parse()
                .map_err(|_| OtpError::ConfigError("Invalid SMTP_PORT".to_string()))?;
        }
        if let Ok(val) = std::env::var("SMTP_STARTTLS") {
            config.smtp_starttls = val.parse().unwrap_or(true);
        }
        if let Ok(val) = std::env::var("SMTP_USERNAME") {
            config.smtp_username = val;
        }
        if let Ok(val) = std::env::var("SMTP_PASSWORD") {
            config.smtp_password = val;
        }
        if let Ok(val) = std::env::var("SMTP_MAIL_FROM") {
            config.mail_from = val;
        }
        if let Ok(val) = std::env::var("SMTP_MAIL_FROM_NAME") {
            config.mail_from_name = val;
        }

        config.validate()?;
        Ok(config)
    }
}

fn must_be_positive(var: &str) -> OtpError {
    OtpError::ConfigError(format!("{} must be greater than zero", var))
}

fn must_not_exceed(var: &str, max: u64) -> OtpError {
    OtpError::ConfigError(format!("{} must not exceed {}", var, max))
}
