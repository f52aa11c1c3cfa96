#![doc = include_str!("../README.md")]

#[cfg(feature = "axum")]
pub mod axum_api;
pub mod clock;
pub mod code;
pub mod config;
pub mod cron;
#[cfg(feature = "diagnostics")]
pub mod diagnostics;
pub mod email;
pub mod errors;
pub mod rate_limit;
pub mod record;
pub mod service;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Environment, GuardConfig, RateLimitConfig};
pub use cron::SweepService;
#[cfg(feature = "diagnostics")]
pub use diagnostics::{OtpStatus, SelfTestReport};
pub use email::{EmailSender, LettreEmailSender, TracingEmailSender};
pub use errors::OtpError;
pub use rate_limit::{LimitScope, RateLimiter};
pub use service::{Challenge, OtpManager, VerifyOutcome};
pub use storage::{InMemoryStorage, Storage};
