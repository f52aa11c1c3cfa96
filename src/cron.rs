use crate::errors::OtpError;
use crate::rate_limit::RateLimiter;
use crate::service::OtpManager;
use std::sync::Arc;
use tokio::time::{self, Duration};
use tracing::{error, info, instrument};

/// Periodically reclaims challenges that expired without being verified and
/// rate-limit windows that have lapsed. Request handling does not depend on
/// it for correctness; it only bounds memory.
pub struct SweepService {
    otp: Arc<OtpManager>,
    limiter: Option<Arc<RateLimiter>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub otps: usize,
    pub rate_limits: usize,
}

impl SweepService {
    pub fn new(otp: Arc<OtpManager>) -> Self {
        Self { otp, limiter: None }
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    #[instrument(skip(self))]
    pub async fn run_sweep(&self) -> Result<SweepReport, OtpError> {
        let otps = self.otp.sweep().await?;
        let rate_limits = match &self.limiter {
            Some(limiter) => limiter.purge_expired().await?,
            None => 0,
        };

        info!(otps, rate_limits, "sweep completed");
        Ok(SweepReport { otps, rate_limits })
    }

    /// Runs the sweep every `interval` until the task is dropped. Intended to
    /// be started in production only.
    pub async fn start_scheduler(self: Arc<Self>, interval: Duration) {
        let mut timer = time::interval(interval);
        // The first tick completes immediately; nothing has expired yet.
        timer.tick().await;

        info!("Sweep scheduler started with interval: {:?}", interval);

        loop {
            timer.tick().await;

            // Spawn the job as a separate task so the timer doesn't drift if the job is slow
            let service = self.clone();
            tokio::spawn(async move {
                if let Err(e) = service.run_sweep().await {
                    error!("Sweep job failed: {:?}", e);
                }
            });
        }
    }
}
