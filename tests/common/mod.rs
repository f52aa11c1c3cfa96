use async_trait::async_trait;
use axum::Router;
use email_otp_guard::{
    axum_api::guard_router, EmailSender, Environment, GuardConfig, InMemoryStorage, ManualClock,
    OtpError, OtpManager, RateLimiter,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
pub struct TestEmailSender {
    pub sent_emails: Arc<Mutex<Vec<(String, String, String)>>>,
}

#[allow(dead_code)]
impl TestEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivery runs in a detached task, so wait for it to land.
    pub async fn wait_for(&self, count: usize) -> Vec<(String, String, String)> {
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                {
                    let sent = self.sent_emails.lock().unwrap();
                    if sent.len() >= count {
                        return sent.clone();
                    }
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("email was not delivered in time")
    }
}

#[async_trait]
impl EmailSender for TestEmailSender {
    async fn send_email(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), OtpError> {
        self.sent_emails.lock().unwrap().push((
            recipient.to_string(),
            subject.to_string(),
            body.to_string(),
        ));
        Ok(())
    }
}

/// Always fails, like an SMTP relay that is down.
#[allow(dead_code)]
pub struct FailingEmailSender;

#[async_trait]
impl EmailSender for FailingEmailSender {
    async fn send_email(&self, _: &str, _: &str, _: &str) -> Result<(), OtpError> {
        Err(OtpError::DeliveryFailed("connection refused".to_string()))
    }
}

/// Development config: echoes codes and serves diagnostics.
#[allow(dead_code)]
pub fn dev_config() -> GuardConfig {
    GuardConfig {
        environment: Environment::Development,
        ..GuardConfig::default()
    }
}

#[allow(dead_code)]
pub struct TestApp {
    pub router: Router,
    pub email_sender: Arc<TestEmailSender>,
    pub otp: Arc<OtpManager>,
    pub limiter: Arc<RateLimiter>,
    pub clock: Arc<ManualClock>,
}

#[allow(dead_code)]
pub fn spawn_app(config: GuardConfig) -> TestApp {
    let clock = Arc::new(ManualClock::starting_now());
    let storage = Arc::new(InMemoryStorage::new());
    let email_sender = Arc::new(TestEmailSender::new());

    let otp = Arc::new(OtpManager::with_clock(
        config.clone(),
        storage.clone(),
        email_sender.clone(),
        clock.clone(),
    ));
    let limiter = Arc::new(RateLimiter::with_clock(
        storage,
        (&config).into(),
        clock.clone(),
    ));

    let router = guard_router(otp.clone(), limiter.clone());
    TestApp {
        router,
        email_sender,
        otp,
        limiter,
        clock,
    }
}

#[allow(dead_code)]
pub fn manager_with(
    config: GuardConfig,
    email_sender: Arc<dyn EmailSender>,
) -> (OtpManager, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_now());
    let manager = OtpManager::with_clock(
        config,
        Arc::new(InMemoryStorage::new()),
        email_sender,
        clock.clone(),
    );
    (manager, clock)
}
