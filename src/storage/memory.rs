use crate::errors::OtpError;
use crate::record::{AttemptOutcome, InsertOutcome, OtpRecord, RateLimitDecision, RateLimitRecord};
use crate::storage::Storage;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Both tables live for the lifetime of the value and are never persisted.
pub struct InMemoryStorage {
    otps: Arc<RwLock<HashMap<String, OtpRecord>>>,
    rate_limits: Arc<RwLock<HashMap<String, RateLimitRecord>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            otps: Arc::new(RwLock::new(HashMap::new())),
            rate_limits: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, OtpError> {
    lock.read()
        .map_err(|_| OtpError::StorageError("Lock poisoned".into()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, OtpError> {
    lock.write()
        .map_err(|_| OtpError::StorageError("Lock poisoned".into()))
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn insert_otp(
        &self,
        identifier: &str,
        record: OtpRecord,
        cooldown: Duration,
    ) -> Result<InsertOutcome, OtpError> {
        let mut map = write(&self.otps)?;

        if let Some(existing) = map.get(identifier) {
            if let Some(retry_after) = existing.cooldown_remaining(record.created_at, cooldown) {
                return Ok(InsertOutcome::Cooldown { retry_after });
            }
        }

        let replaced = map.insert(identifier.to_string(), record).is_some();
        Ok(InsertOutcome::Stored { replaced })
    }

    async fn register_attempt(
        &self,
        identifier: &str,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<AttemptOutcome, OtpError> {
        let mut map = write(&self.otps)?;

        let Some(entry) = map.get_mut(identifier) else {
            return Ok(AttemptOutcome::NotFound);
        };

        let outcome = entry.register_attempt(now, max_attempts);
        if matches!(outcome, AttemptOutcome::Expired | AttemptOutcome::Exhausted) {
            map.remove(identifier);
        }
        Ok(outcome)
    }

    async fn consume_otp(&self, identifier: &str, code: &str) -> Result<bool, OtpError> {
        let mut map = write(&self.otps)?;
        match map.get(identifier) {
            Some(entry) if entry.code == code => {
                map.remove(identifier);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove_otp(&self, identifier: &str) -> Result<bool, OtpError> {
        let mut map = write(&self.otps)?;
        Ok(map.remove(identifier).is_some())
    }

    async fn get_otp(&self, identifier: &str) -> Result<Option<OtpRecord>, OtpError> {
        let map = read(&self.otps)?;
        Ok(map.get(identifier).cloned())
    }

    async fn otp_count(&self) -> Result<usize, OtpError> {
        let map = read(&self.otps)?;
        Ok(map.len())
    }

    async fn purge_expired_otps(&self, now: DateTime<Utc>) -> Result<usize, OtpError> {
        let mut map = write(&self.otps)?;
        let before = map.len();
        map.retain(|_, entry| !entry.is_expired(now));
        Ok(before - map.len())
    }

    async fn hit_rate_limit(
        &self,
        key: &str,
        window: Duration,
        max_requests: u32,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, OtpError> {
        let mut map = write(&self.rate_limits)?;

        let (allowed, record) = match map.get_mut(key) {
            Some(entry) => {
                let allowed = entry.hit(now, window, max_requests)?;
                (allowed, *entry)
            }
            None => {
                let entry = RateLimitRecord::open(now, window)?;
                map.insert(key.to_string(), entry);
                (true, entry)
            }
        };

        Ok(RateLimitDecision { allowed, record })
    }

    async fn get_rate_limit(&self, key: &str) -> Result<Option<RateLimitRecord>, OtpError> {
        let map = read(&self.rate_limits)?;
        Ok(map.get(key).copied())
    }

    async fn purge_expired_rate_limits(&self, now: DateTime<Utc>) -> Result<usize, OtpError> {
        let mut map = write(&self.rate_limits)?;
        let before = map.len();
        map.retain(|_, entry| !entry.is_stale(now));
        Ok(before - map.len())
    }
}
