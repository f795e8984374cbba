// src/analyzer/keys.rs
//
// Round-robin pool of analyzer API keys. A rate-limited key cools down and
// comes back; a key that keeps failing is retired for the process lifetime.

use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    Available,
    RateLimited,
    Retired,
}

#[derive(Debug)]
struct KeySlot {
    key: String,
    status: KeyStatus,
    error_count: u32,
    cooldown_until: Option<Instant>,
}

/// A key handed out for one request. Report the outcome back by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeasedKey {
    pub index: usize,
    pub key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyReport {
    pub index: usize,
    pub status: KeyStatus,
    pub error_count: u32,
}

struct PoolInner {
    slots: Vec<KeySlot>,
    next: usize,
}

pub struct ApiKeyPool {
    inner: Mutex<PoolInner>,
    max_errors: u32,
}

impl ApiKeyPool {
    pub fn new(keys: Vec<String>, max_errors: u32) -> Self {
        let slots = keys
            .into_iter()
            .filter(|k| !k.trim().is_empty())
            .map(|key| KeySlot {
                key: key.trim().to_string(),
                status: KeyStatus::Available,
                error_count: 0,
                cooldown_until: None,
            })
            .collect();
        Self {
            inner: Mutex::new(PoolInner { slots, next: 0 }),
            max_errors: max_errors.max(1),
        }
    }

    /// Comma-separated list, as stored in an environment variable.
    pub fn from_csv(csv: &str, max_errors: u32) -> Self {
        Self::new(csv.split(',').map(str::to_string).collect(), max_errors)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn acquire(&self) -> Option<LeasedKey> {
        self.acquire_at(Instant::now())
    }

    /// Next usable key in rotation; None when every key is cooling down or
    /// retired.
    pub fn acquire_at(&self, now: Instant) -> Option<LeasedKey> {
        let mut inner = self.inner.lock();
        let n = inner.slots.len();
        for _ in 0..n {
            let index = inner.next;
            inner.next = (inner.next + 1) % n;

            let slot = &mut inner.slots[index];
            match slot.status {
                KeyStatus::Available => {}
                KeyStatus::RateLimited if slot.cooldown_until.map_or(true, |t| now >= t) => {
                    slot.status = KeyStatus::Available;
                    slot.error_count = 0;
                    slot.cooldown_until = None;
                }
                _ => continue,
            }
            return Some(LeasedKey {
                index,
                key: slot.key.clone(),
            });
        }
        None
    }

    pub fn mark_success(&self, index: usize) {
        if let Some(slot) = self.inner.lock().slots.get_mut(index) {
            slot.error_count = 0;
        }
    }

    pub fn mark_rate_limited(&self, index: usize, cooldown: Duration) {
        self.mark_rate_limited_at(index, cooldown, Instant::now());
    }

    pub fn mark_rate_limited_at(&self, index: usize, cooldown: Duration, now: Instant) {
        if let Some(slot) = self.inner.lock().slots.get_mut(index) {
            slot.status = KeyStatus::RateLimited;
            slot.cooldown_until = Some(now + cooldown);
            slot.error_count += 1;
            info!("Analyzer key {} rate limited for {:?}", index + 1, cooldown);
        }
    }

    pub fn mark_error(&self, index: usize) {
        if let Some(slot) = self.inner.lock().slots.get_mut(index) {
            slot.error_count += 1;
            if slot.error_count >= self.max_errors && slot.status != KeyStatus::Retired {
                slot.status = KeyStatus::Retired;
                warn!(
                    "Analyzer key {} retired after {} consecutive errors",
                    index + 1,
                    slot.error_count
                );
            }
        }
    }

    pub fn report(&self) -> Vec<KeyReport> {
        self.inner
            .lock()
            .slots
            .iter()
            .enumerate()
            .map(|(index, s)| KeyReport {
                index,
                status: s.status,
                error_count: s.error_count,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin() {
        let pool = ApiKeyPool::from_csv("a, b ,,c", 3);
        assert_eq!(pool.len(), 3);
        let keys: Vec<String> = (0..4).map(|_| pool.acquire().unwrap().key).collect();
        assert_eq!(keys, vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn test_rate_limited_key_returns_after_cooldown() {
        let pool = ApiKeyPool::from_csv("a,b", 3);
        let t0 = Instant::now();
        pool.mark_rate_limited_at(0, Duration::from_secs(60), t0);

        assert_eq!(pool.acquire_at(t0).unwrap().key, "b");
        assert_eq!(pool.acquire_at(t0).unwrap().key, "b");

        let later = t0 + Duration::from_secs(61);
        let keys: Vec<String> = (0..2).map(|_| pool.acquire_at(later).unwrap().key).collect();
        assert!(keys.contains(&"a".to_string()));
    }

    #[test]
    fn test_repeated_errors_retire_key() {
        let pool = ApiKeyPool::from_csv("a", 3);
        pool.mark_error(0);
        pool.mark_error(0);
        assert!(pool.acquire().is_some());
        pool.mark_error(0);
        assert!(pool.acquire().is_none());
        assert_eq!(pool.report()[0].status, KeyStatus::Retired);
    }

    #[test]
    fn test_success_resets_error_count() {
        let pool = ApiKeyPool::from_csv("a", 3);
        pool.mark_error(0);
        pool.mark_error(0);
        pool.mark_success(0);
        pool.mark_error(0);
        assert!(pool.acquire().is_some());
    }

    #[test]
    fn test_empty_pool() {
        let pool = ApiKeyPool::from_csv("", 3);
        assert!(pool.is_empty());
        assert!(pool.acquire().is_none());
    }
}
