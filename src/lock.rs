//! Lease-based distributed mutex over Redis.
//!
//! Acquisition is `SET key token NX PX ttl`; release is a Lua
//! compare-and-delete that only removes the key while it still holds this
//! handle's token. The lease is best-effort mutual exclusion over a single
//! store — there is no fencing, only "lease plus owner-token release".

use std::time::Duration;

use redis::Client;
use uuid::Uuid;

use crate::error::LockError;

/// Atomically delete the key only if it still carries our token.
const UNLOCK_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Per-handle lease policy.
#[derive(Debug, Clone)]
pub struct LockOptions {
  pub ttl: Duration,
  pub max_retries: u32,
  pub retry_delay: Duration,
}

impl Default for LockOptions {
  fn default() -> LockOptions {
    LockOptions {
      ttl: Duration::from_secs(3),
      max_retries: 3,
      retry_delay: Duration::from_millis(100),
    }
  }
}

/// Factory for [`DistributedLock`] handles sharing a client and default
/// options.
#[derive(Clone)]
pub struct LockManager {
  client: Client,
  defaults: LockOptions,
}

impl LockManager {
  pub fn new(client: Client) -> LockManager {
    LockManager {
      client,
      defaults: LockOptions::default(),
    }
  }

  pub fn with_options(client: Client, defaults: LockOptions) -> LockManager {
    LockManager { client, defaults }
  }

  /// A lock handle for `key` with the manager's default policy. Each
  /// handle carries a fresh owner token.
  pub fn locker(&self, key: impl Into<String>) -> Result<DistributedLock, LockError> {
    self.locker_with(key, self.defaults.clone())
  }

  pub fn locker_with(
    &self,
    key: impl Into<String>,
    options: LockOptions,
  ) -> Result<DistributedLock, LockError> {
    let key = key.into();
    if key.is_empty() {
      return Err(LockError::InvalidArguments);
    }
    Ok(DistributedLock {
      key,
      token: Uuid::new_v4().to_string(),
      client: self.client.clone(),
      options,
    })
  }
}

/// A single lock instance. The token distinguishes this holder from any
/// other handle on the same key.
pub struct DistributedLock {
  key: String,
  token: String,
  client: Client,
  options: LockOptions,
}

impl DistributedLock {
  /// One acquisition attempt; never retries.
  pub async fn try_lock(&self) -> Result<bool, LockError> {
    let mut conn = self.client.get_multiplexed_tokio_connection().await?;
    let set: Option<String> = redis::cmd("SET")
      .arg(&self.key)
      .arg(&self.token)
      .arg("NX")
      .arg("PX")
      .arg(self.options.ttl.as_millis() as u64)
      .query_async(&mut conn)
      .await?;

    let acquired = set.is_some();
    if acquired {
      tracing::debug!(key = %self.key, ttl_ms = self.options.ttl.as_millis() as u64, "lock acquired");
    } else {
      tracing::trace!(key = %self.key, "lock already held elsewhere");
    }
    Ok(acquired)
  }

  /// Acquire with bounded retry, sleeping `retry_delay` between attempts.
  /// Dropping the future between attempts cancels the acquisition.
  pub async fn lock(&self) -> Result<(), LockError> {
    for attempt in 0..=self.options.max_retries {
      if self.try_lock().await? {
        return Ok(());
      }
      if attempt < self.options.max_retries {
        tokio::time::sleep(self.options.retry_delay).await;
      }
    }
    tracing::warn!(key = %self.key, retries = self.options.max_retries, "lock acquisition exhausted");
    Err(LockError::AcquisitionExhausted(self.options.max_retries))
  }

  /// Release the lock; fails with [`LockError::NotHeld`] when the key is
  /// gone or carries another holder's token.
  pub async fn unlock(&self) -> Result<(), LockError> {
    let mut conn = self.client.get_multiplexed_tokio_connection().await?;
    let deleted: i64 = redis::Script::new(UNLOCK_SCRIPT)
      .key(&self.key)
      .arg(&self.token)
      .invoke_async(&mut conn)
      .await?;

    if deleted == 1 {
      tracing::debug!(key = %self.key, "lock released");
      Ok(())
    } else {
      tracing::warn!(key = %self.key, "lock not released: token mismatch or expired");
      Err(LockError::NotHeld)
    }
  }

  pub fn key(&self) -> &str {
    &self.key
  }

  /// The owner token this handle would have written to the store.
  pub fn token(&self) -> &str {
    &self.token
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn manager() -> LockManager {
    LockManager::new(Client::open("redis://127.0.0.1/").unwrap())
  }

  #[test]
  fn empty_key_is_rejected() {
    assert!(matches!(
      manager().locker(""),
      Err(LockError::InvalidArguments)
    ));
  }

  #[test]
  fn handles_get_distinct_tokens() {
    let manager = manager();
    let a = manager.locker("locks:settle").unwrap();
    let b = manager.locker("locks:settle").unwrap();
    assert_eq!(a.key(), "locks:settle");
    assert_ne!(a.token(), b.token());
  }

  // The remaining tests need a Redis instance at localhost:6379.
  // Run: `docker run -p 6379:6379 redis`

  #[tokio::test]
  #[ignore]
  async fn lock_excludes_a_second_holder() {
    let manager = manager();
    let first = manager.locker("locks:test:exclusive").unwrap();
    let second = manager
      .locker_with(
        "locks:test:exclusive",
        LockOptions {
          ttl: Duration::from_secs(3),
          max_retries: 1,
          retry_delay: Duration::from_millis(10),
        },
      )
      .unwrap();

    first.lock().await.unwrap();
    assert!(matches!(
      second.lock().await,
      Err(LockError::AcquisitionExhausted(_))
    ));
    first.unlock().await.unwrap();
  }

  #[tokio::test]
  #[ignore]
  async fn unlock_by_non_holder_leaves_the_key() {
    let manager = manager();
    let holder = manager.locker("locks:test:owner").unwrap();
    let intruder = manager.locker("locks:test:owner").unwrap();

    assert!(holder.try_lock().await.unwrap());
    assert!(matches!(intruder.unlock().await, Err(LockError::NotHeld)));
    // The rightful holder can still release.
    holder.unlock().await.unwrap();
    assert!(matches!(holder.unlock().await, Err(LockError::NotHeld)));
  }
}
