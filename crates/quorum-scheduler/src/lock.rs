//! Named mutual-exclusion locks backed by the shared store.
//!
//! Commands mutating a job may come from independent processes sharing the
//! same store, so these are store-backed locks, not in-process mutexes. A
//! lock is held under a random token; release only deletes the key when the
//! token still matches, so an expired holder cannot free a successor's lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use backoff::ExponentialBackoff;
use redis::aio::ConnectionManager;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::SchedulerError;

/// Default bound on how long `acquire` waits before giving up.
const DEFAULT_WAIT: Duration = Duration::from_secs(5);

/// Default lock TTL; a crashed holder cannot wedge a job past this.
const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// First retry delay when the lock is contended.
const INITIAL_RETRY: Duration = Duration::from_millis(25);

/// Ceiling on the retry delay.
const MAX_RETRY: Duration = Duration::from_millis(500);

/// One attempt at taking or releasing a named lock.
#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Take the lock if free (or expired). `true` when acquired.
    async fn try_acquire(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, SchedulerError>;

    /// Release the lock, but only if `token` still holds it.
    async fn release(&self, key: &str, token: &str) -> Result<(), SchedulerError>;
}

/// Named locks with bounded-wait acquisition and scoped release.
#[derive(Clone)]
pub struct LockRegistry {
    backend: Arc<dyn LockBackend>,
    wait_timeout: Duration,
    ttl: Duration,
}

impl LockRegistry {
    pub fn new(backend: Arc<dyn LockBackend>) -> Self {
        Self {
            backend,
            wait_timeout: DEFAULT_WAIT,
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Acquire the lock named `key`, waiting with exponential backoff up to
    /// the configured bound.
    ///
    /// Contention past the bound is [`SchedulerError::LockTimeout`]; an
    /// unreachable backend fails fast with [`SchedulerError::LockUnavailable`].
    /// The same logical actor must not acquire a key it already holds.
    pub async fn acquire(&self, key: &str) -> Result<LockGuard, SchedulerError> {
        let token = Uuid::new_v4().simple().to_string();
        let policy = ExponentialBackoff {
            initial_interval: INITIAL_RETRY,
            max_interval: MAX_RETRY,
            max_elapsed_time: Some(self.wait_timeout),
            ..ExponentialBackoff::default()
        };

        backoff::future::retry(policy, || async {
            match self.backend.try_acquire(key, &token, self.ttl).await {
                Ok(true) => Ok(()),
                Ok(false) => Err(backoff::Error::transient(SchedulerError::LockTimeout(
                    key.to_string(),
                ))),
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await?;

        Ok(LockGuard {
            backend: Arc::clone(&self.backend),
            key: key.to_string(),
            token,
            released: false,
        })
    }
}

/// Scoped hold on a named lock.
///
/// Prefer [`LockGuard::release`] at the end of the critical section; if the
/// guard is dropped instead (early return, error, cancellation), the release
/// is spawned in the background so the lock is freed on every exit path.
#[must_use = "dropping the guard releases the lock"]
pub struct LockGuard {
    backend: Arc<dyn LockBackend>,
    key: String,
    token: String,
    released: bool,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the lock now, surfacing any backend failure.
    pub async fn release(mut self) -> Result<(), SchedulerError> {
        self.released = true;
        self.backend.release(&self.key, &self.token).await
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let backend = Arc::clone(&self.backend);
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(error) = backend.release(&key, &token).await {
                    warn!(key = %key, %error, "failed to release dropped lock");
                }
            });
        } else {
            warn!(key = %key, "lock guard dropped outside a runtime; lock held until TTL");
        }
    }
}

/// In-process backend for tests and single-node runs.
pub struct MemoryLockBackend {
    held: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryLockBackend {
    pub fn new() -> Self {
        Self {
            held: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryLockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LockBackend for MemoryLockBackend {
    async fn try_acquire(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, SchedulerError> {
        let mut held = self.held.lock().await;
        if let Some((_, expires)) = held.get(key)
            && *expires > Instant::now()
        {
            return Ok(false);
        }
        held.insert(key.to_string(), (token.to_string(), Instant::now() + ttl));
        Ok(true)
    }

    async fn release(&self, key: &str, token: &str) -> Result<(), SchedulerError> {
        let mut held = self.held.lock().await;
        if held.get(key).is_some_and(|(holder, _)| holder == token) {
            held.remove(key);
        }
        Ok(())
    }
}

/// Shared-store backend: SET NX PX to take, compare-and-delete to release.
pub struct RedisLockBackend {
    conn: ConnectionManager,
    prefix: String,
}

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

impl RedisLockBackend {
    pub fn new(conn: ConnectionManager, prefix: &str) -> Self {
        Self {
            conn,
            prefix: prefix.to_string(),
        }
    }

    fn lock_key(&self, key: &str) -> String {
        format!("{}:lock:{}", self.prefix, key)
    }
}

#[async_trait]
impl LockBackend for RedisLockBackend {
    async fn try_acquire(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, SchedulerError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.lock_key(key))
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| SchedulerError::LockUnavailable(e.to_string()))?;
        Ok(reply.is_some())
    }

    async fn release(&self, key: &str, token: &str) -> Result<(), SchedulerError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(self.lock_key(key))
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| SchedulerError::LockUnavailable(e.to_string()))?;
        Ok(())
    }
}
