use anyhow::Result;
use moka::future::Cache;
use moka::ops::compute::Op;
use std::time::Duration;

// Deletes the key only while it still carries the caller's token.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Per-claim-token mutual exclusion around the check-pay-update sequence.
///
/// Redis `SET NX EX` is used when available so several instances share the
/// lock; otherwise an in-process cache entry stands in. Both expire after the
/// TTL so a crashed holder cannot block a claim forever. Each holder stores a
/// random token and only that token can release the lock, so a holder whose
/// lease already expired cannot free a newer holder's lock.
pub struct ClaimLock {
    redis: Option<redis::aio::ConnectionManager>,
    memory: Cache<String, String>,
    ttl: Duration,
}

/// Proof of holding the lock for one claim token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    key: String,
    token: String,
}

impl ClaimLock {
    pub async fn new(redis_url: Option<&str>, ttl_secs: u64) -> Result<Self> {
        let redis = match redis_url {
            Some(url) => match redis::Client::open(url) {
                Ok(client) => match client.get_connection_manager().await {
                    Ok(conn) => {
                        tracing::info!("Redis connected successfully, claim locks are shared");
                        Some(conn)
                    }
                    Err(e) => {
                        tracing::warn!("Redis connection failed: {}, using in-process claim locks", e);
                        None
                    }
                },
                Err(e) => {
                    tracing::warn!("Redis client creation failed: {}, using in-process claim locks", e);
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            redis,
            memory: Self::memory_cache(ttl_secs),
            ttl: Duration::from_secs(ttl_secs),
        })
    }

    pub fn in_memory(ttl_secs: u64) -> Self {
        Self {
            redis: None,
            memory: Self::memory_cache(ttl_secs),
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    // No capacity bound: entries leave only through release or the TTL.
    fn memory_cache(ttl_secs: u64) -> Cache<String, String> {
        Cache::builder()
            .time_to_live(Duration::from_secs(ttl_secs))
            .build()
    }

    fn key(claim_hash: &str) -> String {
        format!("claim-lock:{}", claim_hash)
    }

    pub fn is_shared(&self) -> bool {
        self.redis.is_some()
    }

    /// Returns `None` while another claim for this token holds the lock.
    pub async fn try_acquire(&self, claim_hash: &str) -> Option<LockLease> {
        let lease = LockLease {
            key: Self::key(claim_hash),
            token: uuid::Uuid::new_v4().simple().to_string(),
        };

        if let Some(mut redis) = self.redis.clone() {
            let acquired: redis::RedisResult<Option<String>> = redis::cmd("SET")
                .arg(&lease.key)
                .arg(&lease.token)
                .arg("NX")
                .arg("EX")
                .arg(self.ttl.as_secs())
                .query_async(&mut redis)
                .await;

            match acquired {
                Ok(reply) => return reply.map(|_| lease),
                Err(e) => tracing::warn!("Redis lock error: {}, falling back to memory", e),
            }
        }

        let entry = self
            .memory
            .entry(lease.key.clone())
            .or_insert(lease.token.clone())
            .await;

        entry.is_fresh().then_some(lease)
    }

    /// Frees the lock if `lease` still owns it. A lease that expired and was
    /// taken over by another claim leaves the new holder untouched.
    pub async fn release(&self, lease: LockLease) {
        if let Some(mut redis) = self.redis.clone() {
            let released: redis::RedisResult<i64> = redis::Script::new(RELEASE_SCRIPT)
                .key(&lease.key)
                .arg(&lease.token)
                .invoke_async(&mut redis)
                .await;

            match released {
                Ok(0) => tracing::warn!("Claim lock {} expired before release", lease.key),
                Ok(_) => {}
                Err(e) => tracing::warn!("Redis unlock error for {}: {}", lease.key, e),
            }
        }

        let LockLease { key, token } = lease;
        self.memory
            .entry(key)
            .and_compute_with(|current| {
                let owned = current.is_some_and(|entry| entry.value() == &token);
                std::future::ready(if owned { Op::Remove } else { Op::Nop })
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_fails_until_release() {
        let lock = ClaimLock::in_memory(60);

        let lease = lock.try_acquire("abc").await.unwrap();
        assert!(lock.try_acquire("abc").await.is_none());
        assert!(lock.try_acquire("other").await.is_some());

        lock.release(lease).await;
        assert!(lock.try_acquire("abc").await.is_some());
    }

    #[tokio::test]
    async fn expired_lock_can_be_taken_over() {
        let lock = ClaimLock::in_memory(1);

        let _stale = lock.try_acquire("abc").await.unwrap();
        tokio::time::sleep(Duration::from_millis(1300)).await;

        assert!(lock.try_acquire("abc").await.is_some());
    }

    #[tokio::test]
    async fn stale_lease_does_not_release_new_holder() {
        let lock = ClaimLock::in_memory(1);

        let stale = lock.try_acquire("abc").await.unwrap();
        tokio::time::sleep(Duration::from_millis(1300)).await;
        let current = lock.try_acquire("abc").await.unwrap();

        lock.release(stale).await;
        assert!(lock.try_acquire("abc").await.is_none());

        lock.release(current).await;
        assert!(lock.try_acquire("abc").await.is_some());
    }

    #[tokio::test]
    async fn leases_carry_distinct_tokens() {
        let lock = ClaimLock::in_memory(60);

        let first = lock.try_acquire("a").await.unwrap();
        let second = lock.try_acquire("b").await.unwrap();
        assert_ne!(first.token, second.token);
    }

    #[tokio::test]
    async fn no_redis_url_means_local_locks() {
        let lock = ClaimLock::new(None, 60).await.unwrap();
        assert!(!lock.is_shared());
    }
}
