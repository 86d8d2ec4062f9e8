//! Dual-bucket admission control for outbound requests
//!
//! The server enforces two independent limits: one per companion connection
//! and one per account. Both buckets for an identity sit behind a single
//! mutex so a check-then-consume sequence is atomic across the pair.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::constants::{
    ACCOUNT_BUCKET_CAPACITY, ACCOUNT_BUCKET_REFRESH_AMOUNT, BUCKET_REFRESH_INTERVAL,
    CONNECTION_BUCKET_CAPACITY, CONNECTION_BUCKET_REFRESH_AMOUNT,
};
use crate::core::token_bucket::TokenBucket;
use crate::error::{CompanionError, Result};
use crate::identity::ServerIdentity;

struct BucketPair {
    connection: TokenBucket,
    account: TokenBucket,
}

/// Admission controller shared by every client talking through this process.
pub struct RateLimiter {
    buckets: Mutex<HashMap<ServerIdentity, BucketPair>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate both buckets for a new connection. Must be called before any
    /// other operation for that identity.
    pub async fn register(&self, identity: &ServerIdentity) {
        let mut buckets = self.buckets.lock().await;
        buckets.insert(
            identity.clone(),
            BucketPair {
                connection: TokenBucket::new(
                    CONNECTION_BUCKET_CAPACITY,
                    BUCKET_REFRESH_INTERVAL,
                    CONNECTION_BUCKET_REFRESH_AMOUNT,
                ),
                account: TokenBucket::new(
                    ACCOUNT_BUCKET_CAPACITY,
                    BUCKET_REFRESH_INTERVAL,
                    ACCOUNT_BUCKET_REFRESH_AMOUNT,
                ),
            },
        );
    }

    /// Release both buckets.
    pub async fn unregister(&self, identity: &ServerIdentity) {
        let mut buckets = self.buckets.lock().await;
        buckets.remove(identity);
    }

    /// Refill both buckets and check that each can cover `cost`.
    pub async fn can_consume(&self, identity: &ServerIdentity, cost: u32) -> Result<bool> {
        let mut buckets = self.buckets.lock().await;
        let pair = Self::pair_mut(&mut buckets, identity)?;
        for bucket in [&mut pair.connection, &mut pair.account] {
            bucket.refill();
            if !bucket.can_consume(cost as f64) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Deduct `cost` from both buckets, re-validating under the lock first.
    ///
    /// Normal call sites go through the admission loop and have already seen
    /// `can_consume` succeed; the re-validation only guards against losing
    /// that race to another caller.
    pub async fn consume(&self, identity: &ServerIdentity, cost: u32) -> Result<()> {
        let mut buckets = self.buckets.lock().await;
        let pair = Self::pair_mut(&mut buckets, identity)?;
        for bucket in [&mut pair.connection, &mut pair.account] {
            bucket.refill();
            if !bucket.can_consume(cost as f64) {
                return Err(CompanionError::RateLimited("Not enough tokens".to_string()));
            }
        }
        pair.connection.consume(cost as f64);
        pair.account.consume(cost as f64);
        Ok(())
    }

    /// How long until both buckets could cover `cost`, rounded up to avoid
    /// retrying fractionally early. Zero if already satisfiable.
    pub async fn estimated_wait(&self, identity: &ServerIdentity, cost: u32) -> Result<Duration> {
        let buckets = self.buckets.lock().await;
        let pair = Self::pair(&buckets, identity)?;
        let mut delay: f64 = 0.0;
        for bucket in [&pair.connection, &pair.account] {
            let needed = (cost as f64 - bucket.level()) / bucket.refresh_per_second();
            let val = ((needed + 0.1) * 100.0).ceil() / 100.0;
            if val > delay {
                delay = val;
            }
        }
        Ok(Duration::from_secs_f64(delay.max(0.0)))
    }

    /// Current (connection, account) levels, for monitoring.
    pub async fn levels(&self, identity: &ServerIdentity) -> Result<(f64, f64)> {
        let mut buckets = self.buckets.lock().await;
        let pair = Self::pair_mut(&mut buckets, identity)?;
        pair.connection.refill();
        pair.account.refill();
        Ok((pair.connection.level(), pair.account.level()))
    }

    fn pair<'a>(
        buckets: &'a HashMap<ServerIdentity, BucketPair>,
        identity: &ServerIdentity,
    ) -> Result<&'a BucketPair> {
        buckets.get(identity).ok_or_else(|| {
            CompanionError::ConfigError(format!("no rate limit buckets registered for {}", identity))
        })
    }

    fn pair_mut<'a>(
        buckets: &'a mut HashMap<ServerIdentity, BucketPair>,
        identity: &ServerIdentity,
    ) -> Result<&'a mut BucketPair> {
        buckets.get_mut(identity).ok_or_else(|| {
            CompanionError::ConfigError(format!("no rate limit buckets registered for {}", identity))
        })
    }
}
