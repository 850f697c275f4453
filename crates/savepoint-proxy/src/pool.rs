//! Savepoint-aware connection pool.
//!
//! The pool maps each [`ConnectionKey`] to a bucket of [`ProxyConnection`]s
//! in insertion order. A request for a key reuses the first inactive entry
//! of its bucket, or opens a new real connection when there is none.
//!
//! ```text
//! get_or_create(key)
//!   -> no bucket          -> open, create bucket, return
//!   -> bucket exists      -> cleanup(bucket)
//!                         -> first entry with active == false
//!                            -> none, or it is closed -> open, append, return
//!                            -> otherwise             -> return it
//! ```
//!
//! The whole sequence runs under one process-wide lock, across all keys.
//! Opening a real connection happens while that lock is held, so a slow
//! open for one key delays requests for every other key.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::connection::ProxyConnection;
use crate::error::Result;
use crate::key::ConnectionKey;

/// Check whether cleanup may close a connection.
///
/// A connection is closed only when it is still open, some savepoint scope
/// may be open in the process, it is not itself inside a scope, and it has
/// no uncommitted work (autocommit on).
#[must_use]
pub fn is_eligible_for_cleanup(
    closed: bool,
    proxy_active: bool,
    active: bool,
    auto_commit: bool,
) -> bool {
    !closed && proxy_active && !active && auto_commit
}

/// Keyed pool of proxy connections.
pub struct ConnectionPool {
    buckets: RwLock<HashMap<ConnectionKey, Vec<ProxyConnection>>>,
    connect_lock: tokio::sync::Mutex<()>,
    proxy_active: AtomicBool,
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionPool {
    /// Create an empty pool with the proxy-activity flag cleared.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            connect_lock: tokio::sync::Mutex::new(()),
            proxy_active: AtomicBool::new(false),
        }
    }

    /// Return a reusable connection for `key`, or one freshly opened by
    /// `open`.
    ///
    /// `open` is called at most once, and only when no reusable connection
    /// exists. Errors from `open` and from the cleanup pass are returned
    /// unchanged.
    pub async fn get_or_create<F, Fut>(&self, key: ConnectionKey, open: F) -> Result<ProxyConnection>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ProxyConnection>>,
    {
        let _serialized = self.connect_lock.lock().await;

        let existing = self.buckets.read().get(&key).cloned();
        let Some(bucket) = existing else {
            let conn = open().await?;
            tracing::info!(
                address = key.canonical_address(),
                connection_id = conn.id(),
                "opened first connection for key"
            );
            self.buckets.write().insert(key, vec![conn.clone()]);
            return Ok(conn);
        };

        let bucket = self.cleanup(bucket).await?;
        self.buckets.write().insert(key.clone(), bucket.clone());

        // The first inactive entry is taken even if it turns out to be
        // closed; later open entries are not considered.
        let candidate = bucket.iter().find(|conn| !conn.is_active()).cloned();
        if let Some(conn) = candidate {
            if !conn.is_closed().await? {
                tracing::debug!(
                    address = key.canonical_address(),
                    connection_id = conn.id(),
                    bucket_len = bucket.len(),
                    "reusing inactive connection"
                );
                return Ok(conn);
            }
        }

        let conn = open().await?;
        let mut buckets = self.buckets.write();
        let entries = buckets.entry(key.clone()).or_default();
        entries.push(conn.clone());
        tracing::info!(
            address = key.canonical_address(),
            connection_id = conn.id(),
            bucket_len = entries.len(),
            "opened additional connection for key"
        );
        Ok(conn)
    }

    /// Close every eligible connection in `bucket`, then drop every closed
    /// one.
    ///
    /// The first close failure aborts the pass and is returned; nothing is
    /// removed in that case.
    async fn cleanup(&self, bucket: Vec<ProxyConnection>) -> Result<Vec<ProxyConnection>> {
        for conn in &bucket {
            if self.can_close(conn).await? {
                tracing::trace!(connection_id = conn.id(), "closing idle connection");
                if let Err(err) = conn.close().await {
                    tracing::warn!(
                        connection_id = conn.id(),
                        error = %err,
                        "failed to close idle connection, aborting cleanup"
                    );
                    return Err(err);
                }
            }
        }

        let mut retained = Vec::with_capacity(bucket.len());
        for conn in bucket {
            if conn.is_closed().await? {
                tracing::trace!(connection_id = conn.id(), closed = true, "removing connection");
            } else {
                retained.push(conn);
            }
        }
        Ok(retained)
    }

    async fn can_close(&self, conn: &ProxyConnection) -> Result<bool> {
        let closed = conn.is_closed().await?;
        let proxy_active = self.is_proxy_active();
        let active = conn.is_active();
        // Autocommit is only queried on open, inactive connections.
        let auto_commit = if !closed && proxy_active && !active {
            conn.auto_commit().await?
        } else {
            false
        };
        Ok(is_eligible_for_cleanup(closed, proxy_active, active, auto_commit))
    }

    /// Set the process-wide proxy-activity flag.
    pub fn set_proxy_active(&self, active: bool) {
        self.proxy_active.store(active, Ordering::Release);
    }

    /// Get the process-wide proxy-activity flag.
    #[must_use]
    pub fn is_proxy_active(&self) -> bool {
        self.proxy_active.load(Ordering::Acquire)
    }

    /// Snapshot of the bucket for `key`, in insertion order.
    #[must_use]
    pub fn bucket(&self, key: &ConnectionKey) -> Option<Vec<ProxyConnection>> {
        self.buckets.read().get(key).cloned()
    }

    /// Number of connections in the bucket for `key` (0 if there is none).
    #[must_use]
    pub fn bucket_len(&self, key: &ConnectionKey) -> usize {
        self.buckets.read().get(key).map_or(0, Vec::len)
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let buckets = self.buckets.read();
        let mut status = PoolStatus {
            buckets: buckets.len(),
            ..PoolStatus::default()
        };
        for conn in buckets.values().flatten() {
            status.connections += 1;
            if conn.is_active() {
                status.active += 1;
            }
        }
        status
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatus {
    /// Number of keys with a bucket.
    pub buckets: usize,
    /// Total connections across all buckets, including ones that closed
    /// since the last cleanup of their bucket.
    pub connections: usize,
    /// Connections currently inside a savepoint scope.
    pub active: usize,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::connection::tests::FakeConnection;
    use crate::error::ProxyError;
    use crate::key::Properties;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn key(address: &str) -> ConnectionKey {
        ConnectionKey::new(address, &Properties::new().with("user", "app"))
    }

    fn fresh() -> ProxyConnection {
        ProxyConnection::new(Box::new(FakeConnection::new(true)), "real:h/db")
    }

    async fn seed(pool: &ConnectionPool, k: &ConnectionKey, conn: ProxyConnection) {
        let got = pool
            .get_or_create(k.clone(), move || async move { Ok(conn) })
            .await
            .unwrap();
        assert_eq!(pool.bucket_len(k), 1);
        drop(got);
    }

    #[test]
    fn test_eligibility_truth_table() {
        for bits in 0u8..16 {
            let closed = bits & 1 != 0;
            let proxy_active = bits & 2 != 0;
            let active = bits & 4 != 0;
            let auto_commit = bits & 8 != 0;
            let expected = !closed && proxy_active && !active && auto_commit;
            assert_eq!(
                is_eligible_for_cleanup(closed, proxy_active, active, auto_commit),
                expected,
                "closed={closed} proxy_active={proxy_active} active={active} auto_commit={auto_commit}"
            );
        }
    }

    #[tokio::test]
    async fn test_first_request_creates_bucket() {
        let pool = ConnectionPool::new();
        let k = key("proxy:h/db");
        assert!(pool.bucket(&k).is_none());

        let conn = pool.get_or_create(k.clone(), || async { Ok(fresh()) }).await.unwrap();
        let bucket = pool.bucket(&k).unwrap();
        assert_eq!(bucket.len(), 1);
        assert!(bucket[0].ptr_eq(&conn));
    }

    #[tokio::test]
    async fn test_reuses_inactive_connection() {
        let pool = ConnectionPool::new();
        let k = key("proxy:h/db");
        let first = pool.get_or_create(k.clone(), || async { Ok(fresh()) }).await.unwrap();

        let second = pool
            .get_or_create(k.clone(), || async { Err(ProxyError::io("must not open")) })
            .await
            .unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!(pool.bucket_len(&k), 1);
    }

    #[tokio::test]
    async fn test_active_connection_not_shared() {
        let pool = ConnectionPool::new();
        let k = key("proxy:h/db");
        let first = pool.get_or_create(k.clone(), || async { Ok(fresh()) }).await.unwrap();
        first.set_active(true);

        let second = pool.get_or_create(k.clone(), || async { Ok(fresh()) }).await.unwrap();
        assert!(!first.ptr_eq(&second));
        assert_eq!(pool.bucket_len(&k), 2);
    }

    #[tokio::test]
    async fn test_open_error_propagates_without_bucket() {
        let pool = ConnectionPool::new();
        let k = key("proxy:h/db");
        let result = pool
            .get_or_create(k.clone(), || async { Err(ProxyError::io("refused")) })
            .await;
        assert!(matches!(result, Err(ProxyError::ConnectionIo(_))));
        assert!(pool.bucket(&k).is_none());
    }

    #[tokio::test]
    async fn test_cleanup_closes_only_eligible_connections() {
        for bits in 0u8..16 {
            let closed = bits & 1 != 0;
            let proxy_active = bits & 2 != 0;
            let active = bits & 4 != 0;
            let auto_commit = bits & 8 != 0;

            let pool = ConnectionPool::new();
            let k = key("proxy:h/db");
            let fake = FakeConnection {
                closed,
                ..FakeConnection::new(auto_commit)
            };
            let closes = Arc::clone(&fake.closes);
            seed(&pool, &k, ProxyConnection::new(Box::new(fake), "real:h/db")).await;

            let seeded = pool.bucket(&k).unwrap().remove(0);
            seeded.set_active(active);
            pool.set_proxy_active(proxy_active);

            pool.get_or_create(k.clone(), || async { Ok(fresh()) }).await.unwrap();

            let expected = !closed && proxy_active && !active && auto_commit;
            assert_eq!(
                closes.load(Ordering::SeqCst) == 1,
                expected,
                "closed={closed} proxy_active={proxy_active} active={active} auto_commit={auto_commit}"
            );
        }
    }

    #[tokio::test]
    async fn test_cleanup_removes_closed_entries() {
        let pool = ConnectionPool::new();
        let k = key("proxy:h/db");
        let first = pool.get_or_create(k.clone(), || async { Ok(fresh()) }).await.unwrap();
        first.set_active(true);
        let second = pool.get_or_create(k.clone(), || async { Ok(fresh()) }).await.unwrap();
        assert_eq!(pool.bucket_len(&k), 2);

        // Closed by the caller, not by cleanup.
        first.close().await.unwrap();

        let third = pool.get_or_create(k.clone(), || async { Ok(fresh()) }).await.unwrap();
        assert!(third.ptr_eq(&second));
        let bucket = pool.bucket(&k).unwrap();
        assert_eq!(bucket.len(), 1);
        assert!(bucket[0].ptr_eq(&second));
    }

    #[tokio::test]
    async fn test_cleanup_failure_aborts_request() {
        let pool = ConnectionPool::new();
        let k = key("proxy:h/db");
        let failing = FakeConnection {
            fail_close: true,
            ..FakeConnection::new(true)
        };
        seed(&pool, &k, ProxyConnection::new(Box::new(failing), "real:h/db")).await;
        pool.set_proxy_active(true);

        let opens = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&opens);
        let result = pool
            .get_or_create(k.clone(), || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(fresh())
            })
            .await;

        assert!(matches!(result, Err(ProxyError::ConnectionIo(_))));
        assert_eq!(opens.load(Ordering::SeqCst), 0);
        assert_eq!(pool.bucket_len(&k), 1);
    }

    #[tokio::test]
    async fn test_cleanup_skips_auto_commit_for_ineligible() {
        let pool = ConnectionPool::new();
        let k = key("proxy:h/db");
        let fake = FakeConnection {
            fail_auto_commit: true,
            ..FakeConnection::new(true)
        };
        seed(&pool, &k, ProxyConnection::new(Box::new(fake), "real:h/db")).await;
        let seeded = pool.bucket(&k).unwrap().remove(0);

        // Proxy flag off: autocommit is never queried.
        let got = pool.get_or_create(k.clone(), || async { Ok(fresh()) }).await.unwrap();
        assert!(got.ptr_eq(&seeded));

        // Flag on but the connection is inside a scope.
        pool.set_proxy_active(true);
        seeded.set_active(true);
        let got = pool.get_or_create(k.clone(), || async { Ok(fresh()) }).await.unwrap();
        assert!(!got.ptr_eq(&seeded));
        assert_eq!(pool.bucket_len(&k), 2);

        // Eligible by flags: the autocommit query runs and its error aborts.
        seeded.set_active(false);
        let result = pool.get_or_create(k.clone(), || async { Ok(fresh()) }).await;
        assert!(matches!(result, Err(ProxyError::ConnectionIo(_))));
    }

    #[tokio::test]
    async fn test_status_counts() {
        let pool = ConnectionPool::new();
        let a = pool.get_or_create(key("proxy:a"), || async { Ok(fresh()) }).await.unwrap();
        a.set_active(true);
        pool.get_or_create(key("proxy:a"), || async { Ok(fresh()) }).await.unwrap();
        pool.get_or_create(key("proxy:b"), || async { Ok(fresh()) }).await.unwrap();

        assert_eq!(
            pool.status(),
            PoolStatus {
                buckets: 2,
                connections: 3,
                active: 1,
            }
        );
    }

    #[test]
    fn test_proxy_active_flag() {
        let pool = ConnectionPool::default();
        assert!(!pool.is_proxy_active());
        pool.set_proxy_active(true);
        assert!(pool.is_proxy_active());
        pool.set_proxy_active(false);
        assert!(!pool.is_proxy_active());
    }
}
