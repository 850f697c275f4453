//! Connection capability traits and the proxy connection wrapper.
//!
//! Real backend connections and [`ProxyConnection`] implement the same
//! [`Connection`] trait, so a caller holding a `Box<dyn Connection>` cannot
//! tell whether it was handed out by the proxy or by a real driver.
//!
//! ## State Transitions
//!
//! ```text
//! OpenInactive -> OpenActive (via set_active(true) or enter_scope())
//! OpenActive -> OpenInactive (via set_active(false) or scope drop)
//! OpenInactive | OpenActive -> Closed (via close(), including cleanup)
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::{ProxyError, Result};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Operations shared by real and proxy connections.
///
/// Backends map their transport failures into [`ProxyError::ConnectionIo`].
#[async_trait::async_trait]
pub trait Connection: Send + Sync {
    /// Close the connection.
    async fn close(&mut self) -> Result<()>;

    /// Check whether the connection is closed.
    async fn is_closed(&self) -> Result<bool>;

    /// Get the autocommit mode.
    async fn auto_commit(&self) -> Result<bool>;

    /// Set the autocommit mode.
    async fn set_auto_commit(&mut self, enabled: bool) -> Result<()>;

    /// Check if the connection is inside a savepoint scope.
    ///
    /// Real backend connections are never shared, so the default is `false`.
    fn is_active(&self) -> bool {
        false
    }

    /// Mark the connection as entering or leaving a savepoint scope.
    ///
    /// The default ignores the call.
    fn set_active(&self, _active: bool) {}
}

/// Runtime state of a proxy connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Open and not inside a savepoint scope.
    OpenInactive,
    /// Open and inside a savepoint scope.
    OpenActive,
    /// Closed. Terminal.
    Closed,
}

impl ConnectionState {
    /// Check if the connection may be handed to a new caller.
    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Self::OpenInactive)
    }

    /// Check if no further transitions are possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

struct Inner {
    id: u64,
    real: tokio::sync::Mutex<Box<dyn Connection>>,
    closed: AtomicBool,
    active: AtomicBool,
    address: parking_lot::Mutex<String>,
}

/// A shared handle to one real connection plus pooling metadata.
///
/// Cloning the handle does not open anything; all clones refer to the same
/// real connection. The pool keeps one clone in its bucket and hands
/// another to the caller.
#[derive(Clone)]
pub struct ProxyConnection {
    inner: Arc<Inner>,
}

impl ProxyConnection {
    /// Wrap a real connection that was opened against `address`.
    pub fn new(real: Box<dyn Connection>, address: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
                real: tokio::sync::Mutex::new(real),
                closed: AtomicBool::new(false),
                active: AtomicBool::new(false),
                address: parking_lot::Mutex::new(address.into()),
            }),
        }
    }

    /// Process-unique identifier of this connection.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Check if two handles refer to the same real connection.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Close the real connection.
    ///
    /// Closing an already closed connection is a no-op. If the real
    /// connection fails to close, the error is returned and the connection
    /// stays open.
    pub async fn close(&self) -> Result<()> {
        let mut real = self.inner.real.lock().await;
        if self.inner.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        real.close().await?;
        self.inner.closed.store(true, Ordering::Release);
        tracing::debug!(connection_id = self.inner.id, "proxy connection closed");
        Ok(())
    }

    /// Check whether the connection is closed.
    ///
    /// Asks the real connection unless this handle already knows it is
    /// closed. A real connection that reports itself closed is recorded as
    /// closed here too.
    pub async fn is_closed(&self) -> Result<bool> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Ok(true);
        }
        let real = self.inner.real.lock().await;
        let closed = real.is_closed().await?;
        if closed {
            self.inner.closed.store(true, Ordering::Release);
        }
        Ok(closed)
    }

    /// Get the autocommit mode of the real connection.
    pub async fn auto_commit(&self) -> Result<bool> {
        self.ensure_open()?;
        self.inner.real.lock().await.auto_commit().await
    }

    /// Set the autocommit mode of the real connection.
    pub async fn set_auto_commit(&self, enabled: bool) -> Result<()> {
        self.ensure_open()?;
        self.inner.real.lock().await.set_auto_commit(enabled).await
    }

    /// Check if the connection is inside a savepoint scope.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Mark the connection as entering (`true`) or leaving (`false`) a
    /// savepoint scope. Never touches the real connection.
    pub fn set_active(&self, active: bool) {
        self.inner.active.store(active, Ordering::Release);
    }

    /// Mark the connection active until the returned guard is dropped.
    #[must_use = "the scope ends as soon as the guard is dropped"]
    pub fn enter_scope(&self) -> SavepointScope {
        self.set_active(true);
        SavepointScope { conn: self.clone() }
    }

    /// Current state, derived from the in-memory flags only.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        if self.inner.closed.load(Ordering::Acquire) {
            ConnectionState::Closed
        } else if self.is_active() {
            ConnectionState::OpenActive
        } else {
            ConnectionState::OpenInactive
        }
    }

    /// Record the real address this connection was opened with.
    pub fn set_connection_address(&self, address: impl Into<String>) {
        *self.inner.address.lock() = address.into();
    }

    /// The real address this connection was opened with.
    #[must_use]
    pub fn connection_address(&self) -> String {
        self.inner.address.lock().clone()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(ProxyError::ConnectionClosed);
        }
        Ok(())
    }
}

impl fmt::Debug for ProxyConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConnection")
            .field("id", &self.inner.id)
            .field("address", &*self.inner.address.lock())
            .field("state", &self.state())
            .finish()
    }
}

#[async_trait::async_trait]
impl Connection for ProxyConnection {
    async fn close(&mut self) -> Result<()> {
        ProxyConnection::close(self).await
    }

    async fn is_closed(&self) -> Result<bool> {
        ProxyConnection::is_closed(self).await
    }

    async fn auto_commit(&self) -> Result<bool> {
        ProxyConnection::auto_commit(self).await
    }

    async fn set_auto_commit(&mut self, enabled: bool) -> Result<()> {
        ProxyConnection::set_auto_commit(self, enabled).await
    }

    fn is_active(&self) -> bool {
        ProxyConnection::is_active(self)
    }

    fn set_active(&self, active: bool) {
        ProxyConnection::set_active(self, active);
    }
}

/// Guard that keeps a connection active for the duration of a savepoint
/// scope.
#[derive(Debug)]
pub struct SavepointScope {
    conn: ProxyConnection,
}

impl SavepointScope {
    /// The connection this scope is holding active.
    #[must_use]
    pub fn connection(&self) -> &ProxyConnection {
        &self.conn
    }
}

impl Drop for SavepointScope {
    fn drop(&mut self) {
        self.conn.set_active(false);
    }
}
