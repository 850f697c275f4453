//! Mock real driver for tests.
//!
//! [`MockDriver`] opens [`MockConnection`]s without any I/O. Each opened
//! connection shares its state with a [`MockConnectionHandle`] retained by
//! the driver, so a test can flip autocommit, simulate a server-side
//! disconnect, or make the next close fail.
//!
//! ```rust,ignore
//! let driver = MockDriver::postgres().with_open_latency(Duration::from_millis(50));
//! driver.fail_next_open("connection refused");
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use savepoint_proxy::config::{DEFAULT_WRAPPED_DRIVER_NAME, DEFAULT_WRAPPED_SCHEME};
use savepoint_proxy::{Connection, Driver, Properties, ProxyError, Result};

#[derive(Debug)]
struct ConnectionState {
    id: usize,
    address: String,
    properties: Properties,
    closed: AtomicBool,
    auto_commit: AtomicBool,
    close_calls: AtomicUsize,
    closed_checks: AtomicUsize,
    fail_close: AtomicBool,
    fail_checks: AtomicBool,
    report_closed_after: Mutex<Option<usize>>,
}

/// Observer and control handle for one mock connection.
#[derive(Debug, Clone)]
pub struct MockConnectionHandle {
    state: Arc<ConnectionState>,
}

impl MockConnectionHandle {
    /// Open order of this connection within its driver, starting at 0.
    #[must_use]
    pub fn id(&self) -> usize {
        self.state.id
    }

    /// Address the driver was asked to connect to.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.state.address
    }

    /// Properties the driver was given.
    #[must_use]
    pub fn properties(&self) -> &Properties {
        &self.state.properties
    }

    /// Check if the connection has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Number of successful `close()` calls on the real connection.
    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.state.close_calls.load(Ordering::SeqCst)
    }

    /// Number of `is_closed()` queries answered so far.
    #[must_use]
    pub fn closed_checks(&self) -> usize {
        self.state.closed_checks.load(Ordering::SeqCst)
    }

    /// Change the autocommit mode as if a transaction began or ended.
    pub fn set_auto_commit(&self, enabled: bool) {
        self.state.auto_commit.store(enabled, Ordering::SeqCst);
    }

    /// Make `close()` fail with a transport error.
    pub fn set_fail_close(&self, fail: bool) {
        self.state.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Make `is_closed()` and `auto_commit()` fail with a transport error.
    pub fn set_fail_checks(&self, fail: bool) {
        self.state.fail_checks.store(fail, Ordering::SeqCst);
    }

    /// Simulate the server dropping the connection.
    pub fn disconnect(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }

    /// Report the connection closed starting with `is_closed()` query
    /// number `checks + 1`.
    pub fn report_closed_after(&self, checks: usize) {
        *self.state.report_closed_after.lock() = Some(self.closed_checks() + checks);
    }
}

/// Connection returned by [`MockDriver`].
#[derive(Debug)]
pub struct MockConnection {
    state: Arc<ConnectionState>,
}

impl MockConnection {
    fn check_transport(&self) -> Result<()> {
        if self.state.fail_checks.load(Ordering::SeqCst) {
            return Err(ProxyError::io("mock transport failure"));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Connection for MockConnection {
    async fn close(&mut self) -> Result<()> {
        if self.state.fail_close.load(Ordering::SeqCst) {
            return Err(ProxyError::io("mock close failure"));
        }
        self.state.closed.store(true, Ordering::SeqCst);
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn is_closed(&self) -> Result<bool> {
        self.check_transport()?;
        let checks = self.state.closed_checks.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(after) = *self.state.report_closed_after.lock() {
            if checks > after {
                self.state.closed.store(true, Ordering::SeqCst);
            }
        }
        Ok(self.state.closed.load(Ordering::SeqCst))
    }

    async fn auto_commit(&self) -> Result<bool> {
        self.check_transport()?;
        Ok(self.state.auto_commit.load(Ordering::SeqCst))
    }

    async fn set_auto_commit(&mut self, enabled: bool) -> Result<()> {
        self.check_transport()?;
        self.state.auto_commit.store(enabled, Ordering::SeqCst);
        Ok(())
    }
}

/// In-process stand-in for a real database driver.
#[derive(Debug)]
pub struct MockDriver {
    name: String,
    scheme: String,
    open_latency: Duration,
    default_auto_commit: bool,
    opens: AtomicUsize,
    fail_next_open: Mutex<Option<String>>,
    connections: Mutex<Vec<MockConnectionHandle>>,
}

impl MockDriver {
    /// Create a driver with the given registry name and accepted scheme.
    #[must_use]
    pub fn new(name: impl Into<String>, scheme: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scheme: scheme.into(),
            open_latency: Duration::ZERO,
            default_auto_commit: true,
            opens: AtomicUsize::new(0),
            fail_next_open: Mutex::new(None),
            connections: Mutex::new(Vec::new()),
        }
    }

    /// A driver named and schemed like the default wrapped driver.
    #[must_use]
    pub fn postgres() -> Arc<Self> {
        Arc::new(Self::new(DEFAULT_WRAPPED_DRIVER_NAME, DEFAULT_WRAPPED_SCHEME))
    }

    /// Sleep for `latency` inside every `connect()`.
    #[must_use]
    pub fn with_open_latency(mut self, latency: Duration) -> Self {
        self.open_latency = latency;
        self
    }

    /// Autocommit mode of newly opened connections (default: on).
    #[must_use]
    pub fn with_auto_commit(mut self, enabled: bool) -> Self {
        self.default_auto_commit = enabled;
        self
    }

    /// Make the next `connect()` fail with a transport error.
    pub fn fail_next_open(&self, message: impl Into<String>) {
        *self.fail_next_open.lock() = Some(message.into());
    }

    /// Number of `connect()` calls, including failed ones.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Handles to every connection opened so far, in open order.
    #[must_use]
    pub fn connections(&self) -> Vec<MockConnectionHandle> {
        self.connections.lock().clone()
    }

    /// Handle to the connection opened `index`-th, if any.
    #[must_use]
    pub fn connection(&self, index: usize) -> Option<MockConnectionHandle> {
        self.connections.lock().get(index).cloned()
    }
}

#[async_trait::async_trait]
impl Driver for MockDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self, address: &str) -> bool {
        address.starts_with(&self.scheme)
    }

    async fn connect(&self, address: &str, properties: &Properties) -> Result<Box<dyn Connection>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if !self.open_latency.is_zero() {
            tokio::time::sleep(self.open_latency).await;
        }
        if let Some(message) = self.fail_next_open.lock().take() {
            tracing::debug!(driver = %self.name, %message, "mock open failure");
            return Err(ProxyError::ConnectionIo(message));
        }

        let mut connections = self.connections.lock();
        let state = Arc::new(ConnectionState {
            id: connections.len(),
            address: address.to_string(),
            properties: properties.clone(),
            closed: AtomicBool::new(false),
            auto_commit: AtomicBool::new(self.default_auto_commit),
            close_calls: AtomicUsize::new(0),
            closed_checks: AtomicUsize::new(0),
            fail_close: AtomicBool::new(false),
            fail_checks: AtomicBool::new(false),
            report_closed_after: Mutex::new(None),
        });
        connections.push(MockConnectionHandle {
            state: Arc::clone(&state),
        });
        tracing::trace!(driver = %self.name, address, "mock connection opened");
        Ok(Box::new(MockConnection { state }))
    }
}
