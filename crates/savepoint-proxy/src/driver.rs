//! Driver capability trait and the proxy driver.

use std::sync::Arc;

use crate::address::{accepts_scheme, rewrite_scheme};
use crate::config::ProxyConfig;
use crate::connection::{Connection, ProxyConnection};
use crate::error::{ProxyError, Result};
use crate::key::{ConnectionKey, Properties};
use crate::pool::ConnectionPool;
use crate::registry::DriverRegistry;

/// A database driver that opens connections for the addresses it accepts.
#[async_trait::async_trait]
pub trait Driver: Send + Sync {
    /// Registry name of this driver.
    fn name(&self) -> &str;

    /// Check if this driver handles `address`.
    fn accepts(&self, address: &str) -> bool;

    /// Open a connection to `address`.
    async fn connect(&self, address: &str, properties: &Properties) -> Result<Box<dyn Connection>>;
}

/// Driver that shares real connections between callers.
///
/// Accepts addresses using [`ProxyConfig::proxy_scheme`], rewrites them to
/// [`ProxyConfig::wrapped_scheme`] and delegates opening to the wrapped
/// driver. Connections are shared through a [`ConnectionPool`].
pub struct ProxyDriver {
    config: ProxyConfig,
    wrapped: Arc<dyn Driver>,
    pool: ConnectionPool,
}

impl ProxyDriver {
    /// Registry name of the proxy driver.
    pub const NAME: &'static str = "savepoint-proxy";

    /// Create a proxy in front of `wrapped`.
    pub fn new(wrapped: Arc<dyn Driver>, config: ProxyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            wrapped,
            pool: ConnectionPool::new(),
        })
    }

    /// Locate the wrapped driver in `registry`, build the proxy and register
    /// it in the same registry.
    ///
    /// Fails with [`ProxyError::WrappedDriverNotFound`] if no driver named
    /// [`ProxyConfig::wrapped_driver_name`] is registered.
    pub fn register(registry: &DriverRegistry, config: ProxyConfig) -> Result<Arc<Self>> {
        let wrapped = registry
            .find(&config.wrapped_driver_name)
            .ok_or_else(|| ProxyError::WrappedDriverNotFound(config.wrapped_driver_name.clone()))?;

        let proxy = Arc::new(Self::new(wrapped, config)?);
        registry.register(Arc::clone(&proxy) as Arc<dyn Driver>)?;

        tracing::info!(
            proxy_scheme = %proxy.config.proxy_scheme,
            wrapped_driver = %proxy.config.wrapped_driver_name,
            "registered savepoint proxy driver"
        );
        Ok(proxy)
    }

    /// Check if `address` is non-blank and uses the proxy scheme.
    #[must_use]
    pub fn accepts(&self, address: &str) -> bool {
        accepts_scheme(address, &self.config.proxy_scheme)
    }

    /// Get a shared connection for `address` and `properties`.
    ///
    /// The pooling key is derived from `address` without its query suffix;
    /// the wrapped driver receives the full rewritten address.
    pub async fn connect(&self, address: &str, properties: &Properties) -> Result<ProxyConnection> {
        if !self.accepts(address) {
            return Err(ProxyError::UnsupportedAddress(address.to_string()));
        }

        let wrapped_address = rewrite_scheme(
            address,
            &self.config.proxy_scheme,
            &self.config.wrapped_scheme,
        );
        let key = ConnectionKey::new(address, properties);
        tracing::debug!(
            address = key.canonical_address(),
            properties = properties.len(),
            "derived connection key"
        );

        self.pool
            .get_or_create(key, || self.open(&wrapped_address, properties))
            .await
    }

    async fn open(&self, address: &str, properties: &Properties) -> Result<ProxyConnection> {
        let real = self.wrapped.connect(address, properties).await?;
        let conn = ProxyConnection::new(real, address);
        tracing::info!(
            connection_id = conn.id(),
            driver = self.wrapped.name(),
            "opened real connection"
        );
        Ok(conn)
    }

    /// Set the process-wide proxy-activity flag.
    ///
    /// Set by transaction-boundary code while savepoint scopes may be open.
    /// Cleanup only closes idle connections while this flag is set.
    pub fn set_proxy_active(&self, active: bool) {
        self.pool.set_proxy_active(active);
    }

    /// Get the process-wide proxy-activity flag.
    #[must_use]
    pub fn is_proxy_active(&self) -> bool {
        self.pool.is_proxy_active()
    }

    /// The connection pool backing this driver.
    #[must_use]
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// The proxy configuration.
    #[must_use]
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// The driver connections are delegated to.
    #[must_use]
    pub fn wrapped_driver(&self) -> &Arc<dyn Driver> {
        &self.wrapped
    }
}

#[async_trait::async_trait]
impl Driver for ProxyDriver {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn accepts(&self, address: &str) -> bool {
        ProxyDriver::accepts(self, address)
    }

    async fn connect(&self, address: &str, properties: &Properties) -> Result<Box<dyn Connection>> {
        let conn = ProxyDriver::connect(self, address, properties).await?;
        Ok(Box::new(conn))
    }
}
