//! Proxy configuration.

use crate::address::is_blank;
use crate::error::ProxyError;

/// Default scheme recognised by the proxy driver.
pub const DEFAULT_PROXY_SCHEME: &str = "jdbc:savepointpgproxy:";

/// Default scheme of the wrapped real driver.
pub const DEFAULT_WRAPPED_SCHEME: &str = "jdbc:postgresql:";

/// Default registry name of the wrapped real driver.
pub const DEFAULT_WRAPPED_DRIVER_NAME: &str = "postgresql";

/// Configuration for the proxy driver.
///
/// This struct is marked `#[non_exhaustive]`; construct it with
/// [`ProxyConfig::new()`] and the builder methods.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ProxyConfig {
    /// Address prefix the proxy accepts.
    pub proxy_scheme: String,

    /// Address prefix substituted in before delegating to the real driver.
    pub wrapped_scheme: String,

    /// Registry name used to locate the real driver.
    pub wrapped_driver_name: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            proxy_scheme: DEFAULT_PROXY_SCHEME.to_string(),
            wrapped_scheme: DEFAULT_WRAPPED_SCHEME.to_string(),
            wrapped_driver_name: DEFAULT_WRAPPED_DRIVER_NAME.to_string(),
        }
    }
}

impl ProxyConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scheme the proxy accepts.
    #[must_use]
    pub fn proxy_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.proxy_scheme = scheme.into();
        self
    }

    /// Set the scheme of the wrapped driver.
    #[must_use]
    pub fn wrapped_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.wrapped_scheme = scheme.into();
        self
    }

    /// Set the registry name of the wrapped driver.
    #[must_use]
    pub fn wrapped_driver_name(mut self, name: impl Into<String>) -> Self {
        self.wrapped_driver_name = name.into();
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ProxyError> {
        if is_blank(&self.proxy_scheme) {
            return Err(ProxyError::Configuration(
                "proxy_scheme must not be blank".into(),
            ));
        }
        if is_blank(&self.wrapped_scheme) {
            return Err(ProxyError::Configuration(
                "wrapped_scheme must not be blank".into(),
            ));
        }
        if is_blank(&self.wrapped_driver_name) {
            return Err(ProxyError::Configuration(
                "wrapped_driver_name must not be blank".into(),
            ));
        }
        if self.proxy_scheme == self.wrapped_scheme {
            return Err(ProxyError::Configuration(
                "proxy_scheme and wrapped_scheme must differ".into(),
            ));
        }
        Ok(())
    }
}
