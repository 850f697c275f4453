//! Process-wide driver registry.
//!
//! Drivers are registered explicitly by the hosting process; nothing is
//! registered as a side effect of loading a type.

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::connection::Connection;
use crate::driver::Driver;
use crate::error::{ProxyError, Result};
use crate::key::Properties;

static GLOBAL_REGISTRY: Lazy<DriverRegistry> = Lazy::new(DriverRegistry::new);

/// An ordered set of drivers with unique names.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: RwLock<Vec<Arc<dyn Driver>>>,
}

impl DriverRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    #[must_use]
    pub fn global() -> &'static DriverRegistry {
        &GLOBAL_REGISTRY
    }

    /// Register a driver.
    ///
    /// Fails with [`ProxyError::Configuration`] if a driver with the same
    /// name is already registered.
    pub fn register(&self, driver: Arc<dyn Driver>) -> Result<()> {
        let mut drivers = self.drivers.write();
        if drivers.iter().any(|d| d.name() == driver.name()) {
            return Err(ProxyError::Configuration(format!(
                "driver already registered: {}",
                driver.name()
            )));
        }
        tracing::debug!(driver = driver.name(), "registered driver");
        drivers.push(driver);
        Ok(())
    }

    /// Remove the driver with `name`, returning it.
    pub fn deregister(&self, name: &str) -> Option<Arc<dyn Driver>> {
        let mut drivers = self.drivers.write();
        let index = drivers.iter().position(|d| d.name() == name)?;
        Some(drivers.remove(index))
    }

    /// Find the driver registered under `name`.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<Arc<dyn Driver>> {
        self.drivers
            .read()
            .iter()
            .find(|d| d.name() == name)
            .cloned()
    }

    /// Snapshot of registered drivers, in registration order.
    #[must_use]
    pub fn drivers(&self) -> Vec<Arc<dyn Driver>> {
        self.drivers.read().clone()
    }

    /// Connect through the first registered driver that accepts `address`.
    pub async fn connect(&self, address: &str, properties: &Properties) -> Result<Box<dyn Connection>> {
        let driver = self
            .drivers
            .read()
            .iter()
            .find(|d| d.accepts(address))
            .cloned()
            .ok_or_else(|| ProxyError::UnsupportedAddress(address.to_string()))?;
        driver.connect(address, properties).await
    }
}
