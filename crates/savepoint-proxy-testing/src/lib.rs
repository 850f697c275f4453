//! # savepoint-proxy-testing
//!
//! Test infrastructure for savepoint-proxy development.
//!
//! Provides an in-process [`MockDriver`] that stands in for the real
//! database driver. Every connection it opens exposes a
//! [`MockConnectionHandle`] so tests can observe closes and inject
//! transport failures without a database.
//!
//! ## Example
//!
//! ```rust,ignore
//! use savepoint_proxy::{DriverRegistry, ProxyConfig, ProxyDriver};
//! use savepoint_proxy_testing::MockDriver;
//!
//! #[tokio::test]
//! async fn test_with_mock_driver() {
//!     let registry = DriverRegistry::new();
//!     let real = MockDriver::postgres();
//!     registry.register(real.clone()).unwrap();
//!
//!     let proxy = ProxyDriver::register(&registry, ProxyConfig::new()).unwrap();
//!     // proxy.connect("jdbc:savepointpgproxy://...", &props).await
//!     assert_eq!(real.open_count(), 0);
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod mock_driver;

pub use mock_driver::{MockConnection, MockConnectionHandle, MockDriver};
