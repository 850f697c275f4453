//! # savepoint-proxy
//!
//! Savepoint-aware connection sharing in front of a real database driver.
//!
//! The proxy driver accepts addresses with its own scheme, rewrites them to
//! the wrapped driver's scheme, and hands back a shared connection for each
//! `(address without query, properties)` pair. A connection inside a
//! savepoint scope is never handed to a second caller, and idle connections
//! are closed opportunistically while savepoint scopes may be open.
//!
//! ## Features
//!
//! - Pooling keyed by canonical address and properties
//! - Reuse of the first inactive connection in a bucket
//! - Inline cleanup on each request, no background reaper
//! - One process-wide critical section around get-or-create
//! - Explicit driver registration through [`DriverRegistry`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use savepoint_proxy::{DriverRegistry, Properties, ProxyConfig, ProxyDriver};
//!
//! let registry = DriverRegistry::global();
//! registry.register(postgres_driver)?;
//! let proxy = ProxyDriver::register(registry, ProxyConfig::new())?;
//!
//! let props = Properties::new().with("user", "app");
//! let conn = proxy
//!     .connect("jdbc:savepointpgproxy://localhost/app?ssl=true", &props)
//!     .await?;
//!
//! proxy.set_proxy_active(true);
//! let scope = conn.enter_scope();
//! // conn is not shared or closed by cleanup while `scope` lives
//! drop(scope);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod address;
pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
pub mod key;
pub mod pool;
pub mod registry;

pub use config::ProxyConfig;
pub use connection::{Connection, ConnectionState, ProxyConnection, SavepointScope};
pub use driver::{Driver, ProxyDriver};
pub use error::{ProxyError, Result};
pub use key::{ConnectionKey, Properties};
pub use pool::{ConnectionPool, PoolStatus};
pub use registry::DriverRegistry;
