//! rk-core: Core abstractions and configuration for the remote kernel connector
//!
//! This crate provides the shared domain types, the configuration store
//! abstraction and the connector configuration used by the tunnel and
//! connector crates.

pub mod config;
pub mod error;
pub mod secret;
pub mod store;
pub mod types;

pub use error::ConfigError;
pub use secret::Secret;
pub use store::ConfigStore;
pub use types::{AuthMethod, ConnectionInfo, ConnectionStatus, KernelInfo, ServerId};
