//! # Container Module
//!
//! Configuration and subsystem lifecycle.

pub mod config;
pub mod subsystems;

pub use config::{BrokerConfig, BrokerTransport, ConfigError, HubConfig, RosterNode};
pub use subsystems::HubContainer;
