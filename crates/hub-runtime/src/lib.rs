//! # Hub Runtime Library
//!
//! Wires the EchoTrace subsystems to the message bus and exposes the
//! dashboard-facing controller. The `hub-runtime` binary is a thin shell
//! around [`HubRuntime`].
//!
//! ```text
//!  nodes ──▶ MessageBus ──▶ InboundRouter ─┬─▶ et-01 Node Registry
//!                ▲                         ├─▶ et-02 Narrative ──unlock/state──┐
//!                │                         └─▶ et-03 Config Dispatcher ─config─┤
//!                └─────────────────────────────────────────────────────────────┘
//!
//!  every subsystem ──append──▶ et-04 Event Log ──▶ CSV per day
//!  dashboard ──▶ HubController ──▶ subsystems
//! ```
//!
//! ## Modules
//!
//! - `container/` - configuration and subsystem wiring
//! - `adapters/` - port implementations connecting subsystems, and the
//!   MQTT or in-memory transport
//! - `handlers/` - the inbound router
//! - `controller` - dashboard operations
//! - `runtime` - startup and graceful shutdown

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod container;
pub mod controller;
pub mod handlers;
pub mod runtime;

pub use adapters::HubTransport;
pub use container::{BrokerConfig, BrokerTransport, ConfigError, HubConfig, HubContainer, RosterNode};
pub use controller::{ControllerError, ControllerResult, HubController, HubOverview};
pub use handlers::{InboundRouter, RouteOutcome, RouterStats};
pub use runtime::HubRuntime;
