//! # Adapters
//!
//! Port implementations connecting subsystems to each other, and the
//! transport the hub process runs on.

pub mod registry_directory;
pub mod transport;

pub use registry_directory::RegistryDirectory;
pub use transport::HubTransport;
