//! Ports for the Node Registry
//!
//! The registry's driven side is shared with every subsystem
//! (`shared_types::EventSink`, `shared_types::TimeSource`), so only the
//! driving API lives here.

pub mod inbound;
