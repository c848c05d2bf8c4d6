//! # EchoTrace Hub Scenario Suite
//!
//! Cross-subsystem flows driven through the bus, the way nodes would.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── harness.rs        # TestHub fixture, simulated nodes
//! └── integration/
//!     ├── narrative_unlock.rs
//!     ├── config_push.rs
//!     ├── liveness.rs
//!     └── resilience.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p et-tests
//! cargo test -p et-tests integration::config_push::
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod harness;
pub mod integration;
