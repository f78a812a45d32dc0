//! Application Layer - Use cases and port definitions.
//!
//! Services that drive collection cycles, and the port interfaces they use
//! to reach the upstream API, the bus, the cursor store and the clock.

/// Port interfaces for external systems.
pub mod ports;

/// Collection services: rate limiting, pagination, metrics, scheduling.
pub mod services;
