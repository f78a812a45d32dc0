//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// In-process message bus on tokio broadcast channels.
pub mod bus;

/// Exchange-local and manual clocks.
pub mod clock;

/// Configuration and dependency injection.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// MOEX ISS HTTP client and wire decoding.
pub mod iss;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Cursor persistence (JSON file, in-memory).
pub mod persistence;

/// OpenTelemetry tracing integration.
pub mod telemetry;
