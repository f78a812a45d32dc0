//! Port Interfaces
//!
//! Contracts the collector depends on, implemented by infrastructure
//! adapters.
//!
//! ## Driven Ports (Outbound)
//!
//! - `TradeSourcePort`: paginated upstream trades API
//! - `BusPublisherPort`: keyed message bus
//! - `CursorStorePort`: durable progress cursor
//! - `ClockPort`: exchange-local time

mod bus_publisher_port;
mod clock_port;
mod cursor_store_port;
mod trade_source_port;

#[cfg(test)]
pub use bus_publisher_port::MockBusPublisherPort;
pub use bus_publisher_port::{BusMessage, BusPublisherPort, NoOpBusPublisher, PublishError};
pub use clock_port::ClockPort;
pub use cursor_store_port::{CursorStoreError, CursorStorePort};
pub use trade_source_port::{
    PageRequest, SkipReason, SourceError, TradePage, TradeSourcePort,
};
