//! Dispatch-State: persistence for courier dispatch
//!
//! ## Layer 0 - Data/Persistence
//!
//! Owns the record types the dispatch engine works on (rules, couriers,
//! shipments, audit events, SLA policies), the async storage traits the
//! services are written against, and two implementations of them:
//!
//! - `MemoryDispatchStore`: in-process fake used by tests, with failure injection
//! - `SurrealDispatchStore`: SurrealDB backend (`mem://`, `surrealkv://`, `ws(s)://`)
//!
//! Courier load is never stored; both backends derive it from shipment rows
//! at read time.

pub mod connection;
mod error;
pub mod fakes;
pub mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use connection::{Credentials, StoreConfig};
pub use error::{StateError, StorageError};
pub use fakes::MemoryDispatchStore;
pub use schema::{CourierRow, EventRow, PolicyRow, RuleRow, ShipmentRow};
pub use storage_traits::{
    Courier, CourierId, CourierLoad, CourierStatus, DeliveryStatus, DispatchRule, DispatchStore,
    EventKind, EventLog, FleetStore, RuleId, RuleStore, ServiceLevel, Shipment, ShipmentEvent,
    ShipmentId, ShipmentStore, SlaPolicy, SlaPolicyId, SlaPolicyStore, StorageResult,
    UnknownVariant,
};
pub use surreal_store::SurrealDispatchStore;

/// Result type for dispatch-state operations
pub type Result<T> = std::result::Result<T, StateError>;
