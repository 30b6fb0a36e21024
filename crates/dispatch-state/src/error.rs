//! Error types for dispatch-state

use thiserror::Error;

/// Errors raised while connecting to or preparing the state backend
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Errors returned by the storage traits
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("dispatch rule not found: {rule_id}")]
    RuleNotFound { rule_id: String },

    #[error("shipment not found: {shipment_id}")]
    ShipmentNotFound { shipment_id: String },

    #[error("courier not found: {courier_id}")]
    CourierNotFound { courier_id: String },

    #[error("SLA policy not found: {policy_id}")]
    SlaPolicyNotFound { policy_id: String },

    /// The courier already carries `max_active` active shipments, so a
    /// capacity-guarded assignment was refused.
    #[error("courier {courier_id} is at capacity ({max_active} active shipments)")]
    CapacityExceeded { courier_id: String, max_active: u32 },

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<StateError> for StorageError {
    fn from(err: StateError) -> Self {
        StorageError::Backend(err.to_string())
    }
}
