//! Error taxonomy for dispatch services.

use dispatch_state::StorageError;

/// Dispatch service errors.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("shipment not found: {0}")]
    ShipmentNotFound(String),

    #[error("no shipment with tracking id: {0}")]
    TrackingNotFound(String),

    #[error("invalid dispatch rule: {0}")]
    InvalidRule(String),

    #[error("invalid SLA policy: {0}")]
    InvalidSlaPolicy(String),

    #[error("invalid shipment: {0}")]
    InvalidShipment(String),

    /// Every commit attempt lost the capacity race.
    #[error("assignment conflict for shipment {shipment_id} after {attempts} attempts")]
    AssignmentConflict { shipment_id: String, attempts: u32 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl DispatchError {
    /// Lift `StorageError::ShipmentNotFound` into the service-level variant.
    pub(crate) fn from_shipment_lookup(err: StorageError) -> Self {
        match err {
            StorageError::ShipmentNotFound { shipment_id } => {
                DispatchError::ShipmentNotFound(shipment_id)
            }
            other => DispatchError::Storage(other),
        }
    }
}

/// Result type for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
