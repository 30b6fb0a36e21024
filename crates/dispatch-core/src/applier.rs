//! Assignment Applier: commits a courier choice and records the handoff.

use std::sync::Arc;

use dispatch_state::{
    CourierId, EventKind, EventLog, ShipmentEvent, ShipmentId, ShipmentStore, StorageResult,
};
use tracing::debug;

/// Title of the audit event written for every assignment change.
pub const ASSIGNMENT_EVENT_TITLE: &str = "Assignment updated";

/// Note attached to the handoff event.
pub fn assignment_note(courier_id: Option<&CourierId>) -> String {
    match courier_id {
        Some(courier) => format!("Assigned to courier {courier}"),
        None => "Courier unassigned".to_string(),
    }
}

/// Writes assignments through a store and appends the matching audit event.
pub struct AssignmentApplier<S> {
    store: Arc<S>,
}

impl<S> Clone for AssignmentApplier<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> AssignmentApplier<S>
where
    S: ShipmentStore + EventLog,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Set or clear the shipment's courier, then append a `handoff` event.
    ///
    /// With `guard = Some(cap)` the store refuses the write with
    /// `StorageError::CapacityExceeded` when the courier is already at `cap`;
    /// no event is written in that case.
    pub async fn apply(
        &self,
        shipment_id: &ShipmentId,
        courier_id: Option<&CourierId>,
        guard: Option<u32>,
    ) -> StorageResult<()> {
        self.store
            .assign_courier(shipment_id, courier_id, guard)
            .await?;

        debug!(
            shipment_id = %shipment_id,
            courier_id = ?courier_id,
            guard = ?guard,
            "assignment written"
        );

        self.store
            .append_event(ShipmentEvent::new(
                shipment_id.clone(),
                ASSIGNMENT_EVENT_TITLE,
                Some(assignment_note(courier_id)),
                EventKind::Handoff,
            ))
            .await
    }
}
