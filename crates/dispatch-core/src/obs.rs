//! Structured observability hooks for dispatch decisions.
//!
//! Provides shipment-scoped spans and one emission function per lifecycle
//! event. Events are emitted at `info!` level unless noted; filter with
//! `DISPATCH_LOG`.
//!
//! Spans are attached with `tracing::Instrument` so they stay correct across
//! `.await` points.

use tracing::{info, warn};

use crate::engine::SelectionBasis;

/// Span tagging every event of one shipment's assignment.
pub fn decision_span(shipment_id: &str) -> tracing::Span {
    tracing::info_span!("dispatch.decision", shipment_id = %shipment_id)
}

/// Span covering one bulk assignment call.
pub fn batch_span(requested: usize) -> tracing::Span {
    tracing::info_span!("dispatch.batch", requested = requested)
}

fn basis_label(basis: &SelectionBasis) -> String {
    match basis {
        SelectionBasis::Rule { rule_id, .. } => format!("rule:{rule_id}"),
        SelectionBasis::Fallback => "fallback".to_string(),
    }
}

/// Emit event: the engine chose a courier and the store accepted it.
pub fn emit_assignment_committed(
    shipment_id: &str,
    courier_id: &str,
    basis: &SelectionBasis,
    active_shipments: u32,
) {
    info!(
        event = "assignment.committed",
        shipment_id = %shipment_id,
        courier_id = %courier_id,
        basis = %basis_label(basis),
        active_shipments = active_shipments,
    );
}

/// Emit event: no eligible courier for the shipment.
pub fn emit_assignment_unassigned(shipment_id: &str, region: Option<&str>) {
    info!(
        event = "assignment.unassigned",
        shipment_id = %shipment_id,
        region = region.unwrap_or("-"),
    );
}

/// Emit event: a capacity-guarded commit was refused (warning level).
pub fn emit_commit_conflict(shipment_id: &str, courier_id: &str, attempt: u32) {
    warn!(
        event = "assignment.commit_conflict",
        shipment_id = %shipment_id,
        courier_id = %courier_id,
        attempt = attempt,
    );
}

/// Emit event: a bulk assignment finished.
pub fn emit_batch_finished(requested: usize, assigned: usize) {
    info!(
        event = "batch.finished",
        requested = requested,
        assigned = assigned,
        unassigned = requested.saturating_sub(assigned),
    );
}

/// Emit event: a requested shipment did not exist (warning level).
pub fn emit_shipment_missing(shipment_id: &str) {
    warn!(event = "shipment.missing", shipment_id = %shipment_id);
}

/// Emit event: a shipment changed status.
pub fn emit_status_changed(shipment_id: &str, status: &str) {
    info!(event = "shipment.status_changed", shipment_id = %shipment_id, status = %status);
}
