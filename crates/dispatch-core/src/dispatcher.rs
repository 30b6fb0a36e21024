//! Dispatcher: the service layer around the assignment engine.
//!
//! Every auto-assignment reads a fresh rule and fleet snapshot, runs the
//! engine, and commits through the [`AssignmentApplier`]. Rule picks with a
//! positive cap are committed with a capacity guard; when the store refuses
//! the guard the dispatcher re-reads and decides again, up to
//! `DispatchConfig::max_commit_attempts` rounds.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use dispatch_state::{
    CourierId, DeliveryStatus, DispatchStore, EventKind, ServiceLevel, Shipment, ShipmentEvent,
    ShipmentId, SlaPolicyId, StorageError,
};

use crate::applier::AssignmentApplier;
use crate::config::DispatchConfig;
use crate::engine::{AssignmentDecision, AssignmentEngine};
use crate::error::{DispatchError, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::sla::resolve_policy;
use crate::summary::{summarize, DashboardSummary};

/// Title of the first event of every shipment.
pub const LABEL_CREATED_TITLE: &str = "Label Created";
/// Note used for deliveries reported without one.
pub const PROOF_PENDING_NOTE: &str = "Proof pending upload.";

/// Input for [`Dispatcher::create_shipment`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewShipment {
    pub tracking_id: String,
    pub order_number: Option<String>,
    pub customer_id: String,
    /// Commit this courier instead of auto-assigning.
    pub courier_id: Option<CourierId>,
    /// Defaults to `pending`.
    pub status: Option<DeliveryStatus>,
    pub service_level: ServiceLevel,
    pub region: String,
    pub origin: String,
    pub destination: String,
    pub eta_minutes: Option<u32>,
    pub weight_kg: Option<f64>,
    /// Resolved from the SLA policies when absent.
    pub sla_policy_id: Option<SlaPolicyId>,
    /// Defaults to the creation time when the initial status is past pickup.
    #[serde(default)]
    pub picked_up_at: Option<DateTime<Utc>>,
    /// Defaults to the creation time when created as delivered.
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Result of [`Dispatcher::create_shipment`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedShipment {
    pub shipment_id: ShipmentId,
    pub courier_id: Option<CourierId>,
    pub sla_policy_id: Option<SlaPolicyId>,
    /// Present when the engine ran.
    pub decision: Option<AssignmentDecision>,
}

/// Input for [`Dispatcher::update_status`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub shipment_id: ShipmentId,
    pub status: DeliveryStatus,
    pub note: Option<String>,
    pub eta_minutes: Option<u32>,
}

impl StatusChange {
    pub fn new(shipment_id: ShipmentId, status: DeliveryStatus) -> Self {
        Self {
            shipment_id,
            status,
            note: None,
            eta_minutes: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_eta_minutes(mut self, eta_minutes: u32) -> Self {
        self.eta_minutes = Some(eta_minutes);
        self
    }
}

/// Decisions of one bulk call, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub decisions: Vec<AssignmentDecision>,
}

impl BatchOutcome {
    /// Shipment id to chosen courier (`None` when unassigned).
    pub fn as_map(&self) -> HashMap<ShipmentId, Option<CourierId>> {
        self.decisions
            .iter()
            .map(|d| (d.shipment_id.clone(), d.courier_id.clone()))
            .collect()
    }

    pub fn assigned_count(&self) -> usize {
        self.decisions.iter().filter(|d| d.is_assigned()).count()
    }

    pub fn into_decisions(self) -> Vec<AssignmentDecision> {
        self.decisions
    }
}

fn status_title(status: DeliveryStatus) -> String {
    format!("Status → {}", status.as_str().replacen('_', " ", 1))
}

fn status_event_kind(status: DeliveryStatus) -> EventKind {
    match status {
        DeliveryStatus::Delayed => EventKind::Alert,
        _ => EventKind::Status,
    }
}

fn require(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DispatchError::InvalidShipment(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Shipment dispatch service over any [`DispatchStore`].
pub struct Dispatcher<S> {
    store: Arc<S>,
    applier: AssignmentApplier<S>,
    engine: AssignmentEngine,
    config: DispatchConfig,
}

impl<S> Dispatcher<S>
where
    S: DispatchStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, DispatchConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: DispatchConfig) -> Self {
        Self {
            applier: AssignmentApplier::new(Arc::clone(&store)),
            engine: AssignmentEngine::new(config.tie_break),
            store,
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Auto-assign one shipment.
    ///
    /// Returns an unassigned decision, writing nothing, when no courier is eligible.
    pub async fn auto_assign(&self, shipment_id: &ShipmentId) -> Result<AssignmentDecision> {
        let shipment = self
            .store
            .get_shipment(shipment_id)
            .await
            .map_err(DispatchError::from_shipment_lookup)?;
        self.decide_and_commit(&shipment).await
    }

    /// Auto-assign several shipments one after another.
    ///
    /// Each shipment sees the load left by the ones before it. Unknown ids
    /// produce unassigned decisions; any other failure aborts the batch.
    pub async fn auto_assign_many(&self, shipment_ids: &[ShipmentId]) -> Result<BatchOutcome> {
        self.assign_sequentially(shipment_ids)
            .instrument(obs::batch_span(shipment_ids.len()))
            .await
    }

    async fn assign_sequentially(&self, shipment_ids: &[ShipmentId]) -> Result<BatchOutcome> {
        METRICS.inc_batches();
        let mut outcome = BatchOutcome {
            decisions: Vec::with_capacity(shipment_ids.len()),
        };

        for shipment_id in shipment_ids {
            let shipment = match self.store.get_shipment(shipment_id).await {
                Ok(shipment) => shipment,
                Err(StorageError::ShipmentNotFound { .. }) => {
                    obs::emit_shipment_missing(shipment_id.as_str());
                    outcome
                        .decisions
                        .push(AssignmentDecision::unassigned(shipment_id.clone()));
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let decision = self.decide_and_commit(&shipment).await?;
            outcome.decisions.push(decision);
        }

        obs::emit_batch_finished(shipment_ids.len(), outcome.assigned_count());
        Ok(outcome)
    }

    async fn decide_and_commit(&self, shipment: &Shipment) -> Result<AssignmentDecision> {
        self.commit_with_retries(shipment)
            .instrument(obs::decision_span(shipment.id.as_str()))
            .await
    }

    async fn commit_with_retries(&self, shipment: &Shipment) -> Result<AssignmentDecision> {
        let attempts = self.config.max_commit_attempts.max(1);
        let region = shipment.region.as_deref();

        for attempt in 1..=attempts {
            let rules = self.store.list_rules().await?;
            let fleet = self.store.list_couriers_with_load().await?;

            let Some(selection) = self.engine.select(region, &rules, &fleet) else {
                METRICS.inc_unassigned();
                obs::emit_assignment_unassigned(shipment.id.as_str(), region);
                return Ok(AssignmentDecision::unassigned(shipment.id.clone()));
            };

            match self
                .applier
                .apply(
                    &shipment.id,
                    Some(&selection.courier_id),
                    selection.capacity_guard,
                )
                .await
            {
                Ok(()) => {
                    METRICS.inc_decisions();
                    obs::emit_assignment_committed(
                        shipment.id.as_str(),
                        selection.courier_id.as_str(),
                        &selection.basis,
                        selection.active_shipments,
                    );
                    return Ok(AssignmentDecision::assigned(shipment.id.clone(), selection));
                }
                Err(StorageError::CapacityExceeded { courier_id, .. }) => {
                    METRICS.inc_commit_conflicts();
                    obs::emit_commit_conflict(shipment.id.as_str(), &courier_id, attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(DispatchError::AssignmentConflict {
            shipment_id: shipment.id.to_string(),
            attempts,
        })
    }

    /// Create a shipment, link its SLA policy, and optionally assign it.
    pub async fn create_shipment(
        &self,
        input: NewShipment,
        auto_assign: bool,
    ) -> Result<CreatedShipment> {
        let tracking_id = require("tracking_id", &input.tracking_id)?;
        let customer_id = require("customer_id", &input.customer_id)?;
        let region = require("region", &input.region)?;
        let origin = require("origin", &input.origin)?;
        let destination = require("destination", &input.destination)?;
        let weight_kg = input.weight_kg.unwrap_or(0.0);
        if !weight_kg.is_finite() || weight_kg < 0.0 {
            return Err(DispatchError::InvalidShipment(format!(
                "weight_kg must be a non-negative number, got {weight_kg}"
            )));
        }

        let sla_policy_id = match input.sla_policy_id {
            Some(id) => Some(id),
            None => {
                let policies = self.store.list_policies().await?;
                resolve_policy(&policies, Some(region.as_str()), input.service_level)
                    .map(|p| p.id.clone())
            }
        };

        let now = Utc::now();
        let status = input.status.unwrap_or(DeliveryStatus::Pending);
        let picked_up_at = input.picked_up_at.or_else(|| {
            matches!(
                status,
                DeliveryStatus::InTransit | DeliveryStatus::Delayed | DeliveryStatus::Delivered
            )
            .then_some(now)
        });
        let delivered_at = input
            .delivered_at
            .or_else(|| (status == DeliveryStatus::Delivered).then_some(now));

        let shipment = Shipment {
            id: ShipmentId::generate(),
            tracking_id,
            order_number: non_blank(input.order_number),
            customer_id,
            courier_id: None,
            status,
            service_level: input.service_level,
            region: Some(region),
            origin,
            destination,
            eta_minutes: input.eta_minutes.unwrap_or(0),
            weight_kg,
            sla_policy_id: sla_policy_id.clone(),
            created_at: now,
            last_updated: now,
            picked_up_at,
            delivered_at,
        };

        self.store.insert_shipment(shipment.clone()).await?;
        self.store
            .append_event(ShipmentEvent::new(
                shipment.id.clone(),
                LABEL_CREATED_TITLE,
                None,
                EventKind::Status,
            ))
            .await?;
        tracing::info!(
            event = "shipment.created",
            shipment_id = %shipment.id,
            tracking_id = %shipment.tracking_id,
            sla_policy_id = ?sla_policy_id,
        );

        let explicit = input
            .courier_id
            .filter(|c| !c.as_str().trim().is_empty());

        let (courier_id, decision) = match explicit {
            Some(courier) => {
                self.applier.apply(&shipment.id, Some(&courier), None).await?;
                (Some(courier), None)
            }
            None if auto_assign => {
                let decision = self.decide_and_commit(&shipment).await?;
                (decision.courier_id.clone(), Some(decision))
            }
            None => (None, None),
        };

        Ok(CreatedShipment {
            shipment_id: shipment.id,
            courier_id,
            sla_policy_id,
            decision,
        })
    }

    /// Manually set or clear a shipment's courier. No capacity guard applies.
    pub async fn assign_courier(
        &self,
        shipment_id: &ShipmentId,
        courier_id: Option<CourierId>,
    ) -> Result<Shipment> {
        self.applier
            .apply(shipment_id, courier_id.as_ref(), None)
            .await
            .map_err(DispatchError::from_shipment_lookup)?;
        tracing::info!(
            event = "assignment.manual",
            shipment_id = %shipment_id,
            courier_id = ?courier_id,
        );
        Ok(self.store.get_shipment(shipment_id).await?)
    }

    /// Move a shipment to a new status and record the transition.
    ///
    /// Only the status columns are written; the courier is left as stored.
    pub async fn update_status(&self, change: StatusChange) -> Result<Shipment> {
        let shipment = self
            .store
            .update_status(
                &change.shipment_id,
                change.status,
                change.eta_minutes,
                Utc::now(),
            )
            .await
            .map_err(DispatchError::from_shipment_lookup)?;

        let note = non_blank(change.note).or_else(|| {
            (change.status == DeliveryStatus::Delivered).then(|| PROOF_PENDING_NOTE.to_string())
        });
        self.store
            .append_event(ShipmentEvent::new(
                shipment.id.clone(),
                status_title(change.status),
                note,
                status_event_kind(change.status),
            ))
            .await?;

        obs::emit_status_changed(shipment.id.as_str(), change.status.as_str());
        Ok(shipment)
    }

    /// Link a shipment to an SLA policy, or clear the link.
    pub async fn link_sla_policy(
        &self,
        shipment_id: &ShipmentId,
        policy_id: Option<SlaPolicyId>,
    ) -> Result<Shipment> {
        if let Some(id) = &policy_id {
            let policies = self.store.list_policies().await?;
            if !policies.iter().any(|p| &p.id == id) {
                return Err(StorageError::SlaPolicyNotFound {
                    policy_id: id.to_string(),
                }
                .into());
            }
        }

        let shipment = self
            .store
            .set_sla_policy(shipment_id, policy_id.as_ref(), Utc::now())
            .await
            .map_err(DispatchError::from_shipment_lookup)?;

        let note = match &policy_id {
            Some(id) => format!("Linked to SLA {id}"),
            None => "Cleared SLA policy".to_string(),
        };
        self.store
            .append_event(ShipmentEvent::new(
                shipment.id.clone(),
                "SLA policy updated",
                Some(note),
                EventKind::Status,
            ))
            .await?;
        Ok(shipment)
    }

    /// Look a shipment up by its tracking number.
    pub async fn find_by_tracking(&self, tracking_id: &str) -> Result<Shipment> {
        let tracking_id = tracking_id.trim();
        self.store
            .find_by_tracking(tracking_id)
            .await?
            .ok_or_else(|| DispatchError::TrackingNotFound(tracking_id.to_string()))
    }

    /// Dashboard figures over the current shipments and roster.
    pub async fn summary(&self) -> Result<DashboardSummary> {
        let shipments = self.store.list_shipments().await?;
        let couriers: Vec<_> = self
            .store
            .list_couriers_with_load()
            .await?
            .into_iter()
            .map(|load| load.courier)
            .collect();
        Ok(summarize(&shipments, &couriers, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_titles_use_spaces() {
        assert_eq!(status_title(DeliveryStatus::InTransit), "Status → in transit");
        assert_eq!(status_title(DeliveryStatus::Delivered), "Status → delivered");
    }

    #[test]
    fn only_delays_raise_alerts() {
        assert_eq!(status_event_kind(DeliveryStatus::Delayed), EventKind::Alert);
        assert_eq!(status_event_kind(DeliveryStatus::Pending), EventKind::Status);
        assert_eq!(status_event_kind(DeliveryStatus::Delivered), EventKind::Status);
    }

    #[test]
    fn blank_required_fields_are_rejected() {
        assert!(matches!(
            require("origin", "  "),
            Err(DispatchError::InvalidShipment(ref m)) if m == "origin is required"
        ));
        assert_eq!(require("origin", " Depot ").unwrap(), "Depot");
    }

    #[test]
    fn batch_map_and_counts() {
        let outcome = BatchOutcome {
            decisions: vec![
                AssignmentDecision::unassigned(ShipmentId::from("s1")),
                AssignmentDecision {
                    shipment_id: ShipmentId::from("s2"),
                    courier_id: Some(CourierId::from("c1")),
                    basis: None,
                },
            ],
        };
        assert_eq!(outcome.assigned_count(), 1);
        let map = outcome.as_map();
        assert_eq!(map[&ShipmentId::from("s1")], None);
        assert_eq!(map[&ShipmentId::from("s2")], Some(CourierId::from("c1")));
    }
}
