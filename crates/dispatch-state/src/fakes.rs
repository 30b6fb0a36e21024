//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryDispatchStore`, a single in-process store implementing
//! every dispatch storage trait. Fleet load is derived from the shipment
//! table on each read, exactly as a relational backend would count it.
//!
//! Two failure knobs let tests exercise error paths without a real backend:
//! `fail_reads` makes rule and fleet reads return `StorageError::Backend`, and
//! `reject_next_guarded_assignments` makes the next N guarded commits report
//! `StorageError::CapacityExceeded` as if a concurrent writer won the race.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::storage_traits::*;

#[derive(Debug, Default)]
struct Tables {
    rules: Vec<DispatchRule>,
    couriers: Vec<Courier>,
    shipments: Vec<Shipment>,
    events: Vec<ShipmentEvent>,
    policies: Vec<SlaPolicy>,
    fail_reads: bool,
    rejected_guards: u32,
}

impl Tables {
    fn active_count(&self, courier_id: &CourierId, excluding: Option<&ShipmentId>) -> u32 {
        let count = self
            .shipments
            .iter()
            .filter(|s| s.status.is_active())
            .filter(|s| s.courier_id.as_ref() == Some(courier_id))
            .filter(|s| Some(&s.id) != excluding)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    fn shipment_mut(&mut self, id: &ShipmentId) -> StorageResult<&mut Shipment> {
        self.shipments
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or_else(|| StorageError::ShipmentNotFound {
                shipment_id: id.to_string(),
            })
    }

    fn check_reads(&self) -> StorageResult<()> {
        if self.fail_reads {
            return Err(StorageError::Backend("injected read failure".to_string()));
        }
        Ok(())
    }
}

/// In-memory dispatch store backed by plain vectors under one `Mutex`.
#[derive(Debug, Default)]
pub struct MemoryDispatchStore {
    tables: Mutex<Tables>,
}

impl MemoryDispatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make rule and fleet reads fail until switched off again.
    pub fn fail_reads(&self, fail: bool) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.fail_reads = fail;
        }
    }

    /// Refuse the next `count` capacity-guarded assignments.
    pub fn reject_next_guarded_assignments(&self, count: u32) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.rejected_guards = count;
        }
    }

    fn tables(&self) -> StorageResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StorageError::Backend("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl RuleStore for MemoryDispatchStore {
    async fn list_rules(&self) -> StorageResult<Vec<DispatchRule>> {
        let tables = self.tables()?;
        tables.check_reads()?;
        Ok(tables.rules.clone())
    }

    async fn get_rule(&self, id: &RuleId) -> StorageResult<DispatchRule> {
        let tables = self.tables()?;
        tables
            .rules
            .iter()
            .find(|r| &r.id == id)
            .cloned()
            .ok_or_else(|| StorageError::RuleNotFound {
                rule_id: id.to_string(),
            })
    }

    async fn insert_rule(&self, rule: DispatchRule) -> StorageResult<()> {
        let mut tables = self.tables()?;
        tables.rules.push(rule);
        Ok(())
    }

    async fn save_rule(&self, rule: DispatchRule) -> StorageResult<()> {
        let mut tables = self.tables()?;
        let slot = tables
            .rules
            .iter_mut()
            .find(|r| r.id == rule.id)
            .ok_or_else(|| StorageError::RuleNotFound {
                rule_id: rule.id.to_string(),
            })?;
        *slot = rule;
        Ok(())
    }

    async fn delete_rule(&self, id: &RuleId) -> StorageResult<()> {
        let mut tables = self.tables()?;
        tables.rules.retain(|r| &r.id != id);
        Ok(())
    }
}

#[async_trait]
impl FleetStore for MemoryDispatchStore {
    async fn list_couriers_with_load(&self) -> StorageResult<Vec<CourierLoad>> {
        let tables = self.tables()?;
        tables.check_reads()?;
        Ok(tables
            .couriers
            .iter()
            .map(|courier| CourierLoad {
                active_shipments: tables.active_count(&courier.id, None),
                courier: courier.clone(),
            })
            .collect())
    }

    async fn upsert_courier(&self, courier: Courier) -> StorageResult<()> {
        let mut tables = self.tables()?;
        match tables.couriers.iter_mut().find(|c| c.id == courier.id) {
            Some(slot) => *slot = courier,
            None => tables.couriers.push(courier),
        }
        Ok(())
    }

    async fn set_courier_status(
        &self,
        id: &CourierId,
        status: CourierStatus,
    ) -> StorageResult<()> {
        let mut tables = self.tables()?;
        let courier = tables
            .couriers
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| StorageError::CourierNotFound {
                courier_id: id.to_string(),
            })?;
        courier.status = status;
        Ok(())
    }
}

#[async_trait]
impl ShipmentStore for MemoryDispatchStore {
    async fn insert_shipment(&self, shipment: Shipment) -> StorageResult<()> {
        let mut tables = self.tables()?;
        tables.shipments.push(shipment);
        Ok(())
    }

    async fn get_shipment(&self, id: &ShipmentId) -> StorageResult<Shipment> {
        let tables = self.tables()?;
        tables
            .shipments
            .iter()
            .find(|s| &s.id == id)
            .cloned()
            .ok_or_else(|| StorageError::ShipmentNotFound {
                shipment_id: id.to_string(),
            })
    }

    async fn find_by_tracking(&self, tracking_id: &str) -> StorageResult<Option<Shipment>> {
        let tables = self.tables()?;
        Ok(tables
            .shipments
            .iter()
            .find(|s| s.tracking_id == tracking_id)
            .cloned())
    }

    async fn list_shipments(&self) -> StorageResult<Vec<Shipment>> {
        let tables = self.tables()?;
        Ok(tables.shipments.clone())
    }

    async fn assign_courier(
        &self,
        shipment_id: &ShipmentId,
        courier_id: Option<&CourierId>,
        max_active: Option<u32>,
    ) -> StorageResult<()> {
        let mut tables = self.tables()?;
        if !tables.shipments.iter().any(|s| &s.id == shipment_id) {
            return Err(StorageError::ShipmentNotFound {
                shipment_id: shipment_id.to_string(),
            });
        }

        // Count and write happen under the same lock.
        if let (Some(courier), Some(cap)) = (courier_id, max_active) {
            if tables.rejected_guards > 0 {
                tables.rejected_guards -= 1;
                return Err(StorageError::CapacityExceeded {
                    courier_id: courier.to_string(),
                    max_active: cap,
                });
            }
            if tables.active_count(courier, Some(shipment_id)) >= cap {
                return Err(StorageError::CapacityExceeded {
                    courier_id: courier.to_string(),
                    max_active: cap,
                });
            }
        }

        let shipment = tables.shipment_mut(shipment_id)?;
        shipment.courier_id = courier_id.cloned();
        shipment.last_updated = Utc::now();
        Ok(())
    }

    async fn update_status(
        &self,
        shipment_id: &ShipmentId,
        status: DeliveryStatus,
        eta_minutes: Option<u32>,
        at: DateTime<Utc>,
    ) -> StorageResult<Shipment> {
        let mut tables = self.tables()?;
        let shipment = tables.shipment_mut(shipment_id)?;
        shipment.apply_status(status, at);
        if let Some(eta) = eta_minutes {
            shipment.eta_minutes = eta;
        }
        Ok(shipment.clone())
    }

    async fn set_sla_policy(
        &self,
        shipment_id: &ShipmentId,
        policy_id: Option<&SlaPolicyId>,
        at: DateTime<Utc>,
    ) -> StorageResult<Shipment> {
        let mut tables = self.tables()?;
        let shipment = tables.shipment_mut(shipment_id)?;
        shipment.sla_policy_id = policy_id.cloned();
        shipment.last_updated = at;
        Ok(shipment.clone())
    }
}

#[async_trait]
impl EventLog for MemoryDispatchStore {
    async fn append_event(&self, event: ShipmentEvent) -> StorageResult<()> {
        let mut tables = self.tables()?;
        tables.events.push(event);
        Ok(())
    }

    async fn list_events(&self, shipment_id: &ShipmentId) -> StorageResult<Vec<ShipmentEvent>> {
        let tables = self.tables()?;
        Ok(tables
            .events
            .iter()
            .filter(|e| &e.shipment_id == shipment_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SlaPolicyStore for MemoryDispatchStore {
    async fn list_policies(&self) -> StorageResult<Vec<SlaPolicy>> {
        let tables = self.tables()?;
        Ok(tables.policies.clone())
    }

    async fn save_policy(&self, policy: SlaPolicy) -> StorageResult<()> {
        let mut tables = self.tables()?;
        match tables.policies.iter_mut().find(|p| p.id == policy.id) {
            Some(slot) => *slot = policy,
            None => tables.policies.push(policy),
        }
        Ok(())
    }

    async fn delete_policy(&self, id: &SlaPolicyId) -> StorageResult<()> {
        let mut tables = self.tables()?;
        tables.policies.retain(|p| &p.id != id);
        Ok(())
    }
}
