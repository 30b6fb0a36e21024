//! SurrealDB-backed dispatch store
//!
//! Uses the row types in `schema` for persistence, converting to/from
//! `storage_traits` types at the boundary.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use surrealdb::engine::any::Any;
use surrealdb::sql::Datetime as SurrealDatetime;
use surrealdb::Surreal;
use tracing::{debug, info, warn};

use crate::connection::{self, StoreConfig};
use crate::error::StorageError;
use crate::migrations;
use crate::schema::{CourierRow, EventRow, PolicyRow, RuleRow, ShipmentRow};
use crate::storage_traits::*;

/// Marker raised by the guarded assignment transaction.
const CAPACITY_MARKER: &str = "capacity_exceeded";

const GUARDED_ASSIGN: &str = r#"
    BEGIN TRANSACTION;
    LET $load = array::len((
        SELECT shipment_id FROM shipments
        WHERE courier_id = $courier
          AND status IN $active
          AND shipment_id != $sid
    ));
    IF $load >= $cap { THROW "capacity_exceeded" };
    UPDATE shipments SET courier_id = $courier, last_updated = time::now()
        WHERE shipment_id = $sid;
    COMMIT TRANSACTION;
"#;

#[derive(Debug, Deserialize)]
struct AssignedCourier {
    courier_id: Option<String>,
}

fn backend(e: surrealdb::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

fn active_labels() -> Vec<String> {
    DeliveryStatus::ACTIVE
        .iter()
        .map(|s| s.as_str().to_string())
        .collect()
}

/// SurrealDB implementation of every dispatch storage trait.
#[derive(Clone)]
pub struct SurrealDispatchStore {
    db: Surreal<Any>,
}

impl SurrealDispatchStore {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `dispatch/main`, and runs `init_schema`.
    pub async fn in_memory() -> crate::Result<Self> {
        Self::connect(&StoreConfig::in_memory()).await
    }

    /// Connect with an explicit configuration and run migrations.
    pub async fn connect(config: &StoreConfig) -> crate::Result<Self> {
        let db = connection::open(config).await?;
        migrations::init_schema(&db).await?;
        info!(url = %config.url, "SurrealDispatchStore ready");
        Ok(Self { db })
    }

    /// Create from environment variables, see [`StoreConfig::from_env`].
    pub async fn from_env() -> crate::Result<Self> {
        Self::connect(&StoreConfig::from_env()).await
    }

    // -- private helpers -----------------------------------------------------

    /// Run a query with a single `$key` binding and take the first result set.
    async fn select_where<T>(
        &self,
        sql: &str,
        key: &'static str,
        value: String,
    ) -> StorageResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let mut res = self
            .db
            .query(sql)
            .bind((key, value))
            .await
            .map_err(backend)?;
        res.take(0).map_err(backend)
    }

    async fn select_all<T>(&self, sql: &str) -> StorageResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let mut res = self.db.query(sql).await.map_err(backend)?;
        res.take(0).map_err(backend)
    }

    async fn fetch_shipment(&self, sid: &str) -> StorageResult<ShipmentRow> {
        let rows: Vec<ShipmentRow> = self
            .select_where(
                "SELECT * FROM shipments WHERE shipment_id = $sid",
                "sid",
                sid.to_string(),
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::ShipmentNotFound {
                shipment_id: sid.to_string(),
            })
    }

    async fn assign_unguarded(&self, sid: &str, courier: Option<String>) -> StorageResult<()> {
        self.db
            .query(
                "UPDATE shipments SET courier_id = $courier, last_updated = time::now() \
                 WHERE shipment_id = $sid",
            )
            .bind(("courier", courier))
            .bind(("sid", sid.to_string()))
            .await
            .map_err(backend)?
            .check()
            .map_err(backend)?;
        Ok(())
    }

    async fn assign_guarded(&self, sid: &str, courier: &CourierId, cap: u32) -> StorageResult<()> {
        let mut res = self
            .db
            .query(GUARDED_ASSIGN)
            .bind(("courier", courier.0.clone()))
            .bind(("sid", sid.to_string()))
            .bind(("active", active_labels()))
            .bind(("cap", i64::from(cap)))
            .await
            .map_err(backend)?;

        // A failed transaction reports an error on every statement; the THROW
        // carries the marker, the rest only say the transaction was cancelled.
        let errors = res.take_errors();
        if errors.is_empty() {
            return Ok(());
        }
        if errors
            .values()
            .any(|e| e.to_string().contains(CAPACITY_MARKER))
        {
            debug!(shipment_id = sid, courier_id = %courier, cap, "guarded assignment refused");
            return Err(StorageError::CapacityExceeded {
                courier_id: courier.0.clone(),
                max_active: cap,
            });
        }
        let message = errors
            .into_values()
            .next()
            .map(|e| e.to_string())
            .unwrap_or_default();
        warn!(shipment_id = sid, error = %message, "guarded assignment failed");
        Err(StorageError::Backend(message))
    }
}

#[async_trait]
impl RuleStore for SurrealDispatchStore {
    async fn list_rules(&self) -> StorageResult<Vec<DispatchRule>> {
        let rows: Vec<RuleRow> = self
            .select_all("SELECT * FROM dispatch_rules ORDER BY created_at ASC")
            .await?;
        Ok(rows.into_iter().map(DispatchRule::from).collect())
    }

    async fn get_rule(&self, id: &RuleId) -> StorageResult<DispatchRule> {
        let rows: Vec<RuleRow> = self
            .select_where(
                "SELECT * FROM dispatch_rules WHERE rule_id = $rid",
                "rid",
                id.0.clone(),
            )
            .await?;
        rows.into_iter()
            .next()
            .map(DispatchRule::from)
            .ok_or_else(|| StorageError::RuleNotFound {
                rule_id: id.to_string(),
            })
    }

    async fn insert_rule(&self, rule: DispatchRule) -> StorageResult<()> {
        debug!(rule_id = %rule.id, "creating dispatch rule");
        let _created: Option<RuleRow> = self
            .db
            .create("dispatch_rules")
            .content(RuleRow::from(rule))
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn save_rule(&self, rule: DispatchRule) -> StorageResult<()> {
        let rid = rule.id.0.clone();
        let mut res = self
            .db
            .query("UPDATE dispatch_rules CONTENT $row WHERE rule_id = $rid RETURN AFTER")
            .bind(("row", RuleRow::from(rule)))
            .bind(("rid", rid.clone()))
            .await
            .map_err(backend)?;
        let updated: Vec<RuleRow> = res.take(0).map_err(backend)?;
        if updated.is_empty() {
            return Err(StorageError::RuleNotFound { rule_id: rid });
        }
        Ok(())
    }

    async fn delete_rule(&self, id: &RuleId) -> StorageResult<()> {
        self.db
            .query("DELETE dispatch_rules WHERE rule_id = $rid")
            .bind(("rid", id.0.clone()))
            .await
            .map_err(backend)?
            .check()
            .map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl FleetStore for SurrealDispatchStore {
    async fn list_couriers_with_load(&self) -> StorageResult<Vec<CourierLoad>> {
        let couriers: Vec<CourierRow> = self
            .select_all("SELECT * FROM couriers ORDER BY courier_id ASC")
            .await?;

        let mut res = self
            .db
            .query(
                "SELECT courier_id FROM shipments \
                 WHERE status IN $active AND courier_id != NONE",
            )
            .bind(("active", active_labels()))
            .await
            .map_err(backend)?;
        let assigned: Vec<AssignedCourier> = res.take(0).map_err(backend)?;

        let mut load: HashMap<String, u32> = HashMap::new();
        for courier_id in assigned.into_iter().filter_map(|a| a.courier_id) {
            *load.entry(courier_id).or_insert(0) += 1;
        }

        couriers
            .into_iter()
            .map(|row| {
                let active_shipments = load.get(&row.courier_id).copied().unwrap_or(0);
                Ok(CourierLoad {
                    courier: Courier::try_from(row)?,
                    active_shipments,
                })
            })
            .collect()
    }

    async fn upsert_courier(&self, courier: Courier) -> StorageResult<()> {
        let cid = courier.id.0.clone();
        let row = CourierRow::from(courier);
        let mut res = self
            .db
            .query("UPDATE couriers CONTENT $row WHERE courier_id = $cid RETURN AFTER")
            .bind(("row", row.clone()))
            .bind(("cid", cid.clone()))
            .await
            .map_err(backend)?;
        let updated: Vec<CourierRow> = res.take(0).map_err(backend)?;
        if updated.is_empty() {
            debug!(courier_id = %cid, "adding courier to roster");
            let _created: Option<CourierRow> = self
                .db
                .create("couriers")
                .content(row)
                .await
                .map_err(backend)?;
        }
        Ok(())
    }

    async fn set_courier_status(
        &self,
        id: &CourierId,
        status: CourierStatus,
    ) -> StorageResult<()> {
        let mut res = self
            .db
            .query("UPDATE couriers SET status = $status WHERE courier_id = $cid RETURN AFTER")
            .bind(("status", status.as_str().to_string()))
            .bind(("cid", id.0.clone()))
            .await
            .map_err(backend)?;
        let updated: Vec<CourierRow> = res.take(0).map_err(backend)?;
        if updated.is_empty() {
            return Err(StorageError::CourierNotFound {
                courier_id: id.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ShipmentStore for SurrealDispatchStore {
    async fn insert_shipment(&self, shipment: Shipment) -> StorageResult<()> {
        debug!(shipment_id = %shipment.id, "creating shipment");
        let _created: Option<ShipmentRow> = self
            .db
            .create("shipments")
            .content(ShipmentRow::from(shipment))
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn get_shipment(&self, id: &ShipmentId) -> StorageResult<Shipment> {
        let row = self.fetch_shipment(&id.0).await?;
        Shipment::try_from(row)
    }

    async fn find_by_tracking(&self, tracking_id: &str) -> StorageResult<Option<Shipment>> {
        let rows: Vec<ShipmentRow> = self
            .select_where(
                "SELECT * FROM shipments WHERE tracking_id = $tid ORDER BY created_at ASC LIMIT 1",
                "tid",
                tracking_id.to_string(),
            )
            .await?;
        rows.into_iter().next().map(Shipment::try_from).transpose()
    }

    async fn list_shipments(&self) -> StorageResult<Vec<Shipment>> {
        let rows: Vec<ShipmentRow> = self
            .select_all("SELECT * FROM shipments ORDER BY created_at ASC")
            .await?;
        rows.into_iter().map(Shipment::try_from).collect()
    }

    async fn assign_courier(
        &self,
        shipment_id: &ShipmentId,
        courier_id: Option<&CourierId>,
        max_active: Option<u32>,
    ) -> StorageResult<()> {
        // Existence check first so a missing shipment is never mistaken for a full courier.
        self.fetch_shipment(&shipment_id.0).await?;

        match (courier_id, max_active) {
            (Some(courier), Some(cap)) => self.assign_guarded(&shipment_id.0, courier, cap).await,
            (courier, _) => {
                self.assign_unguarded(&shipment_id.0, courier.map(|c| c.0.clone()))
                    .await
            }
        }
    }

    async fn update_status(
        &self,
        shipment_id: &ShipmentId,
        status: DeliveryStatus,
        eta_minutes: Option<u32>,
        at: DateTime<Utc>,
    ) -> StorageResult<Shipment> {
        let mut fields = vec!["status = $status", "last_updated = $at"];
        if eta_minutes.is_some() {
            fields.push("eta_minutes = $eta");
        }
        match status {
            DeliveryStatus::InTransit => fields.push("picked_up_at = picked_up_at ?? $at"),
            DeliveryStatus::Delivered => fields.push("delivered_at = $at"),
            DeliveryStatus::Pending | DeliveryStatus::Delayed => {}
        }
        let sql = format!(
            "UPDATE shipments SET {} WHERE shipment_id = $sid RETURN AFTER",
            fields.join(", ")
        );

        let mut res = self
            .db
            .query(sql)
            .bind(("status", status.as_str().to_string()))
            .bind(("at", SurrealDatetime::from(at)))
            .bind(("eta", eta_minutes.map(i64::from)))
            .bind(("sid", shipment_id.0.clone()))
            .await
            .map_err(backend)?;
        let updated: Vec<ShipmentRow> = res.take(0).map_err(backend)?;
        updated
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::ShipmentNotFound {
                shipment_id: shipment_id.to_string(),
            })
            .and_then(Shipment::try_from)
    }

    async fn set_sla_policy(
        &self,
        shipment_id: &ShipmentId,
        policy_id: Option<&SlaPolicyId>,
        at: DateTime<Utc>,
    ) -> StorageResult<Shipment> {
        let mut res = self
            .db
            .query(
                "UPDATE shipments SET sla_policy_id = $policy, last_updated = $at \
                 WHERE shipment_id = $sid RETURN AFTER",
            )
            .bind(("policy", policy_id.map(|p| p.0.clone())))
            .bind(("at", SurrealDatetime::from(at)))
            .bind(("sid", shipment_id.0.clone()))
            .await
            .map_err(backend)?;
        let updated: Vec<ShipmentRow> = res.take(0).map_err(backend)?;
        updated
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::ShipmentNotFound {
                shipment_id: shipment_id.to_string(),
            })
            .and_then(Shipment::try_from)
    }
}

#[async_trait]
impl EventLog for SurrealDispatchStore {
    async fn append_event(&self, event: ShipmentEvent) -> StorageResult<()> {
        let _created: Option<EventRow> = self
            .db
            .create("shipment_events")
            .content(EventRow::from(event))
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn list_events(&self, shipment_id: &ShipmentId) -> StorageResult<Vec<ShipmentEvent>> {
        let rows: Vec<EventRow> = self
            .select_where(
                "SELECT * FROM shipment_events WHERE shipment_id = $sid ORDER BY recorded_at ASC",
                "sid",
                shipment_id.0.clone(),
            )
            .await?;
        rows.into_iter().map(ShipmentEvent::try_from).collect()
    }
}

#[async_trait]
impl SlaPolicyStore for SurrealDispatchStore {
    async fn list_policies(&self) -> StorageResult<Vec<SlaPolicy>> {
        let rows: Vec<PolicyRow> = self
            .select_all("SELECT * FROM sla_policies ORDER BY created_at ASC")
            .await?;
        rows.into_iter().map(SlaPolicy::try_from).collect()
    }

    async fn save_policy(&self, policy: SlaPolicy) -> StorageResult<()> {
        let pid = policy.id.0.clone();
        let row = PolicyRow::from(policy);
        let mut res = self
            .db
            .query("UPDATE sla_policies CONTENT $row WHERE policy_id = $pid RETURN AFTER")
            .bind(("row", row.clone()))
            .bind(("pid", pid))
            .await
            .map_err(backend)?;
        let updated: Vec<PolicyRow> = res.take(0).map_err(backend)?;
        if updated.is_empty() {
            let _created: Option<PolicyRow> = self
                .db
                .create("sla_policies")
                .content(row)
                .await
                .map_err(backend)?;
        }
        Ok(())
    }

    async fn delete_policy(&self, id: &SlaPolicyId) -> StorageResult<()> {
        self.db
            .query("DELETE sla_policies WHERE policy_id = $pid")
            .bind(("pid", id.0.clone()))
            .await
            .map_err(backend)?
            .check()
            .map_err(backend)?;
        Ok(())
    }
}
