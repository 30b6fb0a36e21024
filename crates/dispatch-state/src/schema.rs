//! Row types for the dispatch SurrealDB tables
//!
//! Tables:
//! - dispatch_rules: Rule rows keyed by `rule_id`
//! - couriers: Courier roster keyed by `courier_id`
//! - shipments: Shipment rows keyed by `shipment_id`
//! - shipment_events: Append-only audit rows
//! - sla_policies: SLA policy rows keyed by `policy_id`
//!
//! Rows never carry a field named `id`; SurrealDB owns that column for its
//! record ids. Enums are stored as their snake_case labels and parsed back at
//! the boundary by [`crate::surreal_store`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage_traits::*;

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Module for serializing optional chrono DateTime to SurrealDB datetime format
mod surreal_datetime_opt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => {
                let sd = SurrealDatetime::from(*d);
                serde::Serialize::serialize(&Some(sd), serializer)
            }
            None => serde::Serialize::serialize(&None::<SurrealDatetime>, serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = Option::<SurrealDatetime>::deserialize(deserializer)?;
        Ok(sd.map(DateTime::from))
    }
}

fn parse_label<T>(value: &str) -> Result<T, StorageError>
where
    T: std::str::FromStr<Err = UnknownVariant>,
{
    value
        .parse()
        .map_err(|e: UnknownVariant| StorageError::Backend(e.to_string()))
}

fn to_u32(field: &str, value: i64) -> Result<u32, StorageError> {
    u32::try_from(value)
        .map_err(|_| StorageError::Backend(format!("{field} out of range: {value}")))
}

/// Row in `dispatch_rules`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleRow {
    pub rule_id: String,
    pub region: Option<String>,
    pub vehicle_type: Option<String>,
    pub max_active_shipments: i64,
    pub enable_auto_assign: bool,
    pub priority: i64,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl From<DispatchRule> for RuleRow {
    fn from(rule: DispatchRule) -> Self {
        Self {
            rule_id: rule.id.0,
            region: rule.region,
            vehicle_type: rule.vehicle_type,
            max_active_shipments: rule.max_active_shipments,
            enable_auto_assign: rule.enable_auto_assign,
            priority: rule.priority,
            created_at: rule.created_at,
        }
    }
}

impl From<RuleRow> for DispatchRule {
    fn from(row: RuleRow) -> Self {
        Self {
            id: RuleId(row.rule_id),
            region: row.region,
            vehicle_type: row.vehicle_type,
            max_active_shipments: row.max_active_shipments,
            enable_auto_assign: row.enable_auto_assign,
            priority: row.priority,
            created_at: row.created_at,
        }
    }
}

/// Row in `couriers`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourierRow {
    pub courier_id: String,
    pub name: String,
    pub region: Option<String>,
    pub vehicle_type: Option<String>,
    pub status: String,
}

impl From<Courier> for CourierRow {
    fn from(courier: Courier) -> Self {
        Self {
            courier_id: courier.id.0,
            name: courier.name,
            region: courier.region,
            vehicle_type: courier.vehicle_type,
            status: courier.status.as_str().to_string(),
        }
    }
}

impl TryFrom<CourierRow> for Courier {
    type Error = StorageError;

    fn try_from(row: CourierRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: CourierId(row.courier_id),
            name: row.name,
            region: row.region,
            vehicle_type: row.vehicle_type,
            status: parse_label(&row.status)?,
        })
    }
}

/// Row in `shipments`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentRow {
    pub shipment_id: String,
    pub tracking_id: String,
    pub order_number: Option<String>,
    pub customer_id: String,
    pub courier_id: Option<String>,
    pub status: String,
    pub service_level: String,
    pub region: Option<String>,
    pub origin: String,
    pub destination: String,
    pub eta_minutes: i64,
    pub weight_kg: f64,
    pub sla_policy_id: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub last_updated: DateTime<Utc>,
    #[serde(with = "surreal_datetime_opt", default)]
    pub picked_up_at: Option<DateTime<Utc>>,
    #[serde(with = "surreal_datetime_opt", default)]
    pub delivered_at: Option<DateTime<Utc>>,
}

impl From<Shipment> for ShipmentRow {
    fn from(s: Shipment) -> Self {
        Self {
            shipment_id: s.id.0,
            tracking_id: s.tracking_id,
            order_number: s.order_number,
            customer_id: s.customer_id,
            courier_id: s.courier_id.map(|c| c.0),
            status: s.status.as_str().to_string(),
            service_level: s.service_level.as_str().to_string(),
            region: s.region,
            origin: s.origin,
            destination: s.destination,
            eta_minutes: i64::from(s.eta_minutes),
            weight_kg: s.weight_kg,
            sla_policy_id: s.sla_policy_id.map(|p| p.0),
            created_at: s.created_at,
            last_updated: s.last_updated,
            picked_up_at: s.picked_up_at,
            delivered_at: s.delivered_at,
        }
    }
}

impl TryFrom<ShipmentRow> for Shipment {
    type Error = StorageError;

    fn try_from(row: ShipmentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ShipmentId(row.shipment_id),
            tracking_id: row.tracking_id,
            order_number: row.order_number,
            customer_id: row.customer_id,
            courier_id: row.courier_id.map(CourierId),
            status: parse_label(&row.status)?,
            service_level: parse_label(&row.service_level)?,
            region: row.region,
            origin: row.origin,
            destination: row.destination,
            eta_minutes: to_u32("eta_minutes", row.eta_minutes)?,
            weight_kg: row.weight_kg,
            sla_policy_id: row.sla_policy_id.map(SlaPolicyId),
            created_at: row.created_at,
            last_updated: row.last_updated,
            picked_up_at: row.picked_up_at,
            delivered_at: row.delivered_at,
        })
    }
}

/// Row in `shipment_events`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRow {
    pub shipment_id: String,
    pub title: String,
    pub note: Option<String>,
    pub kind: String,
    #[serde(with = "surreal_datetime")]
    pub recorded_at: DateTime<Utc>,
}

impl From<ShipmentEvent> for EventRow {
    fn from(e: ShipmentEvent) -> Self {
        let kind = match e.kind {
            EventKind::Status => "status",
            EventKind::Handoff => "handoff",
            EventKind::Alert => "alert",
        };
        Self {
            shipment_id: e.shipment_id.0,
            title: e.title,
            note: e.note,
            kind: kind.to_string(),
            recorded_at: e.recorded_at,
        }
    }
}

impl TryFrom<EventRow> for ShipmentEvent {
    type Error = StorageError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let kind = match row.kind.as_str() {
            "status" => EventKind::Status,
            "handoff" => EventKind::Handoff,
            "alert" => EventKind::Alert,
            other => return Err(StorageError::Backend(format!("unknown event kind: {other}"))),
        };
        Ok(Self {
            shipment_id: ShipmentId(row.shipment_id),
            title: row.title,
            note: row.note,
            kind,
            recorded_at: row.recorded_at,
        })
    }
}

/// Row in `sla_policies`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRow {
    pub policy_id: String,
    pub name: String,
    pub region: Option<String>,
    pub service_level: String,
    pub target_minutes: i64,
    pub cutoff_hour: i64,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl From<SlaPolicy> for PolicyRow {
    fn from(p: SlaPolicy) -> Self {
        Self {
            policy_id: p.id.0,
            name: p.name,
            region: p.region,
            service_level: p.service_level.as_str().to_string(),
            target_minutes: i64::from(p.target_minutes),
            cutoff_hour: i64::from(p.cutoff_hour),
            created_at: p.created_at,
        }
    }
}

impl TryFrom<PolicyRow> for SlaPolicy {
    type Error = StorageError;

    fn try_from(row: PolicyRow) -> Result<Self, Self::Error> {
        let cutoff_hour = u8::try_from(row.cutoff_hour).map_err(|_| {
            StorageError::Backend(format!("cutoff_hour out of range: {}", row.cutoff_hour))
        })?;
        Ok(Self {
            id: SlaPolicyId(row.policy_id),
            name: row.name,
            region: row.region,
            service_level: parse_label(&row.service_level)?,
            target_minutes: to_u32("target_minutes", row.target_minutes)?,
            cutoff_hour,
            created_at: row.created_at,
        })
    }
}
