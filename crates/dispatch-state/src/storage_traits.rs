//! Storage trait definitions for courier dispatch
//!
//! These traits define the storage abstractions the dispatch core reads and
//! writes through:
//! - `RuleStore`: Dispatch rules (region / vehicle / capacity policies)
//! - `FleetStore`: Courier roster and derived active-shipment load
//! - `ShipmentStore`: Shipments, including the capacity-guarded assignment commit
//! - `EventLog`: Append-only shipment audit trail
//! - `SlaPolicyStore`: Service-level policies
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }
    };
}

string_id!(
    /// Identifier of a dispatch rule (`rule-<uuid>` when generated).
    RuleId
);
string_id!(
    /// Identifier of a courier. Supplied by the fleet roster.
    CourierId
);
string_id!(
    /// Identifier of a shipment (`ship-<uuid>` when generated).
    ShipmentId
);
string_id!(
    /// Identifier of an SLA policy (`sla-<uuid>` when generated).
    SlaPolicyId
);

impl RuleId {
    pub fn generate() -> Self {
        RuleId(format!("rule-{}", uuid::Uuid::new_v4()))
    }
}

impl ShipmentId {
    pub fn generate() -> Self {
        ShipmentId(format!("ship-{}", uuid::Uuid::new_v4()))
    }
}

impl SlaPolicyId {
    pub fn generate() -> Self {
        SlaPolicyId(format!("sla-{}", uuid::Uuid::new_v4()))
    }
}

/// Error returned when parsing one of the enum labels below fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

// ---------------------------------------------------------------------------
// Dispatch rules
// ---------------------------------------------------------------------------

/// A configured policy constraining automatic courier selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRule {
    pub id: RuleId,
    /// Region the rule applies to; `None` applies to all regions.
    pub region: Option<String>,
    /// Vehicle type couriers must drive; `None` accepts any vehicle.
    pub vehicle_type: Option<String>,
    /// Active-shipment cap per courier. `0` means unlimited.
    pub max_active_shipments: i64,
    pub enable_auto_assign: bool,
    /// Higher values are evaluated first.
    pub priority: i64,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Fleet
// ---------------------------------------------------------------------------

/// Operating status reported by a courier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourierStatus {
    Online,
    Break,
    Offline,
}

impl CourierStatus {
    /// Couriers are eligible for assignment unless offline.
    pub fn is_available(self) -> bool {
        !matches!(self, CourierStatus::Offline)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CourierStatus::Online => "online",
            CourierStatus::Break => "break",
            CourierStatus::Offline => "offline",
        }
    }
}

impl FromStr for CourierStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(CourierStatus::Online),
            "break" => Ok(CourierStatus::Break),
            "offline" => Ok(CourierStatus::Offline),
            other => Err(UnknownVariant {
                kind: "courier status",
                value: other.to_string(),
            }),
        }
    }
}

/// A courier on the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Courier {
    pub id: CourierId,
    pub name: String,
    pub region: Option<String>,
    pub vehicle_type: Option<String>,
    pub status: CourierStatus,
}

/// A courier together with its current active-shipment count.
///
/// `active_shipments` counts shipments assigned to the courier whose status
/// is pending, in transit, or delayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourierLoad {
    pub courier: Courier,
    pub active_shipments: u32,
}

// ---------------------------------------------------------------------------
// Shipments
// ---------------------------------------------------------------------------

/// Delivery status of a shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    InTransit,
    Delayed,
    Delivered,
}

impl DeliveryStatus {
    /// Statuses that count against a courier's load.
    pub const ACTIVE: [DeliveryStatus; 3] = [
        DeliveryStatus::Pending,
        DeliveryStatus::InTransit,
        DeliveryStatus::Delayed,
    ];

    pub fn is_active(self) -> bool {
        !matches!(self, DeliveryStatus::Delivered)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::InTransit => "in_transit",
            DeliveryStatus::Delayed => "delayed",
            DeliveryStatus::Delivered => "delivered",
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "in_transit" => Ok(DeliveryStatus::InTransit),
            "delayed" => Ok(DeliveryStatus::Delayed),
            "delivered" => Ok(DeliveryStatus::Delivered),
            other => Err(UnknownVariant {
                kind: "delivery status",
                value: other.to_string(),
            }),
        }
    }
}

/// Service level purchased for a shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceLevel {
    SameDay,
    NextDay,
    Standard,
}

impl ServiceLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceLevel::SameDay => "same_day",
            ServiceLevel::NextDay => "next_day",
            ServiceLevel::Standard => "standard",
        }
    }
}

impl FromStr for ServiceLevel {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "same_day" => Ok(ServiceLevel::SameDay),
            "next_day" => Ok(ServiceLevel::NextDay),
            "standard" => Ok(ServiceLevel::Standard),
            other => Err(UnknownVariant {
                kind: "service level",
                value: other.to_string(),
            }),
        }
    }
}

/// Full shipment record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: ShipmentId,
    pub tracking_id: String,
    pub order_number: Option<String>,
    pub customer_id: String,
    pub courier_id: Option<CourierId>,
    pub status: DeliveryStatus,
    pub service_level: ServiceLevel,
    pub region: Option<String>,
    pub origin: String,
    pub destination: String,
    pub eta_minutes: u32,
    pub weight_kg: f64,
    pub sla_policy_id: Option<SlaPolicyId>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Shipment {
    /// Move to `status` at `at`. `in_transit` stamps `picked_up_at` unless it
    /// is already set; `delivered` always stamps `delivered_at`.
    pub fn apply_status(&mut self, status: DeliveryStatus, at: DateTime<Utc>) {
        self.status = status;
        self.last_updated = at;
        match status {
            DeliveryStatus::InTransit => {
                self.picked_up_at.get_or_insert(at);
            }
            DeliveryStatus::Delivered => self.delivered_at = Some(at),
            DeliveryStatus::Pending | DeliveryStatus::Delayed => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Audit events
// ---------------------------------------------------------------------------

/// Category of a shipment audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Status,
    Handoff,
    Alert,
}

/// A single entry in a shipment's audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentEvent {
    pub shipment_id: ShipmentId,
    pub title: String,
    pub note: Option<String>,
    pub kind: EventKind,
    pub recorded_at: DateTime<Utc>,
}

impl ShipmentEvent {
    pub fn new(
        shipment_id: ShipmentId,
        title: impl Into<String>,
        note: Option<String>,
        kind: EventKind,
    ) -> Self {
        Self {
            shipment_id,
            title: title.into(),
            note,
            kind,
            recorded_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// SLA policies
// ---------------------------------------------------------------------------

/// Delivery-time target for a service level, optionally scoped to a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaPolicy {
    pub id: SlaPolicyId,
    pub name: String,
    pub region: Option<String>,
    pub service_level: ServiceLevel,
    pub target_minutes: u32,
    pub cutoff_hour: u8,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Dispatch rule persistence.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// All stored rules, enabled or not, oldest first.
    async fn list_rules(&self) -> StorageResult<Vec<DispatchRule>>;

    /// Fetch a rule. Returns `StorageError::RuleNotFound` if absent.
    async fn get_rule(&self, id: &RuleId) -> StorageResult<DispatchRule>;

    async fn insert_rule(&self, rule: DispatchRule) -> StorageResult<()>;

    /// Replace an existing rule. Returns `StorageError::RuleNotFound` if absent.
    async fn save_rule(&self, rule: DispatchRule) -> StorageResult<()>;

    /// Delete a rule. No-op if absent.
    async fn delete_rule(&self, id: &RuleId) -> StorageResult<()>;
}

/// Courier roster and load.
#[async_trait]
pub trait FleetStore: Send + Sync {
    /// Every courier with its active-shipment count, freshly computed.
    async fn list_couriers_with_load(&self) -> StorageResult<Vec<CourierLoad>>;

    /// Insert a courier or replace the one with the same id.
    async fn upsert_courier(&self, courier: Courier) -> StorageResult<()>;

    /// Returns `StorageError::CourierNotFound` if absent.
    async fn set_courier_status(&self, id: &CourierId, status: CourierStatus)
        -> StorageResult<()>;
}

/// Shipment persistence.
///
/// Guarantees:
/// - `assign_courier` with a guard is atomic: the load check and the write
///   cannot interleave with another guarded assignment to the same courier.
/// - `update_status` and `set_sla_policy` write only their own columns, so a
///   courier committed concurrently is never overwritten.
#[async_trait]
pub trait ShipmentStore: Send + Sync {
    async fn insert_shipment(&self, shipment: Shipment) -> StorageResult<()>;

    /// Returns `StorageError::ShipmentNotFound` if absent.
    async fn get_shipment(&self, id: &ShipmentId) -> StorageResult<Shipment>;

    /// First shipment carrying `tracking_id`, if any.
    async fn find_by_tracking(&self, tracking_id: &str) -> StorageResult<Option<Shipment>>;

    /// All shipments, oldest first.
    async fn list_shipments(&self) -> StorageResult<Vec<Shipment>>;

    /// Set (or clear) the courier on a shipment and bump `last_updated`.
    ///
    /// When `max_active` is `Some(cap)`, the write only happens if the courier
    /// currently carries fewer than `cap` active shipments other than this one;
    /// otherwise `StorageError::CapacityExceeded` is returned and nothing changes.
    async fn assign_courier(
        &self,
        shipment_id: &ShipmentId,
        courier_id: Option<&CourierId>,
        max_active: Option<u32>,
    ) -> StorageResult<()>;

    /// Apply a status transition in place (see [`Shipment::apply_status`]),
    /// replacing `eta_minutes` when given. Returns the updated shipment.
    async fn update_status(
        &self,
        shipment_id: &ShipmentId,
        status: DeliveryStatus,
        eta_minutes: Option<u32>,
        at: DateTime<Utc>,
    ) -> StorageResult<Shipment>;

    /// Set or clear the SLA policy link and bump `last_updated`.
    async fn set_sla_policy(
        &self,
        shipment_id: &ShipmentId,
        policy_id: Option<&SlaPolicyId>,
        at: DateTime<Utc>,
    ) -> StorageResult<Shipment>;
}

/// Append-only shipment audit trail.
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn append_event(&self, event: ShipmentEvent) -> StorageResult<()>;

    /// Events for a shipment in the order they were recorded.
    async fn list_events(&self, shipment_id: &ShipmentId) -> StorageResult<Vec<ShipmentEvent>>;
}

/// SLA policy persistence.
#[async_trait]
pub trait SlaPolicyStore: Send + Sync {
    /// All policies, oldest first.
    async fn list_policies(&self) -> StorageResult<Vec<SlaPolicy>>;

    /// Insert a policy or replace the one with the same id.
    async fn save_policy(&self, policy: SlaPolicy) -> StorageResult<()>;

    /// Delete a policy. No-op if absent.
    async fn delete_policy(&self, id: &SlaPolicyId) -> StorageResult<()>;
}

/// Everything the dispatch services need from a backend.
pub trait DispatchStore: RuleStore + FleetStore + ShipmentStore + EventLog + SlaPolicyStore {}

impl<T> DispatchStore for T where
    T: RuleStore + FleetStore + ShipmentStore + EventLog + SlaPolicyStore
{
}
