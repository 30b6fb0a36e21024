//! Dashboard figures over a shipment and courier snapshot.
//!
//! [`summarize`] is pure: callers pass the snapshot and the clock reading, so
//! "delivered today" is stable under test.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dispatch_state::{Courier, DeliveryStatus, Shipment};

/// Headline numbers for a dispatch dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total_shipments: usize,
    pub pending: usize,
    pub in_transit: usize,
    pub delayed: usize,
    pub delivered: usize,
    /// Couriers that are not offline.
    pub active_couriers: usize,
    /// Delivered share of delivered plus delayed shipments, as a percentage
    /// with one decimal. `0.0` when neither exists.
    pub delivery_success_rate: f64,
    /// Delivered shipments whose `delivered_at` falls on `generated_at`'s UTC day.
    pub delivered_today: usize,
    /// Mean pickup-to-delivery time in whole minutes over shipments carrying
    /// both timestamps; `0` when none do.
    pub average_delivery_minutes: u64,
    pub generated_at: DateTime<Utc>,
}

/// Whole minutes from pickup to delivery, clamped at zero.
fn delivery_minutes(shipment: &Shipment) -> Option<u64> {
    let (picked, delivered) = (shipment.picked_up_at?, shipment.delivered_at?);
    let minutes = (delivered - picked).num_seconds() as f64 / 60.0;
    Some(minutes.round().max(0.0) as u64)
}

pub fn summarize(
    shipments: &[Shipment],
    couriers: &[Courier],
    now: DateTime<Utc>,
) -> DashboardSummary {
    let count = |status: DeliveryStatus| shipments.iter().filter(|s| s.status == status).count();
    let delivered = count(DeliveryStatus::Delivered);
    let delayed = count(DeliveryStatus::Delayed);

    let measured = delivered + delayed;
    let delivery_success_rate = if measured == 0 {
        0.0
    } else {
        (delivered as f64 / measured as f64 * 1000.0).round() / 10.0
    };

    let today = now.date_naive();
    let delivered_today = shipments
        .iter()
        .filter(|s| s.status == DeliveryStatus::Delivered)
        .filter(|s| s.delivered_at.is_some_and(|at| at.date_naive() == today))
        .count();

    let durations: Vec<u64> = shipments.iter().filter_map(delivery_minutes).collect();
    let average_delivery_minutes = if durations.is_empty() {
        0
    } else {
        (durations.iter().sum::<u64>() as f64 / durations.len() as f64).round() as u64
    };

    DashboardSummary {
        total_shipments: shipments.len(),
        pending: count(DeliveryStatus::Pending),
        in_transit: count(DeliveryStatus::InTransit),
        delayed,
        delivered,
        active_couriers: couriers.iter().filter(|c| c.status.is_available()).count(),
        delivery_success_rate,
        delivered_today,
        average_delivery_minutes,
        generated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use dispatch_state::{CourierId, CourierStatus, ServiceLevel, ShipmentId};

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap()
    }

    fn shipment(id: &str, status: DeliveryStatus) -> Shipment {
        let created = noon() - Duration::days(2);
        Shipment {
            id: ShipmentId::from(id),
            tracking_id: format!("TRK-{id}"),
            order_number: None,
            customer_id: "cust".to_string(),
            courier_id: None,
            status,
            service_level: ServiceLevel::Standard,
            region: Some("east".to_string()),
            origin: "Depot".to_string(),
            destination: "Dock 2".to_string(),
            eta_minutes: 0,
            weight_kg: 1.0,
            sla_policy_id: None,
            created_at: created,
            last_updated: created,
            picked_up_at: None,
            delivered_at: None,
        }
    }

    fn delivered(id: &str, picked: DateTime<Utc>, dropped: DateTime<Utc>) -> Shipment {
        Shipment {
            picked_up_at: Some(picked),
            delivered_at: Some(dropped),
            ..shipment(id, DeliveryStatus::Delivered)
        }
    }

    fn courier(id: &str, status: CourierStatus) -> Courier {
        Courier {
            id: CourierId::from(id),
            name: id.to_string(),
            region: None,
            vehicle_type: None,
            status,
        }
    }

    #[test]
    fn empty_snapshot_is_all_zero() {
        let summary = summarize(&[], &[], noon());
        assert_eq!(summary.total_shipments, 0);
        assert_eq!(summary.delivery_success_rate, 0.0);
        assert_eq!(summary.average_delivery_minutes, 0);
        assert_eq!(summary.generated_at, noon());
    }

    #[test]
    fn counts_statuses_and_active_couriers() {
        let shipments = vec![
            shipment("a", DeliveryStatus::Pending),
            shipment("b", DeliveryStatus::Pending),
            shipment("c", DeliveryStatus::InTransit),
            shipment("d", DeliveryStatus::Delayed),
            delivered("e", noon() - Duration::hours(1), noon()),
        ];
        let couriers = vec![
            courier("c1", CourierStatus::Online),
            courier("c2", CourierStatus::Break),
            courier("c3", CourierStatus::Offline),
        ];

        let summary = summarize(&shipments, &couriers, noon());

        assert_eq!(summary.total_shipments, 5);
        assert_eq!(
            (summary.pending, summary.in_transit, summary.delayed, summary.delivered),
            (2, 1, 1, 1)
        );
        assert_eq!(summary.active_couriers, 2);
    }

    #[test]
    fn success_rate_ignores_open_shipments() {
        let shipments = vec![
            delivered("a", noon() - Duration::hours(2), noon()),
            delivered("b", noon() - Duration::hours(2), noon()),
            shipment("c", DeliveryStatus::Delayed),
            shipment("d", DeliveryStatus::Pending),
            shipment("e", DeliveryStatus::InTransit),
        ];
        let summary = summarize(&shipments, &[], noon());
        assert_eq!(summary.delivery_success_rate, 66.7);
    }

    #[test]
    fn average_delivery_uses_both_timestamps() {
        let shipments = vec![
            delivered("a", noon() - Duration::minutes(30), noon()),
            delivered("b", noon() - Duration::minutes(61), noon()),
            // No pickup recorded, so it has no duration.
            Shipment {
                delivered_at: Some(noon()),
                ..shipment("c", DeliveryStatus::Delivered)
            },
            // Clock skew never yields a negative duration.
            delivered("d", noon() + Duration::minutes(5), noon()),
        ];
        let summary = summarize(&shipments, &[], noon());
        // (30 + 61 + 0) / 3 = 30.33
        assert_eq!(summary.average_delivery_minutes, 30);
    }

    #[test]
    fn delivered_today_follows_injected_clock() {
        let shipments = vec![
            delivered("a", noon() - Duration::hours(3), noon() - Duration::hours(1)),
            delivered("b", noon() - Duration::days(1), noon() - Duration::hours(20)),
        ];

        assert_eq!(summarize(&shipments, &[], noon()).delivered_today, 1);
        let next_day = noon() + Duration::days(1);
        assert_eq!(summarize(&shipments, &[], next_day).delivered_today, 0);
    }
}
