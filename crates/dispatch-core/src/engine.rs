//! Courier auto-assignment engine.
//!
//! Picks a courier for a shipment from a rule snapshot and a fleet snapshot.
//! Rules are tried from highest to lowest priority; the first rule that yields
//! any candidate decides, and the least-loaded candidate wins. When no rule
//! yields a candidate the engine falls back to the least-loaded available,
//! region-compatible courier.
//!
//! The engine is a pure function of its inputs: no I/O, no clock, no mutation.

use serde::{Deserialize, Serialize};

use dispatch_state::{CourierId, CourierLoad, DispatchRule, RuleId, ShipmentId};

use crate::config::TieBreak;

/// Why a courier was chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SelectionBasis {
    /// The highest-priority rule with a non-empty candidate set.
    Rule { rule_id: RuleId, priority: i64 },
    /// No rule produced a candidate.
    Fallback,
}

/// A courier chosen by [`AssignmentEngine::select`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub courier_id: CourierId,
    pub basis: SelectionBasis,
    /// Load of the chosen courier in the snapshot the engine saw.
    pub active_shipments: u32,
    /// Cap the committing store must re-check, set for rule picks with a positive limit.
    pub capacity_guard: Option<u32>,
}

/// Outcome of auto-assigning one shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentDecision {
    pub shipment_id: ShipmentId,
    /// `None` when no eligible courier exists.
    pub courier_id: Option<CourierId>,
    pub basis: Option<SelectionBasis>,
}

impl AssignmentDecision {
    pub fn unassigned(shipment_id: ShipmentId) -> Self {
        Self {
            shipment_id,
            courier_id: None,
            basis: None,
        }
    }

    pub fn assigned(shipment_id: ShipmentId, selection: Selection) -> Self {
        Self {
            shipment_id,
            courier_id: Some(selection.courier_id),
            basis: Some(selection.basis),
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.courier_id.is_some()
    }
}

/// Blank and whitespace-only strings count as unset.
fn normalized(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn rule_applies(rule: &DispatchRule, region: Option<&str>) -> bool {
    if !rule.enable_auto_assign {
        return false;
    }
    match normalized(rule.region.as_deref()) {
        None => true,
        Some(rule_region) => region == Some(rule_region),
    }
}

fn region_compatible(load: &CourierLoad, region: Option<&str>) -> bool {
    match (region, normalized(load.courier.region.as_deref())) {
        (Some(wanted), Some(courier_region)) => wanted == courier_region,
        _ => true,
    }
}

fn vehicle_compatible(load: &CourierLoad, rule: &DispatchRule) -> bool {
    match normalized(rule.vehicle_type.as_deref()) {
        None => true,
        Some(vehicle) => normalized(load.courier.vehicle_type.as_deref()) == Some(vehicle),
    }
}

fn under_capacity(load: &CourierLoad, max_active: i64) -> bool {
    match max_active {
        0 => true,
        max if max < 0 => false,
        max => i64::from(load.active_shipments) < max,
    }
}

fn capacity_guard(max_active: i64) -> Option<u32> {
    (max_active > 0).then(|| u32::try_from(max_active).unwrap_or(u32::MAX))
}

/// Auto-assignment engine with a configurable tie-break.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssignmentEngine {
    tie_break: TieBreak,
}

impl AssignmentEngine {
    pub fn new(tie_break: TieBreak) -> Self {
        Self { tie_break }
    }

    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    /// Choose a courier for a shipment in `region`.
    ///
    /// Returns `None` when neither a rule nor the fallback yields a candidate.
    pub fn select(
        &self,
        region: Option<&str>,
        rules: &[DispatchRule],
        fleet: &[CourierLoad],
    ) -> Option<Selection> {
        let region = normalized(region);

        let mut applicable: Vec<&DispatchRule> =
            rules.iter().filter(|r| rule_applies(r, region)).collect();
        // Stable: equal priorities keep snapshot order.
        applicable.sort_by(|a, b| b.priority.cmp(&a.priority));

        for rule in applicable {
            let candidates = fleet.iter().filter(|load| {
                load.courier.status.is_available()
                    && region_compatible(load, region)
                    && vehicle_compatible(load, rule)
                    && under_capacity(load, rule.max_active_shipments)
            });
            if let Some(chosen) = self.least_loaded(candidates) {
                return Some(Selection {
                    courier_id: chosen.courier.id.clone(),
                    basis: SelectionBasis::Rule {
                        rule_id: rule.id.clone(),
                        priority: rule.priority,
                    },
                    active_shipments: chosen.active_shipments,
                    capacity_guard: capacity_guard(rule.max_active_shipments),
                });
            }
        }

        let fallback = fleet
            .iter()
            .filter(|load| load.courier.status.is_available() && region_compatible(load, region));
        self.least_loaded(fallback).map(|chosen| Selection {
            courier_id: chosen.courier.id.clone(),
            basis: SelectionBasis::Fallback,
            active_shipments: chosen.active_shipments,
            capacity_guard: None,
        })
    }

    fn least_loaded<'a, I>(&self, candidates: I) -> Option<&'a CourierLoad>
    where
        I: Iterator<Item = &'a CourierLoad>,
    {
        match self.tie_break {
            // `min_by_key` keeps the first of equal minima.
            TieBreak::InputOrder => candidates.min_by_key(|load| load.active_shipments),
            TieBreak::CourierId => candidates.min_by(|a, b| {
                a.active_shipments
                    .cmp(&b.active_shipments)
                    .then_with(|| a.courier.id.cmp(&b.courier.id))
            }),
        }
    }
}

/// Pick a courier with the default (input order) tie-break.
pub fn assign(
    region: Option<&str>,
    rules: &[DispatchRule],
    fleet: &[CourierLoad],
) -> Option<CourierId> {
    AssignmentEngine::default()
        .select(region, rules, fleet)
        .map(|selection| selection.courier_id)
}
