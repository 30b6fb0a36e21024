use chrono::{TimeZone, Utc};
use dispatch_core::{assign, AssignmentEngine, Selection, SelectionBasis, TieBreak};
use dispatch_state::{Courier, CourierId, CourierLoad, CourierStatus, DispatchRule, RuleId};
use proptest::prelude::*;
use proptest::test_runner::Config;

const REGIONS: [&str; 3] = ["east", "west", " "];
const VEHICLES: [&str; 2] = ["van", "bike"];

fn fleet_strategy() -> impl Strategy<Value = Vec<CourierLoad>> {
    prop::collection::vec((0..4usize, 0..3usize, 0..3usize, 0..6u32), 0..8).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (region, vehicle, status, load))| CourierLoad {
                courier: Courier {
                    id: CourierId::from(format!("c{i}")),
                    name: format!("Courier {i}"),
                    region: REGIONS.get(region).map(|r| r.to_string()),
                    vehicle_type: VEHICLES.get(vehicle).map(|v| v.to_string()),
                    status: [
                        CourierStatus::Online,
                        CourierStatus::Break,
                        CourierStatus::Offline,
                    ][status],
                },
                active_shipments: load,
            })
            .collect()
    })
}

fn rules_strategy() -> impl Strategy<Value = Vec<DispatchRule>> {
    prop::collection::vec(
        (0..4usize, 0..3usize, -1..5i64, any::<bool>(), 0..4i64),
        0..5,
    )
    .prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (region, vehicle, max, enabled, priority))| DispatchRule {
                id: RuleId::from(format!("r{i}")),
                region: REGIONS.get(region).map(|r| r.to_string()),
                vehicle_type: VEHICLES.get(vehicle).map(|v| v.to_string()),
                max_active_shipments: max,
                enable_auto_assign: enabled,
                priority,
                created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            })
            .collect()
    })
}

fn region_strategy() -> impl Strategy<Value = Option<String>> {
    prop::option::of(prop::sample::select(vec!["east", "west", ""]).prop_map(str::to_string))
}

fn wanted(region: &Option<String>) -> Option<&str> {
    region.as_deref().map(str::trim).filter(|r| !r.is_empty())
}

fn region_ok(load: &CourierLoad, region: Option<&str>) -> bool {
    let courier_region = load
        .courier
        .region
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty());
    match (region, courier_region) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

fn chosen<'a>(fleet: &'a [CourierLoad], selection: &Selection) -> &'a CourierLoad {
    fleet
        .iter()
        .find(|l| l.courier.id == selection.courier_id)
        .expect("selected courier comes from the fleet")
}

proptest! {
    #![proptest_config(Config::with_cases(256))]

    #[test]
    fn same_inputs_same_courier(
        fleet in fleet_strategy(),
        rules in rules_strategy(),
        region in region_strategy(),
    ) {
        let first = assign(region.as_deref(), &rules, &fleet);
        let second = assign(region.as_deref(), &rules, &fleet);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn selection_is_available_and_in_region(
        fleet in fleet_strategy(),
        rules in rules_strategy(),
        region in region_strategy(),
    ) {
        let target = wanted(&region);
        let eligible = fleet
            .iter()
            .any(|l| l.courier.status.is_available() && region_ok(l, target));
        let selection = AssignmentEngine::default().select(region.as_deref(), &rules, &fleet);

        prop_assert_eq!(selection.is_some(), eligible);
        if let Some(selection) = selection {
            let load = chosen(&fleet, &selection);
            prop_assert!(load.courier.status.is_available());
            prop_assert!(region_ok(load, target));
        }
    }

    #[test]
    fn rule_picks_honour_rule_constraints(
        fleet in fleet_strategy(),
        rules in rules_strategy(),
        region in region_strategy(),
    ) {
        let selection = AssignmentEngine::default().select(region.as_deref(), &rules, &fleet);
        let Some(selection) = selection else {
            return Ok(());
        };
        let SelectionBasis::Rule { rule_id, .. } = &selection.basis else {
            return Ok(());
        };
        let rule = rules.iter().find(|r| &r.id == rule_id).expect("rule from input");
        let load = chosen(&fleet, &selection);

        prop_assert!(rule.enable_auto_assign);
        prop_assert!(rule.max_active_shipments >= 0);
        if rule.max_active_shipments > 0 {
            prop_assert!(i64::from(load.active_shipments) < rule.max_active_shipments);
            prop_assert_eq!(selection.capacity_guard, Some(rule.max_active_shipments as u32));
        } else {
            prop_assert_eq!(selection.capacity_guard, None);
        }
        let vehicle = rule
            .vehicle_type
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(vehicle) = vehicle {
            prop_assert_eq!(load.courier.vehicle_type.as_deref(), Some(vehicle));
        }
    }

    #[test]
    fn fallback_takes_a_least_loaded_courier(
        fleet in fleet_strategy(),
        region in region_strategy(),
    ) {
        let target = wanted(&region);
        let selection = AssignmentEngine::default().select(region.as_deref(), &[], &fleet);
        if let Some(selection) = selection {
            prop_assert_eq!(&selection.basis, &SelectionBasis::Fallback);
            let minimum = fleet
                .iter()
                .filter(|l| l.courier.status.is_available() && region_ok(l, target))
                .map(|l| l.active_shipments)
                .min();
            prop_assert_eq!(Some(selection.active_shipments), minimum);
        }
    }

    #[test]
    fn tie_break_only_changes_equal_loads(
        fleet in fleet_strategy(),
        rules in rules_strategy(),
        region in region_strategy(),
    ) {
        let by_order = AssignmentEngine::new(TieBreak::InputOrder)
            .select(region.as_deref(), &rules, &fleet);
        let by_id = AssignmentEngine::new(TieBreak::CourierId)
            .select(region.as_deref(), &rules, &fleet);
        match (by_order, by_id) {
            (Some(a), Some(b)) => {
                prop_assert_eq!(a.basis, b.basis);
                prop_assert_eq!(a.active_shipments, b.active_shipments);
            }
            (a, b) => prop_assert_eq!(a.is_none(), b.is_none()),
        }
    }

    #[test]
    fn disabled_rules_change_nothing(
        fleet in fleet_strategy(),
        rules in rules_strategy(),
        region in region_strategy(),
    ) {
        let enabled: Vec<DispatchRule> =
            rules.iter().filter(|r| r.enable_auto_assign).cloned().collect();
        prop_assert_eq!(
            assign(region.as_deref(), &rules, &fleet),
            assign(region.as_deref(), &enabled, &fleet)
        );
    }
}
