//! Courier Dispatch CLI
//!
//! The `dispatch` command manages dispatch rules, SLA policies, the courier
//! roster and shipments, and runs courier auto-assignment.
//!
//! ## Commands
//!
//! - `rules`: list, add, update or delete dispatch rules
//! - `sla`: manage SLA policies and preview resolution
//! - `couriers`: maintain the roster
//! - `shipments`: create, look up, assign and progress shipments; summarize
//! - `auto-assign`: run the engine over one or more shipments
//!
//! Every command prints pretty JSON on stdout; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, Level};

use dispatch_core::{
    DispatchConfig, DispatchRuleApi, Dispatcher, NewShipment, RuleInput, RulePatch, SlaPolicyApi,
    SlaPolicyInput, StatusChange, TieBreak, METRICS,
};
use dispatch_state::{
    Courier, CourierId, CourierStatus, DeliveryStatus, DispatchStore, EventLog, FleetStore,
    RuleId, ServiceLevel, ShipmentId, ShipmentStore, SlaPolicyId, StoreConfig,
    SurrealDispatchStore,
};

#[derive(Parser)]
#[command(name = "dispatch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Rule-driven courier dispatch", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Database URL (mem://, surrealkv://path, ws://host:port)
    #[arg(long, global = true, env = "DISPATCH_DB_URL")]
    db: Option<String>,

    /// Tie-break between equally loaded couriers (input_order, courier_id)
    #[arg(long, global = true)]
    tie_break: Option<TieBreak>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage dispatch rules
    Rules {
        #[command(subcommand)]
        action: RuleAction,
    },

    /// Manage SLA policies
    Sla {
        #[command(subcommand)]
        action: SlaAction,
    },

    /// Manage the courier roster
    Couriers {
        #[command(subcommand)]
        action: CourierAction,
    },

    /// Manage shipments
    Shipments {
        #[command(subcommand)]
        action: ShipmentAction,
    },

    /// Auto-assign couriers to shipments, in the order given
    AutoAssign {
        /// Shipment IDs
        #[arg(required = true)]
        shipment_ids: Vec<String>,
    },
}

#[derive(Subcommand)]
enum RuleAction {
    /// List rules, highest priority first
    List,

    /// Add a rule
    Add {
        /// Region the rule applies to (omit for all regions)
        #[arg(long)]
        region: Option<String>,

        /// Required vehicle type (omit for any)
        #[arg(long)]
        vehicle: Option<String>,

        /// Active-shipment cap per courier, 0 for unlimited
        #[arg(long)]
        max_active: Option<i64>,

        /// Priority, higher runs first
        #[arg(long)]
        priority: Option<i64>,

        /// Store the rule with auto-assignment switched off
        #[arg(long)]
        disabled: bool,
    },

    /// Update fields of a rule
    Update {
        /// Rule ID
        id: String,

        #[arg(long, conflicts_with = "clear_region")]
        region: Option<String>,

        /// Make the rule apply to all regions
        #[arg(long)]
        clear_region: bool,

        #[arg(long, conflicts_with = "clear_vehicle")]
        vehicle: Option<String>,

        /// Accept any vehicle type
        #[arg(long)]
        clear_vehicle: bool,

        #[arg(long)]
        max_active: Option<i64>,

        #[arg(long)]
        priority: Option<i64>,

        /// Switch auto-assignment on or off
        #[arg(long)]
        auto_assign: Option<bool>,
    },

    /// Delete a rule
    Delete {
        /// Rule ID
        id: String,
    },
}

#[derive(Subcommand)]
enum SlaAction {
    /// List SLA policies
    List,

    /// Create a policy, or replace one when --id is given
    Upsert {
        #[arg(long)]
        id: Option<String>,

        #[arg(long)]
        name: String,

        #[arg(long)]
        region: Option<String>,

        /// same_day, next_day or standard
        #[arg(long, default_value = "standard")]
        level: ServiceLevel,

        #[arg(long)]
        target_minutes: u32,

        /// Hour of day (0-23) after which orders roll to the next day
        #[arg(long)]
        cutoff_hour: Option<u8>,
    },

    /// Delete a policy
    Delete {
        /// Policy ID
        id: String,
    },

    /// Show the policy a new shipment would be linked to
    Resolve {
        #[arg(long)]
        region: Option<String>,

        #[arg(long, default_value = "standard")]
        level: ServiceLevel,
    },
}

#[derive(Subcommand)]
enum CourierAction {
    /// List couriers with their active load
    List,

    /// Add a courier or replace the one with the same ID
    Add {
        /// Courier ID
        id: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        region: Option<String>,

        #[arg(long)]
        vehicle: Option<String>,

        /// online, break or offline
        #[arg(long, default_value = "online")]
        status: CourierStatus,
    },

    /// Set a courier's status
    Status {
        /// Courier ID
        id: String,

        /// online, break or offline
        status: CourierStatus,
    },
}

#[derive(Subcommand)]
enum ShipmentAction {
    /// List shipments
    List,

    /// Show one shipment
    Show {
        /// Shipment ID
        id: String,
    },

    /// Find a shipment by tracking number
    Lookup {
        /// Tracking number
        tracking: String,
    },

    /// Status counts, success rate and delivery times
    Summary,

    /// Create a shipment and auto-assign it unless told otherwise
    Create {
        #[arg(long)]
        tracking: String,

        #[arg(long)]
        customer: String,

        #[arg(long)]
        region: String,

        #[arg(long)]
        origin: String,

        #[arg(long)]
        destination: String,

        #[arg(long)]
        order: Option<String>,

        #[arg(long, default_value = "standard")]
        level: ServiceLevel,

        /// Assign this courier instead of running the engine
        #[arg(long)]
        courier: Option<String>,

        #[arg(long)]
        eta_minutes: Option<u32>,

        #[arg(long)]
        weight_kg: Option<f64>,

        /// Link this SLA policy instead of resolving one
        #[arg(long)]
        sla: Option<String>,

        /// Leave the shipment unassigned
        #[arg(long)]
        no_auto_assign: bool,
    },

    /// Move a shipment to a new status
    Status {
        /// Shipment ID
        id: String,

        /// pending, in_transit, delayed or delivered
        status: DeliveryStatus,

        #[arg(long)]
        note: Option<String>,

        #[arg(long)]
        eta_minutes: Option<u32>,
    },

    /// Assign a courier manually (omit --courier to unassign)
    Assign {
        /// Shipment ID
        id: String,

        #[arg(long)]
        courier: Option<String>,
    },

    /// Link an SLA policy (omit --policy to clear the link)
    LinkSla {
        /// Shipment ID
        id: String,

        #[arg(long)]
        policy: Option<String>,
    },

    /// Show a shipment's audit trail
    Events {
        /// Shipment ID
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    dispatch_core::init_tracing(cli.json, level);

    let store_config = match cli.db {
        Some(url) => StoreConfig {
            url,
            ..StoreConfig::from_env()
        },
        None => StoreConfig::from_env(),
    };
    let store = SurrealDispatchStore::connect(&store_config)
        .await
        .context("Failed to connect to dispatch database")?;

    let mut config = DispatchConfig::from_env().context("Invalid dispatch configuration")?;
    if let Some(tie_break) = cli.tie_break {
        config = config.with_tie_break(tie_break);
    }

    let result = run(Arc::new(store), config, cli.command).await;
    METRICS.flush();
    result
}

async fn run<S: DispatchStore>(
    store: Arc<S>,
    config: DispatchConfig,
    command: Commands,
) -> Result<()> {
    match command {
        Commands::Rules { action } => cmd_rules(store, action).await,
        Commands::Sla { action } => cmd_sla(store, action).await,
        Commands::Couriers { action } => cmd_couriers(store.as_ref(), action).await,
        Commands::Shipments { action } => {
            cmd_shipments(Dispatcher::with_config(store, config), action).await
        }
        Commands::AutoAssign { shipment_ids } => {
            cmd_auto_assign(&Dispatcher::with_config(store, config), &shipment_ids).await
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", out);
    Ok(())
}

async fn cmd_rules<S: DispatchStore>(store: Arc<S>, action: RuleAction) -> Result<()> {
    let api = DispatchRuleApi::new(store);
    match action {
        RuleAction::List => print_json(&api.list().await?),
        RuleAction::Add {
            region,
            vehicle,
            max_active,
            priority,
            disabled,
        } => {
            let rule = api
                .create(RuleInput {
                    region,
                    vehicle_type: vehicle,
                    max_active_shipments: max_active,
                    enable_auto_assign: Some(!disabled),
                    priority,
                })
                .await
                .context("add rule failed")?;
            print_json(&rule)
        }
        RuleAction::Update {
            id,
            region,
            clear_region,
            vehicle,
            clear_vehicle,
            max_active,
            priority,
            auto_assign,
        } => {
            let patch = RulePatch {
                region: if clear_region { Some(None) } else { region.map(Some) },
                vehicle_type: if clear_vehicle {
                    Some(None)
                } else {
                    vehicle.map(Some)
                },
                max_active_shipments: max_active,
                enable_auto_assign: auto_assign,
                priority,
            };
            let rule = api
                .update(&RuleId::from(id), patch)
                .await
                .context("update rule failed")?;
            print_json(&rule)
        }
        RuleAction::Delete { id } => {
            api.delete(&RuleId::from(id.as_str())).await?;
            print_json(&serde_json::json!({ "deleted": id }))
        }
    }
}

async fn cmd_sla<S: DispatchStore>(store: Arc<S>, action: SlaAction) -> Result<()> {
    let api = SlaPolicyApi::new(store);
    match action {
        SlaAction::List => print_json(&api.list().await?),
        SlaAction::Upsert {
            id,
            name,
            region,
            level,
            target_minutes,
            cutoff_hour,
        } => {
            let policy = api
                .upsert(SlaPolicyInput {
                    id: id.map(SlaPolicyId::from),
                    name,
                    region,
                    service_level: Some(level),
                    target_minutes,
                    cutoff_hour,
                })
                .await
                .context("upsert SLA policy failed")?;
            print_json(&policy)
        }
        SlaAction::Delete { id } => {
            api.delete(&SlaPolicyId::from(id.as_str())).await?;
            print_json(&serde_json::json!({ "deleted": id }))
        }
        SlaAction::Resolve { region, level } => {
            print_json(&api.resolve(region.as_deref(), level).await?)
        }
    }
}

async fn cmd_couriers<S: DispatchStore>(store: &S, action: CourierAction) -> Result<()> {
    match action {
        CourierAction::List => print_json(&store.list_couriers_with_load().await?),
        CourierAction::Add {
            id,
            name,
            region,
            vehicle,
            status,
        } => {
            let courier = Courier {
                id: CourierId::from(id),
                name,
                region,
                vehicle_type: vehicle,
                status,
            };
            store.upsert_courier(courier.clone()).await?;
            info!(courier_id = %courier.id, "courier saved");
            print_json(&courier)
        }
        CourierAction::Status { id, status } => {
            store
                .set_courier_status(&CourierId::from(id.as_str()), status)
                .await
                .with_context(|| format!("set status for courier {id} failed"))?;
            print_json(&serde_json::json!({ "courier_id": id, "status": status }))
        }
    }
}

async fn cmd_shipments<S: DispatchStore>(
    dispatcher: Dispatcher<S>,
    action: ShipmentAction,
) -> Result<()> {
    match action {
        ShipmentAction::List => print_json(&dispatcher.store().list_shipments().await?),
        ShipmentAction::Show { id } => {
            let shipment = dispatcher
                .store()
                .get_shipment(&ShipmentId::from(id))
                .await?;
            print_json(&shipment)
        }
        ShipmentAction::Lookup { tracking } => {
            print_json(&dispatcher.find_by_tracking(&tracking).await?)
        }
        ShipmentAction::Summary => print_json(&dispatcher.summary().await?),
        ShipmentAction::Create {
            tracking,
            customer,
            region,
            origin,
            destination,
            order,
            level,
            courier,
            eta_minutes,
            weight_kg,
            sla,
            no_auto_assign,
        } => {
            let input = NewShipment {
                tracking_id: tracking,
                order_number: order,
                customer_id: customer,
                courier_id: courier.map(CourierId::from),
                status: None,
                service_level: level,
                region,
                origin,
                destination,
                eta_minutes,
                weight_kg,
                sla_policy_id: sla.map(SlaPolicyId::from),
                picked_up_at: None,
                delivered_at: None,
            };
            let created = dispatcher
                .create_shipment(input, !no_auto_assign)
                .await
                .context("create shipment failed")?;
            print_json(&created)
        }
        ShipmentAction::Status {
            id,
            status,
            note,
            eta_minutes,
        } => {
            let change = StatusChange {
                shipment_id: ShipmentId::from(id),
                status,
                note,
                eta_minutes,
            };
            print_json(&dispatcher.update_status(change).await?)
        }
        ShipmentAction::Assign { id, courier } => {
            let shipment = dispatcher
                .assign_courier(&ShipmentId::from(id), courier.map(CourierId::from))
                .await?;
            print_json(&shipment)
        }
        ShipmentAction::LinkSla { id, policy } => {
            let shipment = dispatcher
                .link_sla_policy(&ShipmentId::from(id), policy.map(SlaPolicyId::from))
                .await?;
            print_json(&shipment)
        }
        ShipmentAction::Events { id } => {
            let events = dispatcher
                .store()
                .list_events(&ShipmentId::from(id))
                .await?;
            print_json(&events)
        }
    }
}

async fn cmd_auto_assign<S: DispatchStore>(
    dispatcher: &Dispatcher<S>,
    shipment_ids: &[String],
) -> Result<()> {
    let ids: Vec<ShipmentId> = shipment_ids
        .iter()
        .map(|id| ShipmentId::from(id.as_str()))
        .collect();
    let outcome = dispatcher
        .auto_assign_many(&ids)
        .await
        .context("auto-assign failed")?;
    info!(
        requested = ids.len(),
        assigned = outcome.assigned_count(),
        "auto-assign finished"
    );
    print_json(&outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_state::{MemoryDispatchStore, RuleStore, SlaPolicyStore};

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["dispatch"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    async fn exec(store: &Arc<MemoryDispatchStore>, args: &[&str]) -> Result<()> {
        let cli = parse(args);
        let config = DispatchConfig::default().with_tie_break(cli.tie_break.unwrap_or_default());
        run(Arc::clone(store), config, cli.command).await
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = parse(&["rules", "list", "--json", "--db", "mem://", "-v"]);
        assert!(cli.json);
        assert!(cli.verbose);
        assert_eq!(cli.db.as_deref(), Some("mem://"));
    }

    #[test]
    fn rejects_unknown_status() {
        let err = Cli::try_parse_from(["dispatch", "couriers", "status", "c1", "asleep"]);
        assert!(err.is_err());
    }

    #[test]
    fn auto_assign_requires_ids() {
        assert!(Cli::try_parse_from(["dispatch", "auto-assign"]).is_err());
    }

    #[test]
    fn tie_break_flag_accepts_dashes() {
        let cli = parse(&["--tie-break", "courier-id", "rules", "list"]);
        assert_eq!(cli.tie_break, Some(TieBreak::CourierId));
    }

    #[tokio::test]
    async fn rule_commands_round_trip() {
        let store = Arc::new(MemoryDispatchStore::new());
        exec(
            &store,
            &["rules", "add", "--region", "east", "--max-active", "3", "--priority", "2"],
        )
        .await
        .unwrap();

        let rules = store.list_rules().await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].region.as_deref(), Some("east"));
        assert_eq!(rules[0].max_active_shipments, 3);

        let id = rules[0].id.to_string();
        exec(
            &store,
            &["rules", "update", &id, "--clear-region", "--auto-assign", "false"],
        )
        .await
        .unwrap();
        let rule = store.get_rule(&RuleId::from(id.as_str())).await.unwrap();
        assert_eq!(rule.region, None);
        assert!(!rule.enable_auto_assign);

        exec(&store, &["rules", "delete", &id]).await.unwrap();
        assert!(store.list_rules().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn negative_cap_is_rejected() {
        let store = Arc::new(MemoryDispatchStore::new());
        let result = exec(&store, &["rules", "add", "--max-active=-2"]).await;
        assert!(result.is_err());
        assert!(store.list_rules().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_then_auto_assign_by_id() {
        let store = Arc::new(MemoryDispatchStore::new());
        exec(
            &store,
            &["couriers", "add", "c1", "--name", "Ana", "--region", "east"],
        )
        .await
        .unwrap();
        exec(
            &store,
            &[
                "shipments",
                "create",
                "--tracking",
                "TRK-CLI",
                "--customer",
                "cust-1",
                "--region",
                "east",
                "--origin",
                "Depot",
                "--destination",
                "Pier 9",
                "--no-auto-assign",
            ],
        )
        .await
        .unwrap();

        let shipment = store.list_shipments().await.unwrap().remove(0);
        assert_eq!(shipment.courier_id, None);

        exec(&store, &["auto-assign", shipment.id.as_str(), "ship-ghost"])
            .await
            .unwrap();
        let shipment = store.get_shipment(&shipment.id).await.unwrap();
        assert_eq!(shipment.courier_id, Some(CourierId::from("c1")));
    }

    #[tokio::test]
    async fn status_and_manual_assignment() {
        let store = Arc::new(MemoryDispatchStore::new());
        exec(
            &store,
            &[
                "shipments",
                "create",
                "--tracking",
                "TRK-S",
                "--customer",
                "cust-2",
                "--region",
                "west",
                "--origin",
                "Hub",
                "--destination",
                "Dock 1",
                "--courier",
                "c7",
            ],
        )
        .await
        .unwrap();
        let id = store.list_shipments().await.unwrap()[0].id.to_string();

        exec(&store, &["shipments", "status", &id, "delivered"])
            .await
            .unwrap();
        exec(&store, &["shipments", "assign", &id]).await.unwrap();

        let shipment = store.get_shipment(&ShipmentId::from(id.as_str())).await.unwrap();
        assert_eq!(shipment.status, DeliveryStatus::Delivered);
        assert!(shipment.delivered_at.is_some());
        assert_eq!(shipment.courier_id, None);

        let missing = exec(&store, &["shipments", "status", "ship-ghost", "delayed"]).await;
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn sla_upsert_and_link() {
        let store = Arc::new(MemoryDispatchStore::new());
        exec(
            &store,
            &[
                "sla",
                "upsert",
                "--name",
                "Same day east",
                "--region",
                "east",
                "--level",
                "same_day",
                "--target-minutes",
                "240",
            ],
        )
        .await
        .unwrap();
        let policy = store.list_policies().await.unwrap().remove(0);
        assert_eq!(policy.cutoff_hour, dispatch_core::sla::DEFAULT_CUTOFF_HOUR);

        exec(&store, &["sla", "resolve", "--region", "east", "--level", "same_day"])
            .await
            .unwrap();

        exec(
            &store,
            &[
                "shipments",
                "create",
                "--tracking",
                "TRK-L",
                "--customer",
                "cust-3",
                "--region",
                "east",
                "--origin",
                "Hub",
                "--destination",
                "Quay 2",
                "--no-auto-assign",
            ],
        )
        .await
        .unwrap();
        let shipment = store.list_shipments().await.unwrap().remove(0);
        // Standard service level does not match the same-day policy.
        assert_eq!(shipment.sla_policy_id, None);

        exec(
            &store,
            &["shipments", "link-sla", shipment.id.as_str(), "--policy", policy.id.as_str()],
        )
        .await
        .unwrap();
        let shipment = store.get_shipment(&shipment.id).await.unwrap();
        assert_eq!(shipment.sla_policy_id, Some(policy.id));
    }

    #[tokio::test]
    async fn lookup_by_tracking_and_summary() {
        let store = Arc::new(MemoryDispatchStore::new());
        exec(
            &store,
            &[
                "shipments",
                "create",
                "--tracking",
                "TRK-FIND",
                "--customer",
                "cust-4",
                "--region",
                "north",
                "--origin",
                "Hub",
                "--destination",
                "Gate 3",
                "--no-auto-assign",
            ],
        )
        .await
        .unwrap();

        exec(&store, &["shipments", "lookup", " TRK-FIND "])
            .await
            .unwrap();
        let missing = exec(&store, &["shipments", "lookup", "TRK-NONE"]).await;
        assert!(missing.unwrap_err().to_string().contains("TRK-NONE"));

        exec(&store, &["shipments", "summary"]).await.unwrap();
    }

    #[tokio::test]
    async fn courier_status_unknown_id_fails() {
        let store = Arc::new(MemoryDispatchStore::new());
        let result = exec(&store, &["couriers", "status", "ghost", "offline"]).await;
        assert!(result.is_err());
    }
}
