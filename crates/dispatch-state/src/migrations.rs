//! SurrealDB schema migrations and initialization
//!
//! Defines the dispatch tables and their indexes. Every statement uses
//! `IF NOT EXISTS`, so running the migrations on an initialized database is a
//! no-op.

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all dispatch tables in SurrealDB
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing dispatch SurrealDB schema");

    init_rules_table(db).await?;
    init_couriers_table(db).await?;
    init_shipments_table(db).await?;
    init_events_table(db).await?;
    init_policies_table(db).await?;

    info!("dispatch schema initialization complete");
    Ok(())
}

async fn run(db: &Surreal<Any>, sql: &str) -> Result<()> {
    db.query(sql).await?.check()?;
    Ok(())
}

/// Initialize `dispatch_rules`
///
/// Schema:
/// ```text
/// TABLE dispatch_rules {
///   rule_id:              STRING (unique)
///   region:               STRING?
///   vehicle_type:         STRING?
///   max_active_shipments: INT (0 = unlimited)
///   enable_auto_assign:   BOOL
///   priority:             INT
///   created_at:           DATETIME
/// }
/// ```
async fn init_rules_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing dispatch_rules table");
    run(
        db,
        r#"
        DEFINE TABLE IF NOT EXISTS dispatch_rules SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_rule_id ON TABLE dispatch_rules COLUMNS rule_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_rule_region ON TABLE dispatch_rules COLUMNS region;
    "#,
    )
    .await
}

/// Initialize `couriers`
///
/// Schema:
/// ```text
/// TABLE couriers {
///   courier_id:   STRING (unique)
///   name:         STRING
///   region:       STRING?
///   vehicle_type: STRING?
///   status:       STRING (online | break | offline)
/// }
/// ```
async fn init_couriers_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing couriers table");
    run(
        db,
        r#"
        DEFINE TABLE IF NOT EXISTS couriers SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_courier_id ON TABLE couriers COLUMNS courier_id UNIQUE;
    "#,
    )
    .await
}

/// Initialize `shipments`
///
/// Active load is counted with `(courier_id, status)`, hence the composite index.
async fn init_shipments_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing shipments table");
    run(
        db,
        r#"
        DEFINE TABLE IF NOT EXISTS shipments SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_shipment_id ON TABLE shipments COLUMNS shipment_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_shipment_tracking ON TABLE shipments COLUMNS tracking_id;
        DEFINE INDEX IF NOT EXISTS idx_shipment_courier_status ON TABLE shipments COLUMNS courier_id, status;
        DEFINE INDEX IF NOT EXISTS idx_shipment_created_at ON TABLE shipments COLUMNS created_at;
    "#,
    )
    .await
}

/// Initialize `shipment_events`
///
/// Append-only: updates and deletes are not permitted for record users.
async fn init_events_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing shipment_events table");
    run(
        db,
        r#"
        DEFINE TABLE IF NOT EXISTS shipment_events SCHEMALESS
            PERMISSIONS
                FOR select, create FULL
                FOR update, delete NONE;
        DEFINE INDEX IF NOT EXISTS idx_event_shipment ON TABLE shipment_events COLUMNS shipment_id, recorded_at;
    "#,
    )
    .await
}

/// Initialize `sla_policies`
async fn init_policies_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing sla_policies table");
    run(
        db,
        r#"
        DEFINE TABLE IF NOT EXISTS sla_policies SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_policy_id ON TABLE sla_policies COLUMNS policy_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_policy_level ON TABLE sla_policies COLUMNS service_level;
    "#,
    )
    .await
}
