//! Dispatch-Core: courier auto-assignment and dispatch services
//!
//! ## Layer 1 - Decisions and services
//!
//! - [`engine`]: the pure assignment engine (`assign`, `AssignmentEngine`)
//! - [`applier`]: commits a choice and writes the handoff event
//! - [`dispatcher`]: single, bulk and create-time auto-assignment, manual
//!   assignment, status transitions, SLA links, tracking lookup
//! - [`rules`] / [`sla`]: validated management APIs
//! - [`summary`]: dashboard figures over a snapshot
//!
//! Persistence lives in `dispatch-state`; everything here is generic over its
//! storage traits.

pub mod applier;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod obs;
pub mod rules;
pub mod sla;
pub mod summary;
pub mod telemetry;

pub use applier::AssignmentApplier;
pub use config::{DispatchConfig, TieBreak};
pub use dispatcher::{BatchOutcome, CreatedShipment, Dispatcher, NewShipment, StatusChange};
pub use engine::{assign, AssignmentDecision, AssignmentEngine, Selection, SelectionBasis};
pub use error::{DispatchError, Result};
pub use metrics::METRICS;
pub use obs::{
    batch_span, decision_span, emit_assignment_committed, emit_assignment_unassigned,
    emit_batch_finished, emit_commit_conflict, emit_shipment_missing, emit_status_changed,
};
pub use rules::{DispatchRuleApi, RuleInput, RulePatch};
pub use sla::{resolve_policy, SlaPolicyApi, SlaPolicyInput};
pub use summary::{summarize, DashboardSummary};
pub use telemetry::init_tracing;

/// Dispatch version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
