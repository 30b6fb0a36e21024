//! SLA policy resolution and management.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use dispatch_state::{ServiceLevel, SlaPolicy, SlaPolicyId, SlaPolicyStore, StorageError};

use crate::error::{DispatchError, Result};

/// Cutoff hour applied when a policy does not name one.
pub const DEFAULT_CUTOFF_HOUR: u8 = 17;

fn normalized(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Pick the policy that governs a shipment.
///
/// Candidates share the shipment's service level and are either region-less
/// or scoped to the shipment's region. Region-specific policies beat generic
/// ones, then the tighter `target_minutes` wins, then snapshot order.
pub fn resolve_policy<'a>(
    policies: &'a [SlaPolicy],
    region: Option<&str>,
    service_level: ServiceLevel,
) -> Option<&'a SlaPolicy> {
    let region = region.map(str::trim).filter(|r| !r.is_empty());
    policies
        .iter()
        .filter(|p| p.service_level == service_level)
        .filter_map(|p| {
            match p.region.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
                None => Some((1u8, p)),
                Some(scoped) if Some(scoped) == region => Some((0u8, p)),
                Some(_) => None,
            }
        })
        .min_by_key(|(generic, p)| (*generic, p.target_minutes))
        .map(|(_, p)| p)
}

/// Input for [`SlaPolicyApi::upsert`]. Leave `id` empty to create.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlaPolicyInput {
    pub id: Option<SlaPolicyId>,
    pub name: String,
    pub region: Option<String>,
    pub service_level: Option<ServiceLevel>,
    pub target_minutes: u32,
    pub cutoff_hour: Option<u8>,
}

/// Thin API layer over an SLA policy store.
pub struct SlaPolicyApi<S> {
    store: Arc<S>,
}

impl<S> SlaPolicyApi<S>
where
    S: SlaPolicyStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<Vec<SlaPolicy>> {
        Ok(self.store.list_policies().await?)
    }

    /// Create a policy, or replace the one named by `input.id`.
    pub async fn upsert(&self, input: SlaPolicyInput) -> Result<SlaPolicy> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(DispatchError::InvalidSlaPolicy("name is required".to_string()));
        }
        let service_level = input.service_level.ok_or_else(|| {
            DispatchError::InvalidSlaPolicy("service_level is required".to_string())
        })?;
        let cutoff_hour = input.cutoff_hour.unwrap_or(DEFAULT_CUTOFF_HOUR);
        if cutoff_hour > 23 {
            return Err(DispatchError::InvalidSlaPolicy(format!(
                "cutoff_hour must be between 0 and 23, got {cutoff_hour}"
            )));
        }

        let created_at = match &input.id {
            Some(id) => {
                let existing = self.store.list_policies().await?;
                existing
                    .into_iter()
                    .find(|p| &p.id == id)
                    .map(|p| p.created_at)
                    .ok_or_else(|| StorageError::SlaPolicyNotFound {
                        policy_id: id.to_string(),
                    })?
            }
            None => Utc::now(),
        };

        let policy = SlaPolicy {
            id: input.id.unwrap_or_else(SlaPolicyId::generate),
            name,
            region: normalized(input.region),
            service_level,
            target_minutes: input.target_minutes,
            cutoff_hour,
            created_at,
        };
        self.store.save_policy(policy.clone()).await?;
        tracing::info!(
            event = "sla.upserted",
            policy_id = %policy.id,
            level = policy.service_level.as_str(),
        );
        Ok(policy)
    }

    pub async fn delete(&self, id: &SlaPolicyId) -> Result<()> {
        Ok(self.store.delete_policy(id).await?)
    }

    /// The policy [`resolve_policy`] would link to a new shipment.
    pub async fn resolve(
        &self,
        region: Option<&str>,
        service_level: ServiceLevel,
    ) -> Result<Option<SlaPolicy>> {
        let policies = self.store.list_policies().await?;
        Ok(resolve_policy(&policies, region, service_level).cloned())
    }
}
