//! Dispatch rule management.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use dispatch_state::{DispatchRule, RuleId, RuleStore};

use crate::error::{DispatchError, Result};

/// Fields for a new rule. Unset fields take their defaults:
/// unlimited capacity, auto-assign enabled, priority 0.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleInput {
    pub region: Option<String>,
    pub vehicle_type: Option<String>,
    pub max_active_shipments: Option<i64>,
    pub enable_auto_assign: Option<bool>,
    pub priority: Option<i64>,
}

/// Partial update. `Some(None)` clears region or vehicle type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulePatch {
    pub region: Option<Option<String>>,
    pub vehicle_type: Option<Option<String>>,
    pub max_active_shipments: Option<i64>,
    pub enable_auto_assign: Option<bool>,
    pub priority: Option<i64>,
}

impl RulePatch {
    pub fn is_empty(&self) -> bool {
        self.region.is_none()
            && self.vehicle_type.is_none()
            && self.max_active_shipments.is_none()
            && self.enable_auto_assign.is_none()
            && self.priority.is_none()
    }
}

fn normalized(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_cap(max_active_shipments: i64) -> Result<i64> {
    if max_active_shipments < 0 {
        return Err(DispatchError::InvalidRule(format!(
            "max_active_shipments must be 0 (unlimited) or positive, got {max_active_shipments}"
        )));
    }
    Ok(max_active_shipments)
}

/// Thin API layer over a rule store.
pub struct DispatchRuleApi<S> {
    store: Arc<S>,
}

impl<S> DispatchRuleApi<S>
where
    S: RuleStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// All rules, highest priority first.
    pub async fn list(&self) -> Result<Vec<DispatchRule>> {
        let mut rules = self.store.list_rules().await?;
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(rules)
    }

    pub async fn create(&self, input: RuleInput) -> Result<DispatchRule> {
        let rule = DispatchRule {
            id: RuleId::generate(),
            region: normalized(input.region),
            vehicle_type: normalized(input.vehicle_type),
            max_active_shipments: validate_cap(input.max_active_shipments.unwrap_or(0))?,
            enable_auto_assign: input.enable_auto_assign.unwrap_or(true),
            priority: input.priority.unwrap_or(0),
            created_at: Utc::now(),
        };
        self.store.insert_rule(rule.clone()).await?;
        tracing::info!(event = "rule.created", rule_id = %rule.id, priority = rule.priority);
        Ok(rule)
    }

    /// Apply a patch. An empty patch returns the rule unchanged.
    pub async fn update(&self, id: &RuleId, patch: RulePatch) -> Result<DispatchRule> {
        let mut rule = self.store.get_rule(id).await?;
        if patch.is_empty() {
            return Ok(rule);
        }

        if let Some(region) = patch.region {
            rule.region = normalized(region);
        }
        if let Some(vehicle_type) = patch.vehicle_type {
            rule.vehicle_type = normalized(vehicle_type);
        }
        if let Some(max) = patch.max_active_shipments {
            rule.max_active_shipments = validate_cap(max)?;
        }
        if let Some(enabled) = patch.enable_auto_assign {
            rule.enable_auto_assign = enabled;
        }
        if let Some(priority) = patch.priority {
            rule.priority = priority;
        }

        self.store.save_rule(rule.clone()).await?;
        tracing::info!(event = "rule.updated", rule_id = %rule.id);
        Ok(rule)
    }

    pub async fn delete(&self, id: &RuleId) -> Result<()> {
        self.store.delete_rule(id).await?;
        tracing::info!(event = "rule.deleted", rule_id = %id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_state::{MemoryDispatchStore, StorageError};

    fn api() -> DispatchRuleApi<MemoryDispatchStore> {
        DispatchRuleApi::new(Arc::new(MemoryDispatchStore::new()))
    }

    #[tokio::test]
    async fn create_applies_defaults() {
        let api = api();
        let rule = api.create(RuleInput::default()).await.unwrap();
        assert!(rule.id.as_str().starts_with("rule-"));
        assert_eq!(rule.max_active_shipments, 0);
        assert!(rule.enable_auto_assign);
        assert_eq!(rule.priority, 0);
        assert_eq!(rule.region, None);
    }

    #[tokio::test]
    async fn create_rejects_negative_cap() {
        let err = api()
            .create(RuleInput {
                max_active_shipments: Some(-1),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidRule(_)));
    }

    #[tokio::test]
    async fn blank_strings_are_stored_as_unset() {
        let rule = api()
            .create(RuleInput {
                region: Some("  ".to_string()),
                vehicle_type: Some(" van ".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(rule.region, None);
        assert_eq!(rule.vehicle_type.as_deref(), Some("van"));
    }

    #[tokio::test]
    async fn list_orders_by_priority() {
        let api = api();
        for priority in [1, 10, 5] {
            api.create(RuleInput {
                priority: Some(priority),
                ..Default::default()
            })
            .await
            .unwrap();
        }
        let priorities: Vec<i64> = api.list().await.unwrap().iter().map(|r| r.priority).collect();
        assert_eq!(priorities, vec![10, 5, 1]);
    }

    #[tokio::test]
    async fn update_patches_fields() {
        let api = api();
        let rule = api
            .create(RuleInput {
                region: Some("east".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let updated = api
            .update(
                &rule.id,
                RulePatch {
                    region: Some(None),
                    max_active_shipments: Some(4),
                    enable_auto_assign: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.region, None);
        assert_eq!(updated.max_active_shipments, 4);
        assert!(!updated.enable_auto_assign);

        let unchanged = api.update(&rule.id, RulePatch::default()).await.unwrap();
        assert_eq!(unchanged, updated);

        let err = api
            .update(
                &rule.id,
                RulePatch {
                    max_active_shipments: Some(-3),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidRule(_)));
    }

    #[tokio::test]
    async fn unknown_rule_is_not_found() {
        let err = api()
            .update(&RuleId::from("rule-ghost"), RulePatch::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Storage(StorageError::RuleNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn delete_removes_rule() {
        let api = api();
        let rule = api.create(RuleInput::default()).await.unwrap();
        api.delete(&rule.id).await.unwrap();
        assert!(api.list().await.unwrap().is_empty());
    }
}
