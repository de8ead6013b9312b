//! Trigger registry
//!
//! The registry owns the index → trigger map and is the only place the
//! "which index exists" invariant lives. Triggers are never deleted; a
//! trigger leaves service by transitioning to `Disabled` and comes back by
//! having its run condition changed again.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::info;

use sbct_core::{ControlClient, ExpressionError, RunCondition, TriggerExpression};

use crate::trigger::{Trigger, TriggerSummary};

/// Default poll interval, matching the controller's state refresh cadence
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("trigger {index} does not exist; provide both an expression and an action to create it")]
    MissingFields { index: u32 },

    #[error(transparent)]
    Expression(#[from] ExpressionError),
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Whether a registration created a new trigger or changed an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Created,
    Updated,
}

/// A create-or-update request for one trigger index
///
/// Absent or blank fields leave the stored value unchanged on update;
/// creation requires both `expression` and `action`. `initially_triggered`
/// only seeds the latch at creation, it never flips an existing latch.
#[derive(Debug, Clone, Default)]
pub struct TriggerUpdate {
    pub index: u32,
    pub expression: Option<String>,
    pub action: Option<String>,
    pub initially_triggered: Option<bool>,
    pub run_condition: Option<RunCondition>,
}

/// Shared pieces every evaluation loop needs
#[derive(Clone)]
pub struct EngineContext {
    /// Controller client used to evaluate state and execute actions
    pub client: Arc<dyn ControlClient>,
    /// Poll interval for every trigger loop
    pub poll_interval: Duration,
    /// Engine-wide shutdown signal; loops exit at their next sleep boundary
    pub(crate) shutdown_tx: broadcast::Sender<()>,
}

/// Maps trigger indices to triggers and drives their lifecycles
pub struct TriggerRegistry {
    triggers: DashMap<u32, Arc<Trigger>>,
    ctx: EngineContext,
}

impl TriggerRegistry {
    /// Create a registry with the default 250 ms poll interval
    pub fn new(client: Arc<dyn ControlClient>) -> Self {
        Self::with_poll_interval(client, DEFAULT_POLL_INTERVAL)
    }

    /// Create a registry with an explicit poll interval
    pub fn with_poll_interval(client: Arc<dyn ControlClient>, poll_interval: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            triggers: DashMap::new(),
            ctx: EngineContext {
                client,
                poll_interval,
                shutdown_tx,
            },
        }
    }

    /// Create a trigger at an unknown index, or partially update the
    /// trigger already stored there
    ///
    /// Safe to call while every trigger's loop is running: the map shard
    /// lock is never held across an await, and field updates synchronize
    /// per trigger.
    pub async fn create_or_update(&self, update: TriggerUpdate) -> RegistryResult<RegisterOutcome> {
        let expression = non_blank(update.expression);
        let action = non_blank(update.action);

        // Decide create vs update and insert synchronously so two racing
        // creates cannot both win the same index
        let (trigger, outcome) = match self.triggers.entry(update.index) {
            Entry::Vacant(entry) => {
                let (Some(expression), Some(action)) = (expression.clone(), action.clone()) else {
                    return Err(RegistryError::MissingFields {
                        index: update.index,
                    });
                };
                let parsed = TriggerExpression::parse(&expression)?;
                let trigger = Arc::new(Trigger::new(
                    update.index,
                    parsed,
                    action,
                    update.initially_triggered.unwrap_or(false),
                ));
                entry.insert(trigger.clone());
                (trigger, RegisterOutcome::Created)
            }
            Entry::Occupied(entry) => (entry.get().clone(), RegisterOutcome::Updated),
        };

        match outcome {
            RegisterOutcome::Created => {
                let condition = update.run_condition.unwrap_or_default();
                trigger.set_run_condition(condition, &self.ctx).await;
                info!(
                    index = update.index,
                    run_condition = %condition,
                    "trigger created"
                );
            }
            RegisterOutcome::Updated => {
                if let Some(expression) = expression {
                    trigger
                        .set_expression(TriggerExpression::parse(&expression)?)
                        .await;
                }
                if let Some(action) = action {
                    trigger.set_action(action).await;
                }
                if let Some(condition) = update.run_condition {
                    if condition != trigger.run_condition().await {
                        trigger.set_run_condition(condition, &self.ctx).await;
                    }
                }
                info!(index = update.index, "trigger updated");
            }
        }

        Ok(outcome)
    }

    /// Index-ascending summaries of all triggers
    pub async fn list(&self) -> Vec<TriggerSummary> {
        let triggers: Vec<Arc<Trigger>> = self
            .triggers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut summaries = Vec::with_capacity(triggers.len());
        for trigger in triggers {
            summaries.push(trigger.summary().await);
        }
        summaries.sort_by_key(|summary| summary.index);
        summaries
    }

    /// Look up a trigger by index
    pub fn get(&self, index: u32) -> Option<Arc<Trigger>> {
        self.triggers.get(&index).map(|entry| entry.value().clone())
    }

    /// Number of registered triggers, disabled ones included
    pub fn count(&self) -> usize {
        self.triggers.len()
    }

    /// Raise the engine-wide shutdown signal
    ///
    /// Every running loop exits at its next sleep boundary; an in-flight
    /// controller round-trip is allowed to finish first.
    pub fn shutdown(&self) {
        info!("stopping all trigger loops");
        let _ = self.ctx.shutdown_tx.send(());
    }
}

/// Treat whitespace-only strings as absent
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sbct_core::ClientResult;

    /// Controller stub for registry semantics; never fires anything
    struct IdleController;

    #[async_trait]
    impl ControlClient for IdleController {
        async fn evaluate(&self, _expression: &str) -> ClientResult<String> {
            Ok("0".to_string())
        }

        async fn execute(&self, _code: &str) -> ClientResult<String> {
            Ok(String::new())
        }
    }

    fn registry() -> TriggerRegistry {
        TriggerRegistry::with_poll_interval(Arc::new(IdleController), Duration::from_secs(3600))
    }

    fn create_request(index: u32) -> TriggerUpdate {
        TriggerUpdate {
            index,
            expression: Some("sensors.temp>200".to_string()),
            action: Some("M106 S1".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_with_defaults() {
        let registry = registry();
        let outcome = registry.create_or_update(create_request(1)).await.unwrap();
        assert_eq!(outcome, RegisterOutcome::Created);

        let summary = registry.get(1).unwrap().summary().await;
        assert_eq!(summary.run_condition, RunCondition::Always);
        assert!(!summary.triggered);
        assert!(summary.last_fired.is_none());
    }

    #[tokio::test]
    async fn test_create_with_initial_latch_and_condition() {
        let registry = registry();
        registry
            .create_or_update(TriggerUpdate {
                initially_triggered: Some(true),
                run_condition: Some(RunCondition::NotPrinting),
                ..create_request(2)
            })
            .await
            .unwrap();

        let summary = registry.get(2).unwrap().summary().await;
        assert_eq!(summary.run_condition, RunCondition::NotPrinting);
        assert!(summary.triggered);
    }

    #[tokio::test]
    async fn test_create_rejects_missing_fields() {
        let registry = registry();
        let result = registry
            .create_or_update(TriggerUpdate {
                index: 1,
                expression: Some("sensors.temp>200".to_string()),
                ..Default::default()
            })
            .await;
        assert!(matches!(
            result,
            Err(RegistryError::MissingFields { index: 1 })
        ));

        // Blank counts as missing
        let result = registry
            .create_or_update(TriggerUpdate {
                index: 1,
                expression: Some("sensors.temp>200".to_string()),
                action: Some("   ".to_string()),
                ..Default::default()
            })
            .await;
        assert!(result.is_err());
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn test_create_rejects_malformed_expression() {
        let registry = registry();
        let result = registry
            .create_or_update(TriggerUpdate {
                index: 1,
                expression: Some("sensors.temp".to_string()),
                action: Some("M106 S1".to_string()),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(RegistryError::Expression(_))));
    }

    #[tokio::test]
    async fn test_partial_update_keeps_unspecified_fields() {
        let registry = registry();
        registry.create_or_update(create_request(1)).await.unwrap();

        let outcome = registry
            .create_or_update(TriggerUpdate {
                index: 1,
                action: Some("M107".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(outcome, RegisterOutcome::Updated);

        let summary = registry.get(1).unwrap().summary().await;
        assert_eq!(summary.expression, "sensors.temp > 200");
        assert_eq!(summary.action, "M107");
        assert_eq!(summary.run_condition, RunCondition::Always);
    }

    #[tokio::test]
    async fn test_empty_update_is_idempotent() {
        let registry = registry();
        registry.create_or_update(create_request(1)).await.unwrap();
        let before = registry.get(1).unwrap().summary().await;

        registry
            .create_or_update(TriggerUpdate {
                index: 1,
                ..Default::default()
            })
            .await
            .unwrap();

        let after = registry.get(1).unwrap().summary().await;
        assert_eq!(after.expression, before.expression);
        assert_eq!(after.action, before.action);
        assert_eq!(after.run_condition, before.run_condition);
    }

    #[tokio::test]
    async fn test_update_latch_request_does_not_flip_latch() {
        let registry = registry();
        registry.create_or_update(create_request(1)).await.unwrap();

        registry
            .create_or_update(TriggerUpdate {
                index: 1,
                initially_triggered: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(!registry.get(1).unwrap().is_triggered());
    }

    #[tokio::test]
    async fn test_list_is_index_ordered() {
        let registry = registry();
        for index in [5, 1, 3] {
            registry.create_or_update(create_request(index)).await.unwrap();
        }

        let indices: Vec<u32> = registry.list().await.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![1, 3, 5]);
    }

    #[tokio::test]
    async fn test_list_empty() {
        let registry = registry();
        assert!(registry.list().await.is_empty());
    }
}
