//! Request handling and response rendering

use std::sync::Arc;

use tracing::debug;

use sbct_core::RunCondition;
use sbct_engine::{RegisterOutcome, TriggerRegistry, TriggerUpdate};

use crate::request::TriggerRequest;

/// Rendered result of one request, ready for the transport to resolve
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Request handled; success text for the operator
    Success(String),
    /// Request rejected; error text for the operator
    Error(String),
}

impl DispatchOutcome {
    /// The rendered text, whichever way it went
    pub fn message(&self) -> &str {
        match self {
            DispatchOutcome::Success(message) | DispatchOutcome::Error(message) => message,
        }
    }
}

/// Maps inbound requests onto the registry
pub struct Dispatcher {
    registry: Arc<TriggerRegistry>,
}

impl Dispatcher {
    /// Create a dispatcher over the given registry
    pub fn new(registry: Arc<TriggerRegistry>) -> Self {
        Self { registry }
    }

    /// Handle one request, always producing exactly one response
    pub async fn handle(&self, request: TriggerRequest) -> DispatchOutcome {
        debug!(?request, "dispatching request");
        match request.index {
            Some(index) => self.create_or_update(index, request).await,
            None if request.is_list() => self.render_list().await,
            None => DispatchOutcome::Error(
                "missing T parameter: provide a trigger index to create or update".to_string(),
            ),
        }
    }

    async fn render_list(&self) -> DispatchOutcome {
        let summaries = self.registry.list().await;
        if summaries.is_empty() {
            return DispatchOutcome::Success(
                "No triggers defined. Define one with M583.1".to_string(),
            );
        }

        let mut message = String::from("Defined triggers:\n");
        for summary in &summaries {
            message.push_str(&format!("Trigger {}: {}\n", summary.index, summary));
        }
        DispatchOutcome::Success(message)
    }

    async fn create_or_update(&self, index: u32, request: TriggerRequest) -> DispatchOutcome {
        let run_condition = match request.run_condition.map(RunCondition::from_code).transpose() {
            Ok(condition) => condition,
            Err(err) => return DispatchOutcome::Error(err.to_string()),
        };

        let update = TriggerUpdate {
            index,
            expression: request.expression,
            action: request.action,
            initially_triggered: request.initially_triggered,
            run_condition,
        };

        match self.registry.create_or_update(update).await {
            Ok(RegisterOutcome::Created) => {
                DispatchOutcome::Success(format!("Trigger {index} created"))
            }
            Ok(RegisterOutcome::Updated) => {
                DispatchOutcome::Success(format!("Trigger {index} updated"))
            }
            Err(err) => DispatchOutcome::Error(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sbct_core::{ClientResult, ControlClient};
    use std::time::Duration;

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

    fn dispatcher() -> Dispatcher {
        // Hour-long poll: loops never tick during these tests
        Dispatcher::new(Arc::new(TriggerRegistry::with_poll_interval(
            Arc::new(IdleController),
            Duration::from_secs(3600),
        )))
    }

    fn create_request(index: u32) -> TriggerRequest {
        TriggerRequest {
            index: Some(index),
            expression: Some("sensors.temp>200".to_string()),
            action: Some("M106 S1".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_empty_registry_lists_explicit_message() {
        let outcome = dispatcher().handle(TriggerRequest::list()).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Success("No triggers defined. Define one with M583.1".to_string())
        );
    }

    #[tokio::test]
    async fn test_create_then_list() {
        let dispatcher = dispatcher();
        let outcome = dispatcher.handle(create_request(1)).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Success("Trigger 1 created".to_string())
        );

        let outcome = dispatcher.handle(TriggerRequest::list()).await;
        let DispatchOutcome::Success(message) = outcome else {
            panic!("expected success, got {outcome:?}");
        };
        assert!(message.starts_with("Defined triggers:\n"));
        assert!(message.contains(
            "Trigger 1: Expression: 'sensors.temp > 200', Action: 'M106 S1', RunCondition: Always, Triggered: false"
        ));
    }

    #[tokio::test]
    async fn test_list_is_index_ordered() {
        let dispatcher = dispatcher();
        for index in [4, 2, 9] {
            dispatcher.handle(create_request(index)).await;
        }

        let DispatchOutcome::Success(message) = dispatcher.handle(TriggerRequest::list()).await
        else {
            panic!("expected success");
        };
        let positions: Vec<usize> = ["Trigger 2:", "Trigger 4:", "Trigger 9:"]
            .iter()
            .map(|needle| message.find(needle).unwrap())
            .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[tokio::test]
    async fn test_update_renders_updated() {
        let dispatcher = dispatcher();
        dispatcher.handle(create_request(1)).await;

        let outcome = dispatcher
            .handle(TriggerRequest {
                index: Some(1),
                action: Some("M107".to_string()),
                ..Default::default()
            })
            .await;
        assert_eq!(
            outcome,
            DispatchOutcome::Success("Trigger 1 updated".to_string())
        );
    }

    #[tokio::test]
    async fn test_fields_without_index_render_error() {
        let outcome = dispatcher()
            .handle(TriggerRequest {
                expression: Some("sensors.temp>200".to_string()),
                action: Some("M106 S1".to_string()),
                ..Default::default()
            })
            .await;
        let DispatchOutcome::Error(message) = outcome else {
            panic!("expected error, got {outcome:?}");
        };
        assert!(message.contains("missing T parameter"));

        // A lone run condition is just as indexless
        let outcome = dispatcher()
            .handle(TriggerRequest {
                run_condition: Some(0),
                ..Default::default()
            })
            .await;
        assert!(matches!(outcome, DispatchOutcome::Error(_)));
    }

    #[tokio::test]
    async fn test_missing_fields_render_error() {
        let outcome = dispatcher()
            .handle(TriggerRequest {
                index: Some(5),
                expression: Some("sensors.temp>200".to_string()),
                ..Default::default()
            })
            .await;
        let DispatchOutcome::Error(message) = outcome else {
            panic!("expected error, got {outcome:?}");
        };
        assert!(message.contains("trigger 5 does not exist"));
    }

    #[tokio::test]
    async fn test_invalid_run_condition_renders_error() {
        let outcome = dispatcher()
            .handle(TriggerRequest {
                run_condition: Some(7),
                ..create_request(1)
            })
            .await;
        let DispatchOutcome::Error(message) = outcome else {
            panic!("expected error, got {outcome:?}");
        };
        assert!(message.contains("invalid run condition value: 7"));
    }

    #[tokio::test]
    async fn test_malformed_expression_renders_error() {
        let outcome = dispatcher()
            .handle(TriggerRequest {
                index: Some(1),
                expression: Some("sensors.temp".to_string()),
                action: Some("M106".to_string()),
                ..Default::default()
            })
            .await;
        assert!(matches!(outcome, DispatchOutcome::Error(_)));
    }
}
