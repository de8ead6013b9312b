//! Per-trigger evaluation loop
//!
//! One instance runs per active trigger. The only suspension points are the
//! poll sleep and the controller round-trips; no cross-trigger lock is held
//! across either. Any evaluation or action failure is fatal for the owning
//! trigger only: it forces the run condition to `Disabled` and exits, and is
//! never retried.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use sbct_core::{should_evaluate, ClientError, ControlClient, ExpressionError, RunCondition, TriggerExpression};

use crate::trigger::Trigger;

/// Composite "is a job actively running" probe: a job file is loaded and
/// the machine is not just simulating it. Evaluated by the controller,
/// which serializes the boolean result as `True`/`False`.
pub const JOB_ACTIVE_EXPRESSION: &str = r#"job.file.fileName != null && state.status != "simulating""#;

/// Why a tick failed, and the trigger with it
#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Compare(#[from] ExpressionError),
}

/// Evaluation loop body, spawned once per activation
///
/// Runs until the run condition reads `Disabled` at an iteration boundary,
/// a fatal failure disables the trigger, or the engine-wide shutdown signal
/// fires (cooperative cancellation at the sleep boundary; latch and run
/// condition are left as they are).
pub(crate) async fn run_trigger_loop(
    trigger: Arc<Trigger>,
    client: Arc<dyn ControlClient>,
    poll_interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    debug!(index = trigger.index(), "evaluation loop running");
    loop {
        // The poll interval matches the controller's own state refresh
        // cadence; polling faster buys nothing.
        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            _ = shutdown.recv() => {
                debug!(index = trigger.index(), "evaluation loop stopped by shutdown signal");
                return;
            }
        }

        let (condition, expression, action) = trigger.snapshot().await;
        if condition == RunCondition::Disabled {
            if trigger.confirm_exit().await {
                debug!(index = trigger.index(), "evaluation loop exiting, trigger disabled");
                return;
            }
            // Re-enabled between the snapshot and the exit check
            continue;
        }

        // Run-condition gate: skip the tick, latch untouched
        if condition.needs_job_status() {
            let printing = match query_job_active(client.as_ref()).await {
                Ok(printing) => printing,
                Err(err) => {
                    error!(
                        index = trigger.index(),
                        %err,
                        "failed to query job status, disabling trigger"
                    );
                    trigger.disable_from_loop().await;
                    return;
                }
            };
            if !should_evaluate(condition, printing) {
                continue;
            }
        }

        let met = match evaluate_condition(client.as_ref(), &expression).await {
            Ok(met) => met,
            Err(err) => {
                error!(
                    index = trigger.index(),
                    expression = %expression,
                    %err,
                    "failed to evaluate expression, disabling trigger"
                );
                trigger.disable_from_loop().await;
                return;
            }
        };

        if !trigger.is_triggered() && met {
            // Rising edge: fire once, then latch
            if let Err(err) = client.execute(&action).await {
                // Latch deliberately not set: no half-fired state survives
                // beyond the disable
                error!(
                    index = trigger.index(),
                    action = %action,
                    %err,
                    "failed to execute action, disabling trigger"
                );
                trigger.disable_from_loop().await;
                return;
            }
            trigger.mark_fired().await;
            info!(index = trigger.index(), action = %action, "trigger fired");
        } else if trigger.is_triggered() && !met {
            // Falling edge: re-arm, no action
            trigger.rearm();
            debug!(index = trigger.index(), "condition cleared, trigger re-armed");
        }
    }
}

/// Evaluate the trigger's state path and compare against its literal
async fn evaluate_condition(
    client: &dyn ControlClient,
    expression: &TriggerExpression,
) -> Result<bool, EvalError> {
    let result = client.evaluate(&expression.path).await?;
    Ok(expression.condition_met(&result)?)
}

/// Ask the controller whether a job is actively running
async fn query_job_active(client: &dyn ControlClient) -> Result<bool, ClientError> {
    let result = client.evaluate(JOB_ACTIVE_EXPRESSION).await?;
    Ok(result.trim() == "True")
}
