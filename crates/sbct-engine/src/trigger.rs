//! Trigger state machine
//!
//! A trigger's mutable settings live behind its own lock so that updating
//! one trigger never blocks another trigger's loop. The latch transitions
//! only inside the evaluation loop; external callers can seed it at
//! creation but never flip it afterwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;

use sbct_core::{RunCondition, TriggerExpression};

use crate::eval::run_trigger_loop;
use crate::registry::EngineContext;

/// Mutable trigger settings, guarded per trigger
struct TriggerState {
    expression: TriggerExpression,
    action: String,
    run_condition: RunCondition,
    last_fired: Option<DateTime<Utc>>,
}

/// One automation rule: expression, action, run condition and latch
pub struct Trigger {
    index: u32,
    state: RwLock<TriggerState>,
    /// Edge-detection latch: set means the condition is satisfied and the
    /// action has already fired
    triggered: AtomicBool,
    /// Slot for the evaluation loop's task handle; also the lock that makes
    /// loop exit and re-activation mutually exclusive
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Trigger {
    /// Create a trigger in the `Disabled` state
    ///
    /// The caller activates it with [`Trigger::set_run_condition`]; until
    /// then no loop exists.
    pub fn new(
        index: u32,
        expression: TriggerExpression,
        action: impl Into<String>,
        initially_triggered: bool,
    ) -> Self {
        Self {
            index,
            state: RwLock::new(TriggerState {
                expression,
                action: action.into(),
                run_condition: RunCondition::Disabled,
                last_fired: None,
            }),
            triggered: AtomicBool::new(initially_triggered),
            task: Mutex::new(None),
        }
    }

    /// Registry key of this trigger
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Current run condition
    pub async fn run_condition(&self) -> RunCondition {
        self.state.read().await.run_condition
    }

    /// Whether the latch is set (condition satisfied, action already fired)
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Replace the expression, leaving everything else untouched
    pub async fn set_expression(&self, expression: TriggerExpression) {
        self.state.write().await.expression = expression;
    }

    /// Replace the action, leaving everything else untouched
    pub async fn set_action(&self, action: impl Into<String>) {
        self.state.write().await.action = action.into();
    }

    /// Set the run condition, starting the evaluation loop if needed
    ///
    /// A value other than `Disabled` guarantees exactly one live loop
    /// afterwards: if none is running one is spawned, a running one is left
    /// alone and observes the new value on its next tick. `Disabled` lets
    /// the loop exit at its next iteration boundary.
    pub async fn set_run_condition(self: &Arc<Self>, new_condition: RunCondition, ctx: &EngineContext) {
        self.state.write().await.run_condition = new_condition;
        if new_condition != RunCondition::Disabled {
            self.ensure_loop(ctx).await;
        }
    }

    /// Spawn the evaluation loop unless one is already live
    ///
    /// Runs under the task-slot lock; together with [`confirm_exit`] this
    /// guarantees a concurrent disable/re-enable never ends up with zero
    /// loops while enabled, or two.
    ///
    /// [`confirm_exit`]: Trigger::confirm_exit
    async fn ensure_loop(self: &Arc<Self>, ctx: &EngineContext) {
        let mut task = self.task.lock().await;
        // A racing fatal failure may have re-disabled the trigger between
        // our run-condition write and this point; spawning would leave a
        // loop behind on a disabled trigger
        if self.state.read().await.run_condition == RunCondition::Disabled {
            return;
        }
        let live = task.as_ref().is_some_and(|handle| !handle.is_finished());
        if !live {
            debug!(index = self.index, "starting evaluation loop");
            *task = Some(tokio::spawn(run_trigger_loop(
                self.clone(),
                ctx.client.clone(),
                ctx.poll_interval,
                ctx.shutdown_tx.subscribe(),
            )));
        }
    }

    /// Loop-side check before exiting on an observed `Disabled`
    ///
    /// Re-reads the run condition under the task-slot lock: a concurrent
    /// re-enable either lands before the re-read (the loop keeps running)
    /// or after the slot is cleared (a fresh loop is spawned).
    pub(crate) async fn confirm_exit(&self) -> bool {
        let mut task = self.task.lock().await;
        if self.state.read().await.run_condition == RunCondition::Disabled {
            *task = None;
            true
        } else {
            false
        }
    }

    /// Loop-side forced disable after a fatal evaluation or action failure
    ///
    /// The run-condition write and the slot clear happen under the
    /// task-slot lock, same as [`confirm_exit`]: a concurrent re-enable
    /// either overwrites the run condition afterwards and spawns into the
    /// cleared slot, or loses the write and finds the trigger disabled.
    /// Neither path strands an enabled trigger without a loop.
    ///
    /// [`confirm_exit`]: Trigger::confirm_exit
    pub(crate) async fn disable_from_loop(&self) {
        let mut task = self.task.lock().await;
        self.state.write().await.run_condition = RunCondition::Disabled;
        *task = None;
    }

    /// Snapshot the settings a single tick needs
    pub(crate) async fn snapshot(&self) -> (RunCondition, TriggerExpression, String) {
        let state = self.state.read().await;
        (
            state.run_condition,
            state.expression.clone(),
            state.action.clone(),
        )
    }

    /// Loop-side latch set after a successful action submission
    pub(crate) async fn mark_fired(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        self.state.write().await.last_fired = Some(Utc::now());
    }

    /// Loop-side latch reset on the falling edge
    pub(crate) fn rearm(&self) {
        self.triggered.store(false, Ordering::SeqCst);
    }

    /// Point-in-time summary for listing
    pub async fn summary(&self) -> TriggerSummary {
        let state = self.state.read().await;
        TriggerSummary {
            index: self.index,
            expression: state.expression.to_string(),
            action: state.action.clone(),
            run_condition: state.run_condition,
            triggered: self.is_triggered(),
            last_fired: state.last_fired,
        }
    }
}

/// Point-in-time view of a trigger, for listing and logging
#[derive(Debug, Clone, Serialize)]
pub struct TriggerSummary {
    pub index: u32,
    pub expression: String,
    pub action: String,
    pub run_condition: RunCondition,
    pub triggered: bool,
    pub last_fired: Option<DateTime<Utc>>,
}

impl std::fmt::Display for TriggerSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Expression: '{}', Action: '{}', RunCondition: {}, Triggered: {}",
            self.expression, self.action, self.run_condition, self.triggered
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trigger() -> Trigger {
        Trigger::new(
            3,
            TriggerExpression::parse("sensors.temp>200").unwrap(),
            "M106 S1",
            false,
        )
    }

    #[tokio::test]
    async fn test_new_trigger_is_disabled_and_armed() {
        let trigger = sample_trigger();
        assert_eq!(trigger.run_condition().await, RunCondition::Disabled);
        assert!(!trigger.is_triggered());
    }

    #[tokio::test]
    async fn test_initial_latch_can_be_seeded() {
        let trigger = Trigger::new(
            1,
            TriggerExpression::parse("a==b").unwrap(),
            "M99",
            true,
        );
        assert!(trigger.is_triggered());
    }

    #[tokio::test]
    async fn test_partial_setters_leave_other_fields() {
        let trigger = sample_trigger();
        trigger.set_action("M107").await;

        let summary = trigger.summary().await;
        assert_eq!(summary.action, "M107");
        assert_eq!(summary.expression, "sensors.temp > 200");

        trigger
            .set_expression(TriggerExpression::parse("sensors.temp<50").unwrap())
            .await;
        let summary = trigger.summary().await;
        assert_eq!(summary.expression, "sensors.temp < 50");
        assert_eq!(summary.action, "M107");
    }

    #[tokio::test]
    async fn test_summary_rendering() {
        let trigger = sample_trigger();
        let summary = trigger.summary().await;
        assert_eq!(
            summary.to_string(),
            "Expression: 'sensors.temp > 200', Action: 'M106 S1', RunCondition: Disabled, Triggered: false"
        );
    }
}
