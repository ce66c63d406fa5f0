//! Sequencing engine that executes step lists against a bridge.

use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use super::{Completion, Directive, Model, ScriptArgs, ScriptBridge, Step, StepError};

/// Default interval between condition polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Lifecycle of the most recent run.
#[derive(Debug, Clone, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed(StepError),
}

impl RunState {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    pub fn error(&self) -> Option<&StepError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Tuning knobs for a [`StepRunner`].
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub poll_interval: Duration,

    /// Upper bound on executed steps per run. `None` leaves jump loops
    /// unguarded.
    pub max_steps: Option<usize>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_steps: None,
        }
    }
}

/// Runs step lists against one bridge, accumulating a shared [`Model`].
///
/// `run` borrows the runner mutably, so a second run can only start after
/// the previous one has finished. Later runs see everything earlier runs
/// wrote to the model.
pub struct StepRunner {
    bridge: Box<dyn ScriptBridge>,
    model: Model,
    state: RunState,
    index: usize,
    options: RunnerOptions,
}

impl StepRunner {
    pub fn new(bridge: Box<dyn ScriptBridge>) -> Self {
        Self {
            bridge,
            model: Model::new(),
            state: RunState::Idle,
            index: 0,
            options: RunnerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunnerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Index of the step currently executing, or where the last run stopped.
    pub fn current_index(&self) -> usize {
        self.index
    }

    /// Execute `steps` from the first one until the list is exhausted or a
    /// step fails.
    pub async fn run(&mut self, steps: &[Step]) -> Result<(), StepError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("step_run", run_id = %run_id, steps = steps.len());
        self.run_inner(steps).instrument(span).await
    }

    /// Like [`run`](Self::run), then hands the terminal state and model to
    /// `on_complete` exactly once.
    pub async fn run_with<F>(&mut self, steps: &[Step], on_complete: F)
    where
        F: FnOnce(&RunState, &Model),
    {
        let _ = self.run(steps).await;
        on_complete(&self.state, &self.model);
    }

    async fn run_inner(&mut self, steps: &[Step]) -> Result<(), StepError> {
        self.state = RunState::Running;
        self.index = 0;
        let mut executed = 0usize;

        while self.index < steps.len() {
            if let Some(limit) = self.options.max_steps {
                if executed >= limit {
                    return self.finish(Err(StepError::StepLimitExceeded { limit }));
                }
            }
            executed += 1;

            let step = &steps[self.index];
            tracing::debug!(index = self.index, kind = step.kind(), "Running step");

            let directive = match self.execute(step).await {
                Ok(directive) => directive,
                Err(err) => return self.finish(Err(err)),
            };

            match directive {
                Directive::Proceed => self.index += 1,
                Directive::JumpToStep(target) => {
                    if target > steps.len() {
                        tracing::warn!(
                            from = self.index,
                            to = target,
                            len = steps.len(),
                            "Jump target is past the end of the step list"
                        );
                    } else {
                        tracing::debug!(from = self.index, to = target, "Jumping");
                    }
                    self.index = target;
                }
                Directive::Fail(err) => return self.finish(Err(err)),
            }
        }

        self.finish(Ok(()))
    }

    fn finish(&mut self, outcome: Result<(), StepError>) -> Result<(), StepError> {
        match &outcome {
            Ok(()) => {
                let keys: Vec<&str> = self.model.keys().collect();
                tracing::info!(keys = ?keys, "Step run succeeded");
                self.state = RunState::Succeeded;
            }
            Err(err) => {
                tracing::warn!(index = self.index, error = %err, "Step run failed");
                self.state = RunState::Failed(err.clone());
            }
        }
        outcome
    }

    async fn execute(&mut self, step: &Step) -> Result<Directive, StepError> {
        match step {
            Step::OpenPage { url } => {
                self.bridge.load_page(url).await?;
                Ok(Directive::Proceed)
            }
            Step::RunScript {
                function,
                args,
                handler,
            } => {
                let args = args.resolve(&self.model);
                let response = self.bridge.call_function(function, &args).await?;
                Ok(handler(response, &mut self.model))
            }
            Step::WaitForCondition {
                assertion,
                args,
                timeout,
            } => {
                self.wait_for_condition(assertion, args, *timeout).await?;
                Ok(Directive::Proceed)
            }
            Step::WaitFixedDuration(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(Directive::Proceed)
            }
            Step::RunAsyncProcess(body) => {
                let (completion, resumed) = Completion::channel();
                body(self.model.clone(), completion);

                let (model, directive) = resumed
                    .await
                    .map_err(|_| StepError::AsyncProcessAbandoned { index: self.index })?;
                self.model = model;
                Ok(directive)
            }
        }
    }

    async fn wait_for_condition(
        &self,
        assertion: &str,
        args: &ScriptArgs,
        timeout: Duration,
    ) -> Result<(), StepError> {
        let args = args.resolve(&self.model);
        let deadline = Instant::now() + timeout;
        let mut polls = 0u32;

        loop {
            polls += 1;
            let result = self.bridge.call_function(assertion, &args).await?;
            if result == Value::Bool(true) {
                tracing::debug!(assertion = %assertion, polls, "Condition met");
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(StepError::ConditionTimeout {
                    assertion: assertion.to_string(),
                    timeout,
                });
            }
            tokio::time::sleep(self.options.poll_interval.min(deadline - now)).await;
        }
    }
}
