use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;

use super::{Model, StepError};

/// How the runner should advance after a step.
#[derive(Debug, Clone)]
pub enum Directive {
    Proceed,
    /// Continue at an absolute index in the current step list.
    JumpToStep(usize),
    Fail(StepError),
}

/// Arguments passed to an in-page function.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptArgs {
    /// Literal values, passed in order.
    Positional(Vec<Value>),
    /// Model keys whose values are read when the step runs. Missing keys
    /// are passed as `null`.
    Keyed(Vec<String>),
}

impl ScriptArgs {
    pub fn none() -> Self {
        Self::Positional(Vec::new())
    }

    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Positional(values.into_iter().map(Into::into).collect())
    }

    pub fn keyed<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self::Keyed(keys.into_iter().map(Into::into).collect())
    }

    pub(crate) fn resolve(&self, model: &Model) -> Vec<Value> {
        match self {
            Self::Positional(values) => values.clone(),
            Self::Keyed(keys) => keys
                .iter()
                .map(|key| match model.get(key) {
                    Some(value) => value.clone(),
                    None => {
                        tracing::debug!(key = %key, "Model key missing; passing null");
                        Value::Null
                    }
                })
                .collect(),
        }
    }
}

/// Handles the value returned by a script call.
pub type ScriptHandler = Arc<dyn Fn(Value, &mut Model) -> Directive + Send + Sync>;

/// Body of an async process step. It receives a copy of the model and must
/// eventually resume the run through the [`Completion`].
pub type AsyncProcess = Arc<dyn Fn(Model, Completion) + Send + Sync>;

/// Single-use handle that resumes a suspended run.
///
/// Can be moved to any thread. Consuming `self` guarantees the run is
/// resumed at most once; dropping it unused fails the run.
pub struct Completion {
    sender: oneshot::Sender<(Model, Directive)>,
}

impl Completion {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<(Model, Directive)>) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender }, receiver)
    }

    /// Resume the run with `model` replacing the runner's model.
    pub fn complete(self, model: Model, directive: Directive) {
        if self.sender.send((model, directive)).is_err() {
            tracing::debug!("Async process completed after its run was dropped");
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}

/// One unit of browser-driving work.
#[derive(Clone)]
pub enum Step {
    OpenPage {
        url: String,
    },
    RunScript {
        function: String,
        args: ScriptArgs,
        handler: ScriptHandler,
    },
    WaitForCondition {
        assertion: String,
        args: ScriptArgs,
        timeout: Duration,
    },
    WaitFixedDuration(Duration),
    RunAsyncProcess(AsyncProcess),
}

impl Step {
    pub fn open_page(url: impl Into<String>) -> Self {
        Self::OpenPage { url: url.into() }
    }

    /// Call `function` and let `handler` decide how to continue.
    pub fn run_script<F>(function: impl Into<String>, args: ScriptArgs, handler: F) -> Self
    where
        F: Fn(Value, &mut Model) -> Directive + Send + Sync + 'static,
    {
        Self::RunScript {
            function: function.into(),
            args,
            handler: Arc::new(handler),
        }
    }

    /// Call `function` and ignore its result.
    pub fn call(function: impl Into<String>, args: ScriptArgs) -> Self {
        Self::run_script(function, args, |_, _| Directive::Proceed)
    }

    pub fn wait_for(assertion: impl Into<String>, args: ScriptArgs, timeout: Duration) -> Self {
        Self::WaitForCondition {
            assertion: assertion.into(),
            args,
            timeout,
        }
    }

    pub fn wait(duration: Duration) -> Self {
        Self::WaitFixedDuration(duration)
    }

    pub fn async_process<F>(body: F) -> Self
    where
        F: Fn(Model, Completion) + Send + Sync + 'static,
    {
        Self::RunAsyncProcess(Arc::new(body))
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OpenPage { .. } => "open_page",
            Self::RunScript { .. } => "run_script",
            Self::WaitForCondition { .. } => "wait_for_condition",
            Self::WaitFixedDuration(_) => "wait",
            Self::RunAsyncProcess(_) => "async_process",
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenPage { url } => f.debug_struct("OpenPage").field("url", url).finish(),
            Self::RunScript { function, args, .. } => f
                .debug_struct("RunScript")
                .field("function", function)
                .field("args", args)
                .finish_non_exhaustive(),
            Self::WaitForCondition {
                assertion,
                args,
                timeout,
            } => f
                .debug_struct("WaitForCondition")
                .field("assertion", assertion)
                .field("args", args)
                .field("timeout", timeout)
                .finish(),
            Self::WaitFixedDuration(duration) => {
                f.debug_tuple("WaitFixedDuration").field(duration).finish()
            }
            Self::RunAsyncProcess(_) => f.write_str("RunAsyncProcess(..)"),
        }
    }
}
