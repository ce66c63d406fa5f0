//! Generic engine for scripting a browser page through ordered steps.
//!
//! A [`StepRunner`] executes a list of [`Step`]s against a [`ScriptBridge`],
//! threading a shared [`Model`] through every step. Steps may navigate,
//! call in-page functions, poll for a condition, pause, or suspend the run
//! until out-of-band input arrives.

mod bridge;
#[cfg(feature = "browser")]
mod chromium;
mod error;
mod model;
mod runner;
mod step;

pub use bridge::{BrowserSurface, PageBridge, ScriptBridge};
#[cfg(feature = "browser")]
pub use chromium::{ChromiumSurface, LaunchOptions};
pub use error::StepError;
pub use model::Model;
pub use runner::{RunState, RunnerOptions, StepRunner, DEFAULT_POLL_INTERVAL};
pub use step::{AsyncProcess, Completion, Directive, ScriptArgs, ScriptHandler, Step};
