//! Access to the page: navigation and named in-page function calls.
//!
//! The runner only talks to a [`ScriptBridge`]. [`PageBridge`] implements it
//! on top of any [`BrowserSurface`] by injecting a script namespace into the
//! loaded page and calling functions on it.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::StepError;

/// Navigation and function calls against the current page.
#[async_trait]
pub trait ScriptBridge: Send + Sync {
    /// Invoke `name` from the page's script namespace and return its result.
    ///
    /// Strings, booleans and JSON values come back as the matching
    /// [`Value`]; functions returning nothing yield `Value::Null`.
    async fn call_function(&self, name: &str, args: &[Value]) -> Result<Value, StepError>;

    /// Navigate to `url` and wait until the page has loaded.
    async fn load_page(&self, url: &str) -> Result<(), StepError>;
}

/// Low-level capability of a scriptable browser view.
#[async_trait]
pub trait BrowserSurface: Send + Sync {
    /// Navigate and wait for the load event.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Evaluate a JavaScript expression, awaiting promises, and return the
    /// result as JSON.
    async fn evaluate(&self, expression: &str) -> Result<Value>;
}

/// [`ScriptBridge`] over a [`BrowserSurface`] with an injected namespace.
pub struct PageBridge<S> {
    surface: S,
    namespace: String,
    script: String,
    navigation_timeout: Option<Duration>,
    script_timeout: Option<Duration>,
}

impl<S: BrowserSurface> PageBridge<S> {
    /// `script` must declare a top-level `namespace` binding whose properties are
    /// the callable functions.
    pub fn new(surface: S, namespace: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            surface,
            namespace: namespace.into(),
            script: script.into(),
            navigation_timeout: None,
            script_timeout: None,
        }
    }

    pub fn with_navigation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    pub fn with_script_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.script_timeout = timeout;
        self
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Build the expression evaluated for a call.
    ///
    /// The namespace source is inlined into the expression and run inside a
    /// function scope, and the namespace object it defines is published on
    /// `window`. Nothing goes through `eval`, so pages whose
    /// Content-Security-Policy forbids `unsafe-eval` still accept the call.
    pub fn call_expression(&self, name: &str, args: &[Value]) -> Result<String, StepError> {
        if !is_identifier(&self.namespace) {
            return Err(StepError::script(
                name,
                format!("Invalid script namespace {:?}", self.namespace),
            ));
        }
        let ident = &self.namespace;
        let script = &self.script;
        let namespace = json_literal(&self.namespace, name)?;
        let function = json_literal(name, name)?;
        let args = args
            .iter()
            .map(|arg| json_literal(arg, name))
            .collect::<Result<Vec<_>, _>>()?
            .join(", ");

        Ok(format!(
            "(() => {{\n\
             if (typeof window[{namespace}] === 'undefined') {{\n\
             window[{namespace}] = (function() {{\n{script}\nreturn {ident};\n}})();\n\
             }}\n\
             const ns = window[{namespace}];\n\
             if (!ns || typeof ns[{function}] !== 'function') {{ \
             throw new Error('Unknown function ' + {function}); }}\n\
             return ns[{function}]({args});\n\
             }})()"
        ))
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

#[async_trait]
impl<S: BrowserSurface> ScriptBridge for PageBridge<S> {
    async fn call_function(&self, name: &str, args: &[Value]) -> Result<Value, StepError> {
        let expression = self.call_expression(name, args)?;
        tracing::trace!(function = %name, args = args.len(), "Calling page function");

        let operation = format!("Script function {name}");
        with_timeout(self.script_timeout, operation, self.surface.evaluate(&expression))
            .await?
            .map_err(|e| StepError::script(name, format!("{e:#}")))
    }

    async fn load_page(&self, url: &str) -> Result<(), StepError> {
        tracing::debug!(url = %url, "Loading page");

        let operation = format!("Navigation to {url}");
        with_timeout(self.navigation_timeout, operation, self.surface.navigate(url))
            .await?
            .map_err(|e| StepError::navigation(url, format!("{e:#}")))
    }
}

fn json_literal<T: serde::Serialize + ?Sized>(value: &T, function: &str) -> Result<String, StepError> {
    serde_json::to_string(value)
        .map_err(|e| StepError::script(function, format!("Failed to encode argument: {e}")))
}

async fn with_timeout<F: Future>(
    timeout: Option<Duration>,
    operation: String,
    future: F,
) -> Result<F::Output, StepError> {
    match timeout {
        None => Ok(future.await),
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| StepError::BridgeTimeout {
                operation,
                timeout: limit,
            }),
    }
}
