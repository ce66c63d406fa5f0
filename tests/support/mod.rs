#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tangerine_downloader::scraper::{ScriptBridge, StepError};

type Responder = Box<dyn FnMut(&[Value]) -> Result<Value, StepError> + Send>;

#[derive(Default)]
struct State {
    responders: HashMap<String, Responder>,
    calls: Vec<Call>,
    failing_urls: Vec<String>,
}

/// One interaction with the fake page.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Open(String),
    Function(String, Vec<Value>),
}

/// Scriptable in-memory bridge. Clones share state, so a test can keep one
/// handle while the runner owns another.
#[derive(Clone, Default)]
pub struct FakeBridge {
    state: Arc<Mutex<State>>,
}

impl FakeBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `name` with the result of `responder`.
    pub fn on<F>(self, name: &str, responder: F) -> Self
    where
        F: FnMut(&[Value]) -> Result<Value, StepError> + Send + 'static,
    {
        self.state
            .lock()
            .unwrap()
            .responders
            .insert(name.to_string(), Box::new(responder));
        self
    }

    /// Always answer `name` with `value`.
    pub fn returning(self, name: &str, value: Value) -> Self {
        self.on(name, move |_| Ok(value.clone()))
    }

    /// Answer `false` for the first `falses` calls, then `true`.
    pub fn true_after(self, name: &str, falses: usize) -> Self {
        let mut seen = 0;
        self.on(name, move |_| {
            seen += 1;
            Ok(Value::Bool(seen > falses))
        })
    }

    pub fn failing_navigation(self, url: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_urls
            .push(url.to_string());
        self
    }

    pub fn boxed(&self) -> Box<dyn ScriptBridge> {
        Box::new(self.clone())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Names of called functions and opened URLs, in order.
    pub fn trace(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|call| match call {
                Call::Open(url) => format!("open {url}"),
                Call::Function(name, _) => name,
            })
            .collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Function(n, _) if n == name))
            .count()
    }
}

#[async_trait]
impl ScriptBridge for FakeBridge {
    async fn call_function(&self, name: &str, args: &[Value]) -> Result<Value, StepError> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(Call::Function(name.to_string(), args.to_vec()));
        match state.responders.get_mut(name) {
            Some(responder) => responder(args),
            None => Ok(Value::Null),
        }
    }

    async fn load_page(&self, url: &str) -> Result<(), StepError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Open(url.to_string()));
        if state.failing_urls.iter().any(|u| u == url) {
            return Err(StepError::navigation(url, "net::ERR_NAME_NOT_RESOLVED"));
        }
        Ok(())
    }
}
