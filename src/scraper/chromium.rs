//! Chrome DevTools Protocol backed [`BrowserSurface`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;

use super::BrowserSurface;

/// How to start the browser.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Explicit Chrome/Chromium binary; searched for when unset.
    pub chrome_path: Option<PathBuf>,

    /// Persistent profile directory, so cookies survive between runs.
    pub profile_dir: Option<PathBuf>,

    /// Show a browser window of this size instead of running headless.
    pub window_size: Option<(u32, u32)>,
}

/// A single browser page driven over CDP.
pub struct ChromiumSurface {
    _browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl ChromiumSurface {
    pub async fn launch(options: &LaunchOptions) -> Result<Self> {
        let chrome_path = match &options.chrome_path {
            Some(path) => path.display().to_string(),
            None => find_chrome().context(
                "Chrome/Chromium not found. Install it or set browser.chrome_path in the config.",
            )?,
        };

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");

        if let Some((width, height)) = options.window_size {
            builder = builder.with_head().window_size(width, height).viewport(None);
        }

        if let Some(profile_dir) = &options.profile_dir {
            ensure_dir(profile_dir)?;
            builder = builder.user_data_dir(profile_dir);
        }

        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to configure browser: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;
        let handler_task = tokio::spawn(async move { while (handler.next().await).is_some() {} });

        let page = browser
            .new_page("about:blank")
            .await
            .context("Failed to open browser page")?;

        tracing::debug!(headless = options.window_size.is_none(), "Browser launched");

        Ok(Self {
            _browser: browser,
            page,
            handler_task,
        })
    }
}

impl Drop for ChromiumSurface {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

#[async_trait]
impl BrowserSurface for ChromiumSurface {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("Failed to load {url}"))?;
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build evaluate params: {e}"))?;

        let result = self
            .page
            .evaluate_expression(params)
            .await
            .context("Script evaluation failed")?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create profile dir: {}", dir.display()))
}

/// Find Chrome/Chromium executable.
fn find_chrome() -> Option<String> {
    for name in ["google-chrome", "chromium"] {
        if let Ok(output) = std::process::Command::new("which").arg(name).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Some(path);
                }
            }
        }
    }

    let candidates = [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/run/current-system/sw/bin/google-chrome",
        "/run/current-system/sw/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];

    candidates
        .into_iter()
        .find(|candidate| Path::new(candidate).exists())
        .map(str::to_string)
}
