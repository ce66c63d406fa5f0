use anyhow::Result;
use async_trait::async_trait;

use crate::scraper::ScriptBridge;

/// Where the browser should be shown while logging in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostView {
    pub width: u32,
    pub height: u32,
}

impl Default for HostView {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 900,
        }
    }
}

/// Capabilities the downloader needs from its embedding application.
pub trait TangerineDelegate: Send + Sync {
    /// Return the one-time passcode the user received during login.
    ///
    /// Called off the step sequence on a blocking thread, so it may wait
    /// for user input.
    fn get_one_time_code(&self) -> String;

    /// Return a view to show the browser in, or `None` to keep it hidden.
    fn provide_host_view(&self) -> Option<HostView>;
}

/// Opens a bridge to a fresh browser page.
#[async_trait]
pub trait BridgeFactory: Send + Sync {
    async fn open(&self, host_view: Option<HostView>) -> Result<Box<dyn ScriptBridge>>;
}

#[cfg(feature = "browser")]
pub use chromium::ChromiumBridgeFactory;

#[cfg(feature = "browser")]
mod chromium {
    use std::time::Duration;

    use anyhow::Result;
    use async_trait::async_trait;

    use super::{BridgeFactory, HostView};
    use crate::config::ResolvedConfig;
    use crate::scraper::{ChromiumSurface, LaunchOptions, PageBridge, ScriptBridge};
    use crate::tangerine::{SCRIPT_NAMESPACE, SCRIPT_SOURCE};

    /// Launches Chromium and binds the Tangerine script namespace to it.
    #[derive(Debug, Clone, Default)]
    pub struct ChromiumBridgeFactory {
        launch: LaunchOptions,
        navigation_timeout: Option<Duration>,
        script_timeout: Option<Duration>,
    }

    impl ChromiumBridgeFactory {
        pub fn new(launch: LaunchOptions) -> Self {
            Self {
                launch,
                ..Default::default()
            }
        }

        pub fn from_config(config: &ResolvedConfig) -> Self {
            Self {
                launch: LaunchOptions {
                    chrome_path: config.browser.chrome_path.clone(),
                    profile_dir: config.browser.profile_dir.clone(),
                    window_size: None,
                },
                navigation_timeout: config.timeouts.navigation,
                script_timeout: config.timeouts.script,
            }
        }
    }

    #[async_trait]
    impl BridgeFactory for ChromiumBridgeFactory {
        async fn open(&self, host_view: Option<HostView>) -> Result<Box<dyn ScriptBridge>> {
            let mut launch = self.launch.clone();
            launch.window_size = host_view.map(|view| (view.width, view.height));

            let surface = ChromiumSurface::launch(&launch).await?;
            let bridge = PageBridge::new(surface, SCRIPT_NAMESPACE, SCRIPT_SOURCE)
                .with_navigation_timeout(self.navigation_timeout)
                .with_script_timeout(self.script_timeout);

            Ok(Box::new(bridge))
        }
    }
}
