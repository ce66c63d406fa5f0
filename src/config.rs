use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::duration::{deserialize_duration, deserialize_duration_opt};
use crate::scraper::{RunnerOptions, DEFAULT_POLL_INTERVAL};

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

fn default_history_days() -> u32 {
    90
}

/// Browser launch settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Chrome/Chromium executable. Searched for on PATH when unset.
    pub chrome_path: Option<PathBuf>,

    /// Browser profile directory. If relative, resolved from the config
    /// file location. Keeping a profile lets the bank remember the device.
    pub profile_dir: Option<PathBuf>,

    /// Window size used when the browser is shown.
    pub window_width: Option<u32>,
    pub window_height: Option<u32>,
}

/// Limits on how long a single browser operation may take.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Page navigation limit. Unbounded when unset.
    #[serde(default, deserialize_with = "deserialize_duration_opt")]
    pub navigation: Option<Duration>,

    /// Single script call limit. Unbounded when unset.
    #[serde(default, deserialize_with = "deserialize_duration_opt")]
    pub script: Option<Duration>,

    /// Interval between page condition checks.
    #[serde(
        default = "default_poll_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub poll_interval: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            navigation: None,
            script: None,
            poll_interval: default_poll_interval(),
        }
    }
}

/// Step runner settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Abort a run after this many executed steps. Unlimited when unset.
    pub max_steps: Option<usize>,
}

/// Bank login settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TangerineConfig {
    /// Login ID. Prompted for when unset.
    pub username: Option<String>,

    /// How far back transaction downloads reach when no start date is given.
    #[serde(default = "default_history_days")]
    pub history_days: u32,
}

impl Default for TangerineConfig {
    fn default() -> Self {
        Self {
            username: None,
            history_days: default_history_days(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub browser: BrowserConfig,
    pub timeouts: TimeoutConfig,
    pub runner: RunnerConfig,
    pub tangerine: TangerineConfig,
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load config from a file, or return default config if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Loaded configuration with paths resolved against the config directory.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config_dir: PathBuf,
    pub browser: BrowserConfig,
    pub timeouts: TimeoutConfig,
    pub runner: RunnerConfig,
    pub tangerine: TangerineConfig,
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./tangerine.toml` if it exists in current directory
/// 2. `<config dir>/tangerine-downloader/tangerine.toml`
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("tangerine.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir
            .join("tangerine-downloader")
            .join("tangerine.toml");
    }

    local_config
}

impl ResolvedConfig {
    /// Load and resolve config from a file path.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_path = config_path
            .canonicalize()
            .with_context(|| format!("Config file not found: {}", config_path.display()))?;

        let config_dir = config_path
            .parent()
            .context("Config file has no parent directory")?;

        let config = Config::load(&config_path)?;
        Ok(Self::resolve(config, config_dir))
    }

    /// Load config, falling back to defaults if the file doesn't exist.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            return Self::load(config_path);
        }

        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };

        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?;

        Ok(Self::resolve(Config::default(), config_dir))
    }

    fn resolve(mut config: Config, config_dir: &Path) -> Self {
        config.browser.profile_dir = config.browser.profile_dir.map(|dir| {
            if dir.is_absolute() {
                dir
            } else {
                config_dir.join(dir)
            }
        });

        Self {
            config_dir: config_dir.to_path_buf(),
            browser: config.browser,
            timeouts: config.timeouts,
            runner: config.runner,
            tangerine: config.tangerine,
        }
    }

    pub fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            poll_interval: self.timeouts.poll_interval,
            max_steps: self.runner.max_steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_leave_bridge_unbounded() {
        let config = Config::default();
        assert_eq!(config.timeouts.navigation, None);
        assert_eq!(config.timeouts.script, None);
        assert_eq!(config.timeouts.poll_interval, Duration::from_millis(250));
        assert_eq!(config.runner.max_steps, None);
        assert_eq!(config.tangerine.history_days, 90);
    }

    #[test]
    fn test_load_empty_config() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("tangerine.toml");
        std::fs::File::create(&config_path)?;

        let config = Config::load(&config_path)?;
        assert!(config.browser.chrome_path.is_none());
        assert!(config.tangerine.username.is_none());

        Ok(())
    }

    #[test]
    fn test_load_full_config() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("tangerine.toml");

        let mut file = std::fs::File::create(&config_path)?;
        writeln!(file, "[browser]")?;
        writeln!(file, "chrome_path = \"/usr/bin/chromium\"")?;
        writeln!(file, "window_width = 1280")?;
        writeln!(file, "[timeouts]")?;
        writeln!(file, "navigation = \"30s\"")?;
        writeln!(file, "script = \"10s\"")?;
        writeln!(file, "poll_interval = \"100ms\"")?;
        writeln!(file, "[runner]")?;
        writeln!(file, "max_steps = 200")?;
        writeln!(file, "[tangerine]")?;
        writeln!(file, "username = \"jane\"")?;
        writeln!(file, "history_days = 30")?;

        let config = Config::load(&config_path)?;
        assert_eq!(
            config.browser.chrome_path,
            Some(PathBuf::from("/usr/bin/chromium"))
        );
        assert_eq!(config.browser.window_width, Some(1280));
        assert_eq!(config.browser.window_height, None);
        assert_eq!(config.timeouts.navigation, Some(Duration::from_secs(30)));
        assert_eq!(config.timeouts.script, Some(Duration::from_secs(10)));
        assert_eq!(config.timeouts.poll_interval, Duration::from_millis(100));
        assert_eq!(config.runner.max_steps, Some(200));
        assert_eq!(config.tangerine.username.as_deref(), Some("jane"));
        assert_eq!(config.tangerine.history_days, 30);

        Ok(())
    }

    #[test]
    fn test_invalid_duration_is_rejected() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("tangerine.toml");

        let mut file = std::fs::File::create(&config_path)?;
        writeln!(file, "[timeouts]")?;
        writeln!(file, "navigation = \"soon\"")?;

        assert!(Config::load(&config_path).is_err());
        Ok(())
    }

    #[test]
    fn test_resolved_config_resolves_relative_profile_dir() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("tangerine.toml");

        let mut file = std::fs::File::create(&config_path)?;
        writeln!(file, "[browser]")?;
        writeln!(file, "profile_dir = \"profile\"")?;

        let resolved = ResolvedConfig::load(&config_path)?;
        let expected = dir.path().canonicalize()?.join("profile");
        assert_eq!(resolved.browser.profile_dir, Some(expected));

        Ok(())
    }

    #[test]
    fn test_resolved_config_load_or_default_missing_file() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("tangerine.toml");

        let resolved = ResolvedConfig::load_or_default(&config_path)?;
        assert_eq!(resolved.config_dir, dir.path());
        assert!(resolved.browser.profile_dir.is_none());

        let options = resolved.runner_options();
        assert_eq!(options.max_steps, None);
        assert_eq!(options.poll_interval, Duration::from_millis(250));

        Ok(())
    }
}
