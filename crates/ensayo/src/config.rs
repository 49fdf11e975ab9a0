//! Engine configuration and config-file loading.

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::console::ConsoleError;
use crate::result::{EngineError, EnsayoResult};
use crate::step::ActionKind;

/// Default per-test timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default worker count
pub const DEFAULT_WORKERS: usize = 4;

/// Default screenshot baseline directory
pub const DEFAULT_SCREENSHOT_DIR: &str = "__screenshots__";

/// Default HTML snapshot baseline directory
pub const DEFAULT_SNAPSHOT_DIR: &str = "__snapshots__";

/// Config file names searched by [`find_config_file`], in priority order
pub const CONFIG_FILE_NAMES: [&str; 9] = [
    "ensayo.config.yaml",
    "ensayo.config.yml",
    "ensayo.config.json",
    "ensayo.yaml",
    "ensayo.yml",
    "ensayo.json",
    ".ensayo.yaml",
    ".ensayo.yml",
    ".ensayo.json",
];

/// Console suppression predicate: returning `true` drops the error
pub type ConsoleFilter = Arc<dyn Fn(&ConsoleError) -> bool + Send + Sync>;

/// Execution policy shared read-only by every worker
#[derive(Clone)]
pub struct EngineConfig {
    /// Run the browser without a window
    pub headless: bool,
    /// Per-test deadline and default per-action timeout
    pub timeout: Duration,
    /// Fail a test when unsuppressed console errors were captured
    pub fail_on_console_error: bool,
    /// Optional console suppression predicate
    pub error_filter: Option<ConsoleFilter>,
    /// Screenshot baseline directory
    pub screenshot_dir: PathBuf,
    /// Overwrite screenshot baselines instead of comparing
    pub update_screenshots: bool,
    /// Maximum tolerated fraction of differing pixels
    pub screenshot_threshold: f64,
    /// HTML snapshot baseline directory
    pub snapshot_dir: PathBuf,
    /// Overwrite snapshot baselines instead of comparing
    pub update_snapshots: bool,
    /// Per-action-kind timeout overrides
    pub action_timeouts: HashMap<ActionKind, Duration>,
    /// Number of concurrent workers
    pub workers: usize,
    /// Viewport width in pixels
    pub viewport_width: u32,
    /// Viewport height in pixels
    pub viewport_height: u32,
    /// Explicit browser executable
    pub chromium_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            headless: true,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            fail_on_console_error: true,
            error_filter: None,
            screenshot_dir: PathBuf::from(DEFAULT_SCREENSHOT_DIR),
            update_screenshots: false,
            screenshot_threshold: 0.0,
            snapshot_dir: PathBuf::from(DEFAULT_SNAPSHOT_DIR),
            update_snapshots: false,
            action_timeouts: HashMap::new(),
            workers: DEFAULT_WORKERS,
            viewport_width: 1280,
            viewport_height: 720,
            chromium_path: None,
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("headless", &self.headless)
            .field("timeout", &self.timeout)
            .field("fail_on_console_error", &self.fail_on_console_error)
            .field("error_filter", &self.error_filter.as_ref().map(|_| "<fn>"))
            .field("screenshot_dir", &self.screenshot_dir)
            .field("update_screenshots", &self.update_screenshots)
            .field("screenshot_threshold", &self.screenshot_threshold)
            .field("snapshot_dir", &self.snapshot_dir)
            .field("update_snapshots", &self.update_snapshots)
            .field("action_timeouts", &self.action_timeouts)
            .field("workers", &self.workers)
            .field("viewport_width", &self.viewport_width)
            .field("viewport_height", &self.viewport_height)
            .field("chromium_path", &self.chromium_path)
            .finish()
    }
}

impl EngineConfig {
    /// Create a new config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set the per-test timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set fail-on-console-error policy
    #[must_use]
    pub const fn with_fail_on_console_error(mut self, fail: bool) -> Self {
        self.fail_on_console_error = fail;
        self
    }

    /// Set the console suppression predicate
    #[must_use]
    pub fn with_error_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&ConsoleError) -> bool + Send + Sync + 'static,
    {
        self.error_filter = Some(Arc::new(filter));
        self
    }

    /// Set the screenshot baseline directory
    #[must_use]
    pub fn with_screenshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = dir.into();
        self
    }

    /// Overwrite screenshot baselines
    #[must_use]
    pub const fn with_update_screenshots(mut self, update: bool) -> Self {
        self.update_screenshots = update;
        self
    }

    /// Set the screenshot threshold, clamped to 0.0..=1.0
    #[must_use]
    pub fn with_screenshot_threshold(mut self, threshold: f64) -> Self {
        self.screenshot_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set the snapshot baseline directory
    #[must_use]
    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = dir.into();
        self
    }

    /// Overwrite snapshot baselines
    #[must_use]
    pub const fn with_update_snapshots(mut self, update: bool) -> Self {
        self.update_snapshots = update;
        self
    }

    /// Override the timeout for one action kind
    #[must_use]
    pub fn with_action_timeout(mut self, kind: ActionKind, timeout: Duration) -> Self {
        self.action_timeouts.insert(kind, timeout);
        self
    }

    /// Set the worker count (at least 1)
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the viewport size
    #[must_use]
    pub const fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Use an explicit browser executable
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Timeout for an action kind: its override, else the global timeout
    #[must_use]
    pub fn action_timeout(&self, kind: ActionKind) -> Duration {
        self.action_timeouts
            .get(&kind)
            .copied()
            .unwrap_or(self.timeout)
    }

    /// Whether a captured console error should be dropped
    #[must_use]
    pub fn suppresses(&self, error: &ConsoleError) -> bool {
        self.error_filter.as_ref().is_some_and(|filter| filter(error))
    }
}

/// Parse a duration such as `"30s"`, `"500ms"`, `"1m30s"` or `"1.5h"`.
///
/// Components are summed; `"0"` is accepted on its own.
pub fn parse_duration(input: &str) -> EnsayoResult<Duration> {
    let s = input.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(EngineError::configuration("empty duration"));
    }

    let invalid = || EngineError::configuration(format!("invalid duration: {input}"));
    let mut total = 0.0_f64;
    let mut rest = s;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];
        total += value * scale;
    }

    Duration::try_from_secs_f64(total).map_err(|_| invalid())
}

/// A duration written as a string in config files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct ConfigDuration(pub Duration);

impl TryFrom<String> for ConfigDuration {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_duration(&value).map(Self)
    }
}

/// Settings read from `ensayo.config.yaml` and friends.
///
/// Every field is optional; present fields override the defaults and are
/// themselves overridden by explicit command-line flags.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FileConfig {
    /// Headless mode
    pub headless: Option<bool>,
    /// Per-test timeout
    pub timeout: Option<ConfigDuration>,
    /// Fail on console errors
    pub fail_on_console_error: Option<bool>,
    /// Screenshot baseline directory
    pub screenshot_dir: Option<PathBuf>,
    /// Overwrite screenshot baselines
    pub update_screenshots: Option<bool>,
    /// Screenshot diff threshold
    pub screenshot_threshold: Option<f64>,
    /// Snapshot baseline directory
    pub snapshot_dir: Option<PathBuf>,
    /// Overwrite snapshot baselines
    pub update_snapshots: Option<bool>,
    /// Worker count
    pub workers: Option<usize>,
    /// Viewport width
    pub viewport_width: Option<u32>,
    /// Viewport height
    pub viewport_height: Option<u32>,
    /// Browser executable
    pub chromium_path: Option<PathBuf>,
    /// Per-action timeouts keyed by DSL action name
    #[serde(default)]
    pub action_timeouts: HashMap<String, ConfigDuration>,
}

impl FileConfig {
    /// Load a config file, choosing the format from its extension
    pub fn load(path: &Path) -> EnsayoResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext {
            "yaml" | "yml" => Self::from_yaml(&contents),
            "json" => Self::from_json(&contents),
            other => Err(EngineError::configuration(format!(
                "unsupported config file format: .{other}"
            ))),
        }
    }

    /// Parse YAML config text
    pub fn from_yaml(contents: &str) -> EnsayoResult<Self> {
        serde_yaml_ng::from_str(contents).map_err(|e| {
            EngineError::configuration(format!("failed to parse config file: {e}"))
        })
    }

    /// Parse JSON config text
    pub fn from_json(contents: &str) -> EnsayoResult<Self> {
        serde_json::from_str(contents).map_err(|e| {
            EngineError::configuration(format!("failed to parse config file: {e}"))
        })
    }

    /// Layer these settings over `config`
    pub fn apply_to(&self, mut config: EngineConfig) -> EnsayoResult<EngineConfig> {
        if let Some(headless) = self.headless {
            config.headless = headless;
        }
        if let Some(ConfigDuration(timeout)) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(fail) = self.fail_on_console_error {
            config.fail_on_console_error = fail;
        }
        if let Some(dir) = &self.screenshot_dir {
            config.screenshot_dir.clone_from(dir);
        }
        if let Some(update) = self.update_screenshots {
            config.update_screenshots = update;
        }
        if let Some(threshold) = self.screenshot_threshold {
            config = config.with_screenshot_threshold(threshold);
        }
        if let Some(dir) = &self.snapshot_dir {
            config.snapshot_dir.clone_from(dir);
        }
        if let Some(update) = self.update_snapshots {
            config.update_snapshots = update;
        }
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        if let Some(width) = self.viewport_width {
            config.viewport_width = width;
        }
        if let Some(height) = self.viewport_height {
            config.viewport_height = height;
        }
        if let Some(path) = &self.chromium_path {
            config.chromium_path = Some(path.clone());
        }
        for (action, ConfigDuration(timeout)) in &self.action_timeouts {
            let kind: ActionKind = action.parse()?;
            config.action_timeouts.insert(kind, *timeout);
        }
        Ok(config)
    }
}

/// Find the first known config file in `dir`
#[must_use]
pub fn find_config_file(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.headless);
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert!(config.fail_on_console_error);
        assert_eq!(config.screenshot_dir, PathBuf::from("__screenshots__"));
        assert_eq!(config.snapshot_dir, PathBuf::from("__snapshots__"));
        assert_eq!(config.screenshot_threshold, 0.0);
        assert_eq!(config.workers, 4);
        assert_eq!((config.viewport_width, config.viewport_height), (1280, 720));
    }

    #[test]
    fn test_builder_clamps() {
        let config = EngineConfig::new()
            .with_screenshot_threshold(1.7)
            .with_workers(0);
        assert_eq!(config.screenshot_threshold, 1.0);
        assert_eq!(config.workers, 1);
    }

    #[test]
    fn test_action_timeout_override() {
        let config = EngineConfig::new()
            .with_timeout(Duration::from_secs(5))
            .with_action_timeout(ActionKind::Navigate, Duration::from_secs(30));
        assert_eq!(
            config.action_timeout(ActionKind::Navigate),
            Duration::from_secs(30)
        );
        assert_eq!(config.action_timeout(ActionKind::Click), Duration::from_secs(5));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("5 parsecs").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("99999999999999999999999h").is_err());
    }

    #[test]
    fn test_file_config_yaml() {
        let yaml = r"
headless: false
timeout: 30s
failOnConsoleError: false
screenshotThreshold: 0.02
viewportWidth: 800
actionTimeouts:
  navigate: 1m
  wait_for_url: 500ms
";
        let file = FileConfig::from_yaml(yaml).unwrap();
        let config = file.apply_to(EngineConfig::default()).unwrap();
        assert!(!config.headless);
        assert!(!config.fail_on_console_error);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.screenshot_threshold, 0.02);
        assert_eq!(config.viewport_width, 800);
        assert_eq!(config.viewport_height, 720);
        assert_eq!(
            config.action_timeout(ActionKind::Navigate),
            Duration::from_secs(60)
        );
        assert_eq!(
            config.action_timeout(ActionKind::WaitForUrl),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_file_config_json() {
        let json = r#"{"screenshotDir": "shots", "updateSnapshots": true, "workers": 2}"#;
        let config = FileConfig::from_json(json)
            .unwrap()
            .apply_to(EngineConfig::default())
            .unwrap();
        assert_eq!(config.screenshot_dir, PathBuf::from("shots"));
        assert!(config.update_snapshots);
        assert_eq!(config.workers, 2);
    }

    #[test]
    fn test_file_config_rejects_bad_values() {
        assert!(FileConfig::from_yaml("timeout: forever").is_err());
        assert!(FileConfig::from_yaml("colour: red").is_err());

        let file = FileConfig::from_yaml("actionTimeouts:\n  teleport: 1s\n").unwrap();
        assert!(file.apply_to(EngineConfig::default()).is_err());
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("ensayo.yml");
        std::fs::write(&yaml, "workers: 8\n").unwrap();
        assert_eq!(FileConfig::load(&yaml).unwrap().workers, Some(8));

        let toml = dir.path().join("ensayo.toml");
        std::fs::write(&toml, "workers = 8\n").unwrap();
        let err = FileConfig::load(&toml).unwrap_err();
        assert!(err.to_string().contains("unsupported config file format"));
    }

    #[test]
    fn test_find_config_file_priority() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_config_file(dir.path()).is_none());

        std::fs::write(dir.path().join(".ensayo.json"), "{}").unwrap();
        std::fs::write(dir.path().join("ensayo.yaml"), "").unwrap();
        let found = find_config_file(dir.path()).unwrap();
        assert_eq!(found.file_name().unwrap(), "ensayo.yaml");
    }
}
