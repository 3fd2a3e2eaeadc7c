//! Session configuration, loaded from YAML with environment overrides.

use anyhow::{Context, Result};
use content_directory::DirectoryConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::session::VideoMode;
use crate::tracking::CandidatePolicy;

pub const ENV_CONFIG_PATH: &str = "AR_SESSION_CONFIG";
pub const ENV_BASE_URL: &str = "AR_SESSION_BASE_URL";
pub const ENV_API_KEY: &str = "AR_SESSION_API_KEY";
pub const ENV_LOCAL_TESTING: &str = "AR_SESSION_LOCAL_TESTING";
pub const ENV_TOUCH_TO_SCAN: &str = "AR_SESSION_TOUCH_TO_SCAN";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub directory: DirectoryConfig,
    pub session: SessionOptions,
    pub local_testing: LocalTestingConfig,
    pub reference_library: ReferenceLibraryConfig,
}

/// Behaviour of the resolution state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// When set, detection only arms the scan gate; resolution waits for an
    /// explicit scan.
    pub touch_to_scan: bool,

    /// Used when video metadata names neither overlay nor popup.
    pub default_video_mode: VideoMode,

    pub candidate_policy: CandidatePolicy,

    /// Upper bound on each directory call made during a resolution.
    pub resolution_timeout_secs: u64,

    /// Upper bound on the presenter readying content.
    pub presentation_timeout_secs: u64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            touch_to_scan: false,
            default_video_mode: VideoMode::default(),
            candidate_policy: CandidatePolicy::default(),
            resolution_timeout_secs: 30,
            presentation_timeout_secs: 30,
        }
    }
}

impl SessionOptions {
    pub fn resolution_timeout(&self) -> Duration {
        Duration::from_secs(self.resolution_timeout_secs)
    }

    pub fn presentation_timeout(&self) -> Duration {
        Duration::from_secs(self.presentation_timeout_secs)
    }

    pub fn touch_to_scan(mut self, enabled: bool) -> Self {
        self.touch_to_scan = enabled;
        self
    }

    pub fn default_video_mode(mut self, mode: VideoMode) -> Self {
        self.default_video_mode = mode;
        self
    }

    pub fn candidate_policy(mut self, policy: CandidatePolicy) -> Self {
        self.candidate_policy = policy;
        self
    }

    pub fn resolution_timeout_secs(mut self, secs: u64) -> Self {
        self.resolution_timeout_secs = secs;
        self
    }

    pub fn presentation_timeout_secs(mut self, secs: u64) -> Self {
        self.presentation_timeout_secs = secs;
        self
    }
}

/// Offline mode serving bundled samples instead of the directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalTestingConfig {
    pub enabled: bool,
    pub simulated_delay_ms: u64,
    pub sample_assets_dir: PathBuf,
    pub asset_bundle_dir: PathBuf,
}

impl Default for LocalTestingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            simulated_delay_ms: 3000,
            sample_assets_dir: PathBuf::from("SampleAssets"),
            asset_bundle_dir: PathBuf::from("AssetBundle/Android"),
        }
    }
}

impl LocalTestingConfig {
    pub fn simulated_delay(&self) -> Duration {
        Duration::from_millis(self.simulated_delay_ms)
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn simulated_delay_ms(mut self, ms: u64) -> Self {
        self.simulated_delay_ms = ms;
        self
    }

    pub fn sample_assets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sample_assets_dir = dir.into();
        self
    }

    pub fn asset_bundle_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.asset_bundle_dir = dir.into();
        self
    }
}

/// Runtime reference-image library synced from a backend file collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceLibraryConfig {
    pub collection_id: Option<String>,
    pub cache_dir: PathBuf,
    /// Physical width assigned to every synced reference image, in metres.
    pub physical_width_m: f32,
}

impl Default for ReferenceLibraryConfig {
    fn default() -> Self {
        Self {
            collection_id: None,
            cache_dir: PathBuf::from("ImageCache"),
            physical_width_m: 0.5,
        }
    }
}

impl SessionConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse session config")
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&raw).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Load from `path`, or from `AR_SESSION_CONFIG`, or fall back to
    /// defaults; environment overrides apply in every case.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var(ENV_CONFIG_PATH).ok().map(PathBuf::from);
        let config = match path.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(config.with_env_overrides())
    }

    pub fn with_env_overrides(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup.
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(base_url) = lookup(ENV_BASE_URL).filter(|v| !v.is_empty()) {
            self.directory.base_url = base_url;
        }
        if let Some(api_key) = lookup(ENV_API_KEY).filter(|v| !v.is_empty()) {
            self.directory.api_key = Some(api_key);
        }
        if let Some(flag) = lookup(ENV_LOCAL_TESTING).and_then(|v| parse_flag(&v)) {
            self.local_testing.enabled = flag;
        }
        if let Some(flag) = lookup(ENV_TOUCH_TO_SCAN).and_then(|v| parse_flag(&v)) {
            self.session.touch_to_scan = flag;
        }
        self
    }

    pub fn local_testing(mut self, enabled: bool) -> Self {
        self.local_testing.enabled = enabled;
        self
    }

    pub fn touch_to_scan(mut self, enabled: bool) -> Self {
        self.session.touch_to_scan = enabled;
        self
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
