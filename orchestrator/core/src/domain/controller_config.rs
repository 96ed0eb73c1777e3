// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Swarm Controller Configuration
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) covering:
// - Controller identity on the control plane
// - Exchange and queue naming
// - Readiness, bootstrap fanout and worker staleness timings
// - Worker metrics/log export settings injected into containers
// - Journal backend selection and buffering
// - Docker runtime connection

use crate::domain::control_plane::{
    is_routing_segment, ControlPlaneNaming, ControllerIdentity, CONTROLLER_ROLE,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "100monkeys.ai/v1";
pub const KIND: &str = "SwarmControllerConfig";

/// Top-level controller configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfigManifest {
    /// API version (must be "100monkeys.ai/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "SwarmControllerConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: ControllerConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerConfigSpec {
    pub controller: ControllerSection,

    #[serde(default)]
    pub control_plane: ControlPlaneSection,

    #[serde(default)]
    pub traffic: TrafficSection,

    #[serde(default)]
    pub readiness: ReadinessSection,

    #[serde(default)]
    pub fanout: FanoutSection,

    #[serde(default)]
    pub workers: WorkersSection,

    #[serde(default)]
    pub metrics: MetricsSection,

    #[serde(default)]
    pub logging: LoggingSection,

    #[serde(default)]
    pub journal: JournalSection,

    #[serde(default)]
    pub docker: DockerSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerSection {
    /// Swarm this controller owns
    pub swarm_id: String,

    /// Controller instance id (defaults to a hostname-derived value)
    #[serde(default = "default_instance_id")]
    pub instance_id: String,

    #[serde(default = "default_controller_role")]
    pub role: String,
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            swarm_id: String::new(),
            instance_id: default_instance_id(),
            role: default_controller_role(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPlaneSection {
    #[serde(default = "default_control_exchange")]
    pub exchange: String,

    #[serde(default = "default_control_queue_prefix")]
    pub queue_prefix: String,
}

impl Default for ControlPlaneSection {
    fn default() -> Self {
        Self {
            exchange: default_control_exchange(),
            queue_prefix: default_control_queue_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficSection {
    #[serde(default = "default_traffic_exchange_prefix")]
    pub exchange_prefix: String,

    #[serde(default = "default_work_queue_prefix")]
    pub queue_prefix: String,
}

impl Default for TrafficSection {
    fn default() -> Self {
        Self {
            exchange_prefix: default_traffic_exchange_prefix(),
            queue_prefix: default_work_queue_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessSection {
    /// Maximum heartbeat age for a ready instance to count as fresh
    #[serde(default = "default_heartbeat_ttl", with = "humantime_serde")]
    pub heartbeat_ttl: Duration,
}

impl Default for ReadinessSection {
    fn default() -> Self {
        Self {
            heartbeat_ttl: default_heartbeat_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutSection {
    /// Minimum gap between unforced republishes of pending bootstrap config
    #[serde(default = "default_bootstrap_retry", with = "humantime_serde")]
    pub bootstrap_retry_interval: Duration,
}

impl Default for FanoutSection {
    fn default() -> Self {
        Self {
            bootstrap_retry_interval: default_bootstrap_retry(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersSection {
    /// Age after which a worker's last status is reported as stale
    #[serde(default = "default_worker_stale_after", with = "humantime_serde")]
    pub stale_after: Duration,
}

impl Default for WorkersSection {
    fn default() -> Self {
        Self {
            stale_after: default_worker_stale_after(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSection {
    /// Push endpoint handed to workers (e.g. a Prometheus pushgateway)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_endpoint: Option<String>,

    #[serde(default = "default_push_interval", with = "humantime_serde")]
    pub push_interval: Duration,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            push_endpoint: None,
            push_interval: default_push_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Controller log level (e.g., "info", "debug")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Whether workers ship their logs to `export_endpoint`
    #[serde(default)]
    pub export_enabled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_endpoint: Option<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            export_enabled: false,
            export_endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalBackend {
    None,
    File,
    Postgres,
}

impl std::str::FromStr for JournalBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "file" => Ok(Self::File),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(format!("unknown journal backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalSection {
    #[serde(default = "default_journal_backend")]
    pub backend: JournalBackend,

    /// Root directory of the file journal
    #[serde(default = "default_journal_directory")]
    pub directory: PathBuf,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    /// Buffered entries before the batch sink starts dropping
    #[serde(default = "default_journal_capacity")]
    pub capacity: usize,

    #[serde(default = "default_journal_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_journal_flush_interval", with = "humantime_serde")]
    pub flush_interval: Duration,

    #[serde(default = "default_suppression_quiet_period", with = "humantime_serde")]
    pub suppression_quiet_period: Duration,

    #[serde(default = "default_suppression_max_keys")]
    pub suppression_max_keys: usize,

    /// How long journaling stays disabled after the sink itself fails
    #[serde(default = "default_failure_backoff", with = "humantime_serde")]
    pub failure_backoff: Duration,
}

impl Default for JournalSection {
    fn default() -> Self {
        Self {
            backend: default_journal_backend(),
            directory: default_journal_directory(),
            database_url: None,
            capacity: default_journal_capacity(),
            batch_size: default_journal_batch_size(),
            flush_interval: default_journal_flush_interval(),
            suppression_quiet_period: default_suppression_quiet_period(),
            suppression_max_keys: default_suppression_max_keys(),
            failure_backoff: default_failure_backoff(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerSection {
    /// Path to Docker socket (auto-detected when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<String>,

    /// Docker network workers join (None = default bridge)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,

    #[serde(default = "default_true")]
    pub autopull: bool,

    #[serde(default = "default_stop_timeout", with = "humantime_serde")]
    pub stop_timeout: Duration,
}

impl Default for DockerSection {
    fn default() -> Self {
        Self {
            socket_path: None,
            network: None,
            autopull: true,
            stop_timeout: default_stop_timeout(),
        }
    }
}

impl Default for ControllerConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: default_instance_id(),
                labels: None,
            },
            spec: ControllerConfigSpec::default(),
        }
    }
}

impl ControllerConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. AEGIS_SWARM_CONFIG_PATH environment variable
    /// 2. ./aegis-swarm.yaml (working directory)
    /// 3. ~/.aegis/swarm.yaml (user home)
    /// 4. /etc/aegis/swarm.yaml (system, Unix) or C:\ProgramData\Aegis\swarm.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("AEGIS_SWARM_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./aegis-swarm.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".aegis").join("swarm.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/aegis/swarm.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Aegis\\swarm.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = cli_path {
            tracing::info!("Loading controller configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load controller config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading controller configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No controller configuration found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides; container deployments set the
    /// swarm id this way.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("AEGIS_SWARM_ID") {
            tracing::info!("Environment override: AEGIS_SWARM_ID={}", val);
            self.spec.controller.swarm_id = val;
        }
        if let Some(val) = lookup("AEGIS_CONTROLLER_INSTANCE") {
            tracing::info!("Environment override: AEGIS_CONTROLLER_INSTANCE={}", val);
            self.spec.controller.instance_id = val;
        }
        if let Some(val) = lookup("AEGIS_JOURNAL_BACKEND") {
            match val.parse::<JournalBackend>() {
                Ok(backend) => {
                    tracing::info!("Environment override: AEGIS_JOURNAL_BACKEND={}", val);
                    self.spec.journal.backend = backend;
                }
                Err(e) => {
                    tracing::warn!("Invalid value for AEGIS_JOURNAL_BACKEND: {}. Ignoring.", e);
                }
            }
        }
        if let Some(val) = lookup("AEGIS_JOURNAL_DIR") {
            self.spec.journal.directory = PathBuf::from(val);
        }
        if let Some(val) = lookup("AEGIS_DATABASE_URL") {
            self.spec.journal.database_url = Some(val);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.spec.controller.swarm_id.trim().is_empty() {
            anyhow::bail!("spec.controller.swarm_id cannot be empty");
        }
        if !is_routing_segment(&self.spec.controller.swarm_id) {
            anyhow::bail!(
                "spec.controller.swarm_id '{}' must not be 'ALL' or contain '.', '*', '#' or whitespace",
                self.spec.controller.swarm_id
            );
        }

        if self.spec.controller.instance_id.trim().is_empty() {
            anyhow::bail!("spec.controller.instance_id cannot be empty");
        }
        if !is_routing_segment(&self.spec.controller.instance_id) {
            anyhow::bail!(
                "spec.controller.instance_id '{}' must not be 'ALL' or contain '.', '*', '#' or whitespace",
                self.spec.controller.instance_id
            );
        }

        let journal = &self.spec.journal;
        if journal.backend == JournalBackend::Postgres && journal.database_url.is_none() {
            anyhow::bail!("spec.journal.database_url is required for the postgres journal backend");
        }
        if journal.capacity == 0 || journal.batch_size == 0 {
            anyhow::bail!("spec.journal.capacity and spec.journal.batch_size must be positive");
        }
        if journal.flush_interval.is_zero() {
            anyhow::bail!("spec.journal.flush_interval must be greater than zero");
        }

        Ok(())
    }

    pub fn identity(&self) -> ControllerIdentity {
        ControllerIdentity {
            swarm_id: self.spec.controller.swarm_id.clone(),
            role: self.spec.controller.role.clone(),
            instance_id: self.spec.controller.instance_id.clone(),
        }
    }

    pub fn naming(&self) -> ControlPlaneNaming {
        ControlPlaneNaming {
            control_exchange: self.spec.control_plane.exchange.clone(),
            control_queue_prefix: self.spec.control_plane.queue_prefix.clone(),
            traffic_exchange_prefix: self.spec.traffic.exchange_prefix.clone(),
            work_queue_prefix: self.spec.traffic.queue_prefix.clone(),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_instance_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "aegis-swarm".to_string());
    format!("{}-{}", CONTROLLER_ROLE, host.replace('.', "-"))
}

fn default_controller_role() -> String {
    CONTROLLER_ROLE.to_string()
}

fn default_control_exchange() -> String {
    "aegis.control".to_string()
}

fn default_control_queue_prefix() -> String {
    "aegis.control".to_string()
}

fn default_traffic_exchange_prefix() -> String {
    "aegis.traffic".to_string()
}

fn default_work_queue_prefix() -> String {
    "aegis.work".to_string()
}

fn default_heartbeat_ttl() -> Duration {
    Duration::from_secs(15)
}

fn default_bootstrap_retry() -> Duration {
    Duration::from_millis(5000)
}

fn default_worker_stale_after() -> Duration {
    Duration::from_secs(30)
}

fn default_push_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_journal_backend() -> JournalBackend {
    JournalBackend::File
}

fn default_journal_directory() -> PathBuf {
    PathBuf::from("./journal")
}

fn default_journal_capacity() -> usize {
    50_000
}

fn default_journal_batch_size() -> usize {
    1_000
}

fn default_journal_flush_interval() -> Duration {
    Duration::from_millis(200)
}

fn default_suppression_quiet_period() -> Duration {
    Duration::from_millis(2000)
}

fn default_suppression_max_keys() -> usize {
    10_000
}

fn default_failure_backoff() -> Duration {
    Duration::from_secs(30)
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(10)
}


