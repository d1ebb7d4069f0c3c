//! Configuration for stackup.
//!
//! Configuration sources (highest priority first):
//! 1. Command-line flags and their environment variables
//! 2. Config file (.stackup/config.yaml)
//! 3. Defaults
//!
//! Config file discovery:
//! - Searches current directory and parents for .stackup/config.yaml
//! - Paths in config file are relative to the project root (parent of .stackup/)

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::adapters::AwsSettings;
use crate::core::website::MAX_BUCKET_PREFIX_LEN;
use crate::core::RetryPolicy;
use crate::domain::{
    AlarmSpec, FirewallSpec, InstanceSpec, KeyPairSpec, MonitoringSpec, ProvisioningRequest,
    WebsiteSpec,
};

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,

    /// Name tag of the instance
    #[serde(default)]
    pub tag: Option<String>,

    #[serde(default)]
    pub aws: AwsConfig,

    #[serde(default)]
    pub key_pair: Option<KeyPairSpec>,
    #[serde(default)]
    pub firewall: Option<FirewallSpec>,
    #[serde(default)]
    pub instance: Option<InstanceConfig>,
    #[serde(default)]
    pub website: Option<WebsiteSpec>,
    #[serde(default)]
    pub monitoring: Option<MonitoringSpec>,
    #[serde(default)]
    pub alarm: Option<AlarmSpec>,

    /// Retry policy for provider calls
    #[serde(default)]
    pub retry: Option<RetryPolicy>,

    /// Polling policy while waiting for the instance
    #[serde(default)]
    pub wait: Option<RetryPolicy>,

    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    #[serde(default)]
    pub open_browser: Option<bool>,

    /// Write a run journal under $STACKUP_HOME/runs
    #[serde(default)]
    pub journal: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AwsConfig {
    pub binary: Option<String>,
    pub region: Option<String>,
    pub profile: Option<String>,
    pub call_timeout_seconds: Option<u64>,
}

/// Instance settings; the boot script may be inline or read from a file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstanceConfig {
    pub image_id: Option<String>,
    pub instance_type: Option<String>,
    pub user_data: Option<String>,
    /// Boot script file (relative to the project root)
    pub user_data_file: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeoutsConfig {
    pub ssh_seconds: Option<u64>,
    pub fetch_seconds: Option<u64>,
}

/// Values given on the command line (or through their env vars)
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub key: Option<String>,
    pub tag: Option<String>,
    pub security_group: Option<String>,
    pub region: Option<String>,
    pub profile: Option<String>,
    pub key_dir: Option<PathBuf>,
    pub no_browser: bool,
    pub no_journal: bool,
}

/// Fully resolved configuration for one run
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub request: ProvisioningRequest,
    pub aws: AwsSettings,
    pub retry: RetryPolicy,
    pub wait: RetryPolicy,
    pub ssh_timeout: Duration,
    pub fetch_timeout: Duration,
    /// Directory for run journals (None when journaling is off)
    pub runs_dir: Option<PathBuf>,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".stackup").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Directory that relative paths in a config file are resolved against
fn project_root(config_path: &Path) -> PathBuf {
    let parent = config_path.parent().unwrap_or(Path::new("."));
    if parent.file_name().map_or(false, |n| n == ".stackup") {
        parent.parent().unwrap_or(Path::new(".")).to_path_buf()
    } else {
        parent.to_path_buf()
    }
}

/// Resolve a path that may be relative to the project root
fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path))
    }
}

/// Stackup home directory ($STACKUP_HOME or ~/.stackup)
pub fn stackup_home() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("STACKUP_HOME") {
        return Ok(PathBuf::from(home));
    }

    Ok(dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".stackup"))
}

/// Load configuration from all sources.
///
/// `explicit` skips discovery and reads the given file instead.
pub fn load(explicit: Option<&Path>, overrides: &Overrides) -> Result<ResolvedConfig> {
    let config_file = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file(),
    };

    let (file, base_dir) = match &config_file {
        Some(path) => (Some(load_config_file(path)?), project_root(path)),
        None => (None, PathBuf::from(".")),
    };

    let journal_enabled =
        !overrides.no_journal && file.as_ref().and_then(|f| f.journal).unwrap_or(true);
    let runs_dir = if journal_enabled {
        Some(stackup_home()?.join("runs"))
    } else {
        None
    };

    let mut config = resolve(file.as_ref(), &base_dir, overrides)?;
    config.runs_dir = runs_dir;
    config.config_file = config_file;
    Ok(config)
}

/// Merge defaults, an optional config file and overrides.
///
/// Does not touch the environment; `load` adds the journal location and
/// the config file path.
pub fn resolve(
    file: Option<&ConfigFile>,
    base_dir: &Path,
    overrides: &Overrides,
) -> Result<ResolvedConfig> {
    let mut request = ProvisioningRequest::default();
    let mut aws = AwsSettings::default();
    let mut retry = RetryPolicy::default();
    let mut wait = RetryPolicy::instance_wait();
    let mut ssh_timeout = Duration::from_secs(300);
    let mut fetch_timeout = Duration::from_secs(30);

    if let Some(file) = file {
        if let Some(tag) = &file.tag {
            request.tag = tag.clone();
        }

        if let Some(binary) = &file.aws.binary {
            aws.binary = binary.clone();
        }
        if let Some(region) = &file.aws.region {
            request.region = region.clone();
        }
        aws.profile = file.aws.profile.clone();
        if let Some(secs) = file.aws.call_timeout_seconds {
            aws.call_timeout = Duration::from_secs(secs);
        }

        if let Some(key_pair) = &file.key_pair {
            request.key_pair = KeyPairSpec {
                name: key_pair.name.clone(),
                key_dir: resolve_path(base_dir, &key_pair.key_dir),
            };
        }
        if let Some(firewall) = &file.firewall {
            request.firewall = firewall.clone();
        }
        if let Some(instance) = &file.instance {
            request.instance = resolve_instance(instance, base_dir)?;
        }
        if let Some(website) = &file.website {
            if website.bucket_prefix.len() > MAX_BUCKET_PREFIX_LEN {
                bail!(
                    "website.bucket_prefix '{}' is longer than {} characters",
                    website.bucket_prefix,
                    MAX_BUCKET_PREFIX_LEN
                );
            }
            request.website = website.clone();
        }
        if let Some(monitoring) = &file.monitoring {
            request.monitoring = MonitoringSpec {
                script: monitoring
                    .script
                    .as_ref()
                    .map(|script| resolve_path(base_dir, script)),
                remote_user: monitoring.remote_user.clone(),
            };
        }
        if let Some(alarm) = &file.alarm {
            request.alarm = alarm.clone();
        }

        if let Some(policy) = &file.retry {
            retry = policy.clone();
        }
        if let Some(policy) = &file.wait {
            wait = policy.clone();
        }
        if let Some(secs) = file.timeouts.ssh_seconds {
            ssh_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.timeouts.fetch_seconds {
            fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(open) = file.open_browser {
            request.open_browser = open;
        }
    }

    if let Some(key) = &overrides.key {
        request.key_pair.name = key.clone();
    }
    if let Some(key_dir) = &overrides.key_dir {
        request.key_pair.key_dir = key_dir.clone();
    }
    if let Some(tag) = &overrides.tag {
        request.tag = tag.clone();
    }
    if let Some(group) = &overrides.security_group {
        request.firewall.name = group.clone();
    }
    if let Some(region) = &overrides.region {
        request.region = region.clone();
    }
    if let Some(profile) = &overrides.profile {
        aws.profile = Some(profile.clone());
    }
    if overrides.no_browser {
        request.open_browser = false;
    }

    // URLs and alarm actions are built from this region, so the CLI must use it too
    aws.region = Some(request.region.clone());

    Ok(ResolvedConfig {
        request,
        aws,
        retry,
        wait,
        ssh_timeout,
        fetch_timeout,
        runs_dir: None,
        config_file: None,
    })
}

fn resolve_instance(instance: &InstanceConfig, base_dir: &Path) -> Result<InstanceSpec> {
    let mut spec = InstanceSpec::default();
    if let Some(image_id) = &instance.image_id {
        spec.image_id = image_id.clone();
    }
    if let Some(instance_type) = &instance.instance_type {
        spec.instance_type = instance_type.clone();
    }

    if let Some(path) = &instance.user_data_file {
        let path = resolve_path(base_dir, Path::new(path));
        spec.user_data = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read user data file: {}", path.display()))?;
    } else if let Some(user_data) = &instance.user_data {
        spec.user_data = user_data.clone();
    }

    Ok(spec)
}
