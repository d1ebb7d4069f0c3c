//! Adapter interfaces for external systems.
//!
//! The sequencer talks to the cloud, the remote shell, the asset origin and
//! the local browser only through the traits defined here. Production
//! implementations live in the submodules; tests substitute their own.

pub mod aws;
pub mod browser;
pub mod http;
pub mod ssh;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{AlarmSpec, IngressRule, InstanceInfo};

pub use aws::{AwsCli, AwsSettings};
pub use browser::SystemBrowser;
pub use http::HttpAssetSource;
pub use ssh::OpenSsh;

/// Failure of a call to an external system, classified by what the caller
/// can do about it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// Only transient and timeout failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// A key pair known to the compute API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPairInfo {
    pub name: String,
    pub id: String,
}

/// A freshly created key pair, including its private key (returned once)
#[derive(Clone)]
pub struct CreatedKeyPair {
    pub info: KeyPairInfo,
    pub material: String,
}

impl std::fmt::Debug for CreatedKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreatedKeyPair")
            .field("info", &self.info)
            .field("material", &"<redacted>")
            .finish()
    }
}

/// Parameters of a single instance launch
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub image_id: String,
    pub instance_type: String,
    pub key_name: String,
    pub security_group: String,
    /// Instance tags as (key, value)
    pub tags: Vec<(String, String)>,
    pub user_data: String,
}

/// A metric alarm bound to concrete dimensions
#[derive(Debug, Clone)]
pub struct MetricAlarm {
    pub spec: AlarmSpec,
    pub dimensions: Vec<(String, String)>,
    pub actions: Vec<String>,
}

/// Where and as whom to reach the instance over the remote shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub user: String,
    pub host: String,
    pub key_file: PathBuf,
}

impl RemoteTarget {
    /// `user@host`
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

/// Compute API: key pairs, security groups and instances
#[async_trait]
pub trait ComputeApi: Send + Sync {
    async fn find_key_pair(&self, name: &str) -> ProviderResult<Option<KeyPairInfo>>;

    async fn create_key_pair(&self, name: &str) -> ProviderResult<CreatedKeyPair>;

    /// Look up a security group by name, returning its id
    async fn find_security_group(&self, name: &str) -> ProviderResult<Option<String>>;

    /// Create a security group, returning its id
    async fn create_security_group(&self, name: &str, description: &str)
        -> ProviderResult<String>;

    async fn authorize_ingress(&self, group_id: &str, rules: &[IngressRule])
        -> ProviderResult<()>;

    /// Launch exactly one instance
    async fn run_instance(&self, request: &LaunchRequest) -> ProviderResult<InstanceInfo>;

    async fn describe_instance(&self, id: &str) -> ProviderResult<InstanceInfo>;
}

/// Object storage API
#[async_trait]
pub trait StorageApi: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> ProviderResult<bool>;

    async fn create_bucket(&self, bucket: &str) -> ProviderResult<()>;

    /// Attach a JSON access-policy document
    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> ProviderResult<()>;

    async fn put_bucket_website(&self, bucket: &str, index_document: &str)
        -> ProviderResult<()>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        content_type: &str,
    ) -> ProviderResult<()>;

    async fn upload_file(&self, bucket: &str, key: &str, path: &Path) -> ProviderResult<()>;
}

/// Metrics and alarm API
#[async_trait]
pub trait AlarmApi: Send + Sync {
    /// Create the alarm, replacing any alarm with the same name
    async fn put_metric_alarm(&self, alarm: &MetricAlarm) -> ProviderResult<()>;
}

/// Remote file copy and command execution
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Copy a local file into the remote user's home directory
    async fn copy_to(&self, target: &RemoteTarget, local: &Path) -> ProviderResult<()>;

    /// Run a command, returning its standard output
    async fn run(&self, target: &RemoteTarget, command: &str) -> ProviderResult<String>;
}

/// Origin of the binary asset relayed into the bucket
#[async_trait]
pub trait AssetSource: Send + Sync {
    async fn fetch(&self, url: &str) -> ProviderResult<Vec<u8>>;
}

/// Local browser launcher
pub trait Browser: Send + Sync {
    fn open(&self, url: &str) -> ProviderResult<()>;
}
