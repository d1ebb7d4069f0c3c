//! Step identities and per-step outcome records.

use serde::{Deserialize, Serialize};

/// The fixed, ordered set of provisioning steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    EnsureKeyPair,
    EnsureFirewallRule,
    LaunchInstance,
    AwaitRunning,
    CreateStorageBucket,
    SetPublicReadPolicy,
    EnableStaticWebsite,
    PublishObject,
    FetchAndRelayAsset,
    OpenInBrowser,
    PushFileToInstance,
    RunRemoteCommand,
    CreateMetricAlarm,
}

impl StepKind {
    /// Execution order of a run
    pub const ORDER: [StepKind; 13] = [
        StepKind::EnsureKeyPair,
        StepKind::EnsureFirewallRule,
        StepKind::LaunchInstance,
        StepKind::AwaitRunning,
        StepKind::CreateStorageBucket,
        StepKind::SetPublicReadPolicy,
        StepKind::EnableStaticWebsite,
        StepKind::PublishObject,
        StepKind::FetchAndRelayAsset,
        StepKind::OpenInBrowser,
        StepKind::PushFileToInstance,
        StepKind::RunRemoteCommand,
        StepKind::CreateMetricAlarm,
    ];

    /// Whether a failure of this step ends the run.
    ///
    /// Waiting for the instance belongs to the launch gate: nothing after it
    /// can work without a running instance.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::LaunchInstance | Self::AwaitRunning | Self::CreateStorageBucket
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::EnsureKeyPair => "ensure_key_pair",
            Self::EnsureFirewallRule => "ensure_firewall_rule",
            Self::LaunchInstance => "launch_instance",
            Self::AwaitRunning => "await_running",
            Self::CreateStorageBucket => "create_storage_bucket",
            Self::SetPublicReadPolicy => "set_public_read_policy",
            Self::EnableStaticWebsite => "enable_static_website",
            Self::PublishObject => "publish_object",
            Self::FetchAndRelayAsset => "fetch_and_relay_asset",
            Self::OpenInBrowser => "open_in_browser",
            Self::PushFileToInstance => "push_file_to_instance",
            Self::RunRemoteCommand => "run_remote_command",
            Self::CreateMetricAlarm => "create_metric_alarm",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Status of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not yet started
    Pending,

    /// Currently executing
    Running,

    /// Changed something and succeeded
    Succeeded,

    /// Desired state already held, nothing done
    Unchanged,

    /// Failed (with error)
    Failed,
}

impl Default for StepStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Outcome of one executed step, as reported at the end of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: StepKind,
    pub status: StepStatus,

    /// Human-readable summary of what the step produced
    pub detail: Option<String>,

    /// Error message if failed
    pub error: Option<String>,

    /// Time taken in milliseconds
    pub duration_ms: u64,
}
