//! Records of the cloud resources a run touches.

use serde::{Deserialize, Serialize};

/// Kinds of resource the sequencer manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    KeyPair,
    FirewallRule,
    ComputeInstance,
    StorageBucket,
    BucketWebsiteConfig,
    Alarm,
}

impl ResourceKind {
    /// Short label for reports
    pub fn label(&self) -> &'static str {
        match self {
            Self::KeyPair => "key-pair",
            Self::FirewallRule => "security-group",
            Self::ComputeInstance => "instance",
            Self::StorageBucket => "bucket",
            Self::BucketWebsiteConfig => "website-config",
            Self::Alarm => "alarm",
        }
    }
}

/// Lifecycle of a resource within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Not observed yet, or known not to exist
    Absent,

    /// Create call issued, not confirmed
    Creating,

    /// Exists and is usable
    Ready,

    /// Creation or configuration failed
    Failed,
}

impl Default for ResourceStatus {
    fn default() -> Self {
        Self::Absent
    }
}

/// A resource owned by the current run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionedResource {
    pub kind: ResourceKind,

    /// Logical name (key name, group name, bucket name, alarm name, tag)
    pub name: String,

    /// Identifier assigned by the provider, once known
    pub id: Option<String>,

    pub status: ResourceStatus,

    /// True when the resource existed before this run
    pub preexisting: bool,
}

impl ProvisionedResource {
    /// Start tracking a resource that has not been observed yet
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            id: None,
            status: ResourceStatus::Absent,
            preexisting: false,
        }
    }

    /// A create call is about to be issued
    pub fn mark_creating(&mut self) {
        self.status = ResourceStatus::Creating;
    }

    /// The resource exists with the given identifier
    pub fn mark_ready(&mut self, id: Option<String>) {
        if self.status == ResourceStatus::Absent {
            self.preexisting = true;
        }
        if id.is_some() {
            self.id = id;
        }
        self.status = ResourceStatus::Ready;
    }

    pub fn mark_failed(&mut self) {
        self.status = ResourceStatus::Failed;
    }
}

/// Observable instance state as reported by the compute API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
    Unknown(String),
}

impl InstanceState {
    /// Parse the provider's state name
    pub fn parse(name: &str) -> Self {
        match name {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "shutting-down" => Self::ShuttingDown,
            "terminated" => Self::Terminated,
            "stopping" => Self::Stopping,
            "stopped" => Self::Stopped,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// States from which the instance will never reach `running` by itself
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ShuttingDown | Self::Terminated | Self::Stopping | Self::Stopped
        )
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::ShuttingDown => "shutting-down",
            Self::Terminated => "terminated",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Unknown(other) => other.as_str(),
        };
        f.write_str(name)
    }
}

/// Instance attributes the later steps depend on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub id: String,
    pub state: InstanceState,
    pub public_dns: Option<String>,
    pub public_ip: Option<String>,
}

impl InstanceInfo {
    /// Host used for remote shell access (public IP, then DNS name)
    pub fn remote_host(&self) -> Option<&str> {
        [self.public_ip.as_deref(), self.public_dns.as_deref()]
            .into_iter()
            .flatten()
            .find(|h| !h.is_empty())
    }

    /// URL of the web server on the instance
    pub fn site_url(&self) -> Option<String> {
        [self.public_dns.as_deref(), self.public_ip.as_deref()]
            .into_iter()
            .flatten()
            .find(|h| !h.is_empty())
            .map(|host| format!("http://{}", host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_created_in_run() {
        let mut resource = ProvisionedResource::new(ResourceKind::KeyPair, "demo");
        assert_eq!(resource.status, ResourceStatus::Absent);

        resource.mark_creating();
        resource.mark_ready(Some("key-123".to_string()));

        assert_eq!(resource.status, ResourceStatus::Ready);
        assert_eq!(resource.id.as_deref(), Some("key-123"));
        assert!(!resource.preexisting);
    }

    #[test]
    fn test_resource_already_present() {
        let mut resource = ProvisionedResource::new(ResourceKind::FirewallRule, "web");
        resource.mark_ready(Some("sg-1".to_string()));
        assert!(resource.preexisting);
    }

    #[test]
    fn test_instance_state_parsing() {
        assert_eq!(InstanceState::parse("pending"), InstanceState::Pending);
        assert_eq!(InstanceState::parse("running"), InstanceState::Running);
        assert!(InstanceState::parse("terminated").is_terminal());
        assert!(!InstanceState::parse("pending").is_terminal());
        assert_eq!(
            InstanceState::parse("rebooting"),
            InstanceState::Unknown("rebooting".to_string())
        );
        assert_eq!(InstanceState::ShuttingDown.to_string(), "shutting-down");
    }

    #[test]
    fn test_instance_urls() {
        let instance = InstanceInfo {
            id: "i-1".to_string(),
            state: InstanceState::Running,
            public_dns: Some("ec2-1-2-3-4.compute-1.amazonaws.com".to_string()),
            public_ip: Some("1.2.3.4".to_string()),
        };
        assert_eq!(instance.remote_host(), Some("1.2.3.4"));
        assert_eq!(
            instance.site_url().as_deref(),
            Some("http://ec2-1-2-3-4.compute-1.amazonaws.com")
        );

        let bare = InstanceInfo {
            public_dns: Some(String::new()),
            public_ip: None,
            ..instance
        };
        assert_eq!(bare.remote_host(), None);
        assert_eq!(bare.site_url(), None);
    }
}
