//! The provisioning request.
//!
//! A `ProvisioningRequest` is built once from the CLI and configuration
//! and handed to the sequencer by reference. Nothing mutates it during a run.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Boot script run by the instance on first start
pub const DEFAULT_USER_DATA: &str = include_str!("../../scripts/user-data.sh");

/// Monitoring script pushed to the instance when no local script is configured
pub const BUNDLED_MONITOR_SCRIPT: &str = include_str!("../../scripts/monitor.sh");

/// Everything one provisioning run needs to know
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningRequest {
    /// Value of the `Name` tag applied to the instance
    pub tag: String,

    /// Region the stack is created in (used for URLs and alarm actions)
    pub region: String,

    /// Key pair to ensure and use for the instance
    pub key_pair: KeyPairSpec,

    /// Security group to ensure and attach to the instance
    pub firewall: FirewallSpec,

    /// Instance image, size and boot script
    pub instance: InstanceSpec,

    /// Static website bucket settings
    pub website: WebsiteSpec,

    /// Monitoring script pushed over the remote shell
    pub monitoring: MonitoringSpec,

    /// CPU alarm wired to the instance
    pub alarm: AlarmSpec,

    /// Open both sites in the local browser when done
    pub open_browser: bool,
}

impl Default for ProvisioningRequest {
    fn default() -> Self {
        Self {
            tag: "Demo Instance From Script".to_string(),
            region: "us-east-1".to_string(),
            key_pair: KeyPairSpec::default(),
            firewall: FirewallSpec::default(),
            instance: InstanceSpec::default(),
            website: WebsiteSpec::default(),
            monitoring: MonitoringSpec::default(),
            alarm: AlarmSpec::default(),
            open_browser: true,
        }
    }
}

impl ProvisioningRequest {
    /// Description used when the security group has to be created
    pub fn firewall_description(&self) -> String {
        self.firewall
            .description
            .clone()
            .unwrap_or_else(|| format!("Security group for EC2 instance: {}", self.tag))
    }

    /// Alarm actions, falling back to rebooting the instance in our region
    pub fn alarm_actions(&self) -> Vec<String> {
        if self.alarm.actions.is_empty() {
            vec![format!("arn:aws:automate:{}:ec2:reboot", self.region)]
        } else {
            self.alarm.actions.clone()
        }
    }
}

/// Key pair name and where its private key lives locally
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyPairSpec {
    pub name: String,

    /// Directory holding `<name>.pem`
    pub key_dir: PathBuf,
}

impl Default for KeyPairSpec {
    fn default() -> Self {
        Self {
            name: "ubuntu_ag".to_string(),
            key_dir: PathBuf::from("."),
        }
    }
}

impl KeyPairSpec {
    /// Local path of the private key file
    pub fn key_file(&self) -> PathBuf {
        self.key_dir.join(format!("{}.pem", self.name))
    }
}

/// Security group and the inbound rules added when it is created
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallSpec {
    pub name: String,

    /// Group description (defaults to one derived from the tag)
    pub description: Option<String>,

    /// Inbound allow rules. Defaults open HTTP and SSH to everyone.
    pub ingress: Vec<IngressRule>,
}

impl Default for FirewallSpec {
    fn default() -> Self {
        Self {
            name: "launch-wizard-1".to_string(),
            description: None,
            ingress: vec![IngressRule::tcp(80), IngressRule::tcp(22)],
        }
    }
}

/// One inbound allow rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub from_port: u16,
    pub to_port: u16,
    #[serde(default = "default_cidr")]
    pub cidr: String,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

fn default_cidr() -> String {
    "0.0.0.0/0".to_string()
}

impl IngressRule {
    /// A single TCP port open to any address
    pub fn tcp(port: u16) -> Self {
        Self {
            protocol: default_protocol(),
            from_port: port,
            to_port: port,
            cidr: default_cidr(),
        }
    }
}

/// Instance image, size and boot script
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceSpec {
    pub image_id: String,
    pub instance_type: String,

    /// Shell script executed by cloud-init on first boot
    pub user_data: String,
}

impl Default for InstanceSpec {
    fn default() -> Self {
        Self {
            image_id: "ami-033b95fb8079dc481".to_string(),
            instance_type: "t2.nano".to_string(),
            user_data: DEFAULT_USER_DATA.to_string(),
        }
    }
}

/// Static website bucket settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebsiteSpec {
    /// Prefix of the generated bucket name
    pub bucket_prefix: String,

    pub index_document: String,

    /// Image fetched from an external origin and relayed into the bucket
    pub asset_url: String,

    /// Object key for the relayed image (defaults to the URL's file name)
    pub asset_key: Option<String>,
}

impl Default for WebsiteSpec {
    fn default() -> Self {
        Self {
            bucket_prefix: "static-website".to_string(),
            index_document: "index.html".to_string(),
            asset_url: "http://devops.witdemo.net/assign1.jpg".to_string(),
            asset_key: None,
        }
    }
}

impl WebsiteSpec {
    /// Object key the asset is stored under
    pub fn asset_key(&self) -> String {
        if let Some(key) = &self.asset_key {
            return key.clone();
        }

        self.asset_url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .filter(|name| !name.is_empty())
            .unwrap_or("asset")
            .to_string()
    }
}

/// Monitoring script pushed to the instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringSpec {
    /// Local script to push (the bundled `monitor.sh` when unset)
    pub script: Option<PathBuf>,

    /// Login user on the instance
    pub remote_user: String,
}

impl Default for MonitoringSpec {
    fn default() -> Self {
        Self {
            script: None,
            remote_user: "ec2-user".to_string(),
        }
    }
}

impl MonitoringSpec {
    /// File name of the script once copied to the remote home directory
    pub fn remote_script_name(&self) -> String {
        self.script
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "monitor.sh".to_string())
    }

    /// Command that makes the pushed script executable and runs it
    pub fn remote_command(&self) -> String {
        let name = shell_quote(&self.remote_script_name());
        format!("chmod +x {name} && ./{name}")
    }
}

/// Quote a word for a POSIX shell; plain file names pass through unchanged
fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+'));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

/// Metric alarm settings. The instance id dimension is added at run time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmSpec {
    pub name: String,
    pub description: String,
    pub metric_name: String,
    pub namespace: String,
    pub statistic: String,
    pub period_seconds: u32,
    pub evaluation_periods: u32,
    pub threshold: f64,
    pub comparator: Comparator,

    /// Alarm actions (reboot the instance when empty)
    pub actions: Vec<String>,
}

impl Default for AlarmSpec {
    fn default() -> Self {
        Self {
            name: "MonitoringAlarm".to_string(),
            description: "Alarm when CPU exceeds 90%".to_string(),
            metric_name: "CPUUtilization".to_string(),
            namespace: "AWS/EC2".to_string(),
            statistic: "Average".to_string(),
            period_seconds: 300,
            evaluation_periods: 1,
            threshold: 90.0,
            comparator: Comparator::GreaterThanOrEqualToThreshold,
            actions: Vec::new(),
        }
    }
}

/// Alarm comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    GreaterThanOrEqualToThreshold,
    GreaterThanThreshold,
    LessThanThreshold,
    LessThanOrEqualToThreshold,
}

impl Comparator {
    /// Name used by the metrics API
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GreaterThanOrEqualToThreshold => "GreaterThanOrEqualToThreshold",
            Self::GreaterThanThreshold => "GreaterThanThreshold",
            Self::LessThanThreshold => "LessThanThreshold",
            Self::LessThanOrEqualToThreshold => "LessThanOrEqualToThreshold",
        }
    }
}

impl Default for Comparator {
    fn default() -> Self {
        Self::GreaterThanOrEqualToThreshold
    }
}
