//! AWS adapter backed by the `aws` command-line tool.
//!
//! Every call spawns `aws <service> <operation> ... --output json`, waits for
//! it with a timeout and parses stdout. Failures are classified from the
//! `An error occurred (<Code>)` line the CLI prints on stderr.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::domain::{IngressRule, InstanceInfo, InstanceState};

use super::{
    AlarmApi, ComputeApi, CreatedKeyPair, KeyPairInfo, LaunchRequest, MetricAlarm,
    ProviderError, ProviderResult, StorageApi,
};

/// How to invoke the AWS CLI
#[derive(Debug, Clone)]
pub struct AwsSettings {
    /// Path to the `aws` binary
    pub binary: String,

    /// Region passed as `--region` (CLI default when unset)
    pub region: Option<String>,

    /// Named profile passed as `--profile`
    pub profile: Option<String>,

    /// Upper bound for a single CLI call
    pub call_timeout: Duration,
}

impl Default for AwsSettings {
    fn default() -> Self {
        Self {
            binary: "aws".to_string(),
            region: None,
            profile: None,
            call_timeout: Duration::from_secs(120),
        }
    }
}

/// Compute, storage and alarm APIs through the AWS CLI
pub struct AwsCli {
    settings: AwsSettings,
}

impl AwsCli {
    pub fn new(settings: AwsSettings) -> Self {
        Self { settings }
    }

    fn global_args(&self) -> Vec<String> {
        let mut args = vec!["--output".to_string(), "json".to_string()];
        if let Some(region) = &self.settings.region {
            args.push("--region".to_string());
            args.push(region.clone());
        }
        if let Some(profile) = &self.settings.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
        args
    }

    /// Run one CLI call and return its stdout
    async fn call(&self, args: &[String]) -> ProviderResult<String> {
        let operation = args.iter().take(2).cloned().collect::<Vec<_>>().join(" ");
        debug!(%operation, "aws call");

        let child = Command::new(&self.settings.binary)
            .args(args)
            .args(self.global_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ProviderError::Other(format!(
                    "failed to spawn '{}' for {}: {}",
                    self.settings.binary, operation, e
                ))
            })?;

        let output = timeout(self.settings.call_timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                ProviderError::Timeout(format!(
                    "aws {} did not finish within {:?}",
                    operation, self.settings.call_timeout
                ))
            })?
            .map_err(|e| ProviderError::Other(format!("aws {} failed: {}", operation, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_error(stderr.trim()));
        }

        String::from_utf8(output.stdout)
            .map_err(|_| ProviderError::Other(format!("aws {} output is not UTF-8", operation)))
    }

    async fn call_json<T: DeserializeOwned>(&self, args: &[String]) -> ProviderResult<T> {
        let stdout = self.call(args).await?;
        serde_json::from_str(&stdout)
            .map_err(|e| ProviderError::Other(format!("unexpected aws output: {}", e)))
    }
}

/// Map CLI stderr onto the error taxonomy
pub fn classify_error(stderr: &str) -> ProviderError {
    let message = if stderr.is_empty() {
        "aws command failed".to_string()
    } else {
        stderr.to_string()
    };

    if stderr.contains("Could not connect to the endpoint URL")
        || stderr.contains("Connection was closed")
        || stderr.contains("Read timeout")
    {
        return ProviderError::Transient(message);
    }

    let Some(code) = error_code(stderr) else {
        return ProviderError::Other(message);
    };

    match code {
        c if c.ends_with("NotFound") => ProviderError::NotFound(message),
        "NoSuchBucket" | "NoSuchKey" | "404" => ProviderError::NotFound(message),
        c if c.ends_with(".Duplicate") => ProviderError::AlreadyExists(message),
        "BucketAlreadyExists" | "BucketAlreadyOwnedByYou" | "ResourceAlreadyExists" => {
            ProviderError::AlreadyExists(message)
        }
        "UnauthorizedOperation" | "AccessDenied" | "AccessDeniedException" | "AuthFailure"
        | "InvalidClientTokenId" | "ExpiredToken" | "SignatureDoesNotMatch" | "403" => {
            ProviderError::PermissionDenied(message)
        }
        "RequestLimitExceeded" | "Throttling" | "ThrottlingException" | "SlowDown"
        | "ServiceUnavailable" | "Unavailable" | "InternalError" | "InternalFailure"
        | "InsufficientInstanceCapacity" | "RequestTimeout" | "500" | "503" => {
            ProviderError::Transient(message)
        }
        _ => ProviderError::Other(message),
    }
}

/// Extract `<Code>` from `An error occurred (<Code>) when calling ...`
fn error_code(stderr: &str) -> Option<&str> {
    let start = stderr.find("An error occurred (")? + "An error occurred (".len();
    let rest = &stderr[start..];
    let end = rest.find(')')?;
    Some(&rest[..end])
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Arguments for `ec2 run-instances`
pub fn launch_args(request: &LaunchRequest) -> Vec<String> {
    let tags: Vec<serde_json::Value> = request
        .tags
        .iter()
        .map(|(k, v)| serde_json::json!({ "Key": k, "Value": v }))
        .collect();
    let tag_specs = serde_json::json!([{ "ResourceType": "instance", "Tags": tags }]);

    let mut out = args(["ec2", "run-instances"]);
    out.extend([
        "--image-id".to_string(),
        request.image_id.clone(),
        "--count".to_string(),
        "1".to_string(),
        "--instance-type".to_string(),
        request.instance_type.clone(),
        "--key-name".to_string(),
        request.key_name.clone(),
        "--security-groups".to_string(),
        request.security_group.clone(),
        "--tag-specifications".to_string(),
        tag_specs.to_string(),
        "--user-data".to_string(),
        request.user_data.clone(),
    ]);
    out
}

/// Arguments for `cloudwatch put-metric-alarm`
pub fn alarm_args(alarm: &MetricAlarm) -> Vec<String> {
    let spec = &alarm.spec;
    let mut out = args(["cloudwatch", "put-metric-alarm"]);
    out.extend([
        "--alarm-name".to_string(),
        spec.name.clone(),
        "--alarm-description".to_string(),
        spec.description.clone(),
        "--metric-name".to_string(),
        spec.metric_name.clone(),
        "--namespace".to_string(),
        spec.namespace.clone(),
        "--statistic".to_string(),
        spec.statistic.clone(),
        "--period".to_string(),
        spec.period_seconds.to_string(),
        "--evaluation-periods".to_string(),
        spec.evaluation_periods.to_string(),
        "--threshold".to_string(),
        spec.threshold.to_string(),
        "--comparison-operator".to_string(),
        spec.comparator.as_str().to_string(),
    ]);

    if !alarm.dimensions.is_empty() {
        out.push("--dimensions".to_string());
        out.extend(
            alarm
                .dimensions
                .iter()
                .map(|(name, value)| format!("Name={},Value={}", name, value)),
        );
    }

    if alarm.actions.is_empty() {
        out.push("--no-actions-enabled".to_string());
    } else {
        out.push("--actions-enabled".to_string());
        out.push("--alarm-actions".to_string());
        out.extend(alarm.actions.iter().cloned());
    }
    out
}

/// JSON for `--ip-permissions`
pub fn ip_permissions(rules: &[IngressRule]) -> String {
    let perms: Vec<serde_json::Value> = rules
        .iter()
        .map(|r| {
            serde_json::json!({
                "IpProtocol": r.protocol,
                "FromPort": r.from_port,
                "ToPort": r.to_port,
                "IpRanges": [{ "CidrIp": r.cidr }],
            })
        })
        .collect();
    serde_json::Value::Array(perms).to_string()
}

// ---------------------------------------------------------------------------
// CLI output shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KeyPairsOutput {
    #[serde(default)]
    key_pairs: Vec<KeyPairEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KeyPairEntry {
    key_name: String,
    key_pair_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateKeyPairOutput {
    key_name: String,
    key_pair_id: Option<String>,
    key_material: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SecurityGroupsOutput {
    #[serde(default)]
    security_groups: Vec<SecurityGroupEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SecurityGroupEntry {
    group_id: String,
    group_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateSecurityGroupOutput {
    group_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RunInstancesOutput {
    #[serde(default)]
    instances: Vec<InstanceEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstancesOutput {
    #[serde(default)]
    reservations: Vec<RunInstancesOutput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceEntry {
    instance_id: String,
    state: InstanceStateEntry,
    public_dns_name: Option<String>,
    public_ip_address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceStateEntry {
    name: String,
}

impl From<InstanceEntry> for InstanceInfo {
    fn from(entry: InstanceEntry) -> Self {
        Self {
            id: entry.instance_id,
            state: InstanceState::parse(&entry.state.name),
            public_dns: entry.public_dns_name.filter(|s| !s.is_empty()),
            public_ip: entry.public_ip_address.filter(|s| !s.is_empty()),
        }
    }
}

#[async_trait]
impl ComputeApi for AwsCli {
    async fn find_key_pair(&self, name: &str) -> ProviderResult<Option<KeyPairInfo>> {
        let mut cmd = args(["ec2", "describe-key-pairs", "--filters"]);
        cmd.push(format!("Name=key-name,Values={}", name));

        let output: KeyPairsOutput = self.call_json(&cmd).await?;
        Ok(output
            .key_pairs
            .into_iter()
            .find(|k| k.key_name == name)
            .map(|k| KeyPairInfo {
                id: k.key_pair_id.unwrap_or_else(|| k.key_name.clone()),
                name: k.key_name,
            }))
    }

    async fn create_key_pair(&self, name: &str) -> ProviderResult<CreatedKeyPair> {
        let mut cmd = args(["ec2", "create-key-pair", "--key-name"]);
        cmd.push(name.to_string());

        let output: CreateKeyPairOutput = self.call_json(&cmd).await?;
        Ok(CreatedKeyPair {
            info: KeyPairInfo {
                id: output.key_pair_id.unwrap_or_else(|| output.key_name.clone()),
                name: output.key_name,
            },
            material: output.key_material,
        })
    }

    async fn find_security_group(&self, name: &str) -> ProviderResult<Option<String>> {
        let mut cmd = args(["ec2", "describe-security-groups", "--filters"]);
        cmd.push(format!("Name=group-name,Values={}", name));

        let output: SecurityGroupsOutput = self.call_json(&cmd).await?;
        Ok(output
            .security_groups
            .into_iter()
            .find(|g| g.group_name == name)
            .map(|g| g.group_id))
    }

    async fn create_security_group(
        &self,
        name: &str,
        description: &str,
    ) -> ProviderResult<String> {
        let mut cmd = args(["ec2", "create-security-group", "--group-name"]);
        cmd.extend([name.to_string(), "--description".to_string(), description.to_string()]);

        let output: CreateSecurityGroupOutput = self.call_json(&cmd).await?;
        Ok(output.group_id)
    }

    async fn authorize_ingress(&self, group_id: &str, rules: &[IngressRule]) -> ProviderResult<()> {
        if rules.is_empty() {
            return Ok(());
        }

        let mut cmd = args(["ec2", "authorize-security-group-ingress", "--group-id"]);
        cmd.extend([
            group_id.to_string(),
            "--ip-permissions".to_string(),
            ip_permissions(rules),
        ]);

        self.call(&cmd).await.map(|_| ())
    }

    async fn run_instance(&self, request: &LaunchRequest) -> ProviderResult<InstanceInfo> {
        let output: RunInstancesOutput = self.call_json(&launch_args(request)).await?;
        output
            .instances
            .into_iter()
            .next()
            .map(InstanceInfo::from)
            .ok_or_else(|| ProviderError::Other("run-instances returned no instance".to_string()))
    }

    async fn describe_instance(&self, id: &str) -> ProviderResult<InstanceInfo> {
        let mut cmd = args(["ec2", "describe-instances", "--instance-ids"]);
        cmd.push(id.to_string());

        let output: DescribeInstancesOutput = self.call_json(&cmd).await?;
        output
            .reservations
            .into_iter()
            .flat_map(|r| r.instances)
            .find(|i| i.instance_id == id)
            .map(InstanceInfo::from)
            .ok_or_else(|| ProviderError::NotFound(format!("instance {}", id)))
    }
}

#[async_trait]
impl StorageApi for AwsCli {
    async fn bucket_exists(&self, bucket: &str) -> ProviderResult<bool> {
        let mut cmd = args(["s3api", "head-bucket", "--bucket"]);
        cmd.push(bucket.to_string());

        match self.call(&cmd).await {
            Ok(_) => Ok(true),
            Err(ProviderError::NotFound(_)) => Ok(false),
            Err(ProviderError::PermissionDenied(_)) => Err(ProviderError::AlreadyExists(format!(
                "bucket {} is owned by another account",
                bucket
            ))),
            Err(e) => Err(e),
        }
    }

    async fn create_bucket(&self, bucket: &str) -> ProviderResult<()> {
        let mut cmd = args(["s3api", "create-bucket", "--bucket"]);
        cmd.push(bucket.to_string());

        // us-east-1 rejects an explicit location constraint
        if let Some(region) = self.settings.region.as_deref().filter(|r| *r != "us-east-1") {
            cmd.push("--create-bucket-configuration".to_string());
            cmd.push(format!("LocationConstraint={}", region));
        }

        self.call(&cmd).await.map(|_| ())
    }

    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> ProviderResult<()> {
        let mut cmd = args(["s3api", "put-bucket-policy", "--bucket"]);
        cmd.extend([bucket.to_string(), "--policy".to_string(), policy.to_string()]);

        self.call(&cmd).await.map(|_| ())
    }

    async fn put_bucket_website(&self, bucket: &str, index_document: &str) -> ProviderResult<()> {
        let config = serde_json::json!({ "IndexDocument": { "Suffix": index_document } });
        let mut cmd = args(["s3api", "put-bucket-website", "--bucket"]);
        cmd.extend([
            bucket.to_string(),
            "--website-configuration".to_string(),
            config.to_string(),
        ]);

        self.call(&cmd).await.map(|_| ())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        content_type: &str,
    ) -> ProviderResult<()> {
        // The CLI only takes object bodies from files
        let staged = tempfile::NamedTempFile::new()
            .map_err(|e| ProviderError::Other(format!("failed to stage object body: {}", e)))?;
        tokio::fs::write(staged.path(), body)
            .await
            .map_err(|e| ProviderError::Other(format!("failed to stage object body: {}", e)))?;

        let mut cmd = args(["s3api", "put-object", "--bucket"]);
        cmd.extend([
            bucket.to_string(),
            "--key".to_string(),
            key.to_string(),
            "--body".to_string(),
            staged.path().to_string_lossy().to_string(),
            "--content-type".to_string(),
            content_type.to_string(),
        ]);

        self.call(&cmd).await.map(|_| ())
    }

    async fn upload_file(&self, bucket: &str, key: &str, path: &Path) -> ProviderResult<()> {
        let mut cmd = args(["s3", "cp"]);
        cmd.extend([
            path.to_string_lossy().to_string(),
            format!("s3://{}/{}", bucket, key),
            "--only-show-errors".to_string(),
        ]);

        self.call(&cmd).await.map(|_| ())
    }
}

#[async_trait]
impl AlarmApi for AwsCli {
    async fn put_metric_alarm(&self, alarm: &MetricAlarm) -> ProviderResult<()> {
        self.call(&alarm_args(alarm)).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AlarmSpec;

    #[test]
    fn test_classify_not_found() {
        let err = classify_error(
            "An error occurred (InvalidKeyPair.NotFound) when calling the DescribeKeyPairs operation: The key pair 'x' does not exist",
        );
        assert!(matches!(err, ProviderError::NotFound(_)));

        let err = classify_error(
            "An error occurred (404) when calling the HeadBucket operation: Not Found",
        );
        assert!(matches!(err, ProviderError::NotFound(_)));
    }

    #[test]
    fn test_classify_already_exists() {
        let err = classify_error(
            "An error occurred (InvalidGroup.Duplicate) when calling the CreateSecurityGroup operation: already exists",
        );
        assert!(matches!(err, ProviderError::AlreadyExists(_)));

        let err = classify_error(
            "An error occurred (BucketAlreadyExists) when calling the CreateBucket operation: taken",
        );
        assert!(matches!(err, ProviderError::AlreadyExists(_)));
    }

    #[test]
    fn test_classify_permission_and_transient() {
        let err = classify_error(
            "An error occurred (UnauthorizedOperation) when calling the RunInstances operation: You are not authorized",
        );
        assert!(matches!(err, ProviderError::PermissionDenied(_)));

        let err = classify_error(
            "An error occurred (RequestLimitExceeded) when calling the DescribeInstances operation: Request limit exceeded.",
        );
        assert!(err.is_retryable());

        let err = classify_error("Could not connect to the endpoint URL: \"https://ec2.us-east-1.amazonaws.com/\"");
        assert!(matches!(err, ProviderError::Transient(_)));
    }

    #[test]
    fn test_classify_unknown() {
        let err = classify_error("aws: error: argument --image-id is required");
        assert_eq!(
            err,
            ProviderError::Other("aws: error: argument --image-id is required".to_string())
        );
        assert!(matches!(classify_error(""), ProviderError::Other(_)));
    }

    #[test]
    fn test_launch_args() {
        let request = LaunchRequest {
            image_id: "ami-1".to_string(),
            instance_type: "t2.nano".to_string(),
            key_name: "demo".to_string(),
            security_group: "web".to_string(),
            tags: vec![("Name".to_string(), "Demo".to_string())],
            user_data: "#!/bin/bash\necho hi".to_string(),
        };
        let out = launch_args(&request);

        assert_eq!(&out[..2], &["ec2".to_string(), "run-instances".to_string()]);
        let count_idx = out.iter().position(|a| a == "--count").unwrap();
        assert_eq!(out[count_idx + 1], "1");

        let tags_idx = out.iter().position(|a| a == "--tag-specifications").unwrap();
        let tags: serde_json::Value = serde_json::from_str(&out[tags_idx + 1]).unwrap();
        assert_eq!(tags[0]["ResourceType"], "instance");
        assert_eq!(tags[0]["Tags"][0]["Key"], "Name");
        assert_eq!(tags[0]["Tags"][0]["Value"], "Demo");
    }

    #[test]
    fn test_alarm_args() {
        let alarm = MetricAlarm {
            spec: AlarmSpec::default(),
            dimensions: vec![("InstanceId".to_string(), "i-123".to_string())],
            actions: vec!["arn:aws:automate:us-east-1:ec2:reboot".to_string()],
        };
        let out = alarm_args(&alarm);

        assert!(out.contains(&"Name=InstanceId,Value=i-123".to_string()));
        assert!(out.contains(&"GreaterThanOrEqualToThreshold".to_string()));
        assert!(out.contains(&"--actions-enabled".to_string()));
        let threshold_idx = out.iter().position(|a| a == "--threshold").unwrap();
        assert_eq!(out[threshold_idx + 1], "90");
    }

    #[test]
    fn test_ip_permissions_json() {
        let json = ip_permissions(&[IngressRule::tcp(80), IngressRule::tcp(22)]);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value.as_array().unwrap().len(), 2);
        assert_eq!(value[0]["FromPort"], 80);
        assert_eq!(value[1]["ToPort"], 22);
        assert_eq!(value[1]["IpRanges"][0]["CidrIp"], "0.0.0.0/0");
    }

    #[test]
    fn test_parse_describe_instances() {
        let json = r#"{
            "Reservations": [{
                "Instances": [{
                    "InstanceId": "i-abc",
                    "State": { "Code": 16, "Name": "running" },
                    "PublicDnsName": "ec2-1-2-3-4.compute-1.amazonaws.com",
                    "PublicIpAddress": "1.2.3.4"
                }]
            }]
        }"#;
        let output: DescribeInstancesOutput = serde_json::from_str(json).unwrap();
        let info: InstanceInfo = output
            .reservations
            .into_iter()
            .flat_map(|r| r.instances)
            .next()
            .map(InstanceInfo::from)
            .unwrap();

        assert_eq!(info.id, "i-abc");
        assert_eq!(info.state, InstanceState::Running);
        assert_eq!(info.public_ip.as_deref(), Some("1.2.3.4"));
    }

    #[test]
    fn test_pending_instance_has_no_address() {
        let json = r#"{
            "Instances": [{
                "InstanceId": "i-new",
                "State": { "Code": 0, "Name": "pending" },
                "PublicDnsName": ""
            }]
        }"#;
        let output: RunInstancesOutput = serde_json::from_str(json).unwrap();
        let info = InstanceInfo::from(output.instances.into_iter().next().unwrap());

        assert_eq!(info.state, InstanceState::Pending);
        assert_eq!(info.public_dns, None);
        assert_eq!(info.public_ip, None);
    }

    #[test]
    fn test_global_args() {
        let cli = AwsCli::new(AwsSettings {
            region: Some("eu-west-1".to_string()),
            profile: Some("demo".to_string()),
            ..Default::default()
        });
        assert_eq!(
            cli.global_args(),
            vec!["--output", "json", "--region", "eu-west-1", "--profile", "demo"]
        );
    }
}
