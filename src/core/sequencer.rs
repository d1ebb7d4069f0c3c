//! The provisioning sequencer.
//!
//! Runs the fixed list of steps in order against the configured providers.
//! Each step converges one piece of the stack and hands back a `StepResult`;
//! the sequencer records it and stops only when a fatal step fails.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{
    AlarmApi, AssetSource, AwsCli, AwsSettings, Browser, ComputeApi, HttpAssetSource,
    KeyPairInfo, LaunchRequest, MetricAlarm, OpenSsh, ProviderError, RemoteShell, RemoteTarget,
    StorageApi, SystemBrowser,
};
use crate::domain::{
    Event, EventType, InstanceInfo, InstanceState, IngressRule, KeyPairSpec, ProvisionRun,
    ProvisionedResource, ProvisioningRequest, ResourceKind, RunState, StepKind, StepRecord,
    StepStatus, BUNDLED_MONITOR_SCRIPT,
};

use super::journal::RunJournal;
use super::keyfile::write_private_key;
use super::retry::{poll_until, with_retry, Poll, RetryPolicy};
use super::steps::{OpenedUrls, RelayedAsset, StepError, StepOutput, StepResult};
use super::website::{
    bucket_name, index_page, public_read_policy, sha256_hex, validate_bucket_name, website_url,
};

/// The external systems a run talks to
#[derive(Clone)]
pub struct Providers {
    pub compute: Arc<dyn ComputeApi>,
    pub storage: Arc<dyn StorageApi>,
    pub alarms: Arc<dyn AlarmApi>,
    pub shell: Arc<dyn RemoteShell>,
    pub assets: Arc<dyn AssetSource>,
    pub browser: Arc<dyn Browser>,
}

impl Providers {
    /// Production wiring: AWS CLI, OpenSSH, HTTP and the system browser
    pub fn aws(settings: AwsSettings, ssh_timeout: Duration, fetch_timeout: Duration) -> Self {
        let cli = Arc::new(AwsCli::new(settings));
        Self {
            compute: cli.clone(),
            storage: cli.clone(),
            alarms: cli,
            shell: Arc::new(OpenSsh::new(ssh_timeout)),
            assets: Arc::new(HttpAssetSource::new(fetch_timeout)),
            browser: Arc::new(SystemBrowser),
        }
    }
}

/// A fatal step failed; the remaining steps do not run
#[derive(Debug)]
struct Aborted;

/// Mutable state of the run in progress
struct RunContext {
    run: ProvisionRun,
    journal: Option<RunJournal>,
}

impl RunContext {
    /// Append to the journal; a failed write never affects the run
    async fn record(&self, event: Event) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.append(&event).await {
                warn!(error = %e, "Failed to write journal event");
            }
        }
    }

    /// Run one step, record its outcome, and stop the run if a fatal step failed
    async fn execute<T, Fut>(&mut self, step: StepKind, fut: Fut) -> Result<Option<T>, Aborted>
    where
        T: StepOutput,
        Fut: Future<Output = StepResult<T>>,
    {
        let run_id = self.run.id;
        info!(%step, "Starting step");
        self.record(
            Event::new(run_id, Some(step), EventType::StepStarted, format!("{} started", step))
                .with_status(StepStatus::Running),
        )
        .await;

        let started = Instant::now();
        let result = fut.await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let status = result.status();
        let detail = result.value().and_then(|v| v.describe());
        let error = result.error().map(|e| e.to_string());

        let event_type = match &result {
            StepResult::Succeeded(_) => {
                info!(%step, detail = detail.as_deref().unwrap_or(""), duration_ms, "Step succeeded");
                EventType::StepSucceeded
            }
            StepResult::Unchanged(_) => {
                info!(%step, detail = detail.as_deref().unwrap_or(""), "Step found nothing to do");
                EventType::StepUnchanged
            }
            StepResult::Failed(e) if step.is_fatal() => {
                error!(%step, error = %e, "Fatal step failed");
                EventType::StepFailed
            }
            StepResult::Failed(e) => {
                warn!(%step, error = %e, "Step failed, continuing");
                EventType::StepFailed
            }
        };

        let mut event = Event::new(
            run_id,
            Some(step),
            event_type,
            detail.clone().unwrap_or_else(|| step.to_string()),
        )
        .with_status(status)
        .with_duration(duration_ms);
        if let Some(error) = &error {
            event = event.with_error(error.clone());
        }
        self.record(event).await;

        self.run.steps.push(StepRecord {
            step,
            status,
            detail,
            error,
            duration_ms,
        });

        match result {
            StepResult::Succeeded(value) | StepResult::Unchanged(value) => Ok(Some(value)),
            StepResult::Failed(e) if step.is_fatal() => {
                self.run.state = RunState::Aborted {
                    step,
                    error: e.to_string(),
                };
                Err(Aborted)
            }
            StepResult::Failed(_) => Ok(None),
        }
    }

    /// Run a step whose value every later step needs
    async fn gate<T, Fut>(&mut self, step: StepKind, fut: Fut) -> Result<T, Aborted>
    where
        T: StepOutput,
        Fut: Future<Output = StepResult<T>>,
    {
        self.execute(step, fut).await?.ok_or(Aborted)
    }

    /// Record the resource a step converged, based on how the step ended
    fn track(&mut self, kind: ResourceKind, name: &str, step: StepKind, id: Option<String>) {
        let status = self.run.step_status(step);
        let resource = self.run.track(ProvisionedResource::new(kind, name));
        match status {
            StepStatus::Unchanged => resource.mark_ready(id),
            StepStatus::Succeeded => {
                resource.mark_creating();
                resource.mark_ready(id);
            }
            _ => resource.mark_failed(),
        }
    }
}

/// Runs provisioning requests step by step
pub struct Sequencer {
    providers: Providers,

    /// Policy for retryable provider calls
    retry: RetryPolicy,

    /// Policy for waiting on the instance
    wait: RetryPolicy,

    /// Where run journals are written (disabled when unset)
    journal_dir: Option<PathBuf>,
}

impl Sequencer {
    pub fn new(providers: Providers) -> Self {
        Self {
            providers,
            retry: RetryPolicy::default(),
            wait: RetryPolicy::instance_wait(),
            journal_dir: None,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn with_wait_policy(mut self, policy: RetryPolicy) -> Self {
        self.wait = policy;
        self
    }

    /// Journal every run under `runs_dir/<run-id>/events.jsonl`
    pub fn with_journal_dir(mut self, runs_dir: impl Into<PathBuf>) -> Self {
        self.journal_dir = Some(runs_dir.into());
        self
    }

    /// Execute every step in order and return the run report.
    ///
    /// Never fails as a whole: step failures are recorded in the report and
    /// a fatal one leaves the run in `RunState::Aborted`.
    #[instrument(skip(self, request), fields(tag = %request.tag))]
    pub async fn run(&self, request: &ProvisioningRequest) -> ProvisionRun {
        let run_id = Uuid::new_v4();
        info!(
            %run_id,
            image = %request.instance.image_id,
            instance_type = %request.instance.instance_type,
            key = %request.key_pair.name,
            security_group = %request.firewall.name,
            "Starting provisioning run"
        );

        let mut ctx = RunContext {
            run: ProvisionRun::new(run_id, request.tag.clone()),
            journal: self.open_journal(run_id).await,
        };
        ctx.record(Event::new(
            run_id,
            None,
            EventType::RunStarted,
            format!("Provisioning '{}' started", request.tag),
        ))
        .await;

        let outcome = self.drive(&mut ctx, request).await;
        ctx.run.completed_at = Some(Utc::now());

        match outcome {
            Ok(()) => {
                ctx.run.state = RunState::Completed;
                let failed = ctx.run.failed_steps();
                info!(failed = failed.len(), "Provisioning run completed");
                ctx.record(Event::new(
                    run_id,
                    None,
                    EventType::RunCompleted,
                    format!("Run completed with {} failed step(s)", failed.len()),
                ))
                .await;
            }
            Err(Aborted) => {
                let (step, message) = match &ctx.run.state {
                    RunState::Aborted { step, error } => (step.to_string(), error.clone()),
                    _ => ("unknown".to_string(), "aborted".to_string()),
                };
                error!(%step, error = %message, "Provisioning run aborted");
                ctx.record(
                    Event::new(
                        run_id,
                        None,
                        EventType::RunAborted,
                        format!("Run aborted at {}", step),
                    )
                    .with_error(message),
                )
                .await;
            }
        }

        ctx.run
    }

    async fn open_journal(&self, run_id: Uuid) -> Option<RunJournal> {
        let runs_dir = self.journal_dir.as_ref()?;
        match RunJournal::open(runs_dir, run_id).await {
            Ok(journal) => {
                debug!(path = %journal.events_path().display(), "Run journal opened");
                Some(journal)
            }
            Err(e) => {
                warn!(error = %e, "Run journal disabled");
                None
            }
        }
    }

    async fn drive(&self, ctx: &mut RunContext, request: &ProvisioningRequest) -> Result<(), Aborted> {
        // Key pair and security group failures surface again at launch
        let key = ctx
            .execute(StepKind::EnsureKeyPair, self.ensure_key_pair(&request.key_pair))
            .await?;
        ctx.track(
            ResourceKind::KeyPair,
            &request.key_pair.name,
            StepKind::EnsureKeyPair,
            key.map(|k| k.id),
        );

        let description = request.firewall_description();
        let group_id = ctx
            .execute(
                StepKind::EnsureFirewallRule,
                self.ensure_firewall_rule(
                    &request.firewall.name,
                    &description,
                    &request.firewall.ingress,
                ),
            )
            .await?;
        ctx.track(
            ResourceKind::FirewallRule,
            &request.firewall.name,
            StepKind::EnsureFirewallRule,
            group_id,
        );

        let launch = LaunchRequest {
            image_id: request.instance.image_id.clone(),
            instance_type: request.instance.instance_type.clone(),
            key_name: request.key_pair.name.clone(),
            security_group: request.firewall.name.clone(),
            tags: vec![("Name".to_string(), request.tag.clone())],
            user_data: request.instance.user_data.clone(),
        };
        let launched = ctx
            .gate(StepKind::LaunchInstance, self.launch_instance(&launch))
            .await?;
        // Launched is not ready: the record settles once the wait ends
        let record = ctx.run.track(ProvisionedResource::new(
            ResourceKind::ComputeInstance,
            &request.tag,
        ));
        record.id = Some(launched.id.clone());
        record.mark_creating();
        ctx.run.instance = Some(launched.clone());

        let awaited = ctx
            .gate(StepKind::AwaitRunning, self.await_running(&launched.id))
            .await;
        if let Some(record) = ctx.run.resource_mut(ResourceKind::ComputeInstance) {
            match &awaited {
                Ok(_) => record.mark_ready(None),
                Err(Aborted) => record.mark_failed(),
            }
        }
        let instance = awaited?;
        ctx.run.instance_site = instance.site_url();
        if let Some(url) = &ctx.run.instance_site {
            info!(%url, "Instance web server address");
        }
        ctx.run.instance = Some(instance.clone());

        let bucket = bucket_name(&request.website.bucket_prefix, Utc::now());
        ctx.gate(StepKind::CreateStorageBucket, self.create_storage_bucket(&bucket))
            .await?;
        ctx.track(
            ResourceKind::StorageBucket,
            &bucket,
            StepKind::CreateStorageBucket,
            None,
        );
        ctx.run.bucket = Some(bucket.clone());

        ctx.execute(
            StepKind::SetPublicReadPolicy,
            self.set_public_read_policy(&bucket),
        )
        .await?;

        let website = &request.website;
        ctx.execute(
            StepKind::EnableStaticWebsite,
            self.enable_static_website(&bucket, &website.index_document),
        )
        .await?;
        ctx.track(
            ResourceKind::BucketWebsiteConfig,
            &bucket,
            StepKind::EnableStaticWebsite,
            None,
        );

        let asset_key = website.asset_key();
        let page = index_page(&asset_key);
        ctx.execute(
            StepKind::PublishObject,
            self.publish_object(&bucket, &website.index_document, page.as_bytes(), "text/html"),
        )
        .await?;

        ctx.execute(
            StepKind::FetchAndRelayAsset,
            self.fetch_and_relay_asset(&website.asset_url, &bucket, &asset_key),
        )
        .await?;

        let bucket_site = website_url(&bucket, &request.region);
        info!(url = %bucket_site, "Bucket website address");
        ctx.run.bucket_site = Some(bucket_site);

        let urls: Vec<String> = if request.open_browser {
            [ctx.run.instance_site.clone(), ctx.run.bucket_site.clone()]
                .into_iter()
                .flatten()
                .collect()
        } else {
            Vec::new()
        };
        ctx.execute(StepKind::OpenInBrowser, self.open_in_browser(&urls))
            .await?;

        let monitoring = &request.monitoring;
        let target = instance.remote_host().map(|host| RemoteTarget {
            user: monitoring.remote_user.clone(),
            host: host.to_string(),
            key_file: request.key_pair.key_file(),
        });

        ctx.execute(StepKind::PushFileToInstance, async {
            match &target {
                Some(target) => {
                    self.push_file_to_instance(target, monitoring.script.as_deref())
                        .await
                }
                None => StepResult::Failed(no_remote_host(&instance)),
            }
        })
        .await?;

        let command = monitoring.remote_command();
        ctx.execute(StepKind::RunRemoteCommand, async {
            match &target {
                Some(target) => self.run_remote_command(target, &command).await,
                None => StepResult::Failed(no_remote_host(&instance)),
            }
        })
        .await?;

        let alarm = MetricAlarm {
            spec: request.alarm.clone(),
            dimensions: vec![("InstanceId".to_string(), instance.id.clone())],
            actions: request.alarm_actions(),
        };
        ctx.execute(StepKind::CreateMetricAlarm, self.create_metric_alarm(&alarm))
            .await?;
        ctx.track(
            ResourceKind::Alarm,
            &request.alarm.name,
            StepKind::CreateMetricAlarm,
            None,
        );

        Ok(())
    }

    /// Find the key pair by name, creating it and saving its private key if absent
    #[instrument(skip(self, spec), fields(key = %spec.name))]
    pub async fn ensure_key_pair(&self, spec: &KeyPairSpec) -> StepResult<KeyPairInfo> {
        let compute = &self.providers.compute;
        let name = spec.name.as_str();
        let key_file = spec.key_file();

        match with_retry(&self.retry, "describe-key-pairs", move || {
            compute.find_key_pair(name)
        })
        .await
        {
            Ok(Some(info)) => {
                if !key_file.exists() {
                    warn!(
                        path = %key_file.display(),
                        "Key pair exists but its private key file is missing; remote steps will fail"
                    );
                }
                StepResult::Unchanged(info)
            }
            Ok(None) => self.create_key_pair(name, &key_file).await,
            Err(e) => StepResult::Failed(e.into()),
        }
    }

    async fn create_key_pair(&self, name: &str, key_file: &Path) -> StepResult<KeyPairInfo> {
        let compute = &self.providers.compute;

        let created = match compute.create_key_pair(name).await {
            Ok(created) => created,
            Err(ProviderError::AlreadyExists(_)) => {
                // Appeared between lookup and create
                return match compute.find_key_pair(name).await {
                    Ok(Some(info)) => StepResult::Unchanged(info),
                    Ok(None) => StepResult::Failed(
                        ProviderError::NotFound(format!("key pair {}", name)).into(),
                    ),
                    Err(e) => StepResult::Failed(e.into()),
                };
            }
            Err(e) => return StepResult::Failed(e.into()),
        };

        if let Err(e) = write_private_key(key_file, &created.material).await {
            return StepResult::Failed(StepError::io("write private key", key_file, e));
        }

        info!(path = %key_file.display(), "Created key pair and saved private key");
        StepResult::Succeeded(created.info)
    }

    /// Find the security group by name, creating it with `rules` if absent.
    ///
    /// Returns the group id. An existing group is matched by name only; its
    /// inbound rules are not compared with `rules`, so a group left without
    /// rules by a failed authorize stays that way on later runs.
    #[instrument(skip(self, description, rules))]
    pub async fn ensure_firewall_rule(
        &self,
        name: &str,
        description: &str,
        rules: &[IngressRule],
    ) -> StepResult<String> {
        let compute = &self.providers.compute;

        match with_retry(&self.retry, "describe-security-groups", move || {
            compute.find_security_group(name)
        })
        .await
        {
            Ok(Some(group_id)) => {
                info!(%group_id, "Security group exists; inbound rules are not re-checked");
                return StepResult::Unchanged(group_id);
            }
            Ok(None) => {}
            Err(e) => return StepResult::Failed(e.into()),
        }

        let group_id = match compute.create_security_group(name, description).await {
            Ok(group_id) => group_id,
            Err(ProviderError::AlreadyExists(_)) => {
                return match compute.find_security_group(name).await {
                    Ok(Some(group_id)) => StepResult::Unchanged(group_id),
                    Ok(None) => StepResult::Failed(
                        ProviderError::NotFound(format!("security group {}", name)).into(),
                    ),
                    Err(e) => StepResult::Failed(e.into()),
                };
            }
            Err(e) => return StepResult::Failed(e.into()),
        };

        let group = group_id.as_str();
        let authorized = with_retry(&self.retry, "authorize-security-group-ingress", move || {
            compute.authorize_ingress(group, rules)
        })
        .await;

        match authorized {
            // Rules already present count as authorized
            Ok(()) | Err(ProviderError::AlreadyExists(_)) => {
                info!(%group_id, rules = rules.len(), "Created security group");
                StepResult::Succeeded(group_id)
            }
            Err(e) => StepResult::Failed(e.into()),
        }
    }

    /// Launch exactly one instance. Never retried: a repeated call could
    /// start a second instance.
    #[instrument(skip(self, request), fields(image = %request.image_id))]
    pub async fn launch_instance(&self, request: &LaunchRequest) -> StepResult<InstanceInfo> {
        let result = self.providers.compute.run_instance(request).await;
        if let Ok(instance) = &result {
            info!(instance_id = %instance.id, state = %instance.state, "Launched instance");
        }
        StepResult::from_result(result)
    }

    /// Poll until the instance is running, bounded by the wait policy
    #[instrument(skip(self))]
    pub async fn await_running(&self, instance_id: &str) -> StepResult<InstanceInfo> {
        let compute = &self.providers.compute;

        let result = poll_until(&self.wait, "instance running", move || async move {
            match compute.describe_instance(instance_id).await {
                Ok(info) if info.state == InstanceState::Running => Ok(Poll::Ready(info)),
                Ok(info) if info.state.is_terminal() => Err(ProviderError::Other(format!(
                    "instance {} entered state {}",
                    instance_id, info.state
                ))),
                Ok(info) => Ok(Poll::NotYet(info.state.to_string())),
                // New instances are briefly invisible to describe calls
                Err(ProviderError::NotFound(_)) => Ok(Poll::NotYet("not visible yet".to_string())),
                Err(e) => Err(e),
            }
        })
        .await;

        StepResult::from_result(result)
    }

    /// Create the bucket unless it already exists and is ours
    #[instrument(skip(self))]
    pub async fn create_storage_bucket(&self, bucket: &str) -> StepResult<()> {
        if let Err(reason) = validate_bucket_name(bucket) {
            return StepResult::Failed(StepError::Precondition(reason));
        }

        let storage = &self.providers.storage;
        match with_retry(&self.retry, "head-bucket", move || storage.bucket_exists(bucket)).await {
            Ok(true) => return StepResult::Unchanged(()),
            Ok(false) => {}
            Err(e) => return StepResult::Failed(e.into()),
        }

        StepResult::from_result(storage.create_bucket(bucket).await)
    }

    #[instrument(skip(self))]
    pub async fn set_public_read_policy(&self, bucket: &str) -> StepResult<()> {
        let storage = &self.providers.storage;
        let policy = public_read_policy(bucket);
        let policy = policy.as_str();

        StepResult::from_result(
            with_retry(&self.retry, "put-bucket-policy", move || {
                storage.put_bucket_policy(bucket, policy)
            })
            .await,
        )
    }

    #[instrument(skip(self))]
    pub async fn enable_static_website(&self, bucket: &str, index_document: &str) -> StepResult<()> {
        let storage = &self.providers.storage;

        StepResult::from_result(
            with_retry(&self.retry, "put-bucket-website", move || {
                storage.put_bucket_website(bucket, index_document)
            })
            .await,
        )
    }

    #[instrument(skip(self, body), fields(size = body.len()))]
    pub async fn publish_object(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        content_type: &str,
    ) -> StepResult<()> {
        let storage = &self.providers.storage;

        StepResult::from_result(
            with_retry(&self.retry, "put-object", move || {
                storage.put_object(bucket, key, body, content_type)
            })
            .await,
        )
    }

    /// Download `url` and upload it as `key`.
    ///
    /// Nothing is uploaded when the download fails or produces an empty body.
    #[instrument(skip(self))]
    pub async fn fetch_and_relay_asset(
        &self,
        url: &str,
        bucket: &str,
        key: &str,
    ) -> StepResult<RelayedAsset> {
        let assets = &self.providers.assets;
        let body = match with_retry(&self.retry, "fetch asset", move || assets.fetch(url)).await {
            Ok(body) => body,
            Err(e) => {
                warn!(%url, error = %e, "Asset download failed, skipping upload");
                return StepResult::Failed(e.into());
            }
        };

        if body.is_empty() {
            warn!(%url, "Asset download returned no content, skipping upload");
            return StepResult::Failed(StepError::Precondition(format!(
                "asset {} returned an empty body",
                url
            )));
        }

        let staged = match stage_bytes(&body).await {
            Ok(staged) => staged,
            Err(e) => return StepResult::Failed(e),
        };

        let storage = &self.providers.storage;
        let path = staged.path();
        let uploaded = with_retry(&self.retry, "upload asset", move || {
            storage.upload_file(bucket, key, path)
        })
        .await;

        StepResult::from_result(uploaded.map(|()| RelayedAsset {
            key: key.to_string(),
            size_bytes: body.len() as u64,
            sha256: sha256_hex(&body),
        }))
    }

    /// Open each URL in the local browser
    pub async fn open_in_browser(&self, urls: &[String]) -> StepResult<OpenedUrls> {
        if urls.is_empty() {
            return StepResult::Unchanged(OpenedUrls(Vec::new()));
        }

        let mut opened = Vec::new();
        let mut first_error = None;
        for url in urls {
            match self.providers.browser.open(url) {
                Ok(()) => opened.push(url.clone()),
                Err(e) => {
                    warn!(%url, error = %e, "Could not open browser");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) if opened.is_empty() => StepResult::Failed(e.into()),
            _ => StepResult::Succeeded(OpenedUrls(opened)),
        }
    }

    /// Copy the monitoring script (the bundled one when `script` is unset)
    /// into the remote home directory
    #[instrument(skip(self, target), fields(host = %target.host))]
    pub async fn push_file_to_instance(
        &self,
        target: &RemoteTarget,
        script: Option<&Path>,
    ) -> StepResult<String> {
        let (local, _bundled) = match script {
            Some(path) => {
                if !path.is_file() {
                    return StepResult::Failed(StepError::Precondition(format!(
                        "monitoring script {} not found",
                        path.display()
                    )));
                }
                (path.to_path_buf(), None)
            }
            None => match write_bundled_script().await {
                Ok((dir, path)) => (path, Some(dir)),
                Err(e) => return StepResult::Failed(e),
            },
        };

        let shell = &self.providers.shell;
        let local_path = local.as_path();
        let copied = with_retry(&self.retry, "scp", move || shell.copy_to(target, local_path)).await;

        let remote = local
            .file_name()
            .map(|n| format!("~/{}", n.to_string_lossy()))
            .unwrap_or_else(|| "~/".to_string());
        StepResult::from_result(copied.map(|()| remote))
    }

    /// Run `command` on the instance once, returning its output.
    ///
    /// Not retried: ssh reports its own connection failures and a command
    /// exiting 255 the same way, and the command must not run twice.
    #[instrument(skip(self, target), fields(host = %target.host))]
    pub async fn run_remote_command(&self, target: &RemoteTarget, command: &str) -> StepResult<String> {
        let result = self.providers.shell.run(target, command).await;

        if let Ok(output) = &result {
            for line in output.lines().filter(|l| !l.trim().is_empty()) {
                info!("remote: {}", line);
            }
        }
        StepResult::from_result(result)
    }

    /// Create or replace the alarm by name
    #[instrument(skip(self, alarm), fields(alarm = %alarm.spec.name))]
    pub async fn create_metric_alarm(&self, alarm: &MetricAlarm) -> StepResult<()> {
        let alarms = &self.providers.alarms;

        StepResult::from_result(
            with_retry(&self.retry, "put-metric-alarm", move || {
                alarms.put_metric_alarm(alarm)
            })
            .await,
        )
    }
}

fn no_remote_host(instance: &InstanceInfo) -> StepError {
    StepError::Precondition(format!(
        "instance {} has no public address for remote access",
        instance.id
    ))
}

/// Write `bytes` to a temporary file that lives as long as the handle
async fn stage_bytes(bytes: &[u8]) -> Result<NamedTempFile, StepError> {
    let staged = NamedTempFile::new()
        .map_err(|e| StepError::io("create staging file in", std::env::temp_dir(), e))?;
    tokio::fs::write(staged.path(), bytes)
        .await
        .map_err(|e| StepError::io("write staging file", staged.path(), e))?;
    Ok(staged)
}

/// Materialize the bundled monitoring script in a fresh temporary directory
async fn write_bundled_script() -> Result<(TempDir, PathBuf), StepError> {
    let dir = TempDir::new()
        .map_err(|e| StepError::io("create directory in", std::env::temp_dir(), e))?;
    let path = dir.path().join("monitor.sh");
    tokio::fs::write(&path, BUNDLED_MONITOR_SCRIPT)
        .await
        .map_err(|e| StepError::io("write", &path, e))?;
    Ok((dir, path))
}
