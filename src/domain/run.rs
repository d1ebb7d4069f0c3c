//! The report of a single provisioning run.
//!
//! A `ProvisionRun` is owned by the sequencer while the run executes and
//! handed back to the caller at the end. Nothing is carried between runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::resource::{InstanceInfo, ProvisionedResource, ResourceKind};
use super::step::{StepKind, StepRecord, StepStatus};

/// A provisioning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionRun {
    /// Unique identifier for this run
    pub id: Uuid,

    /// Name tag of the stack being provisioned
    pub tag: String,

    /// Current state of the run
    pub state: RunState,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run finished (if applicable)
    pub completed_at: Option<DateTime<Utc>>,

    /// Executed steps in order
    pub steps: Vec<StepRecord>,

    /// Resources the run created or found
    pub resources: Vec<ProvisionedResource>,

    /// The launched instance, refreshed once it is running
    pub instance: Option<InstanceInfo>,

    /// Name of the website bucket
    pub bucket: Option<String>,

    /// URL of the web server on the instance
    pub instance_site: Option<String>,

    /// URL of the bucket website
    pub bucket_site: Option<String>,
}

impl ProvisionRun {
    /// Create a new run
    pub fn new(id: Uuid, tag: String) -> Self {
        Self {
            id,
            tag,
            state: RunState::Running,
            started_at: Utc::now(),
            completed_at: None,
            steps: Vec::new(),
            resources: Vec::new(),
            instance: None,
            bucket: None,
            instance_site: None,
            bucket_site: None,
        }
    }

    /// Record for a step, if it ran
    pub fn step(&self, step: StepKind) -> Option<&StepRecord> {
        self.steps.iter().find(|r| r.step == step)
    }

    /// Status of a step (`Pending` if it never ran)
    pub fn step_status(&self, step: StepKind) -> StepStatus {
        self.step(step).map(|r| r.status).unwrap_or_default()
    }

    /// Steps that failed without stopping the run
    pub fn failed_steps(&self) -> Vec<StepKind> {
        self.steps
            .iter()
            .filter(|r| r.status == StepStatus::Failed)
            .map(|r| r.step)
            .collect()
    }

    /// Tracked resource of a given kind
    pub fn resource(&self, kind: ResourceKind) -> Option<&ProvisionedResource> {
        self.resources.iter().find(|r| r.kind == kind)
    }

    /// Start tracking a resource, returning a mutable handle to its record
    pub fn track(&mut self, resource: ProvisionedResource) -> &mut ProvisionedResource {
        let kind = resource.kind;
        if let Some(idx) = self.resources.iter().position(|r| r.kind == kind) {
            self.resources[idx] = resource;
            &mut self.resources[idx]
        } else {
            self.resources.push(resource);
            let last = self.resources.len() - 1;
            &mut self.resources[last]
        }
    }

    /// Mutable handle to a tracked resource
    pub fn resource_mut(&mut self, kind: ResourceKind) -> Option<&mut ProvisionedResource> {
        self.resources.iter_mut().find(|r| r.kind == kind)
    }

    /// Whether a fatal step stopped the run
    pub fn is_aborted(&self) -> bool {
        matches!(self.state, RunState::Aborted { .. })
    }

    /// Process exit status for this run
    pub fn exit_code(&self) -> i32 {
        match self.state {
            RunState::Aborted { .. } => 1,
            _ => 0,
        }
    }
}

/// State of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    /// Run is in progress
    Running,

    /// Every step ran; non-fatal failures are listed in the step records
    Completed,

    /// A fatal step failed and the remaining steps were not executed
    Aborted { step: StepKind, error: String },
}
