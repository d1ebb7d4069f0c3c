//! Domain types for the stackup provisioner.
//!
//! This module contains the core data structures:
//! - Request: The immutable description of what to provision
//! - Resource: Records of provisioned (or attempted) cloud resources
//! - Step: Step identities and per-step outcome records
//! - Events: Journal entries written while a run progresses
//! - Run: The report of a single provisioning run

pub mod events;
pub mod request;
pub mod resource;
pub mod run;
pub mod step;

// Re-export commonly used types
pub use events::{Event, EventType};
pub use request::{
    AlarmSpec, Comparator, FirewallSpec, IngressRule, InstanceSpec, KeyPairSpec, MonitoringSpec,
    ProvisioningRequest, WebsiteSpec, BUNDLED_MONITOR_SCRIPT, DEFAULT_USER_DATA,
};
pub use resource::{InstanceInfo, InstanceState, ProvisionedResource, ResourceKind, ResourceStatus};
pub use run::{ProvisionRun, RunState};
pub use step::{StepKind, StepRecord, StepStatus};
