//! stackup - Idempotent provisioning of a demo web stack
//!
//! Brings up a small web stack on AWS in a fixed order: key pair, security
//! group, one instance, a public static-website bucket with a relayed image,
//! a monitoring script run over SSH, and a CPU alarm.
//!
//! # Architecture
//!
//! Every step is a convergence step returning a `StepResult`:
//! - Steps look before they create, so a rerun changes nothing that exists
//! - Whether a failure ends the run depends only on which step failed
//! - Provider calls go through traits, so tests run without a cloud account
//!
//! # Modules
//!
//! - `adapters`: External systems (AWS CLI, OpenSSH, HTTP, browser)
//! - `core`: Sequencer, retry, journal and website material
//! - `domain`: Data structures (request, resources, steps, run report)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Provision with the defaults
//! stackup
//!
//! # Choose key pair, tag and security group
//! stackup --key my-key --tag "My Web Server" --sec web-sg
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use crate::core::{Providers, Sequencer, StepResult};
pub use domain::{ProvisionRun, ProvisioningRequest, RunState, StepKind, StepStatus};
