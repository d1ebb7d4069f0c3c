//! Core provisioning logic.
//!
//! This module contains:
//! - Sequencer: Runs the ordered provisioning steps
//! - Steps: Step outcomes and errors
//! - Retry: Bounded retry and polling
//! - Journal: Append-only run journal
//! - Website: Bucket naming and website material
//! - Keyfile: Private key persistence

pub mod journal;
pub mod keyfile;
pub mod retry;
pub mod sequencer;
pub mod steps;
pub mod website;

// Re-export commonly used types
pub use journal::RunJournal;
pub use retry::{poll_until, with_retry, Poll, RetryPolicy};
pub use sequencer::{Providers, Sequencer};
pub use steps::{OpenedUrls, RelayedAsset, StepError, StepOutput, StepResult};
pub use website::{bucket_name, validate_bucket_name, website_url};
