//! Step outcomes.
//!
//! Every step returns a `StepResult` instead of raising. Whether a failure
//! ends the run is decided by the sequencer from the step's identity
//! (`StepKind::is_fatal`), not by where an error happens to be caught.

use std::path::PathBuf;

use thiserror::Error;

use crate::adapters::{KeyPairInfo, ProviderError};
use crate::domain::{InstanceInfo, StepStatus};

/// Why a step failed
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Precondition(String),
}

impl StepError {
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Outcome of one step
#[derive(Debug)]
pub enum StepResult<T> {
    /// The step changed something and produced a value
    Succeeded(T),

    /// The desired state already held; nothing was changed
    Unchanged(T),

    /// The step failed
    Failed(StepError),
}

impl<T> StepResult<T> {
    /// Wrap a fallible computation that always changes state when it succeeds
    pub fn from_result<E: Into<StepError>>(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Succeeded(value),
            Err(e) => Self::Failed(e.into()),
        }
    }

    pub fn status(&self) -> StepStatus {
        match self {
            Self::Succeeded(_) => StepStatus::Succeeded,
            Self::Unchanged(_) => StepStatus::Unchanged,
            Self::Failed(_) => StepStatus::Failed,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Succeeded(v) | Self::Unchanged(v) => Some(v),
            Self::Failed(_) => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Succeeded(v) | Self::Unchanged(v) => Some(v),
            Self::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&StepError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Summary line a step value contributes to the run report
pub trait StepOutput {
    fn describe(&self) -> Option<String>;
}

impl StepOutput for () {
    fn describe(&self) -> Option<String> {
        None
    }
}

impl StepOutput for String {
    fn describe(&self) -> Option<String> {
        let line = self.lines().find(|l| !l.trim().is_empty())?.trim();
        if line.chars().count() > 120 {
            Some(format!("{}...", line.chars().take(117).collect::<String>()))
        } else {
            Some(line.to_string())
        }
    }
}

impl StepOutput for KeyPairInfo {
    fn describe(&self) -> Option<String> {
        Some(format!("{} ({})", self.name, self.id))
    }
}

impl StepOutput for InstanceInfo {
    fn describe(&self) -> Option<String> {
        match self.remote_host() {
            Some(host) => Some(format!("{} {} at {}", self.id, self.state, host)),
            None => Some(format!("{} {}", self.id, self.state)),
        }
    }
}

/// An asset copied from its origin into the bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayedAsset {
    pub key: String,
    pub size_bytes: u64,
    /// Hex SHA-256 of the relayed bytes
    pub sha256: String,
}

impl StepOutput for RelayedAsset {
    fn describe(&self) -> Option<String> {
        Some(format!(
            "{} ({} bytes, sha256 {})",
            self.key,
            self.size_bytes,
            &self.sha256[..self.sha256.len().min(12)]
        ))
    }
}

/// URLs handed to the browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedUrls(pub Vec<String>);

impl StepOutput for OpenedUrls {
    fn describe(&self) -> Option<String> {
        if self.0.is_empty() {
            Some("nothing to open".to_string())
        } else {
            Some(self.0.join(", "))
        }
    }
}
