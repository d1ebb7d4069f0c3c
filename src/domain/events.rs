//! Journal events recorded while a run progresses.
//!
//! Each run appends its events to its own journal. The journal is an audit
//! trail only; runs never read another run's events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::step::{StepKind, StepStatus};

/// A single event in the append-only run journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The run this event belongs to
    pub run_id: Uuid,

    /// Step this event concerns (if applicable)
    pub step: Option<StepKind>,

    /// Type of event
    pub event_type: EventType,

    /// Human-readable summary (NO key material)
    pub summary: String,

    /// Status of the step after this event
    pub status: Option<StepStatus>,

    /// Time taken in milliseconds (for finished steps)
    pub duration_ms: Option<u64>,

    /// Error message if failed
    pub error: Option<String>,
}

impl Event {
    /// Create a new event with the current timestamp
    pub fn new(
        run_id: Uuid,
        step: Option<StepKind>,
        event_type: EventType,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            step,
            event_type,
            summary: summary.into(),
            status: None,
            duration_ms: None,
            error: None,
        }
    }

    pub fn with_status(mut self, status: StepStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Create an event with duration information
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Create an event with error information
    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }
}

/// Types of events that can occur during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A new run has started
    RunStarted,

    /// All steps ran (some non-fatal ones may have failed)
    RunCompleted,

    /// A fatal step failed and the run stopped
    RunAborted,

    /// A step has started execution
    StepStarted,

    /// A step changed something and succeeded
    StepSucceeded,

    /// A step found its desired state already in place
    StepUnchanged,

    /// A step failed
    StepFailed,
}
