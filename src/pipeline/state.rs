//! Pipeline health and status shared with the control surface.
//!
//! [`PipelineHealth`] is the coarse state machine the control surface
//! renders.  [`PipelineStatus`] adds the operational counters (windows,
//! events, errors, drops) that backend failures surface through — per the
//! error-handling design, a failing backend is a metric, not an exception.
//!
//! [`SharedStatus`] is a type alias for `Arc<Mutex<PipelineStatus>>` —
//! cheap to clone, written only by the pipeline task, read by anyone.

use std::sync::{Arc, Mutex};

use crate::config::WindowingMode;

// ---------------------------------------------------------------------------
// PipelineHealth
// ---------------------------------------------------------------------------

/// Coarse pipeline condition.
///
/// ```text
/// Idle ──first window──▶ Running ◀──backend recovers── Degraded
///                          │                              ▲
///                          └──all backends failing────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineHealth {
    /// No window has been processed yet (or the audio source is quiet).
    Idle,
    /// Windows are flowing and at least one backend responds.
    Running,
    /// Every configured backend is erroring repeatedly.  The only condition
    /// presented to operators as a failure; the pipeline itself keeps going
    /// and recovers on the next successful call.
    Degraded,
}

impl PipelineHealth {
    /// A short human-readable label for the control surface.
    pub fn label(&self) -> &'static str {
        match self {
            PipelineHealth::Idle => "Idle",
            PipelineHealth::Running => "Running",
            PipelineHealth::Degraded => "Degraded",
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, PipelineHealth::Degraded)
    }
}

impl Default for PipelineHealth {
    fn default() -> Self {
        PipelineHealth::Idle
    }
}

// ---------------------------------------------------------------------------
// PipelineStatus
// ---------------------------------------------------------------------------

/// Operational snapshot of the pipeline, updated as windows flow through.
#[derive(Debug, Clone)]
pub struct PipelineStatus {
    /// Coarse condition, see [`PipelineHealth`].
    pub health: PipelineHealth,

    /// Active windowing mode.
    pub mode: WindowingMode,

    /// Identity string of the backend serving the session.
    pub backend: String,

    /// Windows submitted to a backend (successful or not).
    pub windows_processed: u64,

    /// Windows dropped from the bounded queue under load.
    pub windows_dropped: u64,

    /// Backend calls that failed or timed out.
    pub backend_errors: u64,

    /// Results rejected by the hallucination filter.
    pub filtered_hallucinations: u64,

    /// Subtitle events published to the hub.
    pub events_published: u64,
}

impl PipelineStatus {
    pub fn new(mode: WindowingMode, backend: String) -> Self {
        Self {
            health: PipelineHealth::Idle,
            mode,
            backend,
            windows_processed: 0,
            windows_dropped: 0,
            backend_errors: 0,
            filtered_hallucinations: 0,
            events_published: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// SharedStatus
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`PipelineStatus`].
///
/// Lock for short critical sections only; do **not** hold the lock across
/// `.await` points.
pub type SharedStatus = Arc<Mutex<PipelineStatus>>;

/// Construct a new [`SharedStatus`].
pub fn new_shared_status(mode: WindowingMode, backend: String) -> SharedStatus {
    Arc::new(Mutex::new(PipelineStatus::new(mode, backend)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
