use std::path::PathBuf;
use std::time::Duration;

use crate::error::DiaError;
use crate::trim::TrimmedImageSet;
use crate::wcs::PropagationReport;

use super::state::PipelineState;

/// Pipeline processing stage, used for progress reporting.
#[derive(Clone, Copy, Debug)]
pub enum PipelineStage {
    Selecting,
    Registering,
    Subtracting,
    PropagatingWcs,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Selecting => write!(f, "Selecting references"),
            Self::Registering => write!(f, "Registering and trimming"),
            Self::Subtracting => write!(f, "Subtracting"),
            Self::PropagatingWcs => write!(f, "Copying WCS"),
        }
    }
}

/// Receives stage and per-image progress while a run executes.
///
/// Every method defaults to doing nothing.
pub trait ProgressReporter: Send + Sync {
    /// `total_items` is the number of images the stage will touch, when known.
    fn begin_stage(&self, _stage: PipelineStage, _total_items: Option<usize>) {}

    /// `items_done` images of the current stage are finished.
    fn advance(&self, _items_done: usize) {}

    fn finish_stage(&self) {}
}

/// Progress reporter that ignores everything.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// An error recorded while the pipeline was in `state`.
#[derive(Clone, Debug, PartialEq)]
pub struct PhaseError {
    pub state: PipelineState,
    pub kind: &'static str,
    pub message: String,
}

impl PhaseError {
    pub fn new(state: PipelineState, err: &DiaError) -> Self {
        Self {
            state,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Inspectable outcome of a run.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub state: PipelineState,
    /// Every state entered, in order, starting with `Init`.
    pub history: Vec<PipelineState>,
    pub errors: Vec<PhaseError>,
    pub wcs_reference: PathBuf,
    pub trimmed: Option<TrimmedImageSet>,
    /// Directory the engine read from: the trim directory, or the inputs
    /// when registration failed.
    pub subtraction_input: Option<PathBuf>,
    pub propagation: Option<PropagationReport>,
    /// `d_*` images in the output directory after a successful engine run.
    pub diff_images: Option<usize>,
    /// Conditions that did not fail the run but likely make its output
    /// incomplete.
    pub warnings: Vec<String>,
    /// Run-log writes that failed; the run itself is unaffected.
    pub log_failures: Vec<String>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.state == PipelineState::Done
    }

    pub fn elapsed_minutes(&self) -> f64 {
        self.elapsed.as_secs_f64() / 60.0
    }
}
