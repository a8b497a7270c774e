use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::consts::{DIFF_IMAGE_PREFIX, TRIM_SUFFIX};
use crate::engine::{create_engine, DiffEngine, EngineRequest};
use crate::error::{DiaError, Result};
use crate::runlog::RunLogger;
use crate::select::{list_matching, rewrite_reference_list, select_references, ReferenceSelection};
use crate::trim::{
    spin_and_trim, trimmed_name, trimmed_path, BilinearReprojector, Reprojector, TrimmedImageSet,
};
use crate::wcs::{propagate_wcs, resolve_wcs_source, WcsSourceCandidates};

use super::config::RunParameters;
use super::state::PipelineState;
use super::types::{NoOpReporter, PhaseError, PipelineStage, ProgressReporter, RunReport};

/// Sequences selection, registration, subtraction and WCS propagation for
/// one set of [`RunParameters`].
pub struct Pipeline {
    params: RunParameters,
    engine: Arc<dyn DiffEngine>,
    reprojector: Arc<dyn Reprojector>,
    reporter: Arc<dyn ProgressReporter>,
}

impl Pipeline {
    /// Pipeline using the external engine variant chosen by `use_gpu`.
    pub fn new(params: RunParameters) -> Self {
        let engine: Arc<dyn DiffEngine> =
            Arc::from(create_engine(&params.engine_commands, params.use_gpu));
        Self {
            params,
            engine,
            reprojector: Arc::new(BilinearReprojector),
            reporter: Arc::new(NoOpReporter),
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn DiffEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_reprojector(mut self, reprojector: Arc<dyn Reprojector>) -> Self {
        self.reprojector = reprojector;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn params(&self) -> &RunParameters {
        &self.params
    }

    /// Run every phase.
    ///
    /// Configuration, discovery and reference errors are returned as `Err`
    /// before anything is written. Later failures end up in the report.
    pub fn run(&self) -> Result<RunReport> {
        let started = Instant::now();
        let params = &self.params;
        params.validate()?;

        self.reporter.begin_stage(PipelineStage::Selecting, None);
        let selection = select_references(params);
        self.reporter.finish_stage();
        let selection = selection?;

        let logger = RunLogger::new(params.run_log_path());
        let mut run = RunProgress::new(selection.wcs_reference.clone());
        run.note_log(logger.start(&params.loc_data, &params.loc_output));

        // Registration
        run.enter(PipelineState::Registering);
        let trimmed = match spin_and_trim(
            &selection.images,
            &selection.wcs_reference,
            &params.trim_config(),
            self.reprojector.as_ref(),
            self.reporter.as_ref(),
        ) {
            Ok(set) => {
                info!(count = set.len(), dir = %params.loc_trim.display(), "Trimmed images ready");
                run.enter(PipelineState::Trimmed);
                if let Some(ref list) = selection.ref_image_list {
                    match rewrite_reference_list(list, &params.loc_trim) {
                        Ok(rewrite) if rewrite.kept.is_empty() && !rewrite.dropped.is_empty() => {
                            warn!(
                                dropped = rewrite.dropped.len(),
                                list = %list.display(),
                                "No reference image has a trimmed counterpart; the reference list is empty"
                            );
                            run.warn(format!(
                                "reference list {} is empty after trimming ({} entries dropped)",
                                list.display(),
                                rewrite.dropped.len()
                            ));
                        }
                        Ok(rewrite) if !rewrite.dropped.is_empty() => warn!(
                            dropped = rewrite.dropped.len(),
                            list = %list.display(),
                            "Reference list entries without trimmed images were dropped"
                        ),
                        Ok(_) => {}
                        Err(e) => warn!(list = %list.display(), error = %e, "Cannot rewrite reference list"),
                    }
                }
                Some(set)
            }
            Err(e) => {
                warn!(error = %e, "Registration failed");
                run.fail(PipelineState::Registering, &e);
                run.note_log(logger.error(
                    e.kind(),
                    &params.loc_data,
                    &params.loc_output,
                    started.elapsed(),
                ));
                if params.fail_fast {
                    run.enter(PipelineState::Errored);
                    return Ok(run.finish(started, None));
                }
                None
            }
        };

        // Subtraction
        run.enter(PipelineState::Subtracting);
        let request = engine_request(params, &selection, trimmed.is_some());
        run.subtraction_input = Some(request.loc_data.clone());
        self.reporter.begin_stage(PipelineStage::Subtracting, None);
        info!(engine = self.engine.name(), variant = %self.engine.variant(), "Running subtraction");
        let outcome = fs::create_dir_all(&params.loc_output)
            .map_err(DiaError::from)
            .and_then(|_| self.engine.subtract(&request));
        self.reporter.finish_stage();
        if let Err(e) = outcome {
            warn!(error = %e, "Subtraction failed");
            run.fail(PipelineState::Subtracting, &e);
            run.note_log(logger.error(
                e.kind(),
                &request.loc_data,
                &params.loc_output,
                started.elapsed(),
            ));
            run.enter(PipelineState::Errored);
            return Ok(run.finish(started, trimmed));
        }
        match list_matching(&params.loc_output, &format!("{DIFF_IMAGE_PREFIX}*")) {
            Ok(diffs) => {
                if diffs.is_empty() {
                    warn!(
                        engine = self.engine.name(),
                        dir = %params.loc_output.display(),
                        "Engine exited successfully but wrote no difference images"
                    );
                    run.warn(format!(
                        "engine '{}' wrote no difference images to {}",
                        self.engine.name(),
                        params.loc_output.display()
                    ));
                }
                run.diff_images = Some(diffs.len());
            }
            Err(e) => warn!(error = %e, "Cannot list difference images"),
        }

        // WCS propagation
        run.enter(PipelineState::WcsPropagating);
        self.reporter.begin_stage(PipelineStage::PropagatingWcs, None);
        let candidates = wcs_candidates(params, &selection, trimmed.as_ref());
        let source = resolve_wcs_source(&candidates);
        match propagate_wcs(source.as_deref(), &params.loc_output) {
            Ok(report) => {
                for (path, reason) in &report.failures {
                    warn!(image = %path.display(), %reason, "WCS not copied");
                }
                run.propagation = Some(report);
            }
            Err(e) => warn!(error = %e, "WCS propagation skipped"),
        }
        self.reporter.finish_stage();

        run.note_log(logger.success(&request.loc_data, &params.loc_output, started.elapsed()));
        let terminal = if run.errors.is_empty() {
            PipelineState::Done
        } else {
            PipelineState::Errored
        };
        run.enter(terminal);
        Ok(run.finish(started, trimmed))
    }
}

/// Run the full pipeline with the external engine and no progress reporting.
pub fn run_pipeline(params: &RunParameters) -> Result<RunReport> {
    Pipeline::new(params.clone()).run()
}

/// Mutable bookkeeping for one run; becomes the [`RunReport`].
struct RunProgress {
    state: PipelineState,
    history: Vec<PipelineState>,
    errors: Vec<PhaseError>,
    wcs_reference: PathBuf,
    subtraction_input: Option<PathBuf>,
    propagation: Option<crate::wcs::PropagationReport>,
    diff_images: Option<usize>,
    warnings: Vec<String>,
    log_failures: Vec<String>,
}

impl RunProgress {
    fn new(wcs_reference: PathBuf) -> Self {
        Self {
            state: PipelineState::Init,
            history: vec![PipelineState::Init],
            errors: Vec::new(),
            wcs_reference,
            subtraction_input: None,
            propagation: None,
            diff_images: None,
            warnings: Vec::new(),
            log_failures: Vec::new(),
        }
    }

    fn enter(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {next}",
            self.state
        );
        info!(from = %self.state, to = %next, "Pipeline state");
        self.state = next;
        self.history.push(next);
    }

    fn fail(&mut self, state: PipelineState, err: &DiaError) {
        self.errors.push(PhaseError::new(state, err));
    }

    fn warn(&mut self, message: String) {
        self.warnings.push(message);
    }

    fn note_log(&mut self, result: Result<()>) {
        if let Err(e) = result {
            warn!(error = %e, "Run log not updated");
            self.log_failures.push(e.to_string());
        }
    }

    fn finish(self, started: Instant, trimmed: Option<TrimmedImageSet>) -> RunReport {
        RunReport {
            state: self.state,
            history: self.history,
            errors: self.errors,
            wcs_reference: self.wcs_reference,
            trimmed,
            subtraction_input: self.subtraction_input,
            propagation: self.propagation,
            diff_images: self.diff_images,
            warnings: self.warnings,
            log_failures: self.log_failures,
            elapsed: started.elapsed(),
        }
    }
}

/// Glob matching exactly the names `trimmed_path` gives the selected inputs.
fn trimmed_pattern(pattern: &str) -> String {
    if pattern.ends_with(TRIM_SUFFIX) {
        return pattern.to_string();
    }
    trimmed_name(pattern)
}

fn engine_request(
    params: &RunParameters,
    selection: &ReferenceSelection,
    registered: bool,
) -> EngineRequest {
    let (loc_data, name_pattern) = if registered {
        (params.loc_trim.clone(), trimmed_pattern(&params.name_pattern))
    } else {
        (params.loc_data.clone(), params.name_pattern.clone())
    };
    EngineRequest {
        loc_data,
        loc_output: params.loc_output.clone(),
        name_pattern,
        ref_image_list: selection.ref_image_list.clone(),
        min_ref_images: params.min_ref_images,
        params: params.engine.clone(),
    }
}

fn wcs_candidates(
    params: &RunParameters,
    selection: &ReferenceSelection,
    trimmed: Option<&TrimmedImageSet>,
) -> WcsSourceCandidates {
    let prefer_trimmed = |image: &Path| -> PathBuf {
        let candidate = trimmed_path(image, &params.loc_trim);
        if trimmed.is_some() && candidate.is_file() {
            candidate
        } else {
            image.to_path_buf()
        }
    };
    WcsSourceCandidates {
        reference_image: selection
            .photometric
            .as_ref()
            .map(|set| prefer_trimmed(&set.primary)),
        reference_list: selection.ref_image_list.clone(),
        fallback: Some(match trimmed.and_then(TrimmedImageSet::reference) {
            Some(reference) => reference.to_path_buf(),
            None => selection.wcs_reference.clone(),
        }),
    }
}
