mod common;

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;

use common::{FailingEngine, MockEngine};
use diaprep_core::engine::{DiffEngine, EngineRequest, EngineVariant};
use diaprep_core::error::DiaError;
use diaprep_core::io::read_fits;
use diaprep_core::pipeline::{Pipeline, PipelineState, RunParameters};
use diaprep_core::select::read_reference_list;
use diaprep_core::wcs::Wcs;

fn params_for(dir: &TempDir) -> RunParameters {
    RunParameters {
        loc_data: dir.path().join("DIA_IN"),
        loc_output: dir.path().join("DIA_OUT"),
        loc_trim: dir.path().join("DIA_TRIM"),
        ..Default::default()
    }
}

fn minutes(line: &str) -> f64 {
    let parts: Vec<&str> = line.split_whitespace().collect();
    assert_eq!(parts.last(), Some(&"min"));
    parts[parts.len() - 2].parse().unwrap()
}

#[test]
fn test_end_to_end_with_marker_reference() {
    let dir = TempDir::new().unwrap();
    let params = params_for(&dir);
    common::write_field(&params.loc_data, &["obs_001.fits", "SDSS_field.fits", "obs_002.fits"]);

    let engine = Arc::new(MockEngine::default());
    let report = Pipeline::new(params.clone())
        .with_engine(engine.clone())
        .run()
        .unwrap();

    assert_eq!(report.state, PipelineState::Done);
    assert!(report.is_success());
    assert!(report.errors.is_empty());
    assert_eq!(
        report.history,
        [
            PipelineState::Init,
            PipelineState::Registering,
            PipelineState::Trimmed,
            PipelineState::Subtracting,
            PipelineState::WcsPropagating,
            PipelineState::Done,
        ]
    );
    assert_eq!(report.wcs_reference, params.loc_data.join("SDSS_field.fits"));

    // The reference is also an input; it is trimmed once.
    let trimmed = report.trimmed.as_ref().unwrap();
    assert_eq!(trimmed.len(), 3);
    assert_eq!(
        trimmed.reference(),
        Some(params.loc_trim.join("SDSS_field_trim.fits").as_path())
    );
    for path in trimmed.iter() {
        let image = read_fits(path).unwrap();
        assert_eq!((image.width(), image.height()), (60, 60));
    }

    let request = engine.last_request().unwrap();
    assert_eq!(request.loc_data, params.loc_trim);
    assert_eq!(request.name_pattern, "*_trim.fits");
    assert_eq!(report.subtraction_input.as_ref(), Some(&params.loc_trim));

    // Every difference image carries the trimmed reference WCS.
    let reference_wcs =
        Wcs::from_header(&read_fits(trimmed.reference().unwrap()).unwrap().header).unwrap();
    let propagation = report.propagation.as_ref().unwrap();
    assert_eq!(propagation.updated.len(), 3);
    for diff in &propagation.updated {
        let header = read_fits(diff).unwrap().header;
        common::assert_wcs_close(&Wcs::from_header(&header).unwrap(), &reference_wcs);
    }

    let lines = common::read_log(&params.run_log_path());
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains(" processing "));
    assert!(lines[1].contains(" Success!  Processed "));
    assert!(minutes(&lines[1]) >= 0.0);
    assert!(report.log_failures.is_empty());
}

#[test]
fn test_process_twice_gives_four_trimmed_entries() {
    let dir = TempDir::new().unwrap();
    let params = RunParameters {
        duplicate_reference: diaprep_core::trim::DuplicateReference::ProcessTwice,
        ..params_for(&dir)
    };
    common::write_field(&params.loc_data, &["a.fits", "b_sdss.fits", "c.fits"]);

    let report = Pipeline::new(params.clone())
        .with_engine(Arc::new(MockEngine::default()))
        .run()
        .unwrap();
    let trimmed = report.trimmed.unwrap();
    assert_eq!(trimmed.len(), 4);
    assert_eq!(fs::read_dir(&params.loc_trim).unwrap().count(), 3);
}

#[test]
fn test_empty_input_creates_nothing() {
    let dir = TempDir::new().unwrap();
    let params = params_for(&dir);
    fs::create_dir_all(&params.loc_data).unwrap();

    let engine = Arc::new(MockEngine::default());
    let err = Pipeline::new(params.clone())
        .with_engine(engine.clone())
        .run()
        .unwrap_err();
    assert!(matches!(err, DiaError::NoInputImages { .. }));
    assert!(!params.loc_trim.exists());
    assert!(!params.loc_output.exists());
    assert_eq!(engine.calls(), 0);
}

#[test]
fn test_invalid_configuration_is_rejected_up_front() {
    let dir = TempDir::new().unwrap();
    let params = RunParameters {
        trimfrac: 1.0,
        ..params_for(&dir)
    };
    common::write_field(&params.loc_data, &["a.fits"]);

    let err = Pipeline::new(params.clone())
        .with_engine(Arc::new(MockEngine::default()))
        .run()
        .unwrap_err();
    assert!(matches!(err, DiaError::Configuration(_)));
    assert!(!params.loc_trim.exists());
    assert!(!params.loc_output.exists());
}

#[test]
fn test_engine_failure_ends_errored_without_propagation() {
    let dir = TempDir::new().unwrap();
    let params = params_for(&dir);
    common::write_field(&params.loc_data, &["a.fits", "b.fits"]);

    let engine = Arc::new(FailingEngine::default());
    let report = Pipeline::new(params.clone())
        .with_engine(engine.clone())
        .run()
        .unwrap();

    assert_eq!(report.state, PipelineState::Errored);
    assert_eq!(report.history.last(), Some(&PipelineState::Errored));
    assert!(!report.history.contains(&PipelineState::WcsPropagating));
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, "EngineError");
    assert_eq!(report.errors[0].state, PipelineState::Subtracting);
    assert!(report.propagation.is_none());
    assert_eq!(*engine.calls.lock().unwrap(), 1);

    let partial = read_fits(&params.loc_output.join("d_partial.fits")).unwrap();
    assert!(!partial.header.contains("CD1_1"));

    let lines = common::read_log(&params.run_log_path());
    assert_eq!(lines.len(), 2);
    assert!(lines[1].contains(" error EngineError "));
    assert!(minutes(&lines[1]) >= 0.0);
}

fn write_field_with_broken_image(params: &RunParameters) {
    common::write_field(&params.loc_data, &["a.fits", "ref_sdss.fits"]);
    fs::write(params.loc_data.join("broken.fits"), b"not a FITS file").unwrap();
}

#[test]
fn test_registration_failure_falls_back_to_untrimmed_inputs() {
    let dir = TempDir::new().unwrap();
    let params = params_for(&dir);
    write_field_with_broken_image(&params);

    let engine = Arc::new(MockEngine::default());
    let report = Pipeline::new(params.clone())
        .with_engine(engine.clone())
        .run()
        .unwrap();

    assert_eq!(engine.calls(), 1);
    let request = engine.last_request().unwrap();
    assert_eq!(request.loc_data, params.loc_data);
    assert_eq!(request.name_pattern, "*.fits");

    assert_eq!(report.state, PipelineState::Errored);
    assert!(report.trimmed.is_none());
    assert!(report.history.contains(&PipelineState::WcsPropagating));
    assert!(!report.history.contains(&PipelineState::Trimmed));
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, "RegistrationError");

    let lines = common::read_log(&params.run_log_path());
    assert_eq!(lines.len(), 3);
    assert!(lines[1].contains(" error RegistrationError "));
    assert!(lines[2].contains(" Success!  Processed "));
}

#[test]
fn test_fail_fast_stops_after_registration_failure() {
    let dir = TempDir::new().unwrap();
    let params = RunParameters {
        fail_fast: true,
        ..params_for(&dir)
    };
    write_field_with_broken_image(&params);

    let engine = Arc::new(MockEngine::default());
    let report = Pipeline::new(params.clone())
        .with_engine(engine.clone())
        .run()
        .unwrap();

    assert_eq!(engine.calls(), 0);
    assert_eq!(report.state, PipelineState::Errored);
    assert_eq!(
        report.history,
        [PipelineState::Init, PipelineState::Registering, PipelineState::Errored]
    );
    assert!(report.subtraction_input.is_none());
}

#[test]
fn test_reference_directory_drives_list_and_wcs_source() {
    let dir = TempDir::new().unwrap();
    let params = params_for(&dir);
    // The REF images are also regular inputs, so they get trimmed counterparts.
    common::write_field(&params.loc_data, &["a.fits", "deep.fits", "z.fits"]);
    fs::create_dir_all(params.loc_data.join("REF")).unwrap();
    fs::copy(params.loc_data.join("deep.fits"), params.loc_data.join("REF/deep.fits")).unwrap();

    let engine = Arc::new(MockEngine::default());
    let report = Pipeline::new(params.clone())
        .with_engine(engine.clone())
        .run()
        .unwrap();
    assert_eq!(report.state, PipelineState::Done);

    let list = params.loc_output.join("ref_image_list.txt");
    assert_eq!(
        read_reference_list(&list).unwrap(),
        vec![params.loc_trim.join("deep_trim.fits")]
    );
    assert_eq!(engine.last_request().unwrap().ref_image_list, Some(list));

    let propagation = report.propagation.unwrap();
    assert_eq!(
        propagation.source,
        Some(params.loc_trim.join("deep_trim.fits"))
    );
}

#[test]
fn test_uppercase_extension_reaches_the_engine() {
    let dir = TempDir::new().unwrap();
    let params = RunParameters {
        name_pattern: "*.FITS".into(),
        ..params_for(&dir)
    };
    common::write_field(&params.loc_data, &["a.FITS", "b.FITS", "c_sdss.FITS"]);

    let engine = Arc::new(MockEngine::default());
    let report = Pipeline::new(params.clone())
        .with_engine(engine.clone())
        .run()
        .unwrap();

    assert_eq!(report.state, PipelineState::Done);
    assert!(params.loc_trim.join("a_trim.fits").is_file());
    assert!(params.loc_trim.join("c_sdss_trim.fits").is_file());
    assert_eq!(engine.last_request().unwrap().name_pattern, "*_trim.fits");
    assert_eq!(report.diff_images, Some(3));
    assert_eq!(report.propagation.unwrap().updated.len(), 3);
    assert!(report.warnings.is_empty());
}

/// Engine that exits cleanly without writing anything.
struct SilentEngine;

impl DiffEngine for SilentEngine {
    fn name(&self) -> &str {
        "silent"
    }

    fn variant(&self) -> EngineVariant {
        EngineVariant::Cpu
    }

    fn subtract(&self, _request: &EngineRequest) -> diaprep_core::error::Result<()> {
        Ok(())
    }
}

#[test]
fn test_engine_without_output_is_reported() {
    let dir = TempDir::new().unwrap();
    let params = params_for(&dir);
    common::write_field(&params.loc_data, &["a.fits", "b_sdss.fits"]);

    let report = Pipeline::new(params)
        .with_engine(Arc::new(SilentEngine))
        .run()
        .unwrap();

    assert_eq!(report.state, PipelineState::Done);
    assert_eq!(report.diff_images, Some(0));
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("no difference images"));
}

#[test]
fn test_reference_images_outside_inputs_leave_empty_list() {
    let dir = TempDir::new().unwrap();
    let params = params_for(&dir);
    common::write_field(&params.loc_data, &["a.fits", "b_sdss.fits"]);
    common::write_field(&params.loc_data.join("REF"), &["deep.fits"]);

    let report = Pipeline::new(params.clone())
        .with_engine(Arc::new(MockEngine::default()))
        .run()
        .unwrap();

    assert_eq!(report.state, PipelineState::Done);
    let list = params.loc_output.join("ref_image_list.txt");
    assert!(read_reference_list(&list).unwrap().is_empty());
    assert!(report
        .warnings
        .iter()
        .any(|w| w.contains("reference list") && w.contains("empty")));
}
