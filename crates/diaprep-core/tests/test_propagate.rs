mod common;

use std::fs;

use tempfile::TempDir;

use diaprep_core::io::{read_fits, write_fits, FitsHeader};
use diaprep_core::select::write_reference_list;
use diaprep_core::wcs::{propagate_wcs, resolve_wcs_source, Wcs, WcsSourceCandidates};

#[test]
fn test_source_priority() {
    let dir = TempDir::new().unwrap();
    let images = common::write_field(dir.path(), &["ref.fits", "listed.fits", "fallback.fits"]);
    let list = dir.path().join("list.txt");
    write_reference_list(&list, &[dir.path().join("absent.fits"), images[1].clone()]).unwrap();

    let all = WcsSourceCandidates {
        reference_image: Some(images[0].clone()),
        reference_list: Some(list.clone()),
        fallback: Some(images[2].clone()),
    };
    assert_eq!(resolve_wcs_source(&all), Some(images[0].clone()));

    // Only the first list entry is considered; it does not exist here.
    let no_image = WcsSourceCandidates {
        reference_image: Some(dir.path().join("missing.fits")),
        ..all.clone()
    };
    assert_eq!(resolve_wcs_source(&no_image), Some(images[2].clone()));

    write_reference_list(&list, &[images[1].clone()]).unwrap();
    assert_eq!(resolve_wcs_source(&no_image), Some(images[1].clone()));

    assert_eq!(resolve_wcs_source(&WcsSourceCandidates::default()), None);
}

#[test]
fn test_all_difference_images_get_the_same_wcs() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("ref_trim.fits");
    let source_wcs = common::centered_wcs(60, 60, 201.5, -43.0, 12.0);
    common::write_image(&source, &common::star_field(60, 60, &[(30.0, 30.0)]), &source_wcs);

    let out = dir.path().join("out");
    fs::create_dir_all(&out).unwrap();
    let mut diff_data = Vec::new();
    for name in ["d_c.fits", "d_a.fits", "d_b.fits"] {
        let data = common::star_field(60, 60, &[(10.0, 20.0)]);
        // A stale PC/CDELT description must not survive next to the new CD matrix.
        let stale = Wcs::from_scale_rotation((1.0, 1.0), (0.0, 0.0), 1e-3, 0.0);
        let mut header = FitsHeader::new();
        stale.apply_to(&mut header);
        header.set("CDELT1", diaprep_core::io::CardValue::Float(1e-3));
        write_fits(&out.join(name), &header, &data).unwrap();
        diff_data.push(data);
    }
    let untouched = out.join("other.fits");
    write_fits(&untouched, &FitsHeader::new(), &ndarray::Array2::zeros((2, 2))).unwrap();
    let untouched_bytes = fs::read(&untouched).unwrap();

    let report = propagate_wcs(Some(&source), &out).unwrap();
    assert_eq!(report.source.as_deref(), Some(source.as_path()));
    assert_eq!(report.updated.len(), 3);
    assert!(report.failures.is_empty());

    for name in ["d_a.fits", "d_b.fits", "d_c.fits"] {
        let image = read_fits(&out.join(name)).unwrap();
        common::assert_wcs_close(&Wcs::from_header(&image.header).unwrap(), &source_wcs);
        assert!(!image.header.contains("CDELT1"));
    }
    assert_eq!(fs::read(&untouched).unwrap(), untouched_bytes);
}

#[test]
fn test_no_source_leaves_images_alone() {
    let dir = TempDir::new().unwrap();
    let diff = dir.path().join("d_x.fits");
    write_fits(&diff, &FitsHeader::new(), &ndarray::Array2::zeros((4, 4))).unwrap();
    let before = fs::read(&diff).unwrap();

    let report = propagate_wcs(None, dir.path()).unwrap();
    assert!(report.source.is_none());
    assert!(report.updated.is_empty());
    assert_eq!(fs::read(&diff).unwrap(), before);
}

#[test]
fn test_bad_difference_image_is_reported_not_fatal() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("ref.fits");
    let wcs = common::centered_wcs(20, 20, 10.0, 10.0, 0.0);
    common::write_image(&source, &common::star_field(20, 20, &[]), &wcs);

    let out = dir.path().join("out");
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("d_broken.fits"), b"garbage").unwrap();
    write_fits(&out.join("d_good.fits"), &FitsHeader::new(), &ndarray::Array2::zeros((4, 4)))
        .unwrap();

    let report = propagate_wcs(Some(&source), &out).unwrap();
    assert_eq!(report.updated, vec![out.join("d_good.fits")]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, out.join("d_broken.fits"));
}

#[test]
fn test_source_without_wcs_is_an_error() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("plain.fits");
    write_fits(&source, &FitsHeader::new(), &ndarray::Array2::zeros((4, 4))).unwrap();
    assert!(propagate_wcs(Some(&source), dir.path()).is_err());
}
