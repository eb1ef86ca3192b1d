use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use approx::assert_relative_eq;
use ndarray::Array2;
use nps_core::detrend::remove_polynomial;
use nps_core::{
    analyze_peak, average_roi_profiles, compute_nps, estimate_remaining, radial_profile,
    resample_onto_grid, series_label, sort_roi_map, study_label, truncate, DecodedImage,
    DetrendMode, FitOrder, FrequencyGrid, ImageSource, MatchMode, NpsConfig, NpsError,
    NpsResult, Pipeline, Profile, Roi, RoiMap, StudyTree,
};

/// 100 + 10 * sin(2 pi c / period) along the columns.
fn stripes(rows: usize, cols: usize, period: f64) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(_, c)| {
        100.0 + 10.0 * (2.0 * std::f64::consts::PI * c as f64 / period).sin()
    })
}

#[test]
fn test_frequency_grid_properties() {
    for &(start, end, step) in &[(0.0, 20.0, 0.01), (0.5, 3.2, 0.25), (1.0, 1.05, 0.1)] {
        let grid = FrequencyGrid::new(start, end, step).unwrap();
        assert_eq!(grid.len(), ((end - start) / step).floor() as usize + 1);
        assert_eq!(grid.as_slice()[0], start);
        let last = *grid.as_slice().last().unwrap();
        assert!(last <= end);
        assert!(end - last < step);
    }
    assert!(FrequencyGrid::new(2.0, 1.0, 0.1).is_err());
    assert!(FrequencyGrid::new(0.0, 1.0, 0.0).is_err());
}

#[test]
fn test_radial_profile_of_constant_is_constant() {
    for &(rows, cols) in &[(8, 8), (9, 9), (6, 10)] {
        let data = Array2::from_elem((rows, cols), 3.5);
        let profile = radial_profile(&data);
        assert_eq!(profile.len(), rows.max(cols) / 2 + 2);
        for v in profile {
            assert_relative_eq!(v, 3.5, epsilon = 1e-12);
        }
    }
}

#[test]
fn test_compute_nps_is_deterministic() {
    let roi = stripes(32, 24, 6.0);
    let a = compute_nps(&roi, (0.5, 0.5), DetrendMode::Polynomial(FitOrder::Quadratic));
    let b = compute_nps(&roi, (0.5, 0.5), DetrendMode::Polynomial(FitOrder::Quadratic));
    assert_eq!(a, b);
    assert_eq!(a.values.len(), a.frequencies.len());
    assert_eq!(a.values.len(), 32 / 2 + 2);
}

#[test]
fn test_parsevals_theorem_nps() {
    let roi = stripes(64, 64, 8.0);
    let nps = compute_nps(&roi, (1.0, 1.0), DetrendMode::Flat);

    // Sum(P) = Sum(|X|^2) / N^2 = Mean(x^2) of the detrended signal.
    let mean = roi.mean().unwrap();
    let mean_sqr = roi.mapv(|x| (x - mean).powi(2)).mean().unwrap();
    assert_relative_eq!(nps.integral_2d, mean_sqr, epsilon = 1e-9);
    assert_relative_eq!(nps.integral_2d, 50.0, epsilon = 1e-9);
}

#[test]
fn test_constant_roi_has_zero_spectrum() {
    let roi = Array2::from_elem((8, 8), 100.0);
    let nps = compute_nps(&roi, (0.781, 0.781), DetrendMode::Flat);
    assert!(nps.values.iter().all(|&v| v == 0.0));
    assert_eq!(nps.auc, 0.0);
    assert_eq!(nps.integral_2d, 0.0);
}

#[test]
fn test_sinusoid_peaks_at_its_frequency() {
    // Period 8 px at 1 mm/px is 0.125 cycles/mm = 1.25 lp/cm.
    let roi = stripes(64, 64, 8.0);
    let nps = compute_nps(&roi, (1.0, 1.0), DetrendMode::Flat);

    let max_index = nps
        .values
        .iter()
        .enumerate()
        .fold(0, |best, (i, &v)| if v > nps.values[best] { i } else { best });
    assert_relative_eq!(nps.frequencies[max_index], 1.25, epsilon = 1e-12);

    let grid = FrequencyGrid::new(0.0, 20.0, 0.01).unwrap();
    let resampled = resample_onto_grid(&Profile::from(&nps), &grid);
    // Native frequencies end at 32 / 6.4 = 5 lp/cm.
    assert_eq!(resampled.len(), 501);

    let peak = analyze_peak(&resampled);
    assert!((peak.peak_frequency - 1.25).abs() <= grid.step());
    assert!(peak.right_deviation.is_some());
}

#[test]
fn test_polynomial_detrend_removes_surface() {
    let (rows, cols) = (6, 10);
    let mut data = Array2::from_shape_fn((rows, cols), |(r, c)| {
        let x = 2.0 * c as f64 / (cols - 1) as f64 - 1.0;
        let y = 2.0 * r as f64 / (rows - 1) as f64 - 1.0;
        5.0 + 2.0 * x + 3.0 * y - 1.5 * x * x + 0.5 * x * y
    });
    remove_polynomial(&mut data, FitOrder::Quadratic).unwrap();
    let max_residual = data.mapv(|x| x.abs()).fold(0.0f64, |a, b| a.max(*b));
    assert_relative_eq!(max_residual, 0.0, epsilon = 1e-9);
}

#[test]
fn test_truncation_is_prefix() {
    let roi = Array2::from_shape_fn((32, 32), |(r, c)| ((r * 7 + c * 13) % 11) as f64);
    let nps = compute_nps(&roi, (0.5, 0.5), DetrendMode::Flat);
    // The zero-frequency samples vanish after detrending and would end the
    // scan immediately.
    let native = Profile::new(nps.values[2..].to_vec(), nps.frequencies[2..].to_vec());
    let truncated = truncate(&native, 1.0);
    assert!(truncated.len() <= native.len());
    assert_eq!(truncated.frequencies[..], native.frequencies[..truncated.len()]);

    let max = native.values.iter().cloned().fold(f64::MIN, f64::max);
    assert!(truncated.values.iter().all(|&v| v > 0.01 * max));
}

#[test]
fn test_peak_at_first_sample() {
    let profile = Profile::new(vec![5.0, 4.0, 2.0, 1.0], vec![0.0, 0.1, 0.2, 0.3]);
    let peak = analyze_peak(&profile);
    assert_eq!(peak.peak_value, 5.0);
    assert_eq!(peak.left_deviation, None);
    assert_relative_eq!(peak.right_deviation.unwrap(), 0.2, epsilon = 1e-12);
}

#[test]
fn test_zero_padding_average() {
    let a = Profile::new(vec![1.0, 2.0], vec![0.0, 1.0]);
    let b = Profile::new(vec![3.0, 4.0, 5.0], vec![0.0, 1.0, 2.0]);
    let avg = average_roi_profiles(&[a, b]).unwrap();
    assert_eq!(avg.values, vec![2.0, 3.0, 2.5]);
    assert_eq!(avg.frequencies, vec![0.0, 1.0, 2.0]);
}

#[test]
fn test_sort_roi_map_places_rois_under_study_and_series() {
    let mut tree = StudyTree::new();
    tree.insert("/a", "b_1", "/a/b_1/img1.dcm");
    tree.sort();

    let roi = Roi::new(0, 0, 16, 16).unwrap();
    let mut rois = RoiMap::new();
    rois.insert("/a/b_1/img1.dcm".to_string(), vec![roi]);

    let sorted = sort_roi_map(&tree, &rois, MatchMode::Substring);
    assert_eq!(sorted.studies.len(), 1);
    assert_eq!(sorted.studies[0].path, PathBuf::from("/a"));
    assert_eq!(sorted.studies[0].series[0].name, "b_1");
    let image = &sorted.studies[0].series[0].images[0];
    assert_eq!(image.key, "/a/b_1/img1.dcm");
    assert_eq!(image.rois, vec![roi]);
}

#[test]
fn test_discovery_groups_by_parent_folders() {
    let dir = tempfile::tempdir().unwrap();
    for (study, series, file) in [
        ("Study - 2", "3_x_10", "im_10.DCM"),
        ("Study - 2", "3_x_10", "im_2.dcm"),
        ("Study - 2", "3_x_9", "im_1.dcm"),
        ("Study - 2", "3_x_9", "notes.txt"),
    ] {
        let folder = dir.path().join(study).join(series);
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(folder.join(file), b"").unwrap();
    }

    let tree = StudyTree::discover(dir.path(), &NpsConfig::default().extensions).unwrap();
    let study = &tree.studies()[0];
    assert_eq!(study.path, dir.path().join("Study - 2"));
    let names: Vec<&str> = study.series.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["3_x_9", "3_x_10"]);
    let files: Vec<String> = study.series[1]
        .files
        .iter()
        .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(files, vec!["im_2.dcm", "im_10.DCM"]);
    assert_eq!(study.series[0].files.len(), 1);

    assert_eq!(study_label(&study.path, false), "Study");
    assert_eq!(series_label(&study.series[1].name, false), "10");
}

#[test]
fn test_remaining_time_estimate() {
    let t = Duration::from_secs(10);
    assert_eq!(estimate_remaining(t, 2, 3, 1), Duration::from_secs(40));
    assert_eq!(estimate_remaining(t, 1, 3, 0), Duration::ZERO);
}

struct MemorySource(HashMap<PathBuf, DecodedImage>);

impl ImageSource for MemorySource {
    fn load(&self, path: &Path) -> NpsResult<DecodedImage> {
        self.0.get(path).cloned().ok_or_else(|| NpsError::Decode {
            path: path.to_path_buf(),
            reason: "not in memory".to_string(),
        })
    }
}

fn striped_image(spacing: Option<(f64, f64)>) -> DecodedImage {
    DecodedImage {
        pixels: stripes(80, 80, 8.0).mapv(|v| v.round() as i16),
        pixel_spacing: spacing,
    }
}

fn single_series_tree(files: &[&str]) -> StudyTree {
    let mut tree = StudyTree::new();
    for f in files {
        tree.insert("/data/Phantom - 1", "S1_soft", format!("/data/Phantom - 1/S1_soft/{}", f));
    }
    tree.sort();
    tree
}

fn grid_rois(tree: &StudyTree) -> RoiMap {
    let rois = vec![Roi::new(0, 0, 64, 64).unwrap(), Roi::new(8, 8, 72, 72).unwrap()];
    nps_core::broadcast_rois(&tree.files().collect::<Vec<_>>(), &rois)
}

#[test]
fn test_pipeline_end_to_end() {
    let tree = single_series_tree(&["img_1.dcm", "img_2.dcm", "img_3.dcm"]);
    let rois = grid_rois(&tree);
    let sorted = sort_roi_map(&tree, &rois, MatchMode::Exact);

    let mut images = HashMap::new();
    images.insert(
        PathBuf::from("/data/Phantom - 1/S1_soft/img_1.dcm"),
        striped_image(Some((1.0, 1.0))),
    );
    images.insert(
        PathBuf::from("/data/Phantom - 1/S1_soft/img_2.dcm"),
        striped_image(Some((1.0, 1.0))),
    );

    let pipeline = Pipeline::new(NpsConfig::default()).unwrap();
    let report = pipeline.run(&sorted, &MemorySource(images), None);

    assert!(!report.cancelled);
    assert_eq!(report.skipped_images.len(), 1);
    assert!(report.failed_series.is_empty());
    assert_eq!(report.summary.len(), 1);

    let row = &report.summary[0];
    assert_eq!(row.number, 1);
    assert_eq!(row.folder, "Phantom");
    assert_eq!(row.series, "soft");
    assert!((row.peak_frequency - 1.25).abs() <= 0.01);
    assert_relative_eq!(row.mean_pixel, 100.0, epsilon = 1e-9);

    let series = &report.studies[0].series[0];
    assert_eq!(series.images.len(), 2);
    assert_eq!(series.images[0].rois.len(), 2);
}

#[test]
fn test_pipeline_keeps_colliding_labels_apart() {
    let files = [
        ("/data/Phantom - 1", "1_soft"),
        ("/data/Phantom - 1", "2_soft"),
        ("/data/Phantom - 2", "1_soft"),
    ];
    let mut tree = StudyTree::new();
    let mut images = HashMap::new();
    for (study, series) in files {
        let path = format!("{}/{}/img_1.dcm", study, series);
        tree.insert(study, series, path.clone());
        images.insert(PathBuf::from(path), striped_image(Some((1.0, 1.0))));
    }
    tree.sort();
    let sorted = sort_roi_map(&tree, &grid_rois(&tree), MatchMode::Exact);

    let pipeline = Pipeline::new(NpsConfig::default()).unwrap();
    let report = pipeline.run(&sorted, &MemorySource(images), None);

    let names: Vec<(&str, &str)> = report
        .summary
        .iter()
        .map(|r| (r.folder.as_str(), r.series.as_str()))
        .collect();
    assert_eq!(
        names,
        vec![("Phantom", "soft"), ("Phantom", "2_soft"), ("Phantom - 2", "soft")]
    );
    assert_eq!(report.studies[1].label, "Phantom - 2");
    assert_eq!(report.studies[0].series[1].label, "2_soft");
}

#[test]
fn test_pipeline_reports_length_mismatch_and_default_spacing() {
    let tree = single_series_tree(&["img_1.dcm", "img_2.dcm"]);
    let rois = grid_rois(&tree);
    let sorted = sort_roi_map(&tree, &rois, MatchMode::Substring);

    let mut images = HashMap::new();
    images.insert(
        PathBuf::from("/data/Phantom - 1/S1_soft/img_1.dcm"),
        striped_image(Some((1.0, 1.0))),
    );
    // Falls back to 0.781 mm, which extends the native frequency range.
    images.insert(
        PathBuf::from("/data/Phantom - 1/S1_soft/img_2.dcm"),
        striped_image(None),
    );

    let pipeline = Pipeline::new(NpsConfig::default()).unwrap();
    let report = pipeline.run(&sorted, &MemorySource(images), None);

    assert!(report.summary.is_empty());
    assert_eq!(report.failed_series.len(), 1);
    assert!(report.failed_series[0].reason.contains("differ in length"));
}

#[test]
fn test_pipeline_honours_cancellation() {
    let tree = single_series_tree(&["img_1.dcm"]);
    let sorted = sort_roi_map(&tree, &grid_rois(&tree), MatchMode::Substring);
    let cancel = AtomicBool::new(true);

    let pipeline = Pipeline::new(NpsConfig::default()).unwrap();
    let report = pipeline.run(&sorted, &MemorySource(HashMap::new()), Some(&cancel));
    assert!(report.cancelled);
    assert!(report.summary.is_empty());
}

#[test]
fn test_invalid_configuration_is_rejected() {
    let config = NpsConfig {
        step: -1.0,
        ..NpsConfig::default()
    };
    assert!(Pipeline::new(config).is_err());
}
