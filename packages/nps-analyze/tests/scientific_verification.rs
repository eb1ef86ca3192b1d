use approx::assert_relative_eq;
use assert_cmd::Command;
use image::{GrayImage, Luma};
use std::path::{Path, PathBuf};

/// Vertical stripes with a period of `2 * half_period` px around a mean of 100.
fn create_stripes(path: &Path, half_period: u32) {
    let img = GrayImage::from_fn(64, 64, |x, _| {
        if (x / half_period) % 2 == 0 {
            Luma([110])
        } else {
            Luma([90])
        }
    });
    img.save(path).unwrap();
}

/// `<root>/Phantom - 1/1_soft/img_{1,2}.png`
fn create_study(root: &Path) -> PathBuf {
    let series_dir = root.join("Phantom - 1").join("1_soft");
    std::fs::create_dir_all(&series_dir).unwrap();
    create_stripes(&series_dir.join("img_1.png"), 4);
    create_stripes(&series_dir.join("img_2.png"), 4);
    series_dir
}

fn summary_records(output: &Path) -> Vec<csv::StringRecord> {
    let mut rdr = csv::Reader::from_path(output.join("Summary_information.csv")).unwrap();
    let header = rdr.headers().unwrap().clone();
    assert_eq!(
        header.iter().collect::<Vec<_>>(),
        vec![
            "Number",
            "Folder",
            "Series",
            "peak_freq",
            "peak_value",
            "left_dev",
            "right_dev",
            "area",
            "Integral",
            "ave_m_HU",
            "ave_SD"
        ]
    );
    rdr.records().map(|r| r.unwrap()).collect()
}

#[test]
fn test_grid_rois_over_stripe_series() {
    let temp_dir = tempfile::tempdir().unwrap();
    let input_dir = temp_dir.path().join("input");
    let output_dir = temp_dir.path().join("results");
    create_study(&input_dir);

    let mut cmd = Command::cargo_bin("nps-analyze").unwrap();
    cmd.arg("--input")
        .arg(&input_dir)
        .arg("--output")
        .arg(&output_dir)
        .arg("--roi-grid")
        .arg("64,64,0,0,1,1,0,0")
        .arg("--pixel-size")
        .arg("1.0")
        .assert()
        .success();

    let records = summary_records(&output_dir);
    assert_eq!(records.len(), 1);
    let row = &records[0];
    assert_eq!(&row[0], "1");
    assert_eq!(&row[1], "Phantom");
    assert_eq!(&row[2], "soft");

    // 8 px period at 0.1 cm per pixel.
    let peak_freq: f64 = row[3].parse().unwrap();
    assert_relative_eq!(peak_freq, 1.25, epsilon = 0.02);
    let mean_pixel: f64 = row[9].parse().unwrap();
    assert_relative_eq!(mean_pixel, 100.0, epsilon = 1e-9);
    let mean_sd: f64 = row[10].parse().unwrap();
    assert_relative_eq!(mean_sd, 10.0, epsilon = 1e-9);

    let series_csv = output_dir
        .join("Phantom")
        .join("Results_Phantom")
        .join("Phantomsoft.csv");
    let mut rdr = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .from_path(&series_csv)
        .unwrap();
    // Two images with one ROI and one average each, then the series average.
    assert_eq!(rdr.headers().unwrap().len(), 10);
    assert!(rdr.records().next().is_some());

    assert!(output_dir.join("Only_averaged_sheets").join("Phantom.csv").exists());

    let config: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(output_dir.join("run_config.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(config["pixel_size_default"], 1.0);
}

#[test]
fn test_series_with_the_same_short_name_get_separate_files() {
    let temp_dir = tempfile::tempdir().unwrap();
    let input_dir = temp_dir.path().join("input");
    let output_dir = temp_dir.path().join("results");
    for (series, half_period) in [("1_soft", 4), ("2_soft", 8)] {
        let series_dir = input_dir.join("Phantom - 1").join(series);
        std::fs::create_dir_all(&series_dir).unwrap();
        create_stripes(&series_dir.join("img_1.png"), half_period);
    }

    let mut cmd = Command::cargo_bin("nps-analyze").unwrap();
    cmd.arg("--input")
        .arg(&input_dir)
        .arg("--output")
        .arg(&output_dir)
        .arg("--roi-grid")
        .arg("64,64,0,0,1,1,0,0")
        .arg("--pixel-size")
        .arg("1.0")
        .assert()
        .success();

    let records = summary_records(&output_dir);
    let series: Vec<&str> = records.iter().map(|r| &r[2]).collect();
    assert_eq!(series, vec!["soft", "2_soft"]);

    let results = output_dir.join("Phantom").join("Results_Phantom");
    assert!(results.join("Phantomsoft.csv").exists());
    assert!(results.join("Phantom2_soft.csv").exists());
    assert_eq!(std::fs::read_dir(&results).unwrap().count(), 2);

    // 8 px and 16 px periods.
    let first: f64 = records[0][3].parse().unwrap();
    let second: f64 = records[1][3].parse().unwrap();
    assert_relative_eq!(first, 1.25, epsilon = 0.02);
    assert_relative_eq!(second, 0.625, epsilon = 0.02);
}

#[test]
fn test_roi_file_selects_images() {
    let temp_dir = tempfile::tempdir().unwrap();
    let input_dir = temp_dir.path().join("input");
    let output_dir = temp_dir.path().join("results");
    create_study(&input_dir);

    let roi_file = temp_dir.path().join("rois.json");
    std::fs::write(&roi_file, r#"{ "img_2.png": [[0, 0, 32, 32], [32, 32, 64, 64]] }"#).unwrap();

    let mut cmd = Command::cargo_bin("nps-analyze").unwrap();
    cmd.arg("--input")
        .arg(&input_dir)
        .arg("--output")
        .arg(&output_dir)
        .arg("--rois")
        .arg(&roi_file)
        .arg("--pixel-size")
        .arg("1.0")
        .arg("--first-data-set-layout")
        .assert()
        .success();

    let records = summary_records(&output_dir);
    assert_eq!(records.len(), 1);
    assert_eq!(&records[0][1], "Phantom - 1");
    assert_eq!(&records[0][2], "1_soft");

    let series_csv = output_dir
        .join("Phantom - 1")
        .join("Results_Phantom - 1")
        .join("Phantom - 11_soft.csv");
    let mut rdr = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .from_path(&series_csv)
        .unwrap();
    // One image with two ROIs and its average, then the series average.
    assert_eq!(rdr.headers().unwrap().len(), 8);
}

#[test]
fn test_invalid_configuration_is_rejected() {
    let temp_dir = tempfile::tempdir().unwrap();
    let input_dir = temp_dir.path().join("input");
    let output_dir = temp_dir.path().join("results");
    create_study(&input_dir);

    let mut cmd = Command::cargo_bin("nps-analyze").unwrap();
    cmd.arg("--input")
        .arg(&input_dir)
        .arg("--output")
        .arg(&output_dir)
        .arg("--roi-grid")
        .arg("64,64,0,0,1,1,0,0")
        .arg("--step")
        .arg("0")
        .assert()
        .failure();

    assert!(!output_dir.exists());
}

#[test]
fn test_unmatched_rois_fail_without_output() {
    let temp_dir = tempfile::tempdir().unwrap();
    let input_dir = temp_dir.path().join("input");
    let output_dir = temp_dir.path().join("results");
    create_study(&input_dir);

    let roi_file = temp_dir.path().join("rois.json");
    std::fs::write(&roi_file, r#"{ "other.dcm": [[0, 0, 16, 16]] }"#).unwrap();

    let mut cmd = Command::cargo_bin("nps-analyze").unwrap();
    cmd.arg("--input")
        .arg(&input_dir)
        .arg("--output")
        .arg(&output_dir)
        .arg("--rois")
        .arg(&roi_file)
        .assert()
        .failure();

    assert!(!output_dir.exists());
}
