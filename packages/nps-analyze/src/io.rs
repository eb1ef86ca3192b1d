use anyhow::{Context, Result};
use nps_core::{
    text, NpsConfig, Profile, RoiArray, RoiMap, RunReport, SeriesResult, StudyResult, SummaryRow,
};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const SUMMARY_FILE: &str = "Summary_information.csv";
pub const AVERAGED_DIR: &str = "Only_averaged_sheets";
pub const RUN_CONFIG_FILE: &str = "run_config.json";

/// Checks if an output directory exists. If it does, it finds a new, unused
/// directory name by appending an index (e.g., `output`, `output.1`, `output.2`).
/// It then creates the directory and returns its path.
pub fn prepare_output_dir(path: PathBuf) -> Result<PathBuf> {
    if !path.exists() {
        std::fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create directory: {:?}", path))?;
        return Ok(path);
    }

    let name = path
        .file_name()
        .context("Failed to get directory name")?
        .to_str()
        .context("Failed to convert directory name to string")?
        .to_string();

    let mut index = 1;
    loop {
        let new_path = path.with_file_name(format!("{}.{}", name, index));
        if !new_path.exists() {
            std::fs::create_dir_all(&new_path)
                .with_context(|| format!("Failed to create directory: {:?}", new_path))?;
            println!(
                "{}: Output directory {:?} already exists. Using {:?} instead.\n",
                text::warning("Warning"),
                path,
                new_path
            );
            return Ok(new_path);
        }
        index += 1;
    }
}

/// Reads a JSON configuration. Missing fields take their default values.
pub fn load_config(path: &Path) -> Result<NpsConfig> {
    let file = File::open(path).with_context(|| format!("Failed to open config {:?}", path))?;
    serde_json::from_reader(file).with_context(|| format!("Failed to parse config {:?}", path))
}

/// Reads `{ "<image path or name>": [[x0, y0, x1, y1], ...] }`.
pub fn load_roi_map(path: &Path) -> Result<RoiMap> {
    let file = File::open(path).with_context(|| format!("Failed to open ROI file {:?}", path))?;
    serde_json::from_reader(file).with_context(|| format!("Failed to parse ROI file {:?}", path))
}

/// Parses the eight comma-separated values of `--roi-grid`.
pub fn parse_roi_grid(grid: &str) -> Result<RoiArray> {
    let values = grid
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<usize>()
                .with_context(|| format!("Failed to parse ROI grid value {:?}", v))
        })
        .collect::<Result<Vec<_>>>()?;
    let [height, width, left_upper_x, left_upper_y, number_roi_x, number_roi_y, distance_x, distance_y] =
        values[..]
    else {
        anyhow::bail!(
            "ROI grid must be eight comma-separated integers, got {}.",
            values.len()
        );
    };
    Ok(RoiArray {
        height,
        width,
        left_upper_x,
        left_upper_y,
        number_roi_x,
        number_roi_y,
        distance_x,
        distance_y,
    })
}

pub fn write_run_config(output_dir: &Path, config: &NpsConfig) -> Result<PathBuf> {
    let path = output_dir.join(RUN_CONFIG_FILE);
    let file = File::create(&path).with_context(|| format!("Failed to create {:?}", path))?;
    serde_json::to_writer_pretty(file, config)
        .with_context(|| format!("Failed to write {:?}", path))?;
    Ok(path)
}

fn format_optional(value: Option<f64>) -> String {
    value.map_or_else(|| "undefined".to_string(), |v| v.to_string())
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Writes `#` comment lines, a header row and the given columns side by
/// side. Shorter columns are padded with empty cells.
fn write_columns(
    path: &Path,
    comments: &[String],
    header: &[String],
    columns: &[&[f64]],
) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    for line in comments {
        writeln!(file, "# {}", line)?;
    }

    let mut wtr = csv::Writer::from_writer(file);
    wtr.write_record(header)?;
    let rows = columns.iter().map(|c| c.len()).max().unwrap_or(0);
    for i in 0..rows {
        let record: Vec<String> = columns
            .iter()
            .map(|c| c.get(i).map(|v| v.to_string()).unwrap_or_default())
            .collect();
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

fn push_profile<'a>(
    header: &mut Vec<String>,
    columns: &mut Vec<&'a [f64]>,
    name: &str,
    profile: &'a Profile,
) {
    header.push(format!("{} Lp [cm^-1]", name));
    header.push(format!("{} NPS", name));
    columns.push(&profile.frequencies);
    columns.push(&profile.values);
}

/// Every ROI profile, every image average and the series average of one series.
pub fn save_series_csv(path: &Path, study_label: &str, series: &SeriesResult) -> Result<()> {
    let mut comments = vec![
        format!("Study: {}", study_label),
        format!("Series: {} ({})", series.label, series.path.display()),
        format!("Images: {}", series.images.len()),
        format!("Peak frequency: {}", series.peak.peak_frequency),
        format!("Peak value: {}", series.peak.peak_value),
        format!("Left deviation: {}", format_optional(series.peak.left_deviation)),
        format!("Right deviation: {}", format_optional(series.peak.right_deviation)),
        format!(
            "Mean pixel value: {} (SD {})",
            series.mean_pixel, series.sd_of_mean_pixel
        ),
        format!("Mean pixel SD: {} (SD {})", series.mean_sd, series.sd_of_sd),
        format!("Mean AUC: {}", series.mean_auc),
        format!("Mean integral 2D: {}", series.mean_integral_2d),
    ];
    for image in &series.images {
        comments.push(format!(
            "{}: spacing {:?} mm ({:?}), mean {}, SD {}, peak {} at {}, AUC {}, integral 2D {}",
            file_label(&image.path),
            image.pixel_spacing,
            image.spacing_source,
            image.mean_pixel,
            image.mean_sd,
            image.peak.peak_value,
            image.peak.peak_frequency,
            image.mean_auc,
            image.mean_integral_2d
        ));
    }

    let mut header = Vec::new();
    let mut columns = Vec::new();
    for image in &series.images {
        let name = file_label(&image.path);
        for (k, roi) in image.rois.iter().enumerate() {
            let r = roi.roi;
            let roi_name = format!(
                "{} ROI{} [{} {} {} {}]",
                name,
                k + 1,
                r.x0(),
                r.y0(),
                r.x1(),
                r.y1()
            );
            push_profile(&mut header, &mut columns, &roi_name, &roi.resampled);
        }
        push_profile(
            &mut header,
            &mut columns,
            &format!("{} averaged", name),
            &image.averaged,
        );
    }
    push_profile(&mut header, &mut columns, "Series averaged", &series.averaged);

    write_columns(path, &comments, &header, &columns)
}

/// Averaged profile of every series of one study.
pub fn save_study_csv(path: &Path, study: &StudyResult) -> Result<()> {
    let comments = vec![format!("Study: {} ({})", study.label, study.path.display())];
    let mut header = Vec::new();
    let mut columns = Vec::new();
    for series in &study.series {
        push_profile(&mut header, &mut columns, &series.label, &series.averaged);
    }
    write_columns(path, &comments, &header, &columns)
}

pub fn save_summary_csv(path: &Path, rows: &[SummaryRow]) -> Result<()> {
    let mut wtr =
        csv::Writer::from_path(path).with_context(|| format!("Failed to create {:?}", path))?;
    wtr.write_record([
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
        "ave_SD",
    ])?;
    for row in rows {
        wtr.write_record([
            row.number.to_string(),
            row.folder.clone(),
            row.series.clone(),
            row.peak_frequency.to_string(),
            row.peak_value.to_string(),
            format_optional(row.left_deviation),
            format_optional(row.right_deviation),
            row.area.to_string(),
            row.integral.to_string(),
            row.mean_pixel.to_string(),
            row.mean_sd.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes every result file of a run and returns the number of files written.
pub fn save_report(output_dir: &Path, report: &RunReport) -> Result<usize> {
    let mut written = 0;

    let averaged_dir = output_dir.join(AVERAGED_DIR);
    std::fs::create_dir_all(&averaged_dir)
        .with_context(|| format!("Failed to create directory: {:?}", averaged_dir))?;

    for study in report.studies.iter().filter(|s| !s.series.is_empty()) {
        let results_dir = output_dir
            .join(&study.label)
            .join(format!("Results_{}", study.label));
        std::fs::create_dir_all(&results_dir)
            .with_context(|| format!("Failed to create directory: {:?}", results_dir))?;

        for series in &study.series {
            let path = results_dir.join(format!("{}{}.csv", study.label, series.label));
            save_series_csv(&path, &study.label, series)?;
            written += 1;
        }

        save_study_csv(&averaged_dir.join(format!("{}.csv", study.label)), study)?;
        written += 1;
    }

    save_summary_csv(&output_dir.join(SUMMARY_FILE), &report.summary)?;
    Ok(written + 1)
}
