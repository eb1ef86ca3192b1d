//! Study -> series -> image -> ROI traversal producing all NPS results of a run.
//!
//! ROIs of one image are processed on the rayon pool. Everything above the ROI
//! level runs sequentially so the order of results always follows the
//! [`SortedRoiMap`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use ndarray::Array2;
use rayon::prelude::*;
use serde::Serialize;

use crate::aggregate::{
    average_roi_profiles, mean, mean_of_image_profiles, pixel_stats, population_sd, PixelStats,
};
use crate::config::{DetrendMode, NpsConfig};
use crate::decode::ImageSource;
use crate::error::{ConfigError, NpsResult};
use crate::grid::FrequencyGrid;
use crate::grouping::{RoiImage, RoiSeries, SortedRoiMap};
use crate::labels::{series_label, study_label, LabelSet};
use crate::peak::{analyze_peak, PeakInfo};
use crate::resample::{resample_onto_grid, truncate, Profile};
use crate::roi::Roi;
use crate::spectrum::{compute_nps, NpsProfile};

/// Where the pixel spacing of an image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpacingSource {
    Metadata,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoiResult {
    pub roi: Roi,
    /// Statistics of the raw ROI pixels.
    pub stats: PixelStats,
    /// Profile at the native radial frequencies.
    pub nps: NpsProfile,
    /// Profile after optional truncation and resampling onto the grid.
    pub resampled: Profile,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageResult {
    pub key: String,
    pub path: PathBuf,
    pub pixel_spacing: (f64, f64),
    pub spacing_source: SpacingSource,
    pub rois: Vec<RoiResult>,
    pub averaged: Profile,
    pub peak: PeakInfo,
    pub mean_pixel: f64,
    pub sd_of_mean_pixel: f64,
    pub mean_sd: f64,
    pub sd_of_sd: f64,
    pub mean_auc: f64,
    pub mean_integral_2d: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesResult {
    pub name: String,
    pub label: String,
    pub path: PathBuf,
    pub images: Vec<ImageResult>,
    pub averaged: Profile,
    pub peak: PeakInfo,
    pub mean_pixel: f64,
    pub sd_of_mean_pixel: f64,
    pub mean_sd: f64,
    pub sd_of_sd: f64,
    pub mean_auc: f64,
    pub mean_integral_2d: f64,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudyResult {
    pub path: PathBuf,
    pub label: String,
    pub series: Vec<SeriesResult>,
}

/// One row of the cross-study summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    /// 1-based position of the study in the run.
    pub number: usize,
    pub folder: String,
    pub series: String,
    pub peak_frequency: f64,
    pub peak_value: f64,
    pub left_deviation: Option<f64>,
    pub right_deviation: Option<f64>,
    pub area: f64,
    pub integral: f64,
    pub mean_pixel: f64,
    pub mean_sd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedSeries {
    pub study: PathBuf,
    pub series: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedImage {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub studies: Vec<StudyResult>,
    pub summary: Vec<SummaryRow>,
    pub failed_series: Vec<FailedSeries>,
    pub skipped_images: Vec<SkippedImage>,
    pub cancelled: bool,
}

/// Reported after every finished series.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// 0-based indices of the series just finished.
    pub study_index: usize,
    pub study_count: usize,
    pub series_index: usize,
    pub series_count: usize,
    pub series_name: String,
    pub elapsed: Duration,
    pub remaining: Duration,
}

/// Linear extrapolation of the time left from the duration of the last series.
///
/// `remaining_studies` includes the current study. Every later study is assumed
/// to hold as many series as the current one.
pub fn estimate_remaining(
    elapsed_for_series: Duration,
    remaining_studies: usize,
    series_in_study: usize,
    remaining_series_in_study: usize,
) -> Duration {
    let series_left =
        remaining_studies.saturating_sub(1) * series_in_study + remaining_series_in_study;
    elapsed_for_series.mul_f64(series_left as f64)
}

fn is_cancelled(cancel: Option<&AtomicBool>) -> bool {
    cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
}

enum SeriesOutcome {
    Done(SeriesResult),
    Failed(String),
    Cancelled,
}

pub struct Pipeline {
    config: NpsConfig,
    grid: FrequencyGrid,
    mode: DetrendMode,
    pool: Option<rayon::ThreadPool>,
}

impl Pipeline {
    /// Validates `config` and prepares the frequency grid and worker pool.
    pub fn new(config: NpsConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let grid = config.frequency_grid()?;
        let mode = config.detrend_mode()?;

        let pool = if config.jobs > 0 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(config.jobs)
                .build()
            {
                Ok(pool) => Some(pool),
                Err(e) => {
                    log::warn!("Could not build a pool of {} threads: {}", config.jobs, e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Pipeline {
            config,
            grid,
            mode,
            pool,
        })
    }

    pub fn config(&self) -> &NpsConfig {
        &self.config
    }

    pub fn grid(&self) -> &FrequencyGrid {
        &self.grid
    }

    pub fn run(
        &self,
        rois: &SortedRoiMap,
        source: &dyn ImageSource,
        cancel: Option<&AtomicBool>,
    ) -> RunReport {
        self.run_with_progress(rois, source, cancel, |_| {})
    }

    /// Like [`Pipeline::run`], calling `on_series` after every finished series.
    pub fn run_with_progress<F>(
        &self,
        rois: &SortedRoiMap,
        source: &dyn ImageSource,
        cancel: Option<&AtomicBool>,
        mut on_series: F,
    ) -> RunReport
    where
        F: FnMut(&Progress),
    {
        let mut report = RunReport::default();
        let study_count = rois.studies.len();
        let mut study_labels = LabelSet::default();

        'studies: for (study_index, study) in rois.studies.iter().enumerate() {
            let folder = study
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| study.path.to_string_lossy().into_owned());
            let label = study_labels.claim(
                study_label(&study.path, self.config.first_data_set_layout),
                &folder,
            );
            let mut series_labels = LabelSet::default();
            let mut study_result = StudyResult {
                path: study.path.clone(),
                label: label.clone(),
                series: Vec::new(),
            };
            let series_count = study.series.len();

            for (series_index, series) in study.series.iter().enumerate() {
                if is_cancelled(cancel) {
                    report.cancelled = true;
                    report.studies.push(study_result);
                    break 'studies;
                }
                log::info!(
                    "Series {}: {} of {}, study {} of {}",
                    series.name,
                    series_index + 1,
                    series_count,
                    study_index + 1,
                    study_count
                );

                let started = Instant::now();
                match self.process_series(series, source, cancel, &mut report) {
                    SeriesOutcome::Done(mut result) => {
                        result.label = series_labels.claim(result.label, &series.name);
                        report.summary.push(summary_row(study_index + 1, &label, &result));
                        study_result.series.push(result);
                    }
                    SeriesOutcome::Failed(reason) => {
                        log::error!("Series {:?} failed: {}", series.path, reason);
                        report.failed_series.push(FailedSeries {
                            study: study.path.clone(),
                            series: series.name.clone(),
                            reason,
                        });
                    }
                    SeriesOutcome::Cancelled => {
                        report.cancelled = true;
                        report.studies.push(study_result);
                        break 'studies;
                    }
                }

                let elapsed = started.elapsed();
                let progress = Progress {
                    study_index,
                    study_count,
                    series_index,
                    series_count,
                    series_name: series.name.clone(),
                    elapsed,
                    remaining: estimate_remaining(
                        elapsed,
                        study_count - study_index,
                        series_count,
                        series_count - series_index - 1,
                    ),
                };
                on_series(&progress);
            }

            report.studies.push(study_result);
        }

        if report.cancelled {
            log::warn!("Run cancelled, returning completed series only");
        }
        report
    }

    fn process_series(
        &self,
        series: &RoiSeries,
        source: &dyn ImageSource,
        cancel: Option<&AtomicBool>,
        report: &mut RunReport,
    ) -> SeriesOutcome {
        let started = Instant::now();
        let mut images = Vec::with_capacity(series.images.len());

        for (index, image) in series.images.iter().enumerate() {
            if is_cancelled(cancel) {
                return SeriesOutcome::Cancelled;
            }
            log::debug!(
                "Image {} of {} in {}: {:?}",
                index + 1,
                series.images.len(),
                series.name,
                image.path
            );
            match self.process_image(image, source) {
                Ok(Some(result)) => images.push(result),
                Ok(None) => {}
                Err(e) => {
                    log::warn!("Skipping {:?}: {}", image.path, e);
                    report.skipped_images.push(SkippedImage {
                        path: image.path.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if images.is_empty() {
            log::warn!("No image of series {:?} produced an NPS", series.path);
            return SeriesOutcome::Failed("no image with usable ROIs".to_string());
        }

        let profiles: Vec<Profile> = images.iter().map(|i| i.averaged.clone()).collect();
        let averaged = match mean_of_image_profiles(&profiles) {
            Ok(Some(profile)) => profile,
            Ok(None) => return SeriesOutcome::Failed("no averaged image profiles".to_string()),
            Err(e) => return SeriesOutcome::Failed(e.to_string()),
        };
        let peak = analyze_peak(&averaged);

        let image_means: Vec<f64> = images.iter().map(|i| i.mean_pixel).collect();
        let image_sds: Vec<f64> = images.iter().map(|i| i.mean_sd).collect();
        let aucs: Vec<f64> = images
            .iter()
            .flat_map(|i| i.rois.iter().map(|r| r.nps.auc))
            .collect();
        let integrals: Vec<f64> = images
            .iter()
            .flat_map(|i| i.rois.iter().map(|r| r.nps.integral_2d))
            .collect();

        SeriesOutcome::Done(SeriesResult {
            name: series.name.clone(),
            label: series_label(&series.name, self.config.first_data_set_layout),
            path: series.path.clone(),
            averaged,
            peak,
            mean_pixel: mean(&image_means).unwrap_or(f64::NAN),
            sd_of_mean_pixel: population_sd(&image_means).unwrap_or(f64::NAN),
            mean_sd: mean(&image_sds).unwrap_or(f64::NAN),
            sd_of_sd: population_sd(&image_sds).unwrap_or(f64::NAN),
            mean_auc: mean(&aucs).unwrap_or(f64::NAN),
            mean_integral_2d: mean(&integrals).unwrap_or(f64::NAN),
            elapsed: started.elapsed(),
            images,
        })
    }

    /// Loads one image and analyses all of its ROIs.
    ///
    /// `Ok(None)` means the image had nothing to analyse. Decode failures are
    /// returned so the caller can skip the image.
    pub fn process_image(
        &self,
        image: &RoiImage,
        source: &dyn ImageSource,
    ) -> NpsResult<Option<ImageResult>> {
        if image.rois.is_empty() {
            log::warn!("No ROIs defined for {:?}", image.path);
            return Ok(None);
        }

        let decoded = source.load(&image.path)?;
        let (pixel_spacing, spacing_source) = match decoded.pixel_spacing {
            Some(spacing) => (spacing, SpacingSource::Metadata),
            None => {
                log::warn!(
                    "No usable pixel spacing in {:?}, using {} mm",
                    image.path,
                    self.config.pixel_size_default
                );
                let d = self.config.pixel_size_default;
                ((d, d), SpacingSource::Default)
            }
        };
        let pixels = decoded.pixels.mapv(f64::from);

        let analyse = || -> Vec<RoiResult> {
            image
                .rois
                .par_iter()
                .filter_map(|roi| self.process_roi(roi, &pixels, pixel_spacing, &image.path))
                .collect()
        };
        let rois = match &self.pool {
            Some(pool) => pool.install(analyse),
            None => analyse(),
        };

        let resampled: Vec<Profile> = rois.iter().map(|r| r.resampled.clone()).collect();
        let Some(averaged) = average_roi_profiles(&resampled) else {
            log::warn!("No ROI of {:?} lies inside the image", image.path);
            return Ok(None);
        };
        let peak = analyze_peak(&averaged);

        let means: Vec<f64> = rois.iter().map(|r| r.stats.mean).collect();
        let sds: Vec<f64> = rois.iter().map(|r| r.stats.sd).collect();
        let aucs: Vec<f64> = rois.iter().map(|r| r.nps.auc).collect();
        let integrals: Vec<f64> = rois.iter().map(|r| r.nps.integral_2d).collect();

        Ok(Some(ImageResult {
            key: image.key.clone(),
            path: image.path.clone(),
            pixel_spacing,
            spacing_source,
            averaged,
            peak,
            mean_pixel: mean(&means).unwrap_or(f64::NAN),
            sd_of_mean_pixel: population_sd(&means).unwrap_or(f64::NAN),
            mean_sd: mean(&sds).unwrap_or(f64::NAN),
            sd_of_sd: population_sd(&sds).unwrap_or(f64::NAN),
            mean_auc: mean(&aucs).unwrap_or(f64::NAN),
            mean_integral_2d: mean(&integrals).unwrap_or(f64::NAN),
            rois,
        }))
    }

    fn process_roi(
        &self,
        roi: &Roi,
        pixels: &Array2<f64>,
        pixel_spacing: (f64, f64),
        path: &Path,
    ) -> Option<RoiResult> {
        let Some(crop) = roi.crop(pixels) else {
            log::warn!("ROI {:?} lies outside {:?}, skipped", roi, path);
            return None;
        };
        let stats = pixel_stats(&crop)?;
        let nps = compute_nps(&crop, pixel_spacing, self.mode);

        let native = Profile::from(&nps);
        let native = match self.config.truncation() {
            Some(percentage) => truncate(&native, percentage),
            None => native,
        };
        let resampled = resample_onto_grid(&native, &self.grid);

        Some(RoiResult {
            roi: *roi,
            stats,
            nps,
            resampled,
        })
    }
}

fn summary_row(number: usize, folder: &str, series: &SeriesResult) -> SummaryRow {
    SummaryRow {
        number,
        folder: folder.to_string(),
        series: series.label.clone(),
        peak_frequency: series.peak.peak_frequency,
        peak_value: series.peak.peak_value,
        left_deviation: series.peak.left_deviation,
        right_deviation: series.peak.right_deviation,
        area: series.mean_auc,
        integral: series.mean_integral_2d,
        mean_pixel: series.mean_pixel,
        mean_sd: series.mean_sd,
    }
}
