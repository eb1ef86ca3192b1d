use clap::{ArgGroup, Parser};
use nps_core::{MatchMode, NpsConfig};
use std::path::PathBuf;

/// Command-line arguments for the nps-analyze tool.
///
/// Every analysis option is optional. Unset options come from `--config`,
/// or from the built-in defaults when no configuration file is given.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = "Computes averaged noise power spectra of ROIs over study/series image folders."
)]
#[command(group(ArgGroup::new("roi_source").required(true).args(["rois", "roi_grid"])))]
pub struct Args {
    /// Root directory holding one folder per study, each with one folder per series.
    #[arg(long)]
    pub input: PathBuf,

    /// Directory for the result files. A numbered sibling is used if it exists.
    #[arg(long)]
    pub output: PathBuf,

    /// JSON file mapping image paths (or fragments of them) to ROI lists.
    #[arg(long)]
    pub rois: Option<PathBuf>,

    /// Regular ROI grid applied to every image:
    /// height,width,left_upper_x,left_upper_y,number_x,number_y,distance_x,distance_y
    #[arg(long)]
    pub roi_grid: Option<String>,

    /// JSON file with a base configuration. Explicit flags override it.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Remove a polynomial background instead of the mean.
    #[arg(long)]
    pub fitting: bool,

    /// Order of the background polynomial (1 or 2). Implies --fitting.
    #[arg(long)]
    pub fit_order: Option<usize>,

    /// Truncate native profiles at this percentage of their maximum.
    #[arg(long)]
    pub truncation: Option<f64>,

    /// First frequency of the common grid in cm^-1.
    #[arg(long)]
    pub start_freq: Option<f64>,

    /// Last frequency of the common grid in cm^-1.
    #[arg(long)]
    pub end_freq: Option<f64>,

    /// Spacing of the common grid in cm^-1.
    #[arg(long)]
    pub step: Option<f64>,

    /// Pixel spacing in mm used when an image carries none.
    #[arg(long)]
    pub pixel_size: Option<f64>,

    /// Use study and series folder names verbatim in output names.
    #[arg(long)]
    pub first_data_set_layout: bool,

    /// Comma-separated file name fragments of images to include, e.g. .dcm,.png
    #[arg(long, value_delimiter = ',')]
    pub extensions: Option<Vec<String>>,

    /// Number of files to skip at the start of every series.
    #[arg(long)]
    pub exclude_start: Option<usize>,

    /// Number of files to skip at the end of every series.
    #[arg(long)]
    pub exclude_end: Option<usize>,

    /// Match ROI keys against the full path or file name instead of any part of the path.
    #[arg(long)]
    pub exact_match: bool,

    /// Number of parallel jobs for ROI processing. 0 lets Rayon choose.
    #[arg(long)]
    pub jobs: Option<usize>,
}

impl Args {
    /// Applies every explicitly given flag on top of `base`.
    pub fn apply_to(&self, mut base: NpsConfig) -> NpsConfig {
        if self.fitting {
            base.use_fitting = true;
        }
        if let Some(order) = self.fit_order {
            base.use_fitting = true;
            base.fit_order = order;
        }
        if let Some(percentage) = self.truncation {
            base.use_truncation = true;
            base.trunc_percentage = percentage;
        }
        if let Some(v) = self.start_freq {
            base.start_freq = v;
        }
        if let Some(v) = self.end_freq {
            base.end_freq = v;
        }
        if let Some(v) = self.step {
            base.step = v;
        }
        if let Some(v) = self.pixel_size {
            base.pixel_size_default = v;
        }
        if self.first_data_set_layout {
            base.first_data_set_layout = true;
        }
        if let Some(extensions) = &self.extensions {
            base.extensions = extensions.clone();
        }
        if let Some(v) = self.exclude_start {
            base.exclude_start = v;
        }
        if let Some(v) = self.exclude_end {
            base.exclude_end = v;
        }
        if self.exact_match {
            base.match_mode = MatchMode::Exact;
        }
        if let Some(v) = self.jobs {
            base.jobs = v;
        }
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_base_configuration() {
        let args = Args::parse_from([
            "nps-analyze",
            "--input",
            "in",
            "--output",
            "out",
            "--roi-grid",
            "8,8,0,0,1,1,0,0",
            "--fit-order",
            "1",
            "--extensions",
            ".dcm,.png",
        ]);
        let base = NpsConfig {
            step: 0.05,
            ..NpsConfig::default()
        };
        let config = args.apply_to(base);
        assert!(config.use_fitting);
        assert_eq!(config.fit_order, 1);
        assert_eq!(config.step, 0.05);
        assert_eq!(config.extensions, vec![".dcm", ".png"]);
        assert!(!config.use_truncation);
    }

    #[test]
    fn a_roi_source_is_required() {
        assert!(Args::try_parse_from(["nps-analyze", "--input", "a", "--output", "b"]).is_err());
    }
}
