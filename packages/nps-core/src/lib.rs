//! # NPS Core Library
//!
//! Noise power spectrum (NPS) analysis of regions of interest in radiographic
//! images. The library is used by the `nps-analyze` binary but has no
//! console or file-format responsibilities beyond decoding input images.
//!
//! The main components are:
//! - `NpsConfig`: run options, validated once before any work starts.
//! - `compute_nps`: detrending, 2D power spectrum and radial reduction of one ROI.
//! - `truncate` / `resample_onto_grid`: mapping native profiles onto the
//!   shared `FrequencyGrid`.
//! - `average_roi_profiles` / `mean_of_image_profiles`: ROI -> image -> series
//!   averaging.
//! - `analyze_peak`: dominant peak and deviations of an averaged profile.
//! - `StudyTree` / `sort_roi_map`: discovery of study and series folders and
//!   association of ROI definitions with the discovered files.
//! - `Pipeline`: the whole run, producing a `RunReport`.

pub mod aggregate;
pub mod config;
pub mod decode;
pub mod detrend;
pub mod error;
pub mod grid;
pub mod grouping;
pub mod labels;
pub mod peak;
pub mod pipeline;
pub mod radial;
pub mod resample;
pub mod roi;
pub mod spectrum;
pub mod text;

pub use aggregate::{
    average_roi_profiles, mean, mean_of_image_profiles, pixel_stats, population_sd, PixelStats,
};
pub use config::{DetrendMode, FitOrder, MatchMode, NpsConfig};
pub use decode::{DecodedImage, FileImageSource, ImageSource};
pub use error::{ConfigError, NpsError, NpsResult};
pub use grid::FrequencyGrid;
pub use grouping::{natural_cmp, sort_roi_map, RoiImage, RoiSeries, RoiStudy, SortedRoiMap, StudyTree};
pub use labels::{series_label, study_label, LabelSet};
pub use peak::{analyze_peak, collect_peaks, PeakInfo};
pub use pipeline::{
    estimate_remaining, FailedSeries, ImageResult, Pipeline, Progress, RoiResult, RunReport,
    SeriesResult, SkippedImage, SpacingSource, StudyResult, SummaryRow,
};
pub use radial::radial_profile;
pub use resample::{resample_onto_grid, truncate, Profile};
pub use roi::{broadcast_rois, Roi, RoiArray, RoiMap};
pub use spectrum::{compute_nps, power_spectrum, NpsProfile};
