//! Rectangular regions of interest and the ways they are produced.

use std::collections::BTreeMap;
use std::path::Path;

use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Smallest edge length of a rectangle drawn from two corners.
pub const MIN_ROI_EDGE: usize = 5;

/// Flat mapping from an image path (or a fragment of one) to its ROIs.
pub type RoiMap = BTreeMap<String, Vec<Roi>>;

/// Rectangle in pixel coordinates, `x` along columns and `y` along rows.
/// The upper bounds are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "[usize; 4]", into = "[usize; 4]")]
pub struct Roi {
    x0: usize,
    y0: usize,
    x1: usize,
    y1: usize,
}

impl Roi {
    pub fn new(x0: usize, y0: usize, x1: usize, y1: usize) -> Result<Self, ConfigError> {
        if x1 <= x0 || y1 <= y0 {
            return Err(ConfigError::InvalidRoi { x0, y0, x1, y1 });
        }
        Ok(Roi { x0, y0, x1, y1 })
    }

    /// Rectangle spanned by two arbitrary corners, widened to at least
    /// [`MIN_ROI_EDGE`] pixels along each axis.
    pub fn from_corners(a: (usize, usize), b: (usize, usize)) -> Self {
        let (x0, mut x1) = (a.0.min(b.0), a.0.max(b.0));
        let (y0, mut y1) = (a.1.min(b.1), a.1.max(b.1));
        if x1 - x0 < MIN_ROI_EDGE {
            x1 = x0 + MIN_ROI_EDGE;
        }
        if y1 - y0 < MIN_ROI_EDGE {
            y1 = y0 + MIN_ROI_EDGE;
        }
        Roi { x0, y0, x1, y1 }
    }

    pub fn x0(&self) -> usize {
        self.x0
    }

    pub fn y0(&self) -> usize {
        self.y0
    }

    pub fn x1(&self) -> usize {
        self.x1
    }

    pub fn y1(&self) -> usize {
        self.y1
    }

    pub fn width(&self) -> usize {
        self.x1 - self.x0
    }

    pub fn height(&self) -> usize {
        self.y1 - self.y0
    }

    /// Copies the part of `pixels` covered by the ROI, clipped to the image.
    /// `None` when nothing of the ROI lies inside the image.
    pub fn crop<T: Clone>(&self, pixels: &Array2<T>) -> Option<Array2<T>> {
        let (rows, cols) = pixels.dim();
        let (x1, y1) = (self.x1.min(cols), self.y1.min(rows));
        if self.x0 >= x1 || self.y0 >= y1 {
            return None;
        }
        Some(pixels.slice(s![self.y0..y1, self.x0..x1]).to_owned())
    }
}

impl TryFrom<[usize; 4]> for Roi {
    type Error = ConfigError;

    fn try_from([x0, y0, x1, y1]: [usize; 4]) -> Result<Self, Self::Error> {
        Roi::new(x0, y0, x1, y1)
    }
}

impl From<Roi> for [usize; 4] {
    fn from(roi: Roi) -> Self {
        [roi.x0, roi.y0, roi.x1, roi.y1]
    }
}

/// Regular grid of equally sized ROIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiArray {
    pub height: usize,
    pub width: usize,
    pub left_upper_x: usize,
    pub left_upper_y: usize,
    pub number_roi_x: usize,
    pub number_roi_y: usize,
    pub distance_x: usize,
    pub distance_y: usize,
}

impl Default for RoiArray {
    fn default() -> Self {
        RoiArray {
            height: 64,
            width: 64,
            left_upper_x: 10,
            left_upper_y: 10,
            number_roi_x: 1,
            number_roi_y: 1,
            distance_x: 5,
            distance_y: 5,
        }
    }
}

impl RoiArray {
    /// Column-major enumeration: all rows of the first column, then the next.
    pub fn rois(&self) -> Result<Vec<Roi>, ConfigError> {
        let mut rois = Vec::with_capacity(self.number_roi_x * self.number_roi_y);
        for ix in 0..self.number_roi_x {
            let x0 = self.left_upper_x + ix * (self.width + self.distance_x);
            for iy in 0..self.number_roi_y {
                let y0 = self.left_upper_y + iy * (self.height + self.distance_y);
                rois.push(Roi::new(x0, y0, x0 + self.width, y0 + self.height)?);
            }
        }
        Ok(rois)
    }
}

/// Applies the same ROI list to every image.
pub fn broadcast_rois<P: AsRef<Path>>(images: &[P], rois: &[Roi]) -> RoiMap {
    images
        .iter()
        .map(|p| (p.as_ref().to_string_lossy().into_owned(), rois.to_vec()))
        .collect()
}
