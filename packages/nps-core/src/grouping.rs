//! Study/series discovery and association of ROI keys with discovered files.
//!
//! A study is a directory whose subdirectories (the series) hold the image
//! files. Every level is ordered by [`natural_cmp`].

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::config::MatchMode;
use crate::error::{NpsError, NpsResult};
use crate::roi::{Roi, RoiMap};

#[derive(Debug, PartialEq, Eq)]
enum Chunk<'a> {
    Number(&'a str),
    Text(&'a str),
}

fn chunks(s: &str) -> Vec<Chunk<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_digits: Option<bool> = None;
    for (i, ch) in s.char_indices() {
        let digit = ch.is_ascii_digit();
        match in_digits {
            Some(d) if d != digit => {
                out.push(make_chunk(&s[start..i], d));
                start = i;
            }
            _ => {}
        }
        in_digits = Some(digit);
    }
    if let Some(d) = in_digits {
        out.push(make_chunk(&s[start..], d));
    }
    out
}

fn make_chunk(s: &str, digits: bool) -> Chunk<'_> {
    if digits {
        Chunk::Number(s)
    } else {
        Chunk::Text(s)
    }
}

fn cmp_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn cmp_chunks(a: &str, b: &str) -> Ordering {
    let (ca, cb) = (chunks(a), chunks(b));
    for (x, y) in ca.iter().zip(&cb) {
        let ord = match (x, y) {
            (Chunk::Number(x), Chunk::Number(y)) => cmp_numeric(x, y),
            (Chunk::Text(x), Chunk::Text(y)) => x.cmp(y),
            (Chunk::Number(_), Chunk::Text(_)) => Ordering::Less,
            (Chunk::Text(_), Chunk::Number(_)) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    ca.len().cmp(&cb.len())
}

/// Token after the final underscore, or the whole string.
fn sort_token(s: &str) -> &str {
    s.rsplit('_').next().unwrap_or(s)
}

/// Version-aware ordering on the token after the final underscore, so that
/// `scan_2` sorts before `scan_10`. Ties fall back to the whole string.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    cmp_chunks(sort_token(a), sort_token(b)).then_with(|| cmp_chunks(a, b))
}

fn path_cmp(a: &Path, b: &Path) -> Ordering {
    natural_cmp(&a.to_string_lossy(), &b.to_string_lossy())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub path: PathBuf,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Study {
    pub path: PathBuf,
    pub series: Vec<Series>,
}

/// Study -> series -> files, as found on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StudyTree {
    studies: Vec<Study>,
}

impl StudyTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walks `root` and collects every file whose name contains one of
    /// `extensions` (case-insensitive). The containing directory is the
    /// series, its parent the study.
    pub fn discover<P: AsRef<Path>>(root: P, extensions: &[String]) -> NpsResult<Self> {
        let root = root.as_ref();
        let extensions: Vec<String> = extensions.iter().map(|e| e.to_lowercase()).collect();
        let mut tree = StudyTree::new();

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|source| NpsError::Walk {
                path: root.to_path_buf(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if !extensions.iter().any(|ext| name.contains(ext.as_str())) {
                continue;
            }
            let path = entry.path();
            let Some(series_dir) = path.parent() else {
                continue;
            };
            let series_name = series_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let study = series_dir.parent().unwrap_or(series_dir);
            tree.insert(study, &series_name, path);
        }

        tree.sort();
        log::info!(
            "Discovered {} files in {} studies under {:?}",
            tree.files().count(),
            tree.studies.len(),
            root
        );
        Ok(tree)
    }

    /// Adds one file. Call [`StudyTree::sort`] after the last insertion.
    pub fn insert<P: Into<PathBuf>, F: Into<PathBuf>>(&mut self, study: P, series: &str, file: F) {
        let study_path = study.into();
        let index = match self.studies.iter().position(|s| s.path == study_path) {
            Some(i) => i,
            None => {
                self.studies.push(Study {
                    path: study_path.clone(),
                    series: Vec::new(),
                });
                self.studies.len() - 1
            }
        };
        let study = &mut self.studies[index];
        match study.series.iter_mut().find(|s| s.name == series) {
            Some(s) => s.files.push(file.into()),
            None => study.series.push(Series {
                name: series.to_string(),
                path: study_path.join(series),
                files: vec![file.into()],
            }),
        }
    }

    /// Puts studies, series and files into natural order.
    pub fn sort(&mut self) {
        for study in &mut self.studies {
            for series in &mut study.series {
                series.files.sort_by(|a, b| path_cmp(a, b));
            }
            study.series.sort_by(|a, b| natural_cmp(&a.name, &b.name));
        }
        self.studies.sort_by(|a, b| path_cmp(&a.path, &b.path));
    }

    /// Drops `start` files from the front and `end` files from the back of
    /// every series. A series too short for the exclusion is kept whole.
    pub fn exclude(&mut self, start: usize, end: usize) {
        if start == 0 && end == 0 {
            return;
        }
        for series in self.studies.iter_mut().flat_map(|s| s.series.iter_mut()) {
            let len = series.files.len();
            if start + end >= len {
                log::warn!(
                    "Series {:?} has {} files, not more than the {} to exclude; keeping all",
                    series.path,
                    len,
                    start + end
                );
                continue;
            }
            series.files.truncate(len - end);
            series.files.drain(..start);
        }
    }

    pub fn studies(&self) -> &[Study] {
        &self.studies
    }

    pub fn files(&self) -> impl Iterator<Item = &PathBuf> + '_ {
        self.studies
            .iter()
            .flat_map(|s| s.series.iter())
            .flat_map(|s| s.files.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.studies.is_empty()
    }
}

/// One image of a series with the ROIs to analyse on it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoiImage {
    /// Key of the ROI mapping that matched.
    pub key: String,
    /// Discovered file the key matched.
    pub path: PathBuf,
    pub rois: Vec<Roi>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoiSeries {
    pub name: String,
    pub path: PathBuf,
    pub images: Vec<RoiImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoiStudy {
    pub path: PathBuf,
    pub series: Vec<RoiSeries>,
}

/// ROI lists arranged as study -> series -> image, naturally ordered.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SortedRoiMap {
    pub studies: Vec<RoiStudy>,
}

impl SortedRoiMap {
    pub fn series_count(&self) -> usize {
        self.studies.iter().map(|s| s.series.len()).sum()
    }

    pub fn image_count(&self) -> usize {
        self.studies
            .iter()
            .flat_map(|s| s.series.iter())
            .map(|s| s.images.len())
            .sum()
    }
}

fn key_matches(key: &str, file: &Path, mode: MatchMode) -> bool {
    let full = file.to_string_lossy();
    match mode {
        MatchMode::Substring => full.contains(key),
        MatchMode::Exact => {
            full == key
                || file
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy() == key)
        }
    }
}

/// Assigns every ROI key to each series holding a matching file.
///
/// A key may land in several series. Studies and series without any match
/// are left out.
pub fn sort_roi_map(tree: &StudyTree, rois: &RoiMap, mode: MatchMode) -> SortedRoiMap {
    let mut keys: Vec<&String> = rois.keys().collect();
    keys.sort_by(|a, b| natural_cmp(a, b));

    let mut studies = Vec::new();
    for study in tree.studies() {
        let mut series_out = Vec::new();
        for series in &study.series {
            let images: Vec<RoiImage> = keys
                .iter()
                .filter_map(|key| {
                    let file = series.files.iter().find(|f| key_matches(key, f, mode))?;
                    Some(RoiImage {
                        key: (*key).clone(),
                        path: file.clone(),
                        rois: rois[*key].clone(),
                    })
                })
                .collect();
            if !images.is_empty() {
                series_out.push(RoiSeries {
                    name: series.name.clone(),
                    path: series.path.clone(),
                    images,
                });
            }
        }
        if !series_out.is_empty() {
            studies.push(RoiStudy {
                path: study.path.clone(),
                series: series_out,
            });
        }
    }

    let unmatched = keys
        .iter()
        .filter(|k| !tree.files().any(|f| key_matches(k, f, mode)))
        .count();
    if unmatched > 0 {
        log::warn!("{} ROI keys did not match any discovered file", unmatched);
    }

    SortedRoiMap { studies }
}
