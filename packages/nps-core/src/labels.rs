//! Human-readable study and series names used in result file names.
//!
//! Two folder layouts are supported. In the first one directory names are
//! used verbatim. Otherwise study folders carry a ` - <number>` suffix and
//! series folders a `<prefix>_` in front, both of which are dropped.
//! Shortened names that collide fall back to the folder name, see [`LabelSet`].

use std::collections::HashSet;
use std::path::Path;

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// Length in chars of the first ` - <digits>` occurrence.
fn numbered_suffix_len(chars: &[char]) -> Option<usize> {
    (0..chars.len()).find_map(|i| {
        if !chars[i..].starts_with(&[' ', '-', ' ']) {
            return None;
        }
        let digits = chars[i + 3..]
            .iter()
            .take_while(|c| c.is_ascii_digit())
            .count();
        (digits > 0).then_some(3 + digits)
    })
}

/// Length in chars of the leading word run up to and including its last
/// underscore, taken from the first word run that contains one.
fn prefix_len(chars: &[char]) -> Option<usize> {
    let mut i = 0;
    while i < chars.len() {
        if !is_word_char(chars[i]) {
            i += 1;
            continue;
        }
        let run_end = chars[i..]
            .iter()
            .position(|&c| !is_word_char(c))
            .map_or(chars.len(), |p| i + p);
        if let Some(last) = chars[i..run_end].iter().rposition(|&c| c == '_') {
            return Some(last + 1);
        }
        i = run_end;
    }
    None
}

/// Study name as shown in output paths.
pub fn study_label(study: &Path, first_layout: bool) -> String {
    let name = study
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| study.to_string_lossy().into_owned());
    if first_layout {
        return name;
    }
    let chars: Vec<char> = name.chars().collect();
    match numbered_suffix_len(&chars) {
        Some(len) if len < chars.len() => chars[..chars.len() - len].iter().collect(),
        _ => name,
    }
}

/// Series name as shown in output paths and summary rows.
pub fn series_label(series: &str, first_layout: bool) -> String {
    if first_layout {
        return series.to_string();
    }
    let chars: Vec<char> = series.chars().collect();
    match prefix_len(&chars) {
        Some(len) if len < chars.len() => chars[len..].iter().collect(),
        _ => series.to_string(),
    }
}

/// Labels already handed out within one output directory.
#[derive(Debug, Default)]
pub struct LabelSet {
    taken: HashSet<String>,
}

impl LabelSet {
    /// Reserves `label`, or `raw` if `label` is taken, or `raw.<n>` with the
    /// smallest free `n` if both are.
    pub fn claim(&mut self, label: String, raw: &str) -> String {
        if self.taken.insert(label.clone()) {
            return label;
        }
        let claimed = if self.taken.insert(raw.to_string()) {
            raw.to_string()
        } else {
            let mut n = 2;
            while self.taken.contains(&format!("{}.{}", raw, n)) {
                n += 1;
            }
            let indexed = format!("{}.{}", raw, n);
            self.taken.insert(indexed.clone());
            indexed
        };
        log::warn!("Label {:?} is already used, writing {:?} as {:?}", label, raw, claimed);
        claimed
    }
}
