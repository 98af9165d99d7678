use std::path::Path;

use serde::{Deserialize, Serialize};

use super::model::{is_bad, SpecData};
use crate::error::{Result, SplatError};

// ---------------------------------------------------------------------------
// Coordinate ranges
// ---------------------------------------------------------------------------

/// A closed interval of spectral coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordRange {
    pub lower: f64,
    pub upper: f64,
    #[serde(default)]
    pub selected: bool,
}

impl CoordRange {
    /// Build a range; the ends are swapped when given reversed.
    pub fn new(a: f64, b: f64) -> Self {
        CoordRange {
            lower: a.min(b),
            upper: a.max(b),
            selected: false,
        }
    }

    pub fn contains(&self, x: f64) -> bool {
        x >= self.lower && x <= self.upper
    }

    pub fn as_pair(&self) -> [f64; 2] {
        [self.lower, self.upper]
    }
}

/// The ranges drawn over a plot: line regions, continuum regions, filter
/// regions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RangeList {
    ranges: Vec<CoordRange>,
}

impl RangeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: &[[f64; 2]]) -> Self {
        RangeList {
            ranges: pairs.iter().map(|p| CoordRange::new(p[0], p[1])).collect(),
        }
    }

    pub fn add(&mut self, range: CoordRange) {
        self.ranges.push(range);
    }

    pub fn remove(&mut self, index: usize) -> Option<CoordRange> {
        (index < self.ranges.len()).then(|| self.ranges.remove(index))
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CoordRange> {
        self.ranges.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut CoordRange> {
        self.ranges.iter_mut()
    }

    /// Coordinate pairs of all ranges, or only of the selected ones.
    pub fn coords(&self, selected_only: bool) -> Vec<[f64; 2]> {
        self.ranges
            .iter()
            .filter(|r| !selected_only || r.selected)
            .map(CoordRange::as_pair)
            .collect()
    }

    /// Map each range onto an inclusive pair of indices into `x` using the
    /// nearest coordinate to each end.
    pub fn index_pairs(&self, x: &[f64], selected_only: bool) -> Vec<(usize, usize)> {
        if x.is_empty() {
            return Vec::new();
        }
        self.ranges
            .iter()
            .filter(|r| !selected_only || r.selected)
            .map(|r| {
                let a = lookup(r.lower, x);
                let b = lookup(r.upper, x);
                // Reversed for decreasing coordinates.
                (a.min(b), a.max(b))
            })
            .collect()
    }
}

/// Index of the array value nearest to `value`. The array must be sorted,
/// increasing or decreasing.
pub fn lookup(value: f64, array: &[f64]) -> usize {
    let mut low = 0;
    let mut high = array.len() - 1;
    let inc = array[0] < array[high];

    while low + 1 < high {
        let mid = (low + high) / 2;
        let v = array[mid];
        if value == v {
            low = mid;
            break;
        }
        if (value < v) == inc {
            high = mid;
        } else {
            low = mid;
        }
    }

    if (value - array[low]).abs() <= (array[high] - value).abs() {
        low
    } else {
        high
    }
}

/// Read ranges from a text file: two fields per row separated by whitespace
/// or commas. Lines starting with `#` and blank lines are ignored.
pub fn read_ranges_file(path: &Path) -> Result<RangeList> {
    let text = std::fs::read_to_string(path)?;
    parse_ranges(&text).map_err(|(line, message)| SplatError::RangesFile {
        path: path.to_path_buf(),
        line,
        message,
    })
}

fn parse_ranges(text: &str) -> std::result::Result<RangeList, (usize, String)> {
    let mut list = RangeList::new();
    for (no, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|f| !f.is_empty())
            .collect();
        if fields.len() != 2 {
            return Err((
                no + 1,
                format!("expected two fields, found {}", fields.len()),
            ));
        }
        let mut pair = [0.0; 2];
        for (slot, field) in pair.iter_mut().zip(&fields) {
            *slot = field
                .parse()
                .map_err(|_| (no + 1, format!("'{field}' is not a number")))?;
        }
        list.add(CoordRange::new(pair[0], pair[1]));
    }
    Ok(list)
}

// ---------------------------------------------------------------------------
// Extraction of valid data
// ---------------------------------------------------------------------------

/// Background to remove before fitting.
#[derive(Debug, Clone, Copy)]
pub enum Background<'a> {
    None,
    /// Values at the same coordinates as the spectrum.
    Values(&'a [f64]),
    Constant(f64),
}

impl Background<'_> {
    fn at(&self, i: usize) -> Option<f64> {
        match self {
            Background::None => Some(0.0),
            Background::Values(v) => Some(v[i]).filter(|b| !is_bad(*b)),
            Background::Constant(c) => Some(*c),
        }
    }

    fn is_none(&self) -> bool {
        matches!(self, Background::None)
    }
}

/// Compacted valid samples of a spectrum region.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extract {
    pub x: Vec<f64>,
    /// Data values, background subtracted when a background was given.
    pub y: Vec<f64>,
    /// `1 / err²`, present when errors were given.
    pub weights: Option<Vec<f64>>,
    /// Background at each extracted sample, present when one was given.
    pub background: Option<Vec<f64>>,
}

impl Extract {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

/// Extract the valid samples between two indices (inclusive). A sample is
/// kept when its coordinate, data value and background are all good, and,
/// when errors are given, its error is positive.
pub fn extract_line_data(
    lower: usize,
    upper: usize,
    x: &[f64],
    y: &[f64],
    errors: Option<&[f64]>,
    background: Background<'_>,
) -> Extract {
    extract_ranges_data(&[(lower, upper)], x, y, errors, background)
}

/// [`extract_line_data`] over several index pairs, concatenated in order.
pub fn extract_ranges_data(
    pairs: &[(usize, usize)],
    x: &[f64],
    y: &[f64],
    errors: Option<&[f64]>,
    background: Background<'_>,
) -> Extract {
    let mut out = Extract {
        weights: errors.map(|_| Vec::new()),
        background: (!background.is_none()).then(Vec::new),
        ..Extract::default()
    };

    let n = x.len().min(y.len());
    for &(lower, upper) in pairs {
        if n == 0 || lower >= n {
            continue;
        }
        for j in lower..=upper.min(n - 1) {
            if is_bad(x[j]) || is_bad(y[j]) {
                continue;
            }
            let Some(back) = background.at(j) else {
                continue;
            };
            let weight = match errors {
                Some(e) => {
                    let err = e[j];
                    if is_bad(err) || err <= 0.0 {
                        continue;
                    }
                    Some(1.0 / (err * err))
                }
                None => None,
            };

            out.x.push(x[j]);
            out.y.push(y[j] - back);
            if let (Some(w), Some(ws)) = (weight, out.weights.as_mut()) {
                ws.push(w);
            }
            if let Some(bs) = out.background.as_mut() {
                bs.push(back);
            }
        }
    }
    out
}

/// Valid (non-BAD) samples of a spectrum inside index pairs, with errors
/// when the spectrum has them. Used for region statistics.
pub fn clean_data(spec: &SpecData, pairs: &[(usize, usize)]) -> (Vec<f64>, Vec<f64>, Option<Vec<f64>>) {
    let x = spec.x_data();
    let y = spec.y_data();
    let errors = spec.y_errors();
    let mut cx = Vec::new();
    let mut cy = Vec::new();
    let mut ce = errors.map(|_| Vec::new());

    for &(lower, upper) in pairs {
        if lower >= y.len() {
            continue;
        }
        for j in lower..=upper.min(y.len() - 1) {
            if is_bad(y[j]) {
                continue;
            }
            cx.push(x[j]);
            cy.push(y[j]);
            if let (Some(ce), Some(e)) = (ce.as_mut(), errors) {
                ce.push(e[j]);
            }
        }
    }
    (cx, cy, ce)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::BAD;

    #[test]
    fn lookup_finds_nearest_index() {
        let inc = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(lookup(2.2, &inc), 1);
        assert_eq!(lookup(2.8, &inc), 2);
        assert_eq!(lookup(-3.0, &inc), 0);
        assert_eq!(lookup(99.0, &inc), 4);

        let dec = [5.0, 4.0, 3.0, 2.0, 1.0];
        assert_eq!(lookup(2.2, &dec), 3);
        assert_eq!(lookup(4.0, &dec), 1);
    }

    #[test]
    fn index_pairs_are_ordered_for_decreasing_coords() {
        let x = [10.0, 9.0, 8.0, 7.0, 6.0];
        let ranges = RangeList::from_pairs(&[[7.0, 9.0]]);
        assert_eq!(ranges.index_pairs(&x, false), vec![(1, 3)]);
    }

    #[test]
    fn selected_ranges_only() {
        let mut ranges = RangeList::from_pairs(&[[1.0, 2.0], [5.0, 6.0]]);
        if let Some(r) = ranges.iter_mut().nth(1) {
            r.selected = true;
        }
        assert_eq!(ranges.coords(true), vec![[5.0, 6.0]]);
        assert_eq!(ranges.coords(false).len(), 2);
    }

    #[test]
    fn parse_ranges_accepts_commas_and_comments() {
        let list = parse_ranges("# lines\n4000 4100\n\n5000,4900\n").unwrap();
        assert_eq!(list.coords(false), vec![[4000.0, 4100.0], [4900.0, 5000.0]]);
    }

    #[test]
    fn parse_ranges_rejects_wrong_field_count() {
        let err = parse_ranges("1 2\n3 4 5\n").unwrap_err();
        assert_eq!(err.0, 2);
    }

    #[test]
    fn extract_skips_bad_and_subtracts_background() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [10.0, BAD, 12.0, 13.0, 14.0];
        let back = [1.0, 1.0, BAD, 2.0, 2.0];
        let errors = [1.0, 1.0, 1.0, 0.5, 0.0];

        let ex = extract_line_data(0, 4, &x, &y, Some(&errors), Background::Values(&back));
        assert_eq!(ex.x, vec![1.0, 4.0]);
        assert_eq!(ex.y, vec![9.0, 11.0]);
        assert_eq!(ex.weights.unwrap(), vec![1.0, 4.0]);
        assert_eq!(ex.background.unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn extract_without_errors_or_background() {
        let x = [1.0, 2.0, 3.0];
        let y = [BAD, BAD, BAD];
        let ex = extract_line_data(0, 10, &x, &y, None, Background::None);
        assert!(ex.is_empty());
        assert!(ex.weights.is_none());
        assert!(ex.background.is_none());
    }

    #[test]
    fn extract_constant_background_over_many_ranges() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let y = [5.0; 6];
        let ex = extract_ranges_data(&[(0, 1), (4, 5)], &x, &y, None, Background::Constant(2.0));
        assert_eq!(ex.x, vec![1.0, 2.0, 5.0, 6.0]);
        assert!(ex.y.iter().all(|&v| v == 3.0));
    }
}
