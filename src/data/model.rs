use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SplatError};

// ---------------------------------------------------------------------------
// BAD sentinel
// ---------------------------------------------------------------------------

/// Sentinel marking a missing or invalid sample.
pub const BAD: f64 = -f64::MAX;

/// Fractional slack added to the y extent of [`SpecData::full_range`].
const SLACK: f64 = 0.02;

/// Whether a value should be treated as missing. NaN from foreign formats
/// counts as BAD too.
#[inline]
pub fn is_bad(v: f64) -> bool {
    v == BAD || v.is_nan()
}

// ---------------------------------------------------------------------------
// MetadataValue – a single spectrum property
// ---------------------------------------------------------------------------

/// A dynamically-typed property attached to a spectrum (object name,
/// exposure, observation date...). Must be `Ord` so it can live in sorted
/// maps and sets.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    /// ISO-8601 date string kept as text for simplicity.
    Date(String),
    Null,
}

// -- Manual Eq/Ord so MetadataValue can be sorted --

impl Eq for MetadataValue {}

impl PartialOrd for MetadataValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MetadataValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use MetadataValue::*;
        fn discriminant(v: &MetadataValue) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
                Date(_) => 5,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) | (Date(a), Date(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::String(s) => write!(f, "{s}"),
            MetadataValue::Integer(i) => write!(f, "{i}"),
            MetadataValue::Float(v) => write!(f, "{v:.4}"),
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::Date(d) => write!(f, "{d}"),
            MetadataValue::Null => write!(f, "<null>"),
        }
    }
}

// ---------------------------------------------------------------------------
// SpecType – what a spectrum represents
// ---------------------------------------------------------------------------

/// Classification of a spectrum. Fits and polynomials are produced by the
/// analysis tools and are normally excluded from auto-ranging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpecType {
    #[default]
    Unclassified,
    Target,
    Arc,
    Sky,
    Polynomial,
    LineFit,
    UserType,
}

impl fmt::Display for SpecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SpecType::Unclassified => "unclassified",
            SpecType::Target => "target",
            SpecType::Arc => "arc",
            SpecType::Sky => "sky",
            SpecType::Polynomial => "polynomial",
            SpecType::LineFit => "line fit",
            SpecType::UserType => "user",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// SpecData – one spectrum
// ---------------------------------------------------------------------------

/// A single 1-D spectrum: coordinates, data values and optional errors.
///
/// Coordinates are expected to be monotonic, either increasing or
/// decreasing. Any value may be [`BAD`].
#[derive(Debug, Clone)]
pub struct SpecData {
    pub short_name: String,
    /// Usually the file the spectrum came from.
    pub full_name: String,
    x: Vec<f64>,
    y: Vec<f64>,
    errors: Option<Vec<f64>>,
    pub spec_type: SpecType,
    pub use_in_auto_ranging: bool,
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl SpecData {
    /// Create a spectrum from coordinates and data values.
    pub fn new(name: impl Into<String>, x: Vec<f64>, y: Vec<f64>) -> Result<Self> {
        let name = name.into();
        if x.is_empty() {
            return Err(SplatError::EmptySpectrum(name));
        }
        if x.len() != y.len() {
            return Err(SplatError::LengthMismatch {
                what: "data values",
                expected: x.len(),
                got: y.len(),
            });
        }
        Ok(SpecData {
            full_name: name.clone(),
            short_name: name,
            x,
            y,
            errors: None,
            spec_type: SpecType::Unclassified,
            use_in_auto_ranging: true,
            metadata: BTreeMap::new(),
        })
    }

    /// Attach data errors.
    pub fn with_errors(mut self, errors: Vec<f64>) -> Result<Self> {
        if errors.len() != self.x.len() {
            return Err(SplatError::LengthMismatch {
                what: "data errors",
                expected: self.x.len(),
                got: errors.len(),
            });
        }
        self.errors = Some(errors);
        Ok(self)
    }

    /// Set the spectrum type, builder style.
    pub fn with_type(mut self, spec_type: SpecType) -> Self {
        self.spec_type = spec_type;
        if matches!(spec_type, SpecType::LineFit | SpecType::Polynomial) {
            self.use_in_auto_ranging = false;
        }
        self
    }

    /// Create a spectrum that shares these coordinates but has new values.
    pub fn derive(
        &self,
        name: impl Into<String>,
        y: Vec<f64>,
        errors: Option<Vec<f64>>,
    ) -> Result<SpecData> {
        let spec = SpecData::new(name, self.x.clone(), y)?;
        match errors {
            Some(e) => spec.with_errors(e),
            None => Ok(spec),
        }
    }

    pub fn x_data(&self) -> &[f64] {
        &self.x
    }

    pub fn y_data(&self) -> &[f64] {
        &self.y
    }

    pub fn y_errors(&self) -> Option<&[f64]> {
        self.errors.as_deref()
    }

    pub fn have_errors(&self) -> bool {
        self.errors.is_some()
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Always false for a constructed spectrum, kept for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Whether coordinates increase with index.
    pub fn increases(&self) -> bool {
        increases(&self.x)
    }

    // -- Editing --

    /// Replace all data. Errors are dropped unless given.
    pub fn set_data(&mut self, x: Vec<f64>, y: Vec<f64>, errors: Option<Vec<f64>>) -> Result<()> {
        let mut spec = SpecData::new(self.short_name.clone(), x, y)?;
        if let Some(e) = errors {
            spec = spec.with_errors(e)?;
        }
        self.x = spec.x;
        self.y = spec.y;
        self.errors = spec.errors;
        Ok(())
    }

    pub fn set_x_value(&mut self, index: usize, value: f64) -> Result<()> {
        let len = self.x.len();
        let slot = self
            .x
            .get_mut(index)
            .ok_or(SplatError::IndexOutOfBounds { index, len })?;
        *slot = value;
        Ok(())
    }

    pub fn set_y_value(&mut self, index: usize, value: f64) -> Result<()> {
        let len = self.y.len();
        let slot = self
            .y
            .get_mut(index)
            .ok_or(SplatError::IndexOutOfBounds { index, len })?;
        *slot = value;
        Ok(())
    }

    /// Set one error value. Fails when the spectrum has no errors.
    pub fn set_error_value(&mut self, index: usize, value: f64) -> Result<()> {
        let len = self.x.len();
        let errors = self.errors.as_mut().ok_or_else(|| {
            SplatError::InvalidParameter(format!("'{}' has no errors", self.short_name))
        })?;
        let slot = errors
            .get_mut(index)
            .ok_or(SplatError::IndexOutOfBounds { index, len })?;
        *slot = value;
        Ok(())
    }

    // -- Coordinate transforms --

    /// Copy with coordinates mapped by `x' = scale * x + offset`. BAD
    /// coordinates stay BAD; values, errors and metadata are kept.
    pub fn transformed(&self, name: impl Into<String>, scale: f64, offset: f64) -> Result<SpecData> {
        let x = self
            .x
            .iter()
            .map(|&x| if is_bad(x) { BAD } else { scale * x + offset })
            .collect();
        let mut spec = SpecData::new(name, x, self.y.clone())?;
        spec.errors = self.errors.clone();
        spec.metadata = self.metadata.clone();
        Ok(spec)
    }

    /// Plain copy named `Copy of: <name>`.
    pub fn copy_of(&self) -> Result<SpecData> {
        self.transformed(format!("Copy of: {}", self.short_name), 1.0, 0.0)
    }

    /// Copy mirrored about coordinate `centre`, named `Flip of: <name>`.
    pub fn flipped(&self, centre: f64) -> Result<SpecData> {
        self.transformed(format!("Flip of: {}", self.short_name), -1.0, 2.0 * centre)
    }

    /// Shift all valid coordinates by `offset` in place.
    pub fn translate(&mut self, offset: f64) {
        for x in self.x.iter_mut().filter(|x| !is_bad(**x)) {
            *x += offset;
        }
    }

    // -- Ranges --

    /// Data extent `[xmin, xmax, ymin, ymax]` over samples with valid data.
    pub fn range(&self) -> [f64; 4] {
        let (range, _) = self.ranges();
        range
    }

    /// Like [`range`](Self::range) but the y extent includes half the error
    /// bars and some slack so error bars do not touch plot edges.
    pub fn full_range(&self) -> [f64; 4] {
        let (_, full) = self.ranges();
        full
    }

    fn ranges(&self) -> ([f64; 4], [f64; 4]) {
        let mut x_min = f64::MAX;
        let mut x_max = -f64::MAX;
        let mut y_min = f64::MAX;
        let mut y_max = -f64::MAX;
        let mut full_y_min = f64::MAX;
        let mut full_y_max = -f64::MAX;

        for i in 0..self.y.len() {
            let (x, y) = (self.x[i], self.y[i]);
            if is_bad(y) || is_bad(x) {
                continue;
            }
            x_min = x_min.min(x);
            x_max = x_max.max(x);
            y_min = y_min.min(y);
            y_max = y_max.max(y);

            let half_err = match &self.errors {
                Some(e) if !is_bad(e[i]) => e[i] * 0.5,
                _ => 0.0,
            };
            full_y_min = full_y_min.min(y - half_err);
            full_y_max = full_y_max.max(y + half_err);
        }
        if x_min == f64::MAX {
            x_min = 0.0;
        }
        if x_max == -f64::MAX {
            x_max = 0.0;
        }

        let range = [x_min, x_max, y_min, y_max];
        let slack = (full_y_max - full_y_min) * SLACK;
        let full = [x_min, x_max, full_y_min - slack, full_y_max + slack];
        (range, full)
    }

    /// Indices of the two coordinates that bracket `xcoord`. Exact matches
    /// and values off either end return the same index twice.
    pub fn bound(&self, xcoord: f64) -> (usize, usize) {
        let xs = &self.x;
        let mut low = 0;
        let mut high = xs.len() - 1;
        let inc = xs[low] < xs[high];

        if (inc && xcoord < xs[low]) || (!inc && xcoord > xs[low]) {
            high = low;
        } else if (inc && xcoord > xs[high]) || (!inc && xcoord < xs[high]) {
            low = high;
        } else {
            while low + 1 < high {
                let mid = (low + high) / 2;
                let v = xs[mid];
                if v == xcoord {
                    low = mid;
                    high = mid;
                    break;
                }
                if (xcoord < v) == inc {
                    high = mid;
                } else {
                    low = mid;
                }
            }
            if xs[low] == xcoord {
                high = low;
            } else if xs[high] == xcoord {
                low = high;
            }
        }
        (low, high)
    }

    /// Value of the spectrum at an arbitrary coordinate, linearly
    /// interpolated. BAD when either neighbour is BAD.
    pub fn eval_y(&self, x: f64) -> f64 {
        let (low, high) = self.bound(x);
        if low == high {
            return self.y[low];
        }
        let (y0, y1) = (self.y[low], self.y[high]);
        if is_bad(y0) || is_bad(y1) {
            return BAD;
        }
        let (x0, x1) = (self.x[low], self.x[high]);
        let m = (y0 - y1) / (x0 - x1);
        x * m + (y0 - x0 * m)
    }

    /// [`eval_y`](Self::eval_y) over many coordinates.
    pub fn eval_y_array(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.eval_y(x)).collect()
    }

    /// Index spans covered by coordinate ranges given as `[lo, hi]` pairs,
    /// sorted and with overlaps merged.
    pub fn spans(&self, ranges: &[[f64; 2]]) -> Vec<(usize, usize)> {
        let mut spans: Vec<(usize, usize)> = ranges
            .iter()
            .filter_map(|r| index_span(&self.x, r[0].min(r[1]), r[0].max(r[1])))
            .collect();
        spans.sort_unstable();

        let mut merged: Vec<(usize, usize)> = Vec::with_capacity(spans.len());
        for (lo, hi) in spans {
            match merged.last_mut() {
                Some(last) if lo <= last.1 + 1 => last.1 = last.1.max(hi),
                _ => merged.push((lo, hi)),
            }
        }
        merged
    }

    /// New spectrum holding only the samples inside `ranges`. Sections are
    /// separated by a single BAD sample placed midway between them.
    /// `None` when no samples lie inside any range.
    pub fn sect(&self, name: &str, ranges: &[[f64; 2]]) -> Option<SpecData> {
        let spans = self.spans(ranges);
        if spans.is_empty() {
            return None;
        }

        let mut x = Vec::new();
        let mut y = Vec::new();
        let mut e = self.errors.as_ref().map(|_| Vec::new());
        let mut prev_end: Option<usize> = None;

        for (lo, hi) in spans {
            if let Some(pe) = prev_end {
                x.push(self.x[pe] + (self.x[lo] - self.x[pe]) * 0.5);
                y.push(BAD);
                if let Some(e) = e.as_mut() {
                    e.push(BAD);
                }
            }
            x.extend_from_slice(&self.x[lo..=hi]);
            y.extend_from_slice(&self.y[lo..=hi]);
            if let (Some(e), Some(src)) = (e.as_mut(), self.errors.as_ref()) {
                e.extend_from_slice(&src[lo..=hi]);
            }
            prev_end = Some(hi);
        }
        self.new_section(name, x, y, e)
    }

    /// New spectrum with the samples inside `ranges` removed. Each removed
    /// range is replaced by one BAD sample to show the break. `None` when
    /// everything would be removed.
    pub fn subset(&self, name: &str, ranges: &[[f64; 2]]) -> Option<SpecData> {
        let spans = self.spans(ranges);
        let deleted: usize = spans.iter().map(|(lo, hi)| hi - lo + 1).sum();
        if deleted >= self.x.len() {
            return None;
        }

        let mut x = Vec::new();
        let mut y = Vec::new();
        let mut e = self.errors.as_ref().map(|_| Vec::new());
        let mut spans = spans.into_iter().peekable();
        let mut i = 0;

        while i < self.x.len() {
            if let Some(&(lo, hi)) = spans.peek() {
                if i == lo {
                    x.push(self.x[i]);
                    y.push(BAD);
                    if let Some(e) = e.as_mut() {
                        e.push(BAD);
                    }
                    i = hi + 1;
                    spans.next();
                    continue;
                }
            }
            x.push(self.x[i]);
            y.push(self.y[i]);
            if let (Some(e), Some(src)) = (e.as_mut(), self.errors.as_ref()) {
                e.push(src[i]);
            }
            i += 1;
        }
        self.new_section(name, x, y, e)
    }

    fn new_section(
        &self,
        name: &str,
        x: Vec<f64>,
        y: Vec<f64>,
        e: Option<Vec<f64>>,
    ) -> Option<SpecData> {
        let spec = SpecData::new(name, x, y).ok()?;
        let mut spec = match e {
            Some(e) => spec.with_errors(e).ok()?,
            None => spec,
        };
        spec.metadata = self.metadata.clone();
        Some(spec)
    }
}

// ---------------------------------------------------------------------------
// Coordinate helpers
// ---------------------------------------------------------------------------

/// Whether the coordinates increase with index (single values count as
/// increasing).
pub fn increases(xs: &[f64]) -> bool {
    xs.len() < 2 || xs[0] <= xs[xs.len() - 1]
}

/// Inclusive index span of the samples with `lo <= x <= hi` in a monotonic
/// coordinate array.
pub fn index_span(xs: &[f64], lo: f64, hi: f64) -> Option<(usize, usize)> {
    let (start, end) = if increases(xs) {
        (xs.partition_point(|&v| v < lo), xs.partition_point(|&v| v <= hi))
    } else {
        (xs.partition_point(|&v| v > hi), xs.partition_point(|&v| v >= lo))
    };
    (start < end).then(|| (start, end - 1))
}

// ---------------------------------------------------------------------------
// BAD-aware arithmetic
// ---------------------------------------------------------------------------

/// Element-wise `one - two`; BAD where either input is BAD.
pub fn subtract_data(one: &[f64], two: &[f64]) -> Vec<f64> {
    one.iter()
        .zip(two)
        .map(|(&a, &b)| if is_bad(a) || is_bad(b) { BAD } else { a - b })
        .collect()
}

/// Element-wise `data / divisor` with errors scaled the same way. Zero and
/// BAD divisors produce BAD.
pub fn divide_data(
    data: &[f64],
    errors: Option<&[f64]>,
    divisor: &[f64],
) -> (Vec<f64>, Option<Vec<f64>>) {
    let ok = |i: usize| {
        !is_bad(data[i])
            && !is_bad(divisor[i])
            && divisor[i] != 0.0
            && errors.map_or(true, |e| !is_bad(e[i]))
    };

    let n = data.len().min(divisor.len());
    let values = (0..n)
        .map(|i| if ok(i) { data[i] / divisor[i] } else { BAD })
        .collect();
    let errs = errors.map(|e| {
        (0..n)
            .map(|i| if ok(i) { e[i] / divisor[i] } else { BAD })
            .collect()
    });
    (values, errs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> SpecData {
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let y: Vec<f64> = (0..n).map(|i| 10.0 + i as f64).collect();
        SpecData::new("ramp", x, y).unwrap()
    }

    #[test]
    fn new_rejects_mismatched_lengths() {
        let err = SpecData::new("bad", vec![1.0, 2.0], vec![1.0]).unwrap_err();
        assert!(matches!(err, SplatError::LengthMismatch { .. }));
        assert!(SpecData::new("empty", vec![], vec![]).is_err());
    }

    #[test]
    fn range_skips_bad_values() {
        let spec = SpecData::new("s", vec![1.0, 2.0, 3.0], vec![5.0, BAD, -1.0]).unwrap();
        assert_eq!(spec.range(), [1.0, 3.0, -1.0, 5.0]);
    }

    #[test]
    fn full_range_includes_half_errors_and_slack() {
        let spec = SpecData::new("s", vec![1.0, 2.0], vec![0.0, 10.0])
            .unwrap()
            .with_errors(vec![2.0, 2.0])
            .unwrap();
        let full = spec.full_range();
        // -1..11 plus 2% slack of the 12 unit extent
        assert!((full[2] - (-1.24)).abs() < 1e-12);
        assert!((full[3] - 11.24).abs() < 1e-12);
    }

    #[test]
    fn bound_handles_both_directions() {
        let spec = ramp(10);
        assert_eq!(spec.bound(3.5), (3, 4));
        assert_eq!(spec.bound(4.0), (4, 4));
        assert_eq!(spec.bound(-5.0), (0, 0));
        assert_eq!(spec.bound(50.0), (9, 9));

        let rev = SpecData::new("rev", vec![5.0, 4.0, 3.0, 2.0], vec![0.0; 4]).unwrap();
        assert_eq!(rev.bound(3.5), (1, 2));
        assert_eq!(rev.bound(9.0), (0, 0));
    }

    #[test]
    fn eval_y_interpolates_and_respects_bad() {
        let mut spec = ramp(5);
        assert!((spec.eval_y(2.25) - 12.25).abs() < 1e-12);
        spec.set_y_value(3, BAD).unwrap();
        assert_eq!(spec.eval_y(2.5), BAD);
        assert_eq!(spec.eval_y(1.0), 11.0);
    }

    #[test]
    fn sect_joins_ranges_with_bad_gap() {
        let spec = ramp(10);
        let sect = spec.sect("sect", &[[6.0, 7.0], [1.0, 2.0]]).unwrap();
        assert_eq!(sect.x_data(), &[1.0, 2.0, 4.0, 6.0, 7.0]);
        assert_eq!(sect.y_data()[2], BAD);
        assert!(spec.sect("none", &[[20.0, 30.0]]).is_none());
    }

    #[test]
    fn subset_removes_ranges() {
        let spec = ramp(8).with_errors(vec![0.5; 8]).unwrap();
        let sub = spec.subset("sub", &[[2.0, 4.0]]).unwrap();
        assert_eq!(sub.x_data(), &[0.0, 1.0, 2.0, 5.0, 6.0, 7.0]);
        assert_eq!(sub.y_data()[2], BAD);
        assert_eq!(sub.y_errors().unwrap()[2], BAD);
        assert!(spec.subset("all", &[[-1.0, 100.0]]).is_none());
    }

    #[test]
    fn flip_mirrors_about_centre() {
        let mut spec = ramp(4).with_errors(vec![0.1; 4]).unwrap();
        spec.set_x_value(3, BAD).unwrap();
        let flip = spec.flipped(5.0).unwrap();
        assert_eq!(flip.short_name, "Flip of: ramp");
        assert_eq!(flip.x_data(), &[10.0, 9.0, 8.0, BAD]);
        assert_eq!(flip.y_data(), spec.y_data());
        assert_eq!(flip.y_errors(), spec.y_errors());

        let whole = ramp(4).flipped(5.0).unwrap();
        assert!(!whole.increases());
        assert!((whole.eval_y(9.5) - 10.5).abs() < 1e-12);

        let copy = spec.copy_of().unwrap();
        assert_eq!(copy.short_name, "Copy of: ramp");
        assert_eq!(copy.x_data(), spec.x_data());
    }

    #[test]
    fn translate_shifts_valid_coordinates() {
        let mut spec = ramp(3);
        spec.set_x_value(1, BAD).unwrap();
        spec.translate(2.5);
        assert_eq!(spec.x_data(), &[2.5, BAD, 4.5]);
        spec.translate(-2.5);
        assert_eq!(spec.x_data(), &[0.0, BAD, 2.0]);
    }

    #[test]
    fn index_span_decreasing_coordinates() {
        let xs = [9.0, 8.0, 7.0, 6.0, 5.0];
        assert_eq!(index_span(&xs, 6.0, 8.0), Some((1, 3)));
        assert_eq!(index_span(&xs, 0.0, 1.0), None);
    }

    #[test]
    fn divide_data_marks_zero_divisors_bad() {
        let (v, e) = divide_data(&[4.0, 4.0, BAD], Some(&[1.0, 1.0, 1.0]), &[2.0, 0.0, 1.0]);
        assert_eq!(v, vec![2.0, BAD, BAD]);
        assert_eq!(e.unwrap(), vec![0.5, BAD, BAD]);
        assert_eq!(subtract_data(&[3.0, BAD], &[1.0, 1.0]), vec![2.0, BAD]);
    }

    #[test]
    fn metadata_orders_by_type_then_value() {
        let mut v = vec![
            MetadataValue::String("b".into()),
            MetadataValue::Integer(3),
            MetadataValue::Null,
            MetadataValue::Integer(1),
        ];
        v.sort();
        assert_eq!(v[0], MetadataValue::Null);
        assert_eq!(v[1], MetadataValue::Integer(1));
    }
}
