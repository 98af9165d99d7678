use std::path::Path;

use anyhow::{bail, Context, Result};

use rusty_splat::config::Settings;
use rusty_splat::data::loader::load_file;
use rusty_splat::data::model::{SpecData, SpecType};
use rusty_splat::data::ranges::{read_ranges_file, CoordRange, RangeList};
use rusty_splat::data::writer::save_file;
use rusty_splat::filter;
use rusty_splat::fit::{
    deblend, fit_lines, fit_polynomial, generate_from_curve, Component, CurveOutput,
    DeblendBackground, InterpolatedCurve, LineFitResult, ProfileKind, ProfileResult,
};
use rusty_splat::stats::{region_stats, whole_stats};

// ---------------------------------------------------------------------------
// Result rows
// ---------------------------------------------------------------------------

/// One row of the results table: a Quick fit or one fitted profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub label: String,
    pub fit: String,
    pub centre: f64,
    pub peak: f64,
    pub fwhm: f64,
    pub flux: f64,
    pub flux_error: Option<f64>,
    pub rms: Option<f64>,
}

impl ResultRow {
    fn profile(label: String, p: &ProfileResult) -> Self {
        ResultRow {
            label,
            fit: p.kind.to_string(),
            centre: p.centre,
            peak: p.scale,
            fwhm: p.fwhm,
            flux: p.flux,
            flux_error: Some(p.flux_error),
            rms: Some(p.rms),
        }
    }

    fn from_line(r: &LineFitResult) -> Vec<Self> {
        let label = format!("{} ({})", r.line, r.fit_number);
        let mut rows = vec![ResultRow {
            label: label.clone(),
            fit: "Quick".to_string(),
            centre: r.quick.centre,
            peak: r.quick.peak,
            fwhm: 2.0 * r.quick.half_width,
            flux: r.quick.equivalent_width,
            flux_error: None,
            rms: None,
        }];
        rows.extend(r.profiles.iter().map(|p| ResultRow::profile(label.clone(), p)));
        rows
    }
}

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// The full UI state, independent of rendering.
pub struct AppState {
    /// Every spectrum known to the tool, loaded or derived.
    pub spectra: Vec<SpecData>,

    /// Whether each spectrum is drawn (same order as `spectra`).
    pub visible: Vec<bool>,

    /// Coordinate shift applied to each spectrum since it was added.
    pub offsets: Vec<f64>,

    /// The spectrum the tools work on.
    pub current: Option<usize>,

    /// Background spectrum for line fits and deblends.
    pub background: Option<usize>,

    /// Spectrum used as a convolution kernel.
    pub kernel: Option<usize>,

    pub ranges: RangeList,
    pub settings: Settings,

    /// Deblend components and the constant background used when no
    /// background spectrum is chosen.
    pub components: Vec<Component>,
    pub deblend_constant: f64,

    /// Counters shared by every fit of the session.
    pub fit_counter: usize,
    pub poly_counter: usize,
    pub deblend_counter: usize,
    pub interp_counter: usize,

    /// Control points of the next interpolated line.
    pub interp_points: Vec<[f64; 2]>,

    pub results: Vec<ResultRow>,

    /// Text reports of every operation, newest last.
    pub log: Vec<String>,

    /// Status / error message shown in the UI.
    pub status_message: Option<String>,

    /// Text buffers of the side panel.
    pub open_path: String,
    pub ranges_path: String,
    pub save_path: String,
    pub range_input: [f64; 2],
    pub point_input: [f64; 2],
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            spectra: Vec::new(),
            visible: Vec::new(),
            offsets: Vec::new(),
            current: None,
            background: None,
            kernel: None,
            ranges: RangeList::new(),
            settings: Settings::default(),
            components: Vec::new(),
            deblend_constant: 0.0,
            fit_counter: 0,
            poly_counter: 0,
            deblend_counter: 0,
            interp_counter: 0,
            interp_points: Vec::new(),
            results: Vec::new(),
            log: Vec::new(),
            status_message: None,
            open_path: String::new(),
            ranges_path: String::new(),
            save_path: String::new(),
            range_input: [0.0, 0.0],
            point_input: [0.0, 0.0],
        }
    }
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn current_spec(&self) -> Option<&SpecData> {
        self.current.and_then(|i| self.spectra.get(i))
    }

    /// Add a spectrum, show it and return its index. The first spectrum
    /// becomes the current one.
    pub fn add_spectrum(&mut self, spec: SpecData) -> usize {
        self.spectra.push(spec);
        self.visible.push(true);
        self.offsets.push(0.0);
        let index = self.spectra.len() - 1;
        if self.current.is_none() {
            self.current = Some(index);
        }
        index
    }

    pub fn set_current(&mut self, index: usize) {
        if index < self.spectra.len() {
            self.current = Some(index);
            self.visible[index] = true;
        }
    }

    /// Run an operation, reporting failure in the status line.
    fn report<T>(&mut self, what: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(v) => {
                self.status_message = None;
                Some(v)
            }
            Err(e) => {
                log::error!("{what}: {e:#}");
                self.status_message = Some(format!("{what}: {e:#}"));
                None
            }
        }
    }

    fn current_or_err(&self) -> Result<&SpecData> {
        match self.current_spec() {
            Some(s) => Ok(s),
            None => bail!("no current spectrum"),
        }
    }

    // -- Files --

    pub fn load_file(&mut self, path: &Path) {
        let loaded = load_file(path).with_context(|| format!("loading {}", path.display()));
        if let Some(spectra) = self.report("Failed to load file", loaded) {
            log::info!("Loaded {} spectra from {}", spectra.len(), path.display());
            for spec in spectra {
                self.add_spectrum(spec);
            }
        }
    }

    pub fn load_ranges(&mut self, path: &Path) {
        let read = read_ranges_file(path).map_err(anyhow::Error::from);
        if let Some(ranges) = self.report("Failed to read ranges", read) {
            log::info!("Read {} ranges from {}", ranges.len(), path.display());
            self.ranges = ranges;
        }
    }

    pub fn save_current(&mut self, path: &Path) {
        let saved = self.current_or_err().and_then(|s| save_file(s, path));
        self.report("Failed to save spectrum", saved);
    }

    // -- Ranges --

    pub fn add_range(&mut self, lower: f64, upper: f64) {
        self.ranges.add(CoordRange::new(lower, upper));
    }

    pub fn remove_range(&mut self, index: usize) {
        self.ranges.remove(index);
    }

    // -- Analysis --

    /// Fit every line range of the current spectrum with the chosen
    /// profiles and add the model spectra.
    pub fn fit_lines(&mut self) {
        let fitted = self.try_fit_lines();
        if let Some(results) = self.report("Line fit failed", fitted) {
            for r in results {
                self.results.extend(ResultRow::from_line(&r));
                self.log.push(line_report(&r));
                for model in r.models {
                    self.add_spectrum(model);
                }
            }
        }
    }

    fn try_fit_lines(&mut self) -> Result<Vec<LineFitResult>> {
        let current = self.current.context("no current spectrum")?;
        if self.background == Some(current) {
            bail!("the background spectrum cannot be the spectrum being fitted");
        }
        let spec = &self.spectra[current];
        let background = self.background.and_then(|b| self.spectra.get(b));
        let mut counter = self.fit_counter;
        let results = fit_lines(spec, &self.ranges, background, &self.settings.fit, &mut counter)?;
        self.fit_counter = counter;
        Ok(results)
    }

    /// Fit all deblend components at once over the ranges.
    pub fn deblend(&mut self) {
        let done = self.try_deblend();
        if let Some(r) = self.report("Deblend failed", done) {
            self.log.push(format!(
                "Deblend of {} components: chi square {}, {}",
                r.components.len(),
                r.chisq,
                if r.converged { "converged" } else { "not converged" }
            ));
            let label = format!("deblend ({})", self.deblend_counter);
            self.results
                .extend(r.components.iter().map(|p| ResultRow::profile(label.clone(), p)));
            self.add_spectrum(r.model);
            for m in r.component_models.into_iter().chain(r.constant) {
                self.add_spectrum(m);
            }
        }
    }

    fn try_deblend(&mut self) -> Result<rusty_splat::fit::DeblendResult> {
        let current = self.current.context("no current spectrum")?;
        if self.background == Some(current) {
            bail!("the background spectrum cannot be the spectrum being deblended");
        }
        let spec = &self.spectra[current];
        let pairs = self.ranges.index_pairs(spec.x_data(), self.settings.fit.selected_only);
        let background = match self.background.and_then(|b| self.spectra.get(b)) {
            Some(b) => DeblendBackground::Spectrum(b),
            None => DeblendBackground::Constant(self.deblend_constant),
        };
        let name = format!("Deblend: {}", self.deblend_counter + 1);
        let result = deblend(
            spec,
            &pairs,
            &self.components,
            background,
            self.settings.fit.use_errors,
            self.settings.fit.iterations,
            &name,
        )?;
        self.deblend_counter += 1;
        Ok(result)
    }

    /// Add a deblend component seeded at the middle of the first range.
    pub fn add_component(&mut self, kind: ProfileKind) {
        let (centre, width) = match (self.ranges.iter().next(), self.current_spec()) {
            (Some(r), _) => (0.5 * (r.lower + r.upper), 0.25 * (r.upper - r.lower)),
            (None, Some(s)) => {
                let [x0, x1, ..] = s.range();
                (0.5 * (x0 + x1), 0.05 * (x1 - x0))
            }
            (None, None) => (0.0, 1.0),
        };
        self.components
            .push(Component::new(kind, kind.initial_params(1.0, centre, width.abs().max(f64::EPSILON))));
    }

    /// Fit a polynomial over the ranges (the whole spectrum when there are
    /// none) and add the fit and any derived spectra.
    pub fn poly_fit(&mut self) {
        let done = self.try_poly_fit();
        if let Some(out) = self.report("Polynomial fit failed", done) {
            self.log.push(out.report);
            self.add_spectrum(out.fit);
            for s in out.subtracted.into_iter().chain(out.ratio) {
                self.add_spectrum(s);
            }
        }
    }

    fn try_poly_fit(&mut self) -> Result<rusty_splat::fit::PolyFitOutput> {
        let spec = self.current_or_err()?;
        let pairs = self.ranges.index_pairs(spec.x_data(), self.settings.fit.selected_only);
        let p = &self.settings.poly;
        let name = format!("Polynomial Fit: {}", self.poly_counter + 1);
        let out = fit_polynomial(spec, &pairs, p.degree, p.use_errors, p.subtract, p.divide, &name)?;
        self.poly_counter += 1;
        Ok(out)
    }

    /// Filter the current spectrum, restricted by the ranges.
    pub fn apply_filter(&mut self) {
        let done = self.try_filter();
        if let Some(spec) = self.report("Filter failed", done) {
            self.log.push(format!("Created '{}'", spec.short_name));
            let index = self.add_spectrum(spec);
            self.set_current(index);
        }
    }

    fn try_filter(&self) -> Result<SpecData> {
        let spec = self.current_or_err()?;
        let kernel = self.kernel.and_then(|k| self.spectra.get(k));
        let params = &self.settings.filter;
        let coords = self.ranges.coords(self.settings.fit.selected_only);
        Ok(filter::apply(spec, &params.kind(), kernel, &coords, params.include_ranges)?)
    }

    /// Statistics of the current spectrum over the ranges, or of the whole
    /// spectrum.
    pub fn stats(&mut self, whole: bool) {
        let done = self.try_stats(whole);
        if let Some(report) = self.report("Statistics failed", done) {
            self.log.push(report);
        }
    }

    fn try_stats(&self, whole: bool) -> Result<String> {
        let spec = self.current_or_err()?;
        let full = self.settings.full_stats;
        let r = if whole {
            whole_stats(spec, full)?
        } else {
            region_stats(spec, &self.ranges.coords(self.settings.fit.selected_only), full)?
        };
        Ok(r.report)
    }

    // -- Copies and coordinate shifts --

    /// Add a copy of the current spectrum, mirrored about `centre` when
    /// given, and make it current.
    pub fn copy_current(&mut self, flip_about: Option<f64>) {
        let copied = self.current_or_err().and_then(|s| {
            let copy = match flip_about {
                Some(centre) => s.flipped(centre)?,
                None => s.copy_of()?,
            };
            Ok(copy)
        });
        if let Some(copy) = self.report("Copy failed", copied) {
            self.log.push(format!("Created '{}'", copy.short_name));
            let index = self.add_spectrum(copy);
            self.set_current(index);
        }
    }

    /// Middle of the current spectrum's coordinate range, the default
    /// centre for flips.
    pub fn current_centre(&self) -> Option<f64> {
        self.current_spec().map(|s| {
            let [x0, x1, ..] = s.range();
            0.5 * (x0 + x1)
        })
    }

    /// Move the current spectrum so that it sits `offset` away from where
    /// it was added.
    pub fn translate_current(&mut self, offset: f64) {
        let Some(i) = self.current else {
            self.status_message = Some("Translate failed: no current spectrum".into());
            return;
        };
        let shift = offset - self.offsets[i];
        if shift != 0.0 {
            self.spectra[i].translate(shift);
            self.offsets[i] = offset;
            log::debug!("Translated '{}' by {shift}", self.spectra[i].short_name);
        }
    }

    // -- Interpolated lines --

    pub fn add_interp_point(&mut self, x: f64, y: f64) {
        self.interp_points.push([x, y]);
    }

    /// Draw a curve through the control points over the current spectrum
    /// and add it with any difference and ratio spectra.
    pub fn interpolate_line(&mut self) {
        let done = self.try_interpolate_line();
        if let Some(out) = self.report("Interpolated line failed", done) {
            self.log.push(format!(
                "Created '{}' through {} points",
                out.line.short_name,
                self.interp_points.len()
            ));
            self.add_spectrum(out.line);
            for s in out.subtracted.into_iter().chain(out.ratio) {
                self.add_spectrum(s);
            }
        }
    }

    fn try_interpolate_line(&mut self) -> Result<CurveOutput> {
        let spec = self.current_or_err()?;
        let p = &self.settings.interp;
        let curve = InterpolatedCurve::new(p.kind, &self.interp_points)?;
        let name = format!("Interpolated line: {}", self.interp_counter + 1);
        let out = generate_from_curve(spec, &curve, p.subtract, p.divide, &name)?;
        self.interp_counter += 1;
        Ok(out)
    }

    /// Remove every fit and polynomial spectrum.
    pub fn delete_fits(&mut self) {
        let keep: Vec<bool> = self
            .spectra
            .iter()
            .map(|s| !matches!(s.spec_type, SpecType::LineFit | SpecType::Polynomial))
            .collect();
        let removed = keep.iter().filter(|k| !**k).count();

        let remap = |old: Option<usize>| -> Option<usize> {
            let i = old?;
            keep[i].then(|| keep[..i].iter().filter(|k| **k).count())
        };
        self.current = remap(self.current);
        self.background = remap(self.background);
        self.kernel = remap(self.kernel);

        let mut it = keep.iter();
        self.spectra.retain(|_| *it.next().unwrap_or(&true));
        let mut it = keep.iter();
        self.visible.retain(|_| *it.next().unwrap_or(&true));
        let mut it = keep.iter();
        self.offsets.retain(|_| *it.next().unwrap_or(&true));
        if self.current.is_none() && !self.spectra.is_empty() {
            self.current = Some(0);
        }
        log::info!("Removed {removed} fit spectra");
    }

    /// Settings and results log as one JSON document.
    pub fn results_json(&self) -> Result<String> {
        let doc = serde_json::json!({
            "settings": self.settings,
            "log": self.log,
        });
        Ok(serde_json::to_string_pretty(&doc)?)
    }
}

/// Text report of one line, in the layout of the results log.
fn line_report(r: &LineFitResult) -> String {
    let q = &r.quick;
    let mut s = format!(
        "Line {} (fit {}): Quick fit centre {}, peak {}, width {}, equivalent width {}, asymmetry {}{}\n",
        r.line,
        r.fit_number,
        q.centre,
        q.peak,
        2.0 * q.half_width,
        q.equivalent_width,
        q.asymmetry,
        if q.absorption { " (absorption)" } else { "" }
    );
    for p in &r.profiles {
        s.push_str(&format!(
            "  {}: centre {}, scale {}, fwhm {}, flux {} ± {}, rms {}{}\n",
            p.kind,
            p.centre,
            p.scale,
            p.fwhm,
            p.flux,
            p.flux_error,
            p.rms,
            if p.converged { "" } else { " (not converged)" }
        ));
    }
    s
}
