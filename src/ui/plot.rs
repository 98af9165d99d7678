use eframe::egui::{Color32, Ui};
use egui_plot::{Line, Plot, PlotPoints, Points, VLine};

use rusty_splat::data::model::{is_bad, SpecData};

use crate::color::SpectrumColors;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Spectral plot (central panel)
// ---------------------------------------------------------------------------

/// Runs of consecutive valid samples. BAD values break the line.
pub fn segments(spec: &SpecData) -> Vec<Vec<[f64; 2]>> {
    let mut out = Vec::new();
    let mut run: Vec<[f64; 2]> = Vec::new();
    for (&x, &y) in spec.x_data().iter().zip(spec.y_data()) {
        if is_bad(x) || is_bad(y) {
            if !run.is_empty() {
                out.push(std::mem::take(&mut run));
            }
        } else {
            run.push([x, y]);
        }
    }
    if !run.is_empty() {
        out.push(run);
    }
    out
}

/// Render the spectral plot in the central panel.
pub fn spectral_plot(ui: &mut Ui, state: &AppState) {
    if state.spectra.is_empty() {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading("Open a spectrum to start  (enter a path in the side panel)");
        });
        return;
    }

    let colors = SpectrumColors::new(&state.spectra);

    Plot::new("spectral_plot")
        .legend(egui_plot::Legend::default())
        .x_axis_label("Coordinate")
        .y_axis_label("Data value")
        .allow_boxed_zoom(true)
        .allow_drag(true)
        .allow_scroll(true)
        .allow_zoom(true)
        .show(ui, |plot_ui| {
            for (idx, spec) in state.spectra.iter().enumerate() {
                if !state.visible.get(idx).copied().unwrap_or(false) {
                    continue;
                }
                let color = colors.color_for(&state.spectra, idx);
                let width = if state.current == Some(idx) { 2.0 } else { 1.2 };

                // Each segment carries the same name so the legend groups them.
                for seg in segments(spec) {
                    let line = Line::new(PlotPoints::from(seg))
                        .name(&spec.short_name)
                        .color(color)
                        .width(width);
                    plot_ui.line(line);
                }
            }

            for range in state.ranges.iter() {
                let color = if range.selected {
                    Color32::from_rgb(255, 200, 0)
                } else {
                    Color32::from_rgb(120, 120, 120)
                };
                plot_ui.vline(VLine::new(range.lower).color(color));
                plot_ui.vline(VLine::new(range.upper).color(color));
            }

            if !state.interp_points.is_empty() {
                let points = Points::new(PlotPoints::from(state.interp_points.clone()))
                    .radius(4.0)
                    .color(Color32::RED)
                    .name("Interpolation points");
                plot_ui.points(points);
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusty_splat::data::model::BAD;

    #[test]
    fn bad_values_split_segments() {
        let spec = SpecData::new(
            "gaps",
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
            vec![1.0, 2.0, BAD, 4.0, BAD, 6.0],
        )
        .unwrap();
        let segs = segments(&spec);
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[0], vec![[0.0, 1.0], [1.0, 2.0]]);
        assert_eq!(segs[2], vec![[5.0, 6.0]]);
    }
}
