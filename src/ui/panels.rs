use std::path::PathBuf;

use eframe::egui::{self, Color32, DragValue, RichText, ScrollArea, Ui};
use egui_extras::{Column, TableBuilder};

use rusty_splat::config::FilterChoice;
use rusty_splat::filter::Wavelet;
use rusty_splat::fit::{InterpKind, ProfileKind, SubtractMode};

use crate::state::AppState;

// ---------------------------------------------------------------------------
// Left side panel – tools
// ---------------------------------------------------------------------------

/// Render the left tool panel.
pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            files_section(ui, state);
            spectra_section(ui, state);
            flip_section(ui, state);
            ranges_section(ui, state);
            line_fit_section(ui, state);
            deblend_section(ui, state);
            poly_section(ui, state);
            interp_section(ui, state);
            filter_section(ui, state);
            stats_section(ui, state);
        });
}

fn files_section(ui: &mut Ui, state: &mut AppState) {
    egui::CollapsingHeader::new(RichText::new("Files").strong())
        .default_open(true)
        .show(ui, |ui: &mut Ui| {
            ui.horizontal(|ui: &mut Ui| {
                ui.text_edit_singleline(&mut state.open_path);
                if ui.button("Open").clicked() && !state.open_path.is_empty() {
                    let path = PathBuf::from(state.open_path.trim());
                    state.load_file(&path);
                }
            });
            ui.horizontal(|ui: &mut Ui| {
                ui.text_edit_singleline(&mut state.save_path);
                if ui.button("Save current").clicked() && !state.save_path.is_empty() {
                    let path = PathBuf::from(state.save_path.trim());
                    state.save_current(&path);
                }
            });
        });
}

fn spectra_section(ui: &mut Ui, state: &mut AppState) {
    let names: Vec<String> = state.spectra.iter().map(|s| s.short_name.clone()).collect();

    egui::CollapsingHeader::new(RichText::new(format!("Spectra  ({})", names.len())).strong())
        .default_open(true)
        .show(ui, |ui: &mut Ui| {
            for (i, name) in names.iter().enumerate() {
                ui.horizontal(|ui: &mut Ui| {
                    ui.checkbox(&mut state.visible[i], "");
                    if ui.selectable_label(state.current == Some(i), name).clicked() {
                        state.set_current(i);
                    }
                });
            }
            spectrum_combo(ui, "background", "Background", &names, &mut state.background);
            spectrum_combo(ui, "kernel", "Kernel", &names, &mut state.kernel);
            if ui.button("Delete fits").clicked() {
                state.delete_fits();
            }
        });
}

/// Optional choice of one spectrum.
fn spectrum_combo(ui: &mut Ui, id: &str, label: &str, names: &[String], choice: &mut Option<usize>) {
    let selected = choice
        .and_then(|i| names.get(i))
        .cloned()
        .unwrap_or_else(|| "none".to_string());
    ui.horizontal(|ui: &mut Ui| {
        ui.label(label);
        egui::ComboBox::from_id_salt(id)
            .selected_text(selected)
            .show_ui(ui, |ui: &mut Ui| {
                ui.selectable_value(choice, None, "none");
                for (i, name) in names.iter().enumerate() {
                    ui.selectable_value(choice, Some(i), name);
                }
            });
    });
}

fn ranges_section(ui: &mut Ui, state: &mut AppState) {
    egui::CollapsingHeader::new(RichText::new(format!("Ranges  ({})", state.ranges.len())).strong())
        .default_open(true)
        .show(ui, |ui: &mut Ui| {
            ui.horizontal(|ui: &mut Ui| {
                ui.add(DragValue::new(&mut state.range_input[0]).speed(0.1));
                ui.add(DragValue::new(&mut state.range_input[1]).speed(0.1));
                if ui.button("Add").clicked() {
                    let [a, b] = state.range_input;
                    state.add_range(a, b);
                }
            });

            let mut remove = None;
            for (i, range) in state.ranges.iter_mut().enumerate() {
                ui.horizontal(|ui: &mut Ui| {
                    ui.checkbox(&mut range.selected, "");
                    ui.label(format!("{:.4} : {:.4}", range.lower, range.upper));
                    if ui.small_button("✖").clicked() {
                        remove = Some(i);
                    }
                });
            }
            if let Some(i) = remove {
                state.remove_range(i);
            }

            ui.horizontal(|ui: &mut Ui| {
                ui.text_edit_singleline(&mut state.ranges_path);
                if ui.button("Read").clicked() && !state.ranges_path.is_empty() {
                    let path = PathBuf::from(state.ranges_path.trim());
                    state.load_ranges(&path);
                }
            });
            ui.checkbox(&mut state.settings.fit.selected_only, "Selected ranges only");
        });
}

fn line_fit_section(ui: &mut Ui, state: &mut AppState) {
    egui::CollapsingHeader::new(RichText::new("Line fit").strong())
        .default_open(false)
        .show(ui, |ui: &mut Ui| {
            let fit = &mut state.settings.fit;
            ui.horizontal(|ui: &mut Ui| {
                ui.checkbox(&mut fit.gaussian, "Gaussian");
                ui.checkbox(&mut fit.lorentzian, "Lorentz");
                ui.checkbox(&mut fit.voigt, "Voigt");
            });
            ui.checkbox(&mut fit.use_errors, "Weight by errors");
            ui.horizontal(|ui: &mut Ui| {
                ui.label("Iterations");
                ui.add(DragValue::new(&mut fit.iterations).range(1..=1000));
            });
            if ui.button("Fit lines").clicked() {
                state.fit_lines();
            }
        });
}

fn deblend_section(ui: &mut Ui, state: &mut AppState) {
    egui::CollapsingHeader::new(RichText::new("Deblend").strong())
        .default_open(false)
        .show(ui, |ui: &mut Ui| {
            ui.horizontal(|ui: &mut Ui| {
                for kind in ProfileKind::ALL {
                    if ui.small_button(format!("+ {kind}")).clicked() {
                        state.add_component(kind);
                    }
                }
            });

            let mut remove = None;
            for (i, c) in state.components.iter_mut().enumerate() {
                ui.label(format!("{} {}", c.kind, i + 1));
                for (j, name) in c.kind.param_names().iter().enumerate() {
                    ui.horizontal(|ui: &mut Ui| {
                        ui.label(*name);
                        ui.add(DragValue::new(&mut c.params[j]).speed(0.01));
                        ui.checkbox(&mut c.fixed[j], "fixed");
                    });
                }
                if ui.small_button("Remove").clicked() {
                    remove = Some(i);
                }
            }
            if let Some(i) = remove {
                state.components.remove(i);
            }

            if state.background.is_none() {
                ui.horizontal(|ui: &mut Ui| {
                    ui.label("Constant background");
                    ui.add(DragValue::new(&mut state.deblend_constant).speed(0.01));
                });
            }
            if ui.button("Deblend").clicked() {
                state.deblend();
            }
        });
}

fn poly_section(ui: &mut Ui, state: &mut AppState) {
    egui::CollapsingHeader::new(RichText::new("Polynomial").strong())
        .default_open(false)
        .show(ui, |ui: &mut Ui| {
            let poly = &mut state.settings.poly;
            ui.horizontal(|ui: &mut Ui| {
                ui.label("Degree");
                ui.add(DragValue::new(&mut poly.degree).range(0..=20));
            });
            ui.checkbox(&mut poly.use_errors, "Weight by errors");
            ui.horizontal(|ui: &mut Ui| {
                ui.label("Subtract");
                ui.selectable_value(&mut poly.subtract, SubtractMode::None, "no");
                ui.selectable_value(&mut poly.subtract, SubtractMode::Baseline, "base");
                ui.selectable_value(&mut poly.subtract, SubtractMode::Ceiling, "ceiling");
            });
            ui.checkbox(&mut poly.divide, "Divide by fit");
            if ui.button("Fit polynomial").clicked() {
                state.poly_fit();
            }
        });
}

fn flip_section(ui: &mut Ui, state: &mut AppState) {
    egui::CollapsingHeader::new(RichText::new("Flip / translate").strong())
        .default_open(false)
        .show(ui, |ui: &mut Ui| {
            ui.horizontal(|ui: &mut Ui| {
                if ui.button("Copy").clicked() {
                    state.copy_current(None);
                }
                if ui.button("Flip copy").clicked() {
                    let centre = state.current_centre();
                    if centre.is_some() {
                        state.copy_current(centre);
                    }
                }
            });
            let Some(i) = state.current else {
                return;
            };
            let mut offset = state.offsets[i];
            ui.horizontal(|ui: &mut Ui| {
                ui.label("Offset");
                ui.add(DragValue::new(&mut offset).speed(1.0));
                if ui.button("Reset").clicked() {
                    offset = 0.0;
                }
            });
            if offset != state.offsets[i] {
                state.translate_current(offset);
            }
        });
}

fn interp_section(ui: &mut Ui, state: &mut AppState) {
    egui::CollapsingHeader::new(RichText::new("Interpolated line").strong())
        .default_open(false)
        .show(ui, |ui: &mut Ui| {
            ui.horizontal(|ui: &mut Ui| {
                ui.add(DragValue::new(&mut state.point_input[0]).speed(0.1));
                ui.add(DragValue::new(&mut state.point_input[1]).speed(0.01));
                if ui.button("Add point").clicked() {
                    let [x, y] = state.point_input;
                    state.add_interp_point(x, y);
                }
            });

            let mut remove = None;
            for (i, p) in state.interp_points.iter().enumerate() {
                ui.horizontal(|ui: &mut Ui| {
                    ui.label(format!("{:.4}, {:.4}", p[0], p[1]));
                    if ui.small_button("✖").clicked() {
                        remove = Some(i);
                    }
                });
            }
            if let Some(i) = remove {
                state.interp_points.remove(i);
            }

            let interp = &mut state.settings.interp;
            ui.horizontal(|ui: &mut Ui| {
                for kind in InterpKind::ALL {
                    ui.selectable_value(&mut interp.kind, kind, kind.to_string());
                }
            });
            ui.horizontal(|ui: &mut Ui| {
                ui.label("Subtract");
                ui.selectable_value(&mut interp.subtract, SubtractMode::None, "no");
                ui.selectable_value(&mut interp.subtract, SubtractMode::Baseline, "base");
                ui.selectable_value(&mut interp.subtract, SubtractMode::Ceiling, "ceiling");
            });
            ui.checkbox(&mut interp.divide, "Divide by line");
            ui.horizontal(|ui: &mut Ui| {
                if ui.button("Generate").clicked() {
                    state.interpolate_line();
                }
                if ui.button("Clear points").clicked() {
                    state.interp_points.clear();
                }
            });
        });
}

fn filter_section(ui: &mut Ui, state: &mut AppState) {
    egui::CollapsingHeader::new(RichText::new("Filter").strong())
        .default_open(false)
        .show(ui, |ui: &mut Ui| {
            let p = &mut state.settings.filter;
            egui::ComboBox::from_id_salt("filter_choice")
                .selected_text(p.choice.label())
                .show_ui(ui, |ui: &mut Ui| {
                    for choice in FilterChoice::ALL {
                        ui.selectable_value(&mut p.choice, choice, choice.label());
                    }
                });

            let width = |ui: &mut Ui, label: &str, v: &mut usize| {
                ui.horizontal(|ui: &mut Ui| {
                    ui.label(label);
                    ui.add(DragValue::new(v).range(1..=1001));
                });
            };
            match p.choice {
                FilterChoice::Average => width(ui, "Width", &mut p.average_width),
                FilterChoice::Median => width(ui, "Width", &mut p.median_width),
                FilterChoice::Rebin => width(ui, "Width", &mut p.rebin_width),
                FilterChoice::Wavelet => {
                    ui.horizontal(|ui: &mut Ui| {
                        ui.selectable_value(&mut p.wavelet, Wavelet::Haar, "Haar");
                        ui.selectable_value(&mut p.wavelet, Wavelet::Daubechies4, "Daub4");
                    });
                    ui.add(DragValue::new(&mut p.wavelet_percent).range(0.0..=100.0).suffix("%"));
                }
                FilterChoice::Gaussian | FilterChoice::Lorentz | FilterChoice::Voigt => {
                    width(ui, "Kernel width", &mut p.kernel_width);
                    if p.choice != FilterChoice::Lorentz {
                        ui.horizontal(|ui: &mut Ui| {
                            ui.label("Gaussian FWHM");
                            ui.add(DragValue::new(&mut p.gwidth).speed(0.1));
                        });
                    }
                    if p.choice != FilterChoice::Gaussian {
                        ui.horizontal(|ui: &mut Ui| {
                            ui.label("Lorentzian HWHM");
                            ui.add(DragValue::new(&mut p.lwidth).speed(0.1));
                        });
                    }
                }
                FilterChoice::SpectrumKernel => {
                    ui.label("Uses the kernel spectrum");
                }
            }
            ui.checkbox(&mut p.include_ranges, "Inside ranges (else outside)");
            if ui.button("Apply filter").clicked() {
                state.apply_filter();
            }
        });
}

fn stats_section(ui: &mut Ui, state: &mut AppState) {
    egui::CollapsingHeader::new(RichText::new("Statistics").strong())
        .default_open(false)
        .show(ui, |ui: &mut Ui| {
            ui.checkbox(&mut state.settings.full_stats, "Full statistics");
            ui.horizontal(|ui: &mut Ui| {
                if ui.button("Ranges").clicked() {
                    state.stats(false);
                }
                if ui.button("Whole").clicked() {
                    state.stats(true);
                }
            });
        });
}

// ---------------------------------------------------------------------------
// Bottom panel – results
// ---------------------------------------------------------------------------

/// Results table and the text log of every operation.
pub fn results_panel(ui: &mut Ui, state: &mut AppState) {
    ui.horizontal(|ui: &mut Ui| {
        ui.heading("Results");
        if ui.small_button("Clear").clicked() {
            state.results.clear();
            state.log.clear();
        }
        if ui.small_button("Log JSON").clicked() {
            match state.results_json() {
                Ok(json) => log::info!("{json}"),
                Err(e) => log::error!("Failed to serialise results: {e:#}"),
            }
        }
    });

    ui.columns(2, |cols| {
        let rows = &state.results;
        TableBuilder::new(&mut cols[0])
            .striped(true)
            .resizable(true)
            .column(Column::auto())
            .column(Column::auto())
            .columns(Column::remainder(), 6)
            .header(18.0, |mut header| {
                for title in ["Line", "Fit", "Centre", "Peak", "FWHM", "Flux", "Error", "RMS"] {
                    header.col(|ui| {
                        ui.strong(title);
                    });
                }
            })
            .body(|body| {
                body.rows(16.0, rows.len(), |mut row| {
                    let r = &rows[row.index()];
                    let opt = |v: Option<f64>| v.map_or_else(String::new, |v| format!("{v:.4}"));
                    let cells = [
                        r.label.clone(),
                        r.fit.clone(),
                        format!("{:.4}", r.centre),
                        format!("{:.4}", r.peak),
                        format!("{:.4}", r.fwhm),
                        format!("{:.4}", r.flux),
                        opt(r.flux_error),
                        opt(r.rms),
                    ];
                    for text in cells {
                        row.col(|ui| {
                            ui.label(text);
                        });
                    }
                });
            });

        ScrollArea::vertical()
            .id_salt("results_log")
            .stick_to_bottom(true)
            .show(&mut cols[1], |ui: &mut Ui| {
                for entry in &state.log {
                    ui.monospace(entry);
                    ui.separator();
                }
            });
    });
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top status bar.
pub fn top_bar(ui: &mut Ui, state: &mut AppState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.label(format!(
            "{} spectra, {} ranges",
            state.spectra.len(),
            state.ranges.len()
        ));
        if let Some(spec) = state.current_spec() {
            ui.separator();
            ui.label(format!("current: {}", spec.short_name));
        }

        ui.separator();

        if let Some(msg) = &state.status_message {
            ui.label(RichText::new(msg).color(Color32::RED));
        }
    });
}
