mod app;
mod color;
mod state;
mod ui;

use std::path::PathBuf;

use app::SplatApp;
use clap::Parser;
use eframe::egui;
use rusty_splat::config::Settings;
use state::AppState;

/// Spectral line fitting, filtering and statistics.
#[derive(Parser, Debug)]
#[command(name = "rusty-splat", version, about)]
struct Cli {
    /// Spectra to open (.txt, .csv, .json, .parquet)
    files: Vec<PathBuf>,

    /// Ranges file of coordinate pairs
    #[arg(short, long)]
    ranges: Option<PathBuf>,

    /// Settings as a JSON document; flags below override it
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Width of the running average filter
    #[arg(long)]
    average_width: Option<usize>,

    /// Width of the running median filter
    #[arg(long)]
    median_width: Option<usize>,

    /// Width of the profile filter kernels in pixels
    #[arg(long)]
    kernel_width: Option<usize>,

    /// Degree of polynomial fits
    #[arg(short = 'd', long)]
    degree: Option<usize>,

    /// Line fit iteration limit (gives up after one fewer rejected steps)
    #[arg(short, long)]
    iterations: Option<usize>,
}

impl Cli {
    fn settings(&self) -> anyhow::Result<Settings> {
        let mut s = match &self.settings {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                serde_json::from_str(&text)?
            }
            None => Settings::default(),
        };
        if let Some(w) = self.average_width {
            s.filter.average_width = w;
        }
        if let Some(w) = self.median_width {
            s.filter.median_width = w;
        }
        if let Some(w) = self.kernel_width {
            s.filter.kernel_width = w;
        }
        if let Some(d) = self.degree {
            s.poly.degree = d;
        }
        if let Some(n) = self.iterations {
            s.fit.iterations = n;
        }
        Ok(s)
    }
}

fn main() -> eframe::Result {
    env_logger::init();
    let cli = Cli::parse();

    let settings = cli.settings().unwrap_or_else(|e| {
        log::error!("Failed to read settings, using defaults: {e:#}");
        Settings::default()
    });
    let mut state = AppState::new(settings);
    for path in &cli.files {
        state.load_file(path);
    }
    if let Some(path) = &cli.ranges {
        state.load_ranges(path);
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 860.0])
            .with_min_inner_size([640.0, 420.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Rusty Splat – Spectral Analysis",
        options,
        Box::new(|_cc| Ok(Box::new(SplatApp::new(state)))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from(["rusty-splat", "a.txt", "-d", "3", "--median-width", "9"]);
        assert_eq!(cli.files, vec![PathBuf::from("a.txt")]);
        let s = cli.settings().unwrap();
        assert_eq!(s.poly.degree, 3);
        assert_eq!(s.filter.median_width, 9);
        assert_eq!(s.filter.average_width, 5);
    }
}
