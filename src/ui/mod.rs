/// egui panels and the spectral plot.
pub mod panels;
pub mod plot;
