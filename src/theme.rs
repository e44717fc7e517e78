//! Visuals for the fullscreen viewer.

use eframe::egui;

/// Dark visuals with pure black panels, so letterboxing and loading frames stay black.
pub fn apply_viewer_theme(ctx: &egui::Context) {
    let mut visuals = egui::Visuals::dark();
    visuals.panel_fill = egui::Color32::BLACK;
    visuals.window_fill = egui::Color32::BLACK;
    visuals.extreme_bg_color = egui::Color32::BLACK;
    ctx.set_visuals(visuals);
}
