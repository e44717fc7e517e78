use std::sync::Arc;
use std::time::Duration;

use eframe::CreationContext;
use egui::{CentralPanel, ColorImage, Frame, TextureHandle, TextureOptions, ViewportCommand};

use crate::display::SessionGate;
use crate::image_ops::ViewerImage;
use crate::theme::apply_viewer_theme;

/// How often the window re-checks the gate when nothing else wakes it.
const GATE_POLL: Duration = Duration::from_millis(250);

/// Paints one image across the whole screen until the gate asks it to close.
pub struct ViewerApp {
    texture: TextureHandle,
    gate: Arc<SessionGate>,
    close_sent: bool,
}

impl ViewerApp {
    pub fn new(cc: &CreationContext<'_>, image: ViewerImage, gate: Arc<SessionGate>) -> Self {
        apply_viewer_theme(&cc.egui_ctx);
        let pixels = ColorImage::from_rgba_unmultiplied(image.size, &image.pixels);
        let texture = cc
            .egui_ctx
            .load_texture("current-image", pixels, TextureOptions::LINEAR);

        let ctx = cc.egui_ctx.clone();
        gate.set_waker(move || ctx.request_repaint());

        Self {
            texture,
            gate,
            close_sent: false,
        }
    }

    pub fn ui(&mut self, ctx: &egui::Context) {
        let closing = self.gate.is_closing();
        if ctx.input(|i| i.viewport().close_requested()) && !closing {
            // Only the gate may close the window.
            ctx.send_viewport_cmd(ViewportCommand::CancelClose);
        }
        if closing && !self.close_sent {
            self.close_sent = true;
            ctx.send_viewport_cmd(ViewportCommand::Close);
        }

        CentralPanel::default()
            .frame(Frame::none().fill(egui::Color32::BLACK))
            .show(ctx, |ui| {
                let rect = ui.max_rect();
                egui::Image::new(&self.texture).paint_at(ui, rect);
            });

        ctx.request_repaint_after(GATE_POLL);
    }
}

impl eframe::App for ViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.ui(ctx);
    }
}
