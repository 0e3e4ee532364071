use eframe::egui;
use tokio::sync::mpsc;

use super::components::{chat_area, input_bar, sidebar};
use super::display::Display;

/// Cửa sổ chat: message log, peer list and the input line.
pub struct ChatApp {
    display: Display,
    input_sender: mpsc::Sender<String>,
    input_text: String,
    prompt: String,
}

impl ChatApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        display: Display,
        input_sender: mpsc::Sender<String>,
        nick: &str,
    ) -> Self {
        display.attach(cc.egui_ctx.clone());
        Self {
            display,
            input_sender,
            input_text: String::new(),
            prompt: format!("{nick} >"),
        }
    }

    fn submit(&mut self, line: String) {
        if let Err(err) = self.input_sender.try_send(line) {
            log::warn!("Failed to hand input to dispatch loop: {err}");
            self.display.write_error(format!("input dropped: {err}"));
        }
    }
}

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if self.display.close_requested() {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            return;
        }

        let snapshot = self.display.snapshot();

        egui::TopBottomPanel::bottom("input_bar").show(ctx, |ui| {
            if let Some(line) = input_bar::render(ui, &self.prompt, &mut self.input_text) {
                self.submit(line);
            }
        });

        egui::SidePanel::right("peer_sidebar")
            .exact_width(140.0)
            .show(ctx, |ui| {
                sidebar::render(ui, &snapshot.peers);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading(&snapshot.title);
            ui.separator();
            chat_area::render(ui, &snapshot.lines);
        });
    }
}
