use eframe::egui;

use crate::ui::display::{DisplayLine, LineColor};

fn color32(color: LineColor) -> Option<egui::Color32> {
    match color {
        LineColor::Plain => None,
        LineColor::Green => Some(egui::Color32::GREEN),
        LineColor::Yellow => Some(egui::Color32::YELLOW),
        LineColor::Blue => Some(egui::Color32::LIGHT_BLUE),
        LineColor::Red => Some(egui::Color32::RED),
    }
}

pub fn render(ui: &mut egui::Ui, lines: &[DisplayLine]) {
    egui::ScrollArea::vertical()
        .auto_shrink([false, false])
        .stick_to_bottom(true)
        .show(ui, |ui| {
            for line in lines {
                ui.horizontal_wrapped(|ui| match (&line.prefix, color32(line.color)) {
                    (Some(prefix), Some(color)) => {
                        ui.colored_label(color, prefix);
                        ui.label(&line.text);
                    }
                    (Some(prefix), None) => {
                        ui.label(prefix);
                        ui.label(&line.text);
                    }
                    (None, Some(color)) => {
                        ui.colored_label(color, &line.text);
                    }
                    (None, None) => {
                        ui.label(&line.text);
                    }
                });
            }
        });
}
