use eframe::egui;

/// Returns a submitted line; blank lines are never returned.
pub fn render(ui: &mut egui::Ui, prompt: &str, input_text: &mut String) -> Option<String> {
    let mut send = false;
    ui.horizontal(|ui| {
        ui.label(prompt);
        let response = ui.add(egui::TextEdit::singleline(input_text).desired_width(f32::INFINITY));

        if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
            send = true;
            response.request_focus();
        }
    });

    if send && !input_text.is_empty() {
        let message = input_text.clone();
        input_text.clear();
        return Some(message);
    }

    None
}
