use eframe::egui;

pub fn render(ui: &mut egui::Ui, peers: &[String]) {
    ui.heading("Peers");
    ui.separator();

    if peers.is_empty() {
        ui.label(egui::RichText::new("No peers in room").weak());
        return;
    }

    for peer in peers {
        ui.horizontal(|ui| {
            ui.colored_label(egui::Color32::GREEN, "●");
            ui.label(peer);
        });
    }
}
