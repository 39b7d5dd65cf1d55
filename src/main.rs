mod api;
mod imports;
mod models;
mod plot;
mod poller;
mod ui;

use crate::models::{AppState, Tab};
use dotenv::dotenv;
use eframe::egui;
use eframe::egui::Visuals;
use std::error::Error;

pub struct CellScopeApp {
    state: AppState,
}

impl Default for CellScopeApp {
    fn default() -> Self {
        Self {
            state: AppState::default(),
        }
    }
}

impl eframe::App for CellScopeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.set_visuals(Visuals::dark());

        ui::process_background(ctx, &mut self.state);

        egui::SidePanel::left("browse_panel").show(ctx, |ui| {
            ui.set_width(300.0);
            ui.heading("CellScope");
            ui.weak("Interactive single-cell data exploration");
            ui.separator();
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui::side_panel(ui, &mut self.state);
            });
        });

        egui::TopBottomPanel::bottom("debug_panel")
            .resizable(true)
            .min_height(50.0)
            .default_height(self.state.debug_panel_height)
            .show_animated(ctx, self.state.debug_panel_visible, |ui| {
                self.state.debug_panel_height = ui.available_height();

                ui.horizontal(|ui| {
                    ui.heading("Debug Output");
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.button("Clear").clicked() {
                            self.state.debug_output.clear();
                        }
                        if ui.button("Hide").clicked() {
                            self.state.debug_panel_visible = false;
                        }
                    });
                });
                ui.separator();

                egui::ScrollArea::vertical()
                    .stick_to_bottom(true)
                    .show(ui, |ui| {
                        ui.add(
                            egui::TextEdit::multiline(&mut self.state.debug_output)
                                .desired_width(f32::INFINITY)
                                .desired_rows(10)
                                .font(egui::TextStyle::Monospace)
                                .code_editor()
                                .lock_focus(false)
                                .interactive(false),
                        );
                    });
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui::tab_bar(ui, &mut self.state);
            ui.separator();

            match self.state.selected_tab {
                Tab::Umap => ui::umap_tab(ui, &mut self.state),
                Tab::Files => ui::files_tab(ui, &mut self.state),
                Tab::Datasets => ui::datasets_tab(ui, &mut self.state),
            }

            if !self.state.debug_panel_visible {
                ui.with_layout(egui::Layout::bottom_up(egui::Align::Center), |ui| {
                    if ui.button("Show Debug Panel").clicked() {
                        self.state.debug_panel_visible = true;
                    }
                });
            }
        });
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    let options = eframe::NativeOptions::default();
    eframe::run_native(
        "CellScope",
        options,
        Box::new(|_cc| Ok(Box::new(CellScopeApp::default()))),
    )?;

    Ok(())
}
