//! egui overlay: bookmark panel, toolbar toggles, toasts, blocking
//! overlays and POI labels

use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts, EguiPrimaryContextPass};
use splatview_core::{CameraAuthority, Overlay, ToastKind};

use crate::app::{now_ms, UiLayout, ViewerState};
use crate::sensors::permission_support;

pub struct UiPlugin;

impl Plugin for UiPlugin {
    fn build(&self, app: &mut App) {
        // Main UI system runs in EguiPrimaryContextPass for proper input handling (bevy_egui 0.38+)
        app.add_systems(EguiPrimaryContextPass, ui_system);
    }
}

const ACCENT: egui::Color32 = egui::Color32::from_rgb(0x4a, 0x90, 0xe2);

fn toast_color(kind: ToastKind) -> egui::Color32 {
    match kind {
        ToastKind::Info => ACCENT,
        ToastKind::Warning => egui::Color32::from_rgb(0xe6, 0xa2, 0x3c),
        ToastKind::Error => egui::Color32::from_rgb(0xd9, 0x48, 0x3b),
    }
}

fn ui_system(
    mut contexts: EguiContexts,
    mut state: ResMut<ViewerState>,
    mut layout: ResMut<UiLayout>,
    time: Res<Time<Real>>,
) {
    let Ok(ctx) = contexts.ctx_mut() else { return };
    let now = now_ms(&time);
    let ui_scale = layout.ui_scale;
    let ViewerState {
        viewer,
        orbit,
        labels,
    } = &mut *state;

    // POI labels go underneath every panel
    for (id, label) in labels.iter() {
        if !label.visible {
            continue;
        }
        egui::Area::new(egui::Id::new(("poi-label", id.0)))
            .order(egui::Order::Background)
            .fixed_pos(egui::pos2(label.screen.x, label.screen.y))
            .pivot(egui::Align2::CENTER_BOTTOM)
            .interactable(false)
            .show(ctx, |ui| {
                egui::Frame::new()
                    .fill(egui::Color32::from_black_alpha(170))
                    .corner_radius(4.0)
                    .inner_margin(egui::Margin::symmetric(6, 3))
                    .show(ui, |ui| {
                        ui.label(egui::RichText::new(&label.text).color(egui::Color32::WHITE));
                    });
            });
    }

    egui::TopBottomPanel::bottom("toolbar").show(ctx, |ui| {
        ui.horizontal(|ui| {
            let menu_text = if layout.show_panel { "☰ Views ✕" } else { "☰ Views" };
            if ui.button(egui::RichText::new(menu_text).size(14.0 * ui_scale)).clicked() {
                layout.show_panel = !layout.show_panel;
            }

            ui.separator();

            let icons_text = if viewer.show_poi_icons() { "Hide POIs" } else { "Show POIs" };
            if ui.button(egui::RichText::new(icons_text).size(14.0 * ui_scale)).clicked() {
                viewer.toggle_poi_icons(labels);
            }

            let orientation = viewer.orientation();
            let gyro_text = if orientation.is_active() {
                "Gyro on"
            } else if orientation.is_enabling() {
                "Gyro…"
            } else {
                "Gyro off"
            };
            if ui.button(egui::RichText::new(gyro_text).size(14.0 * ui_scale)).clicked() {
                viewer.toggle_orientation(permission_support(), now, orbit);
            }

            if viewer.ar().is_supported() {
                let ar_text = if viewer.ar().is_active() { "Exit AR" } else { "AR" };
                if ui.button(egui::RichText::new(ar_text).size(14.0 * ui_scale)).clicked() {
                    viewer.toggle_ar();
                }
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let status = match viewer.authority() {
                    CameraAuthority::Flight => "flying",
                    CameraAuthority::OrientationFusion => "gyro",
                    CameraAuthority::OrbitDrag => "orbit",
                };
                ui.weak(status);
            });
        });
    });

    if layout.show_panel {
        let mut selected = None;
        egui::SidePanel::left("bookmarks_panel")
            .default_width(if layout.is_mobile { 200.0 } else { 240.0 })
            .resizable(!layout.is_mobile)
            .show(ctx, |ui| {
                ui.heading("Views");
                ui.separator();
                egui::ScrollArea::vertical().show(ui, |ui| {
                    if viewer.bookmarks().is_empty() {
                        ui.weak("No saved views");
                    }
                    for bookmark in viewer.bookmarks() {
                        let active = viewer.active_bookmark() == Some(bookmark.id.as_str());
                        let title = if bookmark.name.is_empty() {
                            bookmark.id.as_str()
                        } else {
                            bookmark.name.as_str()
                        };
                        let response = ui
                            .add_enabled_ui(!viewer.is_flying(), |ui| {
                                ui.selectable_label(
                                    active,
                                    egui::RichText::new(title).size(14.0 * ui_scale),
                                )
                            })
                            .inner;
                        let response = match &bookmark.description {
                            Some(description) => response.on_hover_text(description),
                            None => response,
                        };
                        if response.clicked() {
                            selected = Some(bookmark.id.clone());
                        }
                    }

                    if let Some(active) = viewer.active_poi() {
                        ui.separator();
                        let name = viewer
                            .pois()
                            .iter()
                            .find(|poi| poi.id == active)
                            .map(|poi| poi.name.as_str())
                            .filter(|name| !name.is_empty())
                            .unwrap_or(active);
                        ui.label(egui::RichText::new(name).strong().color(ACCENT));
                    }
                });
            });
        if let Some(id) = selected {
            viewer.select_bookmark(&id, now, orbit);
            if layout.is_mobile {
                layout.show_panel = false;
            }
        }
    }

    if let Some(toast) = viewer.toast() {
        egui::Area::new(egui::Id::new("toast"))
            .order(egui::Order::Foreground)
            .anchor(egui::Align2::CENTER_TOP, egui::vec2(0.0, 16.0))
            .interactable(false)
            .show(ctx, |ui| {
                egui::Frame::new()
                    .fill(toast_color(toast.kind))
                    .corner_radius(6.0)
                    .inner_margin(egui::Margin::symmetric(14, 8))
                    .show(ui, |ui| {
                        ui.label(
                            egui::RichText::new(&toast.message)
                                .color(egui::Color32::WHITE)
                                .size(14.0 * ui_scale),
                        );
                    });
            });
    }

    // Only the most important overlay is shown
    if let Some(overlay) = viewer.overlays().into_iter().next() {
        let (title, detail) = match &overlay {
            Overlay::Loading => ("Loading scene…", None),
            Overlay::SceneLoadError(message) => ("The scene could not be loaded", Some(message.as_str())),
            Overlay::RotateDevice => ("Please rotate your device", Some("This viewer works best in landscape")),
        };
        egui::Area::new(egui::Id::new("blocking_overlay"))
            .order(egui::Order::Foreground)
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                egui::Frame::window(ui.style()).show(ui, |ui| {
                    ui.vertical_centered(|ui| {
                        if overlay == Overlay::Loading {
                            ui.spinner();
                        }
                        ui.heading(title);
                        if let Some(detail) = detail {
                            ui.label(detail);
                        }
                    });
                });
            });
    }
}
