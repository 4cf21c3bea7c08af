//! Sidebar: account, conversation list and navigation.

use egui::{self, RichText, ScrollArea, Vec2};
use crate::state::UiState;
use crate::theme::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SidebarAction {
    NewConversation,
    Switch(String),
    Refresh,
    ToggleSettings,
    Logout,
}

pub fn sidebar_panel(
    ui: &mut egui::Ui,
    state: &UiState,
    active_chat_id: Option<&str>,
) -> Option<SidebarAction> {
    let mut action = None;

    egui::Frame::default()
        .fill(BG_SECONDARY)
        .inner_margin(PANEL_PADDING)
        .show(ui, |ui| {
            if let Some(user) = &state.signed_in {
                let name = if user.name.is_empty() { &user.email } else { &user.name };
                ui.label(RichText::new(name).color(TEXT_PRIMARY).strong());
                ui.label(RichText::new(&user.email).color(TEXT_SECONDARY).small());
            }
            ui.add_space(6.0);

            let new_btn = ui.add(
                egui::Button::new(RichText::new("+ New chat").color(TEXT_PRIMARY).strong())
                    .fill(ACCENT)
                    .corner_radius(PANEL_ROUNDING)
                    .min_size(Vec2::new(ui.available_width(), 28.0)),
            );
            if new_btn.clicked() {
                action = Some(SidebarAction::NewConversation);
            }

            ui.add_space(6.0);
            ui.horizontal(|ui| {
                ui.label(RichText::new("Conversations").color(ACCENT).strong());
                if ui.small_button("⟳").on_hover_text("Refresh").clicked() {
                    action = Some(SidebarAction::Refresh);
                }
            });
            ui.separator();

            let list_height = ui.available_height() - 70.0;
            ScrollArea::vertical()
                .max_height(list_height)
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    if state.conversations.is_empty() {
                        ui.label(
                            RichText::new("No conversations yet")
                                .color(TEXT_SECONDARY)
                                .small()
                                .italics(),
                        );
                    }
                    for conversation in &state.conversations {
                        let selected = active_chat_id == Some(conversation.chat_id.as_str());
                        let title = if conversation.title.is_empty() {
                            "Untitled"
                        } else {
                            conversation.title.as_str()
                        };
                        let response = ui.selectable_label(selected, title);
                        let response = match &conversation.created_at {
                            Some(created) => response.on_hover_text(created),
                            None => response,
                        };
                        if response.clicked() && !selected {
                            action = Some(SidebarAction::Switch(conversation.chat_id.clone()));
                        }
                    }
                });

            ui.separator();
            ui.horizontal(|ui| {
                let label = if state.show_settings { "Close settings" } else { "Settings" };
                if ui.button(label).clicked() {
                    action = Some(SidebarAction::ToggleSettings);
                }
                if ui.button(RichText::new("Log out").color(ERROR)).clicked() {
                    action = Some(SidebarAction::Logout);
                }
            });
        });

    action
}
