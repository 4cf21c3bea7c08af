//! Chat panel: the active conversation's timeline and the input field.
//! User messages carry Edit and Delete controls; the one being edited is
//! replaced by a text area bound to `UiState::edit_buffer`.

use egui::{self, Align, Layout, RichText, ScrollArea, Vec2};
use chat_core::EditDraft;
use chat_types::message::{Message, MessageKind};
use crate::state::{Banner, UiState};
use crate::theme::*;

/// What the user asked for this frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatAction {
    Send(String),
    BeginEdit(String),
    UpdateDraft(String),
    SaveEdit,
    CancelEdit,
    Delete(String),
    Retry,
}

/// Render the chat panel. Returns the action the user triggered, if any.
pub fn chat_panel(
    ui: &mut egui::Ui,
    state: &mut UiState,
    title: &str,
    messages: &[Message],
    editing: Option<&EditDraft>,
) -> Option<ChatAction> {
    let mut action = None;

    egui::Frame::default()
        .fill(BG_PRIMARY)
        .inner_margin(PANEL_PADDING)
        .show(ui, |ui| {
            ui.vertical(|ui| {
                // Header
                ui.horizontal(|ui| {
                    ui.heading(RichText::new(title).color(TEXT_PRIMARY).strong());
                    ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                        let status_color = if state.is_connected() {
                            SUCCESS
                        } else if state.is_connecting() {
                            WARNING
                        } else {
                            ERROR
                        };
                        if !state.is_connected() && !state.is_connecting() && ui.small_button("Retry").clicked() {
                            action = Some(ChatAction::Retry);
                        }
                        ui.label(RichText::new(&state.status_text).color(status_color).small());
                    });
                });

                ui.separator();

                // Messages area
                let available_height = ui.available_height() - 90.0;
                ScrollArea::vertical()
                    .max_height(available_height)
                    .auto_shrink([false, false])
                    .stick_to_bottom(true)
                    .show(ui, |ui| {
                        if messages.is_empty() {
                            ui.label(
                                RichText::new("No messages yet.")
                                    .color(TEXT_SECONDARY)
                                    .italics(),
                            );
                        }
                        for message in messages {
                            let being_edited = editing.is_some_and(|d| d.message_id == message.id);
                            let result = if being_edited {
                                render_editor(ui, &mut state.edit_buffer)
                            } else {
                                render_message(ui, message, editing.is_none())
                            };
                            if result.is_some() {
                                action = result;
                            }
                            ui.add_space(4.0);
                        }
                    });

                if let Some(banner) = &state.banner {
                    render_banner(ui, banner);
                }

                ui.add_space(8.0);

                // Input area
                ui.horizontal(|ui| {
                    let input = egui::TextEdit::singleline(&mut state.input_text)
                        .hint_text("Type a message...")
                        .desired_width(ui.available_width() - 70.0)
                        .font(egui::FontId::proportional(14.0));

                    let response = ui.add(input);

                    let send_enabled = state.can_send();
                    let send_btn = ui.add_enabled(
                        send_enabled,
                        egui::Button::new(RichText::new("Send").color(TEXT_PRIMARY))
                            .fill(if send_enabled { ACCENT } else { BG_SURFACE })
                            .corner_radius(PANEL_ROUNDING)
                            .min_size(Vec2::new(60.0, 0.0)),
                    );

                    // Submit on Enter or button click
                    if (response.lost_focus()
                        && ui.input(|i| i.key_pressed(egui::Key::Enter))
                        && send_enabled)
                        || send_btn.clicked()
                    {
                        action = Some(ChatAction::Send(state.input_text.trim().to_string()));
                        state.input_text.clear();
                        response.request_focus();
                    }
                });
            });
        });

    action
}

fn render_message(ui: &mut egui::Ui, message: &Message, controls: bool) -> Option<ChatAction> {
    let mut action = None;
    let (label_color, bg) = match message.kind() {
        MessageKind::User => (ACCENT, BG_USER),
        MessageKind::Assistant => (SUCCESS, BG_SECONDARY),
    };

    egui::Frame::default()
        .fill(bg)
        .corner_radius(PANEL_ROUNDING)
        .inner_margin(8.0)
        .show(ui, |ui| {
            ui.horizontal(|ui| {
                ui.label(
                    RichText::new(message.author.display_name())
                        .color(label_color)
                        .strong()
                        .small(),
                );
                ui.label(
                    RichText::new(message.created_at.format("%H:%M").to_string())
                        .color(TEXT_SECONDARY)
                        .small(),
                );
                if controls && message.is_editable() {
                    ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                        if ui.small_button("Delete").clicked() {
                            action = Some(ChatAction::Delete(message.id.clone()));
                        }
                        if ui.small_button("Edit").clicked() {
                            action = Some(ChatAction::BeginEdit(message.id.clone()));
                        }
                    });
                }
            });
            ui.label(RichText::new(&message.body).color(TEXT_PRIMARY));
        });

    action
}

fn render_editor(ui: &mut egui::Ui, buffer: &mut String) -> Option<ChatAction> {
    let mut action = None;

    egui::Frame::default()
        .fill(BG_USER)
        .corner_radius(PANEL_ROUNDING)
        .inner_margin(8.0)
        .show(ui, |ui| {
            ui.label(RichText::new("Editing").color(WARNING).strong().small());
            let response = ui.add(
                egui::TextEdit::multiline(buffer)
                    .desired_rows(2)
                    .desired_width(f32::INFINITY),
            );
            if response.changed() {
                action = Some(ChatAction::UpdateDraft(buffer.clone()));
            }
            ui.label(
                RichText::new("Saving removes this message and everything after it, then sends the new text.")
                    .color(TEXT_SECONDARY)
                    .small()
                    .italics(),
            );
            ui.horizontal(|ui| {
                let can_save = !buffer.trim().is_empty();
                if ui.add_enabled(can_save, egui::Button::new("Save")).clicked() {
                    action = Some(ChatAction::SaveEdit);
                }
                if ui.button("Cancel").clicked() {
                    action = Some(ChatAction::CancelEdit);
                }
            });
        });

    action
}

fn render_banner(ui: &mut egui::Ui, banner: &Banner) {
    let (fg, bg) = if banner.is_error {
        (ERROR, BG_ERROR)
    } else {
        (TEXT_SECONDARY, BG_SECONDARY)
    };
    egui::Frame::default()
        .fill(bg)
        .corner_radius(PANEL_ROUNDING)
        .inner_margin(6.0)
        .show(ui, |ui| {
            ui.label(RichText::new(&banner.text).color(fg).small());
        });
}
