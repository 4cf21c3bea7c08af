//! Sign-in / sign-up form shown until an account is available.

use egui::{self, RichText, Vec2};
use crate::state::{AuthMode, LoginForm};
use crate::theme::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginAction {
    Login { email: String, password: String },
    Register { email: String, password: String, full_name: String },
}

pub fn login_panel(ui: &mut egui::Ui, form: &mut LoginForm) -> Option<LoginAction> {
    let mut action = None;

    ui.vertical_centered(|ui| {
        ui.add_space(ui.available_height() * 0.15);
        egui::Frame::default()
            .fill(BG_SECONDARY)
            .corner_radius(PANEL_ROUNDING)
            .inner_margin(PANEL_PADDING * 2.0)
            .show(ui, |ui| {
                ui.set_max_width(320.0);
                let heading = match form.mode {
                    AuthMode::Login => "Sign in",
                    AuthMode::Register => "Create an account",
                };
                ui.heading(RichText::new(heading).color(TEXT_PRIMARY).strong());
                ui.add_space(8.0);

                if form.mode == AuthMode::Register {
                    ui.label(RichText::new("Full name").color(TEXT_SECONDARY).small());
                    ui.text_edit_singleline(&mut form.full_name);
                    ui.add_space(4.0);
                }

                ui.label(RichText::new("Email").color(TEXT_SECONDARY).small());
                ui.text_edit_singleline(&mut form.email);
                ui.add_space(4.0);

                ui.label(RichText::new("Password").color(TEXT_SECONDARY).small());
                let password = ui.add(egui::TextEdit::singleline(&mut form.password).password(true));
                let enter = password.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));

                if let Some(error) = &form.error {
                    ui.add_space(4.0);
                    ui.label(RichText::new(error).color(ERROR).small());
                }

                ui.add_space(8.0);
                let label = match (form.mode, form.pending) {
                    (_, true) => "Please wait...",
                    (AuthMode::Login, false) => "Sign in",
                    (AuthMode::Register, false) => "Sign up",
                };
                let submit = ui.add_enabled(
                    form.can_submit(),
                    egui::Button::new(RichText::new(label).color(TEXT_PRIMARY).strong())
                        .fill(ACCENT)
                        .corner_radius(PANEL_ROUNDING)
                        .min_size(Vec2::new(120.0, 28.0)),
                );

                if (submit.clicked() || enter) && form.can_submit() {
                    form.error = None;
                    form.pending = true;
                    let email = form.email.trim().to_string();
                    let password = form.password.clone();
                    action = Some(match form.mode {
                        AuthMode::Login => LoginAction::Login { email, password },
                        AuthMode::Register => LoginAction::Register {
                            email,
                            password,
                            full_name: form.full_name.trim().to_string(),
                        },
                    });
                }

                ui.add_space(6.0);
                let switch = match form.mode {
                    AuthMode::Login => "No account? Sign up",
                    AuthMode::Register => "Already registered? Sign in",
                };
                if ui.link(switch).clicked() && !form.pending {
                    form.toggle_mode();
                }
            });
    });

    action
}
