use crate::viewer::ViewerState;
use egui::{Align2, Context};

/// What the user asked for this frame
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum UiAction {
    #[default]
    None,
    Previous,
    Next,
}

/// What the overlay shows
pub struct UiStatus<'a> {
    pub title: &'a str,
    pub state: ViewerState,
    pub loading_path: Option<&'a str>,
    pub position: usize,
    pub count: usize,
    pub delta_time_ms: f32,
}

pub fn app_ui(ctx: &Context, status: &UiStatus) -> UiAction {
    let mut action = UiAction::None;

    egui::Window::new("Model")
        .title_bar(false)
        .resizable(false)
        .anchor(Align2::CENTER_TOP, [0.0, 10.0])
        .show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                let title = if status.title.is_empty() {
                    "No model loaded"
                } else {
                    status.title
                };
                ui.heading(title);

                if let (ViewerState::Loading, Some(path)) = (status.state, status.loading_path) {
                    ui.label(format!("Loading {}…", path));
                }

                ui.horizontal(|ui| {
                    if ui.button("◀ Previous").clicked() {
                        action = UiAction::Previous;
                    }
                    ui.label(format!("{} / {}", status.position + 1, status.count));
                    if ui.button("Next ▶").clicked() {
                        action = UiAction::Next;
                    }
                });

                ui.small(format!("{:.1} ms", status.delta_time_ms));
            });
        });

    action
}
