use egui::ecolor::Hsva;
use egui::{Color32, FontFamily, FontId, Rounding, Stroke, Style, TextStyle, Visuals};

const ACCENT: Color32 = Color32::from_rgb(19, 152, 244);

pub fn setup_fonts(ctx: &egui::Context) {
    let mut fonts = egui::FontDefinitions::default();

    // Add Phosphor Regular icons as fallback in Proportional family
    egui_phosphor::add_to_fonts(&mut fonts, egui_phosphor::Variant::Regular);

    ctx.set_fonts(fonts);
}

/// Install dark or light visuals; called whenever the dark-mode flag changes
pub fn apply_theme(ctx: &egui::Context, dark: bool) {
    let mut style = Style::default();
    style.visuals = if dark { dark_visuals() } else { light_visuals() };

    style.text_styles = [
        (TextStyle::Small, FontId::new(12.0, FontFamily::Proportional)),
        (TextStyle::Body, FontId::new(14.0, FontFamily::Proportional)),
        (TextStyle::Button, FontId::new(14.0, FontFamily::Proportional)),
        (TextStyle::Heading, FontId::new(18.0, FontFamily::Proportional)),
        (TextStyle::Monospace, FontId::new(13.0, FontFamily::Monospace)),
    ]
    .into();

    style.spacing.item_spacing = egui::vec2(10.0, 8.0);
    style.spacing.button_padding = egui::vec2(12.0, 6.0);
    style.spacing.window_margin = egui::Margin::same(20.0);

    ctx.set_style(style);
}

fn dark_visuals() -> Visuals {
    let mut visuals = Visuals::dark();

    // Background colors - pure black
    let bg = Color32::BLACK;
    visuals.panel_fill = bg;
    visuals.window_fill = bg;
    visuals.faint_bg_color = Color32::from_rgb(20, 20, 18);
    visuals.extreme_bg_color = bg;

    // Widget colors - warm grays (R=G > B for warmth)
    visuals.widgets.noninteractive.bg_fill = Color32::from_rgb(40, 40, 38);
    visuals.widgets.noninteractive.fg_stroke = Stroke::new(1.0, Color32::from_rgb(176, 176, 168));
    visuals.widgets.inactive.bg_fill = Color32::from_rgb(56, 56, 52);
    visuals.widgets.inactive.fg_stroke = Stroke::new(1.0, Color32::from_rgb(200, 200, 192));
    visuals.widgets.hovered.bg_fill = Color32::from_rgb(80, 80, 74);
    visuals.widgets.hovered.fg_stroke = Stroke::new(1.0, Color32::WHITE);

    finish(visuals)
}

fn light_visuals() -> Visuals {
    let mut visuals = Visuals::light();

    visuals.panel_fill = Color32::from_rgb(250, 250, 247);
    visuals.window_fill = Color32::WHITE;
    visuals.faint_bg_color = Color32::from_rgb(240, 240, 236);
    visuals.widgets.inactive.bg_fill = Color32::from_rgb(226, 226, 220);
    visuals.widgets.hovered.bg_fill = Color32::from_rgb(208, 208, 200);

    finish(visuals)
}

fn finish(mut visuals: Visuals) -> Visuals {
    // Accent color for active/pressed buttons
    visuals.widgets.active.bg_fill = ACCENT;
    visuals.widgets.active.fg_stroke = Stroke::new(1.0, Color32::WHITE);
    visuals.selection.bg_fill = ACCENT;
    visuals.selection.stroke = Stroke::new(1.0, Color32::WHITE);
    visuals.hyperlink_color = ACCENT;

    visuals.widgets.noninteractive.rounding = Rounding::same(6.0);
    visuals.widgets.inactive.rounding = Rounding::same(6.0);
    visuals.widgets.hovered.rounding = Rounding::same(6.0);
    visuals.widgets.active.rounding = Rounding::same(6.0);
    visuals.window_rounding = Rounding::same(8.0);
    visuals
}

/// Returns (fill, border, text) for a worklog panel of the given hue
pub fn panel_colors(hue: u16, dark: bool) -> (Color32, Color32, Color32) {
    let h = hue as f32 / 360.0;
    if dark {
        (
            Hsva::new(h, 0.55, 0.30, 1.0).into(),
            Hsva::new(h, 0.65, 0.75, 1.0).into(),
            Color32::WHITE,
        )
    } else {
        (
            Hsva::new(h, 0.25, 0.97, 1.0).into(),
            Hsva::new(h, 0.70, 0.65, 1.0).into(),
            Color32::from_rgb(30, 30, 28),
        )
    }
}

/// Returns (grid_line, hour_line, label) colors for the week grid
pub fn grid_colors(dark: bool) -> (Color32, Color32, Color32) {
    if dark {
        (
            Color32::from_rgb(0x40, 0x40, 0x3c),
            Color32::from_rgb(0x50, 0x50, 0x4a),
            Color32::from_rgb(0xb0, 0xb0, 0xa8),
        )
    } else {
        (
            Color32::from_rgb(0xe0, 0xe0, 0xda),
            Color32::from_rgb(0xc8, 0xc8, 0xc0),
            Color32::from_rgb(0x60, 0x60, 0x5a),
        )
    }
}

/// Color of the warning edge on panels whose content does not fit
pub fn overflow_color() -> Color32 {
    Color32::from_rgb(0xec, 0x71, 0x1b)
}

/// Returns (content_bg, frame_color) for dialogs
pub fn dialog_colors(dark: bool) -> (Color32, Color32) {
    if dark {
        (Color32::BLACK, Color32::from_rgb(40, 40, 38))
    } else {
        (Color32::WHITE, Color32::from_rgb(208, 208, 200))
    }
}
