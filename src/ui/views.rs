use chrono::{Datelike, Duration, Local, NaiveDate, Weekday};
use egui::{Color32, Ui};

use crate::api::format_duration;
use super::panel::{WorklogPanel, MINUTES_PER_DAY};
use super::theme::{grid_colors, overflow_color, panel_colors};

/// Result from week view interactions
#[derive(Default)]
pub struct WeekViewResult {
    pub open_url: Option<String>,
}

/// Monday of the week containing `date`
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

fn day_name(day: NaiveDate) -> &'static str {
    match day.weekday() {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

fn seconds_for_day(panels: &[WorklogPanel], day: NaiveDate) -> i64 {
    panels
        .iter()
        .filter(|p| p.date().date_naive() == day)
        .map(|p| p.worklog().time_spent_seconds.max(0))
        .fold(0, i64::saturating_add)
}

pub fn render_week_view(
    ui: &mut Ui,
    week_start: NaiveDate,
    panels: &mut [WorklogPanel],
    pixels_per_minute: f32,
    dark: bool,
) -> WeekViewResult {
    let mut result = WeekViewResult::default();
    let days: Vec<NaiveDate> = (0..7).map(|i| week_start + Duration::days(i)).collect();
    let today = Local::now().date_naive();

    // Layout constants
    let hour_label_width = 60.0;
    let header_height = 32.0;
    let (grid_line_color, hour_line_color, label_color) = grid_colors(dark);

    let total_grid_height = MINUTES_PER_DAY * pixels_per_minute;
    let hour_height = 60.0 * pixels_per_minute;

    let available_width = ui.available_width();
    let day_width = (available_width - hour_label_width) / days.len() as f32;

    // Fixed day headers (outside ScrollArea)
    let (header_rect, _) = ui.allocate_exact_size(
        egui::vec2(available_width, header_height),
        egui::Sense::hover(),
    );
    let painter = ui.painter();

    for (i, day) in days.iter().enumerate() {
        let x = header_rect.min.x + hour_label_width + i as f32 * day_width;
        let name = if *day == today { "Today" } else { day_name(*day) };
        let seconds = seconds_for_day(panels, *day);
        let text = if seconds > 0 {
            format!("{} {}  {}", name, day.day(), format_duration(seconds))
        } else {
            format!("{} {}", name, day.day())
        };

        painter.text(
            egui::pos2(x + 8.0, header_rect.center().y),
            egui::Align2::LEFT_CENTER,
            text,
            egui::FontId::proportional(14.0),
            label_color,
        );

        if i > 0 {
            painter.line_segment(
                [
                    egui::pos2(x, header_rect.min.y + 4.0),
                    egui::pos2(x, header_rect.max.y - 4.0),
                ],
                egui::Stroke::new(1.0, grid_line_color),
            );
        }
    }

    egui::ScrollArea::vertical().show(ui, |ui| {
        let (grid_rect, _) = ui.allocate_exact_size(
            egui::vec2(available_width, total_grid_height),
            egui::Sense::hover(),
        );
        let painter = ui.painter().clone();

        // Highlight current day column
        if let Some(i) = days.iter().position(|d| *d == today) {
            let col_x = grid_rect.min.x + hour_label_width + i as f32 * day_width;
            let col_rect = egui::Rect::from_min_size(
                egui::pos2(col_x, grid_rect.min.y),
                egui::vec2(day_width, total_grid_height),
            );
            painter.rect_filled(col_rect, 0.0, ui.visuals().faint_bg_color);
        }

        // Hour lines and labels
        for hour in 0..24 {
            let y = grid_rect.min.y + hour as f32 * hour_height;
            painter.line_segment(
                [
                    egui::pos2(grid_rect.min.x + hour_label_width, y),
                    egui::pos2(grid_rect.max.x, y),
                ],
                egui::Stroke::new(1.0, hour_line_color),
            );
            if hour_height >= 14.0 || hour % 3 == 0 {
                painter.text(
                    egui::pos2(grid_rect.min.x + hour_label_width - 8.0, y + 2.0),
                    egui::Align2::RIGHT_TOP,
                    format!("{:02}:00", hour),
                    egui::FontId::proportional(12.0),
                    label_color,
                );
            }
        }

        // Vertical grid lines for columns
        for i in 0..days.len() {
            let x = grid_rect.min.x + hour_label_width + i as f32 * day_width;
            painter.line_segment(
                [egui::pos2(x, grid_rect.min.y), egui::pos2(x, grid_rect.max.y)],
                egui::Stroke::new(1.0, grid_line_color),
            );
        }

        for (index, panel) in panels.iter_mut().enumerate() {
            let day_index = (panel.date().date_naive() - week_start).num_days();
            if !(0..days.len() as i64).contains(&day_index) {
                continue;
            }

            let col_x = grid_rect.min.x + hour_label_width + day_index as f32 * day_width;
            let rect = egui::Rect::from_min_size(
                egui::pos2(
                    col_x + panel.panel_offset_left() * day_width + 1.0,
                    grid_rect.min.y + panel.panel_offset_top(),
                ),
                egui::vec2(
                    (panel.panel_width() * day_width - 2.0).max(2.0),
                    panel.panel_height().max(2.0),
                ),
            );

            if let Some(url) = render_panel(ui, &painter, rect, panel, index, dark) {
                result.open_url = Some(url);
            }
        }
    });

    result
}

/// Paint one panel, measure its content and apply any pending size check.
/// Returns the issue URL when the panel was clicked.
fn render_panel(
    ui: &mut Ui,
    painter: &egui::Painter,
    rect: egui::Rect,
    panel: &mut WorklogPanel,
    index: usize,
    dark: bool,
) -> Option<String> {
    let (fill, border, text_color) = panel_colors(panel.panel_hue(), dark);
    let corner_radius = 4.0;
    painter.rect(rect, corner_radius, fill, egui::Stroke::new(1.0, border));

    let worklog = panel.worklog();
    let mut lines = vec![
        (format!("{} {}", worklog.issue.key, worklog.issue.fields.summary), 13.0),
        (panel.time_range(), 12.0),
    ];
    if let Some(components) = panel.components() {
        lines.push((components, 12.0));
    }

    let padding = 4.0;
    let wrap_width = (rect.width() - padding * 2.0).max(1.0);
    let clipped = painter.with_clip_rect(rect.intersect(painter.clip_rect()));
    let mut y = rect.min.y + padding;
    for (text, size) in &lines {
        let galley = painter.layout(text.clone(), egui::FontId::proportional(*size), text_color, wrap_width);
        let height = galley.size().y;
        clipped.galley(egui::pos2(rect.min.x + padding, y), galley, text_color);
        y += height + 2.0;
    }
    let content_height = y - rect.min.y + padding - 2.0;

    if panel.after_layout(content_height) {
        ui.ctx().request_repaint();
    }

    if panel.undersized() || panel.too_low() {
        let edge = egui::Rect::from_min_max(
            egui::pos2(rect.min.x, rect.max.y - 3.0),
            rect.max,
        );
        painter.rect_filled(edge, 0.0, overflow_color());
    }

    let response = ui
        .interact(rect, ui.id().with(("worklog", index)), egui::Sense::click())
        .on_hover_ui(|ui| {
            for (text, _) in &lines {
                ui.label(text.as_str());
            }
        });

    if response.hovered() {
        painter.rect_stroke(rect, corner_radius, egui::Stroke::new(2.0, Color32::WHITE.gamma_multiply(0.6)));
    }

    response.clicked().then(|| panel.issue_url())
}
