//! Geometry and size checks for a single worklog on the week grid.
//!
//! All lengths are in points. The vertical axis is a whole day of
//! `MINUTES_PER_DAY * pixels_per_minute`; the horizontal axis is a fraction
//! of the day column width.

use chrono::{DateTime, Datelike, Local, Timelike};
use tokio::sync::watch;

use crate::api::{format_clock_time, Worklog};
use crate::config::ClockFormat;
use super::signals::Signals;

pub const MINUTES_PER_DAY: f32 = 1440.0;

const GOLDEN_RATIO: f64 = 1.61803;

struct Subscriptions {
    viewport: watch::Receiver<egui::Vec2>,
    jira_url: watch::Receiver<String>,
}

pub struct WorklogPanel {
    worklog: Worklog,
    pixels_per_minute: f32,
    clock_format: ClockFormat,
    jira_url: String,
    undersized: bool,
    too_low: bool,
    recheck_pending: bool,
    torn_down: bool,
    subscriptions: Option<Subscriptions>,
}

impl WorklogPanel {
    pub fn new(worklog: Worklog, pixels_per_minute: f32, clock_format: ClockFormat, signals: &Signals) -> Self {
        let viewport = signals.subscribe_viewport();
        let mut jira_url = signals.subscribe_jira_url();
        let url = jira_url.borrow_and_update().clone();

        Self {
            worklog,
            pixels_per_minute,
            clock_format,
            jira_url: url,
            undersized: false,
            too_low: false,
            // First layout has not been measured yet
            recheck_pending: true,
            torn_down: false,
            subscriptions: Some(Subscriptions { viewport, jira_url }),
        }
    }

    pub fn worklog(&self) -> &Worklog {
        &self.worklog
    }

    pub fn set_worklog(&mut self, worklog: Worklog) {
        self.worklog = worklog;
        self.schedule_recheck();
    }

    pub fn set_pixels_per_minute(&mut self, pixels_per_minute: f32) {
        self.pixels_per_minute = pixels_per_minute;
        self.schedule_recheck();
    }

    pub fn set_clock_format(&mut self, clock_format: ClockFormat) {
        self.clock_format = clock_format;
    }

    fn schedule_recheck(&mut self) {
        self.recheck_pending = true;
    }

    /// Drain subscription updates; call once per frame before laying out
    pub fn poll_signals(&mut self) {
        let Some(subs) = self.subscriptions.as_mut() else {
            return;
        };
        let resized = subs.viewport.has_changed().unwrap_or(false);
        if resized {
            subs.viewport.borrow_and_update();
        }
        if subs.jira_url.has_changed().unwrap_or(false) {
            self.jira_url = subs.jira_url.borrow_and_update().clone();
        }
        if resized {
            self.schedule_recheck();
        }
    }

    /// Apply a pending recheck against the content height measured in this layout pass.
    ///
    /// Returns true when the flags were re-evaluated, so the caller can repaint.
    pub fn after_layout(&mut self, content_height: f32) -> bool {
        if !self.recheck_pending || self.torn_down {
            return false;
        }
        self.recheck_pending = false;
        self.check_size_and_position(content_height);
        true
    }

    pub fn check_size_and_position(&mut self, content_height: f32) {
        if self.torn_down {
            return;
        }
        self.undersized = content_height > self.panel_height();
        self.too_low = content_height + 1.0 > self.max_height();
    }

    /// Stop reacting to anything; releases all subscriptions
    pub fn tear_down(&mut self) {
        self.torn_down = true;
        self.subscriptions = None;
    }

    pub fn undersized(&self) -> bool {
        self.undersized
    }

    pub fn too_low(&self) -> bool {
        self.too_low
    }

    pub fn issue_url(&self) -> String {
        format!("{}/browse/{}", self.jira_url, self.worklog.issue.key)
    }

    pub fn date(&self) -> DateTime<Local> {
        self.worklog.started.with_timezone(&Local)
    }

    /// Fraction of the day column
    pub fn panel_width(&self) -> f32 {
        1.0 / self.worklog.columns.max(1) as f32
    }

    pub fn panel_height(&self) -> f32 {
        let minutes = self.worklog.time_spent_seconds.max(0) as f32 / 60.0;
        (minutes * self.pixels_per_minute).min(self.max_height())
    }

    /// Room left before midnight
    pub fn max_height(&self) -> f32 {
        MINUTES_PER_DAY * self.pixels_per_minute - self.panel_offset_top()
    }

    pub fn panel_offset_top(&self) -> f32 {
        let date = self.date();
        (date.hour() * 60 + date.minute()) as f32 * self.pixels_per_minute
    }

    /// Fraction of the day column
    pub fn panel_offset_left(&self) -> f32 {
        self.worklog.column as f32 * self.panel_width()
    }

    /// Hue in degrees, spread around the wheel by the issue (or parent) id
    pub fn panel_hue(&self) -> u16 {
        let id: f64 = self.worklog.issue.colour_id().parse().unwrap_or(0.0);
        let hue = (id * 360.0 / GOLDEN_RATIO).round().rem_euclid(360.0);
        if hue.is_finite() {
            hue as u16 % 360
        } else {
            0
        }
    }

    pub fn components(&self) -> Option<String> {
        let components = self.worklog.issue.fields.components.as_ref()?;
        if components.is_empty() {
            return None;
        }
        Some(
            components
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        )
    }

    pub fn time_range(&self) -> String {
        let start = self.date();
        let end = self.worklog.ended().with_timezone(&Local);

        let same_day = start.year() == end.year()
            && start.month() == end.month()
            && start.day() == end.day();

        if same_day {
            format!(
                "{} - {}",
                format_clock_time(&start, self.clock_format),
                format_clock_time(&end, self.clock_format)
            )
        } else {
            let total = self.worklog.time_spent_seconds.max(0);
            let hours = total / 3600;
            let minutes = (total % 3600) / 60;
            let seconds = total % 60;

            let mut label = format!("Since {} for ", format_clock_time(&start, self.clock_format));
            if hours > 0 {
                label.push_str(&format!("{}h ", hours));
            }
            if minutes > 0 {
                label.push_str(&format!("{}m ", minutes));
            }
            if seconds > 0 {
                label.push_str(&format!("{}s", seconds));
            }
            label
        }
    }
}
