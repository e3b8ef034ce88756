use chrono::{Duration, Local, NaiveDate};
use eframe::egui;
use egui::{Color32, RichText};
use log::{info, warn};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use tokio::sync::watch;

use crate::api::{ApiError, Issue, JiraClient, ReportedError, ReqwestHandler, User, Worklog};
use crate::auth::AuthState;
use crate::config::{self, ClockFormat, Config, ThemeSetting};
use super::dark_mode::{probe_source, DarkModeBridge};
use super::layout::assign_columns;
use super::panel::WorklogPanel;
use super::refresh::RefreshControl;
use super::signals::Signals;
use super::views::{self, week_start};

pub struct PlaidApp {
    config: Config,
    state: AppState,

    week_start: NaiveDate,
    panels: Vec<WorklogPanel>,

    // Settings dialog
    show_settings: bool,
    settings_url: String,
    settings_email: String,
    settings_token: String,
    settings_theme: ThemeSetting,
    settings_clock_format: ClockFormat,

    // Issue lookup
    issue_key: String,

    // Status
    loading: bool,
    user: Option<User>,
    status_message: Option<(String, bool)>, // (message, is_error)

    refresh: RefreshControl,
    dark_mode: DarkModeBridge,
    dark_rx: watch::Receiver<bool>,
    theme_preference: watch::Sender<ThemeSetting>,
    signals: Signals,

    // Async communication
    auth: Arc<AuthState>,
    client: JiraClient,
    runtime: tokio::runtime::Runtime,
    result_rx: Receiver<AsyncResult>,
    result_tx: Sender<AsyncResult>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum AppState {
    Setup,
    Main,
}

enum AsyncResult {
    SignedIn(Option<User>),
    WorklogsLoaded(NaiveDate, Vec<Worklog>),
    IssueFound(String, Option<Issue>),
    Error(String),
}

/// Refresh is off while a load runs, unless that load is parked on a sign-in
/// that only a refresh can bring about
fn refresh_enabled(main_view: bool, loading: bool, parked_on_sign_in: bool) -> bool {
    main_view && (!loading || parked_on_sign_in)
}

impl PlaidApp {
    pub fn new(cc: &eframe::CreationContext<'_>) -> anyhow::Result<Self> {
        let config = Config::load().unwrap_or_else(|e| {
            warn!("using default config: {:#}", e);
            Config::default()
        });
        super::setup_fonts(&cc.egui_ctx);
        cc.egui_ctx.set_pixels_per_point(config.font_scale);

        let runtime = tokio::runtime::Runtime::new()?;
        let (result_tx, result_rx) = channel();

        let auth = Arc::new(AuthState::new());
        let client = JiraClient::new(auth.clone(), Arc::new(ReqwestHandler::new()?));

        let (theme_preference, preference_rx) = watch::channel(config.theme);
        let mut dark_mode = DarkModeBridge::new();
        let reading = cc.egui_ctx.input(|i| i.raw.system_theme);
        dark_mode.install(probe_source(preference_rx, Box::new(cc.egui_ctx.clone())), reading);
        let dark_rx = dark_mode.subscribe();
        super::apply_theme(&cc.egui_ctx, dark_mode.is_dark());

        let state = if config.is_configured() {
            AppState::Main
        } else {
            AppState::Setup
        };

        let mut app = Self {
            show_settings: false,
            settings_url: config.jira_url.clone(),
            settings_email: config.email.clone(),
            settings_token: String::new(),
            settings_theme: config.theme,
            settings_clock_format: config.clock_format,
            signals: Signals::new(config.base_url()),
            config,
            state,
            week_start: week_start(Local::now().date_naive()),
            panels: Vec::new(),
            issue_key: String::new(),
            loading: false,
            user: None,
            status_message: None,
            refresh: RefreshControl::new(),
            dark_mode,
            dark_rx,
            theme_preference,
            auth,
            client,
            runtime,
            result_rx,
            result_tx,
        };

        if let Some(auth_info) = app.config.auth_info() {
            app.auth.sign_in(auth_info);
            app.authenticate();
            app.load_week(app.week_start);
        }

        Ok(app)
    }

    fn check_async_results(&mut self) {
        while let Ok(result) = self.result_rx.try_recv() {
            match result {
                AsyncResult::SignedIn(user) => {
                    self.user = user;
                }
                AsyncResult::WorklogsLoaded(week, mut worklogs) => {
                    self.loading = false;
                    self.status_message = None;
                    if week != self.week_start {
                        // Navigated away while loading
                        self.load_week(self.week_start);
                        continue;
                    }
                    assign_columns(&mut worklogs);
                    self.replace_panels(worklogs);
                }
                AsyncResult::IssueFound(key, Some(issue)) => {
                    self.status_message = None;
                    let url = format!("{}/browse/{}", self.config.base_url(), issue.key);
                    info!("opening {} for {}", url, key);
                    if let Err(e) = open::that(&url) {
                        warn!("could not open {}: {}", url, e);
                    }
                }
                AsyncResult::IssueFound(key, None) => {
                    self.status_message = Some((format!("No issue {} on this site", key), true));
                }
                AsyncResult::Error(msg) => {
                    self.loading = false;
                    self.status_message = Some((msg, true));
                }
            }
        }
    }

    /// Panels whose worklog id survives the reload are kept and updated in place
    fn replace_panels(&mut self, worklogs: Vec<Worklog>) {
        let ppm = self.config.pixels_per_minute;
        let clock_format = self.config.clock_format;
        let mut previous = std::mem::take(&mut self.panels);

        for worklog in worklogs {
            let kept = previous.iter().position(|p| p.worklog().id == worklog.id);
            let panel = match kept {
                Some(index) => {
                    let mut panel = previous.swap_remove(index);
                    panel.set_worklog(worklog);
                    panel
                }
                None => WorklogPanel::new(worklog, ppm, clock_format, &self.signals),
            };
            self.panels.push(panel);
        }

        for panel in &mut previous {
            panel.tear_down();
        }
    }

    /// Resolve the current user; any request parked on a sign-in resumes when this succeeds
    fn authenticate(&mut self) {
        let client = self.client.clone();
        let tx = self.result_tx.clone();
        self.runtime.spawn(async move {
            match client.authenticate().await {
                Ok(user) => {
                    let _ = tx.send(AsyncResult::SignedIn(user));
                }
                Err(e) => {
                    let _ = tx.send(AsyncResult::SignedIn(None));
                    let _ = tx.send(AsyncResult::Error(format!("Sign-in failed: {}", e)));
                }
            }
        });
    }

    /// True when a load can only finish after the next sign-in
    fn parked_on_sign_in(&self) -> bool {
        self.auth.user().is_none() || self.auth.waiting_for_sign_in() > 0
    }

    fn refresh_data(&mut self) {
        info!("refresh requested");
        if self.parked_on_sign_in() {
            self.authenticate();
        }
        self.load_week(self.week_start);
    }

    fn lookup_issue(&mut self) {
        let key = self.issue_key.trim().to_uppercase();
        if key.is_empty() {
            return;
        }
        let client = self.client.clone();
        let tx = self.result_tx.clone();
        self.runtime.spawn(async move {
            match client.issue(&key).await {
                Ok(issue) => {
                    let _ = tx.send(AsyncResult::IssueFound(key, issue));
                }
                Err(e) => {
                    let _ = tx.send(AsyncResult::Error(format!("Error: {}", e)));
                }
            }
        });
    }

    fn load_week(&mut self, week_start_date: NaiveDate) {
        self.week_start = week_start_date;
        if !self.config.is_configured() || self.loading {
            return;
        }

        self.loading = true;

        let client = self.client.clone();
        let tx = self.result_tx.clone();
        let end_date = week_start_date + Duration::days(6);

        self.runtime.spawn(async move {
            let result: Result<Vec<Worklog>, ApiError> = async {
                // Parks until a sign-in succeeds
                let user = client
                    .state()
                    .signed_in_user()
                    .await
                    .ok_or(ApiError::AuthClosed)?;
                client.worklogs_between(&user.account_id, week_start_date, end_date).await
            }
            .await;

            match result {
                Ok(worklogs) => {
                    let _ = tx.send(AsyncResult::WorklogsLoaded(week_start_date, worklogs));
                }
                Err(e) => {
                    let _ = tx.send(AsyncResult::Error(format!("Error: {}", e)));
                }
            }
        });
    }

    fn set_pixels_per_minute(&mut self, pixels_per_minute: f32) {
        let pixels_per_minute = config::clamp_pixels_per_minute(pixels_per_minute);
        if (pixels_per_minute - self.config.pixels_per_minute).abs() < f32::EPSILON {
            return;
        }
        self.config.pixels_per_minute = pixels_per_minute;
        if let Err(e) = self.config.save() {
            warn!("could not save config: {:#}", e);
        }
        for panel in &mut self.panels {
            panel.set_pixels_per_minute(pixels_per_minute);
        }
    }

    fn save_settings(&mut self) {
        self.config.jira_url = self.settings_url.trim().to_string();
        self.config.email = self.settings_email.trim().to_string();
        if !self.settings_token.trim().is_empty() {
            self.config.api_token = Some(self.settings_token.trim().to_string());
        }
        self.config.theme = self.settings_theme;
        self.config.clock_format = self.settings_clock_format;

        if let Err(e) = self.config.save() {
            warn!("could not save config: {:#}", e);
            self.status_message = Some((format!("Could not save settings: {}", e), true));
        }

        self.theme_preference.send_if_modified(|current| {
            let changed = *current != self.settings_theme;
            *current = self.settings_theme;
            changed
        });
        self.signals.publish_jira_url(self.config.base_url());
        for panel in &mut self.panels {
            panel.set_clock_format(self.config.clock_format);
        }

        match self.config.auth_info() {
            Some(auth_info) => {
                self.state = AppState::Main;
                self.show_settings = false;
                self.settings_token.clear();
                self.auth.sign_in(auth_info);
                self.authenticate();
                self.load_week(self.week_start);
            }
            None => {
                self.auth.sign_out();
                self.state = AppState::Setup;
            }
        }
    }

    fn render_settings_form(&mut self, ui: &mut egui::Ui) -> bool {
        let mut save = false;
        egui::Grid::new("settings_grid")
            .num_columns(2)
            .spacing([12.0, 10.0])
            .show(ui, |ui| {
                ui.label("Jira site");
                ui.add(egui::TextEdit::singleline(&mut self.settings_url).hint_text("acme.atlassian.net"));
                ui.end_row();

                ui.label("Email");
                ui.text_edit_singleline(&mut self.settings_email);
                ui.end_row();

                ui.label("API token");
                let hint = if self.config.api_token.is_some() { "(unchanged)" } else { "" };
                ui.add(egui::TextEdit::singleline(&mut self.settings_token).password(true).hint_text(hint));
                ui.end_row();

                ui.label("Theme");
                ui.horizontal(|ui| {
                    ui.selectable_value(&mut self.settings_theme, ThemeSetting::System, "System");
                    ui.selectable_value(&mut self.settings_theme, ThemeSetting::Light, "Light");
                    ui.selectable_value(&mut self.settings_theme, ThemeSetting::Dark, "Dark");
                });
                ui.end_row();

                ui.label("Clock");
                ui.horizontal(|ui| {
                    ui.selectable_value(&mut self.settings_clock_format, ClockFormat::Hour12, "12h");
                    ui.selectable_value(&mut self.settings_clock_format, ClockFormat::Hour24, "24h");
                });
                ui.end_row();
            });

        ui.add_space(8.0);
        if ui.button("Save").clicked() {
            save = true;
        }
        save
    }

    fn render_setup(&mut self, ui: &mut egui::Ui) {
        ui.vertical_centered(|ui| {
            ui.add_space(60.0);
            ui.heading("Connect to Jira");
            ui.add_space(8.0);
            ui.label("Worklogs are read with your email and an Atlassian API token.");
            ui.add_space(20.0);
        });
        if self.render_settings_form(ui) {
            self.save_settings();
        }
    }

    fn render_toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button(egui_phosphor::regular::CARET_LEFT).clicked() {
                self.load_week(self.week_start - Duration::days(7));
            }
            if ui.button("Today").clicked() {
                self.load_week(week_start(Local::now().date_naive()));
            }
            if ui.button(egui_phosphor::regular::CARET_RIGHT).clicked() {
                self.load_week(self.week_start + Duration::days(7));
            }
            let week_end = self.week_start + Duration::days(6);
            ui.label(RichText::new(format!(
                "{} – {}",
                self.week_start.format("%b %-d"),
                week_end.format("%b %-d, %Y")
            )).strong());

            ui.separator();
            let key_box = ui.add(
                egui::TextEdit::singleline(&mut self.issue_key)
                    .hint_text("ABC-123")
                    .desired_width(90.0),
            );
            let submitted = key_box.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            let clicked = ui
                .button(egui_phosphor::regular::ARROW_SQUARE_OUT)
                .on_hover_text("Open issue")
                .clicked();
            if submitted || clicked {
                self.lookup_issue();
            }

            ui.separator();
            if self.refresh.show(ui).is_some() {
                self.refresh_data();
            }
            if self.loading {
                ui.spinner();
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button(egui_phosphor::regular::GEAR).clicked() {
                    self.show_settings = !self.show_settings;
                }
                if let Some(user) = &self.user {
                    ui.label(user.display_name.as_deref().unwrap_or(&user.account_id));
                }

                let mut ppm = self.config.pixels_per_minute;
                let slider = egui::Slider::new(&mut ppm, config::MIN_PIXELS_PER_MINUTE..=config::MAX_PIXELS_PER_MINUTE)
                    .logarithmic(true)
                    .text("zoom");
                if ui.add(slider).changed() {
                    self.set_pixels_per_minute(ppm);
                }
            });
        });

        if let Some((msg, is_error)) = &self.status_message {
            let color = if *is_error { Color32::from_rgb(0xe5, 0x4d, 0x42) } else { ui.visuals().text_color() };
            ui.label(RichText::new(msg).color(color));
        }
    }

    fn render_main(&mut self, ui: &mut egui::Ui) {
        self.render_toolbar(ui);
        ui.separator();

        for panel in &mut self.panels {
            panel.poll_signals();
        }

        let result = views::render_week_view(
            ui,
            self.week_start,
            &mut self.panels,
            self.config.pixels_per_minute,
            self.dark_mode.is_dark(),
        );
        if let Some(url) = result.open_url {
            if let Err(e) = open::that(&url) {
                warn!("could not open {}: {}", url, e);
            }
        }
    }

    fn render_error_modal(&mut self, ctx: &egui::Context, error: &ReportedError) {
        let (content_bg, frame_color) = super::theme::dialog_colors(self.dark_mode.is_dark());
        let frame = egui::Frame::none()
            .fill(content_bg)
            .stroke(egui::Stroke::new(2.0, frame_color))
            .rounding(egui::Rounding::same(8.0))
            .inner_margin(egui::Margin::same(20.0));

        egui::Window::new("Something went wrong")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .frame(frame)
            .show(ctx, |ui| {
                ui.set_max_width(480.0);
                ui.label(error.to_string());
                ui.add_space(12.0);
                ui.horizontal(|ui| {
                    if ui.button("Dismiss").clicked() {
                        self.auth.clear_error();
                    }
                    if ui.button("Settings").clicked() {
                        self.auth.clear_error();
                        self.show_settings = true;
                    }
                });
            });
    }
}

impl eframe::App for PlaidApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Ctrl+scroll / pinch zooms the time axis
        let zoom_delta = ctx.input(|i| i.zoom_delta());
        if zoom_delta != 1.0 {
            self.set_pixels_per_minute(self.config.pixels_per_minute * zoom_delta);
        }

        self.check_async_results();

        self.signals.publish_viewport(ctx.screen_rect().size());

        self.dark_mode.observe(ctx.input(|i| i.raw.system_theme));
        if self.dark_rx.has_changed().unwrap_or(false) {
            let dark = *self.dark_rx.borrow_and_update();
            super::apply_theme(ctx, dark);
        }

        self.refresh.begin_frame();
        self.refresh.disabled = !refresh_enabled(
            self.state == AppState::Main,
            self.loading,
            self.parked_on_sign_in(),
        );
        if self.refresh.handle_shortcuts(ctx).is_some() {
            self.refresh_data();
        }

        if let Some(error) = self.auth.last_error() {
            self.render_error_modal(ctx, &error);
        }

        if self.show_settings && self.state == AppState::Main {
            let mut open = true;
            let mut save = false;
            egui::Window::new("Settings")
                .collapsible(false)
                .resizable(false)
                .open(&mut open)
                .show(ctx, |ui| {
                    save = self.render_settings_form(ui);
                });
            if save {
                self.save_settings();
            }
            self.show_settings &= open;
        }

        egui::CentralPanel::default().show(ctx, |ui| match self.state {
            AppState::Setup => self.render_setup(ui),
            AppState::Main => self.render_main(ui),
        });

        if self.loading {
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        }
    }
}
