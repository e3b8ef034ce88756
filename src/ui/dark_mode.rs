//! Dark-mode preference as a single observable flag.
//!
//! Exactly one `ThemeSource` feeds the flag. It is picked once at startup:
//! a native window reads the OS theme through the windowing integration and
//! applies the user's theme setting on top of it, a web build reads the
//! browser's `prefers-color-scheme` media query.

use egui::Theme;
use log::debug;
use tokio::sync::watch;

use crate::config::ThemeSetting;

/// Where a native window's theme preference is forwarded to
pub trait ShellThemeTarget {
    fn apply_preference(&self, setting: ThemeSetting);
}

impl ShellThemeTarget for egui::Context {
    fn apply_preference(&self, setting: ThemeSetting) {
        self.set_theme(egui::ThemePreference::from(setting));
    }
}

pub trait ThemeSource {
    /// First reading, taken when the source is installed.
    /// `None` means the source has nothing to report yet.
    fn initial(&mut self, reading: Option<Theme>) -> Option<bool>;

    /// Called once per frame; `changed` is set when the integration's
    /// reading differs from the previous frame's.
    fn poll(&mut self, reading: Option<Theme>, changed: bool) -> Option<bool>;
}

/// Native window: OS theme, overridden by the user's setting the way a
/// native theme source would be
pub struct ShellTheme {
    preference: watch::Receiver<ThemeSetting>,
    target: Box<dyn ShellThemeTarget>,
    setting: ThemeSetting,
    system_dark: bool,
}

impl ShellTheme {
    pub fn new(preference: watch::Receiver<ThemeSetting>, target: Box<dyn ShellThemeTarget>) -> Self {
        Self {
            preference,
            target,
            setting: ThemeSetting::System,
            system_dark: false,
        }
    }

    fn effective(&self) -> bool {
        match self.setting {
            ThemeSetting::Dark => true,
            ThemeSetting::Light => false,
            ThemeSetting::System => self.system_dark,
        }
    }

    fn forward_preference(&mut self) {
        self.setting = *self.preference.borrow_and_update();
        self.target.apply_preference(self.setting);
    }
}

impl ThemeSource for ShellTheme {
    fn initial(&mut self, reading: Option<Theme>) -> Option<bool> {
        self.system_dark = reading == Some(Theme::Dark);
        self.forward_preference();
        Some(self.effective())
    }

    fn poll(&mut self, reading: Option<Theme>, changed: bool) -> Option<bool> {
        let mut updated = false;
        if changed {
            self.system_dark = reading == Some(Theme::Dark);
            updated = true;
        }
        if self.preference.has_changed().unwrap_or(false) {
            self.forward_preference();
            updated = true;
        }
        updated.then(|| self.effective())
    }
}

/// Browser: the `prefers-color-scheme: dark` query, when the platform has one
#[derive(Debug, Default)]
pub struct MediaQueryTheme;

impl ThemeSource for MediaQueryTheme {
    fn initial(&mut self, reading: Option<Theme>) -> Option<bool> {
        reading.map(|theme| theme == Theme::Dark)
    }

    fn poll(&mut self, reading: Option<Theme>, changed: bool) -> Option<bool> {
        if changed {
            reading.map(|theme| theme == Theme::Dark)
        } else {
            None
        }
    }
}

/// Pick the theme source for this build; decided once at startup
pub fn probe_source(
    preference: watch::Receiver<ThemeSetting>,
    target: Box<dyn ShellThemeTarget>,
) -> Box<dyn ThemeSource> {
    if cfg!(target_arch = "wasm32") {
        Box::new(MediaQueryTheme)
    } else {
        Box::new(ShellTheme::new(preference, target))
    }
}

pub struct DarkModeBridge {
    flag: watch::Sender<bool>,
    source: Option<Box<dyn ThemeSource>>,
    last_reading: Option<Theme>,
}

impl Default for DarkModeBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl DarkModeBridge {
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            flag,
            source: None,
            last_reading: None,
        }
    }

    /// Replaces any previously installed source, so only one ever feeds the flag
    pub fn install(&mut self, mut source: Box<dyn ThemeSource>, reading: Option<Theme>) {
        if self.source.is_some() {
            debug!("replacing installed theme source");
        }
        self.last_reading = reading;
        if let Some(dark) = source.initial(reading) {
            self.publish(dark);
        }
        self.source = Some(source);
    }

    /// Feed the integration's current reading; call once per frame
    pub fn observe(&mut self, reading: Option<Theme>) {
        let Some(source) = self.source.as_mut() else {
            return;
        };
        let changed = self.last_reading != reading;
        self.last_reading = reading;
        if let Some(dark) = source.poll(reading, changed) {
            self.publish(dark);
        }
    }

    fn publish(&self, dark: bool) {
        let published = self.flag.send_if_modified(|current| {
            if *current != dark {
                *current = dark;
                true
            } else {
                false
            }
        });
        if published {
            debug!("dark mode {}", if dark { "on" } else { "off" });
        }
    }

    pub fn is_dark(&self) -> bool {
        *self.flag.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.flag.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<ThemeSetting>>>);

    impl ShellThemeTarget for Recorder {
        fn apply_preference(&self, setting: ThemeSetting) {
            self.0.lock().unwrap().push(setting);
        }
    }

    /// Collects every value the flag publishes
    fn drain(rx: &mut watch::Receiver<bool>, seen: &mut Vec<bool>) {
        if rx.has_changed().unwrap_or(false) {
            seen.push(*rx.borrow_and_update());
        }
    }

    #[test]
    fn starts_false_without_a_source() {
        let mut bridge = DarkModeBridge::new();
        assert!(!bridge.is_dark());
        bridge.observe(Some(Theme::Dark));
        assert!(!bridge.is_dark());
    }

    #[test]
    fn media_query_publishes_each_change_once() {
        let mut bridge = DarkModeBridge::new();
        let mut rx = bridge.subscribe();
        let mut seen = Vec::new();

        bridge.install(Box::new(MediaQueryTheme), Some(Theme::Light));
        drain(&mut rx, &mut seen);
        assert!(seen.is_empty(), "light on a false flag is not a change");

        for reading in [Some(Theme::Dark), Some(Theme::Dark), Some(Theme::Light), Some(Theme::Light), Some(Theme::Dark)] {
            bridge.observe(reading);
            drain(&mut rx, &mut seen);
        }
        assert_eq!(seen, vec![true, false, true]);
    }

    #[test]
    fn media_query_without_facility_keeps_default() {
        let mut bridge = DarkModeBridge::new();
        bridge.install(Box::new(MediaQueryTheme), None);
        bridge.observe(None);
        assert!(!bridge.is_dark());
    }

    #[test]
    fn shell_forwards_preference_and_overrides_system() {
        let (pref_tx, pref_rx) = watch::channel(ThemeSetting::System);
        let recorder = Recorder::default();
        let mut bridge = DarkModeBridge::new();

        bridge.install(Box::new(ShellTheme::new(pref_rx, Box::new(recorder.clone()))), Some(Theme::Dark));
        assert!(bridge.is_dark());

        pref_tx.send_replace(ThemeSetting::Light);
        bridge.observe(Some(Theme::Dark));
        assert!(!bridge.is_dark());

        // OS changes are ignored while the user forces a theme
        bridge.observe(Some(Theme::Light));
        bridge.observe(Some(Theme::Dark));
        assert!(!bridge.is_dark());

        pref_tx.send_replace(ThemeSetting::System);
        bridge.observe(Some(Theme::Dark));
        assert!(bridge.is_dark());

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![ThemeSetting::System, ThemeSetting::Light, ThemeSetting::System]
        );
    }

    #[test]
    fn reinstalling_does_not_duplicate_notifications() {
        let (_pref_tx, pref_rx) = watch::channel(ThemeSetting::System);
        let mut bridge = DarkModeBridge::new();
        let mut rx = bridge.subscribe();
        let mut seen = Vec::new();

        bridge.install(Box::new(MediaQueryTheme), Some(Theme::Dark));
        drain(&mut rx, &mut seen);
        bridge.install(Box::new(ShellTheme::new(pref_rx, Box::new(Recorder::default()))), Some(Theme::Dark));
        drain(&mut rx, &mut seen);

        bridge.observe(Some(Theme::Light));
        drain(&mut rx, &mut seen);
        assert_eq!(seen, vec![true, false]);
    }

    #[test]
    fn probe_picks_shell_on_native() {
        let (_pref_tx, pref_rx) = watch::channel(ThemeSetting::Dark);
        let recorder = Recorder::default();
        let mut bridge = DarkModeBridge::new();
        bridge.install(probe_source(pref_rx, Box::new(recorder.clone())), None);

        // Only the shell source honours the forced setting
        assert!(bridge.is_dark());
        assert_eq!(*recorder.0.lock().unwrap(), vec![ThemeSetting::Dark]);
    }
}
