use egui::{Key, KeyboardShortcut, Modifiers, RichText, Ui};

/// F5 and Ctrl+R both refresh
pub const REFRESH_SHORTCUTS: [KeyboardShortcut; 2] = [
    KeyboardShortcut::new(Modifiers::NONE, Key::F5),
    KeyboardShortcut::new(Modifiers::CTRL, Key::R),
];

/// Emitted when the user asks for a refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshRequested;

/// Toolbar refresh button that also answers the global refresh shortcuts.
///
/// There is exactly one of these for the lifetime of the app, so the
/// shortcuts are checked every frame and never unbound.
#[derive(Debug, Default)]
pub struct RefreshControl {
    pub disabled: bool,
    /// Pressed look for one frame after a shortcut fired
    active: bool,
}

impl RefreshControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call at the start of every frame; ends the pulse started on the previous one
    pub fn begin_frame(&mut self) {
        self.active = false;
    }

    /// The action behind both the button and the shortcuts
    pub fn trigger(&self) -> Option<RefreshRequested> {
        if self.disabled {
            None
        } else {
            Some(RefreshRequested)
        }
    }

    /// Shortcut path: pulse the button, then run the same action as a click
    pub fn press(&mut self) -> Option<RefreshRequested> {
        self.active = true;
        self.trigger()
    }

    pub fn handle_shortcuts(&mut self, ctx: &egui::Context) -> Option<RefreshRequested> {
        let pressed = ctx.input_mut(|i| {
            REFRESH_SHORTCUTS
                .iter()
                .fold(false, |hit, shortcut| i.consume_shortcut(shortcut) || hit)
        });
        if !pressed {
            return None;
        }
        // Make sure the next frame comes to clear the pulse
        ctx.request_repaint();
        self.press()
    }

    pub fn show(&mut self, ui: &mut Ui) -> Option<RefreshRequested> {
        let label = RichText::new(format!("{} Refresh", egui_phosphor::regular::ARROW_CLOCKWISE));
        let button = egui::Button::new(label).selected(self.active);
        let response = ui
            .add_enabled(!self.disabled, button)
            .on_hover_text("Refresh (F5 / Ctrl+R)");
        if response.clicked() {
            self.trigger()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_event(key: Key, modifiers: Modifiers) -> egui::Event {
        egui::Event::Key {
            key,
            physical_key: None,
            pressed: true,
            repeat: false,
            modifiers,
        }
    }

    #[test]
    fn trigger_is_noop_when_disabled() {
        let mut control = RefreshControl::new();
        assert_eq!(control.trigger(), Some(RefreshRequested));

        control.disabled = true;
        assert_eq!(control.trigger(), None);
    }

    #[test]
    fn shortcut_pulse_lasts_one_frame() {
        let mut control = RefreshControl::new();
        control.begin_frame();
        assert_eq!(control.press(), Some(RefreshRequested));
        assert!(control.active);

        control.begin_frame();
        assert!(!control.active);
    }

    #[test]
    fn disabled_shortcut_still_pulses_but_emits_nothing() {
        let mut control = RefreshControl::new();
        control.disabled = true;
        assert_eq!(control.press(), None);
        assert!(control.active);
    }

    #[test]
    fn f5_emits_exactly_once() {
        let ctx = egui::Context::default();
        let mut control = RefreshControl::new();
        let mut emitted = Vec::new();

        let input = egui::RawInput {
            events: vec![key_event(Key::F5, Modifiers::NONE)],
            ..Default::default()
        };
        let _ = ctx.run(input, |ctx| {
            control.begin_frame();
            emitted.extend(control.handle_shortcuts(ctx));
        });
        assert_eq!(emitted, vec![RefreshRequested]);
        assert!(control.active);

        let _ = ctx.run(egui::RawInput::default(), |ctx| {
            control.begin_frame();
            emitted.extend(control.handle_shortcuts(ctx));
        });
        assert_eq!(emitted.len(), 1);
        assert!(!control.active);
    }
}
