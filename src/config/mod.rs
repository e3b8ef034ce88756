use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::auth::AuthInfo;

pub const MIN_PIXELS_PER_MINUTE: f32 = 0.25;
pub const MAX_PIXELS_PER_MINUTE: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ClockFormat {
    #[default]
    Hour12,      // "2:30 PM"
    Hour24,      // "14:30"
}

/// User's theme choice; `System` follows the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ThemeSetting {
    #[default]
    System,
    Light,
    Dark,
}

impl From<ThemeSetting> for egui::ThemePreference {
    fn from(setting: ThemeSetting) -> Self {
        match setting {
            ThemeSetting::System => egui::ThemePreference::System,
            ThemeSetting::Light => egui::ThemePreference::Light,
            ThemeSetting::Dark => egui::ThemePreference::Dark,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub jira_url: String,
    pub email: String,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_pixels_per_minute")]
    pub pixels_per_minute: f32,
    #[serde(default)]
    pub theme: ThemeSetting,
    #[serde(default)]
    pub clock_format: ClockFormat,
    #[serde(default = "default_font_scale")]
    pub font_scale: f32,
}

fn default_pixels_per_minute() -> f32 {
    1.0
}

fn default_font_scale() -> f32 {
    1.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            jira_url: String::new(),
            email: String::new(),
            api_token: None,
            pixels_per_minute: default_pixels_per_minute(),
            theme: ThemeSetting::System,
            clock_format: ClockFormat::Hour12,
            font_scale: default_font_scale(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .context("Failed to read config file")?;
        let mut config: Config = serde_json::from_str(&contents)
            .context("Failed to parse config file")?;
        config.pixels_per_minute = clamp_pixels_per_minute(config.pixels_per_minute);
        Ok(config)
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.auth_info().is_some()
    }

    /// Credentials for the request pipeline; present only when every field is filled in
    pub fn auth_info(&self) -> Option<AuthInfo> {
        let token = self.api_token.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
        let email = self.email.trim();
        if self.jira_url.trim().is_empty() || email.is_empty() {
            return None;
        }
        Some(AuthInfo::new(self.base_url(), email, token))
    }

    fn config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "plaid", "plaid")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().join("config.json"))
    }

    /// Site root without a trailing slash, e.g. "https://acme.atlassian.net"
    pub fn base_url(&self) -> String {
        let url = self.jira_url.trim().trim_end_matches('/');
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("https://{}", url)
        }
    }
}

pub fn clamp_pixels_per_minute(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(MIN_PIXELS_PER_MINUTE, MAX_PIXELS_PER_MINUTE)
    } else {
        default_pixels_per_minute()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!("plaid-tests-{name}-{nanos}/config.json"))
    }

    fn configured() -> Config {
        Config {
            jira_url: "acme.atlassian.net/".to_string(),
            email: "dev@acme.test".to_string(),
            api_token: Some("secret".to_string()),
            ..Config::default()
        }
    }

    #[test]
    fn base_url_adds_scheme_and_strips_slash() {
        assert_eq!(configured().base_url(), "https://acme.atlassian.net");

        let config = Config {
            jira_url: "http://localhost:8080/".to_string(),
            ..Config::default()
        };
        assert_eq!(config.base_url(), "http://localhost:8080");
    }

    #[test]
    fn auth_info_requires_every_field() {
        assert!(configured().auth_info().is_some());

        let mut missing_token = configured();
        missing_token.api_token = Some("  ".to_string());
        assert!(missing_token.auth_info().is_none());

        let mut missing_email = configured();
        missing_email.email.clear();
        assert!(missing_email.auth_info().is_none());

        let mut missing_url = configured();
        missing_url.jira_url.clear();
        assert!(!missing_url.is_configured());
    }

    #[test]
    fn load_missing_file_returns_default() {
        let loaded = Config::load_from(&unique_path("missing")).expect("load");
        assert_eq!(loaded.pixels_per_minute, 1.0);
        assert_eq!(loaded.theme, ThemeSetting::System);
        assert!(!loaded.is_configured());
    }

    #[test]
    fn save_and_load_round_trip_clamps_scale() {
        let path = unique_path("roundtrip");
        let mut config = configured();
        config.pixels_per_minute = 40.0;
        config.theme = ThemeSetting::Dark;

        config.save_to(&path).expect("save should succeed");
        let loaded = Config::load_from(&path).expect("load should succeed");

        assert_eq!(loaded.email, "dev@acme.test");
        assert_eq!(loaded.theme, ThemeSetting::Dark);
        assert_eq!(loaded.pixels_per_minute, MAX_PIXELS_PER_MINUTE);

        if let Some(parent) = path.parent() {
            let _ = fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn load_invalid_json_is_an_error() {
        let path = unique_path("invalid");
        let parent = path.parent().expect("parent must exist");
        fs::create_dir_all(parent).expect("create temp directory");
        fs::write(&path, "not-valid-json").expect("write invalid config");

        assert!(Config::load_from(&path).is_err());

        let _ = fs::remove_dir_all(parent);
    }
}
