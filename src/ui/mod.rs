mod app;
mod dark_mode;
mod layout;
mod panel;
mod refresh;
mod signals;
mod theme;
mod views;

pub use app::PlaidApp;
pub use theme::{apply_theme, setup_fonts};
