//! Theme colors, with optional overrides from the config file

use ratatui::style::Color;

use crate::config::ThemeConfig;

/// Theme colors for the UI
#[derive(Debug, Clone)]
pub struct Theme {
    pub accent: Color,       // Active borders, key hints
    pub danger: Color,       // Errors, remove markers
    pub success: Color,      // Success alerts, full photo count
    pub warning: Color,      // Status line
    pub text: Color,         // Primary text
    pub text_dim: Color,     // Hints, disabled actions
    pub bg_selected: Color,  // Selection background
    pub inactive: Color,     // Inactive borders
    pub header: Color,       // Table and help headers
}

impl Default for Theme {
    fn default() -> Self {
        // Catppuccin-inspired
        Self {
            accent: Color::Rgb(250, 179, 135),
            danger: Color::Rgb(243, 139, 168),
            success: Color::Rgb(166, 218, 149),
            warning: Color::Rgb(249, 226, 175),
            text: Color::Rgb(205, 214, 244),
            text_dim: Color::Rgb(147, 153, 178),
            bg_selected: Color::Rgb(69, 71, 90),
            inactive: Color::Rgb(88, 91, 112),
            header: Color::Rgb(137, 180, 250),
        }
    }
}

impl Theme {
    /// Defaults with any valid overrides applied. Invalid colors are ignored.
    pub fn from_config(config: &ThemeConfig) -> Self {
        let mut theme = Self::default();
        let overrides = [
            (&config.accent, &mut theme.accent),
            (&config.danger, &mut theme.danger),
            (&config.success, &mut theme.success),
            (&config.text, &mut theme.text),
        ];
        for (value, slot) in overrides {
            let Some(value) = value else { continue };
            match parse_hex_color(value) {
                Some(color) => *slot = color,
                None => tracing::warn!(color = %value, "Ignoring invalid theme color"),
            }
        }
        theme
    }
}

/// Parse "#rrggbb" or "rrggbb"
fn parse_hex_color(s: &str) -> Option<Color> {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some(Color::Rgb(r, g, b))
}
