//! Theme loading: btop-style `theme[key]="value"` and hex → ratatui Color.

use crate::game::PieceKind;
use ratatui::style::Color;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Keys for the seven piece colours, in `PieceKind::color_index` order.
const PIECE_KEYS: [&str; 7] = [
    "piece_i", "piece_j", "piece_l", "piece_o", "piece_s", "piece_t", "piece_z",
];

/// Piece and UI colours.
#[derive(Debug, Clone)]
pub struct Theme {
    /// Piece colours, indexed by `PieceKind::color_index`.
    pub pieces: [Color; 7],
    /// Board background.
    pub bg: Color,
    /// Grid / border.
    pub div_line: Color,
    /// Text (score, level).
    pub main_fg: Color,
    /// Highlight / titles.
    pub title: Color,
    /// Ghost piece and secondary text.
    pub inactive_fg: Color,
}

#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

impl Default for Theme {
    fn default() -> Self {
        Self::phi_default()
    }
}

impl Theme {
    /// The PHI palette.
    pub fn phi_default() -> Self {
        Self {
            pieces: [
                Color::Rgb(80, 227, 230),  // I
                Color::Rgb(36, 95, 223),   // J
                Color::Rgb(223, 173, 36),  // L
                Color::Rgb(223, 217, 36),  // O
                Color::Rgb(48, 211, 56),   // S
                Color::Rgb(132, 61, 198),  // T
                Color::Rgb(227, 78, 78),   // Z
            ],
            bg: Color::Rgb(0x17, 0x25, 0x54),
            div_line: Color::Rgb(0x3B, 0x5B, 0xA9),
            main_fg: Color::Rgb(0xBF, 0xDB, 0xFE),
            title: Color::Rgb(0x93, 0xC5, 0xFD),
            inactive_fg: Color::Rgb(0x4B, 0x5E, 0x8C),
        }
    }

    /// Load theme from a btop-style file: `theme[key]="value"` or `theme[key]='value'`.
    /// Falls back to defaults if path is None or the file is missing.
    pub fn load(path: Option<&Path>, palette: crate::Palette) -> Result<Self, ThemeError> {
        let path = match path {
            Some(p) if p.exists() => p,
            _ => {
                let mut theme = Self::default();
                theme.apply_palette(palette);
                return Ok(theme);
            }
        };
        let s = std::fs::read_to_string(path)?;
        let map = parse_theme_file(&s);
        let mut theme = Self::from_map(&map);
        theme.apply_palette(palette);
        Ok(theme)
    }

    /// Override piece colours for high contrast.
    pub fn apply_palette(&mut self, palette: crate::Palette) {
        match palette {
            crate::Palette::Normal => {}
            crate::Palette::HighContrast => {
                self.pieces = [
                    Color::Rgb(0x00, 0xFF, 0xFF),
                    Color::Rgb(0x00, 0x55, 0xFF),
                    Color::Rgb(0xFF, 0x88, 0x00),
                    Color::Rgb(0xFF, 0xFF, 0x00),
                    Color::Rgb(0x00, 0xFF, 0x00),
                    Color::Rgb(0xFF, 0x00, 0xFF),
                    Color::Rgb(0xFF, 0x00, 0x00),
                ];
                self.bg = Color::Black;
                self.main_fg = Color::White;
            }
        }
    }

    fn from_map(map: &HashMap<String, String>) -> Self {
        let get = |key: &str| map.get(key).and_then(|v| parse_hex(v).ok());
        let defaults = Self::phi_default();
        let mut pieces = defaults.pieces;
        for (slot, key) in pieces.iter_mut().zip(PIECE_KEYS) {
            if let Some(c) = get(key) {
                *slot = c;
            }
        }
        Self {
            pieces,
            bg: get("bg").unwrap_or(defaults.bg),
            div_line: get("div_line").unwrap_or(defaults.div_line),
            main_fg: get("main_fg").unwrap_or(defaults.main_fg),
            title: get("title").unwrap_or(defaults.title),
            inactive_fg: get("inactive_fg").unwrap_or(defaults.inactive_fg),
        }
    }

    #[inline]
    pub fn piece_color(&self, kind: PieceKind) -> Color {
        self.pieces[kind.color_index()]
    }
}

/// Parse btop-style theme file into key -> value map.
fn parse_theme_file(s: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in s.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(stripped) = line.strip_prefix("theme[") else {
            continue;
        };
        let Some(end) = stripped.find(']') else {
            continue;
        };
        let key = stripped[..end].trim();
        let rest = stripped[end + 1..].trim();
        if let Some(value) = rest.strip_prefix('=') {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            if !value.is_empty() {
                map.insert(key.to_string(), value.to_string());
            }
        }
    }
    map
}

/// Parse hex colour "#RRGGBB" or "#RGB" into ratatui Color.
pub fn parse_hex(s: &str) -> Result<Color, ThemeError> {
    let s = s.trim().trim_start_matches('#');
    let invalid = || ThemeError::InvalidHex(s.to_string());
    if !s.is_ascii() {
        return Err(invalid());
    }
    let channel = |hex: &str| u8::from_str_radix(hex, 16).map_err(|_| invalid());
    let (r, g, b) = match s.len() {
        6 => (channel(&s[0..2])?, channel(&s[2..4])?, channel(&s[4..6])?),
        3 => (
            channel(&s[0..1])? * 17,
            channel(&s[1..2])? * 17,
            channel(&s[2..3])? * 17,
        ),
        _ => return Err(invalid()),
    };
    Ok(Color::Rgb(r, g, b))
}
