//! Segment colors and the cycling wheel palette.

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ColorError {
    #[error("Expected #RRGGBB or #RRGGBBAA, got: {0}")]
    InvalidFormat(String),
}

/// RGBA color representation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    /// Material 500 shades used by the default wheel palette.
    pub const GREEN: Color = Color::rgb(0x4C, 0xAF, 0x50);
    pub const BLUE: Color = Color::rgb(0x21, 0x96, 0xF3);
    pub const RED: Color = Color::rgb(0xF4, 0x43, 0x36);
    pub const ORANGE: Color = Color::rgb(0xFF, 0x98, 0x00);
    pub const PURPLE: Color = Color::rgb(0x9C, 0x27, 0xB0);
    pub const TEAL: Color = Color::rgb(0x00, 0x96, 0x88);
    pub const BROWN: Color = Color::rgb(0x79, 0x55, 0x48);
    pub const PINK: Color = Color::rgb(0xE9, 0x1E, 0x63);
    pub const BLUE_GREY: Color = Color::rgb(0x60, 0x7D, 0x8B);

    pub const WHITE: Color = Color::rgb(255, 255, 255);
    /// Soft yellow used for the winner highlight.
    pub const GLOW: Color = Color::rgb(0xFF, 0xFF, 0xC5);

    /// Parses `#RRGGBB` or `#RRGGBBAA`.
    pub fn from_hex(hex: &str) -> Result<Self, ColorError> {
        let invalid = || ColorError::InvalidFormat(hex.to_string());
        let digits = hex.strip_prefix('#').ok_or_else(invalid)?;
        // from_str_radix alone would accept a leading sign.
        if !matches!(digits.len(), 6 | 8) || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| invalid());
        let alpha = if digits.len() == 8 { channel(6)? } else { 255 };
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?, alpha))
    }

    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
        } else {
            format!("#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
        }
    }
}

/// Fixed, non-empty list of colors handed out by segment index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Color>", into = "Vec<Color>")]
pub struct Palette {
    colors: Vec<Color>,
}

impl Palette {
    /// Returns `None` for an empty color list.
    pub fn new(colors: Vec<Color>) -> Option<Self> {
        if colors.is_empty() {
            None
        } else {
            Some(Self { colors })
        }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Always false; a palette is never constructed empty.
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn colors(&self) -> &[Color] {
        &self.colors
    }

    /// Color for the segment at `index`, wrapping around the palette.
    pub fn color_for(&self, index: usize) -> Color {
        self.colors[index % self.colors.len()]
    }

    /// Assigns one color per segment in list order.
    pub fn assign(&self, count: usize) -> Vec<Color> {
        (0..count).map(|i| self.color_for(i)).collect()
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            colors: vec![
                Color::GREEN,
                Color::BLUE,
                Color::RED,
                Color::ORANGE,
                Color::PURPLE,
                Color::TEAL,
                Color::BROWN,
                Color::PINK,
                Color::BLUE_GREY,
            ],
        }
    }
}

impl TryFrom<Vec<Color>> for Palette {
    type Error = &'static str;

    fn try_from(colors: Vec<Color>) -> Result<Self, Self::Error> {
        Self::new(colors).ok_or("palette must contain at least one color")
    }
}

impl From<Palette> for Vec<Color> {
    fn from(palette: Palette) -> Self {
        palette.colors
    }
}
