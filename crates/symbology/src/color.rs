//! RGBA colors with independently updatable color and opacity.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const GRAY: Color = Color::rgb(128, 128, 128);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

fn hex_digits(s: &str) -> Option<&str> {
        let hex = s.trim();
        hex.strip_prefix('#')
            .or_else(|| hex.strip_prefix("0x"))
            .or_else(|| hex.strip_prefix("0X"))
    }

    /// Parse `#RRGGBB` (opaque) or `#AARRGGBB`.
    pub fn parse(s: &str) -> Option<Self> {
        let hex = Self::hex_digits(s)?;
        let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        match hex.len() {
            6 => Some(Self::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Some(Self::rgba(byte(2)?, byte(4)?, byte(6)?, byte(0)?)),
            _ => None,
        }
    }

    /// Replace the RGB channels, keeping this color's alpha.
    pub fn with_rgb(self, rgb: Color) -> Self {
        Self { a: self.a, ..rgb }
    }

    /// Apply a color literal to this color.
    ///
    /// `#RRGGBB` replaces the RGB channels only; `#AARRGGBB` also replaces
    /// the alpha.
    pub fn with_literal(self, s: &str) -> Option<Self> {
        let parsed = Self::parse(s)?;
        let has_alpha = Self::hex_digits(s).is_some_and(|hex| hex.len() == 8);
        Some(if has_alpha { parsed } else { self.with_rgb(parsed) })
    }

    /// Replace the alpha channel from an opacity in `[0, 1]`, keeping RGB.
    pub fn with_opacity(self, opacity: f64) -> Self {
        let opacity = if opacity.is_nan() { 1.0 } else { opacity.clamp(0.0, 1.0) };
        Self {
            a: (opacity * 255.0).round() as u8,
            ..self
        }
    }

    pub fn opacity(&self) -> f64 {
        f64::from(self.a) / 255.0
    }

    /// Channel-wise linear interpolation, `t` in `[0, 1]`.
    pub fn lerp(self, other: Color, t: f64) -> Color {
        let mix = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * t).round() as u8;
        Color::rgba(
            mix(self.r, other.r),
            mix(self.g, other.g),
            mix(self.b, other.b),
            mix(self.a, other.a),
        )
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.a, self.r, self.g, self.b)
        }
    }
}
