//! Units of measure for size-valued styling attributes.

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Uom {
    #[default]
    Pixel,
    Metre,
    Mm,
    Foot,
}

impl Uom {
    /// Decode a `uom` attribute value (usually an OGC URN or URL) by its suffix.
    pub fn from_attribute(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Uom::Pixel;
        };
        let lower = value.trim().to_lowercase();
        if lower.ends_with("metre") || lower.ends_with("meter") {
            Uom::Metre
        } else if lower.ends_with("mm") {
            Uom::Mm
        } else if lower.ends_with("foot") {
            Uom::Foot
        } else {
            if !lower.ends_with("pixel") {
                warn!(uom = %value, "Unknown unit of measure, using pixel");
            }
            Uom::Pixel
        }
    }
}
