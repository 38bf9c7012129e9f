//! Raster symbolizer parsing.

use symbology::{
    Categorize, Chain, ChannelSelection, Color, ContrastEnhancement, ImageOutline, Interpolate, Overlap,
    RasterStyling, ShadedRelief, Symbolizer, ThresholdBelongsTo,
};
use tracing::warn;

use crate::dialect::Dialect;
use crate::error::ParseResult;
use crate::style::SymbologyParser;
use crate::values::{boolean, color, number, numeric, update_or_continue};
use crate::xml::XmlElement;

fn contrast_enhancement(el: &XmlElement) -> ContrastEnhancement {
    let mut contrast = ContrastEnhancement::default();
    for child in el.elements() {
        match child.name.as_str() {
            "Normalize" => contrast.normalize = true,
            "Histogram" => contrast.histogram = true,
            "GammaValue" => {
                if let Some(gamma) = number(&child.text(), "GammaValue") {
                    contrast.gamma = gamma;
                }
            }
            _ => {}
        }
    }
    contrast
}

fn channel_selection(el: &XmlElement) -> ChannelSelection {
    let mut channels = ChannelSelection::default();
    for child in el.elements() {
        let Some(name) = child.child_text("SourceChannelName") else {
            warn!(location = %child.location(), "Channel without SourceChannelName is ignored");
            continue;
        };
        if let Some(contrast) = child.child("ContrastEnhancement") {
            channels.contrast.insert(name.clone(), contrast_enhancement(contrast));
        }
        match child.name.as_str() {
            "RedChannel" => channels.red = Some(name),
            "GreenChannel" => channels.green = Some(name),
            "BlueChannel" => channels.blue = Some(name),
            "GrayChannel" => channels.gray = Some(name),
            other => warn!(channel = %other, location = %child.location(), "Unknown channel"),
        }
    }
    channels
}

fn shaded_relief(el: &XmlElement) -> ShadedRelief {
    let mut relief = ShadedRelief::default();
    for child in el.elements() {
        let text = child.text();
        match child.name.as_str() {
            "BrightnessOnly" => relief.brightness_only = boolean(&text),
            "ReliefFactor" => relief.relief_factor = number(&text, "ReliefFactor").unwrap_or(relief.relief_factor),
            "AzimuthAngle" => relief.azimuth_angle = number(&text, "AzimuthAngle").unwrap_or(relief.azimuth_angle),
            "IlluminationAngle" => {
                relief.illumination_angle =
                    number(&text, "IlluminationAngle").unwrap_or(relief.illumination_angle)
            }
            _ => {}
        }
    }
    relief
}

fn fallback(el: &XmlElement) -> Option<Color> {
    el.attr("fallbackValue").and_then(|v| color(v, "fallbackValue"))
}

fn categorize(el: &XmlElement) -> Categorize {
    // The schema spells the attribute with a double h.
    let belongs_to = match el
        .attr("threshholdsBelongTo")
        .or_else(|| el.attr("thresholdsBelongTo"))
        .map(|v| v.trim().to_lowercase())
        .as_deref()
    {
        Some("preceding") => ThresholdBelongsTo::Preceding,
        Some("succeeding") | None => ThresholdBelongsTo::Succeeding,
        Some(other) => {
            warn!(value = %other, location = %el.location(), "Unknown threshold assignment, using succeeding");
            ThresholdBelongsTo::Succeeding
        }
    };

    let mut values = Vec::new();
    let mut thresholds = Vec::new();
    for child in el.elements() {
        match child.name.as_str() {
            "Value" => values.extend(color(&child.text(), "Value")),
            "Threshold" => thresholds.extend(number(&child.text(), "Threshold")),
            _ => {}
        }
    }
    if values.len() != thresholds.len() + 1 {
        warn!(
            values = values.len(),
            thresholds = thresholds.len(),
            location = %el.location(),
            "Categorize needs one more value than thresholds"
        );
    }

    Categorize {
        values,
        thresholds,
        belongs_to,
        fallback: fallback(el),
    }
}

fn interpolate(el: &XmlElement) -> Interpolate {
    let mut stops = Vec::new();
    for point in el.children("InterpolationPoint") {
        let data = point.child_text("Data").and_then(|d| number(&d, "Data"));
        let value = point.child_text("Value").and_then(|v| color(&v, "Value"));
        match (data, value) {
            (Some(d), Some(c)) => stops.push((d, c)),
            _ => warn!(location = %point.location(), "Interpolation point is incomplete"),
        }
    }
    stops.sort_by(|a, b| a.0.total_cmp(&b.0));
    Interpolate {
        stops,
        fallback: fallback(el),
    }
}

/// SLD 1.0 `ColorMapEntry` lists become a linear interpolation.
fn color_map_entries(el: &XmlElement) -> Interpolate {
    let mut stops = Vec::new();
    for entry in el.children("ColorMapEntry") {
        let quantity = entry.attr("quantity").and_then(|q| number(q, "quantity"));
        let entry_color = entry.attr("color").and_then(|c| color(c, "color"));
        let (Some(quantity), Some(mut entry_color)) = (quantity, entry_color) else {
            warn!(location = %entry.location(), "Color map entry needs a color and a quantity");
            continue;
        };
        if let Some(opacity) = entry.attr("opacity").and_then(|o| number(o, "opacity")) {
            entry_color = entry_color.with_opacity(opacity);
        }
        stops.push((quantity, entry_color));
    }
    stops.sort_by(|a, b| a.0.total_cmp(&b.0));
    Interpolate { stops, fallback: None }
}

impl SymbologyParser {
    pub(crate) fn parse_raster_symbolizer(&self, el: &XmlElement) -> ParseResult<Symbolizer<RasterStyling>> {
        let mut base = RasterStyling {
            uom: match self.dialect {
                Dialect::Se => symbology::Uom::from_attribute(el.attr("uom")),
                Dialect::Sld => symbology::Uom::Pixel,
            },
            ..Default::default()
        };
        let mut chain: Chain<RasterStyling> = None;
        let mut name = None;
        let mut geometry = None;

        for child in el.elements() {
            match child.name.as_str() {
                "Name" => name = Some(child.text()),
                "Geometry" => {
                    geometry = Some(
                        child
                            .child("PropertyName")
                            .map(XmlElement::text)
                            .unwrap_or_else(|| child.text()),
                    )
                }
                "Opacity" => {
                    chain = update_or_continue(
                        child,
                        &mut base,
                        chain,
                        numeric("Opacity", |r: &mut RasterStyling, v| r.opacity = v),
                    )?;
                }
                "ChannelSelection" => base.channels = channel_selection(child),
                "OverlapBehavior" => {
                    let text = match self.dialect {
                        Dialect::Se => child.text(),
                        Dialect::Sld => child.first_element().map(|e| e.name.clone()).unwrap_or_default(),
                    };
                    match Overlap::from_name(&text) {
                        Some(overlap) => base.overlap = overlap,
                        None => {
                            warn!(value = %text, location = %child.location(), "Unknown overlap behavior, using latest on top")
                        }
                    }
                }
                "ColorMap" => {
                    if let Some(c) = child.child("Categorize") {
                        base.categorize = Some(categorize(c));
                    } else if let Some(i) = child.child("Interpolate") {
                        base.interpolate = Some(interpolate(i));
                    } else if child.child("ColorMapEntry").is_some() {
                        base.interpolate = Some(color_map_entries(child));
                    } else {
                        warn!(location = %child.location(), "Empty color map is ignored");
                    }
                }
                "ContrastEnhancement" => base.contrast = Some(contrast_enhancement(child)),
                "ShadedRelief" => base.shaded = Some(shaded_relief(child)),
                "ImageOutline" => {
                    base.image_outline = match child.first_element() {
                        Some(line) if line.is("LineSymbolizer") => {
                            Some(ImageOutline::Line(self.parse_line_symbolizer(line)?))
                        }
                        Some(polygon) if polygon.is("PolygonSymbolizer") => {
                            Some(ImageOutline::Polygon(self.parse_polygon_symbolizer(polygon)?))
                        }
                        _ => {
                            warn!(location = %child.location(), "Image outline needs a line or polygon symbolizer");
                            None
                        }
                    };
                }
                _ => {}
            }
        }

        let mut symbolizer = Symbolizer::new(base, chain).with_name(name).with_geometry(geometry);
        symbolizer.location = Some(el.location());
        Ok(symbolizer)
    }
}
