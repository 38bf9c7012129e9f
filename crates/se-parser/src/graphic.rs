//! Fill, stroke, graphic and mark parsing shared by all symbolizers.

use std::sync::Arc;

use symbology::{
    Chain, Continuation, Deferred, Fill, FontResource, Graphic, LineCap, LineJoin, Mark, SimpleMark,
    Stroke, SvgResource,
};
use tracing::warn;

use crate::dialect::XLINK_NS;
use crate::error::ParseResult;
use crate::resources::{decode_base64, decode_image, ExternalImage};
use crate::style::SymbologyParser;
use crate::values::{color_onto, dash_array, numeric, update_or_continue};
use crate::xml::XmlElement;

pub(crate) fn line_join(text: &str) -> Option<LineJoin> {
    match text.trim().to_lowercase().as_str() {
        "mitre" | "miter" => Some(LineJoin::Mitre),
        "round" => Some(LineJoin::Round),
        "bevel" => Some(LineJoin::Bevel),
        other => {
            warn!(value = %other, "Unknown line join, using round");
            None
        }
    }
}

pub(crate) fn line_cap(text: &str) -> Option<LineCap> {
    match text.trim().to_lowercase().as_str() {
        "butt" => Some(LineCap::Butt),
        "round" => Some(LineCap::Round),
        "square" => Some(LineCap::Square),
        other => {
            warn!(value = %other, "Unknown line cap, using butt");
            None
        }
    }
}

/// The parameter name of an `SvgParameter` or `CssParameter`.
pub(crate) fn parameter_name(el: &XmlElement) -> Option<&str> {
    if el.is("SvgParameter") || el.is("CssParameter") {
        let name = el.attr("name");
        if name.is_none() {
            warn!(location = %el.location(), "Parameter without name attribute is ignored");
        }
        name
    } else {
        None
    }
}

fn apply_image(graphic: &mut Graphic, url: &str, image: Option<ExternalImage>) {
    graphic.image_url = Some(url.to_string());
    match image {
        Some(ExternalImage::Raster(image)) => {
            graphic.image = Some(image);
            graphic.svg = None;
        }
        Some(ExternalImage::Svg(svg)) => {
            graphic.svg = Some(svg);
            graphic.image = None;
        }
        None => {}
    }
}

impl SymbologyParser {
    pub(crate) fn parse_fill(&self, el: &XmlElement) -> ParseResult<Deferred<Fill>> {
        let mut base = Fill::default();
        let mut chain: Chain<Fill> = None;

        for child in el.elements() {
            if let Some(name) = parameter_name(child) {
                chain = match name {
                    "fill" => update_or_continue(child, &mut base, chain, |f: &mut Fill, v| {
                        if let Some(c) = color_onto(f.color, v, "fill") {
                            f.color = c;
                        }
                    })?,
                    "fill-opacity" => update_or_continue(
                        child,
                        &mut base,
                        chain,
                        numeric("fill-opacity", |f: &mut Fill, v| f.color = f.color.with_opacity(v)),
                    )?,
                    other => {
                        warn!(parameter = %other, location = %child.location(), "Unknown fill parameter");
                        chain
                    }
                };
            } else if child.is("GraphicFill") {
                let graphic = self.parse_graphic(child.require("Graphic")?)?;
                base.graphic = Some(Box::new(graphic.base));
                chain = Continuation::nest(chain, graphic.continuation, |f: &mut Fill| {
                    f.graphic.as_deref_mut()
                });
            }
        }

        Ok(Deferred::new(base, chain))
    }

    pub(crate) fn parse_stroke(&self, el: &XmlElement) -> ParseResult<Deferred<Stroke>> {
        let mut base = Stroke::default();
        let mut chain: Chain<Stroke> = None;

        for child in el.elements() {
            if let Some(name) = parameter_name(child) {
                chain = match name {
                    "stroke" => update_or_continue(child, &mut base, chain, |s: &mut Stroke, v| {
                        if let Some(c) = color_onto(s.color, v, "stroke") {
                            s.color = c;
                        }
                    })?,
                    "stroke-opacity" => update_or_continue(
                        child,
                        &mut base,
                        chain,
                        numeric("stroke-opacity", |s: &mut Stroke, v| {
                            s.color = s.color.with_opacity(v)
                        }),
                    )?,
                    "stroke-width" => update_or_continue(
                        child,
                        &mut base,
                        chain,
                        numeric("stroke-width", |s: &mut Stroke, v| s.width = v),
                    )?,
                    "stroke-linejoin" => update_or_continue(child, &mut base, chain, |s: &mut Stroke, v| {
                        s.line_join = line_join(v).unwrap_or_default();
                    })?,
                    "stroke-linecap" => update_or_continue(child, &mut base, chain, |s: &mut Stroke, v| {
                        s.line_cap = line_cap(v).unwrap_or_default();
                    })?,
                    "stroke-dasharray" => update_or_continue(child, &mut base, chain, |s: &mut Stroke, v| {
                        s.dasharray = dash_array(v);
                    })?,
                    "stroke-dashoffset" => update_or_continue(
                        child,
                        &mut base,
                        chain,
                        numeric("stroke-dashoffset", |s: &mut Stroke, v| s.dashoffset = v),
                    )?,
                    other => {
                        warn!(parameter = %other, location = %child.location(), "Unknown stroke parameter");
                        chain
                    }
                };
            } else if child.is("GraphicFill") {
                let graphic = self.parse_graphic(child.require("Graphic")?)?;
                base.fill = Some(Box::new(graphic.base));
                chain = Continuation::nest(chain, graphic.continuation, |s: &mut Stroke| {
                    s.fill.as_deref_mut()
                });
            } else if child.is("GraphicStroke") {
                chain = self.parse_graphic_stroke(child, &mut base, chain)?;
            }
        }

        Ok(Deferred::new(base, chain))
    }

    fn parse_graphic_stroke(
        &self,
        el: &XmlElement,
        base: &mut Stroke,
        mut chain: Chain<Stroke>,
    ) -> ParseResult<Chain<Stroke>> {
        for child in el.elements() {
            match child.name.as_str() {
                "Graphic" => {
                    let graphic = self.parse_graphic(child)?;
                    base.stroke = Some(Box::new(graphic.base));
                    chain = Continuation::nest(chain, graphic.continuation, |s: &mut Stroke| {
                        s.stroke.as_deref_mut()
                    });
                }
                "InitialGap" => {
                    chain = update_or_continue(
                        child,
                        base,
                        chain,
                        numeric("InitialGap", |s: &mut Stroke, v| s.stroke_initial_gap = v),
                    )?;
                }
                "Gap" => {
                    chain = update_or_continue(
                        child,
                        base,
                        chain,
                        numeric("Gap", |s: &mut Stroke, v| s.stroke_gap = v),
                    )?;
                }
                "PositionPercentage" => {
                    chain = update_or_continue(
                        child,
                        base,
                        chain,
                        numeric("PositionPercentage", |s: &mut Stroke, v| {
                            s.position_percentage = v
                        }),
                    )?;
                }
                _ => {}
            }
        }
        Ok(chain)
    }

    pub(crate) fn parse_graphic(&self, el: &XmlElement) -> ParseResult<Deferred<Graphic>> {
        let mut base = Graphic::default();
        let mut chain: Chain<Graphic> = None;

        for child in el.elements() {
            match child.name.as_str() {
                "Mark" => {
                    let mark = self.parse_mark(child)?;
                    base.mark = mark.base;
                    chain = Continuation::nest(chain, mark.continuation, |g: &mut Graphic| {
                        Some(&mut g.mark)
                    });
                }
                "ExternalGraphic" => {
                    chain = self.parse_external_graphic(child, &mut base, chain)?;
                }
                "Opacity" => {
                    chain = update_or_continue(
                        child,
                        &mut base,
                        chain,
                        numeric("Opacity", |g: &mut Graphic, v| g.opacity = v),
                    )?;
                }
                "Size" => {
                    chain = update_or_continue(
                        child,
                        &mut base,
                        chain,
                        numeric("Size", |g: &mut Graphic, v| g.size = v),
                    )?;
                }
                "Rotation" => {
                    chain = update_or_continue(
                        child,
                        &mut base,
                        chain,
                        numeric("Rotation", |g: &mut Graphic, v| g.rotation = v),
                    )?;
                }
                "AnchorPoint" => {
                    if let Some(x) = child.child("AnchorPointX") {
                        chain = update_or_continue(
                            x,
                            &mut base,
                            chain,
                            numeric("AnchorPointX", |g: &mut Graphic, v| g.anchor_x = v),
                        )?;
                    }
                    if let Some(y) = child.child("AnchorPointY") {
                        chain = update_or_continue(
                            y,
                            &mut base,
                            chain,
                            numeric("AnchorPointY", |g: &mut Graphic, v| g.anchor_y = v),
                        )?;
                    }
                }
                "Displacement" => {
                    if let Some(x) = child.child("DisplacementX") {
                        chain = update_or_continue(
                            x,
                            &mut base,
                            chain,
                            numeric("DisplacementX", |g: &mut Graphic, v| g.displacement_x = v),
                        )?;
                    }
                    if let Some(y) = child.child("DisplacementY") {
                        chain = update_or_continue(
                            y,
                            &mut base,
                            chain,
                            numeric("DisplacementY", |g: &mut Graphic, v| g.displacement_y = v),
                        )?;
                    }
                }
                _ => {}
            }
        }

        Ok(Deferred::new(base, chain))
    }

    pub(crate) fn parse_mark(&self, el: &XmlElement) -> ParseResult<Deferred<Mark>> {
        let mut base = Mark::default();
        let mut chain: Chain<Mark> = None;
        let mut data: Option<(String, Vec<u8>)> = None;
        let mut format: Option<String> = None;
        let mut index: Option<usize> = None;

        for child in el.elements() {
            match child.name.as_str() {
                "WellKnownName" => {
                    chain = update_or_continue(child, &mut base, chain, |m: &mut Mark, v| {
                        let name = v.trim().to_uppercase();
                        match SimpleMark::from_name(&name) {
                            Some(mark) => m.well_known = mark,
                            None => {
                                warn!(value = %v, "Unknown well known mark name, using square");
                                m.well_known = SimpleMark::Square;
                            }
                        }
                    })?;
                }
                "OnlineResource" => {
                    if let Some(href) = self.href(child) {
                        match self.cache.load_bytes(&href) {
                            Ok(bytes) => data = Some((href, bytes)),
                            Err(e) => {
                                warn!(error = %e, location = %child.location(), "Mark resource could not be loaded")
                            }
                        }
                    }
                }
                "InlineContent" => match decode_base64(&child.text()) {
                    Ok(bytes) => data = Some((format!("inline content at {}", child.location()), bytes)),
                    Err(e) => {
                        warn!(error = %e, location = %child.location(), "Inline mark content could not be decoded")
                    }
                },
                "Format" => format = Some(child.text()),
                "MarkIndex" => match child.text().parse::<usize>() {
                    Ok(i) => index = Some(i),
                    Err(_) => {
                        warn!(value = %child.text(), location = %child.location(), "Mark index is not a number")
                    }
                },
                "Fill" => {
                    let fill = self.parse_fill(child)?;
                    base.fill = fill.base;
                    chain = Continuation::nest(chain, fill.continuation, |m: &mut Mark| Some(&mut m.fill));
                }
                "Stroke" => {
                    let stroke = self.parse_stroke(child)?;
                    base.stroke = stroke.base;
                    chain = Continuation::nest(chain, stroke.continuation, |m: &mut Mark| {
                        Some(&mut m.stroke)
                    });
                }
                _ => {}
            }
        }

        if let Some((source, bytes)) = data {
            self.apply_mark_resource(&mut base, &source, format.as_deref(), index, bytes);
        }

        Ok(Deferred::new(base, chain))
    }

    fn apply_mark_resource(
        &self,
        mark: &mut Mark,
        source: &str,
        format: Option<&str>,
        index: Option<usize>,
        bytes: Vec<u8>,
    ) {
        let format = format.unwrap_or_default().to_lowercase();
        if format.contains("ttf") || format.contains("type1") {
            match FontResource::parse(source, bytes) {
                Ok(font) => {
                    let index = index.unwrap_or(0);
                    if index >= font.glyph_count {
                        warn!(
                            index,
                            glyphs = font.glyph_count,
                            source = %source,
                            "Mark index is not below the glyph count of the font"
                        );
                    }
                    mark.mark_index = index;
                    mark.font = Some(Arc::new(font));
                }
                Err(e) => warn!(error = %e, source = %source, "Font mark could not be read"),
            }
        } else if format.contains("svg") {
            let text = String::from_utf8_lossy(&bytes);
            match SvgResource::parse(source, &text) {
                Ok(svg) => mark.shape = Some(Arc::new(svg)),
                Err(e) => warn!(error = %e, source = %source, "SVG mark could not be read"),
            }
        } else {
            warn!(format = %format, source = %source, "Unsupported mark format");
        }
    }

    fn parse_external_graphic(
        &self,
        el: &XmlElement,
        base: &mut Graphic,
        mut chain: Chain<Graphic>,
    ) -> ParseResult<Chain<Graphic>> {
        let format = el.child_text("Format");

        if let Some(inline) = el.child("InlineContent") {
            let source = format!("inline content at {}", inline.location());
            match decode_base64(&inline.text()).and_then(|d| decode_image(&source, format.as_deref(), &d)) {
                Ok(image) => apply_image(base, &source, Some(image)),
                Err(e) => warn!(error = %e, location = %inline.location(), "Inline graphic could not be decoded"),
            }
        }

        if let Some(resource) = el.child("OnlineResource") {
            if let Some(href) = self.href(resource) {
                let image = self.cache.get(&href, format.as_deref());
                apply_image(base, &href, image);
            } else {
                let cache = Arc::clone(&self.cache);
                chain = update_or_continue(resource, base, chain, move |g: &mut Graphic, url| {
                    if url.is_empty() {
                        return;
                    }
                    let image = cache.get(url, format.as_deref());
                    apply_image(g, url, image);
                })?;
            }
        }

        Ok(chain)
    }

    /// The `xlink:href` of an online resource.
    pub(crate) fn href(&self, el: &XmlElement) -> Option<String> {
        el.attr_ns(XLINK_NS, "href")
            .or_else(|| el.attr("href"))
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
    }
}
