//! Point, line, polygon and text symbolizers.

use symbology::{
    AnySymbolizer, Chain, Continuation, Deferred, Description, Font, FontStyle, Halo, LinePlacement,
    LineStyling, OffsetSubstraction, OffsetType, PerpendicularOffsetType, PointStyling, PolygonStyling,
    Symbolizer, TextStyling, Uom,
};
use tracing::warn;

use crate::dialect::Dialect;
use crate::error::{ParseError, ParseResult};
use crate::graphic::parameter_name;
use crate::style::SymbologyParser;
use crate::values::{boolean, flag, numeric, update_or_continue};
use crate::xml::XmlElement;

/// A parsed symbolizer and, for text symbolizers, its label template.
pub(crate) type ParsedSymbolizer = (AnySymbolizer, Option<Deferred<String>>);

/// Name, geometry and description shared by all symbolizer kinds.
#[derive(Debug, Default)]
struct Common {
    name: Option<String>,
    geometry: Option<String>,
    description: Option<Description>,
}

impl Common {
    fn read(el: &XmlElement, dialect: Dialect) -> Self {
        let mut common = Common::default();
        for child in el.elements() {
            match child.name.as_str() {
                "Name" => common.name = Some(child.text()),
                "Geometry" => {
                    common.geometry = Some(
                        child
                            .child("PropertyName")
                            .or_else(|| child.child("ValueReference"))
                            .map(XmlElement::text)
                            .unwrap_or_else(|| child.text()),
                    )
                }
                "Description" if dialect == Dialect::Se => {
                    common.description = Some(Description {
                        title: child.child_text("Title"),
                        abstract_text: child.child_text("Abstract"),
                    })
                }
                "Title" => common.description.get_or_insert_with(Description::default).title = Some(child.text()),
                "Abstract" => {
                    common.description.get_or_insert_with(Description::default).abstract_text =
                        Some(child.text())
                }
                _ => {}
            }
        }
        common
    }

    fn apply<T: Clone + 'static>(self, symbolizer: Symbolizer<T>, el: &XmlElement) -> Symbolizer<T> {
        let mut symbolizer = symbolizer.with_name(self.name).with_geometry(self.geometry);
        symbolizer.description = self.description;
        symbolizer.location = Some(el.location());
        symbolizer
    }
}

fn perpendicular_offset_type(el: &XmlElement) -> PerpendicularOffsetType {
    let mut offset = PerpendicularOffsetType::default();
    if let Some(kind) = el.attr("type") {
        offset.kind = match kind.trim().to_lowercase().as_str() {
            "standard" => OffsetType::Standard,
            "round" => OffsetType::Round,
            "edged" => OffsetType::Edged,
            other => {
                warn!(value = %other, location = %el.location(), "Unknown perpendicular offset type");
                OffsetType::Standard
            }
        };
    }
    if let Some(sub) = el.attr("substraction") {
        offset.substraction = match sub.trim().to_lowercase().as_str() {
            "negativeoffset" => OffsetSubstraction::NegativeOffset,
            "none" => OffsetSubstraction::None,
            other => {
                warn!(value = %other, location = %el.location(), "Unknown perpendicular offset substraction");
                OffsetSubstraction::None
            }
        };
    }
    offset
}

impl SymbologyParser {
    /// The unit of measure of a symbolizer. SLD 1.0 has no units and always uses pixels.
    fn uom(&self, el: &XmlElement) -> Uom {
        match self.dialect {
            Dialect::Se => Uom::from_attribute(el.attr("uom")),
            Dialect::Sld => Uom::Pixel,
        }
    }

    /// Parse any `*Symbolizer` element.
    pub(crate) fn parse_symbolizer(&self, el: &XmlElement) -> ParseResult<ParsedSymbolizer> {
        match el.name.as_str() {
            "PointSymbolizer" => Ok((AnySymbolizer::Point(self.parse_point_symbolizer(el)?), None)),
            "LineSymbolizer" => Ok((AnySymbolizer::Line(self.parse_line_symbolizer(el)?), None)),
            "PolygonSymbolizer" => Ok((AnySymbolizer::Polygon(self.parse_polygon_symbolizer(el)?), None)),
            "TextSymbolizer" => {
                let (symbolizer, label) = self.parse_text_symbolizer(el)?;
                Ok((AnySymbolizer::Text(symbolizer), label))
            }
            "RasterSymbolizer" => Ok((AnySymbolizer::Raster(self.parse_raster_symbolizer(el)?), None)),
            other => Err(ParseError::Unexpected {
                expected: "a symbolizer".into(),
                found: other.to_string(),
                location: el.location(),
            }),
        }
    }

    pub(crate) fn parse_point_symbolizer(&self, el: &XmlElement) -> ParseResult<Symbolizer<PointStyling>> {
        let mut base = PointStyling {
            uom: self.uom(el),
            ..Default::default()
        };
        let mut chain: Chain<PointStyling> = None;

        if let Some(graphic) = el.child("Graphic") {
            let graphic = self.parse_graphic(graphic)?;
            base.graphic = graphic.base;
            chain = Continuation::nest(chain, graphic.continuation, |p: &mut PointStyling| {
                Some(&mut p.graphic)
            });
        }

        Ok(Common::read(el, self.dialect).apply(Symbolizer::new(base, chain), el))
    }

    pub(crate) fn parse_line_symbolizer(&self, el: &XmlElement) -> ParseResult<Symbolizer<LineStyling>> {
        let mut base = LineStyling {
            uom: self.uom(el),
            ..Default::default()
        };
        let mut chain: Chain<LineStyling> = None;

        for child in el.elements() {
            match child.name.as_str() {
                "Stroke" => {
                    let stroke = self.parse_stroke(child)?;
                    base.stroke = stroke.base;
                    chain = Continuation::nest(chain, stroke.continuation, |l: &mut LineStyling| {
                        Some(&mut l.stroke)
                    });
                }
                "PerpendicularOffset" => {
                    base.perpendicular_offset_type = perpendicular_offset_type(child);
                    chain = update_or_continue(
                        child,
                        &mut base,
                        chain,
                        numeric("PerpendicularOffset", |l: &mut LineStyling, v| {
                            l.perpendicular_offset = v
                        }),
                    )?;
                }
                _ => {}
            }
        }

        Ok(Common::read(el, self.dialect).apply(Symbolizer::new(base, chain), el))
    }

    pub(crate) fn parse_polygon_symbolizer(
        &self,
        el: &XmlElement,
    ) -> ParseResult<Symbolizer<PolygonStyling>> {
        let mut base = PolygonStyling {
            uom: self.uom(el),
            ..Default::default()
        };
        let mut chain: Chain<PolygonStyling> = None;

        for child in el.elements() {
            match child.name.as_str() {
                "Fill" => {
                    let fill = self.parse_fill(child)?;
                    base.fill = Some(fill.base);
                    chain = Continuation::nest(chain, fill.continuation, |p: &mut PolygonStyling| {
                        p.fill.as_mut()
                    });
                }
                "Stroke" => {
                    let stroke = self.parse_stroke(child)?;
                    base.stroke = Some(stroke.base);
                    chain = Continuation::nest(chain, stroke.continuation, |p: &mut PolygonStyling| {
                        p.stroke.as_mut()
                    });
                }
                "PerpendicularOffset" => {
                    base.perpendicular_offset_type = perpendicular_offset_type(child);
                    chain = update_or_continue(
                        child,
                        &mut base,
                        chain,
                        numeric("PerpendicularOffset", |p: &mut PolygonStyling, v| {
                            p.perpendicular_offset = v
                        }),
                    )?;
                }
                "Displacement" => {
                    if let Some(x) = child.child("DisplacementX") {
                        chain = update_or_continue(
                            x,
                            &mut base,
                            chain,
                            numeric("DisplacementX", |p: &mut PolygonStyling, v| p.displacement_x = v),
                        )?;
                    }
                    if let Some(y) = child.child("DisplacementY") {
                        chain = update_or_continue(
                            y,
                            &mut base,
                            chain,
                            numeric("DisplacementY", |p: &mut PolygonStyling, v| p.displacement_y = v),
                        )?;
                    }
                }
                _ => {}
            }
        }

        Ok(Common::read(el, self.dialect).apply(Symbolizer::new(base, chain), el))
    }

    pub(crate) fn parse_text_symbolizer(
        &self,
        el: &XmlElement,
    ) -> ParseResult<(Symbolizer<TextStyling>, Option<Deferred<String>>)> {
        let mut base = TextStyling {
            uom: self.uom(el),
            ..Default::default()
        };
        let mut chain: Chain<TextStyling> = None;
        let mut label = None;

        for child in el.elements() {
            match child.name.as_str() {
                "Label" => {
                    let mut text = String::new();
                    let continuation = update_or_continue(child, &mut text, None, |s: &mut String, v| {
                        s.clear();
                        s.push_str(v);
                    })?;
                    label = Some(Deferred::new(text, continuation));
                }
                "Font" => {
                    let font = self.parse_font(child)?;
                    base.font = font.base;
                    chain = Continuation::nest(chain, font.continuation, |t: &mut TextStyling| {
                        Some(&mut t.font)
                    });
                }
                "Fill" => {
                    let fill = self.parse_fill(child)?;
                    base.fill = fill.base;
                    chain = Continuation::nest(chain, fill.continuation, |t: &mut TextStyling| {
                        Some(&mut t.fill)
                    });
                }
                "Halo" => {
                    let halo = self.parse_halo(child)?;
                    base.halo = Some(halo.base);
                    chain = Continuation::nest(chain, halo.continuation, |t: &mut TextStyling| {
                        t.halo.as_mut()
                    });
                }
                "LabelPlacement" => {
                    chain = self.parse_label_placement(child, &mut base, chain)?;
                }
                _ => {}
            }
        }

        let symbolizer = Common::read(el, self.dialect).apply(Symbolizer::new(base, chain), el);
        Ok((symbolizer, label))
    }

    fn parse_font(&self, el: &XmlElement) -> ParseResult<Deferred<Font>> {
        let mut base = Font::default();
        let mut chain: Chain<Font> = None;

        for child in el.elements() {
            let Some(name) = parameter_name(child) else {
                continue;
            };
            chain = match name {
                "font-family" => update_or_continue(child, &mut base, chain, |f: &mut Font, v| {
                    f.families.push(v.to_string());
                })?,
                "font-style" => update_or_continue(child, &mut base, chain, |f: &mut Font, v| {
                    match FontStyle::from_name(v) {
                        Some(style) => f.style = style,
                        None => warn!(value = %v, "Unknown font style, using normal"),
                    }
                })?,
                "font-weight" => update_or_continue(child, &mut base, chain, |f: &mut Font, v| {
                    f.bold = v.trim().eq_ignore_ascii_case("bold");
                })?,
                "font-size" => update_or_continue(
                    child,
                    &mut base,
                    chain,
                    numeric("font-size", |f: &mut Font, v| f.size = v),
                )?,
                "font-color" => {
                    warn!(location = %child.location(), "The font-color parameter is not supported, use a Fill");
                    chain
                }
                other => {
                    warn!(parameter = %other, location = %child.location(), "Unknown font parameter");
                    chain
                }
            };
        }

        Ok(Deferred::new(base, chain))
    }

    fn parse_halo(&self, el: &XmlElement) -> ParseResult<Deferred<Halo>> {
        let mut base = Halo::default();
        let mut chain: Chain<Halo> = None;

        for child in el.elements() {
            match child.name.as_str() {
                "Radius" => {
                    chain = update_or_continue(
                        child,
                        &mut base,
                        chain,
                        numeric("Radius", |h: &mut Halo, v| h.radius = v),
                    )?;
                }
                "Fill" => {
                    let fill = self.parse_fill(child)?;
                    base.fill = fill.base;
                    chain = Continuation::nest(chain, fill.continuation, |h: &mut Halo| Some(&mut h.fill));
                }
                _ => {}
            }
        }

        Ok(Deferred::new(base, chain))
    }

    fn parse_label_placement(
        &self,
        el: &XmlElement,
        base: &mut TextStyling,
        mut chain: Chain<TextStyling>,
    ) -> ParseResult<Chain<TextStyling>> {
        if let Some(point) = el.child("PointPlacement") {
            base.auto = point.attr("auto").is_some_and(boolean);
            for child in point.elements() {
                match child.name.as_str() {
                    "AnchorPoint" => {
                        if let Some(x) = child.child("AnchorPointX") {
                            chain = update_or_continue(
                                x,
                                base,
                                chain,
                                numeric("AnchorPointX", |t: &mut TextStyling, v| t.anchor_x = v),
                            )?;
                        }
                        if let Some(y) = child.child("AnchorPointY") {
                            chain = update_or_continue(
                                y,
                                base,
                                chain,
                                numeric("AnchorPointY", |t: &mut TextStyling, v| t.anchor_y = v),
                            )?;
                        }
                    }
                    "Displacement" => {
                        if let Some(x) = child.child("DisplacementX") {
                            chain = update_or_continue(
                                x,
                                base,
                                chain,
                                numeric("DisplacementX", |t: &mut TextStyling, v| t.displacement_x = v),
                            )?;
                        }
                        if let Some(y) = child.child("DisplacementY") {
                            chain = update_or_continue(
                                y,
                                base,
                                chain,
                                numeric("DisplacementY", |t: &mut TextStyling, v| t.displacement_y = v),
                            )?;
                        }
                    }
                    "Rotation" => {
                        chain = update_or_continue(
                            child,
                            base,
                            chain,
                            numeric("Rotation", |t: &mut TextStyling, v| t.rotation = v),
                        )?;
                    }
                    _ => {}
                }
            }
        }

        if let Some(line) = el.child("LinePlacement") {
            let placement = self.parse_line_placement(line)?;
            base.line_placement = Some(placement.base);
            chain = Continuation::nest(chain, placement.continuation, |t: &mut TextStyling| {
                t.line_placement.as_mut()
            });
        }

        Ok(chain)
    }

    fn parse_line_placement(&self, el: &XmlElement) -> ParseResult<Deferred<LinePlacement>> {
        let mut base = LinePlacement::default();
        let mut chain: Chain<LinePlacement> = None;

        for child in el.elements() {
            chain = match child.name.as_str() {
                "PerpendicularOffset" => {
                    base.perpendicular_offset_type = perpendicular_offset_type(child);
                    update_or_continue(
                        child,
                        &mut base,
                        chain,
                        numeric("PerpendicularOffset", |p: &mut LinePlacement, v| {
                            p.perpendicular_offset = v
                        }),
                    )?
                }
                "InitialGap" => update_or_continue(
                    child,
                    &mut base,
                    chain,
                    numeric("InitialGap", |p: &mut LinePlacement, v| p.initial_gap = v),
                )?,
                "Gap" => update_or_continue(
                    child,
                    &mut base,
                    chain,
                    numeric("Gap", |p: &mut LinePlacement, v| p.gap = v),
                )?,
                "GeneralizeLine" => update_or_continue(
                    child,
                    &mut base,
                    chain,
                    flag(|p: &mut LinePlacement, v| p.generalize_line = v),
                )?,
                "IsAligned" => update_or_continue(
                    child,
                    &mut base,
                    chain,
                    flag(|p: &mut LinePlacement, v| p.is_aligned = v),
                )?,
                "IsRepeated" => update_or_continue(
                    child,
                    &mut base,
                    chain,
                    flag(|p: &mut LinePlacement, v| p.repeat = v),
                )?,
                "PreventUpsideDown" => update_or_continue(
                    child,
                    &mut base,
                    chain,
                    flag(|p: &mut LinePlacement, v| p.prevent_upside_down = v),
                )?,
                "Center" => update_or_continue(
                    child,
                    &mut base,
                    chain,
                    flag(|p: &mut LinePlacement, v| p.center = v),
                )?,
                "WordWise" => update_or_continue(
                    child,
                    &mut base,
                    chain,
                    flag(|p: &mut LinePlacement, v| p.word_wise = v),
                )?,
                _ => chain,
            };
        }

        Ok(Deferred::new(base, chain))
    }
}
