//! Resolves style rows into styles, sharing every sub-object by id.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use style_common::{Expression, QName, WmsError, WmsResult};
use symbology::{
    AnySymbolizer, Chain, Continuation, Deferred, Fill, Font, FontStyle, Graphic, Halo, ImageResource,
    LinePlacement, LineStyling, PointStyling, PolygonStyling, Rule, SimpleMark, Stroke, Style,
    SvgResource, Symbolizer, TemplatePart, TextStyling, TextTemplate, Uom,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::StyleDatabase;
use crate::filter::parse_expression;
use crate::graphic::{line_cap, line_join};
use crate::resources::decode_base64;
use crate::style::parse_style;
use crate::values::{color, dash_array, numeric};
use crate::xml::XmlElement;

/// Tables that may reference each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Table {
    Graphic,
    Fill,
    Stroke,
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Table::Graphic => "graphic",
            Table::Fill => "fill",
            Table::Stroke => "stroke",
        })
    }
}

#[derive(Debug)]
struct TextEntry {
    styling: Deferred<TextStyling>,
    label: Option<Deferred<String>>,
}

/// Objects resolved so far, keyed by row id.
#[derive(Default)]
struct Memo {
    styles: HashMap<i32, Arc<Style>>,
    graphics: HashMap<i32, Arc<Deferred<Graphic>>>,
    fills: HashMap<i32, Arc<Deferred<Fill>>>,
    strokes: HashMap<i32, Arc<Deferred<Stroke>>>,
    fonts: HashMap<i32, Arc<Font>>,
    halos: HashMap<i32, Arc<Deferred<Halo>>>,
    line_placements: HashMap<i32, Arc<LinePlacement>>,
    points: HashMap<i32, Arc<Deferred<PointStyling>>>,
    lines: HashMap<i32, Arc<Deferred<LineStyling>>>,
    polygons: HashMap<i32, Arc<Deferred<PolygonStyling>>>,
    texts: HashMap<i32, Arc<TextEntry>>,
    /// Rows whose resolution is in progress.
    resolving: HashSet<(Table, i32)>,
}

impl Memo {
    fn enter(&mut self, table: Table, id: i32) -> WmsResult<()> {
        if !self.resolving.insert((table, id)) {
            return Err(WmsError::ConfigError(format!(
                "Cyclic reference to {} {} in the styling tables",
                table, id
            )));
        }
        Ok(())
    }

    fn leave(&mut self, table: Table, id: i32) {
        self.resolving.remove(&(table, id));
    }
}

/// Parse an `*expr` column: an XML expression, or a `{ns}local` / plain property name.
pub(crate) fn column_expression(text: &str) -> Expression {
    if let Ok(root) = XmlElement::parse(text) {
        if let Ok(expr) = parse_expression(&root) {
            return expr;
        }
    }
    Expression::PropertyName(QName::parse(text).local)
}

/// Append a step that evaluates an expression column and hands the text to `updater`.
fn column_continuation<T, U>(text: &str, column: &str, chain: Chain<T>, updater: U) -> Chain<T>
where
    T: 'static,
    U: Fn(&mut T, &str) + Send + Sync + 'static,
{
    let template = TextTemplate::new(vec![TemplatePart::Expression {
        expr: column_expression(text),
        location: format!("column {}", column),
    }]);
    Some(template.into_continuation(chain, updater))
}

/// Reads styles from a [`StyleDatabase`].
///
/// Resolved styles and their parts are kept for the lifetime of the reader,
/// so rows referenced from several places are fetched once and shared.
pub struct PostgresStyleReader<D> {
    db: D,
    base_dir: Option<PathBuf>,
    memo: Mutex<Memo>,
}

impl<D: StyleDatabase> PostgresStyleReader<D> {
    /// `base_dir` resolves relative resources in embedded SLD snippets.
    pub fn new(db: D, base_dir: Option<PathBuf>) -> Self {
        Self {
            db,
            base_dir,
            memo: Mutex::new(Memo::default()),
        }
    }

    pub fn database(&self) -> &D {
        &self.db
    }

    /// The style with row id `id`, or `None` if it is missing or unreadable.
    pub async fn get_style(&self, id: i32) -> Option<Arc<Style>> {
        let mut guard = self.memo.lock().await;
        let memo = &mut *guard;
        if let Some(style) = memo.styles.get(&id) {
            return Some(Arc::clone(style));
        }

        match self.load_style(memo, id).await {
            Ok(Some(style)) => {
                let style = Arc::new(style);
                memo.styles.insert(id, Arc::clone(&style));
                Some(style)
            }
            Ok(None) => {
                info!(id, "No style with this id in the database");
                None
            }
            Err(e) => {
                memo.resolving.clear();
                warn!(error = %e, id, "Unable to read style from database");
                None
            }
        }
    }

    /// The memoized fill for `id`, if a style resolved it.
    pub async fn cached_fill(&self, id: i32) -> Option<Arc<Deferred<Fill>>> {
        self.memo.lock().await.fills.get(&id).cloned()
    }

    /// The memoized graphic for `id`, if a style resolved it.
    pub async fn cached_graphic(&self, id: i32) -> Option<Arc<Deferred<Graphic>>> {
        self.memo.lock().await.graphics.get(&id).cloned()
    }

    /// Forget everything resolved so far.
    pub async fn clear(&self) {
        *self.memo.lock().await = Memo::default();
    }

    async fn load_style(&self, memo: &mut Memo, id: i32) -> WmsResult<Option<Style>> {
        let Some(row) = self.db.style(id).await? else {
            return Ok(None);
        };

        if let Some(kind) = row.kind.as_deref() {
            let key = row.fk.unwrap_or_default();
            let mut label = None;
            let symbolizer = match kind.trim().to_uppercase().as_str() {
                "POINT" => self
                    .point(memo, key)
                    .await?
                    .map(|p| AnySymbolizer::Point(Symbolizer::new(p.base.clone(), p.continuation.clone()))),
                "LINE" => self
                    .line(memo, key)
                    .await?
                    .map(|l| AnySymbolizer::Line(Symbolizer::new(l.base.clone(), l.continuation.clone()))),
                "POLYGON" => self
                    .polygon(memo, key)
                    .await?
                    .map(|p| AnySymbolizer::Polygon(Symbolizer::new(p.base.clone(), p.continuation.clone()))),
                "TEXT" => self.text(memo, key).await?.map(|t| {
                    label = t.label.clone();
                    AnySymbolizer::Text(Symbolizer::new(
                        t.styling.base.clone(),
                        t.styling.continuation.clone(),
                    ))
                }),
                other => {
                    return Err(WmsError::ConfigError(format!(
                        "Style {} has unknown symbolizer type '{}'",
                        id, other
                    )))
                }
            };
            let Some(symbolizer) = symbolizer else {
                return Err(WmsError::ConfigError(format!(
                    "Style {} references missing {} row {}",
                    id, kind, key
                )));
            };

            let symbolizer_id = symbolizer.id();
            let mut rule = Rule::new(vec![symbolizer]);
            rule.set_scale_range(
                row.minscale.unwrap_or(f64::NEG_INFINITY),
                row.maxscale.unwrap_or(f64::INFINITY),
            );
            let mut style = Style::new(Some(row.name.unwrap_or_else(|| id.to_string())), vec![rule]);
            if let Some(label) = label {
                style.set_label(symbolizer_id, label);
            }
            debug!(id, kind = %kind, "Resolved style from symbolizer tables");
            return Ok(Some(style));
        }

        if let Some(sld) = row.sld.as_deref() {
            let mut style = parse_style(sld, self.base_dir.as_deref()).map_err(|e| {
                WmsError::ConfigError(format!("Embedded style of row {} could not be parsed: {}", id, e))
            })?;
            if let Some(name) = row.name {
                style.name = Some(name);
            }
            return Ok(Some(style));
        }

        Ok(None)
    }

    fn graphic<'a>(&'a self, memo: &'a mut Memo, id: i32) -> BoxFuture<'a, WmsResult<Option<Arc<Deferred<Graphic>>>>> {
        async move {
            if let Some(hit) = memo.graphics.get(&id) {
                return Ok(Some(Arc::clone(hit)));
            }
            memo.enter(Table::Graphic, id)?;
            let result = self.load_graphic(memo, id).await;
            memo.leave(Table::Graphic, id);
            let graphic = result?.map(Arc::new);
            if let Some(g) = &graphic {
                memo.graphics.insert(id, Arc::clone(g));
            }
            Ok(graphic)
        }
        .boxed()
    }

    async fn load_graphic(&self, memo: &mut Memo, id: i32) -> WmsResult<Option<Deferred<Graphic>>> {
        let Some(row) = self.db.graphic(id).await? else {
            return Ok(None);
        };
        let mut base = Graphic::default();
        let mut chain: Chain<Graphic> = None;

        if let Some(size) = row.size {
            base.size = size;
        }
        if let Some(expr) = &row.sizeexpr {
            chain = column_continuation(expr, "graphics.sizeexpr", chain, numeric("size", |g: &mut Graphic, v| g.size = v));
        }
        if let Some(rotation) = row.rotation {
            base.rotation = rotation;
        }
        if let Some(expr) = &row.rotationexpr {
            chain = column_continuation(
                expr,
                "graphics.rotationexpr",
                chain,
                numeric("rotation", |g: &mut Graphic, v| g.rotation = v),
            );
        }
        base.anchor_x = row.anchorx.unwrap_or(base.anchor_x);
        base.anchor_y = row.anchory.unwrap_or(base.anchor_y);
        base.displacement_x = row.displacementx.unwrap_or(base.displacement_x);
        base.displacement_y = row.displacementy.unwrap_or(base.displacement_y);

        if let Some(wkn) = &row.wellknownname {
            base.mark.well_known = SimpleMark::from_name(&wkn.trim().to_uppercase()).unwrap_or_else(|| {
                warn!(value = %wkn, graphic = id, "Unknown well known name, using square");
                SimpleMark::Square
            });
        }
        if let Some(svg) = &row.svg {
            match SvgResource::parse(format!("graphics.svg of row {}", id), svg) {
                Ok(shape) => base.mark.shape = Some(Arc::new(shape)),
                Err(e) => warn!(error = %e, graphic = id, "SVG mark could not be read"),
            }
        }
        if let Some(raster) = &row.base64raster {
            let image = decode_base64(raster).and_then(|bytes| {
                ImageResource::parse(format!("graphics.base64raster of row {}", id), &bytes).map_err(Into::into)
            });
            match image {
                Ok(image) => base.image = Some(Arc::new(image)),
                Err(e) => warn!(error = %e, graphic = id, "Base64 encoded image could not be read"),
            }
        }
        if let Some(fill_id) = row.fill_id {
            if let Some(fill) = self.fill(memo, fill_id).await? {
                base.mark.fill = fill.base.clone();
                chain = Continuation::nest(chain, fill.continuation.clone(), |g: &mut Graphic| {
                    Some(&mut g.mark.fill)
                });
            }
        }
        if let Some(stroke_id) = row.stroke_id {
            if let Some(stroke) = self.stroke(memo, stroke_id).await? {
                base.mark.stroke = stroke.base.clone();
                chain = Continuation::nest(chain, stroke.continuation.clone(), |g: &mut Graphic| {
                    Some(&mut g.mark.stroke)
                });
            }
        }

        Ok(Some(Deferred::new(base, chain)))
    }

    fn fill<'a>(&'a self, memo: &'a mut Memo, id: i32) -> BoxFuture<'a, WmsResult<Option<Arc<Deferred<Fill>>>>> {
        async move {
            if let Some(hit) = memo.fills.get(&id) {
                return Ok(Some(Arc::clone(hit)));
            }
            memo.enter(Table::Fill, id)?;
            let result = self.load_fill(memo, id).await;
            memo.leave(Table::Fill, id);
            let fill = result?.map(Arc::new);
            if let Some(f) = &fill {
                memo.fills.insert(id, Arc::clone(f));
            }
            Ok(fill)
        }
        .boxed()
    }

    async fn load_fill(&self, memo: &mut Memo, id: i32) -> WmsResult<Option<Deferred<Fill>>> {
        let Some(row) = self.db.fill(id).await? else {
            return Ok(None);
        };
        let mut base = Fill::default();
        let mut chain: Chain<Fill> = None;

        if let Some(c) = row.color.as_deref().and_then(|c| color(c, "fills.color")) {
            base.color = c;
        }
        if let Some(graphic_id) = row.graphic_id {
            if let Some(graphic) = self.graphic(memo, graphic_id).await? {
                base.graphic = Some(Box::new(graphic.base.clone()));
                chain = Continuation::nest(chain, graphic.continuation.clone(), |f: &mut Fill| {
                    f.graphic.as_deref_mut()
                });
            }
        }

        Ok(Some(Deferred::new(base, chain)))
    }

    fn stroke<'a>(&'a self, memo: &'a mut Memo, id: i32) -> BoxFuture<'a, WmsResult<Option<Arc<Deferred<Stroke>>>>> {
        async move {
            if let Some(hit) = memo.strokes.get(&id) {
                return Ok(Some(Arc::clone(hit)));
            }
            memo.enter(Table::Stroke, id)?;
            let result = self.load_stroke(memo, id).await;
            memo.leave(Table::Stroke, id);
            let stroke = result?.map(Arc::new);
            if let Some(s) = &stroke {
                memo.strokes.insert(id, Arc::clone(s));
            }
            Ok(stroke)
        }
        .boxed()
    }

    async fn load_stroke(&self, memo: &mut Memo, id: i32) -> WmsResult<Option<Deferred<Stroke>>> {
        let Some(row) = self.db.stroke(id).await? else {
            return Ok(None);
        };
        let mut base = Stroke::default();
        let mut chain: Chain<Stroke> = None;

        if let Some(c) = row.color.as_deref().and_then(|c| color(c, "strokes.color")) {
            base.color = c;
        }
        if let Some(width) = row.width {
            base.width = width;
        }
        if let Some(expr) = &row.widthexpr {
            base.width = -1.0;
            chain = column_continuation(expr, "strokes.widthexpr", chain, numeric("width", |s: &mut Stroke, v| s.width = v));
        }
        if let Some(join) = row.linejoin.as_deref().and_then(line_join) {
            base.line_join = join;
        }
        if let Some(cap) = row.linecap.as_deref().and_then(line_cap) {
            base.line_cap = cap;
        }
        if let Some(dashes) = &row.dasharray {
            base.dasharray = dash_array(dashes);
        }
        base.dashoffset = row.dashoffset.unwrap_or(base.dashoffset);
        base.stroke_gap = row.strokegap.unwrap_or(base.stroke_gap);
        base.stroke_initial_gap = row.strokeinitialgap.unwrap_or(base.stroke_initial_gap);
        base.position_percentage = row.positionpercentage.unwrap_or(base.position_percentage);

        if let Some(graphic_id) = row.stroke_graphic_id {
            if let Some(graphic) = self.graphic(memo, graphic_id).await? {
                base.stroke = Some(Box::new(graphic.base.clone()));
                chain = Continuation::nest(chain, graphic.continuation.clone(), |s: &mut Stroke| {
                    s.stroke.as_deref_mut()
                });
            }
        }
        if let Some(graphic_id) = row.fill_graphic_id {
            if let Some(graphic) = self.graphic(memo, graphic_id).await? {
                base.fill = Some(Box::new(graphic.base.clone()));
                chain = Continuation::nest(chain, graphic.continuation.clone(), |s: &mut Stroke| {
                    s.fill.as_deref_mut()
                });
            }
        }

        Ok(Some(Deferred::new(base, chain)))
    }

    async fn font(&self, memo: &mut Memo, id: i32) -> WmsResult<Option<Arc<Font>>> {
        if let Some(hit) = memo.fonts.get(&id) {
            return Ok(Some(Arc::clone(hit)));
        }
        let Some(row) = self.db.font(id).await? else {
            return Ok(None);
        };
        let mut font = Font::default();
        if let Some(family) = &row.family {
            font.families.extend(
                family
                    .split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string),
            );
        }
        if let Some(style) = &row.style {
            match FontStyle::from_name(style) {
                Some(s) => font.style = s,
                None => warn!(value = %style, font = id, "Unknown font style, using normal"),
            }
        }
        font.bold = row.bold.unwrap_or(font.bold);
        font.size = row.size.unwrap_or(font.size);

        let font = Arc::new(font);
        memo.fonts.insert(id, Arc::clone(&font));
        Ok(Some(font))
    }

    async fn halo(&self, memo: &mut Memo, id: i32) -> WmsResult<Option<Arc<Deferred<Halo>>>> {
        if let Some(hit) = memo.halos.get(&id) {
            return Ok(Some(Arc::clone(hit)));
        }
        let Some(row) = self.db.halo(id).await? else {
            return Ok(None);
        };
        let mut base = Halo::default();
        let mut chain: Chain<Halo> = None;
        base.radius = row.radius.unwrap_or(base.radius);
        if let Some(fill_id) = row.fill_id {
            if let Some(fill) = self.fill(memo, fill_id).await? {
                base.fill = fill.base.clone();
                chain = Continuation::nest(chain, fill.continuation.clone(), |h: &mut Halo| Some(&mut h.fill));
            }
        }

        let halo = Arc::new(Deferred::new(base, chain));
        memo.halos.insert(id, Arc::clone(&halo));
        Ok(Some(halo))
    }

    async fn line_placement(&self, memo: &mut Memo, id: i32) -> WmsResult<Option<Arc<LinePlacement>>> {
        if let Some(hit) = memo.line_placements.get(&id) {
            return Ok(Some(Arc::clone(hit)));
        }
        let Some(row) = self.db.line_placement(id).await? else {
            return Ok(None);
        };
        let mut placement = LinePlacement::default();
        placement.perpendicular_offset = row.perpendicularoffset.unwrap_or(placement.perpendicular_offset);
        placement.repeat = row.repeat.unwrap_or(placement.repeat);
        placement.initial_gap = row.initialgap.unwrap_or(placement.initial_gap);
        placement.gap = row.gap.unwrap_or(placement.gap);
        placement.is_aligned = row.isaligned.unwrap_or(placement.is_aligned);
        placement.generalize_line = row.generalizeline.unwrap_or(placement.generalize_line);

        let placement = Arc::new(placement);
        memo.line_placements.insert(id, Arc::clone(&placement));
        Ok(Some(placement))
    }

    async fn point(&self, memo: &mut Memo, id: i32) -> WmsResult<Option<Arc<Deferred<PointStyling>>>> {
        if let Some(hit) = memo.points.get(&id) {
            return Ok(Some(Arc::clone(hit)));
        }
        let Some(row) = self.db.point(id).await? else {
            return Ok(None);
        };
        let mut base = PointStyling {
            uom: Uom::from_attribute(row.uom.as_deref()),
            ..Default::default()
        };
        let mut chain: Chain<PointStyling> = None;
        if let Some(graphic_id) = row.graphic_id {
            if let Some(graphic) = self.graphic(memo, graphic_id).await? {
                base.graphic = graphic.base.clone();
                chain = Continuation::nest(chain, graphic.continuation.clone(), |p: &mut PointStyling| {
                    Some(&mut p.graphic)
                });
            }
        }

        let point = Arc::new(Deferred::new(base, chain));
        memo.points.insert(id, Arc::clone(&point));
        Ok(Some(point))
    }

    async fn line(&self, memo: &mut Memo, id: i32) -> WmsResult<Option<Arc<Deferred<LineStyling>>>> {
        if let Some(hit) = memo.lines.get(&id) {
            return Ok(Some(Arc::clone(hit)));
        }
        let Some(row) = self.db.line(id).await? else {
            return Ok(None);
        };
        let mut base = LineStyling {
            uom: Uom::from_attribute(row.uom.as_deref()),
            perpendicular_offset: row.perpendicularoffset.unwrap_or_default(),
            ..Default::default()
        };
        let mut chain: Chain<LineStyling> = None;
        if let Some(stroke_id) = row.stroke_id {
            if let Some(stroke) = self.stroke(memo, stroke_id).await? {
                base.stroke = stroke.base.clone();
                chain = Continuation::nest(chain, stroke.continuation.clone(), |l: &mut LineStyling| {
                    Some(&mut l.stroke)
                });
            }
        }

        let line = Arc::new(Deferred::new(base, chain));
        memo.lines.insert(id, Arc::clone(&line));
        Ok(Some(line))
    }

    async fn polygon(&self, memo: &mut Memo, id: i32) -> WmsResult<Option<Arc<Deferred<PolygonStyling>>>> {
        if let Some(hit) = memo.polygons.get(&id) {
            return Ok(Some(Arc::clone(hit)));
        }
        let Some(row) = self.db.polygon(id).await? else {
            return Ok(None);
        };
        let mut base = PolygonStyling {
            uom: Uom::from_attribute(row.uom.as_deref()),
            displacement_x: row.displacementx.unwrap_or_default(),
            displacement_y: row.displacementy.unwrap_or_default(),
            perpendicular_offset: row.perpendicularoffset.unwrap_or_default(),
            ..Default::default()
        };
        let mut chain: Chain<PolygonStyling> = None;
        if let Some(fill_id) = row.fill_id {
            if let Some(fill) = self.fill(memo, fill_id).await? {
                base.fill = Some(fill.base.clone());
                chain = Continuation::nest(chain, fill.continuation.clone(), |p: &mut PolygonStyling| {
                    p.fill.as_mut()
                });
            }
        }
        if let Some(stroke_id) = row.stroke_id {
            if let Some(stroke) = self.stroke(memo, stroke_id).await? {
                base.stroke = Some(stroke.base.clone());
                chain = Continuation::nest(chain, stroke.continuation.clone(), |p: &mut PolygonStyling| {
                    p.stroke.as_mut()
                });
            }
        }

        let polygon = Arc::new(Deferred::new(base, chain));
        memo.polygons.insert(id, Arc::clone(&polygon));
        Ok(Some(polygon))
    }

    async fn text(&self, memo: &mut Memo, id: i32) -> WmsResult<Option<Arc<TextEntry>>> {
        if let Some(hit) = memo.texts.get(&id) {
            return Ok(Some(Arc::clone(hit)));
        }
        let Some(row) = self.db.text(id).await? else {
            return Ok(None);
        };
        let mut base = TextStyling {
            uom: Uom::from_attribute(row.uom.as_deref()),
            ..Default::default()
        };
        let mut chain: Chain<TextStyling> = None;

        if let Some(font_id) = row.font_id {
            if let Some(font) = self.font(memo, font_id).await? {
                base.font = (*font).clone();
            }
        }
        if let Some(fill_id) = row.fill_id {
            if let Some(fill) = self.fill(memo, fill_id).await? {
                base.fill = fill.base.clone();
                chain = Continuation::nest(chain, fill.continuation.clone(), |t: &mut TextStyling| {
                    Some(&mut t.fill)
                });
            }
        }
        base.rotation = row.rotation.unwrap_or(base.rotation);
        if let Some(expr) = &row.rotationexpr {
            chain = column_continuation(
                expr,
                "texts.rotationexpr",
                chain,
                numeric("rotation", |t: &mut TextStyling, v| t.rotation = v),
            );
        }
        base.displacement_x = row.displacementx.unwrap_or(base.displacement_x);
        base.displacement_y = row.displacementy.unwrap_or(base.displacement_y);
        base.anchor_x = row.anchorx.unwrap_or(base.anchor_x);
        base.anchor_y = row.anchory.unwrap_or(base.anchor_y);
        if let Some(placement_id) = row.lineplacement_id {
            base.line_placement = self
                .line_placement(memo, placement_id)
                .await?
                .map(|p| (*p).clone());
        }
        if let Some(halo_id) = row.halo_id {
            if let Some(halo) = self.halo(memo, halo_id).await? {
                base.halo = Some(halo.base.clone());
                chain = Continuation::nest(chain, halo.continuation.clone(), |t: &mut TextStyling| {
                    t.halo.as_mut()
                });
            }
        }

        let label = match &row.labelexpr {
            Some(expr) => Some(Deferred::new(
                String::new(),
                column_continuation(expr, "texts.labelexpr", None, |s: &mut String, v| s.push_str(v)),
            )),
            None => {
                warn!(text = id, "Text row has no label expression");
                None
            }
        };

        let entry = Arc::new(TextEntry {
            styling: Deferred::new(base, chain),
            label,
        });
        memo.texts.insert(id, Arc::clone(&entry));
        Ok(Some(entry))
    }
}
