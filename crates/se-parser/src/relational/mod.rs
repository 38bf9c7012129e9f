//! Styles stored in a normalized relational schema.
//!
//! Tables: `styles`, `points`, `lines`, `polygons`, `texts`, `fills`,
//! `strokes`, `graphics`, `fonts`, `halos` and `lineplacements`, linked by
//! `*_id` columns. A style row either names a symbolizer row through
//! `type` and `fk`, or carries an SLD snippet in its `sld` column.

mod postgres;
mod reader;

pub use postgres::{PgStyleDatabase, SCHEMA_SQL};
pub use reader::PostgresStyleReader;

use async_trait::async_trait;
use sqlx::FromRow;
use style_common::WmsResult;

#[derive(Debug, Clone, Default, FromRow)]
pub struct StyleRow {
    #[sqlx(rename = "type")]
    pub kind: Option<String>,
    pub fk: Option<i32>,
    pub minscale: Option<f64>,
    pub maxscale: Option<f64>,
    pub sld: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, FromRow)]
pub struct PointRow {
    pub uom: Option<String>,
    pub graphic_id: Option<i32>,
}

#[derive(Debug, Clone, Default, FromRow)]
pub struct LineRow {
    pub uom: Option<String>,
    pub stroke_id: Option<i32>,
    pub perpendicularoffset: Option<f64>,
}

#[derive(Debug, Clone, Default, FromRow)]
pub struct PolygonRow {
    pub uom: Option<String>,
    pub fill_id: Option<i32>,
    pub stroke_id: Option<i32>,
    pub displacementx: Option<f64>,
    pub displacementy: Option<f64>,
    pub perpendicularoffset: Option<f64>,
}

#[derive(Debug, Clone, Default, FromRow)]
pub struct TextRow {
    pub labelexpr: Option<String>,
    pub uom: Option<String>,
    pub font_id: Option<i32>,
    pub fill_id: Option<i32>,
    pub rotation: Option<f64>,
    pub rotationexpr: Option<String>,
    pub displacementx: Option<f64>,
    pub displacementy: Option<f64>,
    pub anchorx: Option<f64>,
    pub anchory: Option<f64>,
    pub lineplacement_id: Option<i32>,
    pub halo_id: Option<i32>,
}

#[derive(Debug, Clone, Default, FromRow)]
pub struct FillRow {
    pub color: Option<String>,
    pub graphic_id: Option<i32>,
}

#[derive(Debug, Clone, Default, FromRow)]
pub struct StrokeRow {
    pub color: Option<String>,
    pub width: Option<f64>,
    pub widthexpr: Option<String>,
    pub linejoin: Option<String>,
    pub linecap: Option<String>,
    pub dasharray: Option<String>,
    pub dashoffset: Option<f64>,
    pub stroke_graphic_id: Option<i32>,
    pub fill_graphic_id: Option<i32>,
    pub strokegap: Option<f64>,
    pub strokeinitialgap: Option<f64>,
    pub positionpercentage: Option<f64>,
}

#[derive(Debug, Clone, Default, FromRow)]
pub struct GraphicRow {
    pub size: Option<f64>,
    pub sizeexpr: Option<String>,
    pub rotation: Option<f64>,
    pub rotationexpr: Option<String>,
    pub anchorx: Option<f64>,
    pub anchory: Option<f64>,
    pub displacementx: Option<f64>,
    pub displacementy: Option<f64>,
    pub wellknownname: Option<String>,
    pub svg: Option<String>,
    pub base64raster: Option<String>,
    pub fill_id: Option<i32>,
    pub stroke_id: Option<i32>,
}

#[derive(Debug, Clone, Default, FromRow)]
pub struct FontRow {
    pub family: Option<String>,
    pub style: Option<String>,
    pub bold: Option<bool>,
    pub size: Option<f64>,
}

#[derive(Debug, Clone, Default, FromRow)]
pub struct HaloRow {
    pub fill_id: Option<i32>,
    pub radius: Option<f64>,
}

#[derive(Debug, Clone, Default, FromRow)]
pub struct LinePlacementRow {
    pub perpendicularoffset: Option<f64>,
    pub repeat: Option<bool>,
    pub initialgap: Option<f64>,
    pub gap: Option<f64>,
    pub isaligned: Option<bool>,
    pub generalizeline: Option<bool>,
}

/// Row access for the styling schema. `Ok(None)` means no row with that id.
#[async_trait]
pub trait StyleDatabase: Send + Sync {
    async fn style(&self, id: i32) -> WmsResult<Option<StyleRow>>;
    async fn point(&self, id: i32) -> WmsResult<Option<PointRow>>;
    async fn line(&self, id: i32) -> WmsResult<Option<LineRow>>;
    async fn polygon(&self, id: i32) -> WmsResult<Option<PolygonRow>>;
    async fn text(&self, id: i32) -> WmsResult<Option<TextRow>>;
    async fn fill(&self, id: i32) -> WmsResult<Option<FillRow>>;
    async fn stroke(&self, id: i32) -> WmsResult<Option<StrokeRow>>;
    async fn graphic(&self, id: i32) -> WmsResult<Option<GraphicRow>>;
    async fn font(&self, id: i32) -> WmsResult<Option<FontRow>>;
    async fn halo(&self, id: i32) -> WmsResult<Option<HaloRow>>;
    async fn line_placement(&self, id: i32) -> WmsResult<Option<LinePlacementRow>>;
}
