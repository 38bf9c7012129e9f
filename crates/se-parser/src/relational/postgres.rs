//! `StyleDatabase` over a PostgreSQL connection pool.

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool};
use style_common::{WmsError, WmsResult};
use tracing::info;

use super::{
    FillRow, FontRow, GraphicRow, HaloRow, LinePlacementRow, LineRow, PointRow, PolygonRow, StrokeRow,
    StyleDatabase, StyleRow, TextRow,
};

/// Table definitions of the styling schema. `{schema}` is replaced by the schema name.
pub const SCHEMA_SQL: &str = r#"
CREATE SCHEMA IF NOT EXISTS {schema};

CREATE TABLE IF NOT EXISTS {schema}.fills (
    id SERIAL PRIMARY KEY,
    color VARCHAR(9),
    graphic_id INTEGER
);

CREATE TABLE IF NOT EXISTS {schema}.strokes (
    id SERIAL PRIMARY KEY,
    color VARCHAR(9),
    width DOUBLE PRECISION,
    widthexpr TEXT,
    linejoin VARCHAR(8),
    linecap VARCHAR(8),
    dasharray TEXT,
    dashoffset DOUBLE PRECISION,
    stroke_graphic_id INTEGER,
    fill_graphic_id INTEGER,
    strokegap DOUBLE PRECISION,
    strokeinitialgap DOUBLE PRECISION,
    positionpercentage DOUBLE PRECISION
);

CREATE TABLE IF NOT EXISTS {schema}.graphics (
    id SERIAL PRIMARY KEY,
    size DOUBLE PRECISION,
    sizeexpr TEXT,
    rotation DOUBLE PRECISION,
    rotationexpr TEXT,
    anchorx DOUBLE PRECISION,
    anchory DOUBLE PRECISION,
    displacementx DOUBLE PRECISION,
    displacementy DOUBLE PRECISION,
    wellknownname VARCHAR(16),
    svg TEXT,
    base64raster TEXT,
    fill_id INTEGER REFERENCES {schema}.fills,
    stroke_id INTEGER REFERENCES {schema}.strokes
);

CREATE TABLE IF NOT EXISTS {schema}.fonts (
    id SERIAL PRIMARY KEY,
    family TEXT,
    style VARCHAR(16),
    bold BOOLEAN,
    size DOUBLE PRECISION
);

CREATE TABLE IF NOT EXISTS {schema}.halos (
    id SERIAL PRIMARY KEY,
    fill_id INTEGER REFERENCES {schema}.fills,
    radius DOUBLE PRECISION
);

CREATE TABLE IF NOT EXISTS {schema}.lineplacements (
    id SERIAL PRIMARY KEY,
    perpendicularoffset DOUBLE PRECISION,
    repeat BOOLEAN,
    initialgap DOUBLE PRECISION,
    gap DOUBLE PRECISION,
    isaligned BOOLEAN,
    generalizeline BOOLEAN
);

CREATE TABLE IF NOT EXISTS {schema}.points (
    id SERIAL PRIMARY KEY,
    uom TEXT,
    graphic_id INTEGER REFERENCES {schema}.graphics
);

CREATE TABLE IF NOT EXISTS {schema}.lines (
    id SERIAL PRIMARY KEY,
    uom TEXT,
    stroke_id INTEGER REFERENCES {schema}.strokes,
    perpendicularoffset DOUBLE PRECISION
);

CREATE TABLE IF NOT EXISTS {schema}.polygons (
    id SERIAL PRIMARY KEY,
    uom TEXT,
    fill_id INTEGER REFERENCES {schema}.fills,
    stroke_id INTEGER REFERENCES {schema}.strokes,
    displacementx DOUBLE PRECISION,
    displacementy DOUBLE PRECISION,
    perpendicularoffset DOUBLE PRECISION
);

CREATE TABLE IF NOT EXISTS {schema}.texts (
    id SERIAL PRIMARY KEY,
    labelexpr TEXT,
    uom TEXT,
    font_id INTEGER REFERENCES {schema}.fonts,
    fill_id INTEGER REFERENCES {schema}.fills,
    rotation DOUBLE PRECISION,
    rotationexpr TEXT,
    displacementx DOUBLE PRECISION,
    displacementy DOUBLE PRECISION,
    anchorx DOUBLE PRECISION,
    anchory DOUBLE PRECISION,
    lineplacement_id INTEGER REFERENCES {schema}.lineplacements,
    halo_id INTEGER REFERENCES {schema}.halos
);

CREATE TABLE IF NOT EXISTS {schema}.styles (
    id SERIAL PRIMARY KEY,
    type VARCHAR(8),
    fk INTEGER,
    minscale DOUBLE PRECISION,
    maxscale DOUBLE PRECISION,
    sld TEXT,
    name TEXT
);
"#;

/// Styling tables in one schema of a PostgreSQL database.
pub struct PgStyleDatabase {
    pool: PgPool,
    schema: String,
}

impl PgStyleDatabase {
    /// Connect to `database_url`, reading tables from `schema`.
    pub async fn connect(database_url: &str, schema: impl Into<String>) -> WmsResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| WmsError::DatabaseError(format!("Connection failed: {}", e)))?;

        Ok(Self::from_pool(pool, schema))
    }

    pub fn from_pool(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    /// Create the styling tables if they do not exist.
    pub async fn migrate(&self) -> WmsResult<()> {
        let sql = SCHEMA_SQL.replace("{schema}", &self.schema);
        for statement in sql.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| WmsError::DatabaseError(format!("Migration failed: {}", e)))?;
            }
        }

        info!(schema = %self.schema, "Styling schema ready");
        Ok(())
    }

    async fn fetch<T>(&self, columns: &str, table: &str, id: i32) -> WmsResult<Option<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let sql = format!("SELECT {} FROM {}.{} WHERE id = $1", columns, self.schema, table);
        sqlx::query_as::<_, T>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| WmsError::DatabaseError(format!("Query failed: {}", e)))
    }
}

#[async_trait]
impl StyleDatabase for PgStyleDatabase {
    async fn style(&self, id: i32) -> WmsResult<Option<StyleRow>> {
        self.fetch("type, fk, minscale, maxscale, sld, name", "styles", id).await
    }

    async fn point(&self, id: i32) -> WmsResult<Option<PointRow>> {
        self.fetch("uom, graphic_id", "points", id).await
    }

    async fn line(&self, id: i32) -> WmsResult<Option<LineRow>> {
        self.fetch("uom, stroke_id, perpendicularoffset", "lines", id).await
    }

    async fn polygon(&self, id: i32) -> WmsResult<Option<PolygonRow>> {
        self.fetch(
            "uom, fill_id, stroke_id, displacementx, displacementy, perpendicularoffset",
            "polygons",
            id,
        )
        .await
    }

    async fn text(&self, id: i32) -> WmsResult<Option<TextRow>> {
        self.fetch(
            "labelexpr, uom, font_id, fill_id, rotation, rotationexpr, displacementx, displacementy, \
             anchorx, anchory, lineplacement_id, halo_id",
            "texts",
            id,
        )
        .await
    }

    async fn fill(&self, id: i32) -> WmsResult<Option<FillRow>> {
        self.fetch("color, graphic_id", "fills", id).await
    }

    async fn stroke(&self, id: i32) -> WmsResult<Option<StrokeRow>> {
        self.fetch(
            "color, width, widthexpr, linejoin, linecap, dasharray, dashoffset, stroke_graphic_id, \
             fill_graphic_id, strokegap, strokeinitialgap, positionpercentage",
            "strokes",
            id,
        )
        .await
    }

    async fn graphic(&self, id: i32) -> WmsResult<Option<GraphicRow>> {
        self.fetch(
            "size, sizeexpr, rotation, rotationexpr, anchorx, anchory, displacementx, displacementy, \
             wellknownname, svg, base64raster, fill_id, stroke_id",
            "graphics",
            id,
        )
        .await
    }

    async fn font(&self, id: i32) -> WmsResult<Option<FontRow>> {
        self.fetch("family, style, bold, size", "fonts", id).await
    }

    async fn halo(&self, id: i32) -> WmsResult<Option<HaloRow>> {
        self.fetch("fill_id, radius", "halos", id).await
    }

    async fn line_placement(&self, id: i32) -> WmsResult<Option<LinePlacementRow>> {
        self.fetch(
            "perpendicularoffset, repeat, initialgap, gap, isaligned, generalizeline",
            "lineplacements",
            id,
        )
        .await
    }
}
