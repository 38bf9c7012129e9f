//! Symbology Encoding parsing.
//!
//! Reads SE 1.1.0 and SLD 1.0.0 documents, or rows of a relational styling
//! schema, into [`symbology::Style`] graphs. Both XML dialects produce the
//! same internal representation.

pub mod error;
pub mod filter;
pub mod relational;
pub mod resources;
pub mod xml;

mod dialect;
mod graphic;
mod raster;
mod sld;
mod style;
mod symbolizers;
mod values;

pub use dialect::{Dialect, SE_NS, SLD_NS, XLINK_NS};
pub use error::{ParseError, ParseResult};
pub use resources::{ExternalImage, FileLoader, GraphicCache, ResourceLoadError, ResourceLoader};
pub use sld::NamedLayerStyles;
pub use style::{parse_sld_layers, parse_style, parse_style_file, ParsedStyle, SymbologyParser};
pub use xml::XmlElement;
