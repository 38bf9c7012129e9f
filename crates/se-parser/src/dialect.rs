//! XML dialects of the styling language.

use crate::xml::XmlElement;

pub const SE_NS: &str = "http://www.opengis.net/se";
pub const SLD_NS: &str = "http://www.opengis.net/sld";
pub const OGC_NS: &str = "http://www.opengis.net/ogc";
pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Symbology Encoding 1.1.0.
    Se,
    /// Styled Layer Descriptor 1.0.0.
    Sld,
}

impl Dialect {
    /// Pick the dialect from the namespace of the root element.
    ///
    /// SLD 1.1 documents wrap SE symbolizers, so only an element in the
    /// SLD namespace whose children are not SE elements is treated as SLD 1.0.
    pub fn detect(root: &XmlElement) -> Self {
        match root.namespace.as_deref() {
            Some(SE_NS) => Dialect::Se,
            Some(SLD_NS) => {
                if root.has_descendant_in(SE_NS) {
                    Dialect::Se
                } else {
                    Dialect::Sld
                }
            }
            _ if root.has_descendant_in(SE_NS) => Dialect::Se,
            _ => Dialect::Sld,
        }
    }
}
