//! Loading of external graphics and fonts, with a bounded cache for
//! URLs that are evaluated per feature.

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use base64::Engine;
use lru::LruCache;
use symbology::{ImageResource, ResourceError, SvgResource};
use thiserror::Error;
use tracing::{debug, warn};

/// Maximum number of evaluated graphic URLs kept in memory.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum ResourceLoadError {
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported resource location: {0}")]
    Unsupported(String),

    #[error("Invalid base64 content: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error(transparent)]
    Decode(#[from] ResourceError),
}

/// Fetches the bytes behind an `xlink:href`.
pub trait ResourceLoader: Send + Sync {
    fn load(&self, href: &str) -> Result<Vec<u8>, ResourceLoadError>;
}

/// Loads local files, resolving relative references against a base directory.
#[derive(Debug, Clone, Default)]
pub struct FileLoader {
    base: Option<PathBuf>,
}

impl FileLoader {
    pub fn new(base: Option<PathBuf>) -> Self {
        Self { base }
    }

    fn resolve(&self, href: &str) -> Result<PathBuf, ResourceLoadError> {
        let href = href.trim();
        let path = if let Some(rest) = href.strip_prefix("file://") {
            PathBuf::from(rest)
        } else if let Some(rest) = href.strip_prefix("file:") {
            PathBuf::from(rest)
        } else if href.contains("://") {
            return Err(ResourceLoadError::Unsupported(href.to_string()));
        } else {
            PathBuf::from(href)
        };
        Ok(match &self.base {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        })
    }
}

impl ResourceLoader for FileLoader {
    fn load(&self, href: &str) -> Result<Vec<u8>, ResourceLoadError> {
        let path = self.resolve(href)?;
        fs::read(&path).map_err(|source| ResourceLoadError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

/// A decoded external graphic.
#[derive(Debug, Clone, PartialEq)]
pub enum ExternalImage {
    Raster(Arc<ImageResource>),
    Svg(Arc<SvgResource>),
}

/// Whether a format or location names an SVG document.
pub fn is_svg(format: Option<&str>, location: &str) -> bool {
    format.is_some_and(|f| f.to_lowercase().contains("svg"))
        || location.to_lowercase().ends_with(".svg")
}

/// Decode graphic bytes as SVG or raster image.
pub fn decode_image(
    location: &str,
    format: Option<&str>,
    data: &[u8],
) -> Result<ExternalImage, ResourceLoadError> {
    if is_svg(format, location) {
        let text = String::from_utf8_lossy(data);
        Ok(ExternalImage::Svg(Arc::new(SvgResource::parse(location, &text)?)))
    } else {
        Ok(ExternalImage::Raster(Arc::new(ImageResource::parse(location, data)?)))
    }
}

/// Decode base64 `InlineContent`.
pub fn decode_base64(text: &str) -> Result<Vec<u8>, ResourceLoadError> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(base64::engine::general_purpose::STANDARD.decode(compact)?)
}

/// Shared loader plus a bounded cache of decoded graphics keyed by their location.
///
/// Lookups do not refresh entries, so the oldest inserted entry is evicted first.
/// Failed loads are cached too so a broken URL is not retried for every feature.
pub struct GraphicCache {
    loader: Arc<dyn ResourceLoader>,
    entries: Mutex<LruCache<String, Option<ExternalImage>>>,
}

impl GraphicCache {
    pub fn new(loader: Arc<dyn ResourceLoader>) -> Self {
        Self::with_capacity(loader, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(loader: Arc<dyn ResourceLoader>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            loader,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// A cache over local files relative to `base`.
    pub fn for_directory(base: Option<&Path>) -> Self {
        Self::new(Arc::new(FileLoader::new(base.map(Path::to_path_buf))))
    }

    pub fn loader(&self) -> &Arc<dyn ResourceLoader> {
        &self.loader
    }

    /// Fetch raw bytes without caching.
    pub fn load_bytes(&self, href: &str) -> Result<Vec<u8>, ResourceLoadError> {
        self.loader.load(href)
    }

    /// Get the graphic behind `location`, loading and decoding it on a miss.
    pub fn get(&self, location: &str, format: Option<&str>) -> Option<ExternalImage> {
        {
            let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(hit) = entries.peek(location) {
                return hit.clone();
            }
        }

        debug!(location = %location, "Loading external graphic");
        let loaded = self
            .loader
            .load(location)
            .and_then(|data| decode_image(location, format, &data));
        let entry = match loaded {
            Ok(image) => Some(image),
            Err(e) => {
                warn!(error = %e, location = %location, "External graphic could not be loaded");
                None
            }
        };

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.put(location.to_string(), entry.clone());
        entry
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, location: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(location)
    }
}

impl Default for GraphicCache {
    fn default() -> Self {
        Self::new(Arc::new(FileLoader::default()))
    }
}

impl std::fmt::Debug for GraphicCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicCache").field("len", &self.len()).finish()
    }
}
