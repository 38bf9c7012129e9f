//! Styles per layer, with reloading of monitored style files.
//!
//! Each layer maps to an immutable style map behind an `Arc`. Writers build a
//! new map and swap it in, so readers see either the old or the new map and
//! never a partially updated one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime};

use se_parser::{parse_sld_layers, parse_style_file, ParseError};
use style_common::{WmsError, WmsResult};
use symbology::Style;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Name under which a layer's default style is stored.
pub const DEFAULT_STYLE: &str = "default";

type StyleMap = HashMap<String, Arc<Style>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Style,
    Sld,
    Legend,
}

#[derive(Debug, Clone)]
struct Monitored {
    layer: String,
    path: PathBuf,
    kind: SourceKind,
    modified: Option<SystemTime>,
    /// The style last loaded from `path`.
    style: Option<Arc<Style>>,
}

impl Monitored {
    fn matches(&self, layer: &str, path: &Path, kind: SourceKind) -> bool {
        self.layer == layer && self.path == path && self.kind == kind
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn parse_error(path: &Path, e: ParseError) -> WmsError {
    WmsError::ConfigError(format!("Style file {} could not be parsed: {}", path.display(), e))
}

fn lock_error<T>(_: T) -> WmsError {
    WmsError::InternalError("Style registry lock poisoned".to_string())
}

/// Styles keyed by layer and style name.
#[derive(Debug, Default)]
pub struct StyleRegistry {
    styles: RwLock<HashMap<String, Arc<StyleMap>>>,
    legends: RwLock<HashMap<String, Arc<StyleMap>>>,
    monitored: Mutex<Vec<Monitored>>,
}

impl StyleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<F>(maps: &RwLock<HashMap<String, Arc<StyleMap>>>, layer: &str, f: F)
    where
        F: FnOnce(Option<&StyleMap>) -> StyleMap,
    {
        let mut guard = match maps.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let next = f(guard.get(layer).map(Arc::as_ref));
        guard.insert(layer.to_string(), Arc::new(next));
    }

    /// Swap `previous` for `style` under every key that refers to it.
    ///
    /// `style` becomes the default when `previous` was the default or the
    /// layer had no styles yet.
    fn replace(maps: &RwLock<HashMap<String, Arc<StyleMap>>>, layer: &str, previous: &Arc<Style>, style: Arc<Style>) {
        Self::update(maps, layer, |current| {
            let mut map = current.cloned().unwrap_or_default();
            let mut was_default = false;
            map.retain(|key, value| {
                let stale = Arc::ptr_eq(value, previous);
                was_default |= stale && key == DEFAULT_STYLE;
                !stale
            });
            if was_default || map.is_empty() {
                map.insert(DEFAULT_STYLE.to_string(), Arc::clone(&style));
            }
            let name = style.name.clone().unwrap_or_else(|| DEFAULT_STYLE.to_string());
            map.insert(name, style);
            map
        });
        debug!(layer, "Replaced reloaded style");
    }

    /// Register `style` for `layer` under its name.
    ///
    /// The first style of a layer also becomes its default. With `clear`,
    /// all previously registered styles of the layer are dropped and
    /// `style` becomes the default.
    pub fn put(&self, layer: &str, style: Arc<Style>, clear: bool) {
        Self::update(&self.styles, layer, |current| {
            let mut map = match current {
                Some(existing) if !clear => existing.clone(),
                _ => HashMap::new(),
            };
            if map.is_empty() {
                map.insert(DEFAULT_STYLE.to_string(), Arc::clone(&style));
            }
            let name = style.name.clone().unwrap_or_else(|| DEFAULT_STYLE.to_string());
            map.insert(name, style);
            map
        });
        debug!(layer, "Registered style");
    }

    /// Replace all styles of `layer` with `style` as the default.
    pub fn put_as_default(&self, layer: &str, style: Arc<Style>) {
        self.put(layer, style, true);
    }

    /// Register a style used only for legends.
    pub fn put_legend(&self, layer: &str, style: Arc<Style>) {
        Self::update(&self.legends, layer, |current| {
            let mut map = current.cloned().unwrap_or_default();
            let name = style.name.clone().unwrap_or_else(|| DEFAULT_STYLE.to_string());
            map.insert(DEFAULT_STYLE.to_string(), Arc::clone(&style));
            map.insert(name, style);
            map
        });
    }

    /// Look up a style; `None` or an empty name selects the default style.
    pub fn get(&self, layer: &str, name: Option<&str>) -> Option<Arc<Style>> {
        let name = name.filter(|n| !n.is_empty()).unwrap_or(DEFAULT_STYLE);
        self.layer_styles(layer)?.get(name).cloned()
    }

    /// The style map of `layer` as of now.
    pub fn layer_styles(&self, layer: &str) -> Option<Arc<StyleMap>> {
        let guard = self.styles.read().ok()?;
        guard.get(layer).cloned()
    }

    /// All distinct styles of `layer`.
    pub fn get_all(&self, layer: &str) -> Vec<Arc<Style>> {
        let Some(map) = self.layer_styles(layer) else {
            return Vec::new();
        };
        let mut out: Vec<Arc<Style>> = Vec::new();
        let mut names: Vec<&String> = map.keys().collect();
        names.sort();
        for name in names {
            let style = &map[name];
            if !out.iter().any(|s| Arc::ptr_eq(s, style)) {
                out.push(Arc::clone(style));
            }
        }
        out
    }

    /// Style names registered for `layer`, sorted.
    pub fn style_names(&self, layer: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .layer_styles(layer)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn has(&self, layer: &str, name: Option<&str>) -> bool {
        self.get(layer, name).is_some()
    }

    /// The legend style of `layer`, or its rendering style if none was registered.
    pub fn legend_style(&self, layer: &str, name: Option<&str>) -> Option<Arc<Style>> {
        let key = name.filter(|n| !n.is_empty()).unwrap_or(DEFAULT_STYLE);
        let legend = self
            .legends
            .read()
            .ok()
            .and_then(|guard| guard.get(layer).and_then(|m| m.get(key).cloned()));
        legend.or_else(|| self.get(layer, name))
    }

    fn monitored_style(&self, layer: &str, path: &Path, kind: SourceKind) -> Option<Arc<Style>> {
        let monitored = self.monitored.lock().ok()?;
        monitored
            .iter()
            .find(|m| m.matches(layer, path, kind))
            .and_then(|m| m.style.clone())
    }

    fn monitor(&self, layer: &str, path: &Path, kind: SourceKind, style: Option<Arc<Style>>) -> WmsResult<()> {
        let mut monitored = self.monitored.lock().map_err(lock_error)?;
        let entry = Monitored {
            layer: layer.to_string(),
            path: path.to_path_buf(),
            kind,
            modified: modified(path),
            style,
        };
        match monitored.iter_mut().find(|m| m.matches(layer, path, kind)) {
            Some(existing) => *existing = entry,
            None => monitored.push(entry),
        }
        Ok(())
    }

    /// Load a style document for `layer` and watch the file for changes.
    ///
    /// Loading the same file again replaces the style it produced before,
    /// including its place as the default.
    pub fn load(&self, layer: &str, path: &Path) -> WmsResult<Arc<Style>> {
        let style = Arc::new(parse_style_file(path).map_err(|e| parse_error(path, e))?);
        match self.monitored_style(layer, path, SourceKind::Style) {
            Some(previous) => Self::replace(&self.styles, layer, &previous, Arc::clone(&style)),
            None => self.put(layer, Arc::clone(&style), false),
        }
        self.monitor(layer, path, SourceKind::Style, Some(Arc::clone(&style)))?;
        info!(layer, path = %path.display(), "Loaded style");
        Ok(style)
    }

    /// Load a legend style for `layer` and watch the file for changes.
    pub fn load_legend(&self, layer: &str, path: &Path) -> WmsResult<Arc<Style>> {
        let style = Arc::new(parse_style_file(path).map_err(|e| parse_error(path, e))?);
        match self.monitored_style(layer, path, SourceKind::Legend) {
            Some(previous) => Self::replace(&self.legends, layer, &previous, Arc::clone(&style)),
            None => self.put_legend(layer, Arc::clone(&style)),
        }
        self.monitor(layer, path, SourceKind::Legend, Some(Arc::clone(&style)))?;
        Ok(style)
    }

    /// Load the styles of the named layer `layer` from an SLD document.
    ///
    /// All styles of that named layer replace the registered ones; the first
    /// (the one flagged as default, if any) becomes the default style. A
    /// document with a single layer is used whatever its name.
    pub fn load_sld(&self, layer: &str, path: &Path) -> WmsResult<usize> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| WmsError::ConfigError(format!("Failed to read {}: {}", path.display(), e)))?;
        let mut layers = parse_sld_layers(&text, path.parent()).map_err(|e| parse_error(path, e))?;

        let index = match layers.iter().position(|l| l.layer == layer) {
            Some(index) => index,
            None if layers.len() == 1 => 0,
            None => {
                return Err(WmsError::StyleNotDefined {
                    layer: layer.to_string(),
                    style: path.display().to_string(),
                })
            }
        };
        let named = layers.swap_remove(index);
        if !named.named_styles.is_empty() {
            debug!(layer, styles = ?named.named_styles, "Named style references are resolved through the registry");
        }

        let count = named.styles.len();
        for (i, style) in named.styles.into_iter().enumerate() {
            self.put(layer, Arc::new(style), i == 0);
        }
        self.monitor(layer, path, SourceKind::Sld, None)?;
        info!(layer, path = %path.display(), styles = count, "Loaded SLD styles");
        Ok(count)
    }

    /// Reload monitored files whose modification time changed.
    ///
    /// Returns the number of files reloaded. Files that fail to load keep
    /// their previous styles.
    pub fn check_for_updates(&self) -> usize {
        let stale: Vec<Monitored> = match self.monitored.lock() {
            Ok(monitored) => monitored
                .iter()
                .filter(|m| modified(&m.path) != m.modified)
                .cloned()
                .collect(),
            Err(_) => return 0,
        };

        let mut reloaded = 0;
        for entry in stale {
            let result = match entry.kind {
                SourceKind::Style => self.load(&entry.layer, &entry.path).map(|_| ()),
                SourceKind::Legend => self.load_legend(&entry.layer, &entry.path).map(|_| ()),
                SourceKind::Sld => self.load_sld(&entry.layer, &entry.path).map(|_| ()),
            };
            match result {
                Ok(()) => {
                    reloaded += 1;
                    info!(layer = %entry.layer, path = %entry.path.display(), "Reloaded changed style file");
                }
                Err(e) => {
                    warn!(error = %e, layer = %entry.layer, path = %entry.path.display(), "Changed style file could not be reloaded");
                    // Remember the new mtime so a broken file is not parsed on every tick.
                    if let Err(e) = self.monitor(&entry.layer, &entry.path, entry.kind, entry.style.clone()) {
                        warn!(error = %e, path = %entry.path.display(), "Style file could not be monitored");
                    }
                }
            }
        }
        reloaded
    }

    /// Poll monitored files every `interval` until the handle is aborted.
    pub fn spawn_watcher(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            info!(interval_ms = interval.as_millis() as u64, "Style file watcher started");
            loop {
                ticker.tick().await;
                registry.check_for_updates();
            }
        })
    }
}
