//! Layer tree configuration loader.
//!
//! Loads the layer tree from a YAML file. Style and SLD paths are resolved
//! against the styles directory, which itself is relative to the config file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use style_common::{WmsError, WmsResult};
use tracing::info;

use crate::layer::{OptionOverrides, ScaleConfig};

/// Where a configured layer gets its data from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerSource {
    FeatureStore(String),
    CoverageStore(String),
    None,
}

/// One configured layer with its nested layers.
#[derive(Debug, Clone)]
pub struct LayerConfig {
    pub name: Option<String>,
    pub title: Option<String>,
    pub source: LayerSource,
    /// Style document registered for this layer.
    pub style_file: Option<PathBuf>,
    /// SLD document with named layers, the one matching this layer is used.
    pub sld_file: Option<PathBuf>,
    /// Style used for legends instead of the rendering style.
    pub legend_style_file: Option<PathBuf>,
    pub scale: ScaleConfig,
    pub queryable: bool,
    pub options: OptionOverrides,
    pub layers: Vec<LayerConfig>,
}

/// The whole service configuration; the top level is the root layer.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub root: LayerConfig,
    pub styles_dir: PathBuf,
    /// How often monitored style files are checked, `None` disables polling.
    pub reload_interval: Option<Duration>,
}

impl ServiceConfig {
    /// Load a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> WmsResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| WmsError::ConfigError(format!("Failed to read {}: {}", path.display(), e)))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let config = Self::from_yaml_str(&contents, base)?;
        info!(
            path = %path.display(),
            styles_dir = %config.styles_dir.display(),
            "Loaded layer configuration"
        );
        Ok(config)
    }

    /// Parse a configuration document; relative paths are resolved against `base`.
    pub fn from_yaml_str(contents: &str, base: &Path) -> WmsResult<Self> {
        let yaml: YamlServiceFile = serde_yaml::from_str(contents)
            .map_err(|e| WmsError::ConfigError(format!("Failed to parse layer configuration: {}", e)))?;

        let styles_dir = match yaml.styles_dir {
            Some(dir) => base.join(dir),
            None => base.to_path_buf(),
        };
        let reload_interval = match yaml.reload_interval_secs.unwrap_or(1) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let root = LayerConfig {
            name: yaml.name,
            title: yaml.title,
            source: LayerSource::None,
            style_file: None,
            sld_file: None,
            legend_style_file: None,
            scale: yaml.scale.into_config(),
            queryable: yaml.queryable,
            options: yaml.options.into_overrides(),
            layers: yaml.layers.into_iter().map(|l| l.into_config(&styles_dir)).collect(),
        };

        Ok(Self {
            root,
            styles_dir,
            reload_interval,
        })
    }
}

// ============================================================================
// YAML Parsing Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct YamlServiceFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    styles_dir: Option<String>,
    #[serde(default)]
    reload_interval_secs: Option<u64>,
    #[serde(flatten)]
    scale: YamlScale,
    #[serde(default)]
    queryable: bool,
    #[serde(default)]
    options: YamlOptions,
    #[serde(default)]
    layers: Vec<YamlLayer>,
}

#[derive(Debug, Deserialize)]
struct YamlLayer {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    feature_store: Option<String>,
    #[serde(default)]
    coverage_store: Option<String>,
    #[serde(default)]
    style_file: Option<String>,
    #[serde(default)]
    sld_file: Option<String>,
    #[serde(default)]
    legend_style_file: Option<String>,
    #[serde(flatten)]
    scale: YamlScale,
    #[serde(default)]
    queryable: bool,
    #[serde(default)]
    options: YamlOptions,
    #[serde(default)]
    layers: Vec<YamlLayer>,
}

#[derive(Debug, Default, Deserialize)]
struct YamlScale {
    #[serde(default)]
    scale_denominators: Option<YamlScaleDenominators>,
    #[serde(default)]
    scale_until: Option<f64>,
    #[serde(default)]
    scale_above: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct YamlScaleDenominators {
    min: f64,
    max: f64,
}

#[derive(Debug, Default, Deserialize)]
struct YamlOptions {
    #[serde(default)]
    antialias: Option<String>,
    #[serde(default)]
    quality: Option<String>,
    #[serde(default)]
    interpolation: Option<String>,
    #[serde(default)]
    max_features: Option<i64>,
    #[serde(default)]
    feature_info_radius: Option<u32>,
}

impl YamlScale {
    fn into_config(self) -> ScaleConfig {
        ScaleConfig {
            denominators: self.scale_denominators.map(|d| (d.min, d.max)),
            until: self.scale_until,
            above: self.scale_above,
        }
    }
}

impl YamlOptions {
    fn into_overrides(self) -> OptionOverrides {
        OptionOverrides {
            antialias: self.antialias,
            quality: self.quality,
            interpolation: self.interpolation,
            max_features: self.max_features,
            feature_info_radius: self.feature_info_radius,
        }
    }
}

impl YamlLayer {
    fn into_config(self, styles_dir: &Path) -> LayerConfig {
        let source = match (self.feature_store, self.coverage_store) {
            (Some(store), _) => LayerSource::FeatureStore(store),
            (None, Some(store)) => LayerSource::CoverageStore(store),
            (None, None) => LayerSource::None,
        };
        LayerConfig {
            name: self.name,
            title: self.title,
            source,
            style_file: self.style_file.map(|f| styles_dir.join(f)),
            sld_file: self.sld_file.map(|f| styles_dir.join(f)),
            legend_style_file: self.legend_style_file.map(|f| styles_dir.join(f)),
            scale: self.scale.into_config(),
            queryable: self.queryable,
            options: self.options.into_overrides(),
            layers: self.layers.into_iter().map(|l| l.into_config(styles_dir)).collect(),
        }
    }
}
