use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, RwLock};

use crate::framebuffer::RowAddressing;
use crate::normalize::Normalization;
use crate::scalar::ScalarMode;
use crate::sweep::DEFAULT_PARALLEL_THRESHOLD;
use crate::types::{BackgroundColor, Palette, Rgb};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "tensorviz";

/// Default color policy for the argmax renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArgmaxStyle {
    #[default]
    Palette,
    Gradient,
    ClassGray,
}

impl std::str::FromStr for ArgmaxStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "palette" => Ok(Self::Palette),
            "gradient" => Ok(Self::Gradient),
            "class-gray" | "class_gray" => Ok(Self::ClassGray),
            other => Err(format!(
                "unknown argmax style {other:?}, expected palette, gradient or class-gray"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    /// Background for alpha compositing, as RRGGBB hex
    #[serde(default = "default_background")]
    pub background: String,

    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,

    #[serde(default)]
    pub row_addressing: RowAddressing,

    #[serde(default)]
    pub argmax_style: ArgmaxStyle,

    #[serde(default)]
    pub scalar_mode: ScalarMode,

    /// Overrides the built-in segmentation palette when non-empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub palette: Vec<Rgb>,

    #[serde(default)]
    pub normalization: Normalization,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> PathBuf {
    PathBuf::from("tensorviz.log")
}

fn default_background() -> String {
    BackgroundColor::WHITE.to_string()
}

fn default_parallel_threshold() -> usize {
    DEFAULT_PARALLEL_THRESHOLD
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            log_level: default_log_level(),
            log_file: default_log_file(),
            background: default_background(),
            parallel_threshold: default_parallel_threshold(),
            row_addressing: RowAddressing::default(),
            argmax_style: ArgmaxStyle::default(),
            scalar_mode: ScalarMode::default(),
            palette: Vec::new(),
            normalization: Normalization::default(),
        }
    }
}

static SETTINGS: LazyLock<RwLock<Settings>> = LazyLock::new(|| RwLock::new(Settings::default()));

pub fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Problems found while loading settings. Loading never aborts: on any of
/// these the in-memory settings stay usable and the caller decides how to
/// report them.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse settings file {path:?}: {source}; using defaults")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Failed to write settings file {path:?}: {detail}")]
    Write { path: PathBuf, detail: String },

    #[error("Unknown log level {0:?}, falling back to info")]
    LogLevel(String),
}

/// Loads settings from `path`, or from the per-user config location. A
/// missing file is created with defaults. Failures leave the defaults (or the
/// parsed file) in place and are returned for the caller to log, since this
/// runs before a logger exists.
pub fn load_settings(path: Option<&Path>) -> Result<(), SettingsError> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let Some(path) = preferred_config_path() else {
                return Ok(());
            };
            path
        }
    };

    if path.exists() {
        load_settings_from_path(&path)
    } else {
        let settings = snapshot();
        save_settings_to_file(&settings, &path)?;
        info!("Created settings file with defaults at {path:?}");
        Ok(())
    }
}

fn load_settings_from_path(path: &Path) -> Result<(), SettingsError> {
    let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut settings =
        serde_yaml::from_str::<Settings>(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    debug!("Loaded settings from {path:?}");

    let migrated = settings.version < CURRENT_VERSION;
    if migrated {
        migrate_settings(&mut settings);
    }
    if let Ok(mut global) = SETTINGS.write() {
        *global = settings.clone();
    }
    if migrated {
        save_settings_to_file(&settings, path)?;
    }
    Ok(())
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );
    settings.version = CURRENT_VERSION;
}

fn save_settings_to_file(settings: &Settings, path: &Path) -> Result<(), SettingsError> {
    let write_error = |detail: String| SettingsError::Write {
        path: path.to_path_buf(),
        detail,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| write_error(e.to_string()))?;
        }
    }

    let body = serde_yaml::to_string(settings).map_err(|e| write_error(e.to_string()))?;
    fs::write(path, format!("{SETTINGS_HEADER}{body}")).map_err(|e| write_error(e.to_string()))?;
    debug!("Saved settings to {path:?}");
    Ok(())
}

const SETTINGS_HEADER: &str = r#"# ============================================================================
# tensorviz settings
# ============================================================================
# background:          RRGGBB hex used under translucent pixels
# parallel_threshold:  frames with at least this many pixels use all cores
# row_addressing:      stride | packed (packed ignores bitmap row padding)
# argmax_style:        palette | gradient | class_gray
# scalar_mode:         grayscale | gradient
# palette:             optional list of [r, g, b]; replaces the 40-class default
#   palette:
#     - [255, 0, 0]
#     - [0, 255, 0]

"#;

// Public API for reading settings

pub fn snapshot() -> Settings {
    SETTINGS
        .read()
        .map(|s| s.clone())
        .unwrap_or_default()
}

/// Configured log level. An unrecognized name is returned as an error so it
/// can be reported once logging is up.
pub fn get_log_level() -> Result<log::LevelFilter, SettingsError> {
    let level = SETTINGS
        .read()
        .map(|s| s.log_level.clone())
        .unwrap_or_else(|_| default_log_level());
    level.parse().map_err(|_| SettingsError::LogLevel(level))
}

pub fn get_log_file() -> PathBuf {
    SETTINGS
        .read()
        .map(|s| s.log_file.clone())
        .unwrap_or_else(|_| default_log_file())
}

pub fn get_background() -> BackgroundColor {
    let raw = SETTINGS
        .read()
        .map(|s| s.background.clone())
        .unwrap_or_else(|_| default_background());
    raw.parse().unwrap_or_else(|e| {
        warn!("{e}; using white");
        BackgroundColor::WHITE
    })
}

pub fn get_parallel_threshold() -> usize {
    SETTINGS
        .read()
        .map(|s| s.parallel_threshold)
        .unwrap_or_else(|_| default_parallel_threshold())
}

pub fn get_row_addressing() -> RowAddressing {
    SETTINGS
        .read()
        .map(|s| s.row_addressing)
        .unwrap_or_default()
}

pub fn get_argmax_style() -> ArgmaxStyle {
    SETTINGS
        .read()
        .map(|s| s.argmax_style)
        .unwrap_or_default()
}

pub fn get_scalar_mode() -> ScalarMode {
    SETTINGS.read().map(|s| s.scalar_mode).unwrap_or_default()
}

/// Configured palette, or the 40-class segmentation palette
pub fn get_palette() -> Palette {
    SETTINGS
        .read()
        .ok()
        .filter(|s| !s.palette.is_empty())
        .map(|s| Palette::new(s.palette.clone()))
        .unwrap_or_else(Palette::segmentation)
}

pub fn get_normalization() -> Normalization {
    SETTINGS
        .read()
        .map(|s| s.normalization)
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) fn reset_to_defaults() {
    if let Ok(mut settings) = SETTINGS.write() {
        *settings = Settings::default();
    }
}
