//! Configuración opcional en TOML para el recorrido y la limpieza.
//!
//! La lista de etiquetas sensibles y los parámetros de codificación no son
//! configurables; solo lo son el filtro de archivos y la verificación.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::sanitizer::SanitizeOptions;

/// Extensiones que el recorrido considera imágenes candidatas.
pub const DEFAULT_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "webp", "tiff", "bmp", "gif"];

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub scan: ScanConfig,
    pub sanitize: SanitizeConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    pub extensions: Vec<String>,
    pub follow_symlinks: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            follow_symlinks: false,
        }
    }
}

impl ScanConfig {
    /// Compara sin distinguir mayúsculas; acepta extensiones escritas con o sin punto.
    pub fn matches(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SanitizeConfig {
    pub verify_output: bool,
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        Self {
            verify_output: true,
        }
    }
}

impl From<&SanitizeConfig> for SanitizeOptions {
    fn from(config: &SanitizeConfig) -> Self {
        SanitizeOptions {
            verify_output: config.verify_output,
        }
    }
}

impl AppConfig {
    /// Sin ruta devuelve los valores por defecto.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents, path)
    }

    pub fn from_toml(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: PathBuf::from(origin),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let has_extension = self
            .scan
            .extensions
            .iter()
            .any(|e| !e.trim_start_matches('.').trim().is_empty());
        if !has_extension {
            return Err(ConfigError::EmptyExtensions);
        }
        Ok(())
    }

    pub fn sanitize_options(&self) -> SanitizeOptions {
        SanitizeOptions::from(&self.sanitize)
    }
}
