//! Errores tipados del motor de saneamiento y del recorrido por lotes.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Fallos posibles al sanear una imagen individual.
///
/// Todos se capturan en el límite de cada archivo; ninguno aborta un lote.
#[derive(Debug, Error)]
pub enum SanitizeError {
    #[error("No se pudo leer `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No se pudo decodificar la imagen: {reason}")]
    Decode { reason: String },

    #[error("Formato `{detected}` no soportado para limpieza de metadata")]
    UnsupportedFormat { detected: String },

    #[error("No se pudo codificar la imagen limpia como {format}: {reason}")]
    Encode { format: &'static str, reason: String },

    #[error("No se pudo escribir `{path}`: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("La verificación indicó que la metadata no se eliminó correctamente: {reason}")]
    Verification { reason: String },
}

impl SanitizeError {
    pub(crate) fn decode(reason: impl ToString) -> Self {
        Self::Decode {
            reason: reason.to_string(),
        }
    }

    pub(crate) fn encode(format: &'static str, reason: impl ToString) -> Self {
        Self::Encode {
            format,
            reason: reason.to_string(),
        }
    }

    /// Etiqueta estable de la taxonomía de errores, útil para resúmenes.
    pub fn kind(&self) -> &'static str {
        match self {
            SanitizeError::Read { .. } | SanitizeError::Decode { .. } => "DecodeError",
            SanitizeError::UnsupportedFormat { .. } => "UnsupportedFormatError",
            SanitizeError::Encode { .. } | SanitizeError::Write { .. } => "EncodeError",
            SanitizeError::Verification { .. } => "VerificationError",
        }
    }
}

/// Errores del recorrido de directorios.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("La ruta proporcionada no es un directorio: {0}")]
    NotADirectory(PathBuf),

    #[error("No se pudo recorrer {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Errores al cargar la configuración.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No se pudo leer el archivo de configuración `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Configuración inválida en `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("La lista de extensiones no puede estar vacía")]
    EmptyExtensions,
}
