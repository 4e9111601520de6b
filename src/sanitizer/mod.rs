//! Limpieza de metadata identificable de una imagen individual.
//!
//! Flujo por archivo: carga, omisión de animadas, clasificación de etiquetas,
//! reconstrucción de la metadata mínima y reescritura en el formato original.

pub mod classifier;
pub mod container;
pub mod format;
pub mod loader;
pub mod rebuild;
pub mod serializer;
pub mod tags;
pub mod verify;

pub use classifier::{Redaction, SENSITIVE_TAGS, classify_tags, is_sensitive};
pub use format::{EncodeProfile, ImageKind};
pub use loader::{ColorProfile, FrameSet, ImageDocument, load_document};
pub use rebuild::{CleanMetadata, rebuild_metadata};
pub use serializer::{encode_document, write_sanitized};
pub use tags::{TagGroup, TagId, TagTable};

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::SanitizeError;
use container::AncillaryEntry;
use verify::Expectation;

/// Opciones de una operación de limpieza.
#[derive(Clone, Copy, Debug)]
pub struct SanitizeOptions {
    /// Relee la salida antes de reemplazar el original.
    pub verify_output: bool,
}

impl Default for SanitizeOptions {
    fn default() -> Self {
        Self {
            verify_output: true,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Animaciones y TIFF de varias páginas.
    Animated { frames: usize },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Animated { frames } => write!(f, "imagen de varios cuadros o páginas (al menos {})", frames),
        }
    }
}

/// Resumen de lo que se retiró y lo que se conservó en un archivo saneado.
#[derive(Clone, Debug, Serialize)]
pub struct SanitizeReport {
    pub path: PathBuf,
    pub kind: ImageKind,
    pub removed_tags: Vec<String>,
    pub retained_tags: usize,
    pub discarded_ancillary: Vec<AncillaryEntry>,
    pub color_profile_kept: bool,
}

/// Estado terminal de un archivo. Nunca se reintenta.
#[derive(Debug)]
pub enum SanitizationOutcome {
    Sanitized(SanitizeReport),
    Skipped(SkipReason),
    Failed(SanitizeError),
}

impl SanitizationOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, SanitizationOutcome::Failed(_))
    }
}

/// Sanea un archivo en su lugar. Cualquier fallo queda contenido en el resultado.
pub fn sanitize_file(path: &Path, options: &SanitizeOptions) -> SanitizationOutcome {
    match run_pipeline(path, options) {
        Ok(SanitizationOutcome::Skipped(reason)) => {
            info!(path = %path.display(), %reason, "Archivo omitido");
            SanitizationOutcome::Skipped(reason)
        }
        Ok(outcome) => {
            if let SanitizationOutcome::Sanitized(report) = &outcome {
                info!(
                    path = %path.display(),
                    kind = %report.kind,
                    removed = report.removed_tags.len(),
                    retained = report.retained_tags,
                    ancillary = report.discarded_ancillary.len(),
                    icc = report.color_profile_kept,
                    "Metadata eliminada"
                );
            }
            outcome
        }
        Err(error) => {
            warn!(path = %path.display(), kind = error.kind(), %error, "No se pudo sanear el archivo");
            SanitizationOutcome::Failed(error)
        }
    }
}

fn run_pipeline(path: &Path, options: &SanitizeOptions) -> Result<SanitizationOutcome, SanitizeError> {
    let document = load_document(path)?;

    let pixels = match document.frames {
        FrameSet::Animated { frames } => {
            return Ok(SanitizationOutcome::Skipped(SkipReason::Animated { frames }));
        }
        FrameSet::Still(pixels) => pixels,
    };

    if EncodeProfile::for_kind(&document.kind).is_none() {
        return Err(SanitizeError::UnsupportedFormat {
            detected: document.kind.label().to_string(),
        });
    }

    let redaction = classify_tags(document.tags);
    let removed_tags = redaction.removed.iter().map(ToString::to_string).collect();
    let clean = rebuild_metadata(redaction, document.color_profile);

    let bytes = encode_document(&pixels, &document.kind, &clean)?;
    drop(pixels);

    let expectation = options.verify_output.then(|| Expectation {
        kind: document.kind.clone(),
        color_profile: clean.color_profile.clone(),
    });
    write_sanitized(path, &bytes, expectation.as_ref())?;

    Ok(SanitizationOutcome::Sanitized(SanitizeReport {
        path: document.path,
        kind: document.kind,
        removed_tags,
        retained_tags: clean.tags.len(),
        discarded_ancillary: document.ancillary.entries,
        color_profile_kept: clean.color_profile.is_some(),
    }))
}
