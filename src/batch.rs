//! Limpieza por lotes de todas las imágenes bajo un directorio.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::ScanConfig;
use crate::error::BatchError;
use crate::sanitizer::{
    SanitizationOutcome, SanitizeOptions, SanitizeReport, SkipReason, sanitize_file,
};

/// Progreso de un lote, emitido en orden a medida que avanza.
#[derive(Clone, Debug, Serialize)]
pub enum BatchEvent {
    Started { total: usize },
    Processing { index: usize, total: usize, path: PathBuf },
    Sanitized { report: SanitizeReport },
    Skipped { path: PathBuf, reason: SkipReason },
    Failed { path: PathBuf, kind: &'static str, error: String },
    Finished { sanitized: usize, skipped: usize, failed: usize },
}

/// Resultado final de un archivo dentro del resumen.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchEntry {
    Sanitized(SanitizeReport),
    Skipped { path: PathBuf, reason: SkipReason },
    Failed { path: PathBuf, kind: &'static str, error: String },
}

impl BatchEntry {
    pub fn path(&self) -> &Path {
        match self {
            BatchEntry::Sanitized(report) => &report.path,
            BatchEntry::Skipped { path, .. } | BatchEntry::Failed { path, .. } => path,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct BatchSummary {
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub sanitized: usize,
    pub skipped: usize,
    pub failed: usize,
    pub entries: Vec<BatchEntry>,
}

impl BatchSummary {
    fn start() -> Self {
        let now = Local::now();
        Self {
            started_at: now,
            finished_at: now,
            sanitized: 0,
            skipped: 0,
            failed: 0,
            entries: Vec::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.sanitized + self.skipped + self.failed
    }

    fn record(&mut self, entry: BatchEntry) {
        match entry {
            BatchEntry::Sanitized(_) => self.sanitized += 1,
            BatchEntry::Skipped { .. } => self.skipped += 1,
            BatchEntry::Failed { .. } => self.failed += 1,
        }
        self.entries.push(entry);
    }
}

/// Recorre `root` recursivamente y devuelve, ordenados, los archivos con extensión aceptada.
pub fn collect_image_files(root: &Path, scan: &ScanConfig) -> Result<Vec<PathBuf>, BatchError> {
    if !root.is_dir() {
        return Err(BatchError::NotADirectory(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(scan.follow_symlinks) {
        let entry = entry.map_err(|source| BatchError::Walk {
            path: source
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| root.to_path_buf()),
            source,
        })?;

        if entry.file_type().is_file() && scan.matches(entry.path()) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    debug!(root = %root.display(), files = files.len(), "Imágenes candidatas encontradas");
    Ok(files)
}

/// Procesa los archivos uno a uno. Un fallo nunca detiene el lote.
///
/// Los envíos ignoran un receptor cerrado: el lote termina igual.
pub fn run_batch_with_sender(
    files: Vec<PathBuf>,
    options: &SanitizeOptions,
    sender: Sender<BatchEvent>,
) -> BatchSummary {
    let total = files.len();
    let _ = sender.send(BatchEvent::Started { total });

    let mut summary = BatchSummary::start();

    for (index, path) in files.into_iter().enumerate() {
        let _ = sender.send(BatchEvent::Processing {
            index: index + 1,
            total,
            path: path.clone(),
        });

        let entry = match sanitize_file(&path, options) {
            SanitizationOutcome::Sanitized(report) => {
                let _ = sender.send(BatchEvent::Sanitized {
                    report: report.clone(),
                });
                BatchEntry::Sanitized(report)
            }
            SanitizationOutcome::Skipped(reason) => {
                let _ = sender.send(BatchEvent::Skipped {
                    path: path.clone(),
                    reason: reason.clone(),
                });
                BatchEntry::Skipped { path, reason }
            }
            SanitizationOutcome::Failed(error) => {
                let kind = error.kind();
                let error = error.to_string();
                let _ = sender.send(BatchEvent::Failed {
                    path: path.clone(),
                    kind,
                    error: error.clone(),
                });
                BatchEntry::Failed { path, kind, error }
            }
        };
        summary.record(entry);
    }
    summary.finished_at = Local::now();

    let _ = sender.send(BatchEvent::Finished {
        sanitized: summary.sanitized,
        skipped: summary.skipped,
        failed: summary.failed,
    });
    info!(
        sanitized = summary.sanitized,
        skipped = summary.skipped,
        failed = summary.failed,
        "Lote terminado"
    );
    summary
}

/// Variante sin observador de progreso.
pub fn run_batch(files: Vec<PathBuf>, options: &SanitizeOptions) -> BatchSummary {
    let (sender, _) = mpsc::channel();
    run_batch_with_sender(files, options, sender)
}
