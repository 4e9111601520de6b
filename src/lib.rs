//! Motor de imgscrub: elimina metadata identificable de imágenes JPEG, PNG y
//! WebP conservando el perfil de color, la orientación y la calidad visual.

pub mod batch;
pub mod config;
pub mod error;
pub mod formatting;
pub mod sanitizer;
pub mod ui;

pub use error::{BatchError, ConfigError, SanitizeError};
pub use sanitizer::{SanitizationOutcome, SanitizeOptions, sanitize_file};
