//! Detección del formato contenedor y parámetros de codificación por formato.

use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Formatos contenedores que el motor reconoce.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub enum ImageKind {
    Jpeg,
    Png,
    WebP,
    /// Formato detectado pero sin soporte de reescritura (GIF, TIFF, BMP...).
    Other(String),
}

impl ImageKind {
    /// Identifica el formato a partir de los primeros bytes del archivo.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        let kind = infer::get(bytes)?;
        Some(match kind.mime_type() {
            "image/jpeg" => ImageKind::Jpeg,
            "image/png" => ImageKind::Png,
            "image/webp" => ImageKind::WebP,
            other => ImageKind::Other(other.to_string()),
        })
    }

    /// Deduce el formato a partir de la extensión, solo para los formatos reescribibles.
    pub fn from_extension(path: &Path) -> Option<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "jpg" | "jpeg" => Some(ImageKind::Jpeg),
            "png" => Some(ImageKind::Png),
            "webp" => Some(ImageKind::WebP),
            _ => None,
        }
    }

    /// Contenido primero; la extensión solo decide cuando el contenido no identifica nada.
    pub fn resolve(bytes: &[u8], path: &Path) -> Self {
        if let Some(kind) = Self::detect(bytes) {
            return kind;
        }

        Self::from_extension(path).unwrap_or_else(|| {
            let extension = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| format!(".{}", e.to_lowercase()))
                .unwrap_or_else(|| "sin extensión".to_string());
            ImageKind::Other(extension)
        })
    }

    pub fn label(&self) -> &str {
        match self {
            ImageKind::Jpeg => "JPEG",
            ImageKind::Png => "PNG",
            ImageKind::WebP => "WEBP",
            ImageKind::Other(detected) => detected,
        }
    }

    pub fn image_format(&self) -> Option<image::ImageFormat> {
        match self {
            ImageKind::Jpeg => Some(image::ImageFormat::Jpeg),
            ImageKind::Png => Some(image::ImageFormat::Png),
            ImageKind::WebP => Some(image::ImageFormat::WebP),
            ImageKind::Other(_) => None,
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Parámetros de reescritura elegidos para no introducir pérdida visible.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EncodeProfile {
    pub format: &'static str,
    /// Calidad 1-100; solo aplica a códecs con pérdida.
    pub quality: u8,
    pub chroma_subsampling: bool,
    /// Recompresión sin pérdida orientada a tamaño.
    pub optimize: bool,
    pub lossless: bool,
    pub attach_icc: bool,
}

pub const JPEG_PROFILE: EncodeProfile = EncodeProfile {
    format: "JPEG",
    quality: 100,
    chroma_subsampling: false,
    optimize: false,
    lossless: false,
    attach_icc: true,
};

pub const PNG_PROFILE: EncodeProfile = EncodeProfile {
    format: "PNG",
    quality: 100,
    chroma_subsampling: false,
    optimize: true,
    lossless: true,
    attach_icc: true,
};

// El codificador WebP disponible solo ofrece modo sin pérdida, que supera a calidad 100 con pérdida.
pub const WEBP_PROFILE: EncodeProfile = EncodeProfile {
    format: "WEBP",
    quality: 100,
    chroma_subsampling: false,
    optimize: false,
    lossless: true,
    attach_icc: true,
};

impl EncodeProfile {
    pub fn for_kind(kind: &ImageKind) -> Option<&'static EncodeProfile> {
        match kind {
            ImageKind::Jpeg => Some(&JPEG_PROFILE),
            ImageKind::Png => Some(&PNG_PROFILE),
            ImageKind::WebP => Some(&WEBP_PROFILE),
            ImageKind::Other(_) => None,
        }
    }
}
