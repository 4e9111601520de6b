//! Recodificación por formato y escritura atómica sobre la ruta original.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ImageEncoder};
use std::borrow::Cow;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

use super::format::{EncodeProfile, ImageKind};
use super::loader::ColorProfile;
use super::rebuild::CleanMetadata;
use super::verify::{self, Expectation};
use crate::error::SanitizeError;

const ICC_RGB: &[u8; 4] = b"RGB ";
const ICC_GRAY: &[u8; 4] = b"GRAY";

/// Codifica los píxeles en el formato original y adjunta la metadata reconstruida.
///
/// La tabla de etiquetas se adjunta siempre, aunque esté vacía.
pub fn encode_document(
    pixels: &DynamicImage,
    kind: &ImageKind,
    metadata: &CleanMetadata,
) -> Result<Vec<u8>, SanitizeError> {
    let profile = EncodeProfile::for_kind(kind).ok_or_else(|| SanitizeError::UnsupportedFormat {
        detected: kind.label().to_string(),
    })?;

    let color_profile = metadata.color_profile.as_ref().filter(|_| profile.attach_icc);
    if let Some(color_profile) = color_profile {
        // WebP siempre almacena color; JPEG y PNG conservan la escala de grises.
        let output_has_color = *kind == ImageKind::WebP || pixels.color().has_color();
        ensure_profile_matches(kind, color_profile, output_has_color)?;
    }

    let exif = metadata
        .tags
        .to_tiff_bytes()
        .map_err(|e| SanitizeError::encode(profile.format, format!("tabla EXIF: {}", e)))?;
    let icc = color_profile.map(ColorProfile::as_bytes);

    debug!(
        format = profile.format,
        quality = profile.quality,
        chroma_subsampling = profile.chroma_subsampling,
        optimize = profile.optimize,
        exif_bytes = exif.len(),
        icc_bytes = icc.map(<[u8]>::len).unwrap_or(0),
        "Codificando imagen limpia"
    );

    match kind {
        ImageKind::Jpeg => encode_jpeg(pixels, profile, &exif, icc),
        ImageKind::Png => encode_png(pixels, profile, &exif, icc),
        ImageKind::WebP => encode_webp(pixels, profile, &exif, icc),
        ImageKind::Other(detected) => Err(SanitizeError::UnsupportedFormat {
            detected: detected.clone(),
        }),
    }
}

/// Un perfil cuya cabecera declara otro modelo de color (p. ej. CMYK sobre
/// píxeles RGB) no puede reutilizarse tal cual: el archivo se deja intacto.
fn ensure_profile_matches(
    kind: &ImageKind,
    color_profile: &ColorProfile,
    output_has_color: bool,
) -> Result<(), SanitizeError> {
    let Some(space) = color_profile.color_space() else {
        return Ok(());
    };
    let expected = if output_has_color { ICC_RGB } else { ICC_GRAY };
    if &space == expected {
        return Ok(());
    }

    Err(SanitizeError::UnsupportedFormat {
        detected: format!(
            "{} con perfil ICC {} sobre píxeles {}",
            kind.label(),
            String::from_utf8_lossy(&space).trim_end(),
            String::from_utf8_lossy(expected).trim_end()
        ),
    })
}

fn encode_jpeg(
    pixels: &DynamicImage,
    profile: &EncodeProfile,
    exif: &[u8],
    icc: Option<&[u8]>,
) -> Result<Vec<u8>, SanitizeError> {
    let pixels: Cow<'_, DynamicImage> = match pixels {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => Cow::Borrowed(pixels),
        DynamicImage::ImageLuma16(_) => Cow::Owned(DynamicImage::ImageLuma8(pixels.to_luma8())),
        other => Cow::Owned(DynamicImage::ImageRgb8(other.to_rgb8())),
    };

    // El codificador de `image` usa muestreo 1x1 en todos los componentes (4:4:4).
    let mut encoded = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut encoded, profile.quality);
    encoder
        .set_exif_metadata(exif.to_vec())
        .map_err(|e| SanitizeError::encode(profile.format, e))?;
    if let Some(icc) = icc {
        encoder
            .set_icc_profile(icc.to_vec())
            .map_err(|e| SanitizeError::encode(profile.format, e))?;
    }
    encoder
        .write_image(
            pixels.as_bytes(),
            pixels.width(),
            pixels.height(),
            pixels.color().into(),
        )
        .map_err(|e| SanitizeError::encode(profile.format, e))?;

    Ok(encoded)
}

fn encode_png(
    pixels: &DynamicImage,
    profile: &EncodeProfile,
    exif: &[u8],
    icc: Option<&[u8]>,
) -> Result<Vec<u8>, SanitizeError> {
    let (color_type, bit_depth, data) = png_layout(pixels);

    let mut info = png::Info::with_size(pixels.width(), pixels.height());
    info.color_type = color_type;
    info.bit_depth = bit_depth;
    info.icc_profile = icc.map(|p| Cow::Owned(p.to_vec()));
    info.exif_metadata = Some(Cow::Owned(exif.to_vec()));

    let mut output = Vec::new();
    {
        let mut encoder = png::Encoder::with_info(&mut output, info)
            .map_err(|e| SanitizeError::encode(profile.format, e))?;
        encoder.set_compression(if profile.optimize {
            png::Compression::High
        } else {
            png::Compression::Balanced
        });

        let mut writer = encoder
            .write_header()
            .map_err(|e| SanitizeError::encode(profile.format, e))?;
        writer
            .write_image_data(&data)
            .map_err(|e| SanitizeError::encode(profile.format, e))?;
        writer
            .finish()
            .map_err(|e| SanitizeError::encode(profile.format, e))?;
    }

    Ok(output)
}

/// Distribución de muestras que espera el codificador PNG (16 bits en big-endian).
fn png_layout(pixels: &DynamicImage) -> (png::ColorType, png::BitDepth, Vec<u8>) {
    use png::{BitDepth, ColorType};

    match pixels {
        DynamicImage::ImageLuma8(img) => (ColorType::Grayscale, BitDepth::Eight, img.as_raw().clone()),
        DynamicImage::ImageLumaA8(img) => {
            (ColorType::GrayscaleAlpha, BitDepth::Eight, img.as_raw().clone())
        }
        DynamicImage::ImageRgb8(img) => (ColorType::Rgb, BitDepth::Eight, img.as_raw().clone()),
        DynamicImage::ImageRgba8(img) => (ColorType::Rgba, BitDepth::Eight, img.as_raw().clone()),
        DynamicImage::ImageLuma16(img) => {
            (ColorType::Grayscale, BitDepth::Sixteen, big_endian(img.as_raw()))
        }
        DynamicImage::ImageLumaA16(img) => {
            (ColorType::GrayscaleAlpha, BitDepth::Sixteen, big_endian(img.as_raw()))
        }
        DynamicImage::ImageRgb16(img) => (ColorType::Rgb, BitDepth::Sixteen, big_endian(img.as_raw())),
        DynamicImage::ImageRgba16(img) => {
            (ColorType::Rgba, BitDepth::Sixteen, big_endian(img.as_raw()))
        }
        other => (
            ColorType::Rgba,
            BitDepth::Sixteen,
            big_endian(other.to_rgba16().as_raw()),
        ),
    }
}

fn big_endian(samples: &[u16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_be_bytes()).collect()
}

fn encode_webp(
    pixels: &DynamicImage,
    profile: &EncodeProfile,
    exif: &[u8],
    icc: Option<&[u8]>,
) -> Result<Vec<u8>, SanitizeError> {
    let pixels: Cow<'_, DynamicImage> = match pixels {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => Cow::Borrowed(pixels),
        other if other.color().has_alpha() => Cow::Owned(DynamicImage::ImageRgba8(other.to_rgba8())),
        other => Cow::Owned(DynamicImage::ImageRgb8(other.to_rgb8())),
    };

    let mut encoded = Vec::new();
    let mut encoder = WebPEncoder::new_lossless(&mut encoded);
    encoder
        .set_exif_metadata(exif.to_vec())
        .map_err(|e| SanitizeError::encode(profile.format, e))?;
    if let Some(icc) = icc {
        encoder
            .set_icc_profile(icc.to_vec())
            .map_err(|e| SanitizeError::encode(profile.format, e))?;
    }
    encoder
        .write_image(
            pixels.as_bytes(),
            pixels.width(),
            pixels.height(),
            pixels.color().into(),
        )
        .map_err(|e| SanitizeError::encode(profile.format, e))?;

    Ok(encoded)
}

/// Reemplaza `path` con `bytes` a través de un temporal en el mismo directorio.
///
/// Si se indica una expectativa, el temporal se verifica antes del renombrado;
/// ante cualquier fallo el temporal se elimina y el original queda intacto.
pub fn write_sanitized(
    path: &Path,
    bytes: &[u8],
    expectation: Option<&Expectation>,
) -> Result<(), SanitizeError> {
    let write_error = |source| SanitizeError::Write {
        path: path.to_path_buf(),
        source,
    };

    // Un enlace simbólico se conserva; se reemplaza el archivo al que apunta.
    let target = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let parent = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let stem = target.file_stem().unwrap_or_default().to_string_lossy();
    let extension = target
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut temp = tempfile::Builder::new()
        .prefix(&format!(".{}_temp_", stem))
        .suffix(&extension)
        .tempfile_in(parent)
        .map_err(write_error)?;

    temp.write_all(bytes).map_err(write_error)?;
    temp.as_file().sync_all().map_err(write_error)?;

    match fs::metadata(&target) {
        Ok(original) => {
            if let Err(error) = fs::set_permissions(temp.path(), original.permissions()) {
                warn!(path = %path.display(), %error, "No se pudieron copiar los permisos originales");
            }
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "No se pudieron leer los permisos originales");
        }
    }

    if let Some(expectation) = expectation {
        verify::verify_sanitized_file(temp.path(), expectation)?;
    }

    temp.persist(&target).map_err(|e| write_error(e.error))?;
    debug!(path = %target.display(), bytes = bytes.len(), "Archivo reemplazado");
    Ok(())
}
