//! Comprobación de la imagen limpia antes de reemplazar el original.

use image::{ImageDecoder, ImageReader};
use std::fs;
use std::io::Cursor;
use std::path::Path;

use super::classifier::is_sensitive;
use super::container::collect_ancillary;
use super::format::ImageKind;
use super::loader::ColorProfile;
use super::tags::TagTable;
use crate::error::SanitizeError;

/// Lo que la salida debe cumplir además de no contener etiquetas sensibles.
#[derive(Clone, Debug)]
pub struct Expectation {
    pub kind: ImageKind,
    pub color_profile: Option<ColorProfile>,
}

pub fn verify_sanitized_file(path: &Path, expectation: &Expectation) -> Result<(), SanitizeError> {
    let bytes = fs::read(path).map_err(|source| SanitizeError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    verify_sanitized_bytes(&bytes, expectation)
}

/// Relee la salida: mismo formato, sin etiquetas sensibles, sin metadata
/// auxiliar y con el perfil ICC idéntico al original (o ausente si no había).
pub fn verify_sanitized_bytes(bytes: &[u8], expectation: &Expectation) -> Result<(), SanitizeError> {
    let detected = ImageKind::detect(bytes);
    if detected.as_ref() != Some(&expectation.kind) {
        return Err(verification(format!(
            "se esperaba {} y se obtuvo {}",
            expectation.kind,
            detected.map(|k| k.to_string()).unwrap_or_else(|| "desconocido".to_string())
        )));
    }

    let tags = TagTable::read_from_container(bytes)
        .map_err(|e| verification(format!("no se pudo releer la tabla EXIF: {}", e)))?;
    let leaked: Vec<String> = tags
        .ids()
        .filter(|id| is_sensitive(*id))
        .map(|id| id.to_string())
        .collect();
    if !leaked.is_empty() {
        return Err(verification(format!(
            "etiquetas sensibles presentes: {}",
            leaked.join(", ")
        )));
    }

    let ancillary = collect_ancillary(bytes);
    if !ancillary.is_empty() {
        let keys: Vec<&str> = ancillary.entries.iter().map(|e| e.key.as_str()).collect();
        return Err(verification(format!(
            "metadata auxiliar presente: {}",
            keys.join(", ")
        )));
    }

    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| verification(format!("no se pudo releer la imagen: {}", e)))?
        .into_decoder()
        .map_err(|e| verification(format!("no se pudo releer la imagen: {}", e)))?;
    let profile = decoder
        .icc_profile()
        .map_err(|e| verification(format!("no se pudo releer el perfil ICC: {}", e)))?
        .filter(|p| !p.is_empty());
    let expected = expectation.color_profile.as_ref().map(ColorProfile::as_bytes);
    if profile.as_deref() != expected {
        return Err(verification("el perfil ICC no coincide con el original"));
    }

    Ok(())
}

fn verification(reason: impl Into<String>) -> SanitizeError {
    SanitizeError::Verification {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitizer::tags::TagId;
    use exif::Value;
    use image::codecs::jpeg::JpegEncoder;
    use image::{ExtendedColorType, ImageEncoder};

    fn jpeg_with_tags(tags: &TagTable) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let mut bytes = Vec::new();
        let mut encoder = JpegEncoder::new(&mut bytes);
        encoder.set_exif_metadata(tags.to_tiff_bytes()?)?;
        encoder.write_image(&[0u8; 8 * 8 * 3], 8, 8, ExtendedColorType::Rgb8)?;
        Ok(bytes)
    }

    fn expectation(kind: ImageKind) -> Expectation {
        Expectation {
            kind,
            color_profile: None,
        }
    }

    #[test]
    fn accepts_clean_output() -> Result<(), Box<dyn std::error::Error>> {
        let mut tags = TagTable::new();
        tags.insert(TagId::primary(274), Value::Short(vec![1]));
        let bytes = jpeg_with_tags(&tags)?;

        verify_sanitized_bytes(&bytes, &expectation(ImageKind::Jpeg))?;
        Ok(())
    }

    #[test]
    fn flags_residual_sensitive_tags() -> Result<(), Box<dyn std::error::Error>> {
        let mut tags = TagTable::new();
        tags.insert(TagId::primary(272), Value::Ascii(vec![b"EOS 5D".to_vec()]));
        let bytes = jpeg_with_tags(&tags)?;

        let result = verify_sanitized_bytes(&bytes, &expectation(ImageKind::Jpeg));
        assert!(matches!(result, Err(SanitizeError::Verification { .. })));
        Ok(())
    }

    #[test]
    fn flags_profile_mismatch_and_format_change() -> Result<(), Box<dyn std::error::Error>> {
        let bytes = jpeg_with_tags(&TagTable::new())?;

        let wants_profile = Expectation {
            kind: ImageKind::Jpeg,
            color_profile: Some(ColorProfile::new(vec![1, 2, 3])),
        };
        assert!(verify_sanitized_bytes(&bytes, &wants_profile).is_err());
        assert!(verify_sanitized_bytes(&bytes, &expectation(ImageKind::Png)).is_err());
        Ok(())
    }
}
