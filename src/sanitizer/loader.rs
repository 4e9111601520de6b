//! Carga de una imagen y extracción de sus tres facetas de metadata.

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, ImageDecoder, ImageReader};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::container::{self, AncillaryInfo};
use super::format::ImageKind;
use super::tags::TagTable;
use crate::error::SanitizeError;

/// Perfil ICC opaco; se transporta sin modificar.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ColorProfile(Vec<u8>);

impl ColorProfile {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Espacio de color de la cabecera ICC (`RGB `, `GRAY`, `CMYK`...).
    /// `None` si los bytes no llevan la firma `acsp`.
    pub fn color_space(&self) -> Option<[u8; 4]> {
        if self.0.get(36..40)? != b"acsp" {
            return None;
        }
        self.0.get(16..20)?.try_into().ok()
    }
}

/// Contenido visual del documento.
pub enum FrameSet {
    Still(DynamicImage),
    /// Los contenedores animados no se decodifican: se omiten sin tocarlos.
    Animated { frames: usize },
}

/// Imagen cargada en memoria, propiedad exclusiva de una operación de limpieza.
pub struct ImageDocument {
    pub path: PathBuf,
    pub kind: ImageKind,
    pub frames: FrameSet,
    pub color_profile: Option<ColorProfile>,
    pub tags: TagTable,
    pub ancillary: AncillaryInfo,
}

impl ImageDocument {
    pub fn is_animated(&self) -> bool {
        matches!(self.frames, FrameSet::Animated { .. })
    }
}

/// Lee el archivo completo y lo interpreta. El descriptor se libera antes de volver.
pub fn load_document(path: &Path) -> Result<ImageDocument, SanitizeError> {
    let bytes = fs::read(path).map_err(|source| SanitizeError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_bytes(path, &bytes)
}

pub fn load_from_bytes(path: &Path, bytes: &[u8]) -> Result<ImageDocument, SanitizeError> {
    let kind = ImageKind::resolve(bytes, path);
    let ancillary = container::collect_ancillary(bytes);
    let tags = match TagTable::read_from_container(bytes) {
        Ok(tags) => tags,
        Err(error) => {
            // Sin tabla legible no hay nada que conservar; la reescritura la descarta igual.
            warn!(path = %path.display(), %error, "EXIF ilegible, se tratará como vacío");
            TagTable::new()
        }
    };

    let frame_count = count_frames(&kind, bytes);
    if frame_count > 1 {
        debug!(path = %path.display(), frames = frame_count, "Imagen animada detectada");
        return Ok(ImageDocument {
            path: path.to_path_buf(),
            kind,
            frames: FrameSet::Animated {
                frames: frame_count,
            },
            color_profile: None,
            tags,
            ancillary,
        });
    }

    let (pixels, color_profile) = decode_still(&kind, bytes)?;
    debug!(
        path = %path.display(),
        %kind,
        width = pixels.width(),
        height = pixels.height(),
        tags = tags.len(),
        ancillary = ancillary.len(),
        icc = color_profile.is_some(),
        "Imagen cargada"
    );

    Ok(ImageDocument {
        path: path.to_path_buf(),
        kind,
        frames: FrameSet::Still(pixels),
        color_profile,
        tags,
        ancillary,
    })
}

fn count_frames(kind: &ImageKind, bytes: &[u8]) -> usize {
    match kind {
        ImageKind::Png => container::png_frame_count(bytes),
        ImageKind::WebP => container::webp_frame_count(bytes),
        ImageKind::Other(detected) if detected == "image/gif" => gif_frame_count(bytes),
        ImageKind::Other(detected) if detected == "image/tiff" => container::tiff_page_count(bytes),
        _ => 1,
    }
}

fn gif_frame_count(bytes: &[u8]) -> usize {
    match GifDecoder::new(Cursor::new(bytes)) {
        Ok(decoder) => decoder
            .into_frames()
            .take(2)
            .filter_map(Result::ok)
            .count(),
        Err(_) => 1,
    }
}

fn decode_still(
    kind: &ImageKind,
    bytes: &[u8],
) -> Result<(DynamicImage, Option<ColorProfile>), SanitizeError> {
    let format = kind
        .image_format()
        .or_else(|| image::guess_format(bytes).ok())
        .ok_or_else(|| SanitizeError::decode(format!("contenido no reconocible ({})", kind)))?;

    let mut decoder = ImageReader::with_format(Cursor::new(bytes), format)
        .into_decoder()
        .map_err(SanitizeError::decode)?;
    let color_profile = decoder
        .icc_profile()
        .map_err(SanitizeError::decode)?
        .filter(|profile| !profile.is_empty())
        .map(ColorProfile::new);
    let pixels = DynamicImage::from_decoder(decoder).map_err(SanitizeError::decode)?;

    Ok((pixels, color_profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifEncoder;
    use image::{Delay, Frame, ImageFormat, Rgba, RgbaImage};
    use tempfile::tempdir;

    #[test]
    fn loads_still_png_without_metadata() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("plano.png");
        image::RgbImage::from_pixel(4, 3, image::Rgb([10, 20, 30])).save(&path)?;

        let document = load_document(&path)?;

        assert_eq!(document.kind, ImageKind::Png);
        assert!(!document.is_animated());
        assert!(document.tags.is_empty());
        assert!(document.ancillary.is_empty());
        assert!(document.color_profile.is_none());
        match document.frames {
            FrameSet::Still(pixels) => assert_eq!((pixels.width(), pixels.height()), (4, 3)),
            FrameSet::Animated { .. } => panic!("no debería detectarse animación"),
        }
        Ok(())
    }

    #[test]
    fn animated_gif_is_a_property_not_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let mut bytes = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut bytes);
            let frames = [Rgba([255, 0, 0, 255]), Rgba([0, 0, 255, 255])].map(|color| {
                Frame::from_parts(
                    RgbaImage::from_pixel(2, 2, color),
                    0,
                    0,
                    Delay::from_numer_denom_ms(100, 1),
                )
            });
            encoder.encode_frames(frames)?;
        }

        let document = load_from_bytes(Path::new("anim.gif"), &bytes)?;
        assert!(document.is_animated());
        assert!(matches!(document.frames, FrameSet::Animated { frames: 2 }));
        Ok(())
    }

    #[test]
    fn undecodable_content_is_a_decode_error() {
        let result = load_from_bytes(Path::new("roto.jpg"), b"\xFF\xD8\xFF\xE0 basura");
        assert!(matches!(result, Err(SanitizeError::Decode { .. })));
    }

    #[test]
    fn missing_file_is_a_read_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let result = load_document(&dir.path().join("no-existe.png"));
        assert!(matches!(result, Err(SanitizeError::Read { .. })));
        Ok(())
    }

    #[test]
    fn static_gif_decodes_as_other_kind() -> Result<(), Box<dyn std::error::Error>> {
        let mut bytes = Vec::new();
        RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255]))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Gif)?;

        let document = load_from_bytes(Path::new("fijo.gif"), &bytes)?;
        assert_eq!(document.kind, ImageKind::Other("image/gif".to_string()));
        assert!(!document.is_animated());
        Ok(())
    }

    #[test]
    fn multi_page_tiff_is_not_decoded() -> Result<(), Box<dyn std::error::Error>> {
        // Dos IFD vacíos encadenados: "II", 42, primer IFD en 8, segundo en 14.
        let mut bytes = b"II".to_vec();
        bytes.extend_from_slice(&42u16.to_le_bytes());
        bytes.extend_from_slice(&8u32.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&14u32.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());

        let document = load_from_bytes(Path::new("escaneo.tif"), &bytes)?;
        assert_eq!(document.kind, ImageKind::Other("image/tiff".to_string()));
        assert!(matches!(document.frames, FrameSet::Animated { frames: 2 }));
        Ok(())
    }

    #[test]
    fn color_space_requires_icc_signature() {
        let mut header = vec![0u8; 128];
        header[16..20].copy_from_slice(b"CMYK");
        assert_eq!(ColorProfile::new(header.clone()).color_space(), None);

        header[36..40].copy_from_slice(b"acsp");
        assert_eq!(ColorProfile::new(header).color_space(), Some(*b"CMYK"));
        assert_eq!(ColorProfile::new(vec![0x42; 20]).color_space(), None);
    }
}
