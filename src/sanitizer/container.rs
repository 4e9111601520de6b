//! Recorrido de segmentos y chunks de los contenedores JPEG, PNG y WebP.
//!
//! El motor no reescribe contenedores a mano: la codificación y la inserción
//! de EXIF/ICC quedan en manos de `image`/`png`. Aquí solo se inventaría la
//! información auxiliar y se cuentan cuadros o páginas.

use serde::Serialize;

const JPEG_SOI: u8 = 0xD8;
const JPEG_EOI: u8 = 0xD9;
const JPEG_SOS: u8 = 0xDA;
const JPEG_APP0: u8 = 0xE0;
const JPEG_APP1: u8 = 0xE1;
const JPEG_APP2: u8 = 0xE2;
const JPEG_APP13: u8 = 0xED;
const JPEG_APP14: u8 = 0xEE;
const JPEG_APP15: u8 = 0xEF;
const JPEG_COM: u8 = 0xFE;

const EXIF_HEADER: &[u8] = b"Exif\0\0";
const ICC_HEADER: &[u8] = b"ICC_PROFILE\0";
const XMP_HEADER: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
const XMP_EXTENSION_HEADER: &[u8] = b"http://ns.adobe.com/xmp/extension/\0";
const JFIF_HEADER: &[u8] = b"JFIF\0";
const JFXX_HEADER: &[u8] = b"JFXX\0";
const ADOBE_HEADER: &[u8] = b"Adobe";

const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const PNG_TEXT_CHUNKS: [&[u8; 4]; 4] = [b"tEXt", b"zTXt", b"iTXt", b"tIME"];

const VP8X_ANIMATION: u8 = 0x02;

/// Límite de IFD encadenados que se siguen al contar páginas TIFF.
const TIFF_MAX_PAGES: usize = 1024;

/// Entrada de metadata auxiliar encontrada fuera de la tabla de etiquetas.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct AncillaryEntry {
    pub key: String,
    pub size: usize,
}

/// Metadata auxiliar de un contenedor. Solo se inventaría; nunca se conserva.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct AncillaryInfo {
    pub entries: Vec<AncillaryEntry>,
}

impl AncillaryInfo {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn push(&mut self, key: impl Into<String>, size: usize) {
        self.entries.push(AncillaryEntry {
            key: key.into(),
            size,
        });
    }
}

#[derive(Clone, Copy, Debug)]
pub struct JpegSegment<'a> {
    pub marker: u8,
    pub payload: &'a [u8],
}

/// Segmentos de cabecera de un JPEG, desde SOI hasta el inicio del primer escaneo.
pub fn jpeg_segments(bytes: &[u8]) -> Vec<JpegSegment<'_>> {
    let mut segments = Vec::new();
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != JPEG_SOI {
        return segments;
    }

    let mut pos = 2;
    while pos + 1 < bytes.len() {
        if bytes[pos] != 0xFF {
            break;
        }
        while pos < bytes.len() && bytes[pos] == 0xFF {
            pos += 1;
        }
        let Some(&marker) = bytes.get(pos) else {
            break;
        };
        pos += 1;

        if marker == JPEG_SOS || marker == JPEG_EOI {
            break;
        }
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            continue;
        }

        let Some(length) = read_u16_be(bytes, pos).map(usize::from) else {
            break;
        };
        if length < 2 || pos + length > bytes.len() {
            break;
        }
        segments.push(JpegSegment {
            marker,
            payload: &bytes[pos + 2..pos + length],
        });
        pos += length;
    }

    segments
}

#[derive(Clone, Copy, Debug)]
pub struct PngChunk<'a> {
    pub kind: [u8; 4],
    pub data: &'a [u8],
}

/// Chunks de un PNG en orden. Un CRC inválido no se comprueba aquí.
pub fn png_chunks(bytes: &[u8]) -> Vec<PngChunk<'_>> {
    let mut chunks = Vec::new();
    if !bytes.starts_with(PNG_SIGNATURE) {
        return chunks;
    }

    let mut pos = PNG_SIGNATURE.len();
    while let Some(length) = read_u32_be(bytes, pos).map(|l| l as usize) {
        let data_start = pos + 8;
        let Some(data_end) = data_start.checked_add(length) else {
            break;
        };
        if data_end + 4 > bytes.len() {
            break;
        }
        let mut kind = [0u8; 4];
        kind.copy_from_slice(&bytes[pos + 4..pos + 8]);
        chunks.push(PngChunk {
            kind,
            data: &bytes[data_start..data_end],
        });
        if &kind == b"IEND" {
            break;
        }
        pos = data_end + 4;
    }

    chunks
}

#[derive(Clone, Copy, Debug)]
pub struct RiffChunk<'a> {
    pub fourcc: [u8; 4],
    pub data: &'a [u8],
}

/// Chunks de primer nivel de un archivo WebP, o `None` si no es RIFF/WEBP.
pub fn riff_chunks(bytes: &[u8]) -> Option<Vec<RiffChunk<'_>>> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WEBP" {
        return None;
    }

    let mut chunks = Vec::new();
    let mut pos = 12;
    while let Some(size) = read_u32_le(bytes, pos + 4).map(|s| s as usize) {
        let data_start = pos + 8;
        let Some(data_end) = data_start.checked_add(size) else {
            break;
        };
        if data_end > bytes.len() {
            break;
        }
        let mut fourcc = [0u8; 4];
        fourcc.copy_from_slice(&bytes[pos..pos + 4]);
        chunks.push(RiffChunk {
            fourcc,
            data: &bytes[data_start..data_end],
        });
        pos = data_end + (size & 1);
    }

    Some(chunks)
}

/// Número de cuadros declarado por un APNG; 1 para PNG estáticos.
pub fn png_frame_count(bytes: &[u8]) -> usize {
    png_chunks(bytes)
        .iter()
        .find(|chunk| &chunk.kind == b"acTL")
        .and_then(|chunk| read_u32_be(chunk.data, 0))
        .map(|frames| frames as usize)
        .unwrap_or(1)
}

/// Número de cuadros de un WebP; 1 salvo que VP8X declare animación.
pub fn webp_frame_count(bytes: &[u8]) -> usize {
    let Some(chunks) = riff_chunks(bytes) else {
        return 1;
    };

    let animated = chunks
        .iter()
        .find(|chunk| &chunk.fourcc == b"VP8X")
        .and_then(|chunk| chunk.data.first())
        .is_some_and(|flags| flags & VP8X_ANIMATION != 0);

    if !animated {
        return 1;
    }

    chunks
        .iter()
        .filter(|chunk| &chunk.fourcc == b"ANMF")
        .count()
}

/// Inventaría la metadata auxiliar del contenedor (textos, XMP, IPTC, comentarios...).
pub fn collect_ancillary(bytes: &[u8]) -> AncillaryInfo {
    let mut info = AncillaryInfo::default();

    if bytes.starts_with(PNG_SIGNATURE) {
        for chunk in png_chunks(bytes) {
            if !PNG_TEXT_CHUNKS.contains(&&chunk.kind) {
                continue;
            }
            let kind = String::from_utf8_lossy(&chunk.kind).into_owned();
            if &chunk.kind == b"tIME" {
                info.push(kind, chunk.data.len());
            } else {
                let keyword = chunk.data.split(|b| *b == 0).next().unwrap_or_default();
                info.push(
                    format!("{}:{}", kind, String::from_utf8_lossy(keyword)),
                    chunk.data.len(),
                );
            }
        }
    } else if let Some(chunks) = riff_chunks(bytes) {
        for chunk in chunks.iter().filter(|c| &c.fourcc == b"XMP ") {
            info.push("XMP", chunk.data.len());
        }
    } else {
        for segment in jpeg_segments(bytes) {
            if let Some(key) = jpeg_ancillary_key(&segment) {
                info.push(key, segment.payload.len());
            }
        }
    }

    info
}

fn jpeg_ancillary_key(segment: &JpegSegment<'_>) -> Option<String> {
    let payload = segment.payload;
    match segment.marker {
        JPEG_COM => Some("COM".to_string()),
        JPEG_APP0 if payload.starts_with(JFIF_HEADER) || payload.starts_with(JFXX_HEADER) => None,
        JPEG_APP1 if payload.starts_with(EXIF_HEADER) => None,
        JPEG_APP1 if payload.starts_with(XMP_HEADER) => Some("XMP".to_string()),
        JPEG_APP1 if payload.starts_with(XMP_EXTENSION_HEADER) => Some("XMP-extension".to_string()),
        JPEG_APP2 if payload.starts_with(ICC_HEADER) => None,
        JPEG_APP13 => Some("IPTC".to_string()),
        JPEG_APP14 if payload.starts_with(ADOBE_HEADER) => None,
        marker @ JPEG_APP0..=JPEG_APP15 => Some(format!("APP{}", marker - JPEG_APP0)),
        _ => None,
    }
}

/// Número de páginas (IFD encadenados) de un TIFF; 1 si la cadena no se puede seguir.
pub fn tiff_page_count(bytes: &[u8]) -> usize {
    let read_u16 = |pos: usize| match bytes.get(0..2) {
        Some(b"II") => read_u16_le(bytes, pos),
        Some(b"MM") => read_u16_be(bytes, pos),
        _ => None,
    };
    let read_u32 = |pos: usize| match bytes.get(0..2) {
        Some(b"II") => read_u32_le(bytes, pos),
        Some(b"MM") => read_u32_be(bytes, pos),
        _ => None,
    };

    if read_u16(2) != Some(42) {
        return 1;
    }

    let mut pages = 0;
    let mut visited = Vec::new();
    let mut offset = read_u32(4).map(|o| o as usize).unwrap_or(0);
    while offset != 0 && pages < TIFF_MAX_PAGES && !visited.contains(&offset) {
        let Some(entries) = read_u16(offset).map(usize::from) else {
            break;
        };
        visited.push(offset);
        pages += 1;
        offset = read_u32(offset + 2 + entries * 12)
            .map(|o| o as usize)
            .unwrap_or(0);
    }

    pages.max(1)
}

fn read_u16_be(bytes: &[u8], pos: usize) -> Option<u16> {
    let raw = bytes.get(pos..pos + 2)?;
    Some(u16::from_be_bytes([raw[0], raw[1]]))
}

fn read_u16_le(bytes: &[u8], pos: usize) -> Option<u16> {
    let raw = bytes.get(pos..pos + 2)?;
    Some(u16::from_le_bytes([raw[0], raw[1]]))
}

fn read_u32_be(bytes: &[u8], pos: usize) -> Option<u32> {
    let raw = bytes.get(pos..pos + 4)?;
    Some(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

fn read_u32_le(bytes: &[u8], pos: usize) -> Option<u32> {
    let raw = bytes.get(pos..pos + 4)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg_segment(marker: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0xFF, marker];
        out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn minimal_jpeg(extra: &[(u8, &[u8])]) -> Vec<u8> {
        let mut bytes = vec![0xFF, JPEG_SOI];
        bytes.extend(jpeg_segment(JPEG_APP0, b"JFIF\0\x01\x02\0\0\x01\0\x01\0\0"));
        for (marker, payload) in extra {
            bytes.extend(jpeg_segment(*marker, payload));
        }
        bytes.extend_from_slice(&[0xFF, JPEG_SOS, 0x00, 0x02, 0xAB, 0xFF, JPEG_EOI]);
        bytes
    }

    fn png_chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(kind);
        out.extend_from_slice(data);
        out.extend_from_slice(&[0, 0, 0, 0]);
        out
    }

    fn riff_chunk(fourcc: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut out = fourcc.to_vec();
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
        if data.len() % 2 == 1 {
            out.push(0);
        }
        out
    }

    /// TIFF little-endian con `pages` IFD vacíos encadenados.
    fn chained_tiff(pages: u32) -> Vec<u8> {
        let mut bytes = b"II*\0".to_vec();
        bytes.extend_from_slice(&8u32.to_le_bytes());
        for page in 0..pages {
            let next = if page + 1 == pages { 0 } else { 8 + (page + 1) * 6 };
            bytes.extend_from_slice(&0u16.to_le_bytes());
            bytes.extend_from_slice(&next.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn jpeg_segments_stop_at_scan() {
        let bytes = minimal_jpeg(&[(JPEG_COM, b"hola".as_slice())]);
        let markers: Vec<u8> = jpeg_segments(&bytes).iter().map(|s| s.marker).collect();
        assert_eq!(markers, vec![JPEG_APP0, JPEG_COM]);
    }

    #[test]
    fn jpeg_ancillary_skips_rendering_segments() {
        let xmp = [XMP_HEADER, b"<x:xmpmeta/>"].concat();
        let icc = [ICC_HEADER, &[1, 1], b"profile"].concat();
        let bytes = minimal_jpeg(&[
            (JPEG_APP1, b"Exif\0\0II*\0".as_slice()),
            (JPEG_APP1, xmp.as_slice()),
            (JPEG_APP2, icc.as_slice()),
            (JPEG_APP13, b"Photoshop 3.0\0".as_slice()),
            (JPEG_COM, b"camara de juan".as_slice()),
        ]);

        let keys: Vec<String> = collect_ancillary(&bytes)
            .entries
            .into_iter()
            .map(|e| e.key)
            .collect();
        assert_eq!(keys, vec!["XMP", "IPTC", "COM"]);
    }

    #[test]
    fn png_text_chunks_are_ancillary() {
        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend(png_chunk(b"IHDR", &[0; 13]));
        bytes.extend(png_chunk(b"tEXt", b"Creation Time\x002023-01-01"));
        bytes.extend(png_chunk(b"tIME", &[0x07, 0xE7, 1, 1, 0, 0, 0]));
        bytes.extend(png_chunk(b"IDAT", &[]));
        bytes.extend(png_chunk(b"IEND", &[]));

        let info = collect_ancillary(&bytes);
        let keys: Vec<&str> = info.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["tEXt:Creation Time", "tIME"]);
        assert_eq!(png_frame_count(&bytes), 1);
    }

    #[test]
    fn apng_reports_declared_frames() {
        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend(png_chunk(b"IHDR", &[0; 13]));
        bytes.extend(png_chunk(b"acTL", &[0, 0, 0, 3, 0, 0, 0, 0]));
        bytes.extend(png_chunk(b"IEND", &[]));
        assert_eq!(png_frame_count(&bytes), 3);
    }

    #[test]
    fn animated_webp_counts_frames() {
        let mut body = b"WEBP".to_vec();
        body.extend(riff_chunk(b"VP8X", &[VP8X_ANIMATION, 0, 0, 0, 0, 0, 0, 0, 0, 0]));
        body.extend(riff_chunk(b"ANIM", &[0; 6]));
        body.extend(riff_chunk(b"ANMF", &[0; 16]));
        body.extend(riff_chunk(b"ANMF", &[0; 16]));
        body.extend(riff_chunk(b"XMP ", b"<x/>"));
        let mut bytes = b"RIFF".to_vec();
        bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&body);

        assert_eq!(webp_frame_count(&bytes), 2);
        assert_eq!(collect_ancillary(&bytes).len(), 1);
    }

    #[test]
    fn tiff_pages_follow_the_ifd_chain() {
        assert_eq!(tiff_page_count(&chained_tiff(1)), 1);
        assert_eq!(tiff_page_count(&chained_tiff(3)), 3);
        assert_eq!(tiff_page_count(b"no es un tiff"), 1);

        // Un IFD que se apunta a sí mismo no provoca un bucle infinito.
        let mut looping = b"II*\0".to_vec();
        looping.extend_from_slice(&8u32.to_le_bytes());
        looping.extend_from_slice(&0u16.to_le_bytes());
        looping.extend_from_slice(&8u32.to_le_bytes());
        assert_eq!(tiff_page_count(&looping), 1);
    }
}
