//! Tabla estructurada de etiquetas EXIF, propia y desacoplada del documento leído.

use exif::{Context, Field, In, Reader, Tag, Value};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Cursor;
use tracing::warn;

/// Identificador del bloque GPS dentro de IFD0.
pub const GPS_INFO_TAG: u16 = 34853;
/// Identificador del bloque Exif dentro de IFD0.
pub const EXIF_IFD_TAG: u16 = 34665;
/// Identificador del bloque de interoperabilidad dentro del IFD Exif.
pub const INTEROP_IFD_TAG: u16 = 40965;

const POINTER_TAGS: [u16; 3] = [EXIF_IFD_TAG, GPS_INFO_TAG, INTEROP_IFD_TAG];

/// Desplazamientos y longitudes de tiras, teselas y miniatura del IFD0.
/// Apuntan a datos del contenedor original y no pueden reescribirse.
const LAYOUT_TAGS: [u16; 6] = [273, 279, 324, 325, 513, 514];

/// Bloque (IFD) al que pertenece una etiqueta.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum TagGroup {
    Primary,
    Exif,
    Gps,
    Interop,
}

impl TagGroup {
    fn from_context(context: Context) -> Option<Self> {
        #[allow(unreachable_patterns)]
        match context {
            Context::Tiff => Some(TagGroup::Primary),
            Context::Exif => Some(TagGroup::Exif),
            Context::Gps => Some(TagGroup::Gps),
            Context::Interop => Some(TagGroup::Interop),
            _ => None,
        }
    }

    fn context(self) -> Context {
        match self {
            TagGroup::Primary => Context::Tiff,
            TagGroup::Exif => Context::Exif,
            TagGroup::Gps => Context::Gps,
            TagGroup::Interop => Context::Interop,
        }
    }
}

/// Clave de la tabla. Los números GPS e Interop se solapan, de ahí el par.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct TagId {
    pub group: TagGroup,
    pub number: u16,
}

impl TagId {
    pub const fn new(group: TagGroup, number: u16) -> Self {
        Self { group, number }
    }

    pub const fn primary(number: u16) -> Self {
        Self::new(TagGroup::Primary, number)
    }

    pub const fn exif(number: u16) -> Self {
        Self::new(TagGroup::Exif, number)
    }

    /// Número con el que la política clasifica la etiqueta.
    ///
    /// Las entradas de un sub-IFD heredan el identificador del bloque que las
    /// contiene: todo lo que vive en el IFD GPS se clasifica como 34853.
    pub const fn policy_number(&self) -> u16 {
        match self.group {
            TagGroup::Gps => GPS_INFO_TAG,
            TagGroup::Interop => INTEROP_IFD_TAG,
            TagGroup::Primary | TagGroup::Exif => self.number,
        }
    }

    fn exif_tag(&self) -> Tag {
        Tag(self.group.context(), self.number)
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?} {})", self.exif_tag(), self.group, self.number)
    }
}

/// Mapa identificador → valor con la codificación original del valor.
#[derive(Clone, Debug)]
pub struct TagTable {
    entries: BTreeMap<TagId, Value>,
    little_endian: bool,
}

impl Default for TagTable {
    fn default() -> Self {
        Self::with_byte_order(true)
    }
}

impl TagTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_byte_order(little_endian: bool) -> Self {
        Self {
            entries: BTreeMap::new(),
            little_endian,
        }
    }

    /// Copia los campos de la imagen principal a una tabla propia.
    ///
    /// Se descartan los punteros a sub-IFD (se sintetizan al escribir), los
    /// desplazamientos de datos de imagen del IFD0, las entradas de la
    /// miniatura (IFD1) y los valores de tipo desconocido, que no pueden
    /// volver a serializarse.
    pub fn from_exif(exif: &exif::Exif) -> Self {
        let mut table = Self::with_byte_order(exif.little_endian());

        for field in exif.fields() {
            if field.ifd_num != In::PRIMARY {
                continue;
            }
            let Some(group) = TagGroup::from_context(field.tag.context()) else {
                continue;
            };
            let number = field.tag.number();
            if matches!(group, TagGroup::Primary | TagGroup::Exif) && POINTER_TAGS.contains(&number)
            {
                continue;
            }
            if group == TagGroup::Primary && LAYOUT_TAGS.contains(&number) {
                continue;
            }
            if let Value::Unknown(type_code, _, _) = field.value {
                warn!(
                    tag = %field.tag,
                    type_code,
                    "Etiqueta con tipo desconocido descartada"
                );
                continue;
            }
            table
                .entries
                .insert(TagId::new(group, number), field.value.clone());
        }

        table
    }

    /// Lee la tabla EXIF embebida en un contenedor. Sin EXIF devuelve una tabla vacía.
    pub fn read_from_container(bytes: &[u8]) -> Result<Self, exif::Error> {
        match Reader::new().read_from_container(&mut Cursor::new(bytes)) {
            Ok(exif) => Ok(Self::from_exif(&exif)),
            Err(exif::Error::NotFound(_)) | Err(exif::Error::BlankValue(_)) => Ok(Self::new()),
            Err(other) => Err(other),
        }
    }

    pub fn insert(&mut self, id: TagId, value: Value) -> Option<Value> {
        self.entries.insert(id, value)
    }

    pub fn get(&self, id: TagId) -> Option<&Value> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: TagId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Indica si alguna entrada se clasifica con `number` (34853 cubre todo el IFD GPS).
    pub fn contains_policy_number(&self, number: u16) -> bool {
        self.entries.keys().any(|id| id.policy_number() == number)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn little_endian(&self) -> bool {
        self.little_endian
    }

    pub fn ids(&self) -> impl Iterator<Item = TagId> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TagId, &Value)> {
        self.entries.iter()
    }

    /// Serializa la tabla como bloque TIFF listo para APP1, eXIf o el chunk EXIF.
    ///
    /// Una tabla vacía produce una cabecera TIFF con un IFD0 sin entradas.
    pub fn to_tiff_bytes(&self) -> Result<Vec<u8>, exif::Error> {
        if self.entries.is_empty() {
            return Ok(empty_tiff(self.little_endian));
        }

        let fields: Vec<Field> = self
            .entries
            .iter()
            .map(|(id, value)| Field {
                tag: id.exif_tag(),
                ifd_num: In::PRIMARY,
                value: value.clone(),
            })
            .collect();

        let mut writer = exif::experimental::Writer::new();
        for field in &fields {
            writer.push_field(field);
        }

        let mut buffer = Cursor::new(Vec::new());
        writer.write(&mut buffer, self.little_endian)?;
        Ok(buffer.into_inner())
    }
}

impl IntoIterator for TagTable {
    type Item = (TagId, Value);
    type IntoIter = std::collections::btree_map::IntoIter<TagId, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

fn empty_tiff(little_endian: bool) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(14);
    if little_endian {
        bytes.extend_from_slice(b"II");
        bytes.extend_from_slice(&42u16.to_le_bytes());
        bytes.extend_from_slice(&8u32.to_le_bytes());
    } else {
        bytes.extend_from_slice(b"MM");
        bytes.extend_from_slice(&42u16.to_be_bytes());
        bytes.extend_from_slice(&8u32.to_be_bytes());
    }
    // IFD0 sin entradas y sin IFD siguiente.
    bytes.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> TagTable {
        let mut table = TagTable::new();
        table.insert(TagId::primary(271), Value::Ascii(vec![b"Canon".to_vec()]));
        table.insert(TagId::primary(274), Value::Short(vec![6]));
        table.insert(TagId::exif(40961), Value::Short(vec![1]));
        table.insert(TagId::new(TagGroup::Gps, 2), Value::Rational(vec![exif::Rational { num: 40, denom: 1 }]));
        table
    }

    #[test]
    fn gps_entries_classify_as_gps_info() {
        let id = TagId::new(TagGroup::Gps, 2);
        assert_eq!(id.policy_number(), GPS_INFO_TAG);
        assert_eq!(TagId::exif(40961).policy_number(), 40961);
        assert!(sample_table().contains_policy_number(GPS_INFO_TAG));
    }

    #[test]
    fn tiff_round_trip_keeps_values_and_groups() -> Result<(), Box<dyn std::error::Error>> {
        let table = sample_table();
        let bytes = table.to_tiff_bytes()?;
        assert!(bytes.starts_with(b"II*\0"));

        let exif = Reader::new().read_raw(bytes)?;
        let parsed = TagTable::from_exif(&exif);

        assert_eq!(parsed.len(), 4);
        assert_eq!(
            parsed.get(TagId::exif(40961)).and_then(|v| v.get_uint(0)),
            Some(1)
        );
        assert_eq!(
            parsed.get(TagId::primary(274)).and_then(|v| v.get_uint(0)),
            Some(6)
        );
        assert!(matches!(
            parsed.get(TagId::primary(271)),
            Some(Value::Ascii(parts)) if parts == &vec![b"Canon".to_vec()]
        ));
        assert!(parsed.contains(TagId::new(TagGroup::Gps, 2)));
        assert!(!parsed.contains(TagId::primary(EXIF_IFD_TAG)));
        Ok(())
    }

    #[test]
    fn empty_table_serializes_to_empty_ifd() -> Result<(), Box<dyn std::error::Error>> {
        let bytes = TagTable::with_byte_order(false).to_tiff_bytes()?;
        assert_eq!(bytes, b"MM\0*\0\0\0\x08\0\0\0\0\0\0".to_vec());
        Ok(())
    }

    #[test]
    fn missing_exif_reads_as_empty_table() -> Result<(), Box<dyn std::error::Error>> {
        let mut png = Vec::new();
        image::RgbImage::new(2, 2).write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)?;

        let table = TagTable::read_from_container(&png)?;
        assert!(table.is_empty());
        Ok(())
    }

    #[test]
    fn strip_layout_tags_are_not_carried_over() -> Result<(), Box<dyn std::error::Error>> {
        // IFD0 con Make, StripOffsets y StripByteCounts, como el de un TIFF o un JPEG de cámara.
        let mut raw = b"II".to_vec();
        raw.extend_from_slice(&42u16.to_le_bytes());
        raw.extend_from_slice(&8u32.to_le_bytes());
        raw.extend_from_slice(&3u16.to_le_bytes());
        for (tag, kind, count, value) in [(271u16, 2u16, 6u32, 50u32), (273, 4, 1, 0), (279, 4, 1, 0)] {
            raw.extend_from_slice(&tag.to_le_bytes());
            raw.extend_from_slice(&kind.to_le_bytes());
            raw.extend_from_slice(&count.to_le_bytes());
            raw.extend_from_slice(&value.to_le_bytes());
        }
        raw.extend_from_slice(&0u32.to_le_bytes());
        raw.extend_from_slice(b"Canon\0");

        let exif = Reader::new().read_raw(raw)?;
        let table = TagTable::from_exif(&exif);

        assert!(table.contains(TagId::primary(271)));
        assert!(!table.contains(TagId::primary(273)));
        assert!(!table.contains(TagId::primary(279)));

        let redaction = crate::sanitizer::classifier::classify_tags(table);
        assert!(redaction.tags.is_empty());
        let bytes = redaction.tags.to_tiff_bytes()?;
        assert!(bytes.starts_with(b"II*\0"));
        Ok(())
    }
}
