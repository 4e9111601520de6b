//! Política de etiquetas sensibles: lista de denegación por identificador.
//!
//! Solo se mira el identificador, nunca el valor. Cualquier etiqueta fuera de
//! la lista (incluidas las de fabricante o de revisiones futuras) se conserva.

use tracing::debug;

use super::tags::{TagId, TagTable};

/// Identificadores considerados identificables, con su nombre EXIF.
pub const SENSITIVE_TAGS: [(u16, &str); 30] = [
    (270, "ImageDescription"),
    (271, "Make"),
    (272, "Model"),
    (305, "Software"),
    (306, "DateTime"),
    (315, "Artist"),
    (316, "HostComputer"),
    (33432, "Copyright"),
    (34853, "GPSInfo"),
    (36867, "DateTimeOriginal"),
    (36868, "DateTimeDigitized"),
    (36880, "OffsetTime"),
    (36881, "OffsetTimeOriginal"),
    (36882, "OffsetTimeDigitized"),
    (37500, "MakerNote"),
    (37510, "UserComment"),
    (37520, "SubSecTime"),
    (37521, "SubSecTimeOriginal"),
    (37522, "SubSecTimeDigitized"),
    (40091, "XPTitle"),
    (40092, "XPComment"),
    (40093, "XPAuthor"),
    (40094, "XPKeywords"),
    (40095, "XPSubject"),
    (42032, "CameraOwnerName"),
    (42033, "BodySerialNumber"),
    (42034, "LensSpecification"),
    (42035, "LensMake"),
    (42036, "LensModel"),
    (42037, "LensSerialNumber"),
];

pub fn is_sensitive_number(number: u16) -> bool {
    SENSITIVE_TAGS.iter().any(|(id, _)| *id == number)
}

pub fn is_sensitive(id: TagId) -> bool {
    is_sensitive_number(id.policy_number())
}

/// Resultado de clasificar una tabla: lo conservado y lo retirado.
#[derive(Clone, Debug)]
pub struct Redaction {
    pub tags: TagTable,
    pub removed: Vec<TagId>,
}

/// Copia a una tabla nueva las etiquetas fuera de la lista, sin tocar sus valores.
pub fn classify_tags(table: TagTable) -> Redaction {
    let mut tags = TagTable::with_byte_order(table.little_endian());
    let mut removed = Vec::new();

    for (id, value) in table {
        if is_sensitive(id) {
            debug!(tag = %id, "Etiqueta sensible retirada");
            removed.push(id);
        } else {
            tags.insert(id, value);
        }
    }

    Redaction { tags, removed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitizer::tags::{GPS_INFO_TAG, TagGroup};
    use exif::Value;

    #[test]
    fn denylist_has_no_duplicates() {
        let mut ids: Vec<u16> = SENSITIVE_TAGS.iter().map(|(id, _)| *id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), SENSITIVE_TAGS.len());
    }

    #[test]
    fn removes_listed_and_keeps_everything_else() {
        let mut table = TagTable::with_byte_order(false);
        table.insert(TagId::primary(271), Value::Ascii(vec![b"Canon".to_vec()]));
        table.insert(TagId::primary(274), Value::Short(vec![1]));
        table.insert(TagId::exif(36867), Value::Ascii(vec![b"2023:01:01 10:00:00".to_vec()]));
        table.insert(TagId::exif(40961), Value::Short(vec![1]));
        table.insert(TagId::new(TagGroup::Gps, 1), Value::Ascii(vec![b"N".to_vec()]));
        table.insert(TagId::new(TagGroup::Gps, 2), Value::Byte(vec![1, 2, 3]));
        table.insert(TagId::new(TagGroup::Interop, 1), Value::Ascii(vec![b"R98".to_vec()]));
        // Etiqueta de fabricante sin nombre conocido.
        table.insert(TagId::exif(59932), Value::Undefined(vec![0xAB], 0));

        let redaction = classify_tags(table);

        assert!(!redaction.tags.little_endian());
        assert_eq!(redaction.removed.len(), 4);
        assert!(!redaction.tags.contains(TagId::primary(271)));
        assert!(!redaction.tags.contains(TagId::exif(36867)));
        assert!(!redaction.tags.contains_policy_number(GPS_INFO_TAG));

        assert_eq!(
            redaction.tags.get(TagId::exif(40961)).and_then(|v| v.get_uint(0)),
            Some(1)
        );
        assert!(redaction.tags.contains(TagId::primary(274)));
        assert!(redaction.tags.contains(TagId::new(TagGroup::Interop, 1)));
        assert!(matches!(
            redaction.tags.get(TagId::exif(59932)),
            Some(Value::Undefined(bytes, _)) if bytes == &vec![0xAB]
        ));
    }

    #[test]
    fn empty_table_stays_empty() {
        let redaction = classify_tags(TagTable::new());
        assert!(redaction.tags.is_empty());
        assert!(redaction.removed.is_empty());
    }
}
