//! Construcción del conjunto mínimo de metadata de salida.

use super::classifier::Redaction;
use super::container::AncillaryInfo;
use super::loader::ColorProfile;
use super::tags::TagTable;

/// Metadata que acompañará a la imagen reescrita.
#[derive(Clone, Debug)]
pub struct CleanMetadata {
    /// Siempre vacía: la información auxiliar no se filtra, se descarta entera.
    pub ancillary: AncillaryInfo,
    pub color_profile: Option<ColorProfile>,
    pub tags: TagTable,
}

pub fn rebuild_metadata(redaction: Redaction, color_profile: Option<ColorProfile>) -> CleanMetadata {
    CleanMetadata {
        ancillary: AncillaryInfo::default(),
        color_profile: color_profile.filter(|profile| !profile.is_empty()),
        tags: redaction.tags,
    }
}
