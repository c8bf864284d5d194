//! # upmdidl - DIDL-Lite
//!
//! Lecture et écriture du format DIDL-Lite utilisé par UPnP/DLNA.
//!
//! ## Fonctionnalités
//!
//! - ✅ Analyse d'un document DIDL-Lite en [`ContentEntry`] (items et containers)
//! - ✅ Accumulation de plusieurs pages dans un [`DirContent`]
//! - ✅ Description d'un morceau ([`Song`]) et génération du fragment DIDL
//! - ✅ Métadonnées minimales synthétisées à partir des tags du lecteur ([`didlmake`])
//! - ✅ Conversion des durées UPnP (`H:MM:SS[.fff]`)

mod duration;
mod entry;
mod errors;
mod song;

pub use duration::{upnp_duration, upnp_duration_to_secs};
pub use entry::{ContentEntry, DirContent, Resource, parse_didl};
pub use errors::DidlError;
pub use song::{Song, didl_head, didl_tail, didlmake, wrap_didl};

/// Namespace par défaut d'un document DIDL-Lite
pub const DIDL_NAMESPACE: &str = "urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/";

/// Échappement XML pour le texte et les valeurs d'attributs
pub fn xml_escape(value: &str) -> String {
    quick_xml::escape::escape(value).into_owned()
}
