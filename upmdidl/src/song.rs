//! Description d'un morceau et génération DIDL.

use serde::Serialize;

use crate::{parse_didl, upnp_duration, xml_escape};

const DIDL_HEAD: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"utf-8\"?>",
    "<DIDL-Lite xmlns:dc=\"http://purl.org/dc/elements/1.1/\" ",
    "xmlns:upnp=\"urn:schemas-upnp-org:metadata-1-0/upnp/\" ",
    "xmlns=\"urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/\" ",
    "xmlns:dlna=\"urn:schemas-dlna-org:metadata-1-0/\">"
);
const DIDL_TAIL: &str = "</DIDL-Lite>";

const DEFAULT_ITEM_CLASS: &str = "object.item.audioItem.musicTrack";
const DEFAULT_CONTAINER_CLASS: &str = "object.container";
const MPD_PROTOCOL_INFO: &str = "http-get:*:audio/mpeg:DLNA.ORG_PN=MP3;DLNA.ORG_OP=01;DLNA.ORG_CI=0;DLNA.ORG_FLAGS=01700000000000000000000000000000";

pub fn didl_head() -> &'static str {
    DIDL_HEAD
}

pub fn didl_tail() -> &'static str {
    DIDL_TAIL
}

/// Entoure un ou plusieurs fragments `<item>`/`<container>`
pub fn wrap_didl(fragments: &str) -> String {
    format!("{}{}{}", DIDL_HEAD, fragments, DIDL_TAIL)
}

/// Morceau (ou container) tel que vu par le lecteur ou un répertoire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Song {
    pub uri: String,
    pub id: String,
    pub parent_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    /// Peut contenir `n/total` pour MPD
    pub tracknum: String,
    pub date: String,
    pub art_uri: String,
    pub upnp_class: String,
    pub mime: String,
    pub duration_secs: u32,
    pub size: u64,
    pub bitrate: u32,
    pub samplefreq: u32,
    pub channels: u32,
    pub is_container: bool,
    pub searchable: bool,
}

impl Song {
    pub fn item(id: &str, parent_id: &str, title: &str) -> Self {
        Song {
            id: id.to_string(),
            parent_id: parent_id.to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn container(id: &str, parent_id: &str, title: &str) -> Self {
        Song {
            is_container: true,
            ..Song::item(id, parent_id, title)
        }
    }

    /// Premier item d'un document de métadonnées DIDL, converti en morceau.
    pub fn from_metadata(metadata: &str) -> Option<Song> {
        parse_didl(metadata)
            .ok()?
            .into_iter()
            .find(|entry| !entry.is_container)
            .map(|entry| entry.to_song())
    }

    /// Fragment DIDL complet (entrée de répertoire)
    pub fn didl(&self) -> String {
        let tag = if self.is_container { "container" } else { "item" };
        let mut out = format!(
            "<{} id=\"{}\" parentID=\"{}\" restricted=\"1\" searchable=\"{}\"><dc:title>{}</dc:title>",
            tag,
            xml_escape(&self.id),
            xml_escape(&self.parent_id),
            if self.searchable { "1" } else { "0" },
            xml_escape(&self.title)
        );

        if self.is_container {
            out.push_str(&element("upnp:class", class_or(&self.upnp_class, DEFAULT_CONTAINER_CLASS)));
            // tracknum sert d'annotation pour les containers
            out.push_str(&optional("upnp:userAnnotation", &self.tracknum));
        } else {
            out.push_str(&element("upnp:class", class_or(&self.upnp_class, DEFAULT_ITEM_CLASS)));
            out.push_str(&optional("upnp:genre", &self.genre));
            out.push_str(&optional("upnp:album", &self.album));
            out.push_str(&optional("upnp:originalTrackNumber", &self.tracknum));
            out.push_str(&format!(
                "<res duration=\"{}\" size=\"{}\" bitrate=\"{}\" sampleFrequency=\"{}\" nrAudioChannels=\"{}\" protocolInfo=\"http-get:*:{}:*\">{}</res>",
                upnp_duration(u64::from(self.duration_secs) * 1000),
                self.size,
                self.bitrate,
                self.samplefreq,
                self.channels,
                xml_escape(&self.mime),
                xml_escape(&self.uri)
            ));
        }
        out.push_str(&optional("dc:creator", &self.artist));
        out.push_str(&optional("upnp:artist", &self.artist));
        out.push_str(&optional("dc:date", &self.date));
        out.push_str(&optional("upnp:albumArtURI", &self.art_uri));
        out.push_str(&format!("</{}>", tag));
        out
    }
}

fn class_or<'a>(class: &'a str, default: &'a str) -> &'a str {
    if class.is_empty() { default } else { class }
}

fn element(name: &str, value: &str) -> String {
    format!("<{}>{}</{}>", name, xml_escape(value), name)
}

fn optional(name: &str, value: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        element(name, value)
    }
}

/// Métadonnées minimales d'un morceau du lecteur pour lequel aucune
/// métadonnée DIDL n'est connue. Le document est marqué `<orig>mpd</orig>`.
pub fn didlmake(song: &Song) -> String {
    let mut out = String::from(DIDL_HEAD);
    out.push_str("<item restricted=\"1\"><orig>mpd</orig>");
    out.push_str(&element("dc:title", &song.title));
    out.push_str(&element("upnp:class", DEFAULT_ITEM_CLASS));
    if !song.artist.is_empty() {
        out.push_str(&element("dc:creator", &song.artist));
        out.push_str(&element("upnp:artist", &song.artist));
    }
    out.push_str(&optional("upnp:album", &song.album));
    out.push_str(&optional("upnp:genre", &song.genre));

    // MPD renvoie parfois `n/total`
    let tracknum = song.tracknum.split('/').next().unwrap_or_default();
    out.push_str(&optional("upnp:originalTrackNumber", tracknum));
    out.push_str(&optional("upnp:albumArtURI", &song.art_uri));

    out.push_str(&format!(
        "<res duration=\"{}\" sampleFrequency=\"44100\" nrAudioChannels=\"2\" protocolInfo=\"{}\">{}</res>",
        upnp_duration(u64::from(song.duration_secs) * 1000),
        MPD_PROTOCOL_INFO,
        xml_escape(&song.uri)
    ));
    out.push_str("</item>");
    out.push_str(DIDL_TAIL);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mpd_song() -> Song {
        Song {
            uri: "http://host/a&b.mp3".to_string(),
            title: "Première".to_string(),
            artist: "Artiste".to_string(),
            album: "Album".to_string(),
            tracknum: "3/12".to_string(),
            duration_secs: 185,
            ..Default::default()
        }
    }

    #[test]
    fn test_didlmake() {
        let didl = didlmake(&mpd_song());
        assert!(didl.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?><DIDL-Lite"));
        assert!(didl.contains("<orig>mpd</orig>"));
        assert!(didl.contains("<upnp:originalTrackNumber>3</upnp:originalTrackNumber>"));
        assert!(didl.contains("duration=\"0:03:05\""));
        assert!(didl.contains(">http://host/a&amp;b.mp3</res>"));
        assert!(!didl.contains("upnp:genre"));
    }

    #[test]
    fn test_didlmake_parses_back() {
        let song = Song::from_metadata(&didlmake(&mpd_song())).unwrap();
        assert_eq!(song.uri, "http://host/a&b.mp3");
        assert_eq!(song.title, "Première");
        assert_eq!(song.artist, "Artiste");
        assert_eq!(song.tracknum, "3");
        assert_eq!(song.duration_secs, 185);
        assert_eq!(song.mime, "audio/mpeg");
    }

    #[test]
    fn test_container_didl() {
        let mut dir = Song::container("0$radio$", "0", "Radios");
        dir.tracknum = "note".to_string();
        let fragment = dir.didl();
        assert!(fragment.starts_with("<container id=\"0$radio$\" parentID=\"0\""));
        assert!(fragment.contains("<upnp:class>object.container</upnp:class>"));
        assert!(fragment.contains("<upnp:userAnnotation>note</upnp:userAnnotation>"));
        assert!(!fragment.contains("<res"));
    }

    #[test]
    fn test_from_metadata_rejects_garbage() {
        assert!(Song::from_metadata("not xml").is_none());
        assert!(Song::from_metadata(&wrap_didl("")).is_none());
    }
}
