//! Entrées d'un répertoire distant (items et containers DIDL-Lite).

use serde::Serialize;
use tracing::debug;
use xmltree::{Element, XMLNode};

use crate::{DidlError, Song, upnp_duration_to_secs, xml_escape};

/// Ressource `<res>` d'un item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resource {
    pub uri: String,
    pub protocol_info: String,
    pub duration: Option<String>,
    pub size: Option<String>,
    pub bitrate: Option<String>,
    pub sample_frequency: Option<String>,
    pub bits_per_sample: Option<String>,
    pub nr_audio_channels: Option<String>,
}

impl Resource {
    /// Champ « content format » du protocolInfo (`http-get:*:audio/flac:*`)
    pub fn content_format(&self) -> Option<&str> {
        self.protocol_info.split(':').nth(2).map(str::trim)
    }
}

/// Un item ou un container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContentEntry {
    pub id: String,
    pub parent_id: String,
    pub title: String,
    pub upnp_class: String,
    pub is_container: bool,
    pub searchable: bool,
    pub child_count: Option<u32>,
    pub artist: Option<String>,
    pub creator: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub date: Option<String>,
    pub track_number: Option<String>,
    pub album_art_uri: Option<String>,
    pub resources: Vec<Resource>,
}

impl ContentEntry {
    /// URI de la première ressource (items seulement)
    pub fn uri(&self) -> Option<&str> {
        self.resources.first().map(|r| r.uri.as_str())
    }

    /// Durée de la première ressource, en secondes
    pub fn duration_secs(&self) -> Option<u32> {
        self.resources
            .first()
            .and_then(|r| r.duration.as_deref())
            .and_then(upnp_duration_to_secs)
    }

    pub fn size(&self) -> Option<u64> {
        self.resources
            .first()
            .and_then(|r| r.size.as_deref())
            .and_then(|s| s.trim().parse().ok())
    }

    pub fn bitrate(&self) -> Option<u32> {
        self.resources
            .first()
            .and_then(|r| r.bitrate.as_deref())
            .and_then(|s| s.trim().parse().ok())
    }

    /// Conversion en [`Song`] (tags utilisés pour le lecteur)
    pub fn to_song(&self) -> Song {
        let first = self.resources.first();
        Song {
            uri: self.uri().unwrap_or_default().to_string(),
            id: self.id.clone(),
            parent_id: self.parent_id.clone(),
            title: self.title.clone(),
            artist: self.artist.clone().or_else(|| self.creator.clone()).unwrap_or_default(),
            album: self.album.clone().unwrap_or_default(),
            genre: self.genre.clone().unwrap_or_default(),
            tracknum: self.track_number.clone().unwrap_or_default(),
            date: self.date.clone().unwrap_or_default(),
            art_uri: self.album_art_uri.clone().unwrap_or_default(),
            upnp_class: self.upnp_class.clone(),
            mime: first
                .and_then(|r| r.content_format())
                .unwrap_or_default()
                .to_string(),
            duration_secs: self.duration_secs().unwrap_or(0),
            size: self.size().unwrap_or(0),
            bitrate: self.bitrate().unwrap_or(0),
            samplefreq: first
                .and_then(|r| r.sample_frequency.as_deref())
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            channels: first
                .and_then(|r| r.nr_audio_channels.as_deref())
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            is_container: self.is_container,
            searchable: self.searchable,
        }
    }

    /// Fragment DIDL (`<item>` ou `<container>`) décrivant l'entrée
    pub fn didl(&self) -> String {
        let tag = if self.is_container { "container" } else { "item" };
        let mut out = format!(
            "<{} id=\"{}\" parentID=\"{}\" restricted=\"1\" searchable=\"{}\"",
            tag,
            xml_escape(&self.id),
            xml_escape(&self.parent_id),
            if self.searchable { "1" } else { "0" }
        );
        if let Some(count) = self.child_count {
            out.push_str(&format!(" childCount=\"{}\"", count));
        }
        out.push('>');
        push_element(&mut out, "dc:title", Some(&self.title));
        push_element(&mut out, "upnp:class", Some(&self.upnp_class));
        push_element(&mut out, "dc:creator", self.creator.as_deref());
        push_element(&mut out, "upnp:artist", self.artist.as_deref());
        push_element(&mut out, "upnp:album", self.album.as_deref());
        push_element(&mut out, "upnp:genre", self.genre.as_deref());
        push_element(&mut out, "dc:date", self.date.as_deref());
        push_element(&mut out, "upnp:originalTrackNumber", self.track_number.as_deref());
        push_element(&mut out, "upnp:albumArtURI", self.album_art_uri.as_deref());
        for res in &self.resources {
            out.push_str("<res");
            push_attr(&mut out, "protocolInfo", Some(&res.protocol_info));
            push_attr(&mut out, "duration", res.duration.as_deref());
            push_attr(&mut out, "size", res.size.as_deref());
            push_attr(&mut out, "bitrate", res.bitrate.as_deref());
            push_attr(&mut out, "sampleFrequency", res.sample_frequency.as_deref());
            push_attr(&mut out, "bitsPerSample", res.bits_per_sample.as_deref());
            push_attr(&mut out, "nrAudioChannels", res.nr_audio_channels.as_deref());
            out.push('>');
            out.push_str(&xml_escape(&res.uri));
            out.push_str("</res>");
        }
        out.push_str(&format!("</{}>", tag));
        out
    }
}

fn push_element(out: &mut String, name: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        out.push_str(&format!("<{}>{}</{}>", name, xml_escape(value), name));
    }
}

fn push_attr(out: &mut String, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        out.push_str(&format!(" {}=\"{}\"", name, xml_escape(value)));
    }
}

/// Contenu accumulé d'un répertoire (une ou plusieurs pages)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirContent {
    pub containers: Vec<ContentEntry>,
    pub items: Vec<ContentEntry>,
}

impl DirContent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ajoute les entrées d'un document DIDL-Lite
    pub fn parse(&mut self, xml: &str) -> Result<(), DidlError> {
        for entry in parse_didl(xml)? {
            if entry.is_container {
                self.containers.push(entry);
            } else {
                self.items.push(entry);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.containers.len() + self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Containers puis items
    pub fn entries(&self) -> impl Iterator<Item = &ContentEntry> {
        self.containers.iter().chain(self.items.iter())
    }
}

/// Analyse un document DIDL-Lite. Un document vide donne une liste vide.
pub fn parse_didl(xml: &str) -> Result<Vec<ContentEntry>, DidlError> {
    let trimmed = xml.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let root = Element::parse(trimmed.as_bytes())?;
    if root.name != "DIDL-Lite" {
        return Err(DidlError::NotDidl(root.name));
    }

    let entries: Vec<ContentEntry> = root
        .children
        .iter()
        .filter_map(|node| match node {
            XMLNode::Element(elem) if elem.name == "item" => Some(parse_entry(elem, false)),
            XMLNode::Element(elem) if elem.name == "container" => Some(parse_entry(elem, true)),
            _ => None,
        })
        .collect();
    debug!("Parsed DIDL-Lite document: {} entries", entries.len());
    Ok(entries)
}

fn child_text(elem: &Element, name: &str) -> Option<String> {
    elem.children.iter().find_map(|node| match node {
        XMLNode::Element(child) if child.name == name => child
            .get_text()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()),
        _ => None,
    })
}

fn attr(elem: &Element, name: &str) -> Option<String> {
    elem.attributes.get(name).cloned()
}

fn parse_entry(elem: &Element, is_container: bool) -> ContentEntry {
    let resources = elem
        .children
        .iter()
        .filter_map(|node| match node {
            XMLNode::Element(res) if res.name == "res" => Some(Resource {
                uri: res
                    .get_text()
                    .map(|t| t.trim().to_string())
                    .unwrap_or_default(),
                protocol_info: attr(res, "protocolInfo").unwrap_or_default(),
                duration: attr(res, "duration"),
                size: attr(res, "size"),
                bitrate: attr(res, "bitrate"),
                sample_frequency: attr(res, "sampleFrequency"),
                bits_per_sample: attr(res, "bitsPerSample"),
                nr_audio_channels: attr(res, "nrAudioChannels"),
            }),
            _ => None,
        })
        .collect();

    ContentEntry {
        id: attr(elem, "id").unwrap_or_default(),
        parent_id: attr(elem, "parentID").unwrap_or_default(),
        title: child_text(elem, "title").unwrap_or_default(),
        upnp_class: child_text(elem, "class").unwrap_or_default(),
        is_container,
        searchable: attr(elem, "searchable").is_some_and(|v| v == "1" || v == "true"),
        child_count: attr(elem, "childCount").and_then(|c| c.trim().parse().ok()),
        artist: child_text(elem, "artist"),
        creator: child_text(elem, "creator"),
        album: child_text(elem, "album"),
        genre: child_text(elem, "genre"),
        date: child_text(elem, "date"),
        track_number: child_text(elem, "originalTrackNumber"),
        album_art_uri: child_text(elem, "albumArtURI"),
        resources,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wrap_didl;

    const BROWSE_RESULT: &str = r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/"
        xmlns:dc="http://purl.org/dc/elements/1.1/"
        xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/">
      <container id="10" parentID="0" childCount="4" searchable="1">
        <dc:title>Albums</dc:title>
        <upnp:class>object.container.storageFolder</upnp:class>
      </container>
      <item id="10$1" parentID="10" restricted="1">
        <dc:title>Rock &amp; Roll</dc:title>
        <upnp:class>object.item.audioItem.musicTrack</upnp:class>
        <upnp:artist role="Performer">Led Zeppelin</upnp:artist>
        <upnp:album>IV</upnp:album>
        <upnp:originalTrackNumber>2</upnp:originalTrackNumber>
        <res protocolInfo="http-get:*:audio/flac:*" duration="0:03:40.000" size="25000000" bitrate="113000">http://srv/rr.flac</res>
      </item>
    </DIDL-Lite>"#;

    #[test]
    fn test_parse_items_and_containers() {
        let mut dir = DirContent::new();
        dir.parse(BROWSE_RESULT).unwrap();
        assert_eq!(dir.containers.len(), 1);
        assert_eq!(dir.items.len(), 1);

        let container = &dir.containers[0];
        assert_eq!(container.id, "10");
        assert_eq!(container.title, "Albums");
        assert_eq!(container.child_count, Some(4));
        assert!(container.searchable);

        let item = &dir.items[0];
        assert_eq!(item.parent_id, "10");
        assert_eq!(item.title, "Rock & Roll");
        assert_eq!(item.artist.as_deref(), Some("Led Zeppelin"));
        assert_eq!(item.uri(), Some("http://srv/rr.flac"));
        assert_eq!(item.duration_secs(), Some(220));
        assert_eq!(item.size(), Some(25_000_000));
        assert_eq!(item.bitrate(), Some(113_000));
        assert_eq!(item.resources[0].content_format(), Some("audio/flac"));
    }

    #[test]
    fn test_accumulates_pages() {
        let mut dir = DirContent::new();
        dir.parse(BROWSE_RESULT).unwrap();
        dir.parse(BROWSE_RESULT).unwrap();
        assert_eq!(dir.len(), 4);
        assert_eq!(dir.entries().next().map(|e| e.is_container), Some(true));
    }

    #[test]
    fn test_empty_and_invalid_documents() {
        assert!(parse_didl("").unwrap().is_empty());
        assert!(matches!(parse_didl("<foo/>"), Err(DidlError::NotDidl(_))));
        assert!(matches!(parse_didl("<DIDL-Lite><item>"), Err(DidlError::Xml(_))));
    }

    #[test]
    fn test_didl_fragment_reparses() {
        let entries = parse_didl(BROWSE_RESULT).unwrap();
        let doc = wrap_didl(&entries.iter().map(|e| e.didl()).collect::<String>());
        let again = parse_didl(&doc).unwrap();
        assert_eq!(again.len(), 2);
        assert_eq!(again[1].title, "Rock & Roll");
        assert_eq!(again[1].resources, entries[1].resources);
    }

    #[test]
    fn test_json_output() {
        let entries = parse_didl(BROWSE_RESULT).unwrap();
        let json = serde_json::to_value(&entries[1]).unwrap();
        assert_eq!(json["title"], "Rock & Roll");
        assert_eq!(json["resources"][0]["uri"], "http://srv/rr.flac");
    }
}
