//! Formats acceptés par le renderer (`SinkProtocolInfo`) et contrôle des
//! métadonnées reçues.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, warn};
use upmdidl::{Song, parse_didl};

const DEFAULT_PROTOCOL_INFO: &str = include_str!("protocolinfo.txt");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolInfo {
    text: String,
    formats: HashSet<String>,
}

impl ProtocolInfo {
    /// Une entrée par ligne, espaces et virgules de bord retirés ; les
    /// lignes `#` sont des commentaires.
    pub fn parse(source: &str) -> Self {
        let entries: Vec<&str> = source
            .lines()
            .map(|line| line.trim_matches(|c: char| c.is_whitespace() || c == ','))
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect();
        let formats = entries
            .iter()
            .flat_map(|line| line.split(','))
            .filter_map(|entry| entry.split(':').nth(2))
            .map(|cf| cf.trim().to_ascii_lowercase())
            .filter(|cf| !cf.is_empty())
            .collect();
        Self {
            text: entries.join(","),
            formats,
        }
    }

    pub fn embedded() -> Self {
        Self::parse(DEFAULT_PROTOCOL_INFO)
    }

    /// Liste lue dans `path`, ou la liste intégrée.
    pub fn load(path: Option<&Path>) -> io::Result<Self> {
        match path {
            Some(path) => {
                let info = Self::parse(&fs::read_to_string(path)?);
                debug!("protocol info: {} formats from {}", info.formats.len(), path.display());
                Ok(info)
            }
            None => Ok(Self::embedded()),
        }
    }

    /// Valeur de `SinkProtocolInfo`
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn supports(&self, content_format: &str) -> bool {
        self.formats.contains(&content_format.trim().to_ascii_lowercase())
    }

    /// Vérifie que `didl` décrit `uri` dans un format accepté et en extrait
    /// le morceau.
    ///
    /// Sans contrôle (`enabled` faux), des métadonnées illisibles donnent un
    /// morceau réduit à son URI.
    pub fn check_content_format(&self, uri: &str, didl: &str, enabled: bool) -> Result<Song, String> {
        let item = parse_didl(didl)
            .ok()
            .and_then(|entries| entries.into_iter().find(|e| !e.is_container));
        let Some(item) = item else {
            if enabled {
                return Err("metadata parse failed".to_string());
            }
            return Ok(Song {
                uri: uri.to_string(),
                ..Default::default()
            });
        };
        if !enabled {
            return Ok(item.to_song());
        }

        let Some(resource) = item.resources.iter().find(|r| r.uri == uri) else {
            return Err("uri not found in metadata resource list".to_string());
        };
        match resource.content_format() {
            Some(cf) if !cf.is_empty() && self.supports(cf) => Ok(item.to_song()),
            Some(cf) if !cf.is_empty() => {
                warn!("unsupported content format {}", cf);
                Err(format!("unsupported content format {}", cf))
            }
            _ => Err("resource has no protocolInfo".to_string()),
        }
    }
}
