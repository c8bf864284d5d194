//! Client ContentDirectory : lecture paginée des répertoires d'un MediaServer.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};
use upmdidl::DirContent;

use crate::description::DeviceDescription;
use crate::errors::ControlPointError;
use crate::service::ServiceClient;
use crate::soap_client::{ActionInvoker, ActionResult, required, required_i64};

pub const CONTENT_DIRECTORY_TYPE: &str = "urn:schemas-upnp-org:service:ContentDirectory:1";

/// Taille de page par défaut
pub const DEFAULT_PAGE_SIZE: u32 = 200;
/// MediaTomb supporte (et préfère) des pages plus grandes
pub const MEDIATOMB_PAGE_SIZE: u32 = 500;

/// Famille de serveur, pour adapter les requêtes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerKind {
    MediaTomb,
    Other,
}

impl ServerKind {
    pub fn from_model_name(model_name: &str) -> Self {
        if model_name.to_ascii_lowercase().contains("mediatomb") {
            ServerKind::MediaTomb
        } else {
            ServerKind::Other
        }
    }

    pub fn page_size(self) -> u32 {
        match self {
            ServerKind::MediaTomb => MEDIATOMB_PAGE_SIZE,
            ServerKind::Other => DEFAULT_PAGE_SIZE,
        }
    }
}

/// Tranche lue par un Browse ou un Search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    /// `NumberReturned`
    pub returned: u32,
    /// `TotalMatches`
    pub total: u32,
}

#[derive(Debug, Clone)]
pub struct ContentDirectoryClient {
    service: ServiceClient,
    kind: ServerKind,
    page_size: u32,
}

impl ContentDirectoryClient {
    pub fn new(service: ServiceClient) -> Self {
        let kind = ServerKind::from_model_name(service.model_name());
        Self {
            service,
            kind,
            page_size: kind.page_size(),
        }
    }

    pub fn for_device(
        invoker: Arc<dyn ActionInvoker>,
        device: &DeviceDescription,
    ) -> Result<Self, ControlPointError> {
        ServiceClient::for_device(invoker, device, CONTENT_DIRECTORY_TYPE).map(Self::new)
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn service(&self) -> &ServiceClient {
        &self.service
    }

    pub fn kind(&self) -> ServerKind {
        self.kind
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Une page de `BrowseDirectChildren`, ajoutée à `dirbuf`.
    pub fn read_dir_slice(
        &self,
        object_id: &str,
        offset: u32,
        count: u32,
        dirbuf: &mut DirContent,
    ) -> Result<Slice, ControlPointError> {
        let offset = offset.to_string();
        let count = count.to_string();
        let values = self.service.run_action(
            "Browse",
            &[
                ("ObjectID", object_id),
                ("BrowseFlag", "BrowseDirectChildren"),
                ("Filter", "*"),
                ("SortCriteria", ""),
                ("StartingIndex", &offset),
                ("RequestedCount", &count),
            ],
        )?;
        decode_slice("Browse", &values, dirbuf)
    }

    /// Contenu complet d'un container, page par page.
    ///
    /// En cas d'erreur, `dirbuf` garde les entrées déjà lues.
    pub fn read_dir(&self, object_id: &str, dirbuf: &mut DirContent) -> Result<(), ControlPointError> {
        self.read_all(object_id, dirbuf, |offset, dirbuf| {
            self.read_dir_slice(object_id, offset, self.page_size, dirbuf)
        })
    }

    /// Une page de résultats de recherche.
    pub fn search_slice(
        &self,
        object_id: &str,
        criteria: &str,
        offset: u32,
        count: u32,
        dirbuf: &mut DirContent,
    ) -> Result<Slice, ControlPointError> {
        let offset = offset.to_string();
        let count = count.to_string();
        let values = self.service.run_action(
            "Search",
            &[
                ("ContainerID", object_id),
                ("SearchCriteria", criteria),
                ("Filter", "*"),
                ("SortCriteria", ""),
                ("StartingIndex", &offset),
                ("RequestedCount", &count),
            ],
        )?;
        decode_slice("Search", &values, dirbuf)
    }

    pub fn search(
        &self,
        object_id: &str,
        criteria: &str,
        dirbuf: &mut DirContent,
    ) -> Result<(), ControlPointError> {
        self.read_all(object_id, dirbuf, |offset, dirbuf| {
            self.search_slice(object_id, criteria, offset, self.page_size, dirbuf)
        })
    }

    fn read_all<F>(
        &self,
        object_id: &str,
        dirbuf: &mut DirContent,
        mut slice: F,
    ) -> Result<(), ControlPointError>
    where
        F: FnMut(u32, &mut DirContent) -> Result<Slice, ControlPointError>,
    {
        let mut offset = 0u32;
        loop {
            let Slice { returned, total } = slice(offset, dirbuf)?;
            debug!(
                server = %self.service.friendly_name(),
                object_id,
                offset,
                returned,
                total,
                "directory slice"
            );
            if returned == 0 {
                if offset >= total {
                    return Ok(());
                }
                warn!(
                    server = %self.service.friendly_name(),
                    object_id,
                    offset,
                    total,
                    "empty slice before end of directory"
                );
                return Err(ControlPointError::bad_response(format!(
                    "empty slice at offset {} of {}",
                    offset, total
                )));
            }
            offset = offset.checked_add(returned).ok_or_else(|| {
                ControlPointError::bad_response(format!(
                    "slice of {} at offset {} overflows",
                    returned, offset
                ))
            })?;
            if offset >= total {
                return Ok(());
            }
        }
    }

    /// Métadonnées d'un objet (`BrowseMetadata`)
    pub fn get_metadata(&self, object_id: &str, dirbuf: &mut DirContent) -> Result<(), ControlPointError> {
        let values = self.service.run_action(
            "Browse",
            &[
                ("ObjectID", object_id),
                ("BrowseFlag", "BrowseMetadata"),
                ("Filter", "*"),
                ("SortCriteria", ""),
                ("StartingIndex", "0"),
                ("RequestedCount", "1"),
            ],
        )?;
        let result = required(&values, "Browse", "Result")?;
        dirbuf.parse(result)?;
        Ok(())
    }

    /// Propriétés utilisables dans les recherches. `*` signifie toutes ;
    /// un ensemble vide, aucune recherche possible.
    pub fn get_search_capabilities(&self) -> Result<BTreeSet<String>, ControlPointError> {
        let values = self.service.run_action("GetSearchCapabilities", &[])?;
        let caps = required(&values, "GetSearchCapabilities", "SearchCaps")?;
        Ok(parse_capabilities(caps))
    }

    pub fn get_sort_capabilities(&self) -> Result<BTreeSet<String>, ControlPointError> {
        let values = self.service.run_action("GetSortCapabilities", &[])?;
        let caps = required(&values, "GetSortCapabilities", "SortCaps")?;
        Ok(parse_capabilities(caps))
    }

    pub fn get_system_update_id(&self) -> Result<i64, ControlPointError> {
        let values = self.service.run_action("GetSystemUpdateID", &[])?;
        required_i64(&values, "GetSystemUpdateID", "Id")
    }
}

fn decode_slice(
    action: &str,
    values: &ActionResult,
    dirbuf: &mut DirContent,
) -> Result<Slice, ControlPointError> {
    let returned = required_i64(values, action, "NumberReturned")?;
    let total = required_i64(values, action, "TotalMatches")?;
    let result = required(values, action, "Result")?;
    let (Ok(returned), Ok(total)) = (u32::try_from(returned), u32::try_from(total)) else {
        return Err(ControlPointError::bad_response(format!(
            "{}: counts out of range {}/{}",
            action, returned, total
        )));
    };
    if returned > 0 {
        dirbuf.parse(result)?;
    }
    Ok(Slice { returned, total })
}

fn parse_capabilities(caps: &str) -> BTreeSet<String> {
    let caps = caps.trim();
    if caps == "*" {
        return BTreeSet::from(["*".to_string()]);
    }
    caps.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_kind() {
        assert_eq!(ServerKind::from_model_name("MediaTomb"), ServerKind::MediaTomb);
        assert_eq!(ServerKind::from_model_name("mediatomb 0.12"), ServerKind::MediaTomb);
        assert_eq!(ServerKind::from_model_name("MiniDLNA").page_size(), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_parse_capabilities() {
        assert_eq!(parse_capabilities("*"), BTreeSet::from(["*".to_string()]));
        let caps = parse_capabilities("upnp:artist, dc:title,");
        assert_eq!(caps.len(), 2);
        assert!(caps.contains("dc:title"));
        assert!(parse_capabilities("").is_empty());
    }

    #[test]
    fn test_decode_slice_errors() {
        let mut dir = DirContent::new();
        let mut values = ActionResult::new();
        values.insert("NumberReturned".into(), "0".into());
        values.insert("TotalMatches".into(), "0".into());
        assert!(matches!(
            decode_slice("Browse", &values, &mut dir),
            Err(ControlPointError::BadResponse(_))
        ));

        values.insert("Result".into(), String::new());
        assert_eq!(
            decode_slice("Browse", &values, &mut dir).unwrap(),
            Slice { returned: 0, total: 0 }
        );

        values.insert("NumberReturned".into(), "-1".into());
        assert!(decode_slice("Browse", &values, &mut dir).is_err());

        values.insert("NumberReturned".into(), "0".into());
        values.insert("TotalMatches".into(), "4294967297".into());
        assert!(matches!(
            decode_slice("Browse", &values, &mut dir),
            Err(ControlPointError::BadResponse(_))
        ));
    }
}
