//! # ContentDirectory - relais vers un Media Server distant
//!
//! Le Media Server local republie l'arborescence d'un serveur découvert sur
//! le réseau (`msproxy`). Le serveur distant est résolu à la première
//! requête ; les lectures complètes (`RequestedCount` à 0) sont paginées
//! selon la taille de page du serveur distant.
//!
//! Une recherche sur la racine est faite dans le dernier container parcouru.

use tracing::{debug, info, warn};
use upmcontrol::{ContentDirectoryClient, ControlPointError};
use upmdidl::{DirContent, wrap_didl};
use upmupnp::device::EventStyle;
use upmupnp::errors::ActionResult;
use upmupnp::state::state_map;
use upmupnp::{ActionError, ActionSpec, ArgSpec, PendingAction, ServiceDef, SoapOutgoing, StateVariableMap};

pub const SERVICE_TYPE: &str = "urn:schemas-upnp-org:service:ContentDirectory:1";
pub const SERVICE_ID: &str = "urn:upnp-org:serviceId:ContentDirectory";

pub const DEFAULT_SEARCH_CAPS: &str = "upnp:artist,dc:creator,upnp:album,dc:title";

/// Recherche du serveur distant.
pub type UpstreamResolver = Box<dyn FnMut() -> Result<ContentDirectoryClient, ControlPointError> + Send>;

pub struct MediaServerContext {
    upstream: Option<ContentDirectoryClient>,
    resolver: Option<UpstreamResolver>,
    update_id: i64,
    last_browsed: String,
}

impl MediaServerContext {
    pub fn with_client(client: ContentDirectoryClient) -> Self {
        Self {
            upstream: Some(client),
            resolver: None,
            update_id: 0,
            last_browsed: String::new(),
        }
    }

    pub fn with_resolver(resolver: UpstreamResolver) -> Self {
        Self {
            upstream: None,
            resolver: Some(resolver),
            update_id: 0,
            last_browsed: String::new(),
        }
    }

    fn upstream(&mut self) -> ActionResult<&ContentDirectoryClient> {
        if self.upstream.is_none() {
            let resolver = self
                .resolver
                .as_mut()
                .ok_or_else(|| ActionError::internal("no upstream media server"))?;
            let client = resolver().map_err(upstream_error)?;
            info!(
                "✅ Proxying media server {}",
                client.service().friendly_name()
            );
            self.upstream = Some(client);
        }
        self.upstream
            .as_ref()
            .ok_or_else(|| ActionError::internal("no upstream media server"))
    }
}

/// Les fautes UPnP du serveur distant sont renvoyées telles quelles.
fn upstream_error(e: ControlPointError) -> ActionError {
    match e.upnp_code() {
        Some(code) => ActionError::service(code, e.to_string()),
        None => ActionError::internal(e.to_string()),
    }
}

fn cd_state(ctx: &mut MediaServerContext) -> StateVariableMap {
    state_map([
        ("SystemUpdateID", ctx.update_id.to_string()),
        ("ContainerUpdateIDs", String::new()),
    ])
}

fn browse_result(dir: &DirContent, skip: usize) -> (String, usize) {
    let mut fragments = String::new();
    let mut count = 0;
    for entry in dir.entries().skip(skip) {
        fragments.push_str(&entry.didl());
        count += 1;
    }
    (wrap_didl(&fragments), count)
}

fn reply(ctx: &MediaServerContext, result: String, returned: usize, total: usize) -> SoapOutgoing {
    SoapOutgoing::new()
        .arg("Result", result)
        .arg("NumberReturned", returned.to_string())
        .arg("TotalMatches", total.to_string())
        .arg("UpdateID", ctx.update_id.to_string())
}

fn browse(ctx: &mut MediaServerContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    let object_id = call.string("ObjectID")?.to_string();
    let flag = call.string("BrowseFlag")?;
    let start = call.int("StartingIndex")? as u32;
    let count = call.int("RequestedCount")? as u32;
    debug!(object_id = %object_id, flag, start, count, "Browse");

    let mut dir = DirContent::new();
    match flag {
        "BrowseMetadata" => {
            ctx.upstream()?
                .get_metadata(&object_id, &mut dir)
                .map_err(upstream_error)?;
            let (result, returned) = browse_result(&dir, 0);
            Ok(reply(ctx, result, returned, returned))
        }
        "BrowseDirectChildren" => {
            ctx.last_browsed = object_id.clone();
            if count == 0 {
                ctx.upstream()?
                    .read_dir(&object_id, &mut dir)
                    .map_err(upstream_error)?;
                let (result, returned) = browse_result(&dir, start as usize);
                Ok(reply(ctx, result, returned, dir.len()))
            } else {
                let slice = ctx
                    .upstream()?
                    .read_dir_slice(&object_id, start, count, &mut dir)
                    .map_err(upstream_error)?;
                let (result, _) = browse_result(&dir, 0);
                Ok(reply(ctx, result, slice.returned as usize, slice.total as usize))
            }
        }
        other => Err(ActionError::invalid_param(format!("bad BrowseFlag {}", other))),
    }
}

fn search(ctx: &mut MediaServerContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    let mut container = call.string("ContainerID")?.to_string();
    let criteria = call.string("SearchCriteria")?;
    let start = call.int("StartingIndex")? as u32;
    let count = call.int("RequestedCount")? as u32;

    if container == "0" && !ctx.last_browsed.is_empty() {
        warn!(
            "⚠️ Search on the root container, using last browsed container {}",
            ctx.last_browsed
        );
        container = ctx.last_browsed.clone();
    }

    let mut dir = DirContent::new();
    if count == 0 {
        ctx.upstream()?
            .search(&container, criteria, &mut dir)
            .map_err(upstream_error)?;
        let (result, returned) = browse_result(&dir, start as usize);
        Ok(reply(ctx, result, returned, dir.len()))
    } else {
        let slice = ctx
            .upstream()?
            .search_slice(&container, criteria, start, count, &mut dir)
            .map_err(upstream_error)?;
        let (result, _) = browse_result(&dir, 0);
        Ok(reply(ctx, result, slice.returned as usize, slice.total as usize))
    }
}

fn get_search_capabilities(ctx: &mut MediaServerContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    let caps = match ctx.upstream().and_then(|cd| cd.get_search_capabilities().map_err(upstream_error)) {
        Ok(caps) => caps.into_iter().collect::<Vec<_>>().join(","),
        Err(e) => {
            debug!("upstream search capabilities unavailable: {}", e);
            DEFAULT_SEARCH_CAPS.to_string()
        }
    };
    Ok(SoapOutgoing::new().arg("SearchCaps", caps))
}

fn get_sort_capabilities(_ctx: &mut MediaServerContext, _call: &PendingAction) -> ActionResult<SoapOutgoing> {
    Ok(SoapOutgoing::new().arg("SortCaps", ""))
}

fn get_system_update_id(ctx: &mut MediaServerContext, call: &PendingAction) -> ActionResult<SoapOutgoing> {
    let id = ctx
        .upstream()?
        .get_system_update_id()
        .map_err(upstream_error)?;
    if id != ctx.update_id {
        ctx.update_id = id;
        call.wake();
    }
    Ok(SoapOutgoing::new().arg("Id", id.to_string()))
}

const BROWSE_ARGS: &[ArgSpec] = &[
    ArgSpec::string("ObjectID"),
    ArgSpec::string("BrowseFlag"),
    ArgSpec::string("Filter"),
    ArgSpec::ui4("StartingIndex"),
    ArgSpec::ui4("RequestedCount"),
    ArgSpec::string("SortCriteria"),
];
const SEARCH_ARGS: &[ArgSpec] = &[
    ArgSpec::string("ContainerID"),
    ArgSpec::string("SearchCriteria"),
    ArgSpec::string("Filter"),
    ArgSpec::ui4("StartingIndex"),
    ArgSpec::ui4("RequestedCount"),
    ArgSpec::string("SortCriteria"),
];
const RESULT_OUTS: &[&str] = &["Result", "NumberReturned", "TotalMatches", "UpdateID"];

pub fn service() -> ServiceDef<MediaServerContext> {
    ServiceDef {
        service_type: SERVICE_TYPE,
        service_id: SERVICE_ID,
        actions: vec![
            ActionSpec::new("GetSearchCapabilities", &[], &["SearchCaps"], get_search_capabilities),
            ActionSpec::new("GetSortCapabilities", &[], &["SortCaps"], get_sort_capabilities),
            ActionSpec::new("GetSystemUpdateID", &[], &["Id"], get_system_update_id),
            ActionSpec::new("Browse", BROWSE_ARGS, RESULT_OUTS, browse),
            ActionSpec::new("Search", SEARCH_ARGS, RESULT_OUTS, search),
        ],
        makestate: cd_state,
        event_style: EventStyle::Properties,
    }
}
