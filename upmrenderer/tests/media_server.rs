use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use upmcontrol::{
    ActionInvoker, ActionResult, CONTENT_DIRECTORY_TYPE, ContentDirectoryClient, ControlPointError,
    DeviceDescription, ServiceClient, ServiceDescription,
};
use upmdidl::wrap_didl;
use upmrenderer::services::contentdirectory::DEFAULT_SEARCH_CAPS;
use upmrenderer::{MediaServerContext, build_media_server, media_server_info};
use upmupnp::UpnpDevice;

const CD: &str = "urn:upnp-org:serviceId:ContentDirectory";

/// Serveur distant simulé : `total` items par container, pages de 200.
struct FakeServer {
    total: u32,
    calls: AtomicUsize,
    containers: Mutex<Vec<String>>,
}

impl FakeServer {
    fn new(total: u32) -> Self {
        Self {
            total,
            calls: AtomicUsize::new(0),
            containers: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ActionInvoker for FakeServer {
    fn invoke(
        &self,
        _control_url: &str,
        _service_type: &str,
        action: &str,
        args: &[(&str, &str)],
    ) -> Result<ActionResult, ControlPointError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let args: HashMap<&str, &str> = args.iter().cloned().collect();
        let mut out = ActionResult::new();
        match action {
            "Browse" | "Search" => {
                let container = args.get("ObjectID").or(args.get("ContainerID")).copied().unwrap_or("");
                if container == "missing" {
                    return Err(ControlPointError::UpnpFault {
                        code: 701,
                        description: "No such object".to_string(),
                    });
                }
                self.containers.lock().push(container.to_string());
                let start: u32 = args["StartingIndex"].parse().unwrap();
                let requested: u32 = args["RequestedCount"].parse().unwrap();
                let count = requested.min(200).min(self.total.saturating_sub(start));
                let items: String = (start..start + count)
                    .map(|i| {
                        format!(
                            r#"<item id="i{i}" parentID="{container}" restricted="1"><dc:title>T{i}</dc:title><upnp:class>object.item.audioItem.musicTrack</upnp:class><res protocolInfo="http-get:*:audio/flac:*">http://srv/{i}.flac</res></item>"#
                        )
                    })
                    .collect();
                out.insert("Result".into(), wrap_didl(&items));
                out.insert("NumberReturned".into(), count.to_string());
                out.insert("TotalMatches".into(), self.total.to_string());
                out.insert("UpdateID".into(), "1".into());
            }
            "GetSystemUpdateID" => {
                out.insert("Id".into(), "7".into());
            }
            _ => {
                return Err(ControlPointError::UpnpFault {
                    code: 401,
                    description: "Invalid Action".to_string(),
                });
            }
        }
        Ok(out)
    }
}

fn proxy(server: Arc<FakeServer>) -> impl UpnpDevice {
    let service = ServiceDescription {
        service_type: CONTENT_DIRECTORY_TYPE.to_string(),
        control_url: "http://srv/cd/control".to_string(),
        ..Default::default()
    };
    let device = DeviceDescription {
        friendly_name: "Server".to_string(),
        model_name: "MiniDLNA".to_string(),
        udn: "uuid:srv".to_string(),
        services: vec![service.clone()],
        ..Default::default()
    };
    let client = ContentDirectoryClient::new(ServiceClient::new(server, &device, &service));
    build_media_server(
        media_server_info("test-mediaserver", "Proxy"),
        MediaServerContext::with_client(client),
    )
}

fn call(device: &dyn UpnpDevice, action: &str, args: &[(&str, &str)]) -> upmupnp::errors::ActionResult<HashMap<String, String>> {
    let args: HashMap<String, String> = args
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    device.dispatch(CD, action, &args).map(|out| out.into_iter().collect())
}

fn browse(device: &dyn UpnpDevice, object: &str, start: &str, count: &str) -> upmupnp::errors::ActionResult<HashMap<String, String>> {
    call(
        device,
        "Browse",
        &[
            ("ObjectID", object),
            ("BrowseFlag", "BrowseDirectChildren"),
            ("Filter", "*"),
            ("StartingIndex", start),
            ("RequestedCount", count),
            ("SortCriteria", ""),
        ],
    )
}

#[test]
fn test_browse_everything_pages_upstream() {
    let server = Arc::new(FakeServer::new(450));
    let device = proxy(Arc::clone(&server));

    let out = browse(&device, "0", "0", "0").unwrap();
    assert_eq!(server.calls(), 3);
    assert_eq!(out["TotalMatches"], "450");
    assert_eq!(out["NumberReturned"], "450");
    assert!(out["Result"].contains(r#"id="i449""#));
}

#[test]
fn test_browse_everything_from_offset() {
    let server = Arc::new(FakeServer::new(450));
    let device = proxy(Arc::clone(&server));

    let out = browse(&device, "0", "10", "0").unwrap();
    assert_eq!(out["TotalMatches"], "450");
    assert_eq!(out["NumberReturned"], "440");
    assert!(!out["Result"].contains(r#"id="i9""#));
}

#[test]
fn test_browse_slice_is_forwarded() {
    let server = Arc::new(FakeServer::new(450));
    let device = proxy(Arc::clone(&server));

    let out = browse(&device, "0", "400", "100").unwrap();
    assert_eq!(server.calls(), 1);
    assert_eq!(out["NumberReturned"], "50");
    assert_eq!(out["TotalMatches"], "450");
}

#[test]
fn test_upstream_fault_code_is_forwarded() {
    let device = proxy(Arc::new(FakeServer::new(10)));
    let err = browse(&device, "missing", "0", "10").unwrap_err();
    assert_eq!(err.code(), 701);

    let err = call(
        &device,
        "Browse",
        &[
            ("ObjectID", "0"),
            ("BrowseFlag", "BrowseEverything"),
            ("Filter", "*"),
            ("StartingIndex", "0"),
            ("RequestedCount", "0"),
            ("SortCriteria", ""),
        ],
    )
    .unwrap_err();
    assert_eq!(err.code(), 402);
}

#[test]
fn test_root_search_uses_last_browsed_container() {
    let server = Arc::new(FakeServer::new(5));
    let device = proxy(Arc::clone(&server));
    browse(&device, "albums", "0", "10").unwrap();

    let out = call(
        &device,
        "Search",
        &[
            ("ContainerID", "0"),
            ("SearchCriteria", "dc:title contains \"T\""),
            ("Filter", "*"),
            ("StartingIndex", "0"),
            ("RequestedCount", "10"),
            ("SortCriteria", ""),
        ],
    )
    .unwrap();
    assert_eq!(out["NumberReturned"], "5");
    assert_eq!(server.containers.lock().last().unwrap(), "albums");
}

#[test]
fn test_capabilities_and_update_id() {
    let device = proxy(Arc::new(FakeServer::new(1)));

    let caps = call(&device, "GetSearchCapabilities", &[]).unwrap();
    assert_eq!(caps["SearchCaps"], DEFAULT_SEARCH_CAPS);
    let sort = call(&device, "GetSortCapabilities", &[]).unwrap();
    assert_eq!(sort["SortCaps"], "");

    let id = call(&device, "GetSystemUpdateID", &[]).unwrap();
    assert_eq!(id["Id"], "7");
    let out = browse(&device, "0", "0", "1").unwrap();
    assert_eq!(out["UpdateID"], "7");
}
