//! Serveur HTTP UPnP (axum).
//!
//! Routes exposées pour chaque device :
//!
//! - `GET /<udn>/description.xml` : description du device
//! - `GET /<udn>/<service>/scpd.xml` : SCPD du service
//! - `POST /<udn>/<service>/control` : actions SOAP
//! - `SUBSCRIBE|UNSUBSCRIBE /<udn>/<service>/event` : abonnements GENA
//!
//! Les handlers d'actions et les relevés d'état s'exécutent sur le pool
//! bloquant de tokio : ils peuvent parler au lecteur de façon synchrone.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{any, get, post},
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::description::{device_description, scpd};
use crate::device::UpnpDevice;
use crate::errors::ActionError;
use crate::eventing::{
    EventSender, SubscriptionRegistry, parse_callbacks, parse_timeout, propertyset, run_event_loop,
};
use crate::soap::{build_soap_fault, build_soap_response, parse_soap_action};

pub const SERVER_HEADER: &str = concat!("Linux UPnP/1.0 upmpdrenderer/", env!("CARGO_PKG_VERSION"));

const XML_CONTENT_TYPE: &str = r#"text/xml; charset="utf-8""#;

struct ServerState {
    devices: HashMap<String, Arc<dyn UpnpDevice>>,
    sender: EventSender,
    base_url: String,
}

impl ServerState {
    fn device(&self, udn: &str) -> Option<&Arc<dyn UpnpDevice>> {
        self.devices.get(udn)
    }

    /// (serviceType, serviceId) à partir du nom court utilisé dans l'URL.
    fn service(&self, udn: &str, short: &str) -> Option<(Arc<dyn UpnpDevice>, &'static str, &'static str)> {
        let device = self.device(udn)?;
        device
            .services()
            .into_iter()
            .find(|s| s.short_name() == short)
            .map(|s| (Arc::clone(device), s.service_type, s.service_id))
    }
}

/// Serveur HTTP hébergeant un ou plusieurs devices.
pub struct UpnpServer {
    devices: Vec<Arc<dyn UpnpDevice>>,
    sender: EventSender,
    base_url: String,
}

impl UpnpServer {
    /// `base_url` : `http://<ip>:<port>`, sans `/` final.
    pub fn new(base_url: &str) -> Self {
        Self {
            devices: Vec::new(),
            sender: EventSender::new(Arc::new(SubscriptionRegistry::new())),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn add_device(&mut self, device: Arc<dyn UpnpDevice>) {
        info!(
            "✅ Device {} ({}) registered",
            device.info().friendly_name,
            device.info().udn
        );
        self.devices.push(device);
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL de description d'un device, pour les annonces SSDP.
    pub fn description_url(&self, udn: &str) -> String {
        format!("{}{}", self.base_url, crate::description::description_path(udn))
    }

    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    pub fn router(&self) -> Router {
        let state = Arc::new(ServerState {
            devices: self
                .devices
                .iter()
                .map(|d| (d.info().udn.clone(), Arc::clone(d)))
                .collect(),
            sender: self.sender.clone(),
            base_url: self.base_url.clone(),
        });

        Router::new()
            .route("/{udn}/description.xml", get(description_handler))
            .route("/{udn}/{service}/scpd.xml", get(scpd_handler))
            .route("/{udn}/{service}/control", post(control_handler))
            .route("/{udn}/{service}/event", any(event_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Sert les requêtes et publie les événements jusqu'à l'arrêt.
    pub async fn serve(self, listener: TcpListener, shutdown: watch::Receiver<bool>) -> io::Result<()> {
        for device in &self.devices {
            tokio::spawn(run_event_loop(
                Arc::clone(device),
                self.sender.clone(),
                shutdown.clone(),
            ));
        }

        info!("✅ UPnP server listening on {}", listener.local_addr()?);
        let mut rx = shutdown;
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                while !*rx.borrow() {
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await
    }
}

fn xml_response(status: StatusCode, body: String) -> Response {
    (
        status,
        [
            (header::CONTENT_TYPE, XML_CONTENT_TYPE),
            (header::SERVER, SERVER_HEADER),
        ],
        body,
    )
        .into_response()
}

fn fault_response(err: &ActionError) -> Response {
    let description = err.description();
    match build_soap_fault("s:Client", "UPnPError", Some((err.code(), &description))) {
        Ok(xml) => xml_response(StatusCode::INTERNAL_SERVER_ERROR, xml),
        Err(e) => {
            error!("❌ Cannot build SOAP fault: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn description_handler(
    State(state): State<Arc<ServerState>>,
    Path(udn): Path<String>,
) -> Response {
    let Some(device) = state.device(&udn) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let base = format!("{}/", state.base_url);
    xml_response(
        StatusCode::OK,
        device_description(device.info(), &device.services(), &base),
    )
}

async fn scpd_handler(
    State(state): State<Arc<ServerState>>,
    Path((udn, service)): Path<(String, String)>,
) -> Response {
    let Some(device) = state.device(&udn) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(info) = device
        .services()
        .into_iter()
        .find(|s| s.short_name() == service)
    else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let dev = Arc::clone(device);
    let service_id = info.service_id;
    let vars = tokio::task::spawn_blocking(move || dev.state_variables(service_id))
        .await
        .unwrap_or_default();
    xml_response(StatusCode::OK, scpd(&info, &vars))
}

async fn control_handler(
    State(state): State<Arc<ServerState>>,
    Path((udn, service)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let Some((device, service_type, service_id)) = state.service(&udn, &service) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let action = match parse_soap_action(&body) {
        Ok(action) => action,
        Err(e) => {
            warn!("❌ Bad SOAP request on {}: {}", service, e);
            return fault_response(&ActionError::InvalidAction(e.to_string()));
        }
    };
    debug!("🎬 {} {} {:?}", service, action.name, action.args);

    let name = action.name.clone();
    let result = tokio::task::spawn_blocking(move || {
        device.dispatch(service_id, &action.name, &action.args)
    })
    .await;

    match result {
        Ok(Ok(values)) => match build_soap_response(service_type, &name, values) {
            Ok(xml) => xml_response(StatusCode::OK, xml),
            Err(e) => fault_response(&ActionError::internal(e.to_string())),
        },
        Ok(Err(err)) => fault_response(&err),
        Err(e) => {
            error!("❌ Action {} aborted: {}", name, e);
            fault_response(&ActionError::internal(e.to_string()))
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

async fn event_handler(
    State(state): State<Arc<ServerState>>,
    Path((udn, service)): Path<(String, String)>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let Some((device, _, service_id)) = state.service(&udn, &service) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let registry = Arc::clone(state.sender.registry());
    let sid = header_str(&headers, "SID");
    let nt = header_str(&headers, "NT");
    let callback = header_str(&headers, "CALLBACK");

    match method.as_str() {
        "SUBSCRIBE" => {
            let timeout = parse_timeout(header_str(&headers, "TIMEOUT"));
            let sid = match sid {
                Some(sid) => {
                    if nt.is_some() || callback.is_some() {
                        return StatusCode::BAD_REQUEST.into_response();
                    }
                    if !registry.renew(sid, timeout) {
                        return StatusCode::PRECONDITION_FAILED.into_response();
                    }
                    sid.to_string()
                }
                None => {
                    let callbacks = callback.map(parse_callbacks).unwrap_or_default();
                    if nt != Some("upnp:event") || callbacks.is_empty() {
                        return StatusCode::PRECONDITION_FAILED.into_response();
                    }
                    let sid = registry.subscribe(&udn, service_id, callbacks, timeout);
                    tokio::spawn(send_initial_event(
                        device,
                        state.sender.clone(),
                        service_id,
                        sid.clone(),
                    ));
                    sid
                }
            };

            let mut response = StatusCode::OK.into_response();
            let h = response.headers_mut();
            h.insert(header::SERVER, HeaderValue::from_static(SERVER_HEADER));
            if let Ok(v) = HeaderValue::from_str(&sid) {
                h.insert("sid", v);
            }
            if let Ok(v) = HeaderValue::from_str(&format!("Second-{}", timeout)) {
                h.insert("timeout", v);
            }
            response
        }
        "UNSUBSCRIBE" => match sid {
            Some(sid) if registry.unsubscribe(sid) => StatusCode::OK.into_response(),
            _ => StatusCode::PRECONDITION_FAILED.into_response(),
        },
        other => {
            warn!("Unsupported event method: {}", other);
            StatusCode::METHOD_NOT_ALLOWED.into_response()
        }
    }
}

async fn send_initial_event(
    device: Arc<dyn UpnpDevice>,
    sender: EventSender,
    service_id: &'static str,
    sid: String,
) {
    let registry = Arc::clone(sender.registry());
    let initial_sid = sid.clone();
    let initial = tokio::task::spawn_blocking(move || {
        let mut target = None;
        let properties = device.initial_event(service_id, &mut || {
            target = registry.take_initial_target(&initial_sid);
        });
        match properties {
            Some(properties) => (properties, target),
            None => (Vec::new(), registry.take_initial_target(&initial_sid)),
        }
    })
    .await;

    match initial {
        Ok((properties, Some(target))) => {
            sender.send(&target, &propertyset(&properties)).await;
        }
        Ok((_, None)) => debug!("Subscription {} gone before its initial event", sid),
        Err(e) => error!("❌ Initial event for {} failed: {}", sid, e),
    }
}
